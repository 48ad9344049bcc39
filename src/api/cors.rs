// src/api/cors.rs
use actix_web::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, ORIGIN, VARY,
};
use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, HttpResponseBuilder};
use serde::Serialize;

use crate::config::ServerConfig;

/// Origin to send back: the caller's own when allow-listed, else the canonical one.
pub fn allowed_origin(req: &HttpRequest, server: &ServerConfig) -> String {
    req.headers()
        .get(ORIGIN)
        .and_then(|origin| origin.to_str().ok())
        .map(|origin| origin.trim_end_matches('/'))
        .filter(|origin| server.allowed_origins.iter().any(|allowed| allowed == origin))
        .unwrap_or_else(|| server.canonical_origin())
        .to_string()
}

pub fn apply(builder: &mut HttpResponseBuilder, req: &HttpRequest, server: &ServerConfig) {
    builder
        .insert_header((ACCESS_CONTROL_ALLOW_ORIGIN, allowed_origin(req, server)))
        .insert_header((VARY, "Origin"))
        .insert_header((ACCESS_CONTROL_ALLOW_METHODS, "POST, OPTIONS"))
        .insert_header((ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"));
}

/// JSON response carrying the CORS headers for `req`.
pub fn json_response<T: Serialize>(
    req: &HttpRequest,
    server: &ServerConfig,
    status: StatusCode,
    body: &T,
) -> HttpResponse {
    let mut builder = HttpResponse::build(status);
    apply(&mut builder, req, server);
    builder.json(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    fn server() -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 3000,
            allowed_origins: vec![
                "https://compare.example.com".to_string(),
                "http://localhost:5173".to_string(),
            ],
            max_body_bytes: 2 * 1024 * 1024,
        }
    }

    #[test]
    fn test_allow_listed_origin_is_echoed() {
        let req = TestRequest::default()
            .insert_header((ORIGIN, "http://localhost:5173"))
            .to_http_request();
        assert_eq!(allowed_origin(&req, &server()), "http://localhost:5173");
    }

    #[test]
    fn test_unknown_or_missing_origin_gets_canonical() {
        let req = TestRequest::default()
            .insert_header((ORIGIN, "https://evil.example.net"))
            .to_http_request();
        assert_eq!(allowed_origin(&req, &server()), "https://compare.example.com");

        let req = TestRequest::default().to_http_request();
        assert_eq!(allowed_origin(&req, &server()), "https://compare.example.com");
    }
}
