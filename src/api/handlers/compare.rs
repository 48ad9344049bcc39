// src/api/handlers/compare.rs
use actix_web::http::header::{ALLOW, CONTENT_LENGTH};
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse, Result};
use futures::StreamExt;
use log::{error, warn};
use serde::Deserialize;
use serde_json::json;

use crate::aggregator::CompareOptions;
use crate::api::cors;
use crate::api::AppState;
use crate::config::DEFAULT_PROMPT;
use crate::errors::CompareError;
use crate::providers::ProviderId;

/// Body accepted by the compare endpoints. Every field is optional.
#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct CompareRequest {
    pub prompt: Option<String>,
    #[serde(rename = "withGemini")]
    pub with_gemini: Option<bool>,
}

impl CompareRequest {
    /// Parses a raw body. An empty body is the same as `{}`.
    pub fn from_body(body: &[u8]) -> std::result::Result<Self, CompareError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body).map_err(|e| CompareError::BadRequest(format!("Invalid request body: {}", e)))
    }

    /// The caller's prompt, or the default when it is missing or blank.
    pub fn prompt(&self) -> &str {
        self.prompt
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(DEFAULT_PROMPT)
    }
}

/// Collects the request body, refusing anything over `limit` bytes.
async fn read_body(
    req: &HttpRequest,
    mut payload: web::Payload,
    limit: usize,
) -> std::result::Result<web::BytesMut, CompareError> {
    let declared = req
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared.is_some_and(|len| len > limit) {
        return Err(CompareError::PayloadTooLarge(limit));
    }

    let mut body = web::BytesMut::new();
    while let Some(chunk) = payload.next().await {
        let chunk = chunk.map_err(|e| CompareError::BadRequest(format!("Failed to read request body: {}", e)))?;
        if body.len() + chunk.len() > limit {
            return Err(CompareError::PayloadTooLarge(limit));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

/// Reads and parses the body shared by both POST endpoints.
async fn read_request(
    req: &HttpRequest,
    state: &AppState,
    payload: web::Payload,
) -> std::result::Result<CompareRequest, CompareError> {
    let body = read_body(req, payload, state.config.server.max_body_bytes).await?;
    CompareRequest::from_body(&body)
}

fn status_for(e: &CompareError) -> StatusCode {
    match e {
        CompareError::BadRequest(_) => StatusCode::BAD_REQUEST,
        CompareError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(req: &HttpRequest, state: &AppState, status: StatusCode, message: &str) -> HttpResponse {
    cors::json_response(req, &state.config.server, status, &json!({ "error": message }))
}

fn rejected(req: &HttpRequest, state: &AppState, e: CompareError) -> HttpResponse {
    warn!("Rejected request to {}: {}", req.path(), e);
    error_response(req, state, status_for(&e), &e.to_string())
}

pub async fn compare(req: HttpRequest, state: web::Data<AppState>, payload: web::Payload) -> Result<HttpResponse> {
    let request = match read_request(&req, &state, payload).await {
        Ok(request) => request,
        Err(e) => return Ok(rejected(&req, &state, e)),
    };

    let options = CompareOptions::with_gemini(request.with_gemini.unwrap_or(false));

    match state.aggregator.compare(request.prompt(), &options).await {
        Ok(payload) => Ok(cors::json_response(&req, &state.config.server, StatusCode::OK, &payload)),
        Err(e) => {
            error!("Compare request failed: {}", e);
            Ok(error_response(&req, &state, status_for(&e), &e.to_string()))
        }
    }
}

/// Asks one provider: `POST /api/{provider}` answers `{prompt, <provider>: text}`.
pub async fn ask_provider(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Payload,
) -> Result<HttpResponse> {
    let id = match path.into_inner().parse::<ProviderId>() {
        Ok(id) => id,
        Err(e) => return Ok(error_response(&req, &state, StatusCode::NOT_FOUND, &e)),
    };

    let request = match read_request(&req, &state, payload).await {
        Ok(request) => request,
        Err(e) => return Ok(rejected(&req, &state, e)),
    };
    let prompt = request.prompt();

    match state.aggregator.ask(id, prompt).await {
        Some(answer) => {
            let mut payload = serde_json::Map::new();
            payload.insert("prompt".to_string(), json!(prompt));
            payload.insert(id.as_str().to_string(), json!(answer));
            Ok(cors::json_response(&req, &state.config.server, StatusCode::OK, &payload))
        }
        None => Ok(error_response(
            &req,
            &state,
            StatusCode::NOT_FOUND,
            &format!("Provider '{}' is not enabled", id),
        )),
    }
}

/// CORS preflight.
pub async fn preflight(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse> {
    let mut builder = HttpResponse::NoContent();
    cors::apply(&mut builder, &req, &state.config.server);
    Ok(builder.finish())
}

/// JSON 405 advertising the methods in `allow`.
pub(crate) fn not_allowed(req: &HttpRequest, state: &AppState, allow: &'static str) -> HttpResponse {
    let mut builder = HttpResponse::MethodNotAllowed();
    cors::apply(&mut builder, req, &state.config.server);
    builder.insert_header((ALLOW, allow));
    builder.json(json!({ "error": "Method Not Allowed" }))
}

pub async fn method_not_allowed(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse> {
    Ok(not_allowed(&req, &state, "POST, OPTIONS"))
}
