// tests/integration_tests.rs
use actix_web::http::header::{ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE, ORIGIN};
use actix_web::http::StatusCode;
use actix_web::{test, web, App};
use llm_compare::api::{configure_routes, AppState};
use llm_compare::config::AppConfig;
use mockito::{Mock, Server, ServerGuard};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::{Duration, Instant};

const OPENAI_PATH: &str = "/openai/v1/responses";
const CLAUDE_PATH: &str = "/anthropic/v1/messages";
const GEMINI_PATH: &str = "/gemini/v1beta/models/gemini-2.0-flash:generateContent";
const DEEPSEEK_PATH: &str = "/deepseek/v1/chat/completions";

/// Environment pointing every provider at `base`, with all keys present
/// except the ones listed in `without`.
fn env_for(base: &str, without: &[&str]) -> HashMap<String, String> {
    let mut vars: HashMap<String, String> = [
        ("OPENAI_API_KEY", "sk-test".to_string()),
        ("ANTHROPIC_API_KEY", "ak-test".to_string()),
        ("GEMINI_API_KEY", "g-test".to_string()),
        ("DEEPSEEK_API_KEY", "ds-test".to_string()),
        ("OPENAI_API_BASE", format!("{}/openai/v1", base)),
        ("ANTHROPIC_API_BASE", format!("{}/anthropic", base)),
        ("GEMINI_API_BASE", format!("{}/gemini", base)),
        ("DEEPSEEK_API_BASE", format!("{}/deepseek/v1", base)),
        ("ALLOWED_ORIGINS", "https://compare.example.com,http://localhost:5173".to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

    for key in without {
        vars.remove(*key);
    }
    vars
}

fn config_from(vars: HashMap<String, String>) -> AppConfig {
    AppConfig::from_lookup(|key| vars.get(key).cloned()).unwrap()
}

async fn mock_json(server: &mut ServerGuard, path: &str, status: usize, body: Value) -> Mock {
    server
        .mock("POST", path)
        .match_query(mockito::Matcher::Any)
        .with_status(status)
        .with_header("content-type", "application/json")
        .with_body(body.to_string())
        .create_async()
        .await
}

async fn mock_openai_ok(server: &mut ServerGuard) -> Mock {
    mock_json(server, OPENAI_PATH, 200, json!({"output_text": "Hello from OpenAI"})).await
}

async fn mock_claude_ok(server: &mut ServerGuard) -> Mock {
    mock_json(
        server,
        CLAUDE_PATH,
        200,
        json!({"content": [{"type": "text", "text": "Hello from Claude"}], "stop_reason": "end_turn"}),
    )
    .await
}

async fn mock_gemini_ok(server: &mut ServerGuard) -> Mock {
    mock_json(
        server,
        GEMINI_PATH,
        200,
        json!({"candidates": [{"content": {"parts": [{"text": "Hello "}, {"text": "from Gemini"}]}}]}),
    )
    .await
}

async fn mock_deepseek_ok(server: &mut ServerGuard) -> Mock {
    mock_json(
        server,
        DEEPSEEK_PATH,
        200,
        json!({"choices": [{"message": {"role": "assistant", "content": "Hello from DeepSeek"}}]}),
    )
    .await
}

/// Accepts connections and never answers.
async fn silent_server() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    format!("http://{}", addr)
}

macro_rules! app {
    ($config:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new(AppState::new($config)))
                .configure(configure_routes),
        )
        .await
    };
}

#[actix_web::test]
async fn test_compare_returns_every_core_answer() {
    let mut server = Server::new_async().await;
    let openai = mock_openai_ok(&mut server).await;
    let claude = mock_claude_ok(&mut server).await;
    let deepseek = mock_deepseek_ok(&mut server).await;
    let gemini = server.mock("POST", GEMINI_PATH).match_query(mockito::Matcher::Any).expect(0).create_async().await;

    let app = app!(config_from(env_for(&server.url(), &[])));
    let req = test::TestRequest::post()
        .uri("/api/compare")
        .insert_header((ORIGIN, "http://localhost:5173"))
        .set_json(json!({"prompt": "Say hello briefly."}))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get(CONTENT_TYPE).unwrap(), "application/json");
    assert_eq!(resp.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "http://localhost:5173");

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(
        body,
        json!({
            "prompt": "Say hello briefly.",
            "openai": "Hello from OpenAI",
            "claude": "Hello from Claude",
            "deepseek": "Hello from DeepSeek"
        })
    );

    openai.assert_async().await;
    claude.assert_async().await;
    deepseek.assert_async().await;
    gemini.assert_async().await;
}

#[actix_web::test]
async fn test_empty_body_uses_default_prompt() {
    let mut server = Server::new_async().await;
    let _openai = mock_openai_ok(&mut server).await;
    let _claude = mock_claude_ok(&mut server).await;
    let deepseek = server
        .mock("POST", DEEPSEEK_PATH)
        .match_body(mockito::Matcher::Regex(
            r#"\{"role":"user","content":"Say hello briefly\."\}"#.to_string(),
        ))
        .with_status(200)
        .with_body(json!({"choices": [{"message": {"content": "Hello"}}]}).to_string())
        .create_async()
        .await;

    let app = app!(config_from(env_for(&server.url(), &[])));
    let req = test::TestRequest::post()
        .uri("/compare")
        .insert_header((CONTENT_TYPE, "application/json"))
        .set_payload("{}")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["prompt"], "Say hello briefly.");
    assert_eq!(body["deepseek"], "Hello");
    assert!(body.get("gemini").is_none());
    deepseek.assert_async().await;
}

#[actix_web::test]
async fn test_get_is_method_not_allowed() {
    let app = app!(config_from(env_for("http://127.0.0.1:9", &[])));
    let req = test::TestRequest::get().uri("/api/compare").to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({"error": "Method Not Allowed"}));
}

#[actix_web::test]
async fn test_overloaded_claude_is_isolated() {
    let mut server = Server::new_async().await;
    let _openai = mock_openai_ok(&mut server).await;
    let _deepseek = mock_deepseek_ok(&mut server).await;
    let _claude = mock_json(&mut server, CLAUDE_PATH, 529, json!({"error": {"message": "Overloaded"}})).await;

    let app = app!(config_from(env_for(&server.url(), &[])));
    let req = test::TestRequest::post()
        .uri("/api/compare")
        .set_json(json!({}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["claude"], "Claude error: Overloaded");
    assert_eq!(body["openai"], "Hello from OpenAI");
    assert_eq!(body["deepseek"], "Hello from DeepSeek");
}

#[actix_web::test]
async fn test_missing_credential_only_affects_its_provider() {
    let mut server = Server::new_async().await;
    let _openai = mock_openai_ok(&mut server).await;
    let _claude = mock_claude_ok(&mut server).await;
    let deepseek = server.mock("POST", DEEPSEEK_PATH).expect(0).create_async().await;

    let app = app!(config_from(env_for(&server.url(), &["DEEPSEEK_API_KEY"])));
    let req = test::TestRequest::post().uri("/api/compare").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["deepseek"], "DeepSeek error: Missing DEEPSEEK_API_KEY");
    assert_eq!(body["openai"], "Hello from OpenAI");
    assert_eq!(body["claude"], "Hello from Claude");
    deepseek.assert_async().await;
}

#[actix_web::test]
async fn test_with_gemini_adds_gemini_field() {
    let mut server = Server::new_async().await;
    let _openai = mock_openai_ok(&mut server).await;
    let _claude = mock_claude_ok(&mut server).await;
    let _deepseek = mock_deepseek_ok(&mut server).await;
    let gemini = mock_gemini_ok(&mut server).await;

    let app = app!(config_from(env_for(&server.url(), &[])));
    let req = test::TestRequest::post()
        .uri("/api/compare")
        .set_json(json!({"prompt": "hi", "withGemini": true}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["gemini"], "Hello from Gemini");
    gemini.assert_async().await;
}

#[actix_web::test]
async fn test_hanging_provider_is_replaced_by_timeout_text() {
    let mut server = Server::new_async().await;
    let _openai = mock_openai_ok(&mut server).await;
    let _claude = mock_claude_ok(&mut server).await;

    let mut vars = env_for(&server.url(), &[]);
    vars.insert("DEEPSEEK_API_BASE".to_string(), silent_server().await);
    vars.insert("DEEPSEEK_DEADLINE_SECS".to_string(), "1".to_string());
    vars.insert("DEEPSEEK_FALLBACK_MAX_TOKENS".to_string(), "0".to_string());

    let app = app!(config_from(vars));
    let start = Instant::now();
    let req = test::TestRequest::post().uri("/api/compare").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let elapsed = start.elapsed();

    assert_eq!(
        body["deepseek"],
        "DeepSeek timed out (kept answer short; try re-asking for more detail)."
    );
    assert_eq!(body["openai"], "Hello from OpenAI");
    assert!(elapsed >= Duration::from_secs(1));
    assert!(elapsed < Duration::from_secs(3), "took {:?}", elapsed);
}

#[actix_web::test]
async fn test_success_status_without_text_is_an_error_string() {
    let mut server = Server::new_async().await;
    let _openai = mock_json(&mut server, OPENAI_PATH, 200, json!({"id": "resp_1", "output": []})).await;
    let _claude = mock_json(&mut server, CLAUDE_PATH, 200, json!({"id": "msg_1"})).await;
    let _deepseek = mock_json(&mut server, DEEPSEEK_PATH, 200, json!({"choices": []})).await;
    let _gemini = mock_json(&mut server, GEMINI_PATH, 200, json!({"candidates": []})).await;

    let app = app!(config_from(env_for(&server.url(), &[])));
    let req = test::TestRequest::post()
        .uri("/api/compare")
        .set_json(json!({"withGemini": true}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["openai"], "OpenAI error: No answer returned");
    assert_eq!(body["claude"], "Claude error: No Claude response");
    assert_eq!(body["deepseek"], "DeepSeek error: No answer returned");
    assert_eq!(body["gemini"], "Gemini error: No Gemini response");
}

#[actix_web::test]
async fn test_malformed_body_is_bad_request() {
    let app = app!(config_from(env_for("http://127.0.0.1:9", &[])));
    let req = test::TestRequest::post()
        .uri("/api/compare")
        .insert_header((CONTENT_TYPE, "application/json"))
        .set_payload("{\"prompt\": ")
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].as_str().unwrap().starts_with("Invalid request body"));
}

#[actix_web::test]
async fn test_preflight_and_unknown_origin() {
    let app = app!(config_from(env_for("http://127.0.0.1:9", &[])));
    let req = test::TestRequest::default()
        .method(actix_web::http::Method::OPTIONS)
        .uri("/api/compare")
        .insert_header((ORIGIN, "https://elsewhere.example.org"))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        resp.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "https://compare.example.com"
    );
}

#[actix_web::test]
async fn test_single_provider_endpoint() {
    let mut server = Server::new_async().await;
    let _deepseek = mock_deepseek_ok(&mut server).await;

    let app = app!(config_from(env_for(&server.url(), &[])));
    let req = test::TestRequest::post()
        .uri("/api/deepseek")
        .set_json(json!({"prompt": "hi"}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body, json!({"prompt": "hi", "deepseek": "Hello from DeepSeek"}));

    let req = test::TestRequest::post().uri("/api/mistral").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_health_check() {
    let app = app!(config_from(env_for("http://127.0.0.1:9", &[])));
    let req = test::TestRequest::get().uri("/api/health").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["status"], "healthy");
    assert_eq!(body["providers"], json!(["openai", "claude", "deepseek", "gemini"]));
}

#[actix_web::test]
async fn test_gemini_transport_error_keeps_key_private() {
    let mut server = Server::new_async().await;
    let _openai = mock_openai_ok(&mut server).await;
    let _claude = mock_claude_ok(&mut server).await;
    let _deepseek = mock_deepseek_ok(&mut server).await;

    let closed_port = std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
    let mut vars = env_for(&server.url(), &[]);
    vars.insert("GEMINI_API_KEY".to_string(), "gemini-secret-value".to_string());
    vars.insert("GEMINI_API_BASE".to_string(), format!("http://127.0.0.1:{}", closed_port));

    let app = app!(config_from(vars));
    let req = test::TestRequest::post()
        .uri("/api/compare")
        .set_json(json!({"withGemini": true}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    let gemini = body["gemini"].as_str().unwrap();
    assert!(gemini.starts_with("Gemini error: "), "{}", gemini);
    assert!(!gemini.contains("gemini-secret-value"), "{}", gemini);
    assert_eq!(body["openai"], "Hello from OpenAI");
}

#[actix_web::test]
async fn test_oversized_body_is_json_with_cors() {
    let mut vars = env_for("http://127.0.0.1:9", &[]);
    vars.insert("MAX_BODY_BYTES".to_string(), "1024".to_string());
    let app = app!(config_from(vars));

    for uri in ["/api/compare", "/compare", "/api/openai"] {
        let req = test::TestRequest::post()
            .uri(uri)
            .insert_header((ORIGIN, "http://localhost:5173"))
            .set_json(json!({"prompt": "x".repeat(4096)}))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE, "{}", uri);
        assert_eq!(resp.headers().get(CONTENT_TYPE).unwrap(), "application/json");
        assert_eq!(resp.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "http://localhost:5173");
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({"error": "Request body exceeds 1024 bytes"}));
    }
}

#[actix_web::test]
async fn test_default_body_limit_is_two_mebibytes() {
    let app = app!(config_from(env_for("http://127.0.0.1:9", &[])));
    let req = test::TestRequest::post()
        .uri("/api/compare")
        .set_json(json!({"prompt": "x".repeat(3 * 1024 * 1024)}))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Request body exceeds 2097152 bytes");
}

#[actix_web::test]
async fn test_post_to_health_is_method_not_allowed() {
    let app = app!(config_from(env_for("http://127.0.0.1:9", &[])));
    let req = test::TestRequest::post().uri("/api/health").to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(resp.headers().get(actix_web::http::header::ALLOW).unwrap(), "GET");
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({"error": "Method Not Allowed"}));
}
