// src/api/handlers/health.rs
use actix_web::{web, HttpRequest, HttpResponse, Result};
use serde_json::json;

use super::compare::not_allowed;
use crate::api::AppState;

pub async fn health_check(state: web::Data<AppState>) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(json!({
        "status": "healthy",
        "service": "llm-compare",
        "version": env!("CARGO_PKG_VERSION"),
        "providers": state.aggregator.provider_ids(),
    })))
}

pub async fn health_method_not_allowed(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse> {
    Ok(not_allowed(&req, &state, "GET"))
}
