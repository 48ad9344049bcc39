// src/api/routes.rs
use actix_web::http::Method;
use actix_web::{web, Resource};
use super::handlers;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .service(
                web::resource("/health")
                    .route(web::get().to(handlers::health_check))
                    .default_service(web::to(handlers::health_method_not_allowed)),
            )
            .service(post_only("/compare", handlers::compare))
            .service(post_only("/{provider}", handlers::ask_provider)),
    )
    .service(post_only("/compare", handlers::compare));
}

/// A resource answering POST and CORS preflight; every other method gets 405.
fn post_only<F, Args>(path: &str, handler: F) -> Resource
where
    F: actix_web::Handler<Args>,
    Args: actix_web::FromRequest + 'static,
    F::Output: actix_web::Responder + 'static,
{
    web::resource(path)
        .route(web::post().to(handler))
        .route(web::method(Method::OPTIONS).to(handlers::preflight))
        .default_service(web::to(handlers::method_not_allowed))
}
