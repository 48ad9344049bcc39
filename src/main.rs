use actix_web::{middleware, web, App, HttpServer};
use llm_compare::api::{configure_routes, AppState};
use llm_compare::banner;
use llm_compare::config::AppConfig;
use llm_compare::providers::ProviderId;
use log::{error, info, warn};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Print the startup banner
    banner::print_banner();

    if let Err(e) = dotenvy::dotenv() {
        eprintln!("⚠️  Warning: Could not load .env file: {}", e);
        eprintln!("   Provider keys must then come from the environment");
    }

    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let app_config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!("❌ Failed to load configuration: {}", e);
            return Err(std::io::Error::other(e));
        }
    };

    for id in ProviderId::ALL {
        if app_config.settings(id).api_key.is_none() {
            warn!("⚠️  {} not set; {} answers will be errors", id.env_key(), id.display_name());
        }
    }

    let host = app_config.server.host.clone();
    let port = app_config.server.port;
    let state = AppState::new(app_config);

    info!("🚀 Starting server on http://{}:{}", host, port);
    info!("📡 Providers: {:?}", state.aggregator.provider_ids());

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(middleware::Logger::default())
            .configure(configure_routes)
    })
    .bind((host.as_str(), port))?
    .run()
    .await
}
