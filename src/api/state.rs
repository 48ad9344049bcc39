// src/api/state.rs
use crate::aggregator::Aggregator;
use crate::config::AppConfig;
use reqwest::Client;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub aggregator: Arc<Aggregator>,
}

impl AppState {
    /// Builds every configured provider around one shared HTTP client.
    pub fn new(config: AppConfig) -> Self {
        let client = Client::new();
        let aggregator = Aggregator::from_config(&config, &client);
        Self::with_aggregator(config, aggregator)
    }

    pub fn with_aggregator(config: AppConfig, aggregator: Aggregator) -> Self {
        Self {
            config: Arc::new(config),
            aggregator: Arc::new(aggregator),
        }
    }
}
