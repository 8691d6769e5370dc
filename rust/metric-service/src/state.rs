use crate::{config::AppConfig, service::MetricService};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub service: MetricService,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, service: MetricService) -> Self {
        Self { config, service }
    }
}
