pub mod auth;
pub mod catalog;
pub mod config;
pub mod db;
pub mod directory;
pub mod error;
pub mod models;
pub mod repository;
pub mod resolver;
pub mod server;
pub mod service;
pub mod state;
pub mod store;
pub mod telemetry;

use crate::{config::AppConfig, server::Server};

/// Bootstraps the metric service using environment configuration.
pub async fn run() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    Server::new(config).await?.run().await
}
