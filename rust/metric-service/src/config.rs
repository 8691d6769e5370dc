use crate::directory::DirectoryConfig;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    env,
    net::{SocketAddr, ToSocketAddrs},
    path::PathBuf,
    time::Duration,
};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub database_url: String,
    pub max_pool_size: u32,
    pub pg_ssl_root_cert: Option<String>,
    pub pg_ssl_cert: Option<String>,
    pub pg_ssl_key: Option<String>,
    pub api_key: Option<String>,
    pub directory: DirectoryConfig,
    pub templates_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    metric_listen_addr: Option<String>,
    #[serde(default)]
    metric_listen_host: Option<String>,
    #[serde(default)]
    metric_listen_port: Option<u16>,
    #[serde(default)]
    metric_database_url: Option<String>,
    #[serde(default)]
    database_url: Option<String>,
    #[serde(default = "default_pool_size")]
    metric_max_pool_size: u32,
    #[serde(default)]
    pgsslrootcert: Option<String>,
    #[serde(default)]
    pgsslcert: Option<String>,
    #[serde(default)]
    pgsslkey: Option<String>,
    #[serde(default)]
    metric_api_key: Option<String>,
    #[serde(default)]
    metric_equipment_url: Option<String>,
    #[serde(default = "default_equipment_timeout_ms")]
    metric_equipment_timeout_ms: u64,
    #[serde(default)]
    metric_templates_path: Option<PathBuf>,
}

const fn default_pool_size() -> u32 {
    10
}

const fn default_equipment_timeout_ms() -> u64 {
    5000
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let raw: RawConfig =
            envy::from_env().context("failed to parse METRIC_* environment variables")?;

        let listen_addr = resolve_addr(
            raw.metric_listen_addr,
            raw.metric_listen_host,
            raw.metric_listen_port,
        )?;

        let database_url = raw
            .metric_database_url
            .or(raw.database_url)
            .or_else(|| env::var("DATABASE_URL").ok())
            .context("METRIC_DATABASE_URL or DATABASE_URL must be set")?;

        let equipment_url = raw
            .metric_equipment_url
            .filter(|url| !url.trim().is_empty())
            .context("METRIC_EQUIPMENT_URL must be set")?;

        Ok(Self {
            listen_addr,
            database_url,
            max_pool_size: raw.metric_max_pool_size.max(1),
            pg_ssl_root_cert: raw.pgsslrootcert,
            pg_ssl_cert: raw.pgsslcert,
            pg_ssl_key: raw.pgsslkey,
            api_key: raw.metric_api_key.filter(|key| !key.is_empty()),
            directory: DirectoryConfig {
                url: equipment_url,
                timeout: Duration::from_millis(raw.metric_equipment_timeout_ms.max(1)),
            },
            templates_path: raw.metric_templates_path,
        })
    }
}

fn resolve_addr(
    addr: Option<String>,
    host: Option<String>,
    port: Option<u16>,
) -> Result<SocketAddr> {
    if let Some(addr) = addr {
        return addr
            .to_socket_addrs()
            .context("invalid METRIC_LISTEN_ADDR value")?
            .next()
            .context("METRIC_LISTEN_ADDR resolved to no addresses");
    }

    let host = host.unwrap_or_else(|| "0.0.0.0".to_string());
    let port = port.unwrap_or(8490);
    let combined = format!("{}:{}", host, port);
    combined
        .to_socket_addrs()
        .context("invalid metric service listen host/port combination")?
        .next()
        .context("listen address resolved to no targets")
}
