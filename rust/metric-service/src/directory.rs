use crate::{
    models::EquipmentTypeExternal,
    repository::{DirectoryError, EquipmentDirectory},
};
use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    pub url: String,
    pub timeout: Duration,
}

/// HTTP client for the equipment inventory service.
#[derive(Clone)]
pub struct HttpEquipmentDirectory {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct EquipmentTypesResponse {
    #[serde(default)]
    equipment_types: Vec<EquipmentTypeExternal>,
}

impl HttpEquipmentDirectory {
    pub fn new(config: DirectoryConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl EquipmentDirectory for HttpEquipmentDirectory {
    async fn equipment_types(
        &self,
        scopes: &[String],
    ) -> Result<Vec<EquipmentTypeExternal>, DirectoryError> {
        let query: Vec<(&str, &str)> = scopes
            .iter()
            .map(|scope| ("scopes", scope.as_str()))
            .collect();
        let response = self
            .client
            .get(format!("{}/api/v1/equipments/types", self.base_url))
            .query(&query)
            .send()
            .await
            .map_err(|err| DirectoryError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DirectoryError::Status(status.as_u16()));
        }

        let body: EquipmentTypesResponse = response
            .json()
            .await
            .map_err(|err| DirectoryError::Decode(err.to_string()))?;
        debug!(
            count = body.equipment_types.len(),
            "fetched equipment types from directory"
        );
        Ok(body.equipment_types)
    }
}
