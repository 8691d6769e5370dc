//! Collaborator boundaries: metric persistence and the equipment directory.

use crate::models::{
    EquipmentTypeExternal, EquipmentTypeInternal, MetricInfo, MetricKind, MetricRecord,
};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepoError {
    /// The query succeeded but matched nothing.
    #[error("no data")]
    NoData,

    #[error("metric '{0}' already exists")]
    Duplicate(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type RepoResult<T> = std::result::Result<T, RepoError>;

/// Per-scope metric configuration storage, plus the scope's stored equipment graph.
#[async_trait]
pub trait MetricRepository: Send + Sync {
    /// Name and kind of every metric in the scope. `NoData` when there is none.
    async fn list_metrics(&self, scope: &str) -> RepoResult<Vec<MetricInfo>>;

    /// Persists a new metric and returns it with its generated id.
    async fn create_metric(&self, scope: &str, record: MetricRecord) -> RepoResult<MetricRecord>;

    /// Overwrites the metric of the same kind and name. `NoData` when it does not exist.
    async fn update_metric(&self, scope: &str, record: &MetricRecord) -> RepoResult<()>;

    async fn get_metric(&self, scope: &str, kind: MetricKind, name: &str)
        -> RepoResult<MetricRecord>;

    /// The scope's stored equipment-type graph. `NoData` when the scope has none.
    async fn equipment_types(&self, scope: &str) -> RepoResult<Vec<EquipmentTypeInternal>>;
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("equipment directory request failed: {0}")]
    Transport(String),

    #[error("equipment directory returned status {0}")]
    Status(u16),

    #[error("invalid equipment directory response: {0}")]
    Decode(String),
}

/// Inventory service view of the equipment types, carrying human-readable names.
#[async_trait]
pub trait EquipmentDirectory: Send + Sync {
    async fn equipment_types(
        &self,
        scopes: &[String],
    ) -> Result<Vec<EquipmentTypeExternal>, DirectoryError>;
}
