//! Metric configuration operations: bulk import of default metrics and single-metric
//! management for every kind.

mod import;
mod metrics;

pub use import::build_record;

use crate::{
    auth::CallContext,
    catalog::TemplateCatalog,
    error::{Result, ServiceError},
    models::{
        EquipmentTypeExternal, EquipmentTypeInternal, MetricInfo, MetricKind, MetricRecord,
    },
    repository::{EquipmentDirectory, MetricRepository, RepoError},
};
use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricImportRequest {
    pub scope: String,
    /// Template tokens, processed in order.
    #[serde(default)]
    pub metrics: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricImportResponse {
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateMetricResponse {
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricTypeInfo {
    pub name: String,
    pub description: String,
    pub href: String,
}

impl From<MetricKind> for MetricTypeInfo {
    fn from(kind: MetricKind) -> Self {
        Self {
            name: kind.token().to_string(),
            description: kind.description().to_string(),
            href: format!("/api/v1/metric/{}", kind.slug()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    pub description: String,
}

impl From<MetricInfo> for MetricSummary {
    fn from(info: MetricInfo) -> Self {
        Self {
            description: info.kind.description().to_string(),
            name: info.name,
            kind: info.kind,
        }
    }
}

#[derive(Clone)]
pub struct MetricService {
    repo: Arc<dyn MetricRepository>,
    directory: Arc<dyn EquipmentDirectory>,
    catalog: Arc<TemplateCatalog>,
}

impl MetricService {
    pub fn new(
        repo: Arc<dyn MetricRepository>,
        directory: Arc<dyn EquipmentDirectory>,
        catalog: Arc<TemplateCatalog>,
    ) -> Self {
        Self {
            repo,
            directory,
            catalog,
        }
    }

    pub fn catalog(&self) -> &TemplateCatalog {
        &self.catalog
    }

    pub async fn list_metric_types(
        &self,
        ctx: &CallContext,
        scopes: &[String],
    ) -> Result<Vec<MetricTypeInfo>> {
        ctx.authorize(scopes)?;
        Ok(MetricKind::ALL.into_iter().map(MetricTypeInfo::from).collect())
    }

    pub async fn list_metrics(
        &self,
        ctx: &CallContext,
        scopes: &[String],
    ) -> Result<Vec<MetricSummary>> {
        let scope = ctx.authorize(scopes)?;
        let metrics = self.existing_metrics(scope, "list_metrics").await?;
        Ok(metrics.into_iter().map(MetricSummary::from).collect())
    }

    pub async fn metric_config(
        &self,
        ctx: &CallContext,
        scopes: &[String],
        kind: MetricKind,
        name: &str,
    ) -> Result<MetricRecord> {
        let scope = ctx.authorize(scopes)?;
        if name.trim().is_empty() {
            return Err(ServiceError::invalid("metric name is empty"));
        }

        match self.repo.get_metric(scope, kind, name).await {
            Ok(record) => Ok(record),
            Err(RepoError::NoData) => Err(ServiceError::NotFound(format!(
                "metric '{name}' of type {kind} does not exist"
            ))),
            Err(err) => Err(repo_failure("metric_config", scope, err)),
        }
    }

    /// Metrics already configured in the scope; "no data" is an empty scope.
    async fn existing_metrics(&self, scope: &str, op: &'static str) -> Result<Vec<MetricInfo>> {
        match self.repo.list_metrics(scope).await {
            Ok(metrics) => Ok(metrics),
            Err(RepoError::NoData) => Ok(Vec::new()),
            Err(err) => Err(repo_failure(op, scope, err)),
        }
    }

    async fn stored_equipment_types(
        &self,
        scope: &str,
        op: &'static str,
    ) -> Result<Vec<EquipmentTypeInternal>> {
        match self.repo.equipment_types(scope).await {
            Ok(types) => Ok(types),
            Err(RepoError::NoData) => {
                warn!(op, %scope, "scope has no stored equipment types");
                Ok(Vec::new())
            }
            Err(err) => Err(repo_failure(op, scope, err)),
        }
    }

    async fn directory_equipment_types(
        &self,
        scope: &str,
        op: &'static str,
    ) -> Result<Vec<EquipmentTypeExternal>> {
        self.directory
            .equipment_types(&[scope.to_string()])
            .await
            .map_err(|err| {
                error!(op, %scope, error = %err, "failed to fetch equipment types from directory");
                ServiceError::internal("unable to get equipment data")
            })
    }
}

fn repo_failure(op: &'static str, scope: &str, err: RepoError) -> ServiceError {
    error!(op, %scope, error = ?err, "metric repository call failed");
    ServiceError::Internal(anyhow!("{op}: {err}"))
}
