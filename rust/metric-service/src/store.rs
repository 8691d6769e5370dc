//! Postgres-backed `MetricRepository`.

use crate::{
    db::{PgConnectionManager, PgPool},
    models::{EquipmentTypeInternal, InternalAttribute, MetricInfo, MetricKind, MetricRecord},
    repository::{MetricRepository, RepoError, RepoResult},
};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use bb8::PooledConnection;
use serde_json::Value;
use tokio_postgres::error::SqlState;
use tracing::{debug, error, info};
use uuid::Uuid;

const SCHEMA: &str = include_str!("../migrations/0001_metrics.sql");

#[derive(Clone)]
pub struct PgMetricStore {
    pool: PgPool,
}

impl PgMetricStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the schema. Safe to run on every start.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        let conn = self.conn().await?;
        conn.batch_execute(SCHEMA)
            .await
            .context("failed to apply metric schema")?;
        info!("metric schema is up to date");
        Ok(())
    }

    async fn conn(&self) -> RepoResult<PooledConnection<'_, PgConnectionManager>> {
        self.pool.get().await.map_err(|err| {
            error!(error = ?err, "failed to acquire database connection");
            RepoError::Other(anyhow!("{err:?}"))
        })
    }
}

#[async_trait]
impl MetricRepository for PgMetricStore {
    async fn list_metrics(&self, scope: &str) -> RepoResult<Vec<MetricInfo>> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                "SELECT name, kind FROM metrics WHERE scope = $1 ORDER BY created_at, name",
                &[&scope],
            )
            .await
            .context("failed to list metrics")?;

        if rows.is_empty() {
            return Err(RepoError::NoData);
        }

        rows.iter()
            .map(|row| -> RepoResult<MetricInfo> {
                let name: String = row.try_get("name").context("metrics.name")?;
                let kind: String = row.try_get("kind").context("metrics.kind")?;
                let kind = kind.parse::<MetricKind>().context("metrics.kind")?;
                Ok(MetricInfo { name, kind })
            })
            .collect()
    }

    async fn create_metric(&self, scope: &str, mut record: MetricRecord) -> RepoResult<MetricRecord> {
        record.set_id(Uuid::new_v4().to_string());
        record.trim_name();
        let config = serde_json::to_value(&record).context("failed to encode metric")?;
        let conn = self.conn().await?;

        let result = conn
            .execute(
                "INSERT INTO metrics (id, scope, name, kind, is_default, config) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
                &[
                    &record.id(),
                    &scope,
                    &record.name(),
                    &record.kind().token(),
                    &record.is_default(),
                    &config,
                ],
            )
            .await;

        match result {
            Ok(_) => {
                debug!(%scope, id = record.id(), kind = %record.kind(), "metric stored");
                Ok(record)
            }
            Err(err) if err.code() == Some(&SqlState::UNIQUE_VIOLATION) => {
                Err(RepoError::Duplicate(record.name().to_string()))
            }
            Err(err) => Err(RepoError::Other(
                anyhow::Error::new(err).context("failed to insert metric"),
            )),
        }
    }

    async fn update_metric(&self, scope: &str, record: &MetricRecord) -> RepoResult<()> {
        let config = serde_json::to_value(record).context("failed to encode metric")?;
        let conn = self.conn().await?;
        let updated = conn
            .execute(
                "UPDATE metrics SET config = $4, is_default = $5, updated_at = now() \
                 WHERE scope = $1 AND kind = $2 AND lower(btrim(name)) = lower(btrim($3::text))",
                &[
                    &scope,
                    &record.kind().token(),
                    &record.name(),
                    &config,
                    &record.is_default(),
                ],
            )
            .await
            .context("failed to update metric")?;

        if updated == 0 {
            return Err(RepoError::NoData);
        }
        Ok(())
    }

    async fn get_metric(
        &self,
        scope: &str,
        kind: MetricKind,
        name: &str,
    ) -> RepoResult<MetricRecord> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                "SELECT config FROM metrics \
                 WHERE scope = $1 AND kind = $2 AND lower(btrim(name)) = lower(btrim($3::text))",
                &[&scope, &kind.token(), &name],
            )
            .await
            .context("failed to read metric")?
            .ok_or(RepoError::NoData)?;

        let config: Value = row.try_get("config").context("metrics.config")?;
        let record = serde_json::from_value(config).context("failed to decode stored metric")?;
        Ok(record)
    }

    async fn equipment_types(&self, scope: &str) -> RepoResult<Vec<EquipmentTypeInternal>> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                "SELECT id, parent_id, attributes FROM equipment_types WHERE scope = $1",
                &[&scope],
            )
            .await
            .context("failed to list equipment types")?;

        if rows.is_empty() {
            return Err(RepoError::NoData);
        }

        rows.iter()
            .map(|row| -> RepoResult<EquipmentTypeInternal> {
                let id: String = row.try_get("id").context("equipment_types.id")?;
                let parent_id: Option<String> =
                    row.try_get("parent_id").context("equipment_types.parent_id")?;
                let attributes: Value = row
                    .try_get("attributes")
                    .context("equipment_types.attributes")?;
                let attributes: Vec<InternalAttribute> = serde_json::from_value(attributes)
                    .with_context(|| format!("invalid attributes for equipment type {id}"))?;
                Ok(EquipmentTypeInternal {
                    id,
                    parent_id,
                    attributes,
                })
            })
            .collect()
    }
}
