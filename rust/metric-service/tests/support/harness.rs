use anyhow::anyhow;
use metric_service::{
    config::AppConfig,
    db::{self, PgPool},
    directory::DirectoryConfig,
    models::EquipmentTypeInternal,
    store::PgMetricStore,
};
use std::{env, future::Future, net::SocketAddr, time::Duration};
use tokio::sync::OnceCell;
use uuid::Uuid;

const DATABASE_URL_ENV: &str = "METRIC_TEST_DATABASE_URL";

static SCHEMA_READY: OnceCell<()> = OnceCell::const_new();

/// A `PgMetricStore` on the test database, with a scope no other test uses.
#[derive(Clone)]
pub struct StoreHarness {
    pub store: PgMetricStore,
    pub scope: String,
    pool: PgPool,
}

/// Runs a test closure against the Postgres store named by `METRIC_TEST_DATABASE_URL`.
/// Skips when the variable is unset.
pub async fn with_store_harness<F, Fut>(test: F)
where
    F: FnOnce(StoreHarness) -> Fut,
    Fut: Future<Output = ()>,
{
    let Some(database_url) = env::var(DATABASE_URL_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty())
    else {
        eprintln!("[metric-test] skipping store harness: {DATABASE_URL_ENV} is not set");
        return;
    };

    let pool = db::connect_pool(&test_config(database_url))
        .await
        .expect("failed to build test pool");
    let store = PgMetricStore::new(pool.clone());
    SCHEMA_READY
        .get_or_try_init(|| store.migrate())
        .await
        .expect("failed to apply metric schema");

    let harness = StoreHarness {
        store,
        scope: format!("store-{}", Uuid::new_v4().simple()),
        pool,
    };

    test(harness.clone()).await;

    harness
        .cleanup()
        .await
        .expect("failed to remove test scope rows");
}

impl StoreHarness {
    /// A second scope owned by this test.
    pub fn sibling_scope(&self) -> String {
        format!("{}-b", self.scope)
    }

    pub async fn seed_equipment_types(
        &self,
        scope: &str,
        types: &[EquipmentTypeInternal],
    ) -> anyhow::Result<()> {
        let conn = self.pool.get().await.map_err(|err| anyhow!("{err:?}"))?;
        for eq_type in types {
            let attributes = serde_json::to_value(&eq_type.attributes)?;
            conn.execute(
                "INSERT INTO equipment_types (scope, id, parent_id, attributes) \
                 VALUES ($1, $2, $3, $4)",
                &[&scope, &eq_type.id, &eq_type.parent_id, &attributes],
            )
            .await?;
        }
        Ok(())
    }

    async fn cleanup(&self) -> anyhow::Result<()> {
        let conn = self.pool.get().await.map_err(|err| anyhow!("{err:?}"))?;
        for table in ["metrics", "equipment_types"] {
            let sql = format!("DELETE FROM {table} WHERE starts_with(scope, $1::text)");
            conn.execute(sql.as_str(), &[&self.scope]).await?;
        }
        Ok(())
    }
}

fn test_config(database_url: String) -> AppConfig {
    AppConfig {
        listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        database_url,
        max_pool_size: 2,
        pg_ssl_root_cert: env::var("PGSSLROOTCERT").ok(),
        pg_ssl_cert: env::var("PGSSLCERT").ok(),
        pg_ssl_key: env::var("PGSSLKEY").ok(),
        api_key: None,
        directory: DirectoryConfig {
            url: "http://equipment.invalid".into(),
            timeout: Duration::from_secs(1),
        },
        templates_path: None,
    }
}
