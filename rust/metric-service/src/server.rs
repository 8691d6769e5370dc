use crate::{
    auth::CallContext,
    catalog::TemplateCatalog,
    config::AppConfig,
    db,
    directory::HttpEquipmentDirectory,
    error::{Result, ServiceError},
    models::{MetricKind, MetricRecord},
    service::{
        MetricImportRequest, MetricImportResponse, MetricService, MetricSummary, MetricTypeInfo,
        UpdateMetricResponse,
    },
    state::AppState,
    store::PgMetricStore,
};
use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

pub const API_KEY_HEADER: &str = "x-api-key";

pub struct Server {
    config: Arc<AppConfig>,
    state: AppState,
}

impl Server {
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        let catalog = match &config.templates_path {
            Some(path) => TemplateCatalog::load(path)
                .with_context(|| format!("failed to load metric templates from {}", path.display()))?,
            None => TemplateCatalog::builtin(),
        };
        info!(templates = catalog.len(), "metric template catalog ready");

        let pool = db::connect_pool(&config).await?;
        let store = PgMetricStore::new(pool);
        store.migrate().await?;
        let directory = HttpEquipmentDirectory::new(config.directory.clone())?;

        let config = Arc::new(config);
        let service = MetricService::new(Arc::new(store), Arc::new(directory), Arc::new(catalog));
        let state = AppState::new(Arc::clone(&config), service);

        Ok(Self { config, state })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let addr = self.config.listen_addr;
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "metric service listening");
        axum::serve(listener, router(self.state)).await?;
        Ok(())
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/api/v1/metric/types", get(list_metric_types))
        .route("/api/v1/metrics", get(list_metrics))
        .route("/api/v1/metric/config", get(metric_config))
        .route("/api/v1/metric/import", post(import_metrics))
        .route(
            "/api/v1/metric/:kind",
            post(create_metric).put(update_metric),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[derive(Debug, Deserialize)]
struct ScopeQuery {
    scope: String,
}

#[derive(Debug, Deserialize)]
struct ConfigQuery {
    scope: String,
    kind: String,
    name: String,
}

/// Body of single-metric create/update: the scopes plus the kind's own fields.
#[derive(Debug, Deserialize)]
struct MetricRequest {
    #[serde(default)]
    scopes: Vec<String>,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_metric_types(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ScopeQuery>,
) -> Result<Json<Vec<MetricTypeInfo>>> {
    enforce_api_key(&headers, &state.config)?;
    let ctx = CallContext::from_headers(&headers);
    let types = state
        .service
        .list_metric_types(&ctx, &[query.scope])
        .await?;
    Ok(Json(types))
}

async fn list_metrics(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ScopeQuery>,
) -> Result<Json<Vec<MetricSummary>>> {
    enforce_api_key(&headers, &state.config)?;
    let ctx = CallContext::from_headers(&headers);
    let metrics = state.service.list_metrics(&ctx, &[query.scope]).await?;
    Ok(Json(metrics))
}

async fn metric_config(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ConfigQuery>,
) -> Result<Json<MetricRecord>> {
    enforce_api_key(&headers, &state.config)?;
    let ctx = CallContext::from_headers(&headers);
    let kind = query
        .kind
        .parse::<MetricKind>()
        .ok()
        .or_else(|| MetricKind::from_slug(&query.kind))
        .ok_or_else(|| ServiceError::invalid(format!("unknown metric type '{}'", query.kind)))?;
    let record = state
        .service
        .metric_config(&ctx, &[query.scope], kind, &query.name)
        .await?;
    Ok(Json(record))
}

async fn import_metrics(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<MetricImportRequest>,
) -> Result<Json<MetricImportResponse>> {
    enforce_api_key(&headers, &state.config)?;
    let ctx = CallContext::from_headers(&headers);
    let response = state.service.import_metrics(&ctx, &request).await?;
    Ok(Json(response))
}

async fn create_metric(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    headers: HeaderMap,
    Json(request): Json<MetricRequest>,
) -> Result<(StatusCode, Json<MetricRecord>)> {
    enforce_api_key(&headers, &state.config)?;
    let ctx = CallContext::from_headers(&headers);
    let record = decode_record(&slug, request.fields)?;
    let created = state
        .service
        .create_metric(&ctx, &request.scopes, record)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_metric(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    headers: HeaderMap,
    Json(request): Json<MetricRequest>,
) -> Result<Json<UpdateMetricResponse>> {
    enforce_api_key(&headers, &state.config)?;
    let ctx = CallContext::from_headers(&headers);
    let record = decode_record(&slug, request.fields)?;
    let response = state
        .service
        .update_metric(&ctx, &request.scopes, record)
        .await?;
    Ok(Json(response))
}

fn decode_record(slug: &str, mut fields: Map<String, Value>) -> Result<MetricRecord> {
    let kind = MetricKind::from_slug(slug)
        .ok_or_else(|| ServiceError::invalid(format!("unknown metric type '{slug}'")))?;
    fields.insert("type".into(), Value::String(kind.token().to_string()));
    serde_json::from_value(Value::Object(fields))
        .map_err(|err| ServiceError::invalid(format!("invalid {kind} metric: {err}")))
}

fn enforce_api_key(headers: &HeaderMap, config: &AppConfig) -> Result<()> {
    if let Some(expected) = &config.api_key {
        let provided = headers
            .get(API_KEY_HEADER)
            .and_then(|value| value.to_str().ok());

        if provided != Some(expected.as_str()) {
            return Err(ServiceError::Unauthenticated);
        }
    }

    Ok(())
}
