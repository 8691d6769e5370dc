#![allow(dead_code)]

pub mod harness;

use anyhow::anyhow;
use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{self, StatusCode},
    Router,
};
use metric_service::{
    auth::{CallContext, Claims, Role},
    catalog::TemplateCatalog,
    config::AppConfig,
    directory::DirectoryConfig,
    models::{
        DataType, EquipmentTypeExternal, EquipmentTypeInternal, ExternalAttribute,
        InternalAttribute, MetricInfo, MetricKind, MetricRecord, same_metric_name,
    },
    repository::{DirectoryError, EquipmentDirectory, MetricRepository, RepoError, RepoResult},
    server,
    service::MetricService,
    state::AppState,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

pub const SCOPE: &str = "Scope1";
pub const API_KEY: &str = "test-api-key";

/// How a fake collaborator call should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    NoData,
    Storage,
}

impl Failure {
    fn into_repo_error(self) -> RepoError {
        match self {
            Failure::NoData => RepoError::NoData,
            Failure::Storage => RepoError::Other(anyhow!("connection reset by peer")),
        }
    }
}

#[derive(Default)]
struct RepoInner {
    metrics: Vec<(String, MetricRecord)>,
    equipment_types: Vec<(String, EquipmentTypeInternal)>,
    list_failure: Option<Failure>,
    types_failure: Option<Failure>,
    get_failure: Option<Failure>,
    /// Fails the nth create (1-based) with a storage error.
    fail_create_at: Option<usize>,
    next_id: usize,
}

/// In-memory `MetricRepository` recording every call.
#[derive(Default)]
pub struct FakeRepository {
    inner: Mutex<RepoInner>,
    pub list_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
    pub get_calls: AtomicUsize,
    pub type_calls: AtomicUsize,
}

impl FakeRepository {
    pub fn with_graph(scope: &str, graph: Vec<EquipmentTypeInternal>) -> Self {
        let repo = Self::default();
        repo.inner.lock().equipment_types = graph
            .into_iter()
            .map(|eq_type| (scope.to_string(), eq_type))
            .collect();
        repo
    }

    pub fn seed(&self, scope: &str, record: MetricRecord) {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let mut record = record;
        record.set_id(format!("seed-{}", inner.next_id));
        inner.metrics.push((scope.to_string(), record));
    }

    pub fn fail_list(&self, failure: Failure) {
        self.inner.lock().list_failure = Some(failure);
    }

    pub fn fail_types(&self, failure: Failure) {
        self.inner.lock().types_failure = Some(failure);
    }

    pub fn fail_get(&self, failure: Failure) {
        self.inner.lock().get_failure = Some(failure);
    }

    pub fn fail_create_at(&self, nth: usize) {
        self.inner.lock().fail_create_at = Some(nth);
    }

    pub fn records(&self, scope: &str) -> Vec<MetricRecord> {
        self.inner
            .lock()
            .metrics
            .iter()
            .filter(|(owner, _)| owner == scope)
            .map(|(_, record)| record.clone())
            .collect()
    }

    pub fn records_of(&self, scope: &str, kind: MetricKind) -> Vec<MetricRecord> {
        self.records(scope)
            .into_iter()
            .filter(|record| record.kind() == kind)
            .collect()
    }

    pub fn creates(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
            + self.create_calls.load(Ordering::SeqCst)
            + self.update_calls.load(Ordering::SeqCst)
            + self.get_calls.load(Ordering::SeqCst)
            + self.type_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetricRepository for FakeRepository {
    async fn list_metrics(&self, scope: &str) -> RepoResult<Vec<MetricInfo>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.lock();
        if let Some(failure) = inner.list_failure {
            return Err(failure.into_repo_error());
        }
        let metrics: Vec<MetricInfo> = inner
            .metrics
            .iter()
            .filter(|(owner, _)| owner == scope)
            .map(|(_, record)| record.info())
            .collect();
        if metrics.is_empty() {
            return Err(RepoError::NoData);
        }
        Ok(metrics)
    }

    async fn create_metric(&self, scope: &str, mut record: MetricRecord) -> RepoResult<MetricRecord> {
        let call = self.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let mut inner = self.inner.lock();
        if inner.fail_create_at == Some(call) {
            return Err(RepoError::Other(anyhow!("disk full")));
        }
        if inner
            .metrics
            .iter()
            .any(|(owner, stored)| owner == scope && same_metric_name(stored.name(), record.name()))
        {
            return Err(RepoError::Duplicate(record.name().to_string()));
        }
        inner.next_id += 1;
        record.set_id(format!("m-{}", inner.next_id));
        inner.metrics.push((scope.to_string(), record.clone()));
        Ok(record)
    }

    async fn update_metric(&self, scope: &str, record: &MetricRecord) -> RepoResult<()> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let mut inner = self.inner.lock();
        let stored = inner.metrics.iter_mut().find(|(owner, stored)| {
            owner == scope
                && stored.kind() == record.kind()
                && same_metric_name(stored.name(), record.name())
        });
        match stored {
            Some((_, stored)) => {
                *stored = record.clone();
                Ok(())
            }
            None => Err(RepoError::NoData),
        }
    }

    async fn get_metric(
        &self,
        scope: &str,
        kind: MetricKind,
        name: &str,
    ) -> RepoResult<MetricRecord> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.lock();
        if let Some(failure) = inner.get_failure {
            return Err(failure.into_repo_error());
        }
        inner
            .metrics
            .iter()
            .find(|(owner, stored)| {
                owner == scope && stored.kind() == kind && same_metric_name(stored.name(), name)
            })
            .map(|(_, stored)| stored.clone())
            .ok_or(RepoError::NoData)
    }

    async fn equipment_types(&self, scope: &str) -> RepoResult<Vec<EquipmentTypeInternal>> {
        self.type_calls.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.lock();
        if let Some(failure) = inner.types_failure {
            return Err(failure.into_repo_error());
        }
        let types: Vec<EquipmentTypeInternal> = inner
            .equipment_types
            .iter()
            .filter(|(owner, _)| owner == scope)
            .map(|(_, eq_type)| eq_type.clone())
            .collect();
        if types.is_empty() {
            return Err(RepoError::NoData);
        }
        Ok(types)
    }
}

/// In-memory equipment directory returning a fixed graph.
#[derive(Default)]
pub struct FakeDirectory {
    types: Vec<EquipmentTypeExternal>,
    failing: bool,
    pub calls: AtomicUsize,
    pub requested_scopes: Mutex<Vec<Vec<String>>>,
}

impl FakeDirectory {
    pub fn new(types: Vec<EquipmentTypeExternal>) -> Self {
        Self {
            types,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EquipmentDirectory for FakeDirectory {
    async fn equipment_types(
        &self,
        scopes: &[String],
    ) -> Result<Vec<EquipmentTypeExternal>, DirectoryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested_scopes.lock().push(scopes.to_vec());
        if self.failing {
            return Err(DirectoryError::Status(503));
        }
        Ok(self.types.clone())
    }
}

pub fn external_attr(id: &str, name: &str, data_type: DataType) -> ExternalAttribute {
    ExternalAttribute {
        id: id.into(),
        name: name.into(),
        data_type,
        primary_key: false,
        displayed: true,
        searchable: true,
        parent_identifier: false,
        mapped_to: String::new(),
    }
}

pub fn external_type(
    id: &str,
    name: &str,
    parent: Option<(&str, &str)>,
    attributes: Vec<ExternalAttribute>,
) -> EquipmentTypeExternal {
    let (parent_id, parent_type) = parent.unwrap_or(("", ""));
    EquipmentTypeExternal {
        id: id.into(),
        type_name: name.into(),
        parent_id: parent_id.into(),
        parent_type: parent_type.into(),
        attributes,
    }
}

pub fn internal_type(
    id: &str,
    parent: Option<&str>,
    attributes: &[(&str, DataType)],
) -> EquipmentTypeInternal {
    EquipmentTypeInternal {
        id: id.into(),
        parent_id: parent.map(Into::into),
        attributes: attributes
            .iter()
            .map(|(id, data_type)| InternalAttribute {
                id: (*id).into(),
                data_type: *data_type,
            })
            .collect(),
    }
}

fn server_attributes() -> Vec<ExternalAttribute> {
    vec![
        external_attr("a1", "cores_per_processor", DataType::Int),
        external_attr("a2", "server_processors_numbers", DataType::Int),
        external_attr("a3", "corefactor_oracle", DataType::Float),
        external_attr("a4", "environment", DataType::String),
    ]
}

/// virtualmachine(e1) -> server(e2) -> cluster(e3) -> vcenter(e4), as the directory sees it.
/// The virtual machine also carries an `environment` attribute with a different id.
pub fn vcenter_directory() -> Vec<EquipmentTypeExternal> {
    vec![
        external_type(
            "e1",
            "virtualmachine",
            Some(("e2", "server")),
            vec![external_attr("a9", "environment", DataType::String)],
        ),
        external_type("e2", "server", Some(("e3", "cluster")), server_attributes()),
        external_type("e3", "cluster", Some(("e4", "vcenter")), Vec::new()),
        external_type("e4", "vcenter", None, Vec::new()),
    ]
}

/// Stored parentage and typing matching `vcenter_directory`.
pub fn vcenter_store() -> Vec<EquipmentTypeInternal> {
    vec![
        internal_type("e1", Some("e2"), &[("a9", DataType::String)]),
        internal_type(
            "e2",
            Some("e3"),
            &[
                ("a1", DataType::Int),
                ("a2", DataType::Int),
                ("a3", DataType::Float),
                ("a4", DataType::String),
            ],
        ),
        internal_type("e3", Some("e4"), &[]),
        internal_type("e4", None, &[]),
    ]
}

pub fn claims(role: Role, scopes: &[&str]) -> Claims {
    Claims {
        user_id: "admin@test.com".into(),
        role,
        scopes: scopes.iter().map(|scope| scope.to_string()).collect(),
    }
}

pub fn admin() -> CallContext {
    CallContext::new(claims(Role::Admin, &[SCOPE, "Scope2"]))
}

pub fn super_admin() -> CallContext {
    CallContext::new(claims(Role::SuperAdmin, &[SCOPE]))
}

pub fn user() -> CallContext {
    CallContext::new(claims(Role::User, &[SCOPE]))
}

pub fn scopes() -> Vec<String> {
    vec![SCOPE.to_string()]
}

pub struct Fixture {
    pub repo: Arc<FakeRepository>,
    pub directory: Arc<FakeDirectory>,
    pub service: MetricService,
}

impl Fixture {
    pub fn new(repo: FakeRepository, directory: FakeDirectory) -> Self {
        Self::with_catalog(repo, directory, TemplateCatalog::builtin())
    }

    pub fn with_catalog(
        repo: FakeRepository,
        directory: FakeDirectory,
        catalog: TemplateCatalog,
    ) -> Self {
        let repo = Arc::new(repo);
        let directory = Arc::new(directory);
        let service = MetricService::new(
            repo.clone() as Arc<dyn MetricRepository>,
            directory.clone() as Arc<dyn EquipmentDirectory>,
            Arc::new(catalog),
        );
        Self {
            repo,
            directory,
            service,
        }
    }

    /// Both graph sources describe the vcenter hierarchy for `SCOPE`.
    pub fn vcenter() -> Self {
        Self::new(
            FakeRepository::with_graph(SCOPE, vcenter_store()),
            FakeDirectory::new(vcenter_directory()),
        )
    }

    pub fn router(&self, api_key: Option<&str>) -> Router {
        let config = AppConfig {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            database_url: "postgres://unused".into(),
            max_pool_size: 1,
            pg_ssl_root_cert: None,
            pg_ssl_cert: None,
            pg_ssl_key: None,
            api_key: api_key.map(str::to_string),
            directory: DirectoryConfig {
                url: "http://equipment.invalid".into(),
                timeout: Duration::from_secs(1),
            },
            templates_path: None,
        };
        server::router(AppState::new(Arc::new(config), self.service.clone()))
    }
}

pub async fn read_json(response: http::Response<Body>) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("response body should be readable");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice::<Value>(&bytes).expect("response body should be valid JSON")
    };
    (status, value)
}
