use super::{MetricService, UpdateMetricResponse};
use crate::{
    auth::CallContext,
    error::{Result, ServiceError},
    models::{same_metric_name, ChainIds, CountingAttributeIds, MetricRecord},
    repository::RepoError,
    resolver::{EquipmentGraph, ResolveError},
};
use anyhow::anyhow;
use tracing::{error, info};

impl MetricService {
    /// Creates one metric configured by the caller. Stored with `default = false`.
    pub async fn create_metric(
        &self,
        ctx: &CallContext,
        scopes: &[String],
        mut record: MetricRecord,
    ) -> Result<MetricRecord> {
        let scope = ctx.authorize(scopes)?;
        check_fields(&record)?;
        record.trim_name();

        let existing = self.existing_metrics(scope, "create_metric").await?;
        if existing
            .iter()
            .any(|metric| same_metric_name(&metric.name, record.name()))
        {
            return Err(ServiceError::invalid("metric name already exists"));
        }

        self.resolve_references(scope, &mut record, "create_metric")
            .await?;
        record.set_id(String::new());
        record.set_default(false);

        match self.repo.create_metric(scope, record).await {
            Ok(created) => {
                info!(%scope, kind = %created.kind(), name = %created.name(), id = %created.id(), "metric created");
                Ok(created)
            }
            Err(RepoError::Duplicate(_)) => Err(ServiceError::invalid("metric name already exists")),
            Err(err) => {
                error!(%scope, error = ?err, "failed to create metric");
                Err(ServiceError::Internal(anyhow!("cannot create metric: {err}")))
            }
        }
    }

    /// Overwrites a caller-created metric in place. Imported metrics are read-only.
    pub async fn update_metric(
        &self,
        ctx: &CallContext,
        scopes: &[String],
        mut record: MetricRecord,
    ) -> Result<UpdateMetricResponse> {
        let scope = ctx.authorize(scopes)?;
        check_fields(&record)?;
        record.trim_name();

        let stored = match self.repo.get_metric(scope, record.kind(), record.name()).await {
            Ok(stored) => stored,
            Err(RepoError::NoData) => return Err(ServiceError::invalid("metric does not exist")),
            Err(err) => {
                error!(%scope, kind = %record.kind(), error = ?err, "failed to fetch metric");
                return Err(ServiceError::Internal(anyhow!("cannot fetch metric: {err}")));
            }
        };
        if stored.is_default() {
            return Err(ServiceError::invalid(
                "metric created by import, cannot be updated",
            ));
        }

        self.resolve_references(scope, &mut record, "update_metric")
            .await?;
        record.set_id(stored.id());
        record.set_default(false);

        match self.repo.update_metric(scope, &record).await {
            Ok(()) => {
                info!(%scope, kind = %record.kind(), name = %record.name(), "metric updated");
                Ok(UpdateMetricResponse { success: true })
            }
            Err(RepoError::NoData) => Err(ServiceError::invalid("metric does not exist")),
            Err(err) => {
                error!(%scope, kind = %record.kind(), error = ?err, "failed to update metric");
                Err(ServiceError::Internal(anyhow!("cannot update metric: {err}")))
            }
        }
    }

    /// Checks equipment-type and attribute references against the scope's graph, filling
    /// in resolved attribute definitions where the kind stores them.
    async fn resolve_references(
        &self,
        scope: &str,
        record: &mut MetricRecord,
        op: &'static str,
    ) -> Result<()> {
        match record {
            MetricRecord::OracleProcessor(ops) => {
                self.check_hierarchy(scope, &ops.chain, &ops.attributes, op)
                    .await
            }
            MetricRecord::OracleNup(nup) => {
                self.check_hierarchy(scope, &nup.chain, &nup.attributes, op)
                    .await
            }
            MetricRecord::AttributeSum(sum) => {
                let graph = self.attribute_graph(scope, op).await?;
                let attribute = graph
                    .summed_attribute(&sum.eq_type, &sum.attribute_name)
                    .map_err(reference_error)?;
                sum.attribute = Some(attribute);
                Ok(())
            }
            MetricRecord::AttributeCounter(acs) => {
                let graph = self.attribute_graph(scope, op).await?;
                let attribute = graph
                    .counted_attribute(&acs.eq_type, &acs.attribute_name, &acs.value)
                    .map_err(reference_error)?;
                acs.attribute = Some(attribute);
                Ok(())
            }
            MetricRecord::InstanceNumber(_)
            | MetricRecord::Static(_)
            | MetricRecord::MicrosoftSql(_)
            | MetricRecord::WindowsServer(_)
            | MetricRecord::UserNominative(_)
            | MetricRecord::UserConcurrent(_) => Ok(()),
        }
    }

    async fn check_hierarchy(
        &self,
        scope: &str,
        chain: &ChainIds,
        attributes: &CountingAttributeIds,
        op: &'static str,
    ) -> Result<()> {
        let internal = self.stored_equipment_types(scope, op).await?;
        let graph = EquipmentGraph::from_internal(internal);
        graph.validate_chain(chain).map_err(|err| match err {
            ResolveError::MissingEquipmentType(_) | ResolveError::Cycle(_) => {
                ServiceError::invalid("parent hierarchy doesnt exist")
            }
            other => ServiceError::invalid(other.to_string()),
        })?;
        graph
            .validate_counting_attributes(chain, attributes)
            .map_err(reference_error)
    }

    /// Directory names with stored typing, for the single-attribute kinds.
    async fn attribute_graph(&self, scope: &str, op: &'static str) -> Result<EquipmentGraph> {
        let external = self.directory_equipment_types(scope, op).await?;
        let internal = self.stored_equipment_types(scope, op).await?;
        Ok(EquipmentGraph::new(external, internal))
    }
}

fn reference_error(err: ResolveError) -> ServiceError {
    match err {
        ResolveError::UnknownEquipmentType(name) => {
            ServiceError::NotFound(format!("cannot find equipment type '{name}'"))
        }
        other => ServiceError::invalid(other.to_string()),
    }
}

/// Field-level checks that need no collaborator.
fn check_fields(record: &MetricRecord) -> Result<()> {
    if record.name().trim().is_empty() {
        return Err(ServiceError::invalid("metric name is empty"));
    }

    match record {
        MetricRecord::OracleProcessor(ops) => check_counting(&ops.chain, &ops.attributes),
        MetricRecord::OracleNup(nup) => {
            check_counting(&nup.chain, &nup.attributes)?;
            if nup.transform && nup.transform_metric_name.trim().is_empty() {
                return Err(ServiceError::invalid(
                    "transform metric name is required when transform is enabled",
                ));
            }
            Ok(())
        }
        MetricRecord::InstanceNumber(inm) => {
            if !inm.coefficient.is_finite() || inm.coefficient <= 0.0 {
                return Err(ServiceError::invalid("coefficient must be a positive number"));
            }
            Ok(())
        }
        MetricRecord::Static(ss) => {
            if ss.reference_value <= 0 {
                return Err(ServiceError::invalid("reference value must be positive"));
            }
            Ok(())
        }
        MetricRecord::AttributeSum(sum) => {
            require(&sum.eq_type, "equipment type is empty")?;
            require(&sum.attribute_name, "attribute name is empty")?;
            if !sum.reference_value.is_finite() || sum.reference_value <= 0.0 {
                return Err(ServiceError::invalid("reference value must be positive"));
            }
            Ok(())
        }
        MetricRecord::AttributeCounter(acs) => {
            require(&acs.eq_type, "equipment type is empty")?;
            require(&acs.attribute_name, "attribute name is empty")
        }
        MetricRecord::MicrosoftSql(core_cpu) | MetricRecord::WindowsServer(core_cpu) => {
            require(&core_cpu.reference, "reference is empty")?;
            require(&core_cpu.core, "core attribute is empty")?;
            require(&core_cpu.cpu, "cpu attribute is empty")
        }
        MetricRecord::UserNominative(user) | MetricRecord::UserConcurrent(user) => {
            require(&user.profile, "profile is empty")
        }
    }
}

fn check_counting(chain: &ChainIds, attributes: &CountingAttributeIds) -> Result<()> {
    require(&chain.start_eq_type_id, "start level is empty")?;
    require(&chain.base_eq_type_id, "base level is empty")?;
    require(&chain.aggregate_level_eq_type_id, "aggregate level is empty")?;
    require(&chain.end_eq_type_id, "end level is empty")?;
    require(&attributes.num_core_attr_id, "num of cores attribute is empty")?;
    require(&attributes.num_cpu_attr_id, "num of cpu attribute is empty")?;
    require(&attributes.core_factor_attr_id, "core factor attribute is empty")
}

fn require(value: &str, message: &'static str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ServiceError::invalid(message));
    }
    Ok(())
}
