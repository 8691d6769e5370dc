use super::{MetricImportRequest, MetricImportResponse, MetricService};
use crate::{
    auth::CallContext,
    catalog::{MetricTemplate, TemplateSpec},
    error::{Result, ServiceError},
    models::{
        same_metric_name, MetricAcs, MetricAttrSum, MetricCoreCpu, MetricInm, MetricNup,
        MetricOps, MetricRecord, MetricSs, MetricUserProfile,
    },
    repository::RepoError,
    resolver::{EquipmentGraph, ResolveError},
};
use anyhow::anyhow;
use std::slice;
use tracing::{error, info, warn};

impl MetricService {
    /// Provisions the default metric of every requested template in `request.scope`.
    ///
    /// Tokens are processed in order and the call stops at the first failure. Metrics
    /// created for earlier tokens stay in place. A template whose metric name already
    /// exists in the scope is skipped.
    pub async fn import_metrics(
        &self,
        ctx: &CallContext,
        request: &MetricImportRequest,
    ) -> Result<MetricImportResponse> {
        let scope = ctx.authorize_admin(slice::from_ref(&request.scope))?;

        let external = self.directory_equipment_types(scope, "import_metrics").await?;
        let internal = self.stored_equipment_types(scope, "import_metrics").await?;
        let graph = EquipmentGraph::new(external, internal);

        for token in &request.metrics {
            let template = self.catalog.get(token).ok_or_else(|| {
                warn!(%scope, %token, "import requested an unknown metric type");
                ServiceError::invalid(format!("unknown metric type '{token}'"))
            })?;

            let existing = self.existing_metrics(scope, "import_metrics").await?;
            if existing
                .iter()
                .any(|metric| same_metric_name(&metric.name, &template.name))
            {
                info!(%scope, %token, name = %template.name, "skipped, already exists");
                continue;
            }

            let record = build_record(template, &graph).map_err(|err| {
                error!(%scope, %token, error = %err, "failed to resolve metric template");
                ServiceError::Internal(anyhow!("cannot resolve template {token}: {err}"))
            })?;

            match self.repo.create_metric(scope, record).await {
                Ok(created) => {
                    info!(%scope, %token, name = %created.name(), id = %created.id(), "created");
                }
                Err(RepoError::Duplicate(name)) => {
                    info!(%scope, %token, %name, "skipped, created concurrently");
                }
                Err(err) => {
                    error!(%scope, %token, error = ?err, "failed to create imported metric");
                    return Err(ServiceError::Internal(anyhow!(
                        "cannot create metric for {token}: {err}"
                    )));
                }
            }
        }

        Ok(MetricImportResponse { success: true })
    }
}

/// Builds the default-flagged record for `template`, resolving named equipment types and
/// attributes against the scope's graph.
pub fn build_record(
    template: &MetricTemplate,
    graph: &EquipmentGraph,
) -> std::result::Result<MetricRecord, ResolveError> {
    let name = template.name.clone();
    let record = match &template.spec {
        TemplateSpec::OracleProcessor { chain, attributes } => {
            let chain = graph.resolve_chain(chain)?;
            let attributes = graph.resolve_counting_attributes(&chain, attributes)?;
            MetricRecord::OracleProcessor(MetricOps {
                id: String::new(),
                name,
                chain,
                attributes,
                default: true,
            })
        }
        TemplateSpec::OracleNup {
            chain,
            attributes,
            number_of_users,
            transform,
            transform_metric_name,
        } => {
            let chain = graph.resolve_chain(chain)?;
            let attributes = graph.resolve_counting_attributes(&chain, attributes)?;
            MetricRecord::OracleNup(MetricNup {
                id: String::new(),
                name,
                chain,
                attributes,
                number_of_users: *number_of_users,
                transform: *transform,
                transform_metric_name: transform_metric_name.clone(),
                default: true,
            })
        }
        TemplateSpec::InstanceNumber { coefficient } => MetricRecord::InstanceNumber(MetricInm {
            id: String::new(),
            name,
            coefficient: *coefficient,
            default: true,
        }),
        TemplateSpec::Static { reference_value } => MetricRecord::Static(MetricSs {
            id: String::new(),
            name,
            reference_value: *reference_value,
            default: true,
        }),
        TemplateSpec::AttributeSum {
            eq_type,
            attribute_name,
            reference_value,
        } => {
            let attribute = graph.summed_attribute(eq_type, attribute_name)?;
            MetricRecord::AttributeSum(MetricAttrSum {
                id: String::new(),
                name,
                eq_type: eq_type.clone(),
                attribute_name: attribute_name.clone(),
                reference_value: *reference_value,
                attribute: Some(attribute),
                default: true,
            })
        }
        TemplateSpec::AttributeCounter {
            eq_type,
            attribute_name,
            value,
        } => {
            let attribute = graph.counted_attribute(eq_type, attribute_name, value)?;
            MetricRecord::AttributeCounter(MetricAcs {
                id: String::new(),
                name,
                eq_type: eq_type.clone(),
                attribute_name: attribute_name.clone(),
                value: value.clone(),
                attribute: Some(attribute),
                default: true,
            })
        }
        // Names are stored as-is and resolved at evaluation time.
        TemplateSpec::MicrosoftSql {
            reference,
            core,
            cpu,
        } => MetricRecord::MicrosoftSql(core_cpu(name, reference, core, cpu)),
        TemplateSpec::WindowsServer {
            reference,
            core,
            cpu,
        } => MetricRecord::WindowsServer(core_cpu(name, reference, core, cpu)),
        TemplateSpec::UserNominative { profile } => {
            MetricRecord::UserNominative(user_profile(name, profile))
        }
        TemplateSpec::UserConcurrent { profile } => {
            MetricRecord::UserConcurrent(user_profile(name, profile))
        }
    };

    Ok(record)
}

fn core_cpu(name: String, reference: &str, core: &str, cpu: &str) -> MetricCoreCpu {
    MetricCoreCpu {
        id: String::new(),
        name,
        reference: reference.to_string(),
        core: core.to_string(),
        cpu: cpu.to_string(),
        default: true,
    }
}

fn user_profile(name: String, profile: &str) -> MetricUserProfile {
    MetricUserProfile {
        id: String::new(),
        name,
        profile: profile.to_string(),
        default: true,
    }
}
