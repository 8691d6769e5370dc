//! Default metric templates provisioned by metric import.
//!
//! A `TemplateCatalog` is built once at startup, either from the built-in table or from a
//! TOML file, and shared read-only afterwards. Templates reference equipment types and
//! attributes by name; names are resolved per scope at import time.

use crate::models::MetricKind;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, path::Path};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read template file: {0}")]
    ReadFile(#[from] std::io::Error),

    #[error("failed to parse template file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("template token '{0}' does not name a metric type")]
    UnknownToken(String),

    #[error("template '{token}' declares kind {declared} but the token is {expected}")]
    KindMismatch {
        token: String,
        declared: MetricKind,
        expected: MetricKind,
    },

    #[error("template '{0}' is defined twice")]
    Duplicate(String),

    #[error("template '{0}' has an empty metric name")]
    EmptyName(String),
}

/// Names of the four equipment-type levels of a hierarchical metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainNames {
    pub start: String,
    pub base: String,
    pub aggregate: String,
    pub end: String,
}

/// Names of the counting attributes on the base equipment type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountingAttributeNames {
    pub num_cores: String,
    pub num_cpus: String,
    pub core_factor: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TemplateSpec {
    OracleProcessor {
        chain: ChainNames,
        attributes: CountingAttributeNames,
    },
    OracleNup {
        chain: ChainNames,
        attributes: CountingAttributeNames,
        number_of_users: u32,
        #[serde(default)]
        transform: bool,
        #[serde(default)]
        transform_metric_name: String,
    },
    InstanceNumber {
        coefficient: f64,
    },
    Static {
        reference_value: i32,
    },
    AttributeSum {
        eq_type: String,
        attribute_name: String,
        reference_value: f64,
    },
    AttributeCounter {
        eq_type: String,
        attribute_name: String,
        value: String,
    },
    MicrosoftSql {
        reference: String,
        core: String,
        cpu: String,
    },
    WindowsServer {
        reference: String,
        core: String,
        cpu: String,
    },
    UserNominative {
        profile: String,
    },
    UserConcurrent {
        profile: String,
    },
}

impl TemplateSpec {
    pub fn kind(&self) -> MetricKind {
        match self {
            TemplateSpec::OracleProcessor { .. } => MetricKind::OracleProcessor,
            TemplateSpec::OracleNup { .. } => MetricKind::OracleNup,
            TemplateSpec::InstanceNumber { .. } => MetricKind::InstanceNumber,
            TemplateSpec::Static { .. } => MetricKind::Static,
            TemplateSpec::AttributeSum { .. } => MetricKind::AttributeSum,
            TemplateSpec::AttributeCounter { .. } => MetricKind::AttributeCounter,
            TemplateSpec::MicrosoftSql { .. } => MetricKind::MicrosoftSql,
            TemplateSpec::WindowsServer { .. } => MetricKind::WindowsServer,
            TemplateSpec::UserNominative { .. } => MetricKind::UserNominative,
            TemplateSpec::UserConcurrent { .. } => MetricKind::UserConcurrent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricTemplate {
    /// Import token, e.g. `oracle.processor.standard`.
    pub token: String,
    /// Name given to the metric created from this template.
    pub name: String,
    #[serde(flatten)]
    pub spec: TemplateSpec,
}

impl MetricTemplate {
    pub fn kind(&self) -> MetricKind {
        self.spec.kind()
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default, rename = "template")]
    templates: Vec<MetricTemplate>,
}

#[derive(Debug, Clone)]
pub struct TemplateCatalog {
    templates: BTreeMap<String, MetricTemplate>,
}

impl TemplateCatalog {
    pub fn new(templates: Vec<MetricTemplate>) -> Result<Self, CatalogError> {
        let mut by_token = BTreeMap::new();
        for template in templates {
            let expected = template
                .token
                .parse::<MetricKind>()
                .map_err(|_| CatalogError::UnknownToken(template.token.clone()))?;
            if template.kind() != expected {
                return Err(CatalogError::KindMismatch {
                    token: template.token,
                    declared: template.spec.kind(),
                    expected,
                });
            }
            if template.name.trim().is_empty() {
                return Err(CatalogError::EmptyName(template.token));
            }
            if by_token.contains_key(&template.token) {
                return Err(CatalogError::Duplicate(template.token));
            }
            by_token.insert(template.token.clone(), template);
        }

        Ok(Self {
            templates: by_token,
        })
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(raw)?;
        Self::new(file.templates)
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn get(&self, token: &str) -> Option<&MetricTemplate> {
        self.templates.get(token)
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// The default set shipped with the service, one template per metric kind.
    pub fn builtin() -> Self {
        let chain = ChainNames {
            start: "virtualmachine".into(),
            base: "server".into(),
            aggregate: "cluster".into(),
            end: "vcenter".into(),
        };
        let attributes = CountingAttributeNames {
            num_cores: "cores_per_processor".into(),
            num_cpus: "server_processors_numbers".into(),
            core_factor: "corefactor_oracle".into(),
        };

        let templates = [
            template(
                MetricKind::OracleProcessor,
                "oracle.processor.standard",
                TemplateSpec::OracleProcessor {
                    chain: chain.clone(),
                    attributes: attributes.clone(),
                },
            ),
            template(
                MetricKind::OracleNup,
                "oracle.nup.standard",
                TemplateSpec::OracleNup {
                    chain,
                    attributes,
                    number_of_users: 25,
                    transform: false,
                    transform_metric_name: String::new(),
                },
            ),
            template(
                MetricKind::InstanceNumber,
                "instance.number.standard",
                TemplateSpec::InstanceNumber { coefficient: 1.0 },
            ),
            template(
                MetricKind::Static,
                "static.standard",
                TemplateSpec::Static { reference_value: 1 },
            ),
            template(
                MetricKind::AttributeSum,
                "attribute.sum.standard",
                TemplateSpec::AttributeSum {
                    eq_type: "server".into(),
                    attribute_name: "cores_per_processor".into(),
                    reference_value: 1.0,
                },
            ),
            template(
                MetricKind::AttributeCounter,
                "attribute.counter.standard",
                TemplateSpec::AttributeCounter {
                    eq_type: "server".into(),
                    attribute_name: "environment".into(),
                    value: "Production".into(),
                },
            ),
            template(
                MetricKind::MicrosoftSql,
                "microsoft.sql.standard.2019",
                TemplateSpec::MicrosoftSql {
                    reference: "server".into(),
                    core: "cores_per_processor".into(),
                    cpu: "server_processors_numbers".into(),
                },
            ),
            template(
                MetricKind::WindowsServer,
                "windows.server.standard.2016",
                TemplateSpec::WindowsServer {
                    reference: "server".into(),
                    core: "cores_per_processor".into(),
                    cpu: "server_processors_numbers".into(),
                },
            ),
            template(
                MetricKind::UserNominative,
                "user.nominative.standard",
                TemplateSpec::UserNominative {
                    profile: "All".into(),
                },
            ),
            template(
                MetricKind::UserConcurrent,
                "user.concurrent.standard",
                TemplateSpec::UserConcurrent {
                    profile: "All".into(),
                },
            ),
        ];

        Self {
            templates: templates
                .into_iter()
                .map(|template| (template.token.clone(), template))
                .collect(),
        }
    }
}

fn template(kind: MetricKind, name: &str, spec: TemplateSpec) -> MetricTemplate {
    MetricTemplate {
        token: kind.token().to_string(),
        name: name.to_string(),
        spec,
    }
}
