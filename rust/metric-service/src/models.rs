//! Equipment topology and metric configuration records.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    #[serde(alias = "STRING")]
    String,
    #[serde(alias = "INT")]
    Int,
    #[serde(alias = "FLOAT")]
    Float,
}

impl DataType {
    pub fn is_numeric(self) -> bool {
        matches!(self, DataType::Int | DataType::Float)
    }

    /// Whether `value` can be stored in an attribute of this type.
    pub fn accepts(self, value: &str) -> bool {
        let value = value.trim();
        match self {
            DataType::String => true,
            DataType::Int => value.parse::<i64>().is_ok(),
            DataType::Float => value.parse::<f64>().is_ok(),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::String => "string",
            DataType::Int => "int",
            DataType::Float => "float",
        };
        f.write_str(name)
    }
}

/// Attribute of an equipment type as published by the equipment directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalAttribute {
    pub id: String,
    pub name: String,
    pub data_type: DataType,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub displayed: bool,
    #[serde(default)]
    pub searchable: bool,
    #[serde(default)]
    pub parent_identifier: bool,
    #[serde(default)]
    pub mapped_to: String,
}

/// Equipment type as known to the inventory (directory) service. Authoritative for names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipmentTypeExternal {
    pub id: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub parent_id: String,
    #[serde(default)]
    pub parent_type: String,
    #[serde(default)]
    pub attributes: Vec<ExternalAttribute>,
}

impl EquipmentTypeExternal {
    pub fn attribute_by_name(&self, name: &str) -> Option<&ExternalAttribute> {
        self.attributes.iter().find(|attr| attr.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InternalAttribute {
    pub id: String,
    pub data_type: DataType,
}

/// Equipment type as stored for the scope. Authoritative for parent links and attribute typing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipmentTypeInternal {
    pub id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub attributes: Vec<InternalAttribute>,
}

impl EquipmentTypeInternal {
    pub fn parent(&self) -> Option<&str> {
        self.parent_id.as_deref().filter(|id| !id.is_empty())
    }

    pub fn attribute(&self, id: &str) -> Option<&InternalAttribute> {
        self.attributes.iter().find(|attr| attr.id == id)
    }
}

#[derive(Debug, Error)]
#[error("unknown metric type '{0}'")]
pub struct UnknownMetricKind(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MetricKind {
    #[serde(rename = "oracle.processor.standard")]
    OracleProcessor,
    #[serde(rename = "oracle.nup.standard")]
    OracleNup,
    #[serde(rename = "instance.number.standard")]
    InstanceNumber,
    #[serde(rename = "static.standard")]
    Static,
    #[serde(rename = "attribute.sum.standard")]
    AttributeSum,
    #[serde(rename = "attribute.counter.standard")]
    AttributeCounter,
    #[serde(rename = "microsoft.sql.standard")]
    MicrosoftSql,
    #[serde(rename = "windows.server.standard")]
    WindowsServer,
    #[serde(rename = "user.nominative.standard")]
    UserNominative,
    #[serde(rename = "user.concurrent.standard")]
    UserConcurrent,
}

impl MetricKind {
    pub const ALL: [MetricKind; 10] = [
        MetricKind::OracleProcessor,
        MetricKind::OracleNup,
        MetricKind::InstanceNumber,
        MetricKind::Static,
        MetricKind::AttributeSum,
        MetricKind::AttributeCounter,
        MetricKind::MicrosoftSql,
        MetricKind::WindowsServer,
        MetricKind::UserNominative,
        MetricKind::UserConcurrent,
    ];

    pub fn token(self) -> &'static str {
        match self {
            MetricKind::OracleProcessor => "oracle.processor.standard",
            MetricKind::OracleNup => "oracle.nup.standard",
            MetricKind::InstanceNumber => "instance.number.standard",
            MetricKind::Static => "static.standard",
            MetricKind::AttributeSum => "attribute.sum.standard",
            MetricKind::AttributeCounter => "attribute.counter.standard",
            MetricKind::MicrosoftSql => "microsoft.sql.standard",
            MetricKind::WindowsServer => "windows.server.standard",
            MetricKind::UserNominative => "user.nominative.standard",
            MetricKind::UserConcurrent => "user.concurrent.standard",
        }
    }

    /// Short form used in URLs (`/api/v1/metric/ops`).
    pub fn slug(self) -> &'static str {
        match self {
            MetricKind::OracleProcessor => "ops",
            MetricKind::OracleNup => "nup",
            MetricKind::InstanceNumber => "inm",
            MetricKind::Static => "ss",
            MetricKind::AttributeSum => "attr_sum",
            MetricKind::AttributeCounter => "acs",
            MetricKind::MicrosoftSql => "sql",
            MetricKind::WindowsServer => "wss",
            MetricKind::UserNominative => "uns",
            MetricKind::UserConcurrent => "ucs",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.slug() == slug)
    }

    pub fn description(self) -> &'static str {
        match self {
            MetricKind::OracleProcessor => {
                "Number of processor licenses required = CPU nb x Core(per CPU) nb x CoreFactor"
            }
            MetricKind::OracleNup => {
                "Named User Plus licenses required = MAX(A,B) : A = CPU nb x Core(per CPU) nb x CoreFactor x minimum number of NUP per processor, B = total number of current users with access to the Oracle product"
            }
            MetricKind::InstanceNumber => {
                "Number of instances where the product has been installed multiplied by a coefficient"
            }
            MetricKind::Static => "Number of licenses required = fixed reference value",
            MetricKind::AttributeSum => {
                "Number of licenses required = sum of an attribute over equipments of a type divided by a reference value"
            }
            MetricKind::AttributeCounter => {
                "Number of licenses required = number of equipments of a type whose attribute has a specific value"
            }
            MetricKind::MicrosoftSql => {
                "Number of licenses required = cores per server rounded to core packs, per SQL Server installation"
            }
            MetricKind::WindowsServer => {
                "Number of licenses required = cores per server rounded to core packs, per Windows Server installation"
            }
            MetricKind::UserNominative => "Number of licenses required = number of named users of the profile",
            MetricKind::UserConcurrent => {
                "Number of licenses required = number of concurrent users of the profile"
            }
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for MetricKind {
    type Err = UnknownMetricKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.token() == s)
            .ok_or_else(|| UnknownMetricKind(s.to_string()))
    }
}

/// Summary of a metric already configured in a scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricInfo {
    pub name: String,
    pub kind: MetricKind,
}

/// Metric names are unique per scope regardless of case and surrounding whitespace.
pub fn same_metric_name(lhs: &str, rhs: &str) -> bool {
    lhs.trim().eq_ignore_ascii_case(rhs.trim())
}

/// Equipment types a hierarchical metric aggregates over, most specific first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainIds {
    pub start_eq_type_id: String,
    pub base_eq_type_id: String,
    pub aggregate_level_eq_type_id: String,
    pub end_eq_type_id: String,
}

/// Attributes of the base equipment type used to count processors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountingAttributeIds {
    pub num_core_attr_id: String,
    pub num_cpu_attr_id: String,
    pub core_factor_attr_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricOps {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub chain: ChainIds,
    #[serde(flatten)]
    pub attributes: CountingAttributeIds,
    #[serde(default)]
    pub default: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricNup {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub chain: ChainIds,
    #[serde(flatten)]
    pub attributes: CountingAttributeIds,
    pub number_of_users: u32,
    #[serde(default)]
    pub transform: bool,
    #[serde(default)]
    pub transform_metric_name: String,
    #[serde(default)]
    pub default: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricInm {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub coefficient: f64,
    #[serde(default)]
    pub default: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSs {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub reference_value: i32,
    #[serde(default)]
    pub default: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricAttrSum {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub eq_type: String,
    pub attribute_name: String,
    pub reference_value: f64,
    /// Full definition of the summed attribute, filled in when the metric is stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<ExternalAttribute>,
    #[serde(default)]
    pub default: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricAcs {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub eq_type: String,
    pub attribute_name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<ExternalAttribute>,
    #[serde(default)]
    pub default: bool,
}

/// Shared shape of the SQL Server and Windows Server metrics. Names are kept as names and
/// resolved by the evaluation engine at query time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricCoreCpu {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub reference: String,
    pub core: String,
    pub cpu: String,
    #[serde(default)]
    pub default: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricUserProfile {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub profile: String,
    #[serde(default)]
    pub default: bool,
}

/// Persisted configuration of one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MetricRecord {
    #[serde(rename = "oracle.processor.standard")]
    OracleProcessor(MetricOps),
    #[serde(rename = "oracle.nup.standard")]
    OracleNup(MetricNup),
    #[serde(rename = "instance.number.standard")]
    InstanceNumber(MetricInm),
    #[serde(rename = "static.standard")]
    Static(MetricSs),
    #[serde(rename = "attribute.sum.standard")]
    AttributeSum(MetricAttrSum),
    #[serde(rename = "attribute.counter.standard")]
    AttributeCounter(MetricAcs),
    #[serde(rename = "microsoft.sql.standard")]
    MicrosoftSql(MetricCoreCpu),
    #[serde(rename = "windows.server.standard")]
    WindowsServer(MetricCoreCpu),
    #[serde(rename = "user.nominative.standard")]
    UserNominative(MetricUserProfile),
    #[serde(rename = "user.concurrent.standard")]
    UserConcurrent(MetricUserProfile),
}

macro_rules! with_metric {
    ($record:expr, $inner:ident => $body:expr) => {
        match $record {
            MetricRecord::OracleProcessor($inner) => $body,
            MetricRecord::OracleNup($inner) => $body,
            MetricRecord::InstanceNumber($inner) => $body,
            MetricRecord::Static($inner) => $body,
            MetricRecord::AttributeSum($inner) => $body,
            MetricRecord::AttributeCounter($inner) => $body,
            MetricRecord::MicrosoftSql($inner) => $body,
            MetricRecord::WindowsServer($inner) => $body,
            MetricRecord::UserNominative($inner) => $body,
            MetricRecord::UserConcurrent($inner) => $body,
        }
    };
}

impl MetricRecord {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricRecord::OracleProcessor(_) => MetricKind::OracleProcessor,
            MetricRecord::OracleNup(_) => MetricKind::OracleNup,
            MetricRecord::InstanceNumber(_) => MetricKind::InstanceNumber,
            MetricRecord::Static(_) => MetricKind::Static,
            MetricRecord::AttributeSum(_) => MetricKind::AttributeSum,
            MetricRecord::AttributeCounter(_) => MetricKind::AttributeCounter,
            MetricRecord::MicrosoftSql(_) => MetricKind::MicrosoftSql,
            MetricRecord::WindowsServer(_) => MetricKind::WindowsServer,
            MetricRecord::UserNominative(_) => MetricKind::UserNominative,
            MetricRecord::UserConcurrent(_) => MetricKind::UserConcurrent,
        }
    }

    pub fn id(&self) -> &str {
        with_metric!(self, metric => metric.id.as_str())
    }

    pub fn name(&self) -> &str {
        with_metric!(self, metric => metric.name.as_str())
    }

    pub fn is_default(&self) -> bool {
        with_metric!(self, metric => metric.default)
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        let id = id.into();
        with_metric!(self, metric => metric.id = id)
    }

    /// Drops surrounding whitespace from the name, the form metric names are stored in.
    pub fn trim_name(&mut self) {
        with_metric!(self, metric => {
            let trimmed = metric.name.trim();
            if trimmed.len() != metric.name.len() {
                metric.name = trimmed.to_string();
            }
        })
    }

    pub fn set_default(&mut self, default: bool) {
        with_metric!(self, metric => metric.default = default)
    }

    pub fn info(&self) -> MetricInfo {
        MetricInfo {
            name: self.name().to_string(),
            kind: self.kind(),
        }
    }
}
