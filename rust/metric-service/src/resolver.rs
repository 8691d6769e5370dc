//! Name resolution and hierarchy walks over a scope's equipment-type graph.
//!
//! The directory view (`EquipmentTypeExternal`) is the only source of human-readable
//! names; the stored view (`EquipmentTypeInternal`) is the only source of parent links
//! and attribute typing. Both are keyed by the same identifiers.

use crate::{
    catalog::{ChainNames, CountingAttributeNames},
    models::{
        ChainIds, CountingAttributeIds, DataType, EquipmentTypeExternal, EquipmentTypeInternal,
        ExternalAttribute,
    },
};
use std::{
    collections::{HashMap, HashSet},
    fmt,
};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainLevel {
    Base,
    Aggregate,
    End,
}

impl fmt::Display for ChainLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self {
            ChainLevel::Base => "base",
            ChainLevel::Aggregate => "aggregate",
            ChainLevel::End => "end",
        };
        f.write_str(level)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolveError {
    #[error("equipment type '{0}' is not known to the equipment directory")]
    UnknownEquipmentType(String),

    #[error("equipment type name '{0}' is used by more than one directory entry")]
    AmbiguousEquipmentType(String),

    #[error("attribute '{attribute}' is not declared on equipment type '{eq_type}'")]
    UnknownAttribute { eq_type: String, attribute: String },

    #[error("equipment type '{0}' is missing from the stored equipment graph")]
    MissingEquipmentType(String),

    #[error("parent '{parent}' of equipment type '{child}' is missing from the stored equipment graph")]
    BrokenHierarchy { child: String, parent: String },

    #[error("equipment hierarchy above '{0}' contains a cycle")]
    Cycle(String),

    #[error("{level} level equipment type '{id}' is not on the ancestor chain in the expected order")]
    NotInChain { level: ChainLevel, id: String },

    #[error("attribute '{id}' is not declared on base equipment type '{eq_type}'")]
    AttributeNotOnBase { eq_type: String, id: String },

    #[error("attribute '{id}' of equipment type '{eq_type}' is missing from the stored equipment graph")]
    UnstoredAttribute { eq_type: String, id: String },

    #[error("attribute '{id}' has type {data_type}, expected int or float")]
    NonNumericAttribute { id: String, data_type: DataType },

    #[error("value '{value}' is not a valid {data_type} for attribute '{attribute}'")]
    ValueMismatch {
        attribute: String,
        data_type: DataType,
        value: String,
    },
}

/// Merged view of both equipment graph sources for one scope. Built per call.
#[derive(Debug, Default)]
pub struct EquipmentGraph {
    external: HashMap<String, EquipmentTypeExternal>,
    internal: HashMap<String, EquipmentTypeInternal>,
    type_ids: HashMap<String, String>,
    ambiguous: HashSet<String>,
}

impl EquipmentGraph {
    pub fn new(external: Vec<EquipmentTypeExternal>, internal: Vec<EquipmentTypeInternal>) -> Self {
        let mut type_ids = HashMap::with_capacity(external.len());
        let mut ambiguous = HashSet::new();
        for eq_type in &external {
            if let Some(previous) = type_ids.insert(eq_type.type_name.clone(), eq_type.id.clone()) {
                if previous != eq_type.id {
                    ambiguous.insert(eq_type.type_name.clone());
                }
            }
        }
        let external = external
            .into_iter()
            .map(|eq_type| (eq_type.id.clone(), eq_type))
            .collect();
        let internal = internal
            .into_iter()
            .map(|eq_type| (eq_type.id.clone(), eq_type))
            .collect();

        Self {
            external,
            internal,
            type_ids,
            ambiguous,
        }
    }

    /// Graph without directory names; enough to validate identifier-based requests.
    pub fn from_internal(internal: Vec<EquipmentTypeInternal>) -> Self {
        Self::new(Vec::new(), internal)
    }

    /// Identifier of the directory type called `name`. A name shared by two directory
    /// entries resolves to neither.
    pub fn type_id(&self, name: &str) -> Result<&str, ResolveError> {
        if self.ambiguous.contains(name) {
            return Err(ResolveError::AmbiguousEquipmentType(name.to_string()));
        }
        self.type_ids
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| ResolveError::UnknownEquipmentType(name.to_string()))
    }

    /// `start_id` followed by its ancestors, most general last, along stored parent links.
    pub fn ancestors(&self, start_id: &str) -> Result<Vec<&EquipmentTypeInternal>, ResolveError> {
        let mut current = self
            .internal
            .get(start_id)
            .ok_or_else(|| ResolveError::MissingEquipmentType(start_id.to_string()))?;
        let mut seen = HashSet::from([current.id.as_str()]);
        let mut chain = vec![current];

        while let Some(parent_id) = current.parent() {
            if !seen.insert(parent_id) {
                return Err(ResolveError::Cycle(start_id.to_string()));
            }
            current = self
                .internal
                .get(parent_id)
                .ok_or_else(|| ResolveError::BrokenHierarchy {
                    child: current.id.clone(),
                    parent: parent_id.to_string(),
                })?;
            chain.push(current);
        }

        Ok(chain)
    }

    /// Confirms base, aggregate and end appear on the start type's ancestor chain in that
    /// order (a level may coincide with the one before it). Returns the base type.
    pub fn validate_chain(&self, ids: &ChainIds) -> Result<&EquipmentTypeInternal, ResolveError> {
        let ancestors = self.ancestors(&ids.start_eq_type_id)?;
        let base = position_from(&ancestors, 0, &ids.base_eq_type_id).ok_or_else(|| {
            ResolveError::NotInChain {
                level: ChainLevel::Base,
                id: ids.base_eq_type_id.clone(),
            }
        })?;
        let aggregate = position_from(&ancestors, base, &ids.aggregate_level_eq_type_id)
            .ok_or_else(|| ResolveError::NotInChain {
                level: ChainLevel::Aggregate,
                id: ids.aggregate_level_eq_type_id.clone(),
            })?;
        position_from(&ancestors, aggregate, &ids.end_eq_type_id).ok_or_else(|| {
            ResolveError::NotInChain {
                level: ChainLevel::End,
                id: ids.end_eq_type_id.clone(),
            }
        })?;

        Ok(ancestors[base])
    }

    /// Resolves the four level names through the directory view, then checks the
    /// resulting identifiers against stored parentage.
    pub fn resolve_chain(&self, names: &ChainNames) -> Result<ChainIds, ResolveError> {
        let ids = ChainIds {
            start_eq_type_id: self.type_id(&names.start)?.to_string(),
            base_eq_type_id: self.type_id(&names.base)?.to_string(),
            aggregate_level_eq_type_id: self.type_id(&names.aggregate)?.to_string(),
            end_eq_type_id: self.type_id(&names.end)?.to_string(),
        };
        self.validate_chain(&ids)?;
        Ok(ids)
    }

    /// Resolves counting attribute names declared on the chain's base type.
    pub fn resolve_counting_attributes(
        &self,
        chain: &ChainIds,
        names: &CountingAttributeNames,
    ) -> Result<CountingAttributeIds, ResolveError> {
        let base = self
            .external
            .get(&chain.base_eq_type_id)
            .ok_or_else(|| ResolveError::UnknownEquipmentType(chain.base_eq_type_id.clone()))?;
        let resolve = |name: &str| {
            base.attribute_by_name(name)
                .map(|attr| attr.id.clone())
                .ok_or_else(|| ResolveError::UnknownAttribute {
                    eq_type: base.type_name.clone(),
                    attribute: name.to_string(),
                })
        };

        let ids = CountingAttributeIds {
            num_core_attr_id: resolve(&names.num_cores)?,
            num_cpu_attr_id: resolve(&names.num_cpus)?,
            core_factor_attr_id: resolve(&names.core_factor)?,
        };
        self.validate_counting_attributes(chain, &ids)?;
        Ok(ids)
    }

    /// Counting attributes must be numeric attributes of the base type in the stored graph.
    pub fn validate_counting_attributes(
        &self,
        chain: &ChainIds,
        ids: &CountingAttributeIds,
    ) -> Result<(), ResolveError> {
        let base = self
            .internal
            .get(&chain.base_eq_type_id)
            .ok_or_else(|| ResolveError::MissingEquipmentType(chain.base_eq_type_id.clone()))?;

        for id in [
            &ids.num_core_attr_id,
            &ids.num_cpu_attr_id,
            &ids.core_factor_attr_id,
        ] {
            let attr = base
                .attribute(id)
                .ok_or_else(|| ResolveError::AttributeNotOnBase {
                    eq_type: base.id.clone(),
                    id: id.clone(),
                })?;
            if !attr.data_type.is_numeric() {
                return Err(ResolveError::NonNumericAttribute {
                    id: id.clone(),
                    data_type: attr.data_type,
                });
            }
        }

        Ok(())
    }

    /// Full directory definition of `attribute` as declared on the named equipment type.
    pub fn find_attribute(
        &self,
        eq_type: &str,
        attribute: &str,
    ) -> Result<&ExternalAttribute, ResolveError> {
        let eq = self
            .external
            .get(self.type_id(eq_type)?)
            .ok_or_else(|| ResolveError::UnknownEquipmentType(eq_type.to_string()))?;

        eq.attribute_by_name(attribute)
            .ok_or_else(|| ResolveError::UnknownAttribute {
                eq_type: eq_type.to_string(),
                attribute: attribute.to_string(),
            })
    }

    /// Data type of a directory attribute as recorded in the stored graph.
    fn stored_type(&self, eq_type: &str, attr: &ExternalAttribute) -> Result<DataType, ResolveError> {
        let type_id = self.type_id(eq_type)?;
        let stored = self
            .internal
            .get(type_id)
            .ok_or_else(|| ResolveError::MissingEquipmentType(type_id.to_string()))?;
        stored
            .attribute(&attr.id)
            .map(|stored| stored.data_type)
            .ok_or_else(|| ResolveError::UnstoredAttribute {
                eq_type: type_id.to_string(),
                id: attr.id.clone(),
            })
    }

    /// Attribute summed by an attribute-sum metric; its stored type must be numeric.
    pub fn summed_attribute(
        &self,
        eq_type: &str,
        attribute: &str,
    ) -> Result<ExternalAttribute, ResolveError> {
        let attr = self.find_attribute(eq_type, attribute)?;
        let data_type = self.stored_type(eq_type, attr)?;
        if !data_type.is_numeric() {
            return Err(ResolveError::NonNumericAttribute {
                id: attr.id.clone(),
                data_type,
            });
        }
        Ok(attr.clone())
    }

    /// Attribute matched by an attribute-counter metric; `value` must fit its stored type.
    pub fn counted_attribute(
        &self,
        eq_type: &str,
        attribute: &str,
        value: &str,
    ) -> Result<ExternalAttribute, ResolveError> {
        let attr = self.find_attribute(eq_type, attribute)?;
        let data_type = self.stored_type(eq_type, attr)?;
        if !data_type.accepts(value) {
            return Err(ResolveError::ValueMismatch {
                attribute: attr.name.clone(),
                data_type,
                value: value.to_string(),
            });
        }
        Ok(attr.clone())
    }
}

fn position_from(levels: &[&EquipmentTypeInternal], start: usize, id: &str) -> Option<usize> {
    levels
        .iter()
        .enumerate()
        .skip(start)
        .find(|(_, eq_type)| eq_type.id == id)
        .map(|(idx, _)| idx)
}
