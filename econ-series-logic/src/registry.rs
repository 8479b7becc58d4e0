use crate::types::{DerivedTimeseriesDefinition, Metric};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("empty metric id")]
    EmptyId,
    #[error("encountered same id twice: {0}")]
    DuplicateId(String),
    #[error("derived definition '{definition}' produces metric '{metric}'; ids must match")]
    MetricIdMismatch { definition: String, metric: String },
}

/// Raw representation of the registry as it is written in configs
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryConfig {
    pub metrics: Vec<Metric>,
    pub derived: Vec<DerivedTimeseriesDefinition>,
}

/// Immutable table of all known raw metrics and derived definitions.
///
/// Iteration order is by id, which keeps every run over the same
/// registry reproducible.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricRegistry {
    raw: BTreeMap<String, Metric>,
    derived: BTreeMap<String, DerivedTimeseriesDefinition>,
}

impl MetricRegistry {
    pub fn new(
        metrics: impl IntoIterator<Item = Metric>,
        derived: impl IntoIterator<Item = DerivedTimeseriesDefinition>,
    ) -> Result<Self, RegistryError> {
        let mut raw = BTreeMap::new();
        for metric in metrics {
            if metric.id.is_empty() {
                return Err(RegistryError::EmptyId);
            }
            if let Some(duplicate) = raw.insert(metric.id.clone(), metric) {
                return Err(RegistryError::DuplicateId(duplicate.id));
            }
        }
        let mut definitions = BTreeMap::new();
        for definition in derived {
            if definition.id.is_empty() {
                return Err(RegistryError::EmptyId);
            }
            if definition.metric.id != definition.id {
                return Err(RegistryError::MetricIdMismatch {
                    definition: definition.id,
                    metric: definition.metric.id,
                });
            }
            if raw.contains_key(&definition.id) {
                return Err(RegistryError::DuplicateId(definition.id));
            }
            if let Some(duplicate) = definitions.insert(definition.id.clone(), definition) {
                return Err(RegistryError::DuplicateId(duplicate.id));
            }
        }
        Ok(Self {
            raw,
            derived: definitions,
        })
    }

    pub fn from_config(config: RegistryConfig) -> Result<Self, RegistryError> {
        Self::new(config.metrics, config.derived)
    }

    pub fn raw_metrics(&self) -> impl Iterator<Item = &Metric> {
        self.raw.values()
    }

    pub fn raw_metric(&self, id: &str) -> Option<&Metric> {
        self.raw.get(id)
    }

    pub fn is_raw(&self, id: &str) -> bool {
        self.raw.contains_key(id)
    }

    pub fn derived_definitions(&self) -> impl Iterator<Item = &DerivedTimeseriesDefinition> {
        self.derived.values()
    }

    pub fn derived_definition(&self, id: &str) -> Option<&DerivedTimeseriesDefinition> {
        self.derived.get(id)
    }

    pub fn is_derived(&self, id: &str) -> bool {
        self.derived.contains_key(id)
    }

    /// Raw metric or derived definition with such id exists
    pub fn is_known(&self, id: &str) -> bool {
        self.is_raw(id) || self.is_derived(id)
    }
}
