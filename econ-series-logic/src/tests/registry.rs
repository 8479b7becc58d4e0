use crate::types::{AlignmentStrategy, DerivedTimeseriesDefinition, Metric, Unit, UpdateCadence};
use std::collections::BTreeMap;

/// Raw metric ingested from the mock provider under its own id
pub fn raw_metric(id: &str) -> Metric {
    Metric {
        id: id.to_string(),
        name: id.to_uppercase(),
        description: String::new(),
        cadence: UpdateCadence::Quarterly,
        unit: Unit::BillionsOfDollars,
        metadata: BTreeMap::from([(Metric::SOURCE_KEY.to_string(), "mock".to_string())]),
    }
}

/// Metric that is stored but never fetched
pub fn unsourced_metric(id: &str) -> Metric {
    Metric {
        metadata: BTreeMap::new(),
        ..raw_metric(id)
    }
}

pub fn definition(id: &str, formula: &str) -> DerivedTimeseriesDefinition {
    definition_with(id, formula, AlignmentStrategy::Previous)
}

pub fn definition_with(
    id: &str,
    formula: &str,
    alignment_strategy: AlignmentStrategy,
) -> DerivedTimeseriesDefinition {
    DerivedTimeseriesDefinition {
        id: id.to_string(),
        metric: Metric {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            cadence: UpdateCadence::Quarterly,
            unit: Unit::Percent,
            metadata: BTreeMap::new(),
        },
        alignment_strategy,
        formula: formula.to_string(),
    }
}
