//! Recomputation of derived series from the stored series they depend on.

use crate::{
    alignment::value_at,
    formula::Formula,
    graph::PlannedDefinition,
    store::{SeriesStore, StoreError},
    types::{AlignmentStrategy, TimeSeries, TimeSeriesEntry, Timestamp},
};
use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EvaluationError {
    #[error("dependency '{dependency}' has no stored entries")]
    EmptyDependency { dependency: String },
    #[error("dependency '{dependency}' failed earlier in this run")]
    DependencyFailed { dependency: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ComputedSeries {
    pub entries: Vec<TimeSeriesEntry>,
    /// Timestamps where some dependency could not be aligned or the
    /// formula could not be evaluated
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EvaluationOutcome {
    pub points: usize,
    pub skipped: usize,
    /// `false` if nothing was computed and the stored series was kept
    pub persisted: bool,
}

/// Evaluate `formula` at every timestamp of every dependency.
///
/// Each dependency must have its entries sorted. A timestamp is skipped if
/// any dependency cannot be aligned at it or the formula fails there.
pub fn compute_series(
    formula: &Formula,
    strategy: AlignmentStrategy,
    dependencies: &HashMap<String, TimeSeries>,
) -> ComputedSeries {
    let timestamps: BTreeSet<Timestamp> = dependencies
        .values()
        .flat_map(|series| series.entries.iter().map(|e| e.timestamp))
        .collect();
    let mut computed = ComputedSeries::default();
    let mut values = HashMap::with_capacity(dependencies.len());

    'timestamps: for timestamp in timestamps {
        values.clear();
        for (id, series) in dependencies {
            match value_at(timestamp, &series.entries, strategy) {
                Ok(value) => {
                    values.insert(id.clone(), value);
                }
                Err(err) => {
                    tracing::debug!(
                        timestamp,
                        dependency = id.as_str(),
                        error = %err,
                        "skipping point: dependency cannot be aligned"
                    );
                    computed.skipped += 1;
                    continue 'timestamps;
                }
            }
        }
        match formula.evaluate(&values) {
            Ok(value) => computed.entries.push(TimeSeriesEntry::new(timestamp, value)),
            Err(err) => {
                tracing::debug!(timestamp, error = %err, "skipping point: evaluation failed");
                computed.skipped += 1;
            }
        }
    }
    computed
}

pub struct DerivedMetricEvaluator {
    store: Arc<dyn SeriesStore>,
}

impl DerivedMetricEvaluator {
    pub fn new(store: Arc<dyn SeriesStore>) -> Self {
        Self { store }
    }

    /// Recompute the whole series of `planned` and overwrite the stored one.
    ///
    /// If no point can be computed the stored series stays as it was.
    #[tracing::instrument(
        skip_all,
        fields(definition_id = %planned.definition.id),
        level = "debug",
    )]
    pub async fn evaluate(
        &self,
        planned: &PlannedDefinition,
    ) -> Result<EvaluationOutcome, EvaluationError> {
        let ids: Vec<String> = planned.formula.dependencies().iter().cloned().collect();
        let dependencies = self.store.get_series_batch(&ids).await?;
        if let Some(empty) = ids
            .iter()
            .find(|id| dependencies.get(*id).map_or(true, TimeSeries::is_empty))
        {
            return Err(EvaluationError::EmptyDependency {
                dependency: empty.clone(),
            });
        }

        let computed = compute_series(
            &planned.formula,
            planned.definition.alignment_strategy,
            &dependencies,
        );
        let outcome = EvaluationOutcome {
            points: computed.entries.len(),
            skipped: computed.skipped,
            persisted: !computed.entries.is_empty(),
        };
        if computed.entries.is_empty() {
            tracing::warn!(
                skipped = computed.skipped,
                "no points computed, keeping stored series"
            );
            return Ok(outcome);
        }
        self.store
            .set_series(&TimeSeries::new(
                planned.definition.id.clone(),
                computed.entries,
            ))
            .await?;
        tracing::debug!(
            points = outcome.points,
            skipped = outcome.skipped,
            "derived series persisted"
        );
        Ok(outcome)
    }
}
