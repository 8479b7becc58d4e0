//! One batch run: populate raw series, then recompute derived ones.

use crate::{
    evaluator::{DerivedMetricEvaluator, EvaluationError, EvaluationOutcome},
    graph::{ComputationPlan, DefinitionRejection},
    ingest::{populate_raw_series, PopulateError, PopulateOutcome, RawSeriesSource},
    registry::MetricRegistry,
    settings::PipelineSettings,
    store::SeriesStore,
    types::Metric,
};
use futures::{stream, StreamExt};
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("no progress: all {attempted} attempted items failed")]
    NoProgress { attempted: usize },
}

/// Result of every item of a run, keyed by metric id.
#[derive(Debug, Default)]
pub struct RunReport {
    pub raw: BTreeMap<String, Result<PopulateOutcome, PopulateError>>,
    pub derived: BTreeMap<String, Result<EvaluationOutcome, EvaluationError>>,
    /// Definitions that were not attempted at all
    pub rejected: BTreeMap<String, DefinitionRejection>,
}

impl RunReport {
    pub fn attempted(&self) -> usize {
        self.raw.len() + self.derived.len()
    }

    pub fn succeeded(&self) -> usize {
        self.raw.values().filter(|r| r.is_ok()).count()
            + self.derived.values().filter(|r| r.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.attempted() - self.succeeded()
    }
}

pub struct Pipeline {
    store: Arc<dyn SeriesStore>,
    sources: HashMap<String, Arc<dyn RawSeriesSource>>,
    registry: Arc<MetricRegistry>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn SeriesStore>,
        registry: Arc<MetricRegistry>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            sources: HashMap::new(),
            registry,
            settings,
        }
    }

    /// Serve raw metrics whose `source` metadata equals `name` from `source`.
    pub fn with_source(
        mut self,
        name: impl Into<String>,
        source: Arc<dyn RawSeriesSource>,
    ) -> Self {
        self.sources.insert(name.into(), source);
        self
    }

    /// Run both phases.
    ///
    /// Failure of a single item never stops the others. The run fails only if
    /// something was attempted and nothing succeeded.
    #[tracing::instrument(skip_all)]
    pub async fn run(&self) -> Result<RunReport, PipelineError> {
        let raw = self.populate_raw().await;
        let (derived, rejected) = self.compute_derived().await;
        let report = RunReport {
            raw,
            derived,
            rejected,
        };
        tracing::info!(
            attempted = report.attempted(),
            succeeded = report.succeeded(),
            failed = report.failed(),
            rejected = report.rejected.len(),
            "pipeline run finished"
        );
        if report.attempted() > 0 && report.succeeded() == 0 {
            return Err(PipelineError::NoProgress {
                attempted: report.attempted(),
            });
        }
        Ok(report)
    }

    /// Populate every raw metric that has a source, a few at a time.
    #[tracing::instrument(skip_all)]
    pub async fn populate_raw(&self) -> BTreeMap<String, Result<PopulateOutcome, PopulateError>> {
        let jobs = self
            .registry
            .raw_metrics()
            .filter(|metric| metric.source().is_some())
            .map(|metric| async move { (metric.id.clone(), self.populate_one(metric).await) });
        let results: BTreeMap<_, _> = stream::iter(jobs)
            .buffer_unordered(self.settings.raw_concurrency.max(1))
            .collect()
            .await;
        tracing::info!(
            total = results.len(),
            failed = results.values().filter(|r| r.is_err()).count(),
            "raw series populated"
        );
        results
    }

    async fn populate_one(&self, metric: &Metric) -> Result<PopulateOutcome, PopulateError> {
        let source_name = metric.source().unwrap_or_default();
        let result = match self.sources.get(source_name) {
            Some(source) => {
                populate_raw_series(self.store.as_ref(), source.as_ref(), metric).await
            }
            None => Err(PopulateError::UnknownSource(source_name.to_string())),
        };
        match &result {
            Ok(outcome) => tracing::debug!(
                metric_id = metric.id.as_str(),
                appended = outcome.appended,
                latest_timestamp = ?outcome.latest_timestamp,
                "raw series populated"
            ),
            Err(err) => tracing::warn!(
                metric_id = metric.id.as_str(),
                source = source_name,
                error = %err,
                "failed to populate raw series"
            ),
        }
        result
    }

    /// Evaluate every computable definition in dependency order.
    #[tracing::instrument(skip_all)]
    pub async fn compute_derived(
        &self,
    ) -> (
        BTreeMap<String, Result<EvaluationOutcome, EvaluationError>>,
        BTreeMap<String, DefinitionRejection>,
    ) {
        let plan = ComputationPlan::build(&self.registry);
        for (id, reason) in &plan.rejected {
            tracing::error!(
                definition_id = id.as_str(),
                reason = %reason,
                "derived definition cannot be computed"
            );
        }

        let evaluator = DerivedMetricEvaluator::new(self.store.clone());
        let mut results = BTreeMap::new();
        let mut failed: HashSet<String> = HashSet::new();
        for step in &plan.steps {
            let id = step.definition.id.clone();
            let failed_dependency = step
                .formula
                .dependencies()
                .iter()
                .find(|dependency| failed.contains(dependency.as_str()));
            let result = match failed_dependency {
                Some(dependency) => Err(EvaluationError::DependencyFailed {
                    dependency: dependency.clone(),
                }),
                None => evaluator.evaluate(step).await,
            };
            if result.is_err() {
                failed.insert(id.clone());
            }
            match &result {
                Ok(outcome) => tracing::debug!(
                    definition_id = id.as_str(),
                    points = outcome.points,
                    skipped = outcome.skipped,
                    "derived series computed"
                ),
                Err(err) => tracing::warn!(
                    definition_id = id.as_str(),
                    error = %err,
                    "failed to compute derived series"
                ),
            }
            results.insert(id, result);
        }
        tracing::info!(
            total = results.len(),
            failed = results.values().filter(|r| r.is_err()).count(),
            rejected = plan.rejected.len(),
            "derived series computed"
        );
        (results, plan.rejected)
    }
}
