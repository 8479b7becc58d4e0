pub mod alignment;
pub mod evaluator;
pub mod formula;
pub mod graph;
pub mod ingest;
pub mod pipeline;
pub mod registry;
pub mod settings;
pub mod sources;
pub mod store;
pub mod types;

#[cfg(test)]
mod tests;

pub use econ_series_entity as entity;

pub use evaluator::DerivedMetricEvaluator;
pub use formula::{extract_dependencies, substitute_and_evaluate, Formula, FormulaError};
pub use graph::{CircularDependencyError, ComputationPlan, DependencyGraph};
pub use pipeline::{Pipeline, PipelineError, RunReport};
pub use registry::{MetricRegistry, RegistryConfig, RegistryError};
pub use settings::PipelineSettings;
pub use store::{InMemorySeriesStore, PostgresSeriesStore, SeriesStore, StoreError};
pub use types::{
    AlignmentStrategy, DerivedTimeseriesDefinition, Metric, TimeSeries, TimeSeriesEntry, Timestamp,
    Unit, UpdateCadence,
};
