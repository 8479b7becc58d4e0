mod config;
mod settings;
mod update_service;

pub use config::read_registry;
pub use settings::{SchedulerSettings, Settings};
pub use update_service::UpdateService;

use anyhow::Context;
use econ_series_logic::{sources::HttpJsonSource, Pipeline, PostgresSeriesStore};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

pub async fn run(settings: Settings, db_connection: DatabaseConnection) -> anyhow::Result<()> {
    let registry = read_registry(&settings.registry_path).with_context(|| {
        format!(
            "failed to read metric registry from {}",
            settings.registry_path.display()
        )
    })?;
    tracing::info!(
        raw_metrics = registry.raw_metrics().count(),
        derived_definitions = registry.derived_definitions().count(),
        "metric registry loaded"
    );

    let store = Arc::new(PostgresSeriesStore::new(Arc::new(db_connection)));
    let mut pipeline = Pipeline::new(store, Arc::new(registry), settings.pipeline.clone());
    for (name, source_settings) in &settings.sources {
        let source = HttpJsonSource::new(source_settings)
            .with_context(|| format!("failed to initialize source '{name}'"))?;
        pipeline = pipeline.with_source(name.clone(), Arc::new(source));
    }

    let update_service = Arc::new(UpdateService::new(
        Arc::new(pipeline),
        settings.scheduler.clone(),
    ));
    update_service.run_cron().await;
    Ok(())
}
