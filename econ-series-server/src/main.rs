use blockscout_service_launcher::{database, launcher::ConfigSettings};
use econ_series_server::Settings;
use migration::Migrator;

const SERVICE_NAME: &str = "econ_series";

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let settings = Settings::build()?;

    blockscout_service_launcher::tracing::init_logs(
        SERVICE_NAME,
        &settings.tracing,
        &settings.jaeger,
    )?;

    let db_connection = database::initialize_postgres::<Migrator>(&settings.database).await?;
    econ_series_server::run(settings, db_connection).await
}
