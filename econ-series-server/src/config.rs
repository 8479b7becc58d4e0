use anyhow::Context;
use econ_series_logic::{MetricRegistry, RegistryConfig};
use std::path::Path;

/// Read raw metrics and derived definitions from a `.json` file.
pub fn read_registry(path: &Path) -> Result<MetricRegistry, anyhow::Error> {
    let extension = path.extension();
    if extension != Some(std::ffi::OsStr::new("json")) {
        return Err(anyhow::anyhow!(
            "expected `.json`, got invalid registry extension: {extension:?}"
        ));
    }
    let config: RegistryConfig = config::Config::builder()
        .add_source(config::File::from(path))
        .build()
        .context("registry read")?
        .try_deserialize()
        .context("registry parse")?;
    MetricRegistry::from_config(config).context("registry validation")
}
