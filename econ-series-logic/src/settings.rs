use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineSettings {
    /// Max number of raw series populated at the same time
    pub raw_concurrency: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self { raw_concurrency: 4 }
    }
}
