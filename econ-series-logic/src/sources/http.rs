use crate::{
    ingest::{FetchError, RawSeriesSource},
    types::{sort_entries, TimeSeriesEntry},
};
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use serde_with::serde_as;
use std::time;
use url::Url;

#[serde_as]
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct HttpSourceSettings {
    pub base_url: Url,

    #[serde(default = "default_timeout")]
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub timeout: time::Duration,
}

fn default_timeout() -> time::Duration {
    time::Duration::from_secs(30)
}

/// Provider answering `GET {base_url}/{source_key}?start=YYYY-MM-DD` with
/// a JSON array of `{"timestamp", "value"}` objects.
#[derive(Debug, Clone)]
pub struct HttpJsonSource {
    base_url: Url,
    http_client: Client,
}

impl HttpJsonSource {
    pub fn new(settings: &HttpSourceSettings) -> Result<Self, FetchError> {
        let http_client = Client::builder().timeout(settings.timeout).build()?;
        Ok(Self::with_http_client(settings.base_url.clone(), http_client))
    }

    pub fn with_http_client(base_url: Url, http_client: Client) -> Self {
        Self {
            base_url,
            http_client,
        }
    }

    fn series_url(&self, source_key: &str, start: Option<NaiveDate>) -> Result<Url, FetchError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| FetchError::CannotBeABase(self.base_url.clone()))?
            .pop_if_empty()
            .push(source_key);
        if let Some(start) = start {
            url.query_pairs_mut()
                .append_pair("start", &start.format("%Y-%m-%d").to_string());
        }
        Ok(url)
    }
}

#[async_trait::async_trait]
impl RawSeriesSource for HttpJsonSource {
    async fn fetch_since(
        &self,
        source_key: &str,
        start: Option<NaiveDate>,
    ) -> Result<Vec<TimeSeriesEntry>, FetchError> {
        let url = self.series_url(source_key, start)?;
        let response = self.http_client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status { status, body });
        }
        let body = response.bytes().await?;
        let mut entries: Vec<TimeSeriesEntry> = serde_json::from_slice(&body)?;
        sort_entries(&mut entries);
        Ok(entries)
    }
}
