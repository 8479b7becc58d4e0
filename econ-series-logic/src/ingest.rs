//! Incremental population of raw series from an upstream provider.

use crate::{
    store::{SeriesStore, StoreError},
    types::{sort_entries, Metric, TimeSeries, TimeSeriesEntry, Timestamp},
};
use chrono::{DateTime, Days, NaiveDate, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("base url {0} cannot have path segments")]
    CannotBeABase(url::Url),
    #[error("upstream responded with {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("cannot decode upstream response: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum PopulateError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("no source named '{0}' is configured")]
    UnknownSource(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Upstream provider of raw observations.
#[async_trait::async_trait]
pub trait RawSeriesSource: Send + Sync {
    /// Observations of `source_key` dated `start` or later, or the full
    /// history if `start` is `None`.
    async fn fetch_since(
        &self,
        source_key: &str,
        start: Option<NaiveDate>,
    ) -> Result<Vec<TimeSeriesEntry>, FetchError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PopulateOutcome {
    pub fetched: usize,
    pub appended: usize,
    pub latest_timestamp: Option<Timestamp>,
}

/// High-water mark of the stored series `id`.
pub async fn latest_timestamp<S>(store: &S, id: &str) -> Result<Option<Timestamp>, StoreError>
where
    S: SeriesStore + ?Sized,
{
    Ok(store
        .get_series(id)
        .await?
        .and_then(|series| series.latest_timestamp()))
}

/// Day to start fetching from so that the already covered day is skipped.
///
/// `None` means the full history has to be requested.
pub fn next_fetch_start(latest: Option<Timestamp>) -> Option<NaiveDate> {
    let latest = DateTime::<Utc>::from_timestamp(latest?, 0)?;
    latest.date_naive().checked_add_days(Days::new(1))
}

/// Write `existing ++ new` as the full series `id`.
///
/// Entries of `new` at or before the high-water mark of `existing` are
/// dropped, as are repeated timestamps inside `new` (the last one wins).
/// Returns the number of appended entries. Nothing is written when there
/// is nothing to append.
pub async fn merge_and_persist<S>(
    store: &S,
    id: &str,
    existing: Vec<TimeSeriesEntry>,
    new: Vec<TimeSeriesEntry>,
) -> Result<usize, StoreError>
where
    S: SeriesStore + ?Sized,
{
    let high_water_mark = existing.iter().map(|e| e.timestamp).max();
    let mut new: Vec<_> = new
        .into_iter()
        .filter(|e| high_water_mark.map_or(true, |mark| e.timestamp > mark))
        .collect();
    sort_entries(&mut new);
    let new = keep_last_per_timestamp(new);
    if new.is_empty() {
        return Ok(0);
    }
    let appended = new.len();
    let mut entries = existing;
    entries.extend(new);
    sort_entries(&mut entries);
    store.set_series(&TimeSeries::new(id, entries)).await?;
    Ok(appended)
}

fn keep_last_per_timestamp(sorted: Vec<TimeSeriesEntry>) -> Vec<TimeSeriesEntry> {
    let mut result: Vec<TimeSeriesEntry> = Vec::with_capacity(sorted.len());
    for entry in sorted {
        match result.last_mut() {
            Some(last) if last.timestamp == entry.timestamp => *last = entry,
            _ => result.push(entry),
        }
    }
    result
}

/// Fetch observations of `metric` newer than the stored ones and append
/// them to the stored series.
///
/// A failed fetch leaves the stored series untouched.
#[tracing::instrument(skip_all, fields(metric_id = %metric.id), level = "debug")]
pub async fn populate_raw_series<S, R>(
    store: &S,
    source: &R,
    metric: &Metric,
) -> Result<PopulateOutcome, PopulateError>
where
    S: SeriesStore + ?Sized,
    R: RawSeriesSource + ?Sized,
{
    let existing = store
        .get_series(&metric.id)
        .await?
        .map(|series| series.entries)
        .unwrap_or_default();
    let latest = existing.iter().map(|e| e.timestamp).max();
    let start = next_fetch_start(latest);
    tracing::debug!(
        source_key = metric.source_key(),
        start = ?start,
        "fetching raw series"
    );

    let fetched = source.fetch_since(metric.source_key(), start).await?;
    let fetched_count = fetched.len();
    let appended = merge_and_persist(store, &metric.id, existing, fetched).await?;
    let latest_timestamp = if appended > 0 {
        latest_timestamp(store, &metric.id).await?
    } else {
        latest
    };
    if fetched_count > appended {
        tracing::debug!(
            dropped = fetched_count - appended,
            "dropped observations that are already stored"
        );
    }
    Ok(PopulateOutcome {
        fetched: fetched_count,
        appended,
        latest_timestamp,
    })
}
