use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Seconds since unix epoch
pub type Timestamp = i64;

/// Single point of a series.
///
/// Serialized form is part of the persisted document:
/// `{"timestamp": <integer>, "value": <number>}`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesEntry {
    pub timestamp: Timestamp,
    pub value: f64,
}

impl TimeSeriesEntry {
    pub fn new(timestamp: Timestamp, value: f64) -> Self {
        Self { timestamp, value }
    }

    pub fn date(&self) -> Option<NaiveDate> {
        DateTime::<Utc>::from_timestamp(self.timestamp, 0).map(|t| t.date_naive())
    }
}

/// Complete history of one metric, keyed by the metric id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub id: String,
    pub entries: Vec<TimeSeriesEntry>,
}

impl TimeSeries {
    /// Entries are put in ascending timestamp order.
    pub fn new(id: impl Into<String>, mut entries: Vec<TimeSeriesEntry>) -> Self {
        sort_entries(&mut entries);
        Self {
            id: id.into(),
            entries,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// High-water mark of the series
    pub fn latest_timestamp(&self) -> Option<Timestamp> {
        self.entries.iter().map(|e| e.timestamp).max()
    }
}

/// Stable, so entries with equal timestamps keep their relative order.
pub fn sort_entries(entries: &mut [TimeSeriesEntry]) {
    entries.sort_by_key(|e| e.timestamp);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateCadence {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    Percent,
    Dollar,
    BillionsOfDollars,
    NumberOfDays,
    Index,
    Ratio,
    Number,
}

/// Descriptor of a measured quantity.
///
/// `id` is the permanent join key between the metric, its stored series and
/// formula tokens. Only `name` and `description` may change once a series
/// for the metric is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Metric {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub cadence: UpdateCadence,
    pub unit: Unit,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Metric {
    pub const SOURCE_KEY: &'static str = "source";
    pub const SOURCE_SERIES_KEY: &'static str = "source_key";

    /// Name of the upstream provider, if the metric is ingested from one
    pub fn source(&self) -> Option<&str> {
        self.metadata.get(Self::SOURCE_KEY).map(String::as_str)
    }

    /// Key of the series at the upstream provider. Falls back to `id`.
    pub fn source_key(&self) -> &str {
        self.metadata
            .get(Self::SOURCE_SERIES_KEY)
            .map(String::as_str)
            .unwrap_or(&self.id)
    }
}

/// Policy for picking a dependency value at a timestamp where the
/// dependency has no point of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentStrategy {
    Previous,
    Future,
    Nearest,
    Interpolate,
}

/// Operator-authored derived metric. Output series is stored under `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DerivedTimeseriesDefinition {
    pub id: String,
    pub metric: Metric,
    pub alignment_strategy: AlignmentStrategy,
    pub formula: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::point_construction::e;
    use pretty_assertions::assert_eq;

    #[test]
    fn series_entries_are_sorted() {
        let series = TimeSeries::new("gdp", vec![e(30, 3.0), e(10, 1.0), e(20, 2.0)]);
        assert_eq!(series.entries, vec![e(10, 1.0), e(20, 2.0), e(30, 3.0)]);
        assert_eq!(series.latest_timestamp(), Some(30));
        assert_eq!(TimeSeries::new("empty", vec![]).latest_timestamp(), None);
    }

    #[test]
    fn persisted_document_shape() {
        let series = TimeSeries::new("gdp", vec![e(1_700_000_000, 100.5)]);
        let json = serde_json::to_value(&series).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": "gdp",
                "entries": [{"timestamp": 1_700_000_000, "value": 100.5}]
            })
        );
    }

    #[test]
    fn metric_source_key_falls_back_to_id() {
        let mut metric: Metric = serde_json::from_value(serde_json::json!({
            "id": "gdp",
            "name": "Gross Domestic Product",
            "cadence": "quarterly",
            "unit": "billions_of_dollars",
            "metadata": {"source": "fred"}
        }))
        .unwrap();
        assert_eq!(metric.source(), Some("fred"));
        assert_eq!(metric.source_key(), "gdp");

        metric
            .metadata
            .insert(Metric::SOURCE_SERIES_KEY.to_string(), "GDP".to_string());
        assert_eq!(metric.source_key(), "GDP");
    }
}
