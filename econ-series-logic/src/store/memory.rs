use super::{SeriesStore, StoreError};
use crate::types::{sort_entries, TimeSeries, TimeSeriesEntry};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;

/// Process-local store, used for dry runs and in tests.
///
/// Remembers ids of all writes in the order they happened.
#[derive(Debug, Default)]
pub struct InMemorySeriesStore {
    series: RwLock<HashMap<String, Vec<TimeSeriesEntry>>>,
    writes: Mutex<Vec<String>>,
}

impl InMemorySeriesStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store prefilled with `series`. Prefilling is not recorded as writes.
    pub fn with_series(series: impl IntoIterator<Item = TimeSeries>) -> Self {
        let series = series.into_iter().map(|s| (s.id, s.entries)).collect();
        Self {
            series: RwLock::new(series),
            writes: Mutex::default(),
        }
    }

    pub fn written_ids(&self) -> Vec<String> {
        self.writes.lock().clone()
    }

    pub fn clear_written_ids(&self) {
        self.writes.lock().clear();
    }

    pub fn entries(&self, id: &str) -> Option<Vec<TimeSeriesEntry>> {
        self.series.read().get(id).cloned()
    }
}

#[async_trait::async_trait]
impl SeriesStore for InMemorySeriesStore {
    async fn get_series(&self, id: &str) -> Result<Option<TimeSeries>, StoreError> {
        let entries = self.series.read().get(id).cloned();
        Ok(entries.map(|mut entries| {
            sort_entries(&mut entries);
            TimeSeries {
                id: id.to_string(),
                entries,
            }
        }))
    }

    async fn set_series(&self, series: &TimeSeries) -> Result<(), StoreError> {
        self.series
            .write()
            .insert(series.id.clone(), series.entries.clone());
        self.writes.lock().push(series.id.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::point_construction::e;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn full_replace_and_write_log() {
        let store = InMemorySeriesStore::new();
        assert_eq!(store.get_series("gdp").await.unwrap(), None);

        store
            .set_series(&TimeSeries::new("gdp", vec![e(1, 1.0), e(2, 2.0)]))
            .await
            .unwrap();
        store
            .set_series(&TimeSeries::new("gdp", vec![e(3, 3.0)]))
            .await
            .unwrap();
        store
            .set_series(&TimeSeries::new("debt", vec![]))
            .await
            .unwrap();

        assert_eq!(
            store.get_series("gdp").await.unwrap(),
            Some(TimeSeries::new("gdp", vec![e(3, 3.0)]))
        );
        assert_eq!(store.written_ids(), vec!["gdp", "gdp", "debt"]);
    }

    #[tokio::test]
    async fn reads_are_sorted_and_batch_omits_absent() {
        let store = InMemorySeriesStore::with_series([TimeSeries {
            id: "gdp".into(),
            entries: vec![e(20, 2.0), e(10, 1.0)],
        }]);
        let batch = store
            .get_series_batch(&["gdp".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch["gdp"].entries, vec![e(10, 1.0), e(20, 2.0)]);
        assert!(store.written_ids().is_empty());
    }
}
