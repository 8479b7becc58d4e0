//! Persistence of complete series documents keyed by metric id.

mod memory;
mod postgres;

pub use memory::InMemorySeriesStore;
pub use postgres::PostgresSeriesStore;

use crate::types::TimeSeries;
use futures::future::try_join_all;
use sea_orm::DbErr;
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] DbErr),
    #[error("stored entries of '{id}' cannot be decoded: {source}")]
    Corrupted {
        id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("entries of '{id}' cannot be encoded: {source}")]
    Encode {
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Document store holding one full series per id.
///
/// Writes replace the whole series. There are no partial updates.
#[async_trait::async_trait]
pub trait SeriesStore: Send + Sync {
    /// Entries of the returned series are in ascending timestamp order.
    async fn get_series(&self, id: &str) -> Result<Option<TimeSeries>, StoreError>;

    async fn set_series(&self, series: &TimeSeries) -> Result<(), StoreError>;

    /// Absent ids are omitted from the result.
    async fn get_series_batch(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, TimeSeries>, StoreError> {
        let found = try_join_all(ids.iter().map(|id| self.get_series(id))).await?;
        Ok(found
            .into_iter()
            .flatten()
            .map(|series| (series.id.clone(), series))
            .collect())
    }
}

#[async_trait::async_trait]
impl<S: SeriesStore + ?Sized> SeriesStore for Arc<S> {
    async fn get_series(&self, id: &str) -> Result<Option<TimeSeries>, StoreError> {
        self.as_ref().get_series(id).await
    }

    async fn set_series(&self, series: &TimeSeries) -> Result<(), StoreError> {
        self.as_ref().set_series(series).await
    }

    async fn get_series_batch(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, TimeSeries>, StoreError> {
        self.as_ref().get_series_batch(ids).await
    }
}
