use super::{SeriesStore, StoreError};
use crate::types::{sort_entries, TimeSeries, TimeSeriesEntry};
use chrono::Utc;
use econ_series_entity::time_series;
use sea_orm::{prelude::*, sea_query, Set};
use std::{collections::HashMap, sync::Arc};

/// Series documents in the `time_series` table, one row per id.
#[derive(Debug, Clone)]
pub struct PostgresSeriesStore {
    db: Arc<DatabaseConnection>,
}

impl PostgresSeriesStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

fn decode(model: time_series::Model) -> Result<TimeSeries, StoreError> {
    let mut entries: Vec<TimeSeriesEntry> =
        serde_json::from_value(model.entries).map_err(|source| StoreError::Corrupted {
            id: model.id.clone(),
            source,
        })?;
    sort_entries(&mut entries);
    Ok(TimeSeries {
        id: model.id,
        entries,
    })
}

#[async_trait::async_trait]
impl SeriesStore for PostgresSeriesStore {
    async fn get_series(&self, id: &str) -> Result<Option<TimeSeries>, StoreError> {
        time_series::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .map(decode)
            .transpose()
    }

    async fn set_series(&self, series: &TimeSeries) -> Result<(), StoreError> {
        let entries =
            serde_json::to_value(&series.entries).map_err(|source| StoreError::Encode {
                id: series.id.clone(),
                source,
            })?;
        time_series::Entity::insert(time_series::ActiveModel {
            id: Set(series.id.clone()),
            entries: Set(entries),
            updated_at: Set(Utc::now().fixed_offset()),
        })
        .on_conflict(
            sea_query::OnConflict::column(time_series::Column::Id)
                .update_columns([time_series::Column::Entries, time_series::Column::UpdatedAt])
                .to_owned(),
        )
        .exec(self.db.as_ref())
        .await?;
        Ok(())
    }

    async fn get_series_batch(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, TimeSeries>, StoreError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        time_series::Entity::find()
            .filter(time_series::Column::Id.is_in(ids.iter().cloned()))
            .all(self.db.as_ref())
            .await?
            .into_iter()
            .map(|model| decode(model).map(|series| (series.id.clone(), series)))
            .collect()
    }
}
