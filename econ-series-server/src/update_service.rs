use crate::settings::SchedulerSettings;
use chrono::Utc;
use cron::Schedule;
use econ_series_logic::{Pipeline, PipelineError, RunReport};
use std::sync::Arc;

pub struct UpdateService {
    pipeline: Arc<Pipeline>,
    settings: SchedulerSettings,
}

fn time_till_next_call(schedule: &Schedule) -> std::time::Duration {
    let default = std::time::Duration::from_millis(500);
    let now = Utc::now();

    schedule
        .upcoming(Utc)
        .next()
        .map_or(default, |t| (t - now).to_std().unwrap_or(default))
}

impl UpdateService {
    pub fn new(pipeline: Arc<Pipeline>, settings: SchedulerSettings) -> Self {
        Self { pipeline, settings }
    }

    /// Runs forever: once on start if configured, then on every tick of
    /// the schedule.
    pub async fn run_cron(self: Arc<Self>) {
        if self.settings.run_on_start {
            let _ = self.run_with_retries().await;
        }
        loop {
            let sleep_duration = time_till_next_call(&self.settings.update_schedule);
            tracing::info!("scheduled next pipeline run in {:?}", sleep_duration);
            tokio::time::sleep(sleep_duration).await;
            let _ = self.run_with_retries().await;
        }
    }

    /// Rerun the whole pipeline while it makes no progress at all, up to
    /// `max_attempts` times.
    pub async fn run_with_retries(&self) -> Result<RunReport, PipelineError> {
        let max_attempts = self.settings.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            tracing::info!(attempt, max_attempts, "starting pipeline run");
            match self.pipeline.run().await {
                Ok(report) => {
                    tracing::info!(
                        attempt,
                        succeeded = report.succeeded(),
                        failed = report.failed(),
                        rejected = report.rejected.len(),
                        "pipeline run succeeded"
                    );
                    return Ok(report);
                }
                Err(err) if attempt < max_attempts => {
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        error = %err,
                        "pipeline run failed, retrying in {:?}",
                        self.settings.retry_delay
                    );
                    attempt += 1;
                    tokio::time::sleep(self.settings.retry_delay).await;
                }
                Err(err) => {
                    tracing::error!(
                        attempt,
                        max_attempts,
                        error = %err,
                        "pipeline run failed, giving up until next scheduled run"
                    );
                    return Err(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use econ_series_logic::{
        ingest::{FetchError, RawSeriesSource},
        InMemorySeriesStore, Metric, MetricRegistry, PipelineSettings, TimeSeriesEntry, Unit,
        UpdateCadence,
    };
    use pretty_assertions::assert_eq;
    use std::{
        collections::BTreeMap,
        str::FromStr,
        sync::atomic::{AtomicU32, Ordering},
        time::Duration,
    };

    /// Fails the first `failures` requests
    struct FlakySource {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait::async_trait]
    impl RawSeriesSource for FlakySource {
        async fn fetch_since(
            &self,
            _source_key: &str,
            _start: Option<NaiveDate>,
        ) -> Result<Vec<TimeSeriesEntry>, FetchError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(FetchError::Status {
                    status: reqwest::StatusCode::BAD_GATEWAY,
                    body: String::new(),
                });
            }
            Ok(vec![TimeSeriesEntry::new(1_704_067_200, 100.0)])
        }
    }

    fn service(failures: u32, max_attempts: u32) -> (UpdateService, Arc<FlakySource>) {
        let _ = tracing_subscriber::fmt::try_init();
        let metric = Metric {
            id: "gdp".to_string(),
            name: "Gross Domestic Product".to_string(),
            description: String::new(),
            cadence: UpdateCadence::Quarterly,
            unit: Unit::BillionsOfDollars,
            metadata: BTreeMap::from([(Metric::SOURCE_KEY.to_string(), "flaky".to_string())]),
        };
        let registry = MetricRegistry::new([metric], []).unwrap();
        let source = Arc::new(FlakySource {
            failures,
            calls: AtomicU32::new(0),
        });
        let pipeline = Pipeline::new(
            Arc::new(InMemorySeriesStore::new()),
            Arc::new(registry),
            PipelineSettings::default(),
        )
        .with_source("flaky", source.clone());
        let settings = SchedulerSettings {
            max_attempts,
            retry_delay: Duration::ZERO,
            ..Default::default()
        };
        (UpdateService::new(Arc::new(pipeline), settings), source)
    }

    #[tokio::test]
    async fn retries_until_progress() {
        let (service, source) = service(2, 3);
        let report = service.run_with_retries().await.unwrap();
        assert_eq!(report.succeeded(), 1);
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let (service, source) = service(5, 3);
        let err = service.run_with_retries().await.unwrap_err();
        assert!(matches!(err, PipelineError::NoProgress { attempted: 1 }));
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn zero_attempts_still_runs_once() {
        let (service, source) = service(0, 0);
        service.run_with_retries().await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn next_call_is_within_a_day() {
        let schedule = Schedule::from_str("0 0 6 * * * *").unwrap();
        let till_next = time_till_next_call(&schedule);
        assert!(till_next <= Duration::from_secs(24 * 60 * 60));
    }
}
