//! Scheduled task manager: background element prefetch.
//!
//! Keeps the memory tier of the element cache warm so request handlers
//! rarely wait on the network.

use chrono::{DateTime, Duration as ChronoDuration, Timelike, Utc};
use skywatch_common::NoradId;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::model::elements::ElementCache;

/// Minutes past each slot boundary at which prefetches run
const SLOT_OFFSET_MINUTES: i64 = 2;

#[derive(Debug, Clone)]
pub struct ScheduledTaskConfig {
    /// Interval between prefetch rounds (minutes), 0 disables the task
    pub prefetch_interval_minutes: u64,

    /// Objects to keep warm
    pub norad_ids: Vec<NoradId>,

    /// Run one prefetch round immediately on start
    pub perform_initial_update: bool,
}

impl Default for ScheduledTaskConfig {
    fn default() -> Self {
        Self {
            prefetch_interval_minutes: 60,
            norad_ids: Vec::new(),
            perform_initial_update: true,
        }
    }
}

/// Outcome of one prefetch round
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefetchReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: Vec<NoradId>,
}

pub struct ScheduledTaskManager {
    config: ScheduledTaskConfig,
    cache: Arc<ElementCache>,
    task_handles: Vec<JoinHandle<()>>,
}

impl ScheduledTaskManager {
    pub fn new(config: ScheduledTaskConfig, cache: Arc<ElementCache>) -> Self {
        Self {
            config,
            cache,
            task_handles: Vec::new(),
        }
    }

    pub fn start_all(&mut self) {
        if self.config.prefetch_interval_minutes == 0 || self.config.norad_ids.is_empty() {
            tracing::info!("Element prefetch disabled");
            return;
        }

        let handle = self.start_prefetch_task();
        self.task_handles.push(handle);

        tracing::info!(
            "Started {} scheduled tasks (element prefetch every {} min for {} objects)",
            self.task_handles.len(),
            self.config.prefetch_interval_minutes,
            self.config.norad_ids.len()
        );
    }

    fn start_prefetch_task(&self) -> JoinHandle<()> {
        let cache = self.cache.clone();
        let config = self.config.clone();

        tokio::spawn(async move {
            if config.perform_initial_update {
                tracing::info!("Performing initial element prefetch...");
                Self::log_report(&Self::run_prefetch(&cache, &config).await);
            }

            loop {
                let now = Utc::now();
                let next_trigger = Self::calculate_next_prefetch_time(now, config.prefetch_interval_minutes);
                let sleep_duration = (next_trigger - now).to_std().unwrap_or(Duration::from_secs(60));

                tracing::info!(
                    "Next element prefetch at: {} (in {:.1} min)",
                    next_trigger.format("%Y-%m-%d %H:%M:%S UTC"),
                    sleep_duration.as_secs_f64() / 60.0
                );

                tokio::time::sleep(sleep_duration).await;
                Self::log_report(&Self::run_prefetch(&cache, &config).await);
            }
        })
    }

    /// Next slot boundary (multiples of the interval counted from midnight
    /// UTC, shifted by a small offset) strictly after `now`.
    fn calculate_next_prefetch_time(now: DateTime<Utc>, interval_minutes: u64) -> DateTime<Utc> {
        let interval = (interval_minutes.max(1)) as i64;
        let midnight = now
            .with_hour(0)
            .and_then(|t| t.with_minute(0))
            .and_then(|t| t.with_second(0))
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(now);

        let elapsed = (now - midnight).num_minutes() - SLOT_OFFSET_MINUTES;
        let slot = elapsed.div_euclid(interval) + 1;
        midnight + ChronoDuration::minutes(slot * interval + SLOT_OFFSET_MINUTES)
    }

    /// Refresh every object whose entry would expire before the next round.
    async fn run_prefetch(cache: &ElementCache, config: &ScheduledTaskConfig) -> PrefetchReport {
        let lead = ChronoDuration::minutes(config.prefetch_interval_minutes as i64);
        let timeout = Duration::from_secs(300);
        let mut report = PrefetchReport {
            total: config.norad_ids.len(),
            ..Default::default()
        };

        for &norad_id in &config.norad_ids {
            match tokio::time::timeout(timeout, cache.prefetch(norad_id, lead)).await {
                Ok(Ok(_)) => report.succeeded += 1,
                Ok(Err(e)) => {
                    tracing::warn!("Prefetch failed: {}", e);
                    report.failed.push(norad_id);
                }
                Err(_) => {
                    tracing::warn!("Prefetch of catalog #{} timed out after {}s", norad_id, timeout.as_secs());
                    report.failed.push(norad_id);
                }
            }
        }

        report
    }

    fn log_report(report: &PrefetchReport) {
        if report.failed.is_empty() {
            tracing::info!("Element prefetch: {}/{} objects ready", report.succeeded, report.total);
        } else {
            tracing::error!(
                "Element prefetch: {}/{} objects ready, no data for {:?}",
                report.succeeded,
                report.total,
                report.failed
            );
        }
    }

    pub async fn shutdown(self) {
        tracing::info!("Shutting down scheduled task manager...");
        for handle in self.task_handles {
            handle.abort();
        }
        tracing::info!("All scheduled tasks stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::elements::testing::{ScriptedSource, SharedSource};
    use crate::model::elements::{DiskStore, SourceChain};
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_calculate_next_prefetch_time() {
        // 10:00 with hourly slots: next run at 10:02
        let now = Utc.with_ymd_and_hms(2024, 3, 20, 10, 0, 0).unwrap();
        let next = ScheduledTaskManager::calculate_next_prefetch_time(now, 60);
        assert_eq!((next.hour(), next.minute()), (10, 2));

        // Exactly on a slot: the following one
        let now = Utc.with_ymd_and_hms(2024, 3, 20, 10, 2, 0).unwrap();
        let next = ScheduledTaskManager::calculate_next_prefetch_time(now, 60);
        assert_eq!((next.hour(), next.minute()), (11, 2));

        // 23:50 with 15 minute slots rolls into the next day
        let now = Utc.with_ymd_and_hms(2024, 3, 20, 23, 50, 0).unwrap();
        let next = ScheduledTaskManager::calculate_next_prefetch_time(now, 15);
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 21, 0, 2, 0).unwrap());
    }

    #[tokio::test]
    async fn test_prefetch_round_reports_failures() {
        let temp_dir = TempDir::new().unwrap();
        let source = Arc::new(ScriptedSource::new("celestrak", &[true, false]));
        let chain = SourceChain::new(vec![Box::new(SharedSource(source.clone()))]);
        let cache = ElementCache::new(chain, DiskStore::new(temp_dir.path()), ChronoDuration::minutes(180));

        let config = ScheduledTaskConfig {
            prefetch_interval_minutes: 60,
            norad_ids: vec![25544, 48274],
            perform_initial_update: false,
        };

        let report = ScheduledTaskManager::run_prefetch(&cache, &config).await;
        assert_eq!(report.total, 2);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, vec![48274]);
    }
}
