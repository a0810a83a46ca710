//! Scheduled pipeline runs
//!
//! A single resident loop triggers one bulk run at a time on a fixed
//! interval. Runs never overlap: the next trigger is not considered
//! until the current run returns, so a trigger arriving mid-run is
//! coalesced into the following cycle. After a failed run the wait
//! grows exponentially up to a cap; the first successful run resets it.

use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::error::Result;
use crate::ingest::house::pipeline::HousePipeline;

/// Longest wait between runs regardless of how many have failed, 6 h.
const MAX_BACKOFF_MIN: u64 = 360;

/// Resident scheduler driving periodic bulk ingestion.
pub struct Scheduler {
    pipeline: HousePipeline,
    settings: Settings,
    shutdown: watch::Receiver<bool>,
}

impl Scheduler {
    pub fn new(pipeline: HousePipeline, settings: Settings, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            pipeline,
            settings,
            shutdown,
        }
    }

    /// Run until shutdown is signalled.
    ///
    /// Each cycle re-reads the configured year window, so a rolling
    /// window picks up the new year without a restart. Only fatal
    /// configuration errors escape the loop; everything else is logged,
    /// counted against the failure streak, and waited out.
    pub async fn run(mut self) -> Result<()> {
        let interval_min = self.settings.scheduler.scan_interval_min;
        let factor = self.settings.retry.backoff_factor;
        let mut failure_streak: u32 = 0;
        let mut runs: u64 = 0;

        info!(interval_min, "Scheduler started");

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            runs += 1;
            let (year_start, year_end) = self.settings.year_range();
            info!(run = runs, year_start, year_end, "Scheduled run starting");

            match self.pipeline.run_bulk(year_start, year_end, None).await {
                Ok(report) if report.is_success() => {
                    if failure_streak > 0 {
                        info!(failure_streak, "Run succeeded, resetting backoff");
                    }
                    failure_streak = 0;
                    info!(run = runs, "Scheduled run finished: {}", report.summary());
                }
                Ok(report) => {
                    failure_streak += 1;
                    warn!(
                        run = runs,
                        failed_units = report.failures.len(),
                        failure_streak,
                        "Scheduled run partially failed: {}",
                        report.summary()
                    );
                }
                Err(e) if e.is_fatal() => {
                    error!(run = runs, error = %e, "Fatal error, scheduler stopping");
                    return Err(e);
                }
                Err(e) => {
                    failure_streak += 1;
                    warn!(run = runs, error = %e, failure_streak, "Scheduled run failed");
                }
            }

            let delay = backoff_delay(interval_min, factor, failure_streak);
            info!(delay_min = delay.as_secs() / 60, "Waiting for next run");

            if wait_or_shutdown(&mut self.shutdown, delay).await {
                break;
            }
        }

        info!(runs, "Scheduler stopped");
        Ok(())
    }
}

/// Sleep out the inter-run delay unless shutdown arrives first.
///
/// Returns true when the loop should stop. A closed channel counts as
/// shutdown: once the sender is gone nothing can ever signal again, and
/// treating the error as a wakeup would turn the wait into a busy loop.
async fn wait_or_shutdown(shutdown: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}

/// Delay before the next run: the base interval grown exponentially by
/// the failure streak, capped at [`MAX_BACKOFF_MIN`].
fn backoff_delay(interval_min: u64, factor: u32, failure_streak: u32) -> Duration {
    let multiplier = u64::from(factor.max(1)).saturating_pow(failure_streak);
    let minutes = interval_min.saturating_mul(multiplier).min(MAX_BACKOFF_MIN);
    Duration::from_secs(minutes * 60)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_delay_base_interval_on_success() {
        assert_eq!(backoff_delay(15, 2, 0), Duration::from_secs(15 * 60));
    }

    #[test]
    fn test_backoff_delay_grows_with_streak() {
        assert_eq!(backoff_delay(15, 2, 1), Duration::from_secs(30 * 60));
        assert_eq!(backoff_delay(15, 2, 2), Duration::from_secs(60 * 60));
        assert_eq!(backoff_delay(15, 2, 3), Duration::from_secs(120 * 60));
    }

    #[test]
    fn test_backoff_delay_is_capped_at_six_hours() {
        assert_eq!(backoff_delay(15, 2, 5), Duration::from_secs(360 * 60));
        assert_eq!(
            backoff_delay(15, 2, 10),
            Duration::from_secs(MAX_BACKOFF_MIN * 60)
        );
        assert_eq!(
            backoff_delay(15, 2, u32::MAX),
            Duration::from_secs(MAX_BACKOFF_MIN * 60)
        );
    }

    #[test]
    fn test_backoff_delay_tolerates_zero_factor() {
        // validate() rejects factor 0, but a streak must never divide
        // the interval to nothing either way.
        assert_eq!(backoff_delay(15, 0, 3), Duration::from_secs(15 * 60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_elapses_when_nothing_signals() {
        let (_tx, mut rx) = watch::channel(false);
        assert!(!wait_or_shutdown(&mut rx, Duration::from_secs(60)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_stops_on_shutdown_signal() {
        let (tx, mut rx) = watch::channel(false);
        tx.send(true).unwrap();
        assert!(wait_or_shutdown(&mut rx, Duration::from_secs(3600)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_stops_when_sender_is_gone() {
        // A dropped signal task must stop the loop, not spin it.
        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        assert!(wait_or_shutdown(&mut rx, Duration::from_secs(3600)).await);
    }
}
