//! Scheduled jobs for periodic maintenance tasks.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use pollhub_common::AppResult;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

use crate::services::LifecycleService;

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval for the room poll expiry sweep (default: 15 seconds).
    pub expiry_sweep_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            expiry_sweep_interval: Duration::from_secs(15),
        }
    }
}

/// Job executor trait for scheduled jobs.
#[async_trait::async_trait]
pub trait JobExecutor: Send + Sync {
    /// Close room polls whose duration has elapsed. Returns how many were closed.
    async fn close_expired_polls(&self) -> AppResult<u64>;
}

#[async_trait::async_trait]
impl JobExecutor for LifecycleService {
    async fn close_expired_polls(&self) -> AppResult<u64> {
        self.sweep(Utc::now()).await
    }
}

/// Run the scheduler with the given configuration and executor.
///
/// The returned handle aborts the sweep when the server shuts down.
pub fn run_scheduler<E: JobExecutor + 'static>(
    config: SchedulerConfig,
    executor: Arc<E>,
) -> JoinHandle<()> {
    let sweep_interval = config.expiry_sweep_interval;

    tokio::spawn(async move {
        let mut interval = interval(sweep_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            match executor.close_expired_polls().await {
                Ok(count) => {
                    if count > 0 {
                        tracing::info!(count, "Closed expired room polls");
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to close expired room polls");
                }
            }
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pollhub_common::AppError;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Default)]
    struct CountingExecutor {
        runs: AtomicU64,
    }

    #[async_trait::async_trait]
    impl JobExecutor for CountingExecutor {
        async fn close_expired_polls(&self) -> AppResult<u64> {
            let run = self.runs.fetch_add(1, Ordering::SeqCst);
            if run == 1 {
                return Err(AppError::Database("connection reset".to_string()));
            }
            Ok(run)
        }
    }

    #[test]
    fn test_scheduler_config_default() {
        let config = SchedulerConfig::default();
        assert_eq!(config.expiry_sweep_interval, Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_keeps_running_after_errors() {
        let executor = Arc::new(CountingExecutor::default());
        let handle = run_scheduler(
            SchedulerConfig {
                expiry_sweep_interval: Duration::from_secs(10),
            },
            Arc::clone(&executor),
        );

        // First tick fires immediately, then every 10s
        tokio::time::sleep(Duration::from_secs(25)).await;
        handle.abort();

        assert_eq!(executor.runs.load(Ordering::SeqCst), 3);
    }
}
