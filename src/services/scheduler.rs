//! Periodic triggers for the sweeps

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::sweep::{SweepRun, Sweeper};
use super::Services;
use crate::config::SchedulerConfig;

/// Start one background loop per sweep. Each loop calls `run_once` on every
/// tick, starting immediately; a run still in flight makes the tick a no-op.
pub fn start(services: &Services, config: &SchedulerConfig) -> Vec<JoinHandle<()>> {
    if !config.enabled {
        tracing::info!("Sweep scheduler disabled");
        return Vec::new();
    }

    vec![
        spawn(
            Arc::new(services.expiration.clone()),
            hours(config.expiration_interval_hours),
        ),
        spawn(
            Arc::new(services.overdue.clone()),
            hours(config.overdue_interval_hours),
        ),
    ]
}

/// Run a sweeper every `period` in a background task
pub fn spawn(sweeper: Arc<dyn Sweeper>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(sweep = sweeper.name(), ?period, "Sweep scheduled");

        loop {
            ticker.tick().await;

            match sweeper.run_once().await {
                Ok(SweepRun::Completed(report)) => {
                    tracing::debug!(sweep = sweeper.name(), ?report, "Scheduled sweep completed");
                }
                Ok(SweepRun::AlreadyRunning) => {
                    tracing::info!(sweep = sweeper.name(), "Previous sweep still running");
                }
                Err(e) => {
                    tracing::error!(sweep = sweeper.name(), "Scheduled sweep failed: {}", e);
                }
            }
        }
    })
}

fn hours(n: u64) -> Duration {
    Duration::from_secs(n.max(1) * 3600)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppResult;
    use crate::services::sweep::SweepReport;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(Arc<AtomicUsize>);

    #[async_trait]
    impl Sweeper for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn run_once(&self) -> AppResult<SweepRun> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(SweepRun::Completed(SweepReport::default()))
        }
    }

    #[tokio::test]
    async fn test_spawn_runs_on_every_tick() {
        let runs = Arc::new(AtomicUsize::new(0));
        let handle = spawn(Arc::new(Counting(runs.clone())), Duration::from_millis(20));

        tokio::time::sleep(Duration::from_millis(110)).await;
        handle.abort();

        // First tick fires immediately
        assert!(runs.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn test_interval_floor() {
        assert_eq!(hours(0), Duration::from_secs(3600));
        assert_eq!(hours(24), Duration::from_secs(24 * 3600));
    }
}
