//! Drives the facade on a fixed interval.
//!
//! Passes never overlap: the runner holds the engine lock for the whole
//! pass, and a pass that overruns the interval causes the missed ticks to be
//! skipped rather than queued. Stopping lets the in-progress pass finish.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::error::EngineError;
use crate::facade::LiveOpsEngine;

/// Runs passes every `period` until `shutdown_rx` flips to `true` or its
/// sender is dropped. Returns the number of passes run.
pub async fn run(
    engine: Arc<Mutex<LiveOpsEngine>>,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> u64 {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut passes = 0;

    loop {
        tokio::select! {
            biased;

            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    info!(passes, "reconciliation runner shutting down");
                    break;
                }
            }

            _ = interval.tick() => {
                let report = engine.lock().await.tick().await;
                passes += 1;
                debug!(pass_id = %report.correlation_id, "runner pass complete");
            }
        }
    }
    passes
}

/// Handle to a spawned [`run`] loop.
#[derive(Debug)]
pub struct ReconciliationRunner {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<u64>,
}

impl ReconciliationRunner {
    /// Spawns the loop on the current runtime.
    #[must_use]
    pub fn start(engine: Arc<Mutex<LiveOpsEngine>>, period: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run(engine, period, shutdown_rx));
        info!(?period, "reconciliation runner started");
        Self {
            shutdown_tx,
            handle,
        }
    }

    /// Signals shutdown and waits for the in-progress pass to finish.
    /// Returns the number of passes run.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Task` if the loop panicked.
    pub async fn stop(self) -> Result<u64, EngineError> {
        // A closed channel means the loop already exited; the join reports it.
        let _ = self.shutdown_tx.send(true);
        Ok(self.handle.await?)
    }
}

#[cfg(test)]
mod tests {
    use liveops_alerts::domain::commands::RegisterAlert;
    use liveops_core::comparison::Comparison;
    use liveops_core::trigger::Severity;
    use liveops_test_support::{
        FixedClock, MockRng, RecordingAnalyticsSink, RecordingDeliveryChannel,
        RecordingRewardService, StaticSegmentResolver, fixed_now,
    };
    use uuid::Uuid;

    use super::*;
    use crate::config::EngineConfig;
    use crate::facade::Collaborators;

    fn shared_engine() -> Arc<Mutex<LiveOpsEngine>> {
        let collaborators = Collaborators {
            rewards: Arc::new(RecordingRewardService::new()),
            delivery: Arc::new(RecordingDeliveryChannel::new()),
            segments: Arc::new(StaticSegmentResolver::new()),
            analytics: Arc::new(RecordingAnalyticsSink::new()),
            clock: Arc::new(FixedClock(fixed_now())),
        };
        Arc::new(Mutex::new(LiveOpsEngine::new(
            EngineConfig::default(),
            collaborators,
            Box::new(MockRng),
        )))
    }

    #[tokio::test(start_paused = true)]
    async fn test_runner_ticks_once_per_period_until_stopped() {
        // Arrange
        let engine = shared_engine();
        let runner = ReconciliationRunner::start(Arc::clone(&engine), Duration::from_secs(1));

        // Act
        tokio::time::sleep(Duration::from_millis(3_500)).await;
        let passes = runner.stop().await.unwrap();

        // Assert
        assert_eq!(passes, 3);
        assert_eq!(engine.lock().await.passes(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_host_mutations_between_passes_are_reconciled() {
        // Arrange
        let engine = shared_engine();
        let runner = ReconciliationRunner::start(Arc::clone(&engine), Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(500)).await;
        let alert_id = {
            let mut guard = engine.lock().await;
            guard.set_metric("queue_depth", 900.0);
            guard
                .register_alert(&RegisterAlert {
                    correlation_id: Uuid::new_v4(),
                    name: "queue backlog".into(),
                    metric: "queue_depth".into(),
                    operator: Comparison::GreaterThan,
                    threshold: 500.0,
                    severity: Severity::Warning,
                    mode: None,
                })
                .unwrap()
        };

        // Act
        tokio::time::sleep(Duration::from_secs(1)).await;
        runner.stop().await.unwrap();

        // Assert
        let alert = engine.lock().await.alert(alert_id).unwrap();
        assert_eq!(alert.trigger_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_shutdown_sender_stops_loop() {
        // Arrange
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run(shared_engine(), Duration::from_secs(1), shutdown_rx));

        // Act
        drop(shutdown_tx);
        let passes = handle.await.unwrap();

        // Assert
        assert_eq!(passes, 0);
    }
}
