//! Broker health checks.

use crate::error::WorkerResult;
use herald_queue::Queuing;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Pings the broker periodically. Failures are logged, never escalated.
#[derive(Debug)]
pub struct HealthChecker {
    queuing: Arc<Queuing>,
}

impl HealthChecker {
    /// Creates a health checker.
    pub fn new(queuing: Arc<Queuing>) -> Self {
        Self { queuing }
    }

    /// Checks every `health_check_interval_ms` until cancelled.
    pub async fn run(&self, cancel: &CancellationToken) -> WorkerResult<()> {
        let period = self.queuing.config().health_check_interval();
        loop {
            tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                () = tokio::time::sleep(period) => {}
            }
            self.check().await;
        }
    }

    /// Pings the broker once. Returns `true` if it answered.
    pub async fn check(&self) -> bool {
        match self.queuing.broker().ping().await {
            Ok(latency) => {
                if latency > self.queuing.config().slow_command() {
                    tracing::warn!(duration_ms = latency.as_millis() as u64, "slow broker ping");
                } else {
                    tracing::trace!(duration_ms = latency.as_millis() as u64, "broker ping");
                }
                true
            }
            Err(err) => {
                tracing::warn!(error = %err, "broker health check failed");
                false
            }
        }
    }
}
