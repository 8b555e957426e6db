//! Supervision of the consumer runner set.

use crate::dispatch::LocalDispatch;
use crate::error::{WorkerError, WorkerResult};
use crate::health::HealthChecker;
use crate::locker::KeyCountLocker;
use crate::processor::EntryProcessor;
use crate::reader::ConsumerReader;
use crate::stats::RunnerStats;
use crate::sweeper::PendingSweeper;
use herald_core::ServiceMap;
use herald_queue::Queuing;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Runs the read loop, the pending sweeper and the health checker under
/// one cancellation scope.
///
/// When any of them fails, the siblings are cancelled and the whole set is
/// restarted at once, up to `retry_limit` consecutive times. A run that
/// ends without error resets the count. Errors that a restart cannot fix
/// (see [`WorkerError::is_transient`]) are returned immediately.
/// Cancelling the shutdown token stops the supervisor cleanly once
/// in-flight handlers have finished.
#[derive(Debug)]
pub struct Supervisor {
    queuing: Arc<Queuing>,
    maps: Arc<[ServiceMap]>,
    reader: Arc<ConsumerReader>,
    sweeper: Arc<PendingSweeper>,
    health: Arc<HealthChecker>,
    stats: Arc<RunnerStats>,
    retry_limit: u32,
}

impl Supervisor {
    /// Wires the runner set for the handlers in `maps`.
    pub fn new(queuing: Arc<Queuing>, dispatch: Arc<dyn LocalDispatch>, maps: Vec<ServiceMap>) -> Self {
        let stats = Arc::new(RunnerStats::new());
        let processor = Arc::new(EntryProcessor::new(
            Arc::clone(&queuing),
            dispatch,
            Arc::clone(&stats),
        ));
        let locker = KeyCountLocker::new(queuing.config().worker_task_limit);
        let retry_limit = queuing.config().retry_limit;

        Self {
            reader: Arc::new(ConsumerReader::new(Arc::clone(&processor), locker)),
            sweeper: Arc::new(PendingSweeper::new(processor)),
            health: Arc::new(HealthChecker::new(Arc::clone(&queuing))),
            maps: maps.into(),
            queuing,
            stats,
            retry_limit,
        }
    }

    /// Shared runner statistics.
    pub fn stats(&self) -> &Arc<RunnerStats> {
        &self.stats
    }

    /// The read loop.
    pub fn reader(&self) -> &Arc<ConsumerReader> {
        &self.reader
    }

    /// The pending sweeper.
    pub fn sweeper(&self) -> &Arc<PendingSweeper> {
        &self.sweeper
    }

    /// Runs until `shutdown` is cancelled or the retry limit is exhausted.
    pub async fn run(&self, shutdown: &CancellationToken) -> WorkerResult<()> {
        let mut restarts = 0_u32;
        loop {
            let scope = shutdown.child_token();
            let result = self.run_once(&scope).await;
            scope.cancel();

            if shutdown.is_cancelled() {
                tracing::info!("consumer runners stopped");
                return Ok(());
            }

            match result {
                Ok(()) => {
                    restarts = 0;
                    tracing::warn!("consumer runners ended, restarting");
                }
                Err(err) if !err.is_transient() => {
                    tracing::error!(error = %err, "consumer runners failed with non-transient error");
                    return Err(err);
                }
                Err(err) => {
                    if restarts >= self.retry_limit {
                        tracing::error!(error = %err, restarts, "consumer runners failed, giving up");
                        return Err(WorkerError::retries_exhausted(restarts, err));
                    }
                    restarts += 1;
                    tracing::warn!(
                        error = %err,
                        attempt = restarts,
                        limit = self.retry_limit,
                        "consumer runners failed, restarting"
                    );
                }
            }
        }
    }

    async fn run_once(&self, scope: &CancellationToken) -> WorkerResult<()> {
        let keys = Arc::new(self.queuing.register_consumer(&self.maps).await?);
        let mut set = JoinSet::new();

        let reader = Arc::clone(&self.reader);
        let (reader_keys, reader_scope) = (Arc::clone(&keys), scope.clone());
        set.spawn(async move { reader.run(reader_keys, &reader_scope).await });

        let sweeper = Arc::clone(&self.sweeper);
        let (sweeper_keys, sweeper_scope) = (Arc::clone(&keys), scope.clone());
        set.spawn(async move { sweeper.run(&sweeper_keys, &sweeper_scope).await });

        let health = Arc::clone(&self.health);
        let health_scope = scope.clone();
        set.spawn(async move { health.run(&health_scope).await });

        let mut outcome = Ok(());
        while let Some(joined) = set.join_next().await {
            let result = joined.map_err(WorkerError::from_join).and_then(|result| result);
            if let Err(err) = result {
                if outcome.is_ok() {
                    outcome = Err(err);
                }
            }
            scope.cancel();
        }
        outcome
    }
}
