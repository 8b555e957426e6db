//! Slow dispatch detection.
//!
//! Times the rest of the chain and logs a warning when it takes longer than
//! the configured threshold. The measured time is stored in the context as
//! an [`ExecutionTime`] extension.

use crate::{
    context::PipelineContext,
    middleware::{BoxFuture, Next, Outcome, Pipeline},
};
use herald_core::BoxedRequest;
use std::time::Duration;
use tokio::time::Instant;

/// Default threshold for slow dispatches.
pub const DEFAULT_SLOW_THRESHOLD: Duration = Duration::from_millis(2000);

/// How long the rest of the chain took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionTime(pub Duration);

/// Warns about dispatches slower than a threshold.
#[derive(Debug, Clone, Copy)]
pub struct PerformancePipeline {
    threshold: Duration,
}

impl PerformancePipeline {
    /// Creates a performance pipeline with the given threshold.
    #[must_use]
    pub const fn new(threshold: Duration) -> Self {
        Self { threshold }
    }

    /// Returns the threshold.
    #[must_use]
    pub const fn threshold(&self) -> Duration {
        self.threshold
    }
}

impl Default for PerformancePipeline {
    fn default() -> Self {
        Self::new(DEFAULT_SLOW_THRESHOLD)
    }
}

impl Pipeline for PerformancePipeline {
    fn name(&self) -> &'static str {
        "performance"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut PipelineContext,
        request: BoxedRequest,
        next: Next<'a>,
    ) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            let start = Instant::now();
            let outcome = next.run(ctx, request).await;
            let elapsed = start.elapsed();

            if elapsed > self.threshold {
                tracing::warn!(
                    request_id = %ctx.request_id(),
                    service_type = ctx.service_type(),
                    duration_ms = elapsed.as_millis() as u64,
                    threshold_ms = self.threshold.as_millis() as u64,
                    "slow request"
                );
            }
            ctx.set_extension(ExecutionTime(elapsed));

            outcome
        })
    }
}
