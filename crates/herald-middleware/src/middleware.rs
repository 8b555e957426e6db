//! Core pipeline trait and types.
//!
//! This module defines the [`Pipeline`] trait that every pipeline stage
//! implements. A pipeline wraps the rest of the chain: it may inspect or
//! modify the request before calling [`Next::run`], inspect or replace the
//! outcome afterwards, or short-circuit by not calling `next` at all.
//!
//! Requests and outputs travel type-erased so one pipeline instance can
//! wrap handlers of every request type. Use [`RequestPipeline`] for stages
//! written against one concrete request type.
//!
//! [`RequestPipeline`]: crate::RequestPipeline
//!
//! # Example
//!
//! ```
//! use herald_middleware::{BoxFuture, Next, Outcome, Pipeline, PipelineContext};
//! use herald_core::BoxedRequest;
//!
//! struct Audit;
//!
//! impl Pipeline for Audit {
//!     fn name(&self) -> &'static str {
//!         "audit"
//!     }
//!
//!     fn process<'a>(
//!         &'a self,
//!         ctx: &'a mut PipelineContext,
//!         request: BoxedRequest,
//!         next: Next<'a>,
//!     ) -> BoxFuture<'a, Outcome> {
//!         Box::pin(async move {
//!             tracing::debug!(service_type = ctx.service_type(), "audit");
//!             next.run(ctx, request).await
//!         })
//!     }
//! }
//! ```

use crate::context::PipelineContext;
use herald_core::{BoxedRequest, HandlerKind, HeraldError, HeraldResult, Request};
use std::any::Any;
use std::future::Future;
use std::pin::Pin;

/// A boxed future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A handler output whose concrete type has been erased.
pub type BoxedOutput = Box<dyn Any + Send>;

/// The result of running a chain.
///
/// Request handlers yield `Some(output)`; response handlers yield `None`.
pub type Outcome = HeraldResult<Option<BoxedOutput>>;

/// Recovers the typed output of request `R` from an erased outcome value.
pub fn downcast_output<R: Request>(output: Option<BoxedOutput>) -> HeraldResult<Option<R::Output>> {
    output
        .map(|boxed| {
            boxed
                .downcast::<R::Output>()
                .map(|value| *value)
                .map_err(|_| HeraldError::type_mismatch(R::output_identity(), "erased output"))
        })
        .transpose()
}

/// The core pipeline trait.
///
/// # Invariants
///
/// - A pipeline calls `next.run()` at most once
/// - Errors from downstream propagate unless the pipeline handles them
pub trait Pipeline: Send + Sync + 'static {
    /// Returns the name of this pipeline, used in logs and diagnostics.
    fn name(&self) -> &'static str;

    /// Returns `false` to leave this pipeline out of chains ending in a
    /// handler of the given kind.
    fn applies_to(&self, kind: HandlerKind) -> bool {
        let _ = kind;
        true
    }

    /// Processes the request through this pipeline.
    fn process<'a>(
        &'a self,
        ctx: &'a mut PipelineContext,
        request: BoxedRequest,
        next: Next<'a>,
    ) -> BoxFuture<'a, Outcome>;
}

/// Callback to invoke the rest of the chain.
///
/// Consumed on use, so it can only be run once. If a pipeline never runs
/// it, the chain short-circuits with that pipeline's outcome.
pub struct Next<'a> {
    inner: NextInner<'a>,
}

/// Terminal step of a chain: invokes the handler.
pub type Terminal<'a> =
    Box<dyn FnOnce(&mut PipelineContext, BoxedRequest) -> BoxFuture<'static, Outcome> + Send + 'a>;

enum NextInner<'a> {
    /// More pipelines to process
    Chain {
        pipeline: &'a dyn Pipeline,
        next: Box<Next<'a>>,
    },
    /// End of chain - invoke the handler
    Handler(Terminal<'a>),
}

impl<'a> Next<'a> {
    /// Creates a `Next` that will invoke the given pipeline.
    pub(crate) fn new(pipeline: &'a dyn Pipeline, next: Next<'a>) -> Self {
        Self {
            inner: NextInner::Chain {
                pipeline,
                next: Box::new(next),
            },
        }
    }

    /// Creates a terminal `Next` that invokes the handler.
    pub(crate) fn handler<F>(f: F) -> Self
    where
        F: FnOnce(&mut PipelineContext, BoxedRequest) -> BoxFuture<'static, Outcome> + Send + 'a,
    {
        Self {
            inner: NextInner::Handler(Box::new(f)),
        }
    }

    /// Invokes the next pipeline or the handler.
    pub async fn run(self, ctx: &mut PipelineContext, request: BoxedRequest) -> Outcome {
        match self.inner {
            NextInner::Chain { pipeline, next } => pipeline.process(ctx, request, *next).await,
            NextInner::Handler(handler) => handler(ctx, request).await,
        }
    }
}
