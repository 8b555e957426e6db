//! Ordered pipeline chains.
//!
//! A [`Chain`] is the ordered list of pipelines wrapped around one handler.
//! The order is fixed when the chain is composed:
//!
//! 1. **Global pipelines** - registered for every request type, outermost,
//!    in registration order
//! 2. **Scoped pipelines** - registered for one request type, in
//!    registration order
//! 3. **Handler** - the terminal step
//!
//! Pipelines whose [`Pipeline::applies_to`] rejects the chain's handler
//! kind are left out. The filter covers scoped pipelines as well as global
//! ones, so a stage registered for one request type can still opt out of
//! its response handlers. Chains are immutable and cheap to clone, so the
//! dispatcher composes each one once and caches it.

use crate::context::PipelineContext;
use crate::middleware::{BoxFuture, Next, Outcome, Pipeline};
use herald_core::{BoxedRequest, HandlerKind};
use std::fmt;
use std::sync::Arc;

/// A shared, type-erased pipeline.
pub type BoxedPipeline = Arc<dyn Pipeline>;

/// An immutable, ordered pipeline chain.
///
/// # Example
///
/// ```ignore
/// let chain = Chain::builder()
///     .add_global(logging)
///     .add_scoped(audit)
///     .target(HandlerKind::Request)
///     .build();
///
/// let outcome = chain.run(&mut ctx, request, terminal).await;
/// ```
#[derive(Clone)]
pub struct Chain {
    stages: Arc<[BoxedPipeline]>,
}

impl Chain {
    /// Creates a new chain builder.
    #[must_use]
    pub fn builder() -> ChainBuilder {
        ChainBuilder::new()
    }

    /// Composes the chain for a handler of the given kind.
    #[must_use]
    pub fn compose(global: &[BoxedPipeline], scoped: &[BoxedPipeline], target: HandlerKind) -> Self {
        let stages: Vec<BoxedPipeline> = global
            .iter()
            .chain(scoped)
            .filter(|pipeline| pipeline.applies_to(target))
            .cloned()
            .collect();
        Self {
            stages: stages.into(),
        }
    }

    /// Runs the request through every stage and then the handler.
    pub async fn run<H>(&self, ctx: &mut PipelineContext, request: BoxedRequest, handler: H) -> Outcome
    where
        H: FnOnce(&mut PipelineContext, BoxedRequest) -> BoxFuture<'static, Outcome> + Send,
    {
        let next = self.build_next(handler);
        next.run(ctx, request).await
    }

    /// Builds the `Next` chain from back to front.
    fn build_next<'a, H>(&'a self, handler: H) -> Next<'a>
    where
        H: FnOnce(&mut PipelineContext, BoxedRequest) -> BoxFuture<'static, Outcome> + Send + 'a,
    {
        let mut next = Next::handler(handler);
        for pipeline in self.stages.iter().rev() {
            next = Next::new(pipeline.as_ref(), next);
        }
        next
    }

    /// Returns the names of all stages in order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|p| p.name()).collect()
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns `true` if the chain only contains the handler.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("stages", &self.stage_names())
            .finish()
    }
}

/// Builder for constructing a [`Chain`].
pub struct ChainBuilder {
    global: Vec<BoxedPipeline>,
    scoped: Vec<BoxedPipeline>,
    target: HandlerKind,
}

impl ChainBuilder {
    /// Creates a builder for a request-handler chain.
    #[must_use]
    pub fn new() -> Self {
        Self {
            global: Vec::new(),
            scoped: Vec::new(),
            target: HandlerKind::Request,
        }
    }

    /// Appends a global pipeline.
    #[must_use]
    pub fn add_global(mut self, pipeline: BoxedPipeline) -> Self {
        self.global.push(pipeline);
        self
    }

    /// Appends a request-scoped pipeline.
    #[must_use]
    pub fn add_scoped(mut self, pipeline: BoxedPipeline) -> Self {
        self.scoped.push(pipeline);
        self
    }

    /// Sets the handler kind the chain ends in.
    #[must_use]
    pub fn target(mut self, target: HandlerKind) -> Self {
        self.target = target;
        self
    }

    /// Builds the chain.
    #[must_use]
    pub fn build(self) -> Chain {
        Chain::compose(&self.global, &self.scoped, self.target)
    }
}

impl Default for ChainBuilder {
    fn default() -> Self {
        Self::new()
    }
}
