//! Pipeline context types.
//!
//! The [`PipelineContext`] carries state through the pipeline chain. It wraps
//! the [`RequestContext`] that the handler eventually receives, and adds the
//! dispatch target plus type-keyed extensions that pipelines use to pass
//! data to each other.

use herald_core::{HandlerKind, RequestContext, RequestId};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::time::Instant;

/// Context that flows through the pipeline chain.
///
/// # Example
///
/// ```
/// use herald_core::{HandlerKind, RequestContext};
/// use herald_middleware::PipelineContext;
///
/// let ctx = PipelineContext::new(RequestContext::new(), "Ping", HandlerKind::Request);
/// assert_eq!(ctx.service_type(), "Ping");
/// assert_eq!(ctx.target(), HandlerKind::Request);
/// ```
#[derive(Debug)]
pub struct PipelineContext {
    /// The context handed to the handler.
    request: RequestContext,

    /// Type identity of the request being dispatched.
    service_type: &'static str,

    /// Which handler the chain ends in.
    target: HandlerKind,

    /// When the chain started.
    started_at: Instant,

    /// Type-erased extension data.
    extensions: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl PipelineContext {
    /// Creates a pipeline context for one dispatch.
    #[must_use]
    pub fn new(request: RequestContext, service_type: &'static str, target: HandlerKind) -> Self {
        Self {
            request,
            service_type,
            target,
            started_at: Instant::now(),
            extensions: HashMap::new(),
        }
    }

    /// Returns the handler-facing request context.
    #[must_use]
    pub const fn request_context(&self) -> &RequestContext {
        &self.request
    }

    /// Mutably borrows the handler-facing request context.
    pub fn request_context_mut(&mut self) -> &mut RequestContext {
        &mut self.request
    }

    /// Returns the request ID.
    #[must_use]
    pub const fn request_id(&self) -> &RequestId {
        self.request.request_id()
    }

    /// Returns the type identity of the dispatched request.
    #[must_use]
    pub const fn service_type(&self) -> &'static str {
        self.service_type
    }

    /// Returns the handler kind the chain ends in.
    #[must_use]
    pub const fn target(&self) -> HandlerKind {
        self.target
    }

    /// Returns the elapsed time since the chain started.
    #[must_use]
    pub fn elapsed(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }

    /// Stores a typed extension value.
    ///
    /// ```
    /// use herald_core::{HandlerKind, RequestContext};
    /// use herald_middleware::PipelineContext;
    ///
    /// struct Attempt(u32);
    ///
    /// let mut ctx = PipelineContext::new(RequestContext::new(), "Ping", HandlerKind::Request);
    /// ctx.set_extension(Attempt(2));
    /// assert_eq!(ctx.get_extension::<Attempt>().map(|a| a.0), Some(2));
    /// ```
    pub fn set_extension<T: Send + Sync + 'static>(&mut self, value: T) {
        self.extensions.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Retrieves a typed extension value.
    #[must_use]
    pub fn get_extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref())
    }

    /// Removes and returns a typed extension value.
    pub fn remove_extension<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.extensions
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast().ok())
            .map(|b| *b)
    }

    /// Checks if an extension of the given type exists.
    #[must_use]
    pub fn has_extension<T: Send + Sync + 'static>(&self) -> bool {
        self.extensions.contains_key(&TypeId::of::<T>())
    }
}
