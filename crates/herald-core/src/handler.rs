//! Handler traits.
//!
//! A [`RequestHandler`] turns a request into its output. A
//! [`ResponseHandler`] processes the reply to a request this process
//! previously published: it receives the original request together with the
//! remote result or error text.

use crate::context::RequestContext;
use crate::error::HeraldResult;
use crate::request::Request;
use std::future::Future;
use std::marker::PhantomData;

/// Handles requests of type `R`.
///
/// # Example
///
/// ```rust
/// use herald_core::{HeraldResult, Request, RequestContext, RequestHandler};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Serialize, Deserialize)]
/// struct Ping;
///
/// #[derive(Debug, Serialize, Deserialize)]
/// struct Pong;
///
/// impl Request for Ping {
///     type Output = Pong;
/// }
///
/// struct PingHandler;
///
/// impl RequestHandler<Ping> for PingHandler {
///     async fn handle(&self, _ctx: &RequestContext, _request: Ping) -> HeraldResult<Pong> {
///         Ok(Pong)
///     }
/// }
/// ```
pub trait RequestHandler<R: Request>: Send + Sync + 'static {
    /// Handles a request and returns its output.
    fn handle(
        &self,
        ctx: &RequestContext,
        request: R,
    ) -> impl Future<Output = HeraldResult<R::Output>> + Send;
}

/// Handles replies to previously published requests of type `R`.
///
/// Exactly one of `result` and `error` is normally set: `result` when the
/// remote handler succeeded, `error` with its error text when it failed.
pub trait ResponseHandler<R: Request>: Send + Sync + 'static {
    /// Processes one reply.
    fn handle(
        &self,
        ctx: &RequestContext,
        request: R,
        result: Option<R::Output>,
        error: Option<String>,
    ) -> impl Future<Output = HeraldResult<()>> + Send;
}

/// A request handler built from an async function.
///
/// The function receives an owned copy of the context.
///
/// ```rust
/// use herald_core::{handler_fn, FnHandler, HeraldResult, Request, RequestContext};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Serialize, Deserialize)]
/// struct Add(i64, i64);
///
/// impl Request for Add {
///     type Output = i64;
/// }
///
/// let handler: FnHandler<_, Add> = handler_fn(|_ctx: RequestContext, Add(a, b): Add| async move {
///     HeraldResult::Ok(a + b)
/// });
/// # let _ = handler;
/// ```
pub struct FnHandler<F, R> {
    func: F,
    _request: PhantomData<fn(R)>,
}

/// Creates a [`FnHandler`].
pub const fn handler_fn<F, R>(func: F) -> FnHandler<F, R> {
    FnHandler {
        func,
        _request: PhantomData,
    }
}

impl<F, Fut, R> RequestHandler<R> for FnHandler<F, R>
where
    R: Request,
    F: Fn(RequestContext, R) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HeraldResult<R::Output>> + Send,
{
    fn handle(
        &self,
        ctx: &RequestContext,
        request: R,
    ) -> impl Future<Output = HeraldResult<R::Output>> + Send {
        (self.func)(ctx.clone(), request)
    }
}

/// A response handler built from an async function.
pub struct FnResponseHandler<F, R> {
    func: F,
    _request: PhantomData<fn(R)>,
}

/// Creates a [`FnResponseHandler`].
pub const fn response_handler_fn<F, R>(func: F) -> FnResponseHandler<F, R> {
    FnResponseHandler {
        func,
        _request: PhantomData,
    }
}

impl<F, Fut, R> ResponseHandler<R> for FnResponseHandler<F, R>
where
    R: Request,
    F: Fn(RequestContext, R, Option<R::Output>, Option<String>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HeraldResult<()>> + Send,
{
    fn handle(
        &self,
        ctx: &RequestContext,
        request: R,
        result: Option<R::Output>,
        error: Option<String>,
    ) -> impl Future<Output = HeraldResult<()>> + Send {
        (self.func)(ctx.clone(), request, result, error)
    }
}
