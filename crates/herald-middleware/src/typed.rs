//! Pipelines written against one concrete request type.
//!
//! A [`RequestPipeline`] sees the request as its concrete type `R` and the
//! outcome as `Option<R::Output>`. Wrap it in [`Scoped`] to place it in a
//! chain; the adapter downcasts on the way in and re-erases on the way out.

use crate::context::PipelineContext;
use crate::middleware::{downcast_output, BoxFuture, BoxedOutput, Next, Outcome, Pipeline};
use herald_core::{BoxedRequest, HandlerKind, HeraldResult, Request};
use std::marker::PhantomData;

/// A pipeline stage bound to request type `R`.
///
/// # Example
///
/// ```
/// use herald_core::{HeraldResult, Request};
/// use herald_middleware::{BoxFuture, PipelineContext, RequestPipeline, TypedNext};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Serialize, Deserialize)]
/// struct Transfer {
///     cents: u64,
/// }
///
/// impl Request for Transfer {
///     type Output = bool;
/// }
///
/// struct CapAmount;
///
/// impl RequestPipeline<Transfer> for CapAmount {
///     fn name(&self) -> &'static str {
///         "cap_amount"
///     }
///
///     fn process<'a>(
///         &'a self,
///         ctx: &'a mut PipelineContext,
///         mut request: Transfer,
///         next: TypedNext<'a, Transfer>,
///     ) -> BoxFuture<'a, HeraldResult<Option<bool>>> {
///         Box::pin(async move {
///             request.cents = request.cents.min(10_000);
///             next.run(ctx, request).await
///         })
///     }
/// }
/// ```
pub trait RequestPipeline<R: Request>: Send + Sync + 'static {
    /// Returns the name of this pipeline.
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
        request: R,
        next: TypedNext<'a, R>,
    ) -> BoxFuture<'a, HeraldResult<Option<R::Output>>>;
}

/// Typed view of [`Next`].
pub struct TypedNext<'a, R> {
    inner: Next<'a>,
    _request: PhantomData<fn(R)>,
}

impl<'a, R: Request> TypedNext<'a, R> {
    fn new(inner: Next<'a>) -> Self {
        Self {
            inner,
            _request: PhantomData,
        }
    }

    /// Invokes the rest of the chain.
    pub async fn run(self, ctx: &mut PipelineContext, request: R) -> HeraldResult<Option<R::Output>> {
        let output = self.inner.run(ctx, Box::new(request)).await?;
        downcast_output::<R>(output)
    }
}

/// Adapts a [`RequestPipeline`] into a chain [`Pipeline`].
pub struct Scoped<P, R> {
    inner: P,
    _request: PhantomData<fn(R)>,
}

impl<P, R> Scoped<P, R>
where
    P: RequestPipeline<R>,
    R: Request,
{
    /// Wraps a typed pipeline.
    pub const fn new(inner: P) -> Self {
        Self {
            inner,
            _request: PhantomData,
        }
    }
}

impl<P, R> Pipeline for Scoped<P, R>
where
    P: RequestPipeline<R>,
    R: Request,
{
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn applies_to(&self, kind: HandlerKind) -> bool {
        self.inner.applies_to(kind)
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut PipelineContext,
        request: BoxedRequest,
        next: Next<'a>,
    ) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            let request = request.downcast::<R>()?;
            let output = self.inner.process(ctx, request, TypedNext::new(next)).await?;
            Outcome::Ok(output.map(|value| Box::new(value) as BoxedOutput))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Chain;
    use herald_core::{HeraldError, RequestContext};
    use serde::{Deserialize, Serialize};
    use std::sync::Arc;

    #[derive(Debug, Serialize, Deserialize)]
    struct Square(i64);

    impl Request for Square {
        type Output = i64;
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Other;

    impl Request for Other {
        type Output = ();
    }

    struct NegateInput;

    impl RequestPipeline<Square> for NegateInput {
        fn name(&self) -> &'static str {
            "negate_input"
        }

        fn process<'a>(
            &'a self,
            ctx: &'a mut PipelineContext,
            request: Square,
            next: TypedNext<'a, Square>,
        ) -> BoxFuture<'a, HeraldResult<Option<i64>>> {
            Box::pin(async move {
                let out = next.run(ctx, Square(-request.0)).await?;
                HeraldResult::Ok(out.map(|v| v + 1))
            })
        }
    }

    fn square_terminal(_ctx: &mut PipelineContext, request: BoxedRequest) -> BoxFuture<'static, Outcome> {
        Box::pin(async move {
            let Square(n) = request.downcast::<Square>()?;
            let output: BoxedOutput = Box::new(n * n);
            Outcome::Ok(Some(output))
        })
    }

    #[tokio::test]
    async fn test_scoped_pipeline_sees_typed_values() {
        let chain = Chain::builder()
            .add_scoped(Arc::new(Scoped::new(NegateInput)))
            .build();
        let mut ctx = PipelineContext::new(RequestContext::new(), "Square", HandlerKind::Request);

        let outcome = chain.run(&mut ctx, Box::new(Square(3)), square_terminal).await;
        assert_eq!(downcast_output::<Square>(outcome.unwrap()).unwrap(), Some(10));
    }

    #[tokio::test]
    async fn test_scoped_pipeline_rejects_foreign_request() {
        let chain = Chain::builder()
            .add_scoped(Arc::new(Scoped::new(NegateInput)))
            .build();
        let mut ctx = PipelineContext::new(RequestContext::new(), "Other", HandlerKind::Request);

        let err = chain
            .run(&mut ctx, Box::new(Other), square_terminal)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, HeraldError::TypeMismatch { .. }));
    }
}
