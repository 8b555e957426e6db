//! The dispatcher: runs handlers through their pipeline chain.

use crate::registry::{Binding, Registry, RequestInvoker, ResponseInvoker};
use dashmap::DashMap;
use herald_core::di::Container;
use herald_core::{BoxedRequest, HandlerKind, HeraldError, HeraldResult, Request, RequestContext};
use herald_middleware::{downcast_output, BoxedOutput, BoxedPipeline, Chain, Outcome, PipelineContext};
use herald_queue::{Queuing, StreamId};
use herald_tasks::{EncodedOutput, LocalDispatch};
use std::fmt;
use std::sync::Arc;

/// Dispatches requests to local handlers, or publishes them to the queue.
///
/// Cheap to clone; clones share the registry, the services and the chain
/// cache.
///
/// # Example
///
/// ```rust,ignore
/// let mediator = Mediator::builder()
///     .handler::<Ping, _>(PingHandler)
///     .build()?;
///
/// let pong = mediator.dispatcher().send(Ping { message: "hi".into() }).await?;
/// ```
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Registry,
    container: Arc<Container>,
    global: Vec<BoxedPipeline>,
    chains: DashMap<(&'static str, HandlerKind), Chain>,
    queuing: Option<Arc<Queuing>>,
}

impl Dispatcher {
    pub(crate) fn new(
        registry: Registry,
        container: Container,
        global: Vec<BoxedPipeline>,
        queuing: Option<Arc<Queuing>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry,
                container: Arc::new(container),
                global,
                chains: DashMap::new(),
                queuing,
            }),
        }
    }

    /// The handler registry.
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// The shared service container.
    pub fn container(&self) -> &Container {
        &self.inner.container
    }

    /// The queuing client, when a broker is configured.
    pub fn queuing(&self) -> Option<&Arc<Queuing>> {
        self.inner.queuing.as_ref()
    }

    /// Runs `request` through its chain and local request handler.
    pub async fn send<R: Request>(&self, request: R) -> HeraldResult<R::Output> {
        self.send_with(&RequestContext::new(), request).await
    }

    /// Like [`send`](Self::send) with an explicit context.
    pub async fn send_with<R: Request>(&self, ctx: &RequestContext, request: R) -> HeraldResult<R::Output> {
        let identity = R::type_identity();
        let binding = self
            .inner
            .registry
            .request(identity)
            .ok_or_else(|| HeraldError::unknown_request(identity, HandlerKind::Request))?;

        let output = self.run_request(binding, ctx.clone(), Box::new(request)).await?;
        downcast_output::<R>(output)?.ok_or_else(|| no_output(identity))
    }

    /// Runs a reply through the chain and the local response handler.
    pub async fn send_reply<R: Request>(
        &self,
        ctx: &RequestContext,
        request: R,
        result: Option<R::Output>,
        error: Option<String>,
    ) -> HeraldResult<()> {
        let identity = R::type_identity();
        let binding = self
            .inner
            .registry
            .response(identity)
            .ok_or_else(|| HeraldError::unknown_request(identity, HandlerKind::Response))?;

        let result = result.map(|value| Box::new(value) as BoxedOutput);
        self.run_response(binding, ctx.clone(), Box::new(request), result, error)
            .await
            .map(|_| ())
    }

    /// Publishes `request` to its stream. Never runs a local handler.
    pub async fn publish<R: Request>(&self, request: &R, respond: bool) -> HeraldResult<StreamId> {
        self.publish_with(&RequestContext::new(), request, respond).await
    }

    /// Like [`publish`](Self::publish) with an explicit context, whose
    /// authorization and request id travel with the envelope.
    pub async fn publish_with<R: Request>(
        &self,
        ctx: &RequestContext,
        request: &R,
        respond: bool,
    ) -> HeraldResult<StreamId> {
        let queuing = self
            .inner
            .queuing
            .as_ref()
            .ok_or_else(|| HeraldError::internal("no broker configured for publish"))?;
        queuing.publish_request(request, respond, ctx).await
    }

    /// The composed chain for `identity` and `kind`, built on first use.
    pub fn chain(&self, identity: &'static str, kind: HandlerKind) -> Chain {
        self.inner
            .chains
            .entry((identity, kind))
            .or_insert_with(|| {
                Chain::compose(&self.inner.global, self.inner.registry.scoped(identity), kind)
            })
            .clone()
    }

    async fn run_request(
        &self,
        binding: &Binding<dyn RequestInvoker>,
        ctx: RequestContext,
        request: BoxedRequest,
    ) -> Outcome {
        let identity = binding.map.request_type();
        let chain = self.chain(identity, HandlerKind::Request);
        let mut pipeline_ctx = PipelineContext::new(ctx, identity, HandlerKind::Request);

        let invoker = Arc::clone(&binding.invoker);
        let container = Arc::clone(&self.inner.container);
        chain
            .run(&mut pipeline_ctx, request, move |ctx, request| {
                invoker.invoke(&container, ctx.request_context().clone(), request)
            })
            .await
    }

    async fn run_response(
        &self,
        binding: &Binding<dyn ResponseInvoker>,
        ctx: RequestContext,
        request: BoxedRequest,
        result: Option<BoxedOutput>,
        error: Option<String>,
    ) -> Outcome {
        let identity = binding.map.request_type();
        let chain = self.chain(identity, HandlerKind::Response);
        let mut pipeline_ctx = PipelineContext::new(ctx, identity, HandlerKind::Response);

        let invoker = Arc::clone(&binding.invoker);
        let container = Arc::clone(&self.inner.container);
        chain
            .run(&mut pipeline_ctx, request, move |ctx, request| {
                invoker.invoke(&container, ctx.request_context().clone(), request, result, error)
            })
            .await
    }
}

fn no_output(identity: &str) -> HeraldError {
    HeraldError::internal(format!("pipeline chain for '{identity}' produced no output"))
}

impl LocalDispatch for Dispatcher {
    fn handle_request<'a>(
        &'a self,
        ctx: RequestContext,
        service_type: &'a str,
        payload: &'a [u8],
    ) -> futures_util::future::BoxFuture<'a, HeraldResult<EncodedOutput>> {
        Box::pin(async move {
            let binding = self
                .inner
                .registry
                .request(service_type)
                .ok_or_else(|| HeraldError::unknown_request(service_type, HandlerKind::Request))?;

            let request = binding.invoker.decode(payload)?;
            let output = self
                .run_request(binding, ctx, request)
                .await?
                .ok_or_else(|| no_output(service_type))?;
            binding.invoker.encode(output)
        })
    }

    fn handle_reply<'a>(
        &'a self,
        ctx: RequestContext,
        service_type: &'a str,
        referer: &'a [u8],
        payload: Option<&'a [u8]>,
        error: Option<&'a str>,
    ) -> futures_util::future::BoxFuture<'a, HeraldResult<()>> {
        Box::pin(async move {
            let binding = self
                .inner
                .registry
                .response(service_type)
                .ok_or_else(|| HeraldError::unknown_request(service_type, HandlerKind::Response))?;

            let request = binding.invoker.decode_request(referer)?;
            let result = payload
                .map(|bytes| binding.invoker.decode_result(bytes))
                .transpose()?;
            self.run_response(binding, ctx, request, result, error.map(ToString::to_string))
                .await
                .map(|_| ())
        })
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.inner.registry)
            .field("global_pipelines", &self.inner.global.len())
            .field("cached_chains", &self.inner.chains.len())
            .field("queuing", &self.inner.queuing.is_some())
            .finish()
    }
}
