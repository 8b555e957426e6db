//! Startup registry of type-erased handler invokers.
//!
//! Each registered handler is stored behind an invoker that knows its
//! concrete request type: it decodes payloads, resolves the handler from its
//! [`HandlerProvider`] and calls it. Lookups are keyed by request type
//! identity and handler kind, so the dispatcher can serve both typed `send`
//! calls and envelopes that only carry an identity string.

use herald_core::di::{Container, HandlerProvider};
use herald_core::{
    codec, BoxedRequest, HandlerKind, HeraldError, HeraldResult, Request, RequestContext,
    RequestHandler, ResponseHandler, ServiceMap,
};
use herald_middleware::{downcast_output, BoxFuture, BoxedOutput, BoxedPipeline, Outcome};
use herald_tasks::EncodedOutput;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Invokes a request handler for one concrete request type.
pub(crate) trait RequestInvoker: Send + Sync {
    fn decode(&self, payload: &[u8]) -> HeraldResult<BoxedRequest>;

    fn invoke(
        &self,
        container: &Container,
        ctx: RequestContext,
        request: BoxedRequest,
    ) -> BoxFuture<'static, Outcome>;

    fn encode(&self, output: BoxedOutput) -> HeraldResult<EncodedOutput>;
}

/// Invokes a response handler for one concrete request type.
pub(crate) trait ResponseInvoker: Send + Sync {
    fn decode_request(&self, referer: &[u8]) -> HeraldResult<BoxedRequest>;

    fn decode_result(&self, payload: &[u8]) -> HeraldResult<BoxedOutput>;

    fn invoke(
        &self,
        container: &Container,
        ctx: RequestContext,
        request: BoxedRequest,
        result: Option<BoxedOutput>,
        error: Option<String>,
    ) -> BoxFuture<'static, Outcome>;
}

struct RequestBinding<R, H> {
    provider: HandlerProvider<H>,
    _request: PhantomData<fn(R)>,
}

impl<R, H> RequestInvoker for RequestBinding<R, H>
where
    R: Request,
    H: RequestHandler<R>,
{
    fn decode(&self, payload: &[u8]) -> HeraldResult<BoxedRequest> {
        codec::decode::<R>(payload).map(|request| Box::new(request) as BoxedRequest)
    }

    fn invoke(
        &self,
        container: &Container,
        ctx: RequestContext,
        request: BoxedRequest,
    ) -> BoxFuture<'static, Outcome> {
        let handler = self.provider.resolve(container);
        Box::pin(async move {
            let handler = handler?;
            let request = request.downcast::<R>()?;
            let output = handler.handle(&ctx, request).await?;
            Outcome::Ok(Some(Box::new(output) as BoxedOutput))
        })
    }

    fn encode(&self, output: BoxedOutput) -> HeraldResult<EncodedOutput> {
        let output = downcast_output::<R>(Some(output))?
            .ok_or_else(|| HeraldError::internal("missing handler output"))?;
        Ok(EncodedOutput {
            payload_type: R::output_identity().to_string(),
            payload: codec::encode(&output)?,
        })
    }
}

struct ResponseBinding<R, H> {
    provider: HandlerProvider<H>,
    _request: PhantomData<fn(R)>,
}

impl<R, H> ResponseInvoker for ResponseBinding<R, H>
where
    R: Request,
    H: ResponseHandler<R>,
{
    fn decode_request(&self, referer: &[u8]) -> HeraldResult<BoxedRequest> {
        codec::decode::<R>(referer).map(|request| Box::new(request) as BoxedRequest)
    }

    fn decode_result(&self, payload: &[u8]) -> HeraldResult<BoxedOutput> {
        codec::decode::<R::Output>(payload).map(|output| Box::new(output) as BoxedOutput)
    }

    fn invoke(
        &self,
        container: &Container,
        ctx: RequestContext,
        request: BoxedRequest,
        result: Option<BoxedOutput>,
        error: Option<String>,
    ) -> BoxFuture<'static, Outcome> {
        let handler = self.provider.resolve(container);
        Box::pin(async move {
            let handler = handler?;
            let request = request.downcast::<R>()?;
            let result = downcast_output::<R>(result)?;
            handler.handle(&ctx, request, result, error).await?;
            Outcome::Ok(None)
        })
    }
}

/// A registered handler: its descriptor plus its invoker.
pub(crate) struct Binding<I: ?Sized> {
    pub(crate) map: ServiceMap,
    pub(crate) invoker: Arc<I>,
}

/// Handlers and request-scoped pipelines, keyed by request type identity.
///
/// Built once by the [`MediatorBuilder`](crate::MediatorBuilder) and
/// read-only afterwards.
#[derive(Default)]
pub struct Registry {
    requests: HashMap<&'static str, Binding<dyn RequestInvoker>>,
    responses: HashMap<&'static str, Binding<dyn ResponseInvoker>>,
    scoped: HashMap<&'static str, Vec<BoxedPipeline>>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_request<R, H>(&mut self, provider: HandlerProvider<H>) -> HeraldResult<()>
    where
        R: Request,
        H: RequestHandler<R>,
    {
        let map = ServiceMap::of::<R, H>(HandlerKind::Request, provider.lifetime());
        let identity = map.request_type();
        if self.requests.contains_key(identity) {
            return Err(duplicate(&map));
        }
        let invoker: Arc<dyn RequestInvoker> = Arc::new(RequestBinding::<R, H> {
            provider,
            _request: PhantomData,
        });
        self.requests.insert(identity, Binding { map, invoker });
        Ok(())
    }

    pub(crate) fn add_response<R, H>(&mut self, provider: HandlerProvider<H>) -> HeraldResult<()>
    where
        R: Request,
        H: ResponseHandler<R>,
    {
        let map = ServiceMap::of::<R, H>(HandlerKind::Response, provider.lifetime());
        let identity = map.request_type();
        if self.responses.contains_key(identity) {
            return Err(duplicate(&map));
        }
        let invoker: Arc<dyn ResponseInvoker> = Arc::new(ResponseBinding::<R, H> {
            provider,
            _request: PhantomData,
        });
        self.responses.insert(identity, Binding { map, invoker });
        Ok(())
    }

    pub(crate) fn add_scoped(&mut self, identity: &'static str, pipeline: BoxedPipeline) {
        self.scoped.entry(identity).or_default().push(pipeline);
    }

    pub(crate) fn request(&self, identity: &str) -> Option<&Binding<dyn RequestInvoker>> {
        self.requests.get(identity)
    }

    pub(crate) fn response(&self, identity: &str) -> Option<&Binding<dyn ResponseInvoker>> {
        self.responses.get(identity)
    }

    pub(crate) fn scoped(&self, identity: &str) -> &[BoxedPipeline] {
        self.scoped.get(identity).map_or(&[], Vec::as_slice)
    }

    /// Looks up the descriptor registered for `identity` and `kind`.
    #[must_use]
    pub fn service_map(&self, identity: &str, kind: HandlerKind) -> Option<&ServiceMap> {
        match kind {
            HandlerKind::Request => self.requests.get(identity).map(|b| &b.map),
            HandlerKind::Response => self.responses.get(identity).map(|b| &b.map),
        }
    }

    /// Every registered descriptor, request handlers first, each group
    /// ordered by identity.
    #[must_use]
    pub fn service_maps(&self) -> Vec<ServiceMap> {
        let mut requests: Vec<_> = self.requests.values().map(|b| b.map.clone()).collect();
        let mut responses: Vec<_> = self.responses.values().map(|b| b.map.clone()).collect();
        requests.sort_by_key(ServiceMap::request_type);
        responses.sort_by_key(ServiceMap::request_type);
        requests.extend(responses);
        requests
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.requests.len() + self.responses.len()
    }

    /// Returns `true` if no handler is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn duplicate(map: &ServiceMap) -> HeraldError {
    HeraldError::internal(format!(
        "duplicate {} handler for '{}' ({})",
        map.kind(),
        map.request_type(),
        map.handler_type()
    ))
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("requests", &self.requests.keys().collect::<Vec<_>>())
            .field("responses", &self.responses.keys().collect::<Vec<_>>())
            .field("scoped", &self.scoped.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::{handler_fn, response_handler_fn, Lifetime};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize)]
    struct Add(i64, i64);

    impl Request for Add {
        type Output = i64;
    }

    fn adder() -> HandlerProvider<impl RequestHandler<Add>> {
        HandlerProvider::singleton(handler_fn(|_ctx: RequestContext, Add(a, b): Add| async move {
            HeraldResult::Ok(a + b)
        }))
    }

    #[test]
    fn test_lookup_by_identity_and_kind() {
        let mut registry = Registry::new();
        registry.add_request::<Add, _>(adder()).unwrap();

        let map = registry.service_map("Add", HandlerKind::Request).unwrap();
        assert_eq!(map.output_type(), "i64");
        assert_eq!(map.lifetime(), Lifetime::Singleton);
        assert!(registry.service_map("Add", HandlerKind::Response).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = Registry::new();
        registry.add_request::<Add, _>(adder()).unwrap();
        let err = registry.add_request::<Add, _>(adder()).unwrap_err();
        assert!(err.to_string().contains("duplicate request handler for 'Add'"));
    }

    #[test]
    fn test_request_and_response_coexist() {
        let mut registry = Registry::new();
        registry.add_request::<Add, _>(adder()).unwrap();
        registry
            .add_response::<Add, _>(HandlerProvider::singleton(response_handler_fn(
                |_ctx: RequestContext, _req: Add, _res: Option<i64>, _err: Option<String>| async move {
                    HeraldResult::Ok(())
                },
            )))
            .unwrap();

        let kinds: Vec<_> = registry.service_maps().iter().map(ServiceMap::kind).collect();
        assert_eq!(kinds, vec![HandlerKind::Request, HandlerKind::Response]);
    }

    #[tokio::test]
    async fn test_invoker_round_trip() {
        let mut registry = Registry::new();
        registry.add_request::<Add, _>(adder()).unwrap();
        let binding = registry.request("Add").unwrap();

        let request = binding.invoker.decode(b"[2,3]").unwrap();
        let output = binding
            .invoker
            .invoke(&Container::new(), RequestContext::new(), request)
            .await
            .unwrap()
            .unwrap();
        let encoded = binding.invoker.encode(output).unwrap();

        assert_eq!(encoded.payload_type, "i64");
        assert_eq!(&encoded.payload[..], b"5");
    }

    #[test]
    fn test_decode_rejects_wrong_shape() {
        let mut registry = Registry::new();
        registry.add_request::<Add, _>(adder()).unwrap();
        let err = registry.request("Add").unwrap().invoker.decode(b"{}").err().unwrap();
        assert!(matches!(err, HeraldError::Codec { .. }));
    }
}
