//! Local dispatch through the mediator.

use herald::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Ping {
    message: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Pong {
    message: String,
}

impl Request for Ping {
    type Output = Pong;
}

#[derive(Debug, Serialize, Deserialize)]
struct Unregistered;

impl Request for Unregistered {
    type Output = ();
}

struct PingHandler;

impl RequestHandler<Ping> for PingHandler {
    async fn handle(&self, ctx: &RequestContext, request: Ping) -> HeraldResult<Pong> {
        if request.message == "fail" {
            return Err(HeraldError::handler("ping failed"));
        }
        let suffix = ctx.authorization().map(|a| format!(" ({a})")).unwrap_or_default();
        Ok(Pong {
            message: format!("{}{suffix}", request.message),
        })
    }
}

fn ping(message: &str) -> Ping {
    Ping {
        message: message.to_string(),
    }
}

type Trace = Arc<Mutex<Vec<String>>>;

struct Recording {
    name: &'static str,
    trace: Trace,
}

impl Pipeline for Recording {
    fn name(&self) -> &'static str {
        self.name
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut PipelineContext,
        request: herald::core::BoxedRequest,
        next: Next<'a>,
    ) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            self.trace.lock().unwrap().push(format!("{}:in", self.name));
            let outcome = next.run(ctx, request).await;
            self.trace.lock().unwrap().push(format!("{}:out", self.name));
            outcome
        })
    }
}

struct ScopedRecording {
    trace: Trace,
}

impl RequestPipeline<Ping> for ScopedRecording {
    fn name(&self) -> &'static str {
        "C"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut PipelineContext,
        request: Ping,
        next: TypedNext<'a, Ping>,
    ) -> BoxFuture<'a, HeraldResult<Option<Pong>>> {
        Box::pin(async move {
            self.trace.lock().unwrap().push("C:in".to_string());
            let outcome = next.run(ctx, request).await;
            self.trace.lock().unwrap().push("C:out".to_string());
            outcome
        })
    }
}

struct Authorize;

impl Pipeline for Authorize {
    fn name(&self) -> &'static str {
        "authorize"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut PipelineContext,
        request: herald::core::BoxedRequest,
        next: Next<'a>,
    ) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            ctx.request_context_mut().set_authorization("svc-token");
            next.run(ctx, request).await
        })
    }
}

struct ShortCircuit;

impl RequestPipeline<Ping> for ShortCircuit {
    fn name(&self) -> &'static str {
        "cache"
    }

    fn process<'a>(
        &'a self,
        _ctx: &'a mut PipelineContext,
        _request: Ping,
        _next: TypedNext<'a, Ping>,
    ) -> BoxFuture<'a, HeraldResult<Option<Pong>>> {
        Box::pin(async {
            Ok(Some(Pong {
                message: "cached".to_string(),
            }))
        })
    }
}

#[tokio::test]
async fn test_send_runs_local_handler() {
    let mediator = Mediator::builder()
        .handler::<Ping, _>(PingHandler)
        .build()
        .unwrap();

    let pong = mediator.dispatcher().send(ping("hello")).await.unwrap();
    assert_eq!(pong.message, "hello");
    assert!(mediator.worker().is_none());
}

#[tokio::test]
async fn test_pipeline_order_is_global_then_scoped() {
    let trace = Trace::default();
    let mediator = Mediator::builder()
        .builtin_pipelines(false)
        .pipeline(Recording {
            name: "A",
            trace: trace.clone(),
        })
        .pipeline(Recording {
            name: "B",
            trace: trace.clone(),
        })
        .scoped_pipeline::<Ping, _>(ScopedRecording {
            trace: trace.clone(),
        })
        .handler::<Ping, _>(PingHandler)
        .build()
        .unwrap();

    mediator.dispatcher().send(ping("order")).await.unwrap();

    assert_eq!(
        *trace.lock().unwrap(),
        vec!["A:in", "B:in", "C:in", "C:out", "B:out", "A:out"]
    );
    assert_eq!(
        mediator.dispatcher().chain("Ping", HandlerKind::Request).stage_names(),
        vec!["A", "B", "C"]
    );
}

#[tokio::test]
async fn test_builtin_pipelines_precede_custom_ones() {
    let trace = Trace::default();
    let mediator = Mediator::builder()
        .validator::<Ping, _>(|_: &Ping| Ok(()))
        .pipeline(Recording { name: "A", trace })
        .handler::<Ping, _>(PingHandler)
        .build()
        .unwrap();

    let chain = mediator.dispatcher().chain("Ping", HandlerKind::Request);
    assert_eq!(chain.stage_names(), vec!["logging", "performance", "validation", "A"]);

    let reply_chain = mediator.dispatcher().chain("Ping", HandlerKind::Response);
    assert_eq!(reply_chain.stage_names(), vec!["logging", "performance", "A"]);
}

#[tokio::test]
async fn test_pipeline_can_modify_context() {
    let mediator = Mediator::builder()
        .pipeline(Authorize)
        .handler::<Ping, _>(PingHandler)
        .build()
        .unwrap();

    let pong = mediator.dispatcher().send(ping("hi")).await.unwrap();
    assert_eq!(pong.message, "hi (svc-token)");
}

#[tokio::test]
async fn test_scoped_pipeline_can_short_circuit() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let mediator = Mediator::builder()
        .scoped_pipeline::<Ping, _>(ShortCircuit)
        .handler::<Ping, _>(handler_fn(move |_ctx: RequestContext, request: Ping| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move {
                HeraldResult::Ok(Pong {
                    message: request.message,
                })
            }
        }))
        .build()
        .unwrap();

    let pong = mediator.dispatcher().send(ping("live")).await.unwrap();
    assert_eq!(pong.message, "cached");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unknown_request_is_configuration_error() {
    let mediator = Mediator::builder().build().unwrap();

    let err = mediator.dispatcher().send(Unregistered).await.unwrap_err();
    assert!(err.is_configuration());
    assert!(matches!(
        err,
        HeraldError::UnknownRequest {
            kind: HandlerKind::Request,
            ..
        }
    ));
}

#[tokio::test]
async fn test_handler_error_propagates() {
    let mediator = Mediator::builder()
        .handler::<Ping, _>(PingHandler)
        .build()
        .unwrap();

    let err = mediator.dispatcher().send(ping("fail")).await.unwrap_err();
    assert_eq!(err.to_string(), "ping failed");
}

#[tokio::test]
async fn test_validation_rejects_requests_but_not_replies() {
    let replies = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&replies);
    let mediator = Mediator::builder()
        .validator::<Ping, _>(|_: &Ping| Err(vec!["always invalid".to_string()]))
        .handler::<Ping, _>(PingHandler)
        .response_handler::<Ping, _>(response_handler_fn(
            move |_ctx: RequestContext, _request: Ping, _result: Option<Pong>, _error: Option<String>| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { HeraldResult::Ok(()) }
            },
        ))
        .build()
        .unwrap();

    let err = mediator.dispatcher().send(ping("x")).await.unwrap_err();
    match err {
        HeraldError::Validation { failures, .. } => assert_eq!(failures, vec!["always invalid"]),
        other => panic!("unexpected error: {other:?}"),
    }

    mediator
        .dispatcher()
        .send_reply(&RequestContext::new(), ping("x"), None, Some("remote failure".to_string()))
        .await
        .unwrap();
    assert_eq!(replies.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_transient_handler_resolves_services_per_dispatch() {
    struct Greeting(String);

    struct GreetingHandler {
        greeting: Arc<Greeting>,
    }

    impl RequestHandler<Ping> for GreetingHandler {
        async fn handle(&self, _ctx: &RequestContext, request: Ping) -> HeraldResult<Pong> {
            Ok(Pong {
                message: format!("{} {}", self.greeting.0, request.message),
            })
        }
    }

    let built = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&built);
    let mediator = Mediator::builder()
        .service(Arc::new(Greeting("hello".to_string())))
        .transient_handler::<Ping, _, _>(move |c: &Container| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(GreetingHandler {
                greeting: c.resolve_required()?,
            })
        })
        .build()
        .unwrap();

    let dispatcher = mediator.dispatcher();
    assert_eq!(dispatcher.send(ping("a")).await.unwrap().message, "hello a");
    assert_eq!(dispatcher.send(ping("b")).await.unwrap().message, "hello b");
    assert_eq!(built.load(Ordering::SeqCst), 2);
    assert_eq!(
        dispatcher
            .registry()
            .service_map("Ping", HandlerKind::Request)
            .map(ServiceMap::lifetime),
        Some(Lifetime::Transient)
    );
}

#[tokio::test]
async fn test_missing_service_fails_dispatch() {
    struct Missing;

    struct NeedsMissing {
        _missing: Arc<Missing>,
    }

    impl RequestHandler<Ping> for NeedsMissing {
        async fn handle(&self, _ctx: &RequestContext, request: Ping) -> HeraldResult<Pong> {
            Ok(Pong {
                message: request.message,
            })
        }
    }

    let mediator = Mediator::builder()
        .transient_handler::<Ping, _, _>(|c: &Container| {
            Ok(NeedsMissing {
                _missing: c.resolve_required()?,
            })
        })
        .build()
        .unwrap();

    let err = mediator.dispatcher().send(ping("x")).await.unwrap_err();
    assert!(matches!(err, HeraldError::Internal { .. }));
}

#[tokio::test]
async fn test_publish_without_broker_fails() {
    let mediator = Mediator::builder()
        .handler::<Ping, _>(PingHandler)
        .build()
        .unwrap();

    let err = mediator.dispatcher().publish(&ping("x"), true).await.unwrap_err();
    assert!(err.to_string().contains("no broker configured"));
}

#[test]
fn test_duplicate_handler_fails_build() {
    let err = Mediator::builder()
        .handler::<Ping, _>(PingHandler)
        .handler::<Ping, _>(PingHandler)
        .build()
        .unwrap_err();
    assert!(err.to_string().contains("duplicate request handler for 'Ping'"));
}
