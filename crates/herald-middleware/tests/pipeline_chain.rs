//! End-to-end chain ordering tests.

use herald_core::{BoxedRequest, HandlerKind, HeraldError, Request, RequestContext};
use herald_middleware::stages::{LogMode, LoggingPipeline, ValidationPipeline, Validators};
use herald_middleware::{
    downcast_output, BoxFuture, BoxedOutput, BoxedPipeline, Chain, Next, Outcome, Pipeline,
    PipelineContext, RequestPipeline, Scoped, TypedNext,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Serialize, Deserialize)]
struct Echo(String);

impl Request for Echo {
    type Output = String;
}

type Journal = Arc<Mutex<Vec<String>>>;

/// Records entry and exit around the rest of the chain.
struct Recording {
    name: &'static str,
    journal: Journal,
}

impl Pipeline for Recording {
    fn name(&self) -> &'static str {
        self.name
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut PipelineContext,
        request: BoxedRequest,
        next: Next<'a>,
    ) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            self.journal.lock().push(format!("in:{}", self.name));
            let outcome = next.run(ctx, request).await;
            self.journal.lock().push(format!("out:{}", self.name));
            outcome
        })
    }
}

/// Typed stage that upper-cases the echoed text on the way in.
struct Shout {
    journal: Journal,
}

impl RequestPipeline<Echo> for Shout {
    fn name(&self) -> &'static str {
        "shout"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut PipelineContext,
        request: Echo,
        next: TypedNext<'a, Echo>,
    ) -> BoxFuture<'a, herald_core::HeraldResult<Option<String>>> {
        Box::pin(async move {
            self.journal.lock().push("in:shout".to_string());
            let outcome = next.run(ctx, Echo(request.0.to_uppercase())).await;
            self.journal.lock().push("out:shout".to_string());
            outcome
        })
    }
}

/// Short-circuits with a fixed answer.
struct Cached;

impl Pipeline for Cached {
    fn name(&self) -> &'static str {
        "cached"
    }

    fn process<'a>(
        &'a self,
        _ctx: &'a mut PipelineContext,
        _request: BoxedRequest,
        _next: Next<'a>,
    ) -> BoxFuture<'a, Outcome> {
        Box::pin(async {
            let output: BoxedOutput = Box::new("from cache".to_string());
            Outcome::Ok(Some(output))
        })
    }
}

fn recording(name: &'static str, journal: &Journal) -> BoxedPipeline {
    Arc::new(Recording {
        name,
        journal: Arc::clone(journal),
    })
}

fn echo_handler(
    journal: Journal,
) -> impl FnOnce(&mut PipelineContext, BoxedRequest) -> BoxFuture<'static, Outcome> + Send {
    move |_ctx, request| {
        Box::pin(async move {
            journal.lock().push("handler".to_string());
            let Echo(text) = request.downcast::<Echo>()?;
            let output: BoxedOutput = Box::new(text);
            Outcome::Ok(Some(output))
        })
    }
}

fn context(target: HandlerKind) -> PipelineContext {
    PipelineContext::new(RequestContext::new(), "Echo", target)
}

#[tokio::test]
async fn globals_wrap_scoped_which_wrap_the_handler() {
    let journal: Journal = Arc::default();
    let chain = Chain::compose(
        &[recording("a", &journal), recording("b", &journal)],
        &[recording("c", &journal)],
        HandlerKind::Request,
    );

    let mut ctx = context(HandlerKind::Request);
    let outcome = chain
        .run(&mut ctx, Box::new(Echo("hi".into())), echo_handler(Arc::clone(&journal)))
        .await
        .unwrap();

    assert_eq!(downcast_output::<Echo>(outcome).unwrap().as_deref(), Some("hi"));
    assert_eq!(
        *journal.lock(),
        vec!["in:a", "in:b", "in:c", "handler", "out:c", "out:b", "out:a"]
    );
}

#[tokio::test]
async fn typed_scoped_stage_rewrites_request() {
    let journal: Journal = Arc::default();
    let chain = Chain::builder()
        .add_global(recording("a", &journal))
        .add_scoped(Arc::new(Scoped::new(Shout {
            journal: Arc::clone(&journal),
        })))
        .build();

    let mut ctx = context(HandlerKind::Request);
    let outcome = chain
        .run(&mut ctx, Box::new(Echo("quiet".into())), echo_handler(Arc::clone(&journal)))
        .await
        .unwrap();

    assert_eq!(downcast_output::<Echo>(outcome).unwrap().as_deref(), Some("QUIET"));
    assert_eq!(
        *journal.lock(),
        vec!["in:a", "in:shout", "handler", "out:shout", "out:a"]
    );
}

#[tokio::test]
async fn short_circuit_skips_inner_stages() {
    let journal: Journal = Arc::default();
    let chain = Chain::builder()
        .add_global(recording("a", &journal))
        .add_global(Arc::new(Cached))
        .add_scoped(recording("c", &journal))
        .build();

    let mut ctx = context(HandlerKind::Request);
    let outcome = chain
        .run(&mut ctx, Box::new(Echo("hi".into())), echo_handler(Arc::clone(&journal)))
        .await
        .unwrap();

    assert_eq!(
        downcast_output::<Echo>(outcome).unwrap().as_deref(),
        Some("from cache")
    );
    assert_eq!(*journal.lock(), vec!["in:a", "out:a"]);
}

#[tokio::test]
async fn validation_never_runs_for_response_targets() {
    let journal: Journal = Arc::default();
    let mut validators = Validators::new();
    validators.register::<Echo, _>(|_: &Echo| -> Result<(), Vec<String>> {
        Err(vec!["always invalid".to_string()])
    });
    let global: Vec<BoxedPipeline> = vec![
        Arc::new(LoggingPipeline::new(LogMode::None)),
        Arc::new(ValidationPipeline::new(validators)),
    ];

    let request_chain = Chain::compose(&global, &[], HandlerKind::Request);
    let response_chain = Chain::compose(&global, &[], HandlerKind::Response);
    assert_eq!(request_chain.stage_names(), vec!["logging", "validation"]);
    assert_eq!(response_chain.stage_names(), vec!["logging"]);

    let mut ctx = context(HandlerKind::Request);
    let rejected = request_chain
        .run(&mut ctx, Box::new(Echo("x".into())), echo_handler(Arc::clone(&journal)))
        .await;
    assert!(matches!(rejected, Err(HeraldError::Validation { .. })));
    assert!(journal.lock().is_empty());

    let mut ctx = context(HandlerKind::Response);
    let accepted = response_chain
        .run(&mut ctx, Box::new(Echo("x".into())), echo_handler(Arc::clone(&journal)))
        .await;
    assert!(accepted.is_ok());
    assert_eq!(*journal.lock(), vec!["handler"]);
}

#[tokio::test]
async fn handler_errors_propagate_through_every_stage() {
    let journal: Journal = Arc::default();
    let chain = Chain::compose(&[recording("a", &journal)], &[], HandlerKind::Request);

    let mut ctx = context(HandlerKind::Request);
    let err = chain
        .run(&mut ctx, Box::new(Echo("x".into())), |_ctx, _req| {
            Box::pin(async { Outcome::Err(HeraldError::handler("handler exploded")) })
        })
        .await
        .err()
        .unwrap();

    assert_eq!(err.to_string(), "handler exploded");
    assert_eq!(*journal.lock(), vec!["in:a", "out:a"]);
}
