//! Mediator assembly: handlers, pipelines, services and the consumer worker.

use crate::dispatcher::Dispatcher;
use crate::registry::Registry;
use herald_config::{HeraldConfig, PipelinesConfig};
use herald_core::di::{Container, HandlerProvider};
use herald_core::{HeraldError, HeraldResult, Request, RequestHandler, ResponseHandler, ServiceMap};
use herald_middleware::stages::{
    LogMode, LoggingPipeline, PerformancePipeline, ValidationPipeline, Validator, Validators,
};
use herald_middleware::{BoxedPipeline, Pipeline, RequestPipeline, Scoped};
use herald_queue::{QueueConfig, Queuing, SharedBroker};
use herald_tasks::{LocalDispatch, RunnerStats, Supervisor, WorkerResult};
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A built mediator: the dispatcher plus, when a broker is configured, the
/// worker that consumes this process's streams.
#[derive(Debug)]
pub struct Mediator {
    dispatcher: Dispatcher,
    worker: Option<ConsumerWorker>,
}

impl Mediator {
    /// Creates a new builder.
    #[must_use]
    pub fn builder() -> MediatorBuilder {
        MediatorBuilder::new()
    }

    /// The dispatcher.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// The consumer worker, if a broker was configured.
    pub fn worker(&self) -> Option<&ConsumerWorker> {
        self.worker.as_ref()
    }

    /// Splits the mediator into its dispatcher and worker.
    pub fn into_parts(self) -> (Dispatcher, Option<ConsumerWorker>) {
        (self.dispatcher, self.worker)
    }
}

/// Runs the supervised consumer runners for every registered handler.
pub struct ConsumerWorker {
    supervisor: Arc<Supervisor>,
    maps: Vec<ServiceMap>,
}

impl ConsumerWorker {
    /// Spawns the runner set. It stops when `shutdown` is cancelled, or
    /// fails once the restart limit is exhausted.
    pub fn start(&self, shutdown: CancellationToken) -> JoinHandle<WorkerResult<()>> {
        let supervisor = Arc::clone(&self.supervisor);
        tokio::spawn(async move { supervisor.run(&shutdown).await })
    }

    /// Runs the runner set on the current task.
    pub async fn run(&self, shutdown: &CancellationToken) -> WorkerResult<()> {
        self.supervisor.run(shutdown).await
    }

    /// Runner statistics.
    pub fn stats(&self) -> &Arc<RunnerStats> {
        self.supervisor.stats()
    }

    /// The handlers whose streams this worker consumes.
    pub fn service_maps(&self) -> &[ServiceMap] {
        &self.maps
    }
}

impl fmt::Debug for ConsumerWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerWorker")
            .field("handlers", &self.maps.len())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Mediator`].
///
/// Built-in global stages come first, in this order: logging (unless the
/// log mode is `none`), performance, validation (when enabled and at least
/// one validator is registered). Pipelines added with
/// [`pipeline`](Self::pipeline) follow in registration order.
///
/// # Example
///
/// ```rust,ignore
/// let mediator = Mediator::builder()
///     .config(config)
///     .broker(MemoryBroker::shared())
///     .service(Arc::new(Inventory::default()))
///     .handler::<Reserve, _>(ReserveHandler)
///     .response_handler::<Reserve, _>(ReservedHandler)
///     .build()?;
///
/// let worker = mediator.worker().expect("broker configured");
/// let handle = worker.start(shutdown.clone());
/// ```
#[derive(Default)]
pub struct MediatorBuilder {
    registry: Registry,
    container: Container,
    global: Vec<BoxedPipeline>,
    validators: Validators,
    queue: QueueConfig,
    pipelines: PipelinesConfig,
    builtin_pipelines: bool,
    broker: Option<SharedBroker>,
    error: Option<HeraldError>,
}

impl MediatorBuilder {
    /// Creates a builder with default options and the built-in pipelines on.
    #[must_use]
    pub fn new() -> Self {
        Self {
            builtin_pipelines: true,
            ..Self::default()
        }
    }

    /// Applies the queue and pipeline sections of a loaded configuration.
    #[must_use]
    pub fn config(mut self, config: HeraldConfig) -> Self {
        self.queue = config.queue;
        self.pipelines = config.pipelines;
        self
    }

    /// Sets the queuing options.
    #[must_use]
    pub fn queue_config(mut self, queue: QueueConfig) -> Self {
        self.queue = queue;
        self
    }

    /// Sets the built-in pipeline options.
    #[must_use]
    pub fn pipelines_config(mut self, pipelines: PipelinesConfig) -> Self {
        self.pipelines = pipelines;
        self
    }

    /// Enables or disables the built-in global pipelines.
    #[must_use]
    pub fn builtin_pipelines(mut self, enabled: bool) -> Self {
        self.builtin_pipelines = enabled;
        self
    }

    /// Sets the broker. Without one, `publish` fails and no worker is built.
    #[must_use]
    pub fn broker(mut self, broker: SharedBroker) -> Self {
        self.broker = Some(broker);
        self
    }

    /// Registers a shared service for transient handler factories.
    #[must_use]
    pub fn service<T: Send + Sync + 'static>(mut self, service: Arc<T>) -> Self {
        self.container.register(service);
        self
    }

    /// Registers a singleton request handler for `R`.
    #[must_use]
    pub fn handler<R, H>(self, handler: H) -> Self
    where
        R: Request,
        H: RequestHandler<R>,
    {
        self.request_provider::<R, H>(HandlerProvider::singleton(handler))
    }

    /// Registers a request handler for `R` built per dispatch.
    #[must_use]
    pub fn transient_handler<R, H, F>(self, factory: F) -> Self
    where
        R: Request,
        H: RequestHandler<R>,
        F: Fn(&Container) -> HeraldResult<H> + Send + Sync + 'static,
    {
        self.request_provider::<R, H>(HandlerProvider::transient(factory))
    }

    /// Registers a singleton response handler for replies to `R`.
    #[must_use]
    pub fn response_handler<R, H>(self, handler: H) -> Self
    where
        R: Request,
        H: ResponseHandler<R>,
    {
        self.response_provider::<R, H>(HandlerProvider::singleton(handler))
    }

    /// Registers a response handler for `R` built per reply.
    #[must_use]
    pub fn transient_response_handler<R, H, F>(self, factory: F) -> Self
    where
        R: Request,
        H: ResponseHandler<R>,
        F: Fn(&Container) -> HeraldResult<H> + Send + Sync + 'static,
    {
        self.response_provider::<R, H>(HandlerProvider::transient(factory))
    }

    /// Adds a global pipeline, wrapping every dispatch.
    #[must_use]
    pub fn pipeline<P: Pipeline>(mut self, pipeline: P) -> Self {
        self.global.push(Arc::new(pipeline));
        self
    }

    /// Adds a pipeline that only wraps dispatches of `R`.
    #[must_use]
    pub fn scoped_pipeline<R, P>(mut self, pipeline: P) -> Self
    where
        R: Request,
        P: RequestPipeline<R>,
    {
        self.registry
            .add_scoped(R::type_identity(), Arc::new(Scoped::<P, R>::new(pipeline)));
        self
    }

    /// Registers a validator for `R`.
    #[must_use]
    pub fn validator<R, V>(mut self, validator: V) -> Self
    where
        R: Request,
        V: Validator<R>,
    {
        self.validators.register::<R, V>(validator);
        self
    }

    fn request_provider<R, H>(mut self, provider: HandlerProvider<H>) -> Self
    where
        R: Request,
        H: RequestHandler<R>,
    {
        if let Err(err) = self.registry.add_request::<R, H>(provider) {
            self.error.get_or_insert(err);
        }
        self
    }

    fn response_provider<R, H>(mut self, provider: HandlerProvider<H>) -> Self
    where
        R: Request,
        H: ResponseHandler<R>,
    {
        if let Err(err) = self.registry.add_response::<R, H>(provider) {
            self.error.get_or_insert(err);
        }
        self
    }

    /// Builds the mediator.
    ///
    /// # Errors
    ///
    /// Returns the first registration error (a duplicate handler), or
    /// `HeraldError::Internal` when the queue options are invalid.
    pub fn build(self) -> HeraldResult<Mediator> {
        if let Some(err) = self.error {
            return Err(err);
        }

        let mut global: Vec<BoxedPipeline> = Vec::with_capacity(self.global.len() + 3);
        if self.builtin_pipelines {
            if self.pipelines.log_mode != LogMode::None {
                global.push(Arc::new(LoggingPipeline::new(self.pipelines.log_mode)));
            }
            global.push(Arc::new(PerformancePipeline::new(self.pipelines.slow_command())));
            if self.pipelines.validation && !self.validators.is_empty() {
                global.push(Arc::new(ValidationPipeline::new(self.validators)));
            }
        }
        global.extend(self.global);

        let maps = self.registry.service_maps();
        let queuing = match self.broker {
            Some(broker) => {
                let config = HeraldConfig {
                    queue: self.queue,
                    ..HeraldConfig::default()
                };
                config
                    .validate()
                    .map_err(|e| HeraldError::internal_with_source("invalid queue configuration", e))?;
                Some(Arc::new(Queuing::new(broker, config.queue)))
            }
            None => None,
        };

        let dispatcher = Dispatcher::new(self.registry, self.container, global, queuing.clone());

        let worker = queuing.map(|queuing| {
            let dispatch: Arc<dyn LocalDispatch> = Arc::new(dispatcher.clone());
            ConsumerWorker {
                supervisor: Arc::new(Supervisor::new(queuing, dispatch, maps.clone())),
                maps,
            }
        });

        tracing::debug!(
            handlers = dispatcher.registry().len(),
            distributed = worker.is_some(),
            "mediator built"
        );

        Ok(Mediator { dispatcher, worker })
    }
}

impl fmt::Debug for MediatorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediatorBuilder")
            .field("registry", &self.registry)
            .field("global_pipelines", &self.global.len())
            .field("validators", &self.validators)
            .field("queue", &self.queue)
            .field("broker", &self.broker.is_some())
            .finish_non_exhaustive()
    }
}
