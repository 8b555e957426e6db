//! Runner tests against the in-memory broker.

use bytes::Bytes;
use futures_util::future::BoxFuture;
use herald_core::{HandlerKind, HeraldError, HeraldResult, Lifetime, Request, RequestContext, ServiceMap};
use herald_queue::{
    Broker, BrokerError, IdBound, MemoryBroker, Message, QueueConfig, Queuing, StreamKey,
    StreamRecord,
};
use herald_tasks::{
    ConsumerReader, EncodedOutput, EntryProcessor, KeyCountLocker, LocalDispatch, PendingSweeper,
    RunnerStats, Supervisor, WorkerError,
};
use herald_test::{BrokerOp, CountingBroker};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;

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

struct PingHandler;

#[derive(Debug, Default)]
struct Seen {
    requests: Vec<(String, Option<String>)>,
    replies: Vec<(Ping, Option<Pong>, Option<String>)>,
}

#[derive(Default)]
struct PingDispatch {
    seen: Mutex<Seen>,
    entered: Notify,
    gate: Option<Notify>,
}

impl PingDispatch {
    fn gated() -> Self {
        Self {
            gate: Some(Notify::new()),
            ..Self::default()
        }
    }
}

impl LocalDispatch for PingDispatch {
    fn handle_request<'a>(
        &'a self,
        ctx: RequestContext,
        service_type: &'a str,
        payload: &'a [u8],
    ) -> BoxFuture<'a, HeraldResult<EncodedOutput>> {
        Box::pin(async move {
            assert_eq!(service_type, "Ping");
            let ping: Ping = serde_json::from_slice(payload).unwrap();
            self.seen
                .lock()
                .unwrap()
                .requests
                .push((ping.message.clone(), ctx.authorization().map(ToString::to_string)));
            self.entered.notify_one();
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if ping.message == "fail" {
                return Err(HeraldError::handler("ping failed"));
            }
            let pong = Pong {
                message: ping.message,
            };
            Ok(EncodedOutput {
                payload_type: "Pong".to_string(),
                payload: Bytes::from(serde_json::to_vec(&pong).unwrap()),
            })
        })
    }

    fn handle_reply<'a>(
        &'a self,
        _ctx: RequestContext,
        _service_type: &'a str,
        referer: &'a [u8],
        payload: Option<&'a [u8]>,
        error: Option<&'a str>,
    ) -> BoxFuture<'a, HeraldResult<()>> {
        Box::pin(async move {
            let request: Ping = serde_json::from_slice(referer).unwrap();
            let result = payload.map(|p| serde_json::from_slice::<Pong>(p).unwrap());
            self.seen
                .lock()
                .unwrap()
                .replies
                .push((request, result, error.map(ToString::to_string)));
            Ok(())
        })
    }
}

fn config(group: &str) -> QueueConfig {
    QueueConfig {
        group_name: group.to_string(),
        machine_name: "host-1".to_string(),
        prefix: Some("evt".to_string()),
        ..QueueConfig::default()
    }
}

fn request_map() -> ServiceMap {
    ServiceMap::of::<Ping, PingHandler>(HandlerKind::Request, Lifetime::Singleton)
}

fn response_map() -> ServiceMap {
    ServiceMap::of::<Ping, PingHandler>(HandlerKind::Response, Lifetime::Singleton)
}

fn ping(message: &str) -> Ping {
    Ping {
        message: message.to_string(),
    }
}

struct Harness {
    broker: Arc<MemoryBroker>,
    queuing: Arc<Queuing>,
    dispatch: Arc<PingDispatch>,
    stats: Arc<RunnerStats>,
    processor: Arc<EntryProcessor>,
}

impl Harness {
    fn new(config: QueueConfig, dispatch: PingDispatch) -> Self {
        let broker = MemoryBroker::shared();
        let queuing = Arc::new(Queuing::new(broker.clone(), config));
        let dispatch = Arc::new(dispatch);
        let stats = Arc::new(RunnerStats::new());
        let processor = Arc::new(EntryProcessor::new(
            queuing.clone(),
            dispatch.clone(),
            stats.clone(),
        ));
        Self {
            broker,
            queuing,
            dispatch,
            stats,
            processor,
        }
    }

    fn reader(&self) -> Arc<ConsumerReader> {
        let limit = self.queuing.config().worker_task_limit;
        Arc::new(ConsumerReader::new(self.processor.clone(), KeyCountLocker::new(limit)))
    }

    fn replies(&self, key: &str) -> Vec<Message> {
        self.broker
            .range(key)
            .iter()
            .map(|entry| Message::decode(&StreamRecord::from_entry(entry).data).unwrap())
            .collect()
    }

    async fn pending(&self, key: &str) -> usize {
        self.broker
            .pending(key, &self.queuing.config().group_name, IdBound::Min, IdBound::Max, 100)
            .await
            .unwrap()
            .len()
    }
}

fn key(name: &str) -> StreamKey {
    StreamKey::from_normalized(name)
}

#[tokio::test]
async fn test_round_trip_publishes_reply_to_origin_group() {
    let h = Harness::new(config("svcA"), PingDispatch::default());
    h.queuing.register_consumer(&[request_map()]).await.unwrap();

    let ctx = RequestContext::new().with_authorization("Bearer abc");
    h.queuing.publish_request(&ping("hello"), true, &ctx).await.unwrap();

    let processed = h.reader().drain(&key("evt:ping"), &CancellationToken::new()).await.unwrap();
    assert_eq!(processed, 1);
    assert_eq!(h.pending("evt:ping").await, 0);

    let replies = h.replies("evt:svca:ping");
    assert_eq!(replies.len(), 1);
    let reply = &replies[0];
    assert_eq!(reply.referer.as_deref(), Some(&serde_json::to_vec(&ping("hello")).unwrap()[..]));
    assert_eq!(reply.referer_type.as_deref(), Some("Ping"));
    assert_eq!(reply.payload_type.as_deref(), Some("Pong"));
    assert_eq!(reply.decode_payload::<Pong>().unwrap().message, "hello");
    assert_eq!(reply.error, None);
    assert_eq!(reply.request_id.as_deref(), Some(ctx.request_id().as_str()));

    let seen = h.dispatch.seen.lock().unwrap();
    assert_eq!(seen.requests, vec![("hello".to_string(), Some("Bearer abc".to_string()))]);
    assert_eq!(h.stats.total_replied(), 1);
    assert_eq!(h.stats.total_acked(), 1);
}

#[tokio::test]
async fn test_no_reply_without_respond() {
    let h = Harness::new(config("svcA"), PingDispatch::default());
    h.queuing.register_consumer(&[request_map()]).await.unwrap();
    h.queuing
        .publish_request(&ping("quiet"), false, &RequestContext::new())
        .await
        .unwrap();

    h.reader().drain(&key("evt:ping"), &CancellationToken::new()).await.unwrap();

    assert!(h.replies("evt:svca:ping").is_empty());
    assert_eq!(h.pending("evt:ping").await, 0);
    assert_eq!(h.dispatch.seen.lock().unwrap().requests.len(), 1);
}

#[tokio::test]
async fn test_handler_failure_is_acked_and_replied_with_error() {
    let h = Harness::new(config("svcA"), PingDispatch::default());
    h.queuing.register_consumer(&[request_map()]).await.unwrap();
    h.queuing
        .publish_request(&ping("fail"), true, &RequestContext::new())
        .await
        .unwrap();

    h.reader().drain(&key("evt:ping"), &CancellationToken::new()).await.unwrap();

    assert_eq!(h.pending("evt:ping").await, 0);
    let replies = h.replies("evt:svca:ping");
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].error.as_deref(), Some("ping failed"));
    assert!(replies[0].payload.is_none());
    assert_eq!(h.stats.total_failed(), 1);
}

#[tokio::test]
async fn test_empty_and_undecodable_entries_are_skipped_and_acked() {
    let h = Harness::new(config("svcA"), PingDispatch::default());
    h.queuing.register_consumer(&[request_map()]).await.unwrap();
    for data in [Bytes::new(), Bytes::from_static(b"not json")] {
        h.broker
            .append("evt:ping", StreamRecord::fields("evt:ping", 0, data), None)
            .await
            .unwrap();
    }
    h.queuing
        .publish_request(&ping("after"), true, &RequestContext::new())
        .await
        .unwrap();

    let processed = h.reader().drain(&key("evt:ping"), &CancellationToken::new()).await.unwrap();

    assert_eq!(processed, 3);
    assert_eq!(h.pending("evt:ping").await, 0);
    assert_eq!(h.stats.total_failed(), 1);
    assert_eq!(h.replies("evt:svca:ping").len(), 1);
}

#[tokio::test]
async fn test_reply_runs_response_handler_without_publishing() {
    let h = Harness::new(config("svcA"), PingDispatch::default());
    h.queuing.register_consumer(&[response_map()]).await.unwrap();

    let request = Message::request(&ping("hi"), true, &RequestContext::new(), "svcA", "host-1").unwrap();
    let mut reply = request.outgoing("svcB", "host-9");
    reply.payload_type = Some("Pong".to_string());
    reply.payload = Some(Bytes::from(serde_json::to_vec(&Pong { message: "hi".into() }).unwrap()));
    h.queuing.publish(&key("evt:svca:ping"), &reply).await.unwrap();

    h.reader().drain(&key("evt:svca:ping"), &CancellationToken::new()).await.unwrap();

    let seen = h.dispatch.seen.lock().unwrap();
    assert_eq!(seen.replies.len(), 1);
    assert_eq!(seen.replies[0].0, ping("hi"));
    assert_eq!(seen.replies[0].1, Some(Pong { message: "hi".into() }));
    assert_eq!(seen.replies[0].2, None);
    assert_eq!(h.broker.len("evt:svca:ping"), 1);
    assert!(h.broker.range("evt:svcb:ping").is_empty());
    assert_eq!(h.pending("evt:svca:ping").await, 0);
}

#[tokio::test]
async fn test_notification_at_limit_does_not_read() {
    let broker = Arc::new(CountingBroker::new(MemoryBroker::new()));
    let queuing = Arc::new(Queuing::new(
        broker.clone(),
        QueueConfig {
            worker_task_limit: 1,
            ..config("svcA")
        },
    ));
    let dispatch = Arc::new(PingDispatch::gated());
    let stats = Arc::new(RunnerStats::new());
    let processor = Arc::new(EntryProcessor::new(queuing.clone(), dispatch.clone(), stats.clone()));
    let reader = Arc::new(ConsumerReader::new(processor, KeyCountLocker::new(1)));

    queuing.register_consumer(&[request_map()]).await.unwrap();
    queuing
        .publish_request(&ping("slow"), true, &RequestContext::new())
        .await
        .unwrap();
    broker.reset();

    let cancel = CancellationToken::new();
    let (failures, _failures_rx) = mpsc::unbounded_channel();
    assert!(reader.notify(key("evt:ping"), &cancel, &failures));
    dispatch.entered.notified().await;

    assert!(!reader.notify(key("evt:ping"), &cancel, &failures));
    assert_eq!(broker.calls(BrokerOp::ReadGroup), 1);
    assert_eq!(stats.total_dropped_notifications(), 1);

    if let Some(gate) = &dispatch.gate {
        gate.notify_one();
    }
    while reader.locker().count(&key("evt:ping")) > 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(broker.calls(BrokerOp::ReadGroup), 2);
    assert_eq!(broker.calls(BrokerOp::Ack), 1);
}

#[tokio::test(start_paused = true)]
async fn test_sweeper_reclaims_idle_entries_and_evicts_consumers() {
    let h = Harness::new(config("svcA"), PingDispatch::default());
    let keys: BTreeSet<StreamKey> = h.queuing.register_consumer(&[request_map()]).await.unwrap();
    h.queuing
        .publish_request(&ping("lost"), true, &RequestContext::new())
        .await
        .unwrap();

    // delivered to a consumer that never acks
    let delivered = h.broker.read_group("evt:ping", "svcA", "dead-host", 10).await.unwrap();
    assert_eq!(delivered.len(), 1);

    let sweeper = PendingSweeper::new(h.processor.clone());
    let cancel = CancellationToken::new();
    assert_eq!(sweeper.sweep(&keys, &cancel).await.unwrap(), 0);
    assert_eq!(h.pending("evt:ping").await, 1);

    tokio::time::advance(Duration::from_secs(6)).await;
    assert_eq!(sweeper.sweep(&keys, &cancel).await.unwrap(), 1);

    assert_eq!(h.pending("evt:ping").await, 0);
    assert_eq!(h.replies("evt:svca:ping").len(), 1);
    assert_eq!(h.stats.total_claimed(), 1);
    assert_eq!(h.stats.total_evicted_consumers(), 1);

    let consumers = h.broker.list_consumers("evt:ping", "svcA").await.unwrap();
    let names: Vec<_> = consumers.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["host-1"]);
    assert!(!sweeper.is_sweeping());
}

#[tokio::test(start_paused = true)]
async fn test_sweeper_pages_past_busy_entries() {
    let h = Harness::new(
        QueueConfig {
            stream_batch_size: 2,
            ..config("svcA")
        },
        PingDispatch::default(),
    );
    let keys = h.queuing.register_consumer(&[request_map()]).await.unwrap();
    let ctx = RequestContext::new();
    for n in 0..5 {
        h.queuing
            .publish_request(&ping(&n.to_string()), true, &ctx)
            .await
            .unwrap();
    }
    h.broker.read_group("evt:ping", "svcA", "dead-host", 10).await.unwrap();
    tokio::time::advance(Duration::from_secs(6)).await;

    let sweeper = PendingSweeper::new(h.processor.clone());
    assert_eq!(sweeper.sweep(&keys, &CancellationToken::new()).await.unwrap(), 5);
    assert_eq!(h.replies("evt:svca:ping").len(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_sweeper_keeps_consumer_with_entries_behind_busy_page() {
    let h = Harness::new(
        QueueConfig {
            stream_batch_size: 2,
            ..config("svcA")
        },
        PingDispatch::default(),
    );
    let keys = h.queuing.register_consumer(&[request_map()]).await.unwrap();
    let ctx = RequestContext::new();
    for n in 0..3 {
        h.queuing
            .publish_request(&ping(&n.to_string()), true, &ctx)
            .await
            .unwrap();
    }
    let delivered = h.broker.read_group("evt:ping", "svcA", "dead-host", 10).await.unwrap();
    assert_eq!(delivered.len(), 3);
    tokio::time::advance(Duration::from_secs(6)).await;

    // a live consumer takes over the first page, leaving the third entry behind it
    let busy: Vec<_> = delivered[..2].iter().map(|entry| entry.id).collect();
    let claimed = h
        .broker
        .claim("evt:ping", "svcA", "live-host", Duration::ZERO, &busy)
        .await
        .unwrap();
    assert_eq!(claimed.len(), 2);

    let sweeper = PendingSweeper::new(h.processor.clone());
    let cancel = CancellationToken::new();
    assert_eq!(sweeper.sweep(&keys, &cancel).await.unwrap(), 0);
    assert_eq!(h.pending("evt:ping").await, 3);
    assert_eq!(h.stats.total_evicted_consumers(), 0);
    let consumers = h.broker.list_consumers("evt:ping", "svcA").await.unwrap();
    assert!(consumers.iter().any(|c| c.name == "dead-host" && c.pending == 1));

    h.broker.ack("evt:ping", "svcA", &busy).await.unwrap();
    tokio::time::advance(Duration::from_secs(6)).await;
    assert_eq!(sweeper.sweep(&keys, &cancel).await.unwrap(), 1);

    assert_eq!(h.pending("evt:ping").await, 0);
    let replies = h.replies("evt:svca:ping");
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].decode_payload::<Pong>().unwrap().message, "2");
    let consumers = h.broker.list_consumers("evt:ping", "svcA").await.unwrap();
    assert!(consumers.iter().all(|c| c.name != "dead-host"));
}

#[tokio::test(start_paused = true)]
async fn test_supervisor_gives_up_after_retry_limit() {
    let inner = MemoryBroker::new();
    inner.set_offline(true);
    let broker = Arc::new(CountingBroker::new(inner));
    let queuing = Arc::new(Queuing::new(
        broker.clone(),
        QueueConfig {
            retry_limit: 2,
            ..config("svcA")
        },
    ));
    let supervisor = Supervisor::new(queuing, Arc::new(PingDispatch::default()), vec![request_map()]);

    let started = tokio::time::Instant::now();
    let err = supervisor.run(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, WorkerError::RetriesExhausted { attempts: 2, .. }));
    assert_eq!(broker.calls(BrokerOp::Exists), 3);
    assert_eq!(started.elapsed(), Duration::ZERO);
}

#[tokio::test]
async fn test_supervisor_fails_fast_on_non_transient_error() {
    let broker = Arc::new(CountingBroker::new(MemoryBroker::new()));
    broker.fail_next(
        BrokerOp::Exists,
        1,
        BrokerError::NoSuchGroup {
            key: "evt:ping".into(),
            group: "svcA".into(),
        },
    );
    let queuing = Arc::new(Queuing::new(broker.clone(), config("svcA")));
    let supervisor = Supervisor::new(queuing, Arc::new(PingDispatch::default()), vec![request_map()]);

    let err = supervisor.run(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, WorkerError::Dispatch(_)));
    assert!(!err.is_transient());
    assert_eq!(broker.calls(BrokerOp::Exists), 1);
}

#[tokio::test]
async fn test_supervisor_recovers_after_transient_failure() {
    let broker = Arc::new(CountingBroker::new(MemoryBroker::new()));
    broker.fail_next(BrokerOp::Exists, 2, BrokerError::Unavailable("connection reset".into()));
    let dispatch = Arc::new(PingDispatch::default());
    let queuing = Arc::new(Queuing::new(broker.clone(), config("svcA")));
    let supervisor = Arc::new(Supervisor::new(queuing, dispatch.clone(), vec![request_map()]));
    let shutdown = CancellationToken::new();

    let task = {
        let supervisor = supervisor.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { supervisor.run(&shutdown).await })
    };

    tokio::time::timeout(Duration::from_secs(5), async {
        while !broker.inner().exists("evt:ping").await.unwrap() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert!(broker.calls(BrokerOp::Exists) >= 3);

    shutdown.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_shutdown_waits_for_in_flight_handler() {
    let broker = MemoryBroker::shared();
    let dispatch = Arc::new(PingDispatch::gated());
    let consumer = Arc::new(Queuing::new(
        broker.clone(),
        QueueConfig {
            worker_task_limit: 1,
            ..config("svcA")
        },
    ));
    let supervisor = Arc::new(Supervisor::new(consumer, dispatch.clone(), vec![request_map()]));
    let shutdown = CancellationToken::new();

    let origin = Queuing::new(broker.clone(), config("svcB"));
    origin
        .publish_request(&ping("slow"), true, &RequestContext::new())
        .await
        .unwrap();

    let task = {
        let supervisor = supervisor.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { supervisor.run(&shutdown).await })
    };
    dispatch.entered.notified().await;

    shutdown.cancel();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!task.is_finished());
    assert_eq!(supervisor.reader().active_drains(), 1);

    if let Some(gate) = &dispatch.gate {
        gate.notify_one();
    }
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(supervisor.reader().active_drains(), 0);
    assert_eq!(supervisor.reader().locker().count(&key("evt:ping")), 0);
    assert_eq!(broker.len("evt:svcb:ping"), 1);
}

#[tokio::test]
async fn test_supervised_runners_answer_published_requests() {
    let broker = MemoryBroker::shared();
    let dispatch = Arc::new(PingDispatch::default());
    let consumer = Arc::new(Queuing::new(broker.clone(), config("svcA")));
    let supervisor = Arc::new(Supervisor::new(consumer, dispatch.clone(), vec![request_map()]));
    let shutdown = CancellationToken::new();

    let task = {
        let supervisor = supervisor.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { supervisor.run(&shutdown).await })
    };

    let origin = Queuing::new(broker.clone(), config("svcB"));
    origin
        .publish_request(&ping("remote"), true, &RequestContext::new())
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while broker.len("evt:svcb:ping") == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    shutdown.cancel();
    task.await.unwrap().unwrap();
    assert_eq!(supervisor.stats().total_replied(), 1);
}
