//! Processing of delivered stream entries.
//!
//! Shared by the read loop and the pending sweeper. For each entry:
//!
//! 1. decode the envelope (empty or undecodable entries are skipped);
//! 2. build the outgoing envelope;
//! 3. run the request handler (fresh) or the response handler (reply);
//! 4. acknowledge the entry, whatever the outcome;
//! 5. publish the reply to the origin group when one was requested.

use crate::dispatch::LocalDispatch;
use crate::error::WorkerResult;
use crate::stats::RunnerStats;
use herald_core::{HeraldError, RequestContext, RequestId};
use herald_queue::{Message, Queuing, StreamEntry, StreamKey, StreamRecord};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// What happened to a processed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOutcome {
    /// The entry carried no envelope.
    Skipped,
    /// The handler ran and a reply was published.
    Replied,
    /// The handler ran and no reply was due.
    Completed,
    /// The envelope could not be decoded or the handler failed.
    Failed,
}

/// Feeds stream entries through the local dispatcher.
pub struct EntryProcessor {
    queuing: Arc<Queuing>,
    dispatch: Arc<dyn LocalDispatch>,
    stats: Arc<RunnerStats>,
}

impl EntryProcessor {
    /// Creates a processor.
    pub fn new(queuing: Arc<Queuing>, dispatch: Arc<dyn LocalDispatch>, stats: Arc<RunnerStats>) -> Self {
        Self {
            queuing,
            dispatch,
            stats,
        }
    }

    /// The queuing client.
    pub fn queuing(&self) -> &Arc<Queuing> {
        &self.queuing
    }

    /// The shared statistics.
    pub fn stats(&self) -> &Arc<RunnerStats> {
        &self.stats
    }

    /// Processes one entry read from `key`.
    ///
    /// Handler and decoding failures are captured; only broker failures
    /// (ack, reply publish) are returned.
    pub async fn process(
        &self,
        key: &StreamKey,
        entry: &StreamEntry,
        cancel: &CancellationToken,
    ) -> WorkerResult<EntryOutcome> {
        let record = StreamRecord::from_entry(entry);
        let span = tracing::info_span!(
            "process_entry",
            stream_key = %key,
            stream_id = %record.stream_id,
            service_type = tracing::field::Empty,
            request_id = tracing::field::Empty,
        );

        async {
            if record.is_empty() {
                return self
                    .ack(key, &record)
                    .await
                    .map(|()| EntryOutcome::Skipped);
            }

            let message = match Message::decode(&record.data) {
                Ok(message) => message,
                Err(err) => {
                    tracing::error!(error = %err, "undecodable stream entry skipped");
                    self.stats.record_failed();
                    self.ack(key, &record).await?;
                    return Ok(EntryOutcome::Failed);
                }
            };

            let span = tracing::Span::current();
            span.record("service_type", message.service_type.as_str());
            if let Some(request_id) = &message.request_id {
                span.record("request_id", request_id.as_str());
            }

            let (reply, failed) = self.invoke(&message, cancel).await;
            self.stats.record_processed();
            if failed {
                self.stats.record_failed();
            }

            self.ack(key, &record).await?;

            let Some(mut reply) = reply else {
                return Ok(if failed { EntryOutcome::Failed } else { EntryOutcome::Completed });
            };
            reply.creation_date = chrono::Utc::now();
            let reply_key = self
                .queuing
                .reply_key(&message.group_name, &message.service_type);
            self.queuing.publish(&reply_key, &reply).await?;
            self.stats.record_replied();
            tracing::debug!(reply_key = %reply_key, "reply published");

            Ok(if failed { EntryOutcome::Failed } else { EntryOutcome::Replied })
        }
        .instrument(span)
        .await
    }

    /// Runs the handler for a decoded envelope. Returns the reply to
    /// publish, if any, and whether the handler failed.
    async fn invoke(&self, message: &Message, cancel: &CancellationToken) -> (Option<Message>, bool) {
        let config = self.queuing.config();
        let mut outgoing = message.outgoing(&config.group_name, &config.machine_name);
        let ctx = remote_context(message, cancel);

        if message.is_reply() {
            let referer = message.referer.as_deref().unwrap_or_default();
            let result = self
                .dispatch
                .handle_reply(
                    ctx,
                    &message.service_type,
                    referer,
                    message.payload.as_deref(),
                    message.error.as_deref(),
                )
                .await;
            return match result {
                Ok(()) => (None, false),
                Err(err) => {
                    tracing::error!(error = %err, "response handler failed");
                    (None, true)
                }
            };
        }

        let result = match message.payload.as_deref() {
            Some(payload) => {
                self.dispatch
                    .handle_request(ctx, &message.service_type, payload)
                    .await
            }
            None => Err(HeraldError::internal("request message has no payload")),
        };

        let failed = match result {
            Ok(output) => {
                outgoing.payload_type = Some(output.payload_type);
                outgoing.payload = Some(output.payload);
                false
            }
            Err(err) => {
                tracing::error!(error = %err, "request handler failed");
                outgoing.error = Some(err.to_string());
                true
            }
        };

        (message.respond.then_some(outgoing), failed)
    }

    async fn ack(&self, key: &StreamKey, record: &StreamRecord) -> WorkerResult<()> {
        let acked = self
            .queuing
            .broker()
            .ack(key.as_str(), &self.queuing.config().group_name, &[record.stream_id])
            .await?;
        self.stats.record_acked(acked);
        Ok(())
    }
}

impl std::fmt::Debug for EntryProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryProcessor")
            .field("queuing", &self.queuing)
            .finish_non_exhaustive()
    }
}

/// Restores the sender's execution context for the remote handler.
fn remote_context(message: &Message, cancel: &CancellationToken) -> RequestContext {
    let mut ctx = match &message.request_id {
        Some(id) => RequestContext::with_request_id(RequestId::from_string(id.clone())),
        None => RequestContext::new(),
    }
    .with_origin(message.group_name.clone(), message.machine_name.clone())
    .with_cancellation(cancel.child_token());
    if let Some(authorization) = &message.authorization {
        ctx.set_authorization(authorization.clone());
    }
    ctx
}
