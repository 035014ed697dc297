/// Consume-decode-persist loop for transfer notifications
///
/// One message at a time: read, decode, save, commit. The offset of a message
/// is committed only after its notification was saved. Nothing that goes wrong
/// inside the loop stops it; only the shutdown signal does.
///
/// Delivery is at-least-once with gaps: a payload that fails to decode is
/// dropped for good, a failed save leaves the offset where it was and relies
/// on the broker redelivering the record (restart or rebalance). Replays are
/// not deduplicated.
use super::decoder::decode;
use super::kafka_consumer::{MessageReader, RawMessage};
use super::notification_store::NotificationSink;
use crate::error::{ConsumerError, Result};
use crate::models::Notification;
use crate::shutdown::Shutdown;
use std::fmt;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Running,
    /// Shutdown requested, finishing the in-flight message
    Draining,
    Stopped,
}

impl PipelineState {
    fn advance(&mut self, next: PipelineState) {
        if *self != next {
            debug!(from = %self, to = %next, "Pipeline state change");
            if next == PipelineState::Draining {
                info!("Shutdown requested, finishing in-flight message");
            }
            *self = next;
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PipelineState::Running => write!(f, "running"),
            PipelineState::Draining => write!(f, "draining"),
            PipelineState::Stopped => write!(f, "stopped"),
        }
    }
}

/// What happened to a single received message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Saved and offset committed
    Committed,
    /// Saved, but the offset commit failed
    CommitFailed,
    /// Payload could not be decoded, message dropped
    Discarded,
    /// Save failed, offset left uncommitted for redelivery
    Retained,
}

/// Counters reported when the loop stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub received: u64,
    pub saved: u64,
    pub committed: u64,
    pub decode_failures: u64,
    pub storage_failures: u64,
    pub transport_errors: u64,
    pub commit_failures: u64,
}

impl PipelineStats {
    fn record(&mut self, outcome: MessageOutcome) {
        self.received += 1;
        match outcome {
            MessageOutcome::Committed => {
                self.saved += 1;
                self.committed += 1;
            }
            MessageOutcome::CommitFailed => {
                self.saved += 1;
                self.commit_failures += 1;
            }
            MessageOutcome::Discarded => self.decode_failures += 1,
            MessageOutcome::Retained => self.storage_failures += 1,
        }
    }
}

/// Decode `payload` and hand the result to `sink`
///
/// Returns the saved notification, or the first error. `sink` is never called
/// for a payload that does not decode.
pub async fn persist_message<S>(sink: &S, payload: &[u8]) -> Result<Notification>
where
    S: NotificationSink + ?Sized,
{
    let notification = decode(payload)?;
    sink.save(&notification).await?;
    Ok(notification)
}

/// Reader and sink owned by the loop
///
/// Released exactly once, reader first. When dropped before `release` ran
/// (the `run` future was dropped or the loop panicked), the release is spawned
/// onto the current runtime instead.
struct Connections<R, S>
where
    R: MessageReader + 'static,
    S: NotificationSink + 'static,
{
    inner: Option<(R, S)>,
}

impl<R, S> Connections<R, S>
where
    R: MessageReader + 'static,
    S: NotificationSink + 'static,
{
    async fn release(&mut self) {
        if let Some((reader, sink)) = self.inner.take() {
            close_in_order(reader, sink).await;
        }
    }
}

impl<R, S> Drop for Connections<R, S>
where
    R: MessageReader + 'static,
    S: NotificationSink + 'static,
{
    fn drop(&mut self) {
        let Some((reader, sink)) = self.inner.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("Pipeline stopped before releasing its connections, releasing in background");
                handle.spawn(close_in_order(reader, sink));
            }
            Err(_) => warn!("No runtime left to release pipeline connections"),
        }
    }
}

async fn close_in_order<R, S>(mut reader: R, sink: S)
where
    R: MessageReader,
    S: NotificationSink,
{
    reader.close().await;
    sink.close().await;
}

pub struct NotificationPipeline<R, S>
where
    R: MessageReader + 'static,
    S: NotificationSink + 'static,
{
    connections: Connections<R, S>,
    shutdown: Shutdown,
    state: PipelineState,
    stats: PipelineStats,
}

impl<R, S> NotificationPipeline<R, S>
where
    R: MessageReader + 'static,
    S: NotificationSink + 'static,
{
    /// Take ownership of both connections for the lifetime of the loop
    pub fn new(reader: R, sink: S, shutdown: Shutdown) -> Self {
        Self {
            connections: Connections {
                inner: Some((reader, sink)),
            },
            shutdown,
            state: PipelineState::Running,
            stats: PipelineStats::default(),
        }
    }

    /// Run until the shutdown signal is observed
    ///
    /// The reader and then the sink are closed exactly once, also when this
    /// future is dropped before completing.
    pub async fn run(mut self) -> PipelineStats {
        info!("Starting transfer notification pipeline");

        if let Some((reader, sink)) = self.connections.inner.as_mut() {
            loop {
                let message = match reader.next(&mut self.shutdown).await {
                    Ok(message) => message,
                    Err(e) if e.is_cancelled() => {
                        self.state.advance(PipelineState::Stopped);
                        break;
                    }
                    Err(e) => {
                        self.stats.transport_errors += 1;
                        error!(error = %e, "Failed to read message");
                        continue;
                    }
                };

                if self.shutdown.is_triggered() {
                    self.state.advance(PipelineState::Draining);
                }

                let outcome = process(reader, sink, &message).await;
                self.stats.record(outcome);
            }
        }

        self.connections.release().await;

        let stats = self.stats;
        info!(
            received = stats.received,
            saved = stats.saved,
            committed = stats.committed,
            decode_failures = stats.decode_failures,
            storage_failures = stats.storage_failures,
            transport_errors = stats.transport_errors,
            commit_failures = stats.commit_failures,
            "Transfer notification pipeline stopped"
        );
        stats
    }
}

async fn process<R, S>(reader: &mut R, sink: &S, message: &RawMessage) -> MessageOutcome
where
    R: MessageReader + ?Sized,
    S: NotificationSink + ?Sized,
{
    let notification = match persist_message(sink, &message.payload).await {
        Ok(notification) => notification,
        Err(ConsumerError::Decode(e)) => {
            error!(
                offset = message.offset,
                error = %e,
                "Failed to decode message, discarding"
            );
            return MessageOutcome::Discarded;
        }
        Err(e) => {
            error!(
                offset = message.offset,
                error = %e,
                "Failed to save notification, offset not committed"
            );
            return MessageOutcome::Retained;
        }
    };

    info!(
        user_id = notification.user_id,
        amount = notification.amount,
        currency = %notification.currency,
        "Notification saved"
    );

    match reader.commit(message).await {
        Ok(()) => MessageOutcome::Committed,
        Err(e) => {
            warn!(offset = message.offset, error = %e, "Failed to commit offset");
            MessageOutcome::CommitFailed
        }
    }
}
