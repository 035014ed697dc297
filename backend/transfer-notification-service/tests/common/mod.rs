//! In-memory stand-ins for the broker and the store
#![allow(dead_code)]

use async_trait::async_trait;
use rdkafka::error::KafkaError;
use rdkafka::types::RDKafkaErrorCode;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use transfer_notification_service::shutdown::{Shutdown, ShutdownTrigger};
use transfer_notification_service::{
    ConsumerError, MessageReader, Notification, NotificationSink, RawMessage, Result,
};

pub const TOPIC: &str = "notification";

pub const VALID_PAYLOAD: &str =
    r#"{"user_id":12345,"amount":100.50,"currency":"USD","timestamp":"2023-10-15T14:30:00Z"}"#;

pub fn message(offset: i64, payload: &str) -> RawMessage {
    RawMessage {
        topic: TOPIC.to_string(),
        partition: 0,
        offset,
        payload: payload.as_bytes().to_vec(),
    }
}

pub fn transfer_payload(user_id: i64, amount: f64, currency: &str) -> String {
    format!(
        r#"{{"user_id":{user_id},"amount":{amount},"currency":"{currency}","timestamp":"2023-10-15T14:30:00Z"}}"#
    )
}

/// Shared record of which side was closed, in order
pub type CloseLog = Arc<Mutex<Vec<&'static str>>>;

pub enum ReadEvent {
    Message(RawMessage),
    TransportError,
}

/// Observable state of a [`ScriptedReader`], kept after the reader is moved
#[derive(Clone, Default)]
pub struct ReaderProbe {
    pub commits: Arc<Mutex<Vec<i64>>>,
    pub reads: Arc<AtomicUsize>,
    pub closes: Arc<AtomicUsize>,
}

impl ReaderProbe {
    pub fn committed_offsets(&self) -> Vec<i64> {
        self.commits.lock().unwrap().clone()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

/// Reader replaying a fixed script of broker events
///
/// Once the script is exhausted it either reports cancellation right away or,
/// with `wait_for_shutdown`, blocks until the shutdown signal fires.
pub struct ScriptedReader {
    events: VecDeque<ReadEvent>,
    probe: ReaderProbe,
    fail_commits: bool,
    wait_for_shutdown: bool,
    close_log: Option<CloseLog>,
}

impl ScriptedReader {
    pub fn new(events: Vec<ReadEvent>) -> (Self, ReaderProbe) {
        let probe = ReaderProbe::default();
        let reader = Self {
            events: events.into(),
            probe: probe.clone(),
            fail_commits: false,
            wait_for_shutdown: false,
            close_log: None,
        };
        (reader, probe)
    }

    pub fn from_messages(messages: Vec<RawMessage>) -> (Self, ReaderProbe) {
        Self::new(messages.into_iter().map(ReadEvent::Message).collect())
    }

    pub fn failing_commits(mut self) -> Self {
        self.fail_commits = true;
        self
    }

    pub fn waiting_for_shutdown(mut self) -> Self {
        self.wait_for_shutdown = true;
        self
    }

    pub fn with_close_log(mut self, log: CloseLog) -> Self {
        self.close_log = Some(log);
        self
    }
}

#[async_trait]
impl MessageReader for ScriptedReader {
    async fn next(&mut self, shutdown: &mut Shutdown) -> Result<RawMessage> {
        if shutdown.is_triggered() {
            return Err(ConsumerError::Cancelled);
        }

        self.probe.reads.fetch_add(1, Ordering::SeqCst);
        match self.events.pop_front() {
            Some(ReadEvent::Message(message)) => Ok(message),
            Some(ReadEvent::TransportError) => Err(ConsumerError::Transport(
                KafkaError::MessageConsumption(RDKafkaErrorCode::BrokerTransportFailure),
            )),
            None => {
                if self.wait_for_shutdown {
                    shutdown.triggered().await;
                }
                Err(ConsumerError::Cancelled)
            }
        }
    }

    async fn commit(&mut self, message: &RawMessage) -> Result<()> {
        if self.fail_commits {
            return Err(ConsumerError::Commit(KafkaError::ConsumerCommit(
                RDKafkaErrorCode::RebalanceInProgress,
            )));
        }
        self.probe.commits.lock().unwrap().push(message.offset);
        Ok(())
    }

    async fn close(&mut self) {
        self.probe.closes.fetch_add(1, Ordering::SeqCst);
        if let Some(log) = &self.close_log {
            log.lock().unwrap().push("reader");
        }
    }
}

/// Observable state of an [`InMemorySink`]
#[derive(Clone, Default)]
pub struct SinkProbe {
    pub saved: Arc<Mutex<Vec<Notification>>>,
    pub attempts: Arc<AtomicUsize>,
    pub closes: Arc<AtomicUsize>,
}

impl SinkProbe {
    pub fn saved(&self) -> Vec<Notification> {
        self.saved.lock().unwrap().clone()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// Sink keeping notifications in memory, with optional injected failures
pub struct InMemorySink {
    probe: SinkProbe,
    failing_user_ids: HashSet<i64>,
    trigger_on_save: Option<ShutdownTrigger>,
    close_log: Option<CloseLog>,
}

impl InMemorySink {
    pub fn new() -> (Self, SinkProbe) {
        let probe = SinkProbe::default();
        let sink = Self {
            probe: probe.clone(),
            failing_user_ids: HashSet::new(),
            trigger_on_save: None,
            close_log: None,
        };
        (sink, probe)
    }

    /// Every save for this account fails with a storage error
    pub fn failing_for(mut self, user_id: i64) -> Self {
        self.failing_user_ids.insert(user_id);
        self
    }

    /// Request shutdown from inside the first save, while the message is in flight
    pub fn triggering_shutdown(mut self, trigger: ShutdownTrigger) -> Self {
        self.trigger_on_save = Some(trigger);
        self
    }

    pub fn with_close_log(mut self, log: CloseLog) -> Self {
        self.close_log = Some(log);
        self
    }
}

#[async_trait]
impl NotificationSink for InMemorySink {
    async fn save(&self, notification: &Notification) -> Result<()> {
        self.probe.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(trigger) = &self.trigger_on_save {
            trigger.trigger();
        }
        if self.failing_user_ids.contains(&notification.user_id) {
            return Err(ConsumerError::Storage(mongodb::error::Error::custom(
                "write timeout",
            )));
        }
        self.probe.saved.lock().unwrap().push(notification.clone());
        Ok(())
    }

    async fn close(&self) {
        self.probe.closes.fetch_add(1, Ordering::SeqCst);
        if let Some(log) = &self.close_log {
            log.lock().unwrap().push("sink");
        }
    }
}
