//! Publish/subscribe fan-out of session messages to observers
//!
//! Each opened session has its own channel with a sequence counter and
//! observer list. Observers can only attach while the channel is open. Publishing to one session never waits on another; publishes to the
//! same session are delivered to every observer in call order.

mod messages;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock, mpsc};

pub use messages::{
    DocumentUpdateMessage, Envelope, ReplyMessage, Speaker, Topic, TranscriptMessage,
    UpdateSource,
};

/// Messages buffered per observer before delivery waits
const OBSERVER_CAPACITY: usize = 64;

/// How long a full observer may stall delivery before it is dropped
const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(2);

/// Outcome of one publish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    /// Sequence number assigned to the message
    pub seq: u64,
    /// Observers that received it
    pub delivered: usize,
    /// Observers dropped as unreachable
    pub dropped: usize,
}

struct Observer {
    id: u64,
    tx: mpsc::Sender<Envelope>,
}

#[derive(Default)]
struct Channel {
    next_seq: u64,
    next_observer: u64,
    observers: Vec<Observer>,
    closed: bool,
}

/// One opened session channel
///
/// Publishing through it reaches the observers of this opening only, even
/// after the session id has been closed and opened again.
#[derive(Clone)]
pub struct SessionChannel {
    session_id: Arc<str>,
    inner: Arc<Mutex<Channel>>,
    delivery_timeout: Duration,
}

impl SessionChannel {
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Publish a message to every observer of this channel
    ///
    /// Delivery waits for observer capacity up to the delivery timeout.
    /// Observers that are gone or stay full are dropped and logged; this never
    /// fails the caller.
    pub async fn publish(&self, topic: Topic, payload: Value) -> Delivery {
        let session_id = &*self.session_id;
        let mut channel = self.inner.lock().await;

        let seq = channel.next_seq;
        channel.next_seq += 1;
        let envelope = Envelope {
            session_id: session_id.to_string(),
            seq,
            topic,
            payload,
        };

        let mut delivered = 0;
        let mut unreachable = Vec::new();
        for observer in &channel.observers {
            match tokio::time::timeout(self.delivery_timeout, observer.tx.send(envelope.clone())).await
            {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(_)) => {
                    tracing::warn!(session_id, observer = observer.id, %topic, seq, "observer gone, dropping");
                    unreachable.push(observer.id);
                }
                Err(_) => {
                    tracing::warn!(session_id, observer = observer.id, %topic, seq, "observer stalled, dropping");
                    unreachable.push(observer.id);
                }
            }
        }

        if !unreachable.is_empty() {
            channel.observers.retain(|o| !unreachable.contains(&o.id));
        }

        tracing::trace!(session_id, %topic, seq, delivered, "published");
        Delivery {
            seq,
            delivered,
            dropped: unreachable.len(),
        }
    }

    /// Serialize `message` and publish it
    ///
    /// A message that cannot be serialized is logged and not sent.
    pub async fn publish_message<T: Serialize + Sync>(
        &self,
        topic: Topic,
        message: &T,
    ) -> Option<Delivery> {
        match serde_json::to_value(message) {
            Ok(payload) => Some(self.publish(topic, payload).await),
            Err(e) => {
                tracing::error!(session_id = %self.session_id, %topic, error = %e, "failed to serialize broadcast");
                None
            }
        }
    }

    fn same(&self, other: &Arc<Mutex<Channel>>) -> bool {
        Arc::ptr_eq(&self.inner, other)
    }
}

/// Shared broadcaster for all sessions
pub struct Broadcaster {
    channels: RwLock<HashMap<String, Arc<Mutex<Channel>>>>,
    delivery_timeout: Duration,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Broadcaster {
    /// Create a broadcaster with the default delivery timeout
    #[must_use]
    pub fn new() -> Self {
        Self::with_delivery_timeout(DEFAULT_DELIVERY_TIMEOUT)
    }

    /// Create a broadcaster that drops observers stalled longer than `timeout`
    #[must_use]
    pub fn with_delivery_timeout(timeout: Duration) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            delivery_timeout: timeout,
        }
    }

    /// Open a fresh channel for `session_id`
    ///
    /// A channel still registered under the same id stops receiving new
    /// observers; its own observers stay attached until it is closed.
    pub async fn open(&self, session_id: &str) -> SessionChannel {
        let inner = Arc::new(Mutex::new(Channel::default()));
        let replaced = self
            .channels
            .write()
            .await
            .insert(session_id.to_string(), Arc::clone(&inner))
            .is_some();
        tracing::debug!(session_id, replaced, "broadcast channel opened");

        SessionChannel {
            session_id: Arc::from(session_id),
            inner,
            delivery_timeout: self.delivery_timeout,
        }
    }

    async fn current(&self, session_id: &str) -> Option<Arc<Mutex<Channel>>> {
        self.channels.read().await.get(session_id).map(Arc::clone)
    }

    /// Register an observer for a session's messages
    ///
    /// Returns `None` if no channel is open for `session_id`.
    pub async fn subscribe(&self, session_id: &str) -> Option<mpsc::Receiver<Envelope>> {
        let channel = self.current(session_id).await?;
        let mut channel = channel.lock().await;
        if channel.closed {
            return None;
        }

        let (tx, rx) = mpsc::channel(OBSERVER_CAPACITY);
        let id = channel.next_observer;
        channel.next_observer += 1;
        channel.observers.push(Observer { id, tx });
        tracing::debug!(session_id, observer = id, "observer subscribed");
        Some(rx)
    }

    /// Number of observers currently attached to a session
    pub async fn observer_count(&self, session_id: &str) -> usize {
        match self.current(session_id).await {
            Some(channel) => channel.lock().await.observers.len(),
            None => 0,
        }
    }

    /// Whether a channel is open for `session_id`
    pub async fn is_open(&self, session_id: &str) -> bool {
        self.channels.read().await.contains_key(session_id)
    }

    /// Publish to the channel currently open for `session_id`
    ///
    /// Returns `None` if no channel is open.
    pub async fn publish(&self, session_id: &str, topic: Topic, payload: Value) -> Option<Delivery> {
        let inner = self.current(session_id).await?;
        let channel = SessionChannel {
            session_id: Arc::from(session_id),
            inner,
            delivery_timeout: self.delivery_timeout,
        };
        Some(channel.publish(topic, payload).await)
    }

    /// Close `channel`; its observers see the stream end
    ///
    /// The id is only unregistered while it still maps to this channel.
    pub async fn close(&self, channel: &SessionChannel) {
        let session_id = channel.session_id();
        {
            let mut channels = self.channels.write().await;
            if channels.get(session_id).is_some_and(|c| channel.same(c)) {
                channels.remove(session_id);
            }
        }

        let mut inner = channel.inner.lock().await;
        inner.closed = true;
        inner.observers.clear();
        tracing::debug!(session_id, "broadcast channel closed");
    }
}
