//! Task-side view of the session

use super::manager::Shared;
use crate::transport::{InboundMessage, InboundQueue, QoS, TransportError};
use bytes::Bytes;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Cloneable handle that can publish and subscribe on the session
#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<Shared>,
}

impl SessionHandle {
    pub(super) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    fn check_open(&self) -> Result<(), TransportError> {
        if self.shared.closed.load(Ordering::Acquire) {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }

    /// Subscribe to a topic; resolves once the broker acknowledged it
    pub async fn subscribe(&self, topic: &str) -> Result<Subscription, TransportError> {
        self.check_open()?;

        let mut subscriptions = self.shared.subscriptions.write().await;
        if subscriptions.contains(topic) {
            return Err(TransportError::AlreadySubscribed(topic.to_string()));
        }

        // Recorded before the SUBSCRIBE goes out: if this future is dropped
        // while waiting for the SUBACK, close still releases the topic. The
        // lock is held across the await so a concurrent close cannot miss it.
        subscriptions.insert(topic.to_string());
        let inbound = match self.shared.transport.subscribe(topic, QoS::ExactlyOnce).await {
            Ok(inbound) => inbound,
            Err(e) => {
                subscriptions.remove(topic);
                return Err(e);
            }
        };

        Ok(Subscription {
            topic: topic.to_string(),
            inbound,
        })
    }

    /// Publish with exactly-once delivery, never retained
    pub async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), TransportError> {
        self.check_open()?;
        self.shared
            .transport
            .publish(topic, payload, QoS::ExactlyOnce, false)
            .await
    }
}

/// A live subscription and the queue its messages arrive on
///
/// Dropping it stops consumption but does not unsubscribe; the session does
/// that through [`Session::release`](super::Session::release) or on close.
pub struct Subscription {
    topic: String,
    inbound: InboundQueue,
}

impl Subscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Next raw message, `None` once the subscription was released
    pub async fn recv(&mut self) -> Option<InboundMessage> {
        self.inbound.recv().await
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("topic", &self.topic).finish()
    }
}
