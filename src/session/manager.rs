//! Session lifetime and subscription bookkeeping

use super::handle::SessionHandle;
use crate::config::BrokerConfig;
use crate::transport::{MqttTransport, Transport, TransportError};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// State shared between the session and its handles
pub(super) struct Shared {
    pub(super) transport: Arc<dyn Transport>,
    /// Topics currently subscribed through this session
    pub(super) subscriptions: RwLock<HashSet<String>>,
    pub(super) closed: AtomicBool,
}

/// An open broker session
pub struct Session {
    shared: Arc<Shared>,
}

impl Session {
    /// Connect to the broker over MQTT
    pub async fn open(config: &BrokerConfig) -> Result<Self, TransportError> {
        let transport = MqttTransport::connect(config).await?;
        Ok(Self::new(Arc::new(transport)))
    }

    /// Wrap an already connected transport
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        debug!(transport = transport.name(), "Session opened");
        Self {
            shared: Arc::new(Shared {
                transport,
                subscriptions: RwLock::new(HashSet::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Capability handle for tasks
    pub fn handle(&self) -> SessionHandle {
        SessionHandle::new(self.shared.clone())
    }

    /// Release the subscription on `topic`
    ///
    /// Returns `false` when there was nothing to release, either because the
    /// topic was never subscribed or because it has been released already.
    pub async fn release(&self, topic: &str) -> Result<bool, TransportError> {
        let removed = self.shared.subscriptions.write().await.remove(topic);
        if !removed {
            return Ok(false);
        }

        self.shared.transport.unsubscribe(topic).await?;
        debug!(topic = %topic, "Subscription released");
        Ok(true)
    }

    /// Topics with a live subscription
    pub async fn subscriptions(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.shared.subscriptions.read().await.iter().cloned().collect();
        topics.sort();
        topics
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Release every remaining subscription and disconnect
    ///
    /// Only the first call does anything. A failed release is logged and the
    /// close carries on; the disconnect result is what gets returned.
    pub async fn close(&self) -> Result<(), TransportError> {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let remaining: Vec<String> = self.shared.subscriptions.write().await.drain().collect();
        for topic in remaining {
            match self.shared.transport.unsubscribe(&topic).await {
                Ok(()) => debug!(topic = %topic, "Subscription released on close"),
                Err(e) => warn!(topic = %topic, error = %e, "Failed to release subscription"),
            }
        }

        let result = self.shared.transport.disconnect().await;
        info!(transport = self.shared.transport.name(), "Session closed");
        result
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.is_closed() {
            warn!("Session dropped without being closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryBroker;
    use bytes::Bytes;

    fn memory_session() -> (MemoryBroker, Session) {
        let broker = MemoryBroker::new();
        let session = Session::new(Arc::new(broker.connect()));
        (broker, session)
    }

    #[tokio::test]
    async fn test_release_happens_once() {
        let (broker, session) = memory_session();
        let _sub = session.handle().subscribe("command/a/resp/").await.unwrap();

        assert!(session.release("command/a/resp/").await.unwrap());
        assert!(!session.release("command/a/resp/").await.unwrap());
        assert_eq!(broker.unsubscribe_count("command/a/resp/"), 1);

        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (broker, session) = memory_session();
        let _sub = session.handle().subscribe("command/a/resp/").await.unwrap();

        session.close().await.unwrap();
        session.close().await.unwrap();

        assert_eq!(broker.unsubscribe_count("command/a/resp/"), 1);
        assert_eq!(broker.disconnects(), 1);
        assert!(session.subscriptions().await.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_subscribe_leaves_nothing_to_release() {
        let (broker, session) = memory_session();
        broker.reject_subscriptions_to("command/a/resp/");

        let result = session.handle().subscribe("command/a/resp/").await;
        assert!(matches!(result, Err(TransportError::SubscribeRejected(_))));
        assert!(session.subscriptions().await.is_empty());

        session.close().await.unwrap();
        assert_eq!(broker.unsubscribe_count("command/a/resp/"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_abandoned_before_suback_is_released_on_close() {
        let (broker, session) = memory_session();
        broker.set_suback_delay(std::time::Duration::from_secs(5));

        let handle = session.handle();
        let abandoned = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            handle.subscribe("command/a/resp/"),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(broker.active_subscriptions("command/a/resp/"), 1);
        assert_eq!(session.subscriptions().await, vec!["command/a/resp/".to_string()]);

        session.close().await.unwrap();
        assert_eq!(broker.unsubscribe_count("command/a/resp/"), 1);
        assert_eq!(broker.active_subscriptions("command/a/resp/"), 0);
    }

    #[tokio::test]
    async fn test_handle_is_useless_after_close() {
        let (broker, session) = memory_session();
        let handle = session.handle();
        session.close().await.unwrap();

        let result = handle.publish("command/a/req/", Bytes::from_static(b"x")).await;
        assert_eq!(result, Err(TransportError::Closed));
        assert!(handle.subscribe("command/a/resp/").await.is_err());
        assert!(broker.published().is_empty());
    }
}
