//! Transport trait abstraction for pluggable broker backends

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use super::TransportError;

/// Delivery guarantee of a publish or subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QoS {
    AtMostOnce,
    AtLeastOnce,
    /// Guaranteed and non-duplicated within the session
    ExactlyOnce,
}

impl From<QoS> for rumqttc::QoS {
    fn from(qos: QoS) -> Self {
        match qos {
            QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
            QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
            QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
        }
    }
}

/// A raw message received on a subscribed topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
}

/// Queue of raw messages delivered for one subscription
pub type InboundQueue = mpsc::Receiver<InboundMessage>;

/// A connected publish/subscribe client
///
/// Every operation resolves only once the broker has confirmed it to the
/// level the QoS demands.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Subscribe to a topic filter and return the queue its messages land in
    ///
    /// Resolves after the broker acknowledged the subscription, so anything
    /// published to the filter afterwards is guaranteed to be delivered.
    async fn subscribe(&self, filter: &str, qos: QoS) -> Result<InboundQueue, TransportError>;

    /// Publish a payload, resolving once delivery is confirmed for the QoS
    async fn publish(
        &self,
        topic: &str,
        payload: Bytes,
        qos: QoS,
        retain: bool,
    ) -> Result<(), TransportError>;

    /// Drop a subscription; nothing more is delivered to its queue afterwards
    async fn unsubscribe(&self, filter: &str) -> Result<(), TransportError>;

    /// Close the connection to the broker
    async fn disconnect(&self) -> Result<(), TransportError>;

    /// Human-readable name for this transport
    fn name(&self) -> &'static str;
}
