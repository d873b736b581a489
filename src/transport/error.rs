//! Errors raised at the broker boundary

use std::time::Duration;

use thiserror::Error;

/// Failure talking to the broker
///
/// Any of these is fatal to a run: the supervisor cancels the remaining work
/// and tears the session down.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection to {broker} failed: {reason}")]
    Connect { broker: String, reason: String },

    #[error("No CONNACK from {broker} within {timeout:?}")]
    ConnectTimeout { broker: String, timeout: Duration },

    #[error("MQTT client error: {0}")]
    Client(String),

    #[error("Subscription to {0} rejected by broker")]
    SubscribeRejected(String),

    #[error("Already subscribed to {0}")]
    AlreadySubscribed(String),

    #[error("Publish to {0} failed")]
    PublishFailed(String),

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Session closed")]
    Closed,

    #[error("Invalid topic: {0:?}")]
    InvalidTopic(String),
}

impl From<rumqttc::ClientError> for TransportError {
    fn from(err: rumqttc::ClientError) -> Self {
        // The only way the client fails a request is when its event loop is gone
        TransportError::Client(err.to_string())
    }
}
