//! In-process broker
//!
//! [`MemoryBroker`] stands in for a real broker in tests and local runs. Every
//! [`MemoryTransport`] connected to the same broker sees the publishes of the
//! others, so the bridge and a simulated device can talk to each other without
//! a network. The broker keeps a log of everything published plus per-filter
//! subscribe/unsubscribe counts for assertions.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::debug;

use super::topic;
use super::traits::{InboundMessage, InboundQueue, QoS, Transport};
use super::TransportError;

const INBOUND_CAPACITY: usize = 64;

/// A publish as seen by the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRecord {
    pub topic: String,
    pub payload: Bytes,
    pub qos: QoS,
    pub retain: bool,
}

struct Route {
    client: u64,
    filter: String,
    tx: mpsc::Sender<InboundMessage>,
}

#[derive(Default)]
struct BrokerState {
    routes: Vec<Route>,
    published: Vec<PublishRecord>,
    subscribes: HashMap<String, usize>,
    unsubscribes: HashMap<String, usize>,
    failing_topics: HashSet<String>,
    rejected_filters: HashSet<String>,
    publish_delay: Option<Duration>,
    suback_delay: Option<Duration>,
    delivered: HashMap<String, usize>,
    disconnects: usize,
}

/// Shared in-memory broker; clones refer to the same broker
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
    next_client: Arc<AtomicU64>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new client connection to this broker
    pub fn connect(&self) -> MemoryTransport {
        MemoryTransport {
            broker: self.clone(),
            client: self.next_client.fetch_add(1, Ordering::Relaxed),
            closed: AtomicBool::new(false),
        }
    }

    fn state(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Every publish accepted so far, in the order it was accepted
    pub fn published(&self) -> Vec<PublishRecord> {
        self.state().published.clone()
    }

    /// Accepted publishes to one topic, in order
    pub fn published_to(&self, topic: &str) -> Vec<PublishRecord> {
        self.state()
            .published
            .iter()
            .filter(|record| record.topic == topic)
            .cloned()
            .collect()
    }

    /// How many times a filter was subscribed
    pub fn subscribe_count(&self, filter: &str) -> usize {
        self.state().subscribes.get(filter).copied().unwrap_or(0)
    }

    /// How many times a filter was unsubscribed
    pub fn unsubscribe_count(&self, filter: &str) -> usize {
        self.state().unsubscribes.get(filter).copied().unwrap_or(0)
    }

    /// Number of live routes for a filter, across all clients
    pub fn active_subscriptions(&self, filter: &str) -> usize {
        self.state()
            .routes
            .iter()
            .filter(|route| route.filter == filter)
            .count()
    }

    /// Make every later publish to `topic` fail
    pub fn fail_publishes_to(&self, topic: impl Into<String>) {
        self.state().failing_topics.insert(topic.into());
    }

    /// Make every later subscription to `filter` be rejected
    pub fn reject_subscriptions_to(&self, filter: impl Into<String>) {
        self.state().rejected_filters.insert(filter.into());
    }

    /// Hold every publish for `delay` before it is confirmed
    pub fn set_publish_delay(&self, delay: Duration) {
        self.state().publish_delay = Some(delay);
    }

    /// Hold every SUBACK for `delay`; the route is live from the SUBSCRIBE on
    pub fn set_suback_delay(&self, delay: Duration) {
        self.state().suback_delay = Some(delay);
    }

    /// Messages on `topic` that reached a subscriber queue
    pub fn delivered_to(&self, topic: &str) -> usize {
        self.state().delivered.get(topic).copied().unwrap_or(0)
    }

    /// Number of client disconnects seen
    pub fn disconnects(&self) -> usize {
        self.state().disconnects
    }

    /// Deliver a raw payload to every matching subscriber, bypassing the log
    ///
    /// Stands in for a third party publishing on the broker.
    pub async fn inject(&self, topic: &str, payload: impl Into<Bytes>) {
        self.deliver(topic, payload.into()).await;
    }

    async fn deliver(&self, topic: &str, payload: Bytes) {
        let targets: Vec<mpsc::Sender<InboundMessage>> = self
            .state()
            .routes
            .iter()
            .filter(|route| topic::matches(&route.filter, topic))
            .map(|route| route.tx.clone())
            .collect();

        for tx in targets {
            let message = InboundMessage {
                topic: topic.to_string(),
                payload: payload.clone(),
            };
            if tx.send(message).await.is_err() {
                debug!(topic = %topic, "Subscriber queue closed, message dropped");
                continue;
            }
            *self.state().delivered.entry(topic.to_string()).or_default() += 1;
        }
    }
}

/// One client connection to a [`MemoryBroker`]
pub struct MemoryTransport {
    broker: MemoryBroker,
    client: u64,
    closed: AtomicBool,
}

impl MemoryTransport {
    fn check_open(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn subscribe(&self, filter: &str, _qos: QoS) -> Result<InboundQueue, TransportError> {
        if !topic::is_valid_topic_filter(filter) {
            return Err(TransportError::InvalidTopic(filter.to_string()));
        }
        self.check_open()?;

        let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
        let delay = {
            let mut state = self.broker.state();
            *state.subscribes.entry(filter.to_string()).or_default() += 1;
            if state.rejected_filters.contains(filter) {
                return Err(TransportError::SubscribeRejected(filter.to_string()));
            }
            state.routes.push(Route {
                client: self.client,
                filter: filter.to_string(),
                tx,
            });
            state.suback_delay
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(rx)
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Bytes,
        qos: QoS,
        retain: bool,
    ) -> Result<(), TransportError> {
        if !topic::is_valid_topic_name(topic) {
            return Err(TransportError::InvalidTopic(topic.to_string()));
        }
        self.check_open()?;

        let delay = self.broker.state().publish_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        {
            let mut state = self.broker.state();
            if state.failing_topics.contains(topic) {
                return Err(TransportError::PublishFailed(topic.to_string()));
            }
            state.published.push(PublishRecord {
                topic: topic.to_string(),
                payload: payload.clone(),
                qos,
                retain,
            });
        }

        self.broker.deliver(topic, payload).await;
        Ok(())
    }

    async fn unsubscribe(&self, filter: &str) -> Result<(), TransportError> {
        self.check_open()?;

        let mut state = self.broker.state();
        *state.unsubscribes.entry(filter.to_string()).or_default() += 1;
        state
            .routes
            .retain(|route| !(route.client == self.client && route.filter == filter));
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let mut state = self.broker.state();
        state.routes.retain(|route| route.client != self.client);
        state.disconnects += 1;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
