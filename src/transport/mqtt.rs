//! MQTT 3.1.1 transport on top of rumqttc
//!
//! rumqttc splits a connection into an [`AsyncClient`] that queues requests
//! and an [`EventLoop`] that has to be polled to make progress. The event
//! loop runs on its own task and does three jobs:
//!
//! - confirms the CONNACK so `connect` only returns on a live session
//! - pairs outgoing packet ids with SUBACK / UNSUBACK / PUBACK / PUBCOMP so
//!   every request resolves only once the broker confirmed it
//! - routes inbound PUBLISH packets to the queue of each matching subscription
//!
//! Packet ids are assigned by the event loop, in request order. Requests are
//! therefore handed to the client under a lock, with a waiter pushed onto a
//! per-kind FIFO in the same critical section; each `Outgoing` event pops the
//! oldest waiter of its kind and parks it under the assigned packet id.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet,
    SubscribeReasonCode,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, warn};

use super::topic;
use super::traits::{InboundMessage, InboundQueue, QoS, Transport};
use super::TransportError;
use crate::config::{BrokerConfig, ProtocolVersion};

type Waiter = oneshot::Sender<Result<(), TransportError>>;

/// Time the event loop gets to flush a DISCONNECT before it is aborted
const DISCONNECT_FLUSH: Duration = Duration::from_secs(2);

/// Bookkeeping shared between callers and the event loop task
#[derive(Default)]
struct LinkState {
    queued_publishes: VecDeque<Waiter>,
    queued_subscribes: VecDeque<(String, Waiter)>,
    queued_unsubscribes: VecDeque<Waiter>,
    inflight_publishes: HashMap<u16, Waiter>,
    inflight_subscribes: HashMap<u16, (String, Waiter)>,
    inflight_unsubscribes: HashMap<u16, Waiter>,
    routes: Vec<(String, mpsc::Sender<InboundMessage>)>,
    /// Set once the connection is gone; every later request fails with it
    down: Option<TransportError>,
}

impl LinkState {
    /// Fail everything pending and drop all routes
    fn shut(&mut self, err: TransportError) {
        let waiters = self
            .queued_publishes
            .drain(..)
            .chain(self.queued_subscribes.drain(..).map(|(_, w)| w))
            .chain(self.queued_unsubscribes.drain(..))
            .chain(self.inflight_publishes.drain().map(|(_, w)| w))
            .chain(self.inflight_subscribes.drain().map(|(_, (_, w))| w))
            .chain(self.inflight_unsubscribes.drain().map(|(_, w)| w))
            .collect::<Vec<_>>();

        for waiter in waiters {
            let _ = waiter.send(Err(err.clone()));
        }

        self.routes.clear();
        self.down.get_or_insert(err);
    }

    /// Queues of every subscription whose filter matches `topic`
    fn route_targets(&self, topic: &str) -> Vec<mpsc::Sender<InboundMessage>> {
        self.routes
            .iter()
            .filter(|(filter, _)| topic::matches(filter, topic))
            .map(|(_, tx)| tx.clone())
            .collect()
    }

    fn publish_sent(&mut self, pkid: u16) {
        if let Some(waiter) = self.queued_publishes.pop_front() {
            if pkid == 0 {
                // QoS 0 has no acknowledgement, handing it to the socket is all there is
                let _ = waiter.send(Ok(()));
            } else {
                self.inflight_publishes.insert(pkid, waiter);
            }
        }
    }

    fn subscribe_sent(&mut self, pkid: u16) {
        if let Some(entry) = self.queued_subscribes.pop_front() {
            self.inflight_subscribes.insert(pkid, entry);
        }
    }

    fn unsubscribe_sent(&mut self, pkid: u16) {
        if let Some(waiter) = self.queued_unsubscribes.pop_front() {
            self.inflight_unsubscribes.insert(pkid, waiter);
        }
    }

    /// PUBACK for QoS 1, PUBCOMP for QoS 2
    fn publish_confirmed(&mut self, pkid: u16) {
        complete(self.inflight_publishes.remove(&pkid), Ok(()));
    }

    fn subscribe_confirmed(&mut self, pkid: u16, rejected: bool) {
        if let Some((filter, waiter)) = self.inflight_subscribes.remove(&pkid) {
            let result = if rejected {
                Err(TransportError::SubscribeRejected(filter))
            } else {
                Ok(())
            };
            let _ = waiter.send(result);
        }
    }

    fn unsubscribe_confirmed(&mut self, pkid: u16) {
        complete(self.inflight_unsubscribes.remove(&pkid), Ok(()));
    }
}

/// A connected MQTT session
pub struct MqttTransport {
    client: AsyncClient,
    broker: String,
    channel_capacity: usize,
    state: Arc<Mutex<LinkState>>,
    /// Serializes request submission so packet ids are assigned in FIFO order
    submit: tokio::sync::Mutex<()>,
    event_loop: Mutex<Option<JoinHandle<()>>>,
}

impl MqttTransport {
    /// Connect to the broker and wait for the CONNACK
    pub async fn connect(config: &BrokerConfig) -> Result<Self, TransportError> {
        let broker = config.address();

        // rumqttc's v4 client speaks 3.1.1 only
        let ProtocolVersion::V311 = config.protocol;
        let mut options = MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port);
        options.set_keep_alive(config.keep_alive);
        options.set_clean_session(true);

        let (client, event_loop) = AsyncClient::new(options, config.channel_capacity);
        let state = Arc::new(Mutex::new(LinkState::default()));
        let (connected_tx, connected_rx) = oneshot::channel();

        let handle = tokio::spawn(drive_event_loop(
            event_loop,
            state.clone(),
            broker.clone(),
            connected_tx,
        ));

        let connected = match timeout(config.connect_timeout, connected_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(TransportError::Connect {
                broker: broker.clone(),
                reason: "event loop exited before CONNACK".into(),
            }),
            Err(_) => Err(TransportError::ConnectTimeout {
                broker: broker.clone(),
                timeout: config.connect_timeout,
            }),
        };

        if let Err(e) = connected {
            handle.abort();
            return Err(e);
        }

        info!(broker = %broker, client_id = %config.client_id, "MQTT session established");

        Ok(Self {
            client,
            broker,
            channel_capacity: config.channel_capacity,
            state,
            submit: tokio::sync::Mutex::new(()),
            event_loop: Mutex::new(Some(handle)),
        })
    }

    fn link(&self) -> MutexGuard<'_, LinkState> {
        lock(&self.state)
    }

    fn check_up(&self) -> Result<(), TransportError> {
        match &self.link().down {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn subscribe(&self, filter: &str, qos: QoS) -> Result<InboundQueue, TransportError> {
        if !topic::is_valid_topic_filter(filter) {
            return Err(TransportError::InvalidTopic(filter.to_string()));
        }
        self.check_up()?;

        // The route goes in before the SUBSCRIBE so nothing that follows the
        // SUBACK can slip past it
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let (waiter, confirmed) = oneshot::channel();
        {
            let _submit = self.submit.lock().await;
            {
                let mut link = self.link();
                link.routes.push((filter.to_string(), tx));
                link.queued_subscribes.push_back((filter.to_string(), waiter));
            }
            if let Err(e) = self.client.subscribe(filter, qos.into()).await {
                let mut link = self.link();
                link.queued_subscribes.pop_back();
                link.routes.retain(|(f, _)| f != filter);
                return Err(e.into());
            }
        }

        let result = confirmed.await.unwrap_or(Err(TransportError::Closed));
        if result.is_err() {
            self.link().routes.retain(|(f, _)| f != filter);
        }
        result?;

        debug!(filter = %filter, ?qos, "Subscribed");
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
        self.check_up()?;

        let (waiter, confirmed) = oneshot::channel();
        {
            let _submit = self.submit.lock().await;
            self.link().queued_publishes.push_back(waiter);
            if let Err(e) = self
                .client
                .publish_bytes(topic, qos.into(), retain, payload)
                .await
            {
                self.link().queued_publishes.pop_back();
                return Err(e.into());
            }
        }

        confirmed.await.unwrap_or(Err(TransportError::Closed))
    }

    async fn unsubscribe(&self, filter: &str) -> Result<(), TransportError> {
        // Stop delivery right away, the UNSUBACK only confirms it broker-side
        self.link().routes.retain(|(f, _)| f != filter);
        self.check_up()?;

        let (waiter, confirmed) = oneshot::channel();
        {
            let _submit = self.submit.lock().await;
            self.link().queued_unsubscribes.push_back(waiter);
            if let Err(e) = self.client.unsubscribe(filter).await {
                self.link().queued_unsubscribes.pop_back();
                return Err(e.into());
            }
        }

        confirmed.await.unwrap_or(Err(TransportError::Closed))?;
        debug!(filter = %filter, "Unsubscribed");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let handle = lock(&self.event_loop).take();
        let Some(mut handle) = handle else {
            return Ok(());
        };

        let result = if self.check_up().is_ok() {
            self.client.disconnect().await.map_err(TransportError::from)
        } else {
            Ok(())
        };

        if timeout(DISCONNECT_FLUSH, &mut handle).await.is_err() {
            warn!(broker = %self.broker, "Event loop did not stop after DISCONNECT, aborting it");
            handle.abort();
        }
        self.link().shut(TransportError::Closed);

        info!(broker = %self.broker, "MQTT session closed");
        result
    }

    fn name(&self) -> &'static str {
        "mqtt"
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.event_loop).take() {
            handle.abort();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panic while holding the lock leaves plain bookkeeping behind, still usable
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Poll the rumqttc event loop until the connection ends
async fn drive_event_loop(
    mut event_loop: EventLoop,
    state: Arc<Mutex<LinkState>>,
    broker: String,
    connected: oneshot::Sender<Result<(), TransportError>>,
) {
    let mut connected = Some(connected);

    loop {
        let event = match event_loop.poll().await {
            Ok(event) => event,
            Err(e) => {
                let err = poll_failure(&broker, connected.is_none(), e.to_string());
                match connected.take() {
                    Some(tx) => {
                        let _ = tx.send(Err(err.clone()));
                    }
                    None => error!(broker = %broker, error = %e, "MQTT connection lost"),
                }
                lock(&state).shut(err);
                return;
            }
        };

        match event {
            Event::Incoming(Packet::ConnAck(ack)) => {
                let result = if ack.code == ConnectReturnCode::Success {
                    Ok(())
                } else {
                    Err(TransportError::Connect {
                        broker: broker.clone(),
                        reason: format!("{:?}", ack.code),
                    })
                };
                let refused = result.is_err();
                match connected.take() {
                    Some(tx) => {
                        let _ = tx.send(result);
                    }
                    None => warn!(broker = %broker, "Unexpected CONNACK on an established session"),
                }
                if refused {
                    lock(&state).shut(TransportError::Closed);
                    return;
                }
            }
            Event::Incoming(Packet::Publish(publish)) => {
                let targets = lock(&state).route_targets(&publish.topic);

                if targets.is_empty() {
                    debug!(topic = %publish.topic, "Dropping publish with no live subscription");
                    continue;
                }

                let message = InboundMessage {
                    topic: publish.topic,
                    payload: publish.payload,
                };
                for tx in targets {
                    if tx.send(message.clone()).await.is_err() {
                        debug!(topic = %message.topic, "Subscription queue closed, message dropped");
                    }
                }
            }
            Event::Incoming(Packet::PubAck(ack)) => lock(&state).publish_confirmed(ack.pkid),
            Event::Incoming(Packet::PubComp(ack)) => lock(&state).publish_confirmed(ack.pkid),
            Event::Incoming(Packet::SubAck(ack)) => {
                let rejected = ack
                    .return_codes
                    .iter()
                    .any(|code| matches!(code, SubscribeReasonCode::Failure));
                lock(&state).subscribe_confirmed(ack.pkid, rejected);
            }
            Event::Incoming(Packet::UnsubAck(ack)) => lock(&state).unsubscribe_confirmed(ack.pkid),
            Event::Outgoing(Outgoing::Publish(pkid)) => lock(&state).publish_sent(pkid),
            Event::Outgoing(Outgoing::Subscribe(pkid)) => lock(&state).subscribe_sent(pkid),
            Event::Outgoing(Outgoing::Unsubscribe(pkid)) => lock(&state).unsubscribe_sent(pkid),
            Event::Outgoing(Outgoing::Disconnect) => {
                debug!(broker = %broker, "DISCONNECT sent");
                lock(&state).shut(TransportError::Closed);
                return;
            }
            _ => {}
        }
    }
}

/// Error for a failed poll: refused before the CONNACK, lost after it
fn poll_failure(broker: &str, established: bool, reason: String) -> TransportError {
    if established {
        TransportError::ConnectionLost(reason)
    } else {
        TransportError::Connect {
            broker: broker.to_string(),
            reason,
        }
    }
}

fn complete(waiter: Option<Waiter>, result: Result<(), TransportError>) {
    if let Some(waiter) = waiter {
        let _ = waiter.send(result);
    }
}
