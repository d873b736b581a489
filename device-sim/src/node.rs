//! Request loop of one simulated node

use crate::state::DeviceState;
use cmdbridge::transport::{QoS, Transport, TransportError};
use cmdbridge_shared::{codec, Device};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// A node answering requests on its request topic
pub struct SimulatedNode {
    device: Device,
    state: Arc<Mutex<DeviceState>>,
}

impl SimulatedNode {
    pub fn new(device: Device) -> Self {
        Self {
            device,
            state: Arc::new(Mutex::new(DeviceState::default())),
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Shared view of the node state, for inspection
    pub fn state(&self) -> Arc<Mutex<DeviceState>> {
        self.state.clone()
    }

    /// Answer requests until cancelled
    ///
    /// Replies go out at QoS 1 like the firmware's. Returns the number of
    /// requests answered.
    pub async fn run(
        &self,
        transport: Arc<dyn Transport>,
        cancel: CancellationToken,
    ) -> Result<usize, TransportError> {
        let mut inbound = transport
            .subscribe(self.device.request_topic(), QoS::ExactlyOnce)
            .await?;
        info!(device = %self.device, topic = %self.device.request_topic(), "Node online");

        let mut answered = 0;
        loop {
            let message = tokio::select! {
                _ = cancel.cancelled() => break,
                message = inbound.recv() => message,
            };
            let Some(message) = message else {
                warn!(device = %self.device, "Request subscription closed");
                break;
            };

            let request = match codec::decode_request(&message.payload) {
                Ok(request) => request,
                Err(e) => {
                    warn!(device = %self.device, error = %e, "Dropping undecodable request");
                    continue;
                }
            };

            let response = self.state.lock().await.handle(&request);
            let payload = match codec::encode_response(&response) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(device = %self.device, error = %e, "Failed to encode response");
                    continue;
                }
            };

            transport
                .publish(self.device.response_topic(), payload, QoS::AtLeastOnce, false)
                .await?;
            answered += 1;
        }

        info!(device = %self.device, answered, "Node offline");
        Ok(answered)
    }
}
