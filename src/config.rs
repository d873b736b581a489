//! Bridge configuration
//!
//! Everything the bridge needs to know about its environment is carried in a
//! [`BridgeConfig`] handed to the session and the supervisor; nothing is read
//! from process-wide state.

use cmdbridge_shared::{new_correlation_id, Device};
use std::time::Duration;

/// MQTT protocol revision spoken to the broker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolVersion {
    /// MQTT 3.1.1, what the sensor nodes speak
    #[default]
    V311,
}

/// Broker connection configuration
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Broker host name or address
    pub host: String,
    /// Broker TCP port
    pub port: u16,
    /// MQTT client id, must be unique per broker
    pub client_id: String,
    /// Protocol revision
    pub protocol: ProtocolVersion,
    /// MQTT keep-alive interval
    pub keep_alive: Duration,
    /// Time allowed for the CONNACK to arrive
    pub connect_timeout: Duration,
    /// Capacity of the client request queue and of each inbound queue
    pub channel_capacity: usize,
}

impl BrokerConfig {
    /// `host:port`, for logs and errors
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 1883,
            client_id: format!("cmdbridge-{}", &new_correlation_id()[..8]),
            protocol: ProtocolVersion::V311,
            keep_alive: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            channel_capacity: 64,
        }
    }
}

/// Configuration for one bridge run
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Broker configuration
    pub broker: BrokerConfig,
    /// Devices the run talks to, in the order given
    pub devices: Vec<Device>,
    /// How long cancelled tasks get to exit during teardown
    pub grace_period: Duration,
    /// Deadline for a listener to collect its responses; `None` waits forever
    pub response_timeout: Option<Duration>,
}

impl BridgeConfig {
    /// Create a config for the given devices with default broker settings
    pub fn new(devices: Vec<Device>) -> Self {
        Self {
            devices,
            ..Default::default()
        }
    }

    /// Devices with duplicates removed, first occurrence wins
    pub fn unique_devices(&self) -> Vec<Device> {
        let mut unique: Vec<Device> = Vec::with_capacity(self.devices.len());
        for device in &self.devices {
            if !unique.contains(device) {
                unique.push(device.clone());
            }
        }
        unique
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            broker: BrokerConfig::default(),
            devices: Vec::new(),
            grace_period: Duration::from_secs(5),
            response_timeout: None,
        }
    }
}
