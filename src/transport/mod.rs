pub mod error;
pub mod memory;
pub mod mqtt;
pub mod topic;
pub mod traits;

pub use error::TransportError;
pub use memory::{MemoryBroker, MemoryTransport, PublishRecord};
pub use mqtt::MqttTransport;
pub use traits::{InboundMessage, InboundQueue, QoS, Transport};
