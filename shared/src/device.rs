//! Device identity and the command topic naming convention

use std::fmt;

use thiserror::Error;

/// Prefix shared by every command topic
pub const COMMAND_TOPIC_PREFIX: &str = "command";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DeviceIdError {
    #[error("Device id is empty")]
    Empty,

    #[error("Device id contains a topic separator or wildcard: {0}")]
    InvalidCharacter(String),
}

/// A remote sensor node addressed by its stable identifier (usually a UUID)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Device {
    id: String,
    request_topic: String,
    response_topic: String,
}

impl Device {
    /// Create a device from its identifier
    ///
    /// The id becomes a single topic level, so it may not contain `/`, `+` or `#`.
    pub fn new(id: impl Into<String>) -> Result<Self, DeviceIdError> {
        let id = id.into();
        let id = id.trim().to_string();

        if id.is_empty() {
            return Err(DeviceIdError::Empty);
        }
        if id.contains(['/', '+', '#']) {
            return Err(DeviceIdError::InvalidCharacter(id));
        }

        Ok(Self {
            request_topic: format!("{COMMAND_TOPIC_PREFIX}/{id}/req/"),
            response_topic: format!("{COMMAND_TOPIC_PREFIX}/{id}/resp/"),
            id,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Topic the device listens on for commands
    pub fn request_topic(&self) -> &str {
        &self.request_topic
    }

    /// Topic the device answers on
    pub fn response_topic(&self) -> &str {
        &self.response_topic
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Generate a fresh correlation id for a command envelope
pub fn new_correlation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
