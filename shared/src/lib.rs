//! Sensor node command protocol
//!
//! This crate provides the command envelope types, the topic naming
//! convention and the codec shared by the command bridge and the device
//! simulator.

pub mod codec;
pub mod device;
pub mod proto;

use std::time::{SystemTime, UNIX_EPOCH};

// Re-export commonly used types at crate root
pub use device::{new_correlation_id, Device, DeviceIdError};
pub use proto::*;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

impl CommandRequest {
    /// Wrap a command in a fresh envelope with a new correlation id
    pub fn new(cmd: command_request::Cmd) -> Self {
        Self {
            uuid: new_correlation_id(),
            cmd: Some(cmd),
        }
    }

    /// Name of the carried command variant, `"none"` when empty
    pub fn kind(&self) -> &'static str {
        self.cmd.as_ref().map_or("none", command_request::Cmd::name)
    }
}

impl CommandResponse {
    /// Create a response answering the request with the given correlation id
    pub fn reply(uuid: impl Into<String>, ret_code: RetCode, resp: Option<command_response::Resp>) -> Self {
        Self {
            uuid: uuid.into(),
            ret_code: ret_code.into(),
            resp,
        }
    }

    /// Name of the carried result variant, `"none"` when empty
    pub fn kind(&self) -> &'static str {
        self.resp.as_ref().map_or("none", command_response::Resp::name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_creation() {
        let req = CommandRequest::new(command_request::Cmd::OtamgrUpdateRequest(
            otamgr::UpdateRequest {},
        ));
        assert!(!req.uuid.is_empty());
        assert_eq!(req.kind(), "otamgr_update_request");
    }

    #[test]
    fn test_reply_creation() {
        let resp = CommandResponse::reply("id-1", RetCode::Error, None);
        assert_eq!(resp.uuid, "id-1");
        assert_eq!(resp.ret_code(), RetCode::Error);
        assert_eq!(resp.kind(), "none");
    }
}
