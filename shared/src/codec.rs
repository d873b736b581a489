//! Envelope codec
//!
//! MQTT preserves message boundaries, so every publish carries exactly one
//! protobuf-encoded envelope with no additional framing:
//! ```text
//! [ N bytes: protobuf CommandRequest | CommandResponse ]
//! ```

use bytes::{Bytes, BytesMut};
use prost::Message;
use thiserror::Error;

use crate::{CommandRequest, CommandResponse};

/// Maximum envelope size (256 KB), well above anything the firmware emits
pub const MAX_MESSAGE_SIZE: usize = 256 * 1024;

/// Errors that can occur while decoding an inbound envelope
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Message too large: {0} bytes (max: {MAX_MESSAGE_SIZE})")]
    MessageTooLarge(usize),

    #[error("Protobuf decode error: {0}")]
    Protobuf(#[from] prost::DecodeError),

    #[error("Request has no correlation id")]
    MissingCorrelationId,
}

/// Errors that can occur while encoding an outbound envelope
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("Message too large: {0} bytes (max: {MAX_MESSAGE_SIZE})")]
    MessageTooLarge(usize),

    #[error("Protobuf encode error: {0}")]
    Protobuf(#[from] prost::EncodeError),
}

fn encode_message<M: Message>(message: &M) -> Result<Bytes, EncodeError> {
    let msg_len = message.encoded_len();

    if msg_len > MAX_MESSAGE_SIZE {
        return Err(EncodeError::MessageTooLarge(msg_len));
    }

    let mut buf = BytesMut::with_capacity(msg_len);
    message.encode(&mut buf)?;

    Ok(buf.freeze())
}

fn decode_message<M: Message + Default>(buf: &[u8]) -> Result<M, DecodeError> {
    if buf.len() > MAX_MESSAGE_SIZE {
        return Err(DecodeError::MessageTooLarge(buf.len()));
    }

    Ok(M::decode(buf)?)
}

/// Encode a command for publishing on a request topic
pub fn encode_request(request: &CommandRequest) -> Result<Bytes, EncodeError> {
    encode_message(request)
}

/// Encode a device response for publishing on a response topic
pub fn encode_response(response: &CommandResponse) -> Result<Bytes, EncodeError> {
    encode_message(response)
}

/// Decode a command received on a request topic
pub fn decode_request(buf: &[u8]) -> Result<CommandRequest, DecodeError> {
    let request: CommandRequest = decode_message(buf)?;
    if request.uuid.is_empty() {
        return Err(DecodeError::MissingCorrelationId);
    }
    Ok(request)
}

/// Decode a device response received on a response topic
///
/// An empty correlation id still decodes; such a response simply matches no
/// issued command.
pub fn decode_response(buf: &[u8]) -> Result<CommandResponse, DecodeError> {
    decode_message(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{alarm, command_request, command_response, RetCode};

    fn alarm_list_response() -> CommandResponse {
        CommandResponse {
            uuid: "c0ffee".into(),
            ret_code: RetCode::Handled.into(),
            resp: Some(command_response::Resp::AlarmListResponse(alarm::ListResponse {
                alarms: vec![alarm::list_response::Alarm {
                    crontab: "*/15 * * * * *".into(),
                    oneshot: true,
                    enabled: true,
                }],
            })),
        }
    }

    #[test]
    fn test_response_keeps_nested_alarms() {
        let encoded = encode_response(&alarm_list_response()).expect("encode failed");
        let decoded = decode_response(&encoded).expect("decode failed");

        assert_eq!(decoded.uuid, "c0ffee");
        assert_eq!(decoded.ret_code(), RetCode::Handled);
        match decoded.resp {
            Some(command_response::Resp::AlarmListResponse(list)) => {
                assert_eq!(list.alarms.len(), 1);
                assert_eq!(list.alarms[0].crontab, "*/15 * * * * *");
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn test_empty_request_variant_survives_encoding() {
        // An empty submessage must still select the oneof arm on the wire
        let request = CommandRequest {
            uuid: "abc".into(),
            cmd: Some(command_request::Cmd::AlarmListRequest(alarm::ListRequest {})),
        };
        let encoded = encode_request(&request).expect("encode failed");
        let decoded = decode_request(&encoded).expect("decode failed");

        assert!(matches!(
            decoded.cmd,
            Some(command_request::Cmd::AlarmListRequest(_))
        ));
    }

    #[test]
    fn test_garbage_is_rejected() {
        let result = decode_response(&[0xff, 0xff, 0xff, 0xff]);
        assert!(matches!(result, Err(DecodeError::Protobuf(_))));
    }

    #[test]
    fn test_response_without_correlation_id_decodes() {
        let response = CommandResponse {
            uuid: String::new(),
            ret_code: RetCode::Error.into(),
            resp: None,
        };
        let encoded = encode_response(&response).expect("encode failed");

        let decoded = decode_response(&encoded).expect("decode failed");
        assert!(decoded.uuid.is_empty());
        assert_eq!(decoded.ret_code(), RetCode::Error);

        // Zero bytes is a valid, all-default envelope too
        assert!(decode_response(&[]).is_ok());
    }

    #[test]
    fn test_request_without_correlation_id_rejected() {
        let request = CommandRequest {
            uuid: String::new(),
            cmd: Some(command_request::Cmd::AlarmListRequest(alarm::ListRequest {})),
        };
        let encoded = encode_request(&request).expect("encode failed");

        let result = decode_request(&encoded);
        assert!(matches!(result, Err(DecodeError::MissingCorrelationId)));
    }

    #[test]
    fn test_message_too_large() {
        let buf = vec![0u8; MAX_MESSAGE_SIZE + 1];
        let result = decode_response(&buf);
        assert!(matches!(result, Err(DecodeError::MessageTooLarge(_))));
    }
}
