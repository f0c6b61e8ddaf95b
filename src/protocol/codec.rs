//! Codec for the newline-framed JSON protocol
//!
//! Decoding happens in two stages. The envelope stage parses a frame as JSON
//! and extracts the `type` discriminator while keeping the parsed value
//! around. The strict stage re-reads that value into the typed request struct
//! and validates it: the `type` literal must match, required fields must be
//! non-empty, and enum fields must carry an allowed literal. Any failure is a
//! protocol violation.

use std::fmt;

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::messages::*;

/// Protocol-level decode errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The frame is not valid JSON, or not a JSON object
    InvalidJson(String),
    /// The object has no `type` field
    MissingType,
    /// The `type` field is not a non-empty string
    TypeNotString,
    /// The `type` literal does not match the decoder that was invoked
    UnexpectedType {
        expected: MessageType,
        found: String,
    },
    /// A required field is empty
    EmptyField(&'static str),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::InvalidJson(msg) => write!(f, "invalid json: {}", msg),
            DecodeError::MissingType => write!(f, "missing \"type\" field"),
            DecodeError::TypeNotString => write!(f, "\"type\" field is not a string"),
            DecodeError::UnexpectedType { expected, found } => {
                write!(f, "expected message type {:?}, got {:?}", expected.as_str(), found)
            }
            DecodeError::EmptyField(field) => write!(f, "required field is empty: {}", field),
        }
    }
}

impl std::error::Error for DecodeError {}

/// A minimally decoded message: the `type` literal plus the parsed JSON,
/// preserved for strict type-specific decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    type_name: String,
    raw: Value,
}

impl Envelope {
    /// The raw `type` literal as it appeared on the wire.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The recognized message type, if the literal is a known one.
    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::parse(&self.type_name)
    }
}

/// Parse a raw frame into an [`Envelope`]. The input must be a JSON object
/// with a non-empty string-valued `type` field.
pub fn decode_envelope(frame: &[u8]) -> Result<Envelope, DecodeError> {
    let value: Value = serde_json::from_slice(frame)
        .map_err(|err| DecodeError::InvalidJson(err.to_string()))?;

    let object = value
        .as_object()
        .ok_or_else(|| DecodeError::InvalidJson("expected json object".to_string()))?;

    let type_value = object.get("type").ok_or(DecodeError::MissingType)?;
    let type_name = match type_value.as_str() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => return Err(DecodeError::TypeNotString),
    };

    Ok(Envelope {
        type_name,
        raw: value,
    })
}

fn decode_as<T: DeserializeOwned>(
    envelope: &Envelope,
    expected: MessageType,
) -> Result<T, DecodeError> {
    if envelope.message_type() != Some(expected) {
        return Err(DecodeError::UnexpectedType {
            expected,
            found: envelope.type_name.clone(),
        });
    }

    serde_json::from_value(envelope.raw.clone())
        .map_err(|err| DecodeError::InvalidJson(err.to_string()))
}

fn require_non_empty(value: &str, field: &'static str) -> Result<(), DecodeError> {
    if value.is_empty() {
        return Err(DecodeError::EmptyField(field));
    }
    Ok(())
}

/// Decode and validate an IDENTIFY request.
pub fn decode_identify(envelope: &Envelope) -> Result<IdentifyRequest, DecodeError> {
    let request: IdentifyRequest = decode_as(envelope, MessageType::Identify)?;
    require_non_empty(&request.username, "username")?;
    Ok(request)
}

/// Decode and validate a STATUS request. Unknown status literals fail the
/// enum deserialization and surface as invalid JSON.
pub fn decode_status(envelope: &Envelope) -> Result<StatusRequest, DecodeError> {
    decode_as(envelope, MessageType::Status)
}

/// Decode and validate a USERS request.
pub fn decode_users(envelope: &Envelope) -> Result<UsersRequest, DecodeError> {
    decode_as(envelope, MessageType::Users)
}

/// Decode and validate a private TEXT request.
pub fn decode_text(envelope: &Envelope) -> Result<TextRequest, DecodeError> {
    let request: TextRequest = decode_as(envelope, MessageType::Text)?;
    require_non_empty(&request.username, "username")?;
    require_non_empty(&request.text, "text")?;
    Ok(request)
}

/// Decode and validate a PUBLIC_TEXT request.
pub fn decode_public_text(envelope: &Envelope) -> Result<PublicTextRequest, DecodeError> {
    let request: PublicTextRequest = decode_as(envelope, MessageType::PublicText)?;
    require_non_empty(&request.text, "text")?;
    Ok(request)
}

/// Decode and validate a NEW_ROOM request.
pub fn decode_new_room(envelope: &Envelope) -> Result<NewRoomRequest, DecodeError> {
    let request: NewRoomRequest = decode_as(envelope, MessageType::NewRoom)?;
    require_non_empty(&request.room_name, "roomname")?;
    Ok(request)
}

/// Decode and validate an INVITE request.
pub fn decode_invite(envelope: &Envelope) -> Result<InviteRequest, DecodeError> {
    let request: InviteRequest = decode_as(envelope, MessageType::Invite)?;
    require_non_empty(&request.room_name, "roomname")?;
    if request.usernames.is_empty() {
        return Err(DecodeError::EmptyField("usernames"));
    }
    for username in &request.usernames {
        require_non_empty(username, "usernames")?;
    }
    Ok(request)
}

/// Decode and validate a JOIN_ROOM request.
pub fn decode_join_room(envelope: &Envelope) -> Result<JoinRoomRequest, DecodeError> {
    let request: JoinRoomRequest = decode_as(envelope, MessageType::JoinRoom)?;
    require_non_empty(&request.room_name, "roomname")?;
    Ok(request)
}

/// Decode and validate a ROOM_USERS request.
pub fn decode_room_users(envelope: &Envelope) -> Result<RoomUsersRequest, DecodeError> {
    let request: RoomUsersRequest = decode_as(envelope, MessageType::RoomUsers)?;
    require_non_empty(&request.room_name, "roomname")?;
    Ok(request)
}

/// Decode and validate a ROOM_TEXT request.
pub fn decode_room_text(envelope: &Envelope) -> Result<RoomTextRequest, DecodeError> {
    let request: RoomTextRequest = decode_as(envelope, MessageType::RoomText)?;
    require_non_empty(&request.room_name, "roomname")?;
    require_non_empty(&request.text, "text")?;
    Ok(request)
}

/// Decode and validate a LEAVE_ROOM request.
pub fn decode_leave_room(envelope: &Envelope) -> Result<LeaveRoomRequest, DecodeError> {
    let request: LeaveRoomRequest = decode_as(envelope, MessageType::LeaveRoom)?;
    require_non_empty(&request.room_name, "roomname")?;
    Ok(request)
}

/// Decode and validate a DISCONNECT request.
pub fn decode_disconnect(envelope: &Envelope) -> Result<DisconnectRequest, DecodeError> {
    decode_as(envelope, MessageType::Disconnect)
}

/// Serialize a protocol message into a frame payload.
///
/// Panics on error: marshaling is only used with server-owned, well-defined
/// structs, so a failure here is a programming error, not a runtime condition
/// caused by client input.
pub fn marshal<T: Serialize>(message: &T) -> Bytes {
    match serde_json::to_vec(message) {
        Ok(encoded) => Bytes::from(encoded),
        Err(err) => panic!("protocol marshal failed: {}", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(json: &str) -> Envelope {
        decode_envelope(json.as_bytes()).unwrap()
    }

    #[test]
    fn test_envelope_happy_path() {
        let env = envelope(r#"{"type":"IDENTIFY","username":"alice"}"#);
        assert_eq!(env.type_name(), "IDENTIFY");
        assert_eq!(env.message_type(), Some(MessageType::Identify));
    }

    #[test]
    fn test_envelope_preserves_unknown_types() {
        let env = envelope(r#"{"type":"SHOUT","volume":11}"#);
        assert_eq!(env.type_name(), "SHOUT");
        assert_eq!(env.message_type(), None);
    }

    #[test]
    fn test_envelope_rejects_invalid_json() {
        let result = decode_envelope(b"{not json");
        assert!(matches!(result, Err(DecodeError::InvalidJson(_))));
    }

    #[test]
    fn test_envelope_rejects_non_objects() {
        for frame in [&b"[1,2,3]"[..], b"\"IDENTIFY\"", b"42", b"null"] {
            let result = decode_envelope(frame);
            assert!(matches!(result, Err(DecodeError::InvalidJson(_))), "{frame:?}");
        }
    }

    #[test]
    fn test_envelope_requires_type() {
        assert_eq!(
            decode_envelope(br#"{"username":"alice"}"#),
            Err(DecodeError::MissingType)
        );
        assert_eq!(
            decode_envelope(br#"{"type":42}"#),
            Err(DecodeError::TypeNotString)
        );
        assert_eq!(
            decode_envelope(br#"{"type":""}"#),
            Err(DecodeError::TypeNotString)
        );
    }

    #[test]
    fn test_decode_identify() {
        let request = decode_identify(&envelope(r#"{"type":"IDENTIFY","username":"bob"}"#)).unwrap();
        assert_eq!(request.username, "bob");
    }

    #[test]
    fn test_decode_identify_rejects_empty_username() {
        let result = decode_identify(&envelope(r#"{"type":"IDENTIFY","username":""}"#));
        assert_eq!(result.unwrap_err(), DecodeError::EmptyField("username"));
    }

    #[test]
    fn test_decode_identify_rejects_missing_username() {
        let result = decode_identify(&envelope(r#"{"type":"IDENTIFY"}"#));
        assert!(matches!(result, Err(DecodeError::InvalidJson(_))));
    }

    #[test]
    fn test_decode_rejects_wrong_type_literal() {
        let result = decode_identify(&envelope(r#"{"type":"STATUS","status":"AWAY"}"#));
        assert!(matches!(result, Err(DecodeError::UnexpectedType { .. })));
    }

    #[test]
    fn test_decode_status() {
        let request = decode_status(&envelope(r#"{"type":"STATUS","status":"BUSY"}"#)).unwrap();
        assert_eq!(request.status, Status::Busy);
    }

    #[test]
    fn test_decode_status_rejects_unknown_literal() {
        let result = decode_status(&envelope(r#"{"type":"STATUS","status":"SLEEPING"}"#));
        assert!(matches!(result, Err(DecodeError::InvalidJson(_))));
    }

    #[test]
    fn test_decode_text_requires_both_fields() {
        let result = decode_text(&envelope(r#"{"type":"TEXT","username":"bob","text":""}"#));
        assert_eq!(result.unwrap_err(), DecodeError::EmptyField("text"));

        let result = decode_text(&envelope(r#"{"type":"TEXT","username":"","text":"hi"}"#));
        assert_eq!(result.unwrap_err(), DecodeError::EmptyField("username"));
    }

    #[test]
    fn test_decode_invite() {
        let request = decode_invite(&envelope(
            r#"{"type":"INVITE","roomname":"r1","usernames":["bob","carol"]}"#,
        ))
        .unwrap();
        assert_eq!(request.room_name, "r1");
        assert_eq!(request.usernames, vec!["bob", "carol"]);
    }

    #[test]
    fn test_decode_invite_rejects_empty_lists_and_elements() {
        let result = decode_invite(&envelope(r#"{"type":"INVITE","roomname":"r1","usernames":[]}"#));
        assert_eq!(result.unwrap_err(), DecodeError::EmptyField("usernames"));

        let result = decode_invite(&envelope(
            r#"{"type":"INVITE","roomname":"r1","usernames":["bob",""]}"#,
        ));
        assert_eq!(result.unwrap_err(), DecodeError::EmptyField("usernames"));
    }

    #[test]
    fn test_decode_disconnect_ignores_extra_fields() {
        let request = decode_disconnect(&envelope(r#"{"type":"DISCONNECT","why":"done"}"#));
        assert!(request.is_ok());
    }

    #[test]
    fn test_marshal_response_shape() {
        let frame = marshal(&ResponseMessage::new("IDENTIFY", "SUCCESS").with_extra("alice"));
        assert_eq!(
            frame.as_ref(),
            br#"{"type":"RESPONSE","operation":"IDENTIFY","result":"SUCCESS","extra":"alice"}"#
        );
    }

    #[test]
    fn test_marshal_roundtrips_through_strict_decode() {
        let frame = marshal(&RoomTextRequest::new("r1", "hello there"));
        let env = decode_envelope(&frame).unwrap();
        let request = decode_room_text(&env).unwrap();
        assert_eq!(request.room_name, "r1");
        assert_eq!(request.text, "hello there");
    }
}
