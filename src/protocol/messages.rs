//! Protocol message types for the chat service
//!
//! Every wire message is a single JSON object carrying a `type` discriminator
//! plus the fields required by that type. Requests flow client to server,
//! events flow server to client; both sides share these definitions.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Maximum username length in characters.
pub const MAX_USERNAME_LEN: usize = 8;

/// Maximum room name length in characters.
pub const MAX_ROOM_NAME_LEN: usize = 16;

/// A user's availability state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "ACTIVE")]
    Active,
    #[serde(rename = "AWAY")]
    Away,
    #[serde(rename = "BUSY")]
    Busy,
}

impl Status {
    /// Parse a status literal, returns None for anything else
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ACTIVE" => Some(Status::Active),
            "AWAY" => Some(Status::Away),
            "BUSY" => Some(Status::Busy),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Active => "ACTIVE",
            Status::Away => "AWAY",
            Status::Busy => "BUSY",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The value of the `type` field in all protocol messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    // Client to server
    Identify,
    Status,
    Users,
    Text,
    PublicText,
    NewRoom,
    Invite,
    JoinRoom,
    RoomUsers,
    RoomText,
    LeaveRoom,
    Disconnect,

    // Server to client
    Response,
    NewUser,
    NewStatus,
    UserList,
    TextFrom,
    PublicTextFrom,
    Invitation,
    JoinedRoom,
    RoomUserList,
    RoomTextFrom,
    LeftRoom,
    Disconnected,
}

impl MessageType {
    /// Convert from the wire literal, returns None for unknown types
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "IDENTIFY" => Some(MessageType::Identify),
            "STATUS" => Some(MessageType::Status),
            "USERS" => Some(MessageType::Users),
            "TEXT" => Some(MessageType::Text),
            "PUBLIC_TEXT" => Some(MessageType::PublicText),
            "NEW_ROOM" => Some(MessageType::NewRoom),
            "INVITE" => Some(MessageType::Invite),
            "JOIN_ROOM" => Some(MessageType::JoinRoom),
            "ROOM_USERS" => Some(MessageType::RoomUsers),
            "ROOM_TEXT" => Some(MessageType::RoomText),
            "LEAVE_ROOM" => Some(MessageType::LeaveRoom),
            "DISCONNECT" => Some(MessageType::Disconnect),

            "RESPONSE" => Some(MessageType::Response),
            "NEW_USER" => Some(MessageType::NewUser),
            "NEW_STATUS" => Some(MessageType::NewStatus),
            "USER_LIST" => Some(MessageType::UserList),
            "TEXT_FROM" => Some(MessageType::TextFrom),
            "PUBLIC_TEXT_FROM" => Some(MessageType::PublicTextFrom),
            "INVITATION" => Some(MessageType::Invitation),
            "JOINED_ROOM" => Some(MessageType::JoinedRoom),
            "ROOM_USER_LIST" => Some(MessageType::RoomUserList),
            "ROOM_TEXT_FROM" => Some(MessageType::RoomTextFrom),
            "LEFT_ROOM" => Some(MessageType::LeftRoom),
            "DISCONNECTED" => Some(MessageType::Disconnected),

            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Identify => "IDENTIFY",
            MessageType::Status => "STATUS",
            MessageType::Users => "USERS",
            MessageType::Text => "TEXT",
            MessageType::PublicText => "PUBLIC_TEXT",
            MessageType::NewRoom => "NEW_ROOM",
            MessageType::Invite => "INVITE",
            MessageType::JoinRoom => "JOIN_ROOM",
            MessageType::RoomUsers => "ROOM_USERS",
            MessageType::RoomText => "ROOM_TEXT",
            MessageType::LeaveRoom => "LEAVE_ROOM",
            MessageType::Disconnect => "DISCONNECT",

            MessageType::Response => "RESPONSE",
            MessageType::NewUser => "NEW_USER",
            MessageType::NewStatus => "NEW_STATUS",
            MessageType::UserList => "USER_LIST",
            MessageType::TextFrom => "TEXT_FROM",
            MessageType::PublicTextFrom => "PUBLIC_TEXT_FROM",
            MessageType::Invitation => "INVITATION",
            MessageType::JoinedRoom => "JOINED_ROOM",
            MessageType::RoomUserList => "ROOM_USER_LIST",
            MessageType::RoomTextFrom => "ROOM_TEXT_FROM",
            MessageType::LeftRoom => "LEFT_ROOM",
            MessageType::Disconnected => "DISCONNECTED",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check whether a username is acceptable: 1..=8 printable,
/// non-whitespace ASCII characters.
pub fn username_is_valid(username: &str) -> bool {
    if username.is_empty() || username.len() > MAX_USERNAME_LEN {
        return false;
    }
    username.bytes().all(|b| (0x21..=0x7E).contains(&b))
}

/// Check whether a room name is acceptable: 1..=16 printable ASCII
/// characters, spaces allowed.
pub fn room_name_is_valid(room_name: &str) -> bool {
    if room_name.is_empty() || room_name.len() > MAX_ROOM_NAME_LEN {
        return false;
    }
    room_name.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

// =============================================================================
// Client to server requests
// =============================================================================

/// Sent by a client to identify itself after connecting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyRequest {
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    pub username: String,
}

impl IdentifyRequest {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            msg_type: MessageType::Identify,
            username: username.into(),
        }
    }
}

/// Updates the sender's status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusRequest {
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    pub status: Status,
}

impl StatusRequest {
    pub fn new(status: Status) -> Self {
        Self {
            msg_type: MessageType::Status,
            status,
        }
    }
}

/// Asks the server for the full user list with statuses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsersRequest {
    #[serde(rename = "type")]
    pub msg_type: MessageType,
}

impl UsersRequest {
    pub fn new() -> Self {
        Self {
            msg_type: MessageType::Users,
        }
    }
}

impl Default for UsersRequest {
    fn default() -> Self {
        Self::new()
    }
}

/// Sends a private message to a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextRequest {
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    pub username: String,
    pub text: String,
}

impl TextRequest {
    pub fn new(username: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            msg_type: MessageType::Text,
            username: username.into(),
            text: text.into(),
        }
    }
}

/// Sends a public message to every other user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicTextRequest {
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    pub text: String,
}

impl PublicTextRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            msg_type: MessageType::PublicText,
            text: text.into(),
        }
    }
}

/// Creates a new room; the creator becomes its first member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRoomRequest {
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    #[serde(rename = "roomname")]
    pub room_name: String,
}

impl NewRoomRequest {
    pub fn new(room_name: impl Into<String>) -> Self {
        Self {
            msg_type: MessageType::NewRoom,
            room_name: room_name.into(),
        }
    }
}

/// Invites users to a room. Already-joined and already-invited targets
/// are skipped by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InviteRequest {
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    #[serde(rename = "roomname")]
    pub room_name: String,
    pub usernames: Vec<String>,
}

impl InviteRequest {
    pub fn new(room_name: impl Into<String>, usernames: Vec<String>) -> Self {
        Self {
            msg_type: MessageType::Invite,
            room_name: room_name.into(),
            usernames,
        }
    }
}

/// Joins a room the sender was invited to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRoomRequest {
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    #[serde(rename = "roomname")]
    pub room_name: String,
}

impl JoinRoomRequest {
    pub fn new(room_name: impl Into<String>) -> Self {
        Self {
            msg_type: MessageType::JoinRoom,
            room_name: room_name.into(),
        }
    }
}

/// Asks for the member list of a room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomUsersRequest {
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    #[serde(rename = "roomname")]
    pub room_name: String,
}

impl RoomUsersRequest {
    pub fn new(room_name: impl Into<String>) -> Self {
        Self {
            msg_type: MessageType::RoomUsers,
            room_name: room_name.into(),
        }
    }
}

/// Sends a message to every other member of a room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomTextRequest {
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    #[serde(rename = "roomname")]
    pub room_name: String,
    pub text: String,
}

impl RoomTextRequest {
    pub fn new(room_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            msg_type: MessageType::RoomText,
            room_name: room_name.into(),
            text: text.into(),
        }
    }
}

/// Leaves a room the sender previously joined.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaveRoomRequest {
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    #[serde(rename = "roomname")]
    pub room_name: String,
}

impl LeaveRoomRequest {
    pub fn new(room_name: impl Into<String>) -> Self {
        Self {
            msg_type: MessageType::LeaveRoom,
            room_name: room_name.into(),
        }
    }
}

/// Explicitly disconnects the sender.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisconnectRequest {
    #[serde(rename = "type")]
    pub msg_type: MessageType,
}

impl DisconnectRequest {
    pub fn new() -> Self {
        Self {
            msg_type: MessageType::Disconnect,
        }
    }
}

impl Default for DisconnectRequest {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Server to client events
// =============================================================================

/// Generic server response for operations that need explicit
/// acknowledgment or error reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMessage {
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    pub operation: String,
    pub result: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<String>,
}

impl ResponseMessage {
    pub fn new(operation: impl Into<String>, result: impl Into<String>) -> Self {
        Self {
            msg_type: MessageType::Response,
            operation: operation.into(),
            result: result.into(),
            extra: None,
        }
    }

    pub fn with_extra(mut self, extra: impl Into<String>) -> Self {
        self.extra = Some(extra.into());
        self
    }
}

/// Broadcast when a new user successfully identifies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUserMessage {
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    pub username: String,
}

impl NewUserMessage {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            msg_type: MessageType::NewUser,
            username: username.into(),
        }
    }
}

/// Broadcast when a user changes status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStatusMessage {
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    pub username: String,
    pub status: Status,
}

impl NewStatusMessage {
    pub fn new(username: impl Into<String>, status: Status) -> Self {
        Self {
            msg_type: MessageType::NewStatus,
            username: username.into(),
            status,
        }
    }
}

/// Sent in response to USERS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserListMessage {
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    pub users: HashMap<String, Status>,
}

impl UserListMessage {
    pub fn new(users: HashMap<String, Status>) -> Self {
        Self {
            msg_type: MessageType::UserList,
            users,
        }
    }
}

/// Delivered to the recipient of a private message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextFromMessage {
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    pub username: String,
    pub text: String,
}

impl TextFromMessage {
    pub fn new(username: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            msg_type: MessageType::TextFrom,
            username: username.into(),
            text: text.into(),
        }
    }
}

/// Broadcast for public messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicTextFromMessage {
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    pub username: String,
    pub text: String,
}

impl PublicTextFromMessage {
    pub fn new(username: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            msg_type: MessageType::PublicTextFrom,
            username: username.into(),
            text: text.into(),
        }
    }
}

/// Sent to each newly invited user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvitationMessage {
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    #[serde(rename = "roomname")]
    pub room_name: String,
    pub username: String,
}

impl InvitationMessage {
    pub fn new(room_name: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            msg_type: MessageType::Invitation,
            room_name: room_name.into(),
            username: username.into(),
        }
    }
}

/// Broadcast to room members when someone joins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinedRoomMessage {
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    #[serde(rename = "roomname")]
    pub room_name: String,
    pub username: String,
}

impl JoinedRoomMessage {
    pub fn new(room_name: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            msg_type: MessageType::JoinedRoom,
            room_name: room_name.into(),
            username: username.into(),
        }
    }
}

/// Sent in response to ROOM_USERS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomUserListMessage {
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    #[serde(rename = "roomname")]
    pub room_name: String,
    pub users: HashMap<String, Status>,
}

impl RoomUserListMessage {
    pub fn new(room_name: impl Into<String>, users: HashMap<String, Status>) -> Self {
        Self {
            msg_type: MessageType::RoomUserList,
            room_name: room_name.into(),
            users,
        }
    }
}

/// Delivered to room members for room messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomTextFromMessage {
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    #[serde(rename = "roomname")]
    pub room_name: String,
    pub username: String,
    pub text: String,
}

impl RoomTextFromMessage {
    pub fn new(
        room_name: impl Into<String>,
        username: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            msg_type: MessageType::RoomTextFrom,
            room_name: room_name.into(),
            username: username.into(),
            text: text.into(),
        }
    }
}

/// Broadcast to remaining room members when someone leaves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeftRoomMessage {
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    #[serde(rename = "roomname")]
    pub room_name: String,
    pub username: String,
}

impl LeftRoomMessage {
    pub fn new(room_name: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            msg_type: MessageType::LeftRoom,
            room_name: room_name.into(),
            username: username.into(),
        }
    }
}

/// Broadcast when a user disconnects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisconnectedMessage {
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    pub username: String,
}

impl DisconnectedMessage {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            msg_type: MessageType::Disconnected,
            username: username.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_roundtrip() {
        let types = [
            MessageType::Identify,
            MessageType::PublicText,
            MessageType::NewRoom,
            MessageType::RoomUserList,
            MessageType::Disconnected,
        ];

        for msg_type in types {
            let literal = msg_type.as_str();
            let recovered = MessageType::parse(literal).unwrap();
            assert_eq!(msg_type, recovered);
        }
    }

    #[test]
    fn test_message_type_serde_literals() {
        let json = serde_json::to_string(&MessageType::PublicTextFrom).unwrap();
        assert_eq!(json, "\"PUBLIC_TEXT_FROM\"");

        let parsed: MessageType = serde_json::from_str("\"ROOM_USERS\"").unwrap();
        assert_eq!(parsed, MessageType::RoomUsers);
    }

    #[test]
    fn test_unknown_message_type() {
        assert!(MessageType::parse("SHOUT").is_none());
        assert!(serde_json::from_str::<MessageType>("\"SHOUT\"").is_err());
    }

    #[test]
    fn test_status_literals() {
        assert_eq!(Status::parse("ACTIVE"), Some(Status::Active));
        assert_eq!(Status::parse("AWAY"), Some(Status::Away));
        assert_eq!(Status::parse("BUSY"), Some(Status::Busy));
        assert_eq!(Status::parse("active"), None);
        assert_eq!(Status::parse(""), None);
    }

    #[test]
    fn test_username_validation() {
        assert!(username_is_valid("alice"));
        assert!(username_is_valid("a"));
        assert!(username_is_valid("eight888"));
        assert!(username_is_valid("a_b-c.d!"));

        assert!(!username_is_valid(""));
        assert!(!username_is_valid("ninechars"));
        assert!(!username_is_valid("has space"));
        assert!(!username_is_valid("tab\there"));
        assert!(!username_is_valid("caf\u{e9}"));
    }

    #[test]
    fn test_room_name_validation() {
        assert!(room_name_is_valid("r1"));
        assert!(room_name_is_valid("room with space"));
        assert!(room_name_is_valid("sixteen chars ok"));

        assert!(!room_name_is_valid(""));
        assert!(!room_name_is_valid("seventeen chars!!"));
        assert!(!room_name_is_valid("line\nbreak"));
    }

    #[test]
    fn test_identify_request_shape() {
        let request = IdentifyRequest::new("alice");
        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(json, r#"{"type":"IDENTIFY","username":"alice"}"#);
    }

    #[test]
    fn test_response_extra_is_omitted_when_absent() {
        let response = ResponseMessage::new("INVALID", "NOT_IDENTIFIED");
        let json = serde_json::to_string(&response).unwrap();
        assert_eq!(
            json,
            r#"{"type":"RESPONSE","operation":"INVALID","result":"NOT_IDENTIFIED"}"#
        );

        let response = ResponseMessage::new("IDENTIFY", "SUCCESS").with_extra("alice");
        let json = serde_json::to_string(&response).unwrap();
        assert_eq!(
            json,
            r#"{"type":"RESPONSE","operation":"IDENTIFY","result":"SUCCESS","extra":"alice"}"#
        );
    }

    #[test]
    fn test_newlines_are_escaped_in_marshaled_frames() {
        let message = TextFromMessage::new("alice", "line one\nline two");
        let json = serde_json::to_string(&message).unwrap();
        assert!(!json.contains('\n'));
        assert!(json.contains("\\n"));
    }

    #[test]
    fn test_user_list_roundtrip() {
        let mut users = HashMap::new();
        users.insert("alice".to_string(), Status::Active);
        users.insert("bob".to_string(), Status::Busy);

        let message = UserListMessage::new(users);
        let json = serde_json::to_string(&message).unwrap();
        let decoded: UserListMessage = serde_json::from_str(&json).unwrap();

        assert_eq!(decoded.users.len(), 2);
        assert_eq!(decoded.users.get("bob"), Some(&Status::Busy));
    }
}
