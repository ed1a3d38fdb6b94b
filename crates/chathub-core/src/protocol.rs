//! Wire protocol: envelopes and the request taxonomy.
//!
//! Every frame on a session carries exactly one JSON [`Envelope`]:
//!
//! ```json
//! { "msgType": 1, "from": 0, "to": 17, "data": "hello" }
//! ```
//!
//! `from` is never trusted: [`Envelope::decode`] overwrites it with the
//! authenticated user before anything else looks at the envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::ids::{ChatId, UserId};

/// Sender id used on every server-originated reply.
pub const SERVER_ID: UserId = UserId::new(0);

/// Payload of a successful mutation reply.
pub const SUCCESS: &str = "Success";

/// The closed set of request kinds, numbered as on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MsgType {
    /// Fetch one message by id. Also used as the fan-out notification type.
    FetchMessage,
    /// Post a message to a chat.
    SendMessage,
    /// Edit the text of one's own message.
    UpdateMessage,
    /// Delete a message.
    DeleteMessage,
    /// List the recent messages of a chat.
    ListChatMessages,
    /// Create a chat owned by the sender.
    CreateChat,
    /// Rename a chat.
    UpdateChat,
    /// Delete a chat and everything in it.
    DeleteChat,
    /// Add a user to a chat.
    AddUserToChat,
    /// Remove a user from a chat.
    RemoveUserFromChat,
    /// List the member ids of a chat.
    ListChatMembers,
    /// List the chats the sender belongs to.
    ListUserChats,
}

impl MsgType {
    /// All variants in wire order.
    pub const ALL: [Self; 12] = [
        Self::FetchMessage,
        Self::SendMessage,
        Self::UpdateMessage,
        Self::DeleteMessage,
        Self::ListChatMessages,
        Self::CreateChat,
        Self::UpdateChat,
        Self::DeleteChat,
        Self::AddUserToChat,
        Self::RemoveUserFromChat,
        Self::ListChatMembers,
        Self::ListUserChats,
    ];

    /// Map a raw wire value to a known type.
    pub fn from_wire(raw: i64) -> Option<Self> {
        usize::try_from(raw)
            .ok()
            .and_then(|idx| Self::ALL.get(idx).copied())
    }

    /// The wire value of this type.
    pub fn as_wire(self) -> i64 {
        match self {
            Self::FetchMessage => 0,
            Self::SendMessage => 1,
            Self::UpdateMessage => 2,
            Self::DeleteMessage => 3,
            Self::ListChatMessages => 4,
            Self::CreateChat => 5,
            Self::UpdateChat => 6,
            Self::DeleteChat => 7,
            Self::AddUserToChat => 8,
            Self::RemoveUserFromChat => 9,
            Self::ListChatMembers => 10,
            Self::ListUserChats => 11,
        }
    }

    /// Stable name used in logs and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FetchMessage => "fetch-message",
            Self::SendMessage => "send-message",
            Self::UpdateMessage => "update-message",
            Self::DeleteMessage => "delete-message",
            Self::ListChatMessages => "list-chat-messages",
            Self::CreateChat => "create-chat",
            Self::UpdateChat => "update-chat",
            Self::DeleteChat => "delete-chat",
            Self::AddUserToChat => "add-user-to-chat",
            Self::RemoveUserFromChat => "remove-user-from-chat",
            Self::ListChatMembers => "list-chat-members",
            Self::ListUserChats => "list-user-chats",
        }
    }

    /// Whether a successful request of this type is broadcast to the chat.
    pub fn fans_out(self) -> bool {
        matches!(self, Self::SendMessage)
    }
}

impl std::fmt::Display for MsgType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque failure codes. The only error text that ever reaches a client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// The payload violated an input constraint.
    InvalidRequest,
    /// The sender may not perform this operation.
    Forbidden,
    /// The addressed chat, message or user does not exist.
    NotFound,
    /// Anything else, including unknown request types and storage failures.
    InternalError,
}

impl ErrorCode {
    /// The code as sent on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidRequest => "InvalidRequest",
            Self::Forbidden => "Forbidden",
            Self::NotFound => "NotFound",
            Self::InternalError => "InternalError",
        }
    }
}

/// A frame could not be decoded into an envelope.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame is not a JSON envelope.
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),
    /// Binary frame that is not valid UTF-8.
    #[error("frame is not valid UTF-8")]
    NotUtf8,
}

/// One request, response or notification.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Raw wire type. Kept raw so unknown values can be echoed back.
    pub msg_type: i64,
    /// Originating user. Server-assigned on inbound envelopes.
    #[serde(default)]
    pub from: UserId,
    /// Target id; a chat, message or user depending on `msg_type`.
    #[serde(default)]
    pub to: u64,
    /// Type-specific payload.
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// Build an envelope of a known type.
    pub fn new(msg_type: MsgType, from: UserId, to: u64, data: Value) -> Self {
        Self {
            msg_type: msg_type.as_wire(),
            from,
            to,
            data,
        }
    }

    /// Decode an inbound text frame on behalf of `sender`.
    ///
    /// Whatever `from` the client wrote is replaced with `sender`.
    pub fn decode(frame: &str, sender: UserId) -> Result<Self, ProtocolError> {
        let mut envelope: Self = serde_json::from_str(frame)?;
        envelope.from = sender;
        Ok(envelope)
    }

    /// Decode an inbound binary frame on behalf of `sender`.
    pub fn decode_bytes(frame: &[u8], sender: UserId) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(frame).map_err(|_| ProtocolError::NotUtf8)?;
        Self::decode(text, sender)
    }

    /// The request kind, if `msg_type` is one we know.
    pub fn kind(&self) -> Option<MsgType> {
        MsgType::from_wire(self.msg_type)
    }

    /// `to` read as a chat id.
    pub fn to_chat(&self) -> Option<ChatId> {
        (self.to != 0).then_some(ChatId::new(self.to))
    }

    /// Reply to `self` carrying `data`.
    ///
    /// Echoes the request's raw type, so unknown types are answered in kind.
    pub fn reply(&self, data: Value) -> Self {
        Self {
            msg_type: self.msg_type,
            from: SERVER_ID,
            to: self.from.get(),
            data,
        }
    }

    /// Reply to `self` with an opaque error code.
    pub fn error_reply(&self, code: ErrorCode) -> Self {
        self.reply(Value::String(code.as_str().to_owned()))
    }

    /// Notification pushed to other chat members after a message is posted.
    pub fn new_message_notification(sender: UserId, chat: ChatId, message: Value) -> Self {
        Self::new(MsgType::FetchMessage, sender, chat.get(), message)
    }

    /// Serialize to a text frame.
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn wire_values_round_trip_for_every_type() {
        for (idx, ty) in MsgType::ALL.iter().enumerate() {
            assert_eq!(ty.as_wire(), idx as i64);
            assert_eq!(MsgType::from_wire(idx as i64), Some(*ty));
        }
    }

    #[test]
    fn unknown_wire_values_map_to_none() {
        assert_eq!(MsgType::from_wire(12), None);
        assert_eq!(MsgType::from_wire(-1), None);
        assert_eq!(MsgType::from_wire(i64::MAX), None);
    }

    #[test]
    fn only_send_message_fans_out() {
        let fanning: Vec<_> = MsgType::ALL.iter().filter(|t| t.fans_out()).collect();
        assert_eq!(fanning, vec![&MsgType::SendMessage]);
    }

    #[test]
    fn names_are_kebab_case_and_unique() {
        let mut names: Vec<_> = MsgType::ALL.iter().map(|t| t.as_str()).collect();
        for name in &names {
            assert!(name.chars().all(|c| c.is_ascii_lowercase() || c == '-'), "{name}");
        }
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 12);
    }

    #[test]
    fn decode_overwrites_forged_sender() {
        let frame = r#"{"msgType":1,"from":999,"to":5,"data":"hi"}"#;
        let env = Envelope::decode(frame, UserId::new(42)).unwrap();
        assert_eq!(env.from, UserId::new(42));
        assert_eq!(env.kind(), Some(MsgType::SendMessage));
        assert_eq!(env.to, 5);
        assert_eq!(env.data, json!("hi"));
    }

    #[test]
    fn decode_fills_missing_fields() {
        let env = Envelope::decode(r#"{"msgType":11}"#, UserId::new(3)).unwrap();
        assert_eq!(env.from, UserId::new(3));
        assert_eq!(env.to, 0);
        assert!(env.data.is_null());
        assert_eq!(env.to_chat(), None);
    }

    #[test]
    fn decode_keeps_unknown_type_raw() {
        let env = Envelope::decode(r#"{"msgType":77,"to":1}"#, UserId::new(3)).unwrap();
        assert_eq!(env.msg_type, 77);
        assert_eq!(env.kind(), None);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert_matches!(
            Envelope::decode("not json", UserId::new(1)),
            Err(ProtocolError::Malformed(_))
        );
        assert_matches!(
            Envelope::decode(r#"{"to":1}"#, UserId::new(1)),
            Err(ProtocolError::Malformed(_))
        );
        assert_matches!(
            Envelope::decode(r#"{"msgType":"one"}"#, UserId::new(1)),
            Err(ProtocolError::Malformed(_))
        );
    }

    #[test]
    fn decode_bytes_rejects_invalid_utf8() {
        assert_matches!(
            Envelope::decode_bytes(&[0xff, 0xfe], UserId::new(1)),
            Err(ProtocolError::NotUtf8)
        );
        let env = Envelope::decode_bytes(br#"{"msgType":0,"to":4}"#, UserId::new(1)).unwrap();
        assert_eq!(env.kind(), Some(MsgType::FetchMessage));
    }

    #[test]
    fn reply_addresses_requester_from_server() {
        let req = Envelope::new(MsgType::CreateChat, UserId::new(8), 0, json!("room"));
        let resp = req.reply(json!(SUCCESS));
        assert_eq!(resp.msg_type, MsgType::CreateChat.as_wire());
        assert_eq!(resp.from, SERVER_ID);
        assert_eq!(resp.to, 8);
        assert_eq!(resp.data, json!("Success"));
    }

    #[test]
    fn error_reply_carries_only_the_code() {
        let req = Envelope {
            msg_type: 40,
            from: UserId::new(2),
            to: 0,
            data: Value::Null,
        };
        let resp = req.error_reply(ErrorCode::InternalError);
        assert_eq!(resp.msg_type, 40);
        assert_eq!(resp.to, 2);
        assert_eq!(resp.data, json!("InternalError"));
    }

    #[test]
    fn notification_shape() {
        let n = Envelope::new_message_notification(UserId::new(1), ChatId::new(9), json!({"id": 3}));
        let wire: Value = serde_json::from_str(&n.to_frame().unwrap()).unwrap();
        assert_eq!(wire, json!({"msgType": 0, "from": 1, "to": 9, "data": {"id": 3}}));
    }

    #[test]
    fn error_code_strings_match_serde() {
        for code in [
            ErrorCode::InvalidRequest,
            ErrorCode::Forbidden,
            ErrorCode::NotFound,
            ErrorCode::InternalError,
        ] {
            assert_eq!(serde_json::to_value(code).unwrap(), json!(code.as_str()));
        }
    }
}
