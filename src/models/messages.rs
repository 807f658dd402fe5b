use serde::{Deserialize, Serialize};
use crate::models::{Language, Participant};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomMessage {
    #[serde(alias = "roomId")]
    pub session_id: String,
    #[serde(alias = "username")]
    pub display_name: String,
    #[serde(default)]
    pub is_admin: bool,
    /// Buffer the client already holds, used to seed a room created by this join
    #[serde(default, alias = "currentCode")]
    pub current_buffer: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CodeChangeMessage {
    #[serde(alias = "roomId")]
    pub session_id: String,
    #[serde(alias = "code")]
    pub buffer: String,
    #[serde(alias = "senderName")]
    pub proposer_name: String,
    #[serde(default, alias = "revision")]
    pub revision_stamp: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LanguageChangeMessage {
    #[serde(alias = "roomId")]
    pub session_id: String,
    pub language: Language,
    #[serde(alias = "senderName")]
    pub proposer_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_stamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LeaveRoomMessage {
    #[serde(alias = "roomId")]
    pub session_id: String,
    #[serde(default, alias = "username")]
    pub display_name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(alias = "roomId")]
    pub session_id: String,
    pub sender: String,
    pub text: String,
    #[serde(default)]
    pub time: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TypingMessage {
    #[serde(alias = "roomId")]
    pub session_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomStateMessage {
    pub session_id: String,
    pub buffer: String,
    pub language: Language,
    pub revision_stamp: i64,
    pub participants: Vec<Participant>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantJoinedMessage {
    pub participant: Participant,
    pub participants: Vec<Participant>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantLeftMessage {
    pub connection_id: String,
    pub participants: Vec<Participant>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserTypingMessage {
    pub display_name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EditRejectedMessage {
    pub session_id: String,
    pub proposed_stamp: i64,
    pub revision_stamp: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMessage {
    pub code: String,
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PongMessage {
    pub date: String,
}

/// Frames a client may send
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "join_room")]
    JoinRoom(JoinRoomMessage),
    #[serde(rename = "code_change")]
    CodeChange(CodeChangeMessage),
    #[serde(rename = "language_change")]
    LanguageChange(LanguageChangeMessage),
    #[serde(rename = "leave_room")]
    LeaveRoom(LeaveRoomMessage),
    #[serde(rename = "chat_message")]
    ChatMessage(ChatMessage),
    #[serde(rename = "typing")]
    Typing(TypingMessage),
    #[serde(rename = "ping")]
    Ping,
}

impl ClientMessage {
    /// Session the frame is addressed to, if it names one
    pub fn session_id(&self) -> Option<&str> {
        match self {
            ClientMessage::JoinRoom(m) => Some(&m.session_id),
            ClientMessage::CodeChange(m) => Some(&m.session_id),
            ClientMessage::LanguageChange(m) => Some(&m.session_id),
            ClientMessage::LeaveRoom(m) => Some(&m.session_id),
            ClientMessage::ChatMessage(m) => Some(&m.session_id),
            ClientMessage::Typing(m) => Some(&m.session_id),
            ClientMessage::Ping => None,
        }
    }
}

/// Frames the server sends
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "room_state")]
    RoomState(RoomStateMessage),
    #[serde(rename = "code_change")]
    CodeChange(CodeChangeMessage),
    #[serde(rename = "language_change")]
    LanguageChange(LanguageChangeMessage),
    #[serde(rename = "participant_joined")]
    ParticipantJoined(ParticipantJoinedMessage),
    #[serde(rename = "participant_left")]
    ParticipantLeft(ParticipantLeftMessage),
    #[serde(rename = "chat_message")]
    ChatMessage(ChatMessage),
    #[serde(rename = "user_typing")]
    UserTyping(UserTypingMessage),
    #[serde(rename = "edit_rejected")]
    EditRejected(EditRejectedMessage),
    #[serde(rename = "error")]
    Error(ErrorMessage),
    #[serde(rename = "pong")]
    Pong(PongMessage),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_accepts_legacy_field_names() {
        let raw = r#"{"type":"join_room","roomId":"r1","username":"ada","isAdmin":true,"currentCode":"x"}"#;
        let msg: ClientMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(
            msg,
            ClientMessage::JoinRoom(JoinRoomMessage {
                session_id: "r1".to_string(),
                display_name: "ada".to_string(),
                is_admin: true,
                current_buffer: Some("x".to_string()),
            })
        );
        assert_eq!(msg.session_id(), Some("r1"));
    }

    #[test]
    fn ping_is_a_bare_tag() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Ping);
        assert_eq!(msg.session_id(), None);
    }

    #[test]
    fn unknown_language_is_rejected() {
        let raw = r#"{"type":"language_change","sessionId":"r1","language":"cobol","proposerName":"ada"}"#;
        assert!(serde_json::from_str::<ClientMessage>(raw).is_err());
    }

    #[test]
    fn room_state_serializes_camel_case_with_tag() {
        let msg = ServerMessage::RoomState(RoomStateMessage {
            session_id: "r1".to_string(),
            buffer: "x=1".to_string(),
            language: Language::Python,
            revision_stamp: 1000,
            participants: Vec::new(),
        });
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "room_state");
        assert_eq!(value["revisionStamp"], 1000);
        assert_eq!(value["language"], "python");
    }
}
