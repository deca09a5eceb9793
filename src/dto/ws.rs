//! Message shapes for the realtime push channel.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::dto::poll::ActivePollPayload;

/// A `reveal-answers` notification, kept around while the reveal is buffered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevealNotice {
    /// Code of the session whose results were released.
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

/// Messages pushed by the backend over the realtime channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerPush {
    /// A poll just went live for this session.
    #[serde(rename = "poll-activated")]
    PollActivated(ActivePollPayload),
    /// The teacher closed the current poll.
    #[serde(rename = "poll-deactivated")]
    PollDeactivated {
        /// Code of the session the poll belonged to.
        #[serde(rename = "sessionId")]
        session_id: String,
        /// Identifier of the poll being cleared.
        #[serde(rename = "pollId")]
        poll_id: Uuid,
    },
    /// The teacher released the results of the current poll.
    #[serde(rename = "reveal-answers")]
    RevealAnswers(RevealNotice),
    /// The participant roster changed; the client re-fetches it.
    #[serde(rename = "participant-count-updated")]
    ParticipantCountUpdated,
    /// Acknowledgement of a heartbeat frame.
    #[serde(rename = "heartbeat-ack")]
    HeartbeatAck,
    /// Catch-all for message kinds this client does not know.
    #[serde(other)]
    Unknown,
}

impl ServerPush {
    /// Parse a channel frame, validating poll payloads before they reach
    /// session state.
    pub fn from_json_str(raw: &str) -> Result<Self, PushParseError> {
        let push: Self = serde_json::from_str(raw)?;
        if let ServerPush::PollActivated(payload) = &push {
            payload.poll.validate()?;
        }
        Ok(push)
    }
}

/// Reasons a channel frame was rejected.
#[derive(Debug, Error)]
pub enum PushParseError {
    /// The frame was not valid JSON or did not match any known shape.
    #[error("malformed channel message")]
    Json(#[from] serde_json::Error),
    /// The frame decoded but carried an unusable poll.
    #[error("invalid poll payload")]
    InvalidPoll(#[from] ValidationErrors),
}

/// Messages the student client sends over the realtime channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StudentMessage {
    /// Announce which session and participant this connection belongs to.
    #[serde(rename = "join-session")]
    JoinSession {
        /// Code of the session being joined.
        #[serde(rename = "sessionId")]
        session_id: String,
        /// Identifier of the participant.
        #[serde(rename = "studentId")]
        student_id: Uuid,
    },
    /// Periodic liveness signal while connected.
    #[serde(rename = "heartbeat")]
    Heartbeat {
        /// Code of the joined session.
        #[serde(rename = "sessionId")]
        session_id: String,
        /// Identifier of the participant.
        #[serde(rename = "studentId")]
        student_id: Uuid,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_activated_parses_with_wire_fields() {
        let raw = r#"{
            "type": "poll-activated",
            "poll": {
                "id": "6f2c5be5-8f58-4d0a-b54f-2a6d87e9a1c4",
                "session_id": "ABC123",
                "question": "2 + 2?",
                "options": ["3", "4"],
                "correct_answer": 1,
                "time_limit": 30
            },
            "poll_end_time": 1700000030000,
            "server_time": 1700000000000
        }"#;
        let push = ServerPush::from_json_str(raw).unwrap();
        match push {
            ServerPush::PollActivated(payload) => {
                assert_eq!(payload.poll.options.len(), 2);
                assert_eq!(payload.poll_end_time, 1_700_000_030_000);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_poll_payload_is_rejected() {
        let raw = r#"{
            "type": "poll-activated",
            "poll": {
                "id": "6f2c5be5-8f58-4d0a-b54f-2a6d87e9a1c4",
                "session_id": "ABC123",
                "question": "2 + 2?",
                "options": ["4"],
                "correct_answer": 1,
                "time_limit": 30
            },
            "poll_end_time": 1700000030000,
            "server_time": 1700000000000
        }"#;
        assert!(matches!(
            ServerPush::from_json_str(raw),
            Err(PushParseError::InvalidPoll(_))
        ));
    }

    #[test]
    fn test_unknown_message_types_are_tolerated() {
        let push = ServerPush::from_json_str(r#"{"type":"poll-stats","count":3}"#).unwrap();
        assert!(matches!(push, ServerPush::Unknown));
    }

    #[test]
    fn test_reveal_carries_session_code() {
        let push =
            ServerPush::from_json_str(r#"{"type":"reveal-answers","sessionId":"abc123"}"#).unwrap();
        match push {
            ServerPush::RevealAnswers(notice) => assert_eq!(notice.session_id, "abc123"),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_join_message_uses_camel_case_identifiers() {
        let message = StudentMessage::JoinSession {
            session_id: "ABC123".into(),
            student_id: Uuid::nil(),
        };
        let raw = serde_json::to_value(&message).unwrap();
        assert_eq!(raw["type"], "join-session");
        assert!(raw.get("sessionId").is_some());
        assert!(raw.get("studentId").is_some());
    }
}
