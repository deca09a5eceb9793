use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::dto::EpochMillis;

/// Immutable description of a multiple-choice poll, as activated by the teacher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollSnapshot {
    /// Stable identifier of the poll.
    pub id: Uuid,
    /// Code of the session this poll belongs to.
    pub session_id: String,
    /// Question text shown to students.
    pub question: String,
    /// Ordered answer options.
    pub options: Vec<String>,
    /// Zero-based index of the correct option.
    pub correct_answer: usize,
    /// Optional explanation revealed together with the answer.
    #[serde(default)]
    pub justification: Option<String>,
    /// Seconds students have to answer once the poll goes live.
    pub time_limit: u64,
}

impl Validate for PollSnapshot {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.question.trim().is_empty() {
            errors.add("question", violation("question_empty", "Question is empty"));
        }
        if self.options.len() < 2 {
            errors.add(
                "options",
                violation("options_count", "A poll needs at least two options"),
            );
        }
        if self.correct_answer >= self.options.len() {
            errors.add(
                "correct_answer",
                violation(
                    "correct_answer_range",
                    "Correct answer index is out of range",
                ),
            );
        }
        if self.time_limit == 0 {
            errors.add(
                "time_limit",
                violation("time_limit_zero", "Time limit must be at least one second"),
            );
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

fn violation(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

/// Activation payload shared by the push channel and the recovery endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivePollPayload {
    /// The poll going live.
    pub poll: PollSnapshot,
    /// Absolute answer deadline on the server clock.
    pub poll_end_time: EpochMillis,
    /// Server clock at the moment the payload was produced.
    pub server_time: EpochMillis,
}

/// Body of the answer submission request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionRequest {
    /// Zero-based index of the chosen option.
    pub selected_option: usize,
    /// Seconds the student took to answer.
    pub response_time: u64,
}

/// Backend verdict for a submitted answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionReply {
    /// Whether the selected option was the correct one.
    pub is_correct: bool,
}

/// Metadata describing a session, fetched when joining.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Join code of the session.
    pub id: String,
    /// Title shown in the session header.
    pub title: String,
    /// Course the session belongs to, when set.
    #[serde(default)]
    pub course_name: Option<String>,
    /// Display name of the teacher running the session.
    #[serde(default)]
    pub teacher_name: Option<String>,
}

/// One entry of the session participant roster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    /// Stable identifier of the participant.
    pub id: Uuid,
    /// Display name, when the participant shared one.
    #[serde(default)]
    pub name: Option<String>,
    /// Whether the participant currently counts as online.
    #[serde(default)]
    pub is_active: bool,
}
