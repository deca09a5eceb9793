use std::fmt;

use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::SessionError;

/// Poll and session payloads exchanged with the REST API.
pub mod poll;
/// Messages exchanged over the realtime push channel.
pub mod ws;

/// Milliseconds since the Unix epoch, as carried on the wire.
pub type EpochMillis = i64;

/// Render an epoch-millisecond timestamp for log output.
pub(crate) fn format_epoch_millis(millis: EpochMillis) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
        .ok()
        .and_then(|moment| moment.format(&Rfc3339).ok())
        .unwrap_or_else(|| "invalid-timestamp".into())
}

/// Human-typed join code identifying a session.
///
/// The backend treats codes case-insensitively, so comparisons go through
/// [`SessionCode::matches`] rather than plain equality. The typed form is kept
/// as-is for display and wire use.
#[derive(Debug, Clone)]
pub struct SessionCode(String);

impl SessionCode {
    /// Validate and wrap a join code.
    ///
    /// Codes arriving from URL parsing sometimes carry a literal `"undefined"`
    /// or `"null"`; both are treated as missing.
    pub fn parse(raw: &str) -> Result<Self, SessionError> {
        let trimmed = raw.trim();
        if trimmed.is_empty()
            || trimmed.eq_ignore_ascii_case("undefined")
            || trimmed.eq_ignore_ascii_case("null")
        {
            return Err(SessionError::InvalidSessionCode(raw.to_string()));
        }
        if !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(SessionError::InvalidSessionCode(raw.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// The code exactly as the student typed it.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive comparison against a code received from the backend.
    pub fn matches(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other.trim())
    }
}

impl fmt::Display for SessionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_alphanumeric_codes() {
        let code = SessionCode::parse(" abc123 ").unwrap();
        assert_eq!(code.as_str(), "abc123");
    }

    #[test]
    fn parse_rejects_missing_or_malformed_codes() {
        assert!(SessionCode::parse("").is_err());
        assert!(SessionCode::parse("   ").is_err());
        assert!(SessionCode::parse("undefined").is_err());
        assert!(SessionCode::parse("null").is_err());
        assert!(SessionCode::parse("abc-123").is_err());
    }

    #[test]
    fn matches_ignores_case_on_both_sides() {
        let code = SessionCode::parse("AbC123").unwrap();
        assert!(code.matches("ABC123"));
        assert!(code.matches("abc123"));
        assert!(code.matches(" aBc123 "));
        assert!(!code.matches("abc124"));
    }

    #[test]
    fn epoch_millis_render_as_rfc3339() {
        assert_eq!(format_epoch_millis(0), "1970-01-01T00:00:00Z");
    }
}
