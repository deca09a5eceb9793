//! Local profile storage: the student identity, credentials, and join
//! history kept between runs, one JSON file per key.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{dto, session::clock};

/// Storage keys, shared with the other platform clients.
pub mod keys {
    /// The signed-in student profile.
    pub const CURRENT_USER: &str = "currentUser";
    /// Bearer token attached to REST calls.
    pub const AUTH_TOKEN: &str = "authToken";
    /// Recently joined sessions, most recent first.
    pub const JOINED_SESSIONS: &str = "joinedSessions";
}

/// Number of sessions kept in the join history.
const JOIN_HISTORY_LIMIT: usize = 10;

/// The student identity stored under [`keys::CURRENT_USER`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentProfile {
    /// Stable identifier used on every wire interaction.
    pub id: Uuid,
    /// Display name, when the student set one.
    #[serde(default)]
    pub name: Option<String>,
}

/// One entry of the join history under [`keys::JOINED_SESSIONS`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinedSession {
    /// Join code of the session.
    #[serde(rename = "sessionId")]
    pub session_id: String,
    /// Session title at join time.
    pub title: String,
    /// Course the session belonged to.
    #[serde(default)]
    pub course_name: Option<String>,
    /// RFC 3339 timestamp of the join.
    #[serde(rename = "joinedAt")]
    pub joined_at: String,
}

impl JoinedSession {
    /// Build a history entry stamped with the current time.
    pub fn now(
        session_id: impl Into<String>,
        title: impl Into<String>,
        course_name: Option<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            title: title.into(),
            course_name,
            joined_at: dto::format_epoch_millis(clock::local_now()),
        }
    }
}

/// Failures while reading or writing the profile files.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading a profile file failed for a reason other than absence.
    #[error("failed to read {path}")]
    Read {
        /// Path of the offending file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Writing a profile file failed.
    #[error("failed to write {path}")]
    Write {
        /// Path of the offending file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// A profile file exists but does not parse.
    #[error("failed to decode {path}")]
    Decode {
        /// Path of the offending file.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
    /// Serializing a value for storage failed.
    #[error("failed to encode profile data")]
    Encode(#[source] serde_json::Error),
}

/// Local persistence for the student's identity and join history.
pub trait ProfileStore: Send + Sync {
    /// The stored profile, if one exists.
    fn load_profile(&self) -> Result<Option<StudentProfile>, StoreError>;
    /// Persist `profile` as the current identity.
    fn save_profile(&self, profile: &StudentProfile) -> Result<(), StoreError>;
    /// The stored bearer token, if one exists.
    fn auth_token(&self) -> Result<Option<String>, StoreError>;
    /// The join history, most recent first.
    fn joined_sessions(&self) -> Result<Vec<JoinedSession>, StoreError>;
    /// Replace the join history.
    fn save_joined_sessions(&self, sessions: &[JoinedSession]) -> Result<(), StoreError>;
}

/// Load the stored profile, or create and persist a fresh identity.
pub fn load_or_create_profile(store: &dyn ProfileStore) -> Result<StudentProfile, StoreError> {
    if let Some(profile) = store.load_profile()? {
        return Ok(profile);
    }
    let profile = StudentProfile {
        id: Uuid::new_v4(),
        name: None,
    };
    store.save_profile(&profile)?;
    Ok(profile)
}

/// Put `entry` at the head of the join history, dropping any older entry for
/// the same session and keeping at most [`JOIN_HISTORY_LIMIT`] sessions.
pub fn remember_joined_session(
    store: &dyn ProfileStore,
    entry: JoinedSession,
) -> Result<(), StoreError> {
    let mut sessions = store.joined_sessions()?;
    sessions.retain(|session| !session.session_id.eq_ignore_ascii_case(&entry.session_id));
    sessions.insert(0, entry);
    sessions.truncate(JOIN_HISTORY_LIMIT);
    store.save_joined_sessions(&sessions)
}

/// File-backed store keeping one JSON document per key in a directory.
#[derive(Debug, Clone)]
pub struct FileProfileStore {
    root: PathBuf,
}

impl FileProfileStore {
    /// A store rooted at `root`. The directory is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }

    fn read<T>(&self, key: &str) -> Result<Option<T>, StoreError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let path = self.path(key);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(StoreError::Read { path, source: err }),
        };
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|err| StoreError::Decode { path, source: err })
    }

    fn write<T>(&self, key: &str, value: &T) -> Result<(), StoreError>
    where
        T: Serialize,
    {
        let json = serde_json::to_string_pretty(value).map_err(StoreError::Encode)?;
        fs::create_dir_all(&self.root).map_err(|err| StoreError::Write {
            path: self.root.clone(),
            source: err,
        })?;
        let path = self.path(key);
        fs::write(&path, json).map_err(|err| StoreError::Write { path, source: err })
    }
}

impl ProfileStore for FileProfileStore {
    fn load_profile(&self) -> Result<Option<StudentProfile>, StoreError> {
        self.read(keys::CURRENT_USER)
    }

    fn save_profile(&self, profile: &StudentProfile) -> Result<(), StoreError> {
        self.write(keys::CURRENT_USER, profile)
    }

    fn auth_token(&self) -> Result<Option<String>, StoreError> {
        self.read(keys::AUTH_TOKEN)
    }

    fn joined_sessions(&self) -> Result<Vec<JoinedSession>, StoreError> {
        Ok(self.read(keys::JOINED_SESSIONS)?.unwrap_or_default())
    }

    fn save_joined_sessions(&self, sessions: &[JoinedSession]) -> Result<(), StoreError> {
        self.write(keys::JOINED_SESSIONS, &sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, FileProfileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileProfileStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn missing_files_read_as_empty() {
        let (_dir, store) = store();
        assert!(store.load_profile().unwrap().is_none());
        assert!(store.auth_token().unwrap().is_none());
        assert!(store.joined_sessions().unwrap().is_empty());
    }

    #[test]
    fn profile_is_created_once_and_reloaded() {
        let (_dir, store) = store();
        let first = load_or_create_profile(&store).unwrap();
        let second = load_or_create_profile(&store).unwrap();
        assert_eq!(first, second);
        assert!(store.path(keys::CURRENT_USER).exists());
    }

    #[test]
    fn auth_token_reads_a_stored_string() {
        let (_dir, store) = store();
        fs::create_dir_all(store.root.as_path()).unwrap();
        fs::write(store.path(keys::AUTH_TOKEN), "\"tok-123\"").unwrap();
        assert_eq!(store.auth_token().unwrap().as_deref(), Some("tok-123"));
    }

    #[test]
    fn join_history_dedups_and_caps() {
        let (_dir, store) = store();
        for n in 0..11 {
            remember_joined_session(
                &store,
                JoinedSession::now(format!("CODE{n:02}"), format!("Session {n}"), None),
            )
            .unwrap();
        }
        // Rejoining an old session moves it to the front instead of
        // duplicating it.
        remember_joined_session(
            &store,
            JoinedSession::now("code05", "Session 5 again", None),
        )
        .unwrap();

        let sessions = store.joined_sessions().unwrap();
        assert_eq!(sessions.len(), JOIN_HISTORY_LIMIT);
        assert_eq!(sessions[0].session_id, "code05");
        assert_eq!(
            sessions
                .iter()
                .filter(|s| s.session_id.eq_ignore_ascii_case("code05"))
                .count(),
            1
        );
    }

    #[test]
    fn corrupt_files_surface_decode_errors() {
        let (_dir, store) = store();
        fs::create_dir_all(store.root.as_path()).unwrap();
        fs::write(store.path(keys::CURRENT_USER), "not json").unwrap();
        assert!(matches!(
            store.load_profile(),
            Err(StoreError::Decode { .. })
        ));
    }

    #[test]
    fn history_entries_keep_their_wire_field_names() {
        let entry = JoinedSession::now("ABC123", "Networking 101", Some("CS101".into()));
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"sessionId\""));
        assert!(json.contains("\"joinedAt\""));
        assert!(json.contains("\"course_name\""));
    }
}
