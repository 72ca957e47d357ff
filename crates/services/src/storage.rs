//! Durable `chat-storage` record: the message history and session id.
//!
//! Nothing else about the conversation survives a restart.

use serde::{Deserialize, Serialize};
use shared::chat_api::ChatMessage;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const STORAGE_KEY: &str = "chat-storage";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedChat {
    pub messages: Vec<ChatMessage>,
    pub session_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PersistedChatRef<'a> {
    messages: &'a [ChatMessage],
    session_id: &'a str,
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Chat storage I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("Stored chat is unreadable: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("No config directory available for chat storage")]
    NoConfigDir,
}

#[derive(Debug, Clone)]
pub struct ChatStorage {
    path: PathBuf,
}

impl ChatStorage {
    /// Storage file `chat-storage.json` inside `dir`.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(format!("{}.json", STORAGE_KEY)),
        }
    }

    /// The per-user config directory.
    pub fn default_location() -> Result<Self, StorageError> {
        shared::settings::config_dir()
            .map(Self::new)
            .ok_or(StorageError::NoConfigDir)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` when nothing has been stored yet.
    pub fn load(&self) -> Result<Option<PersistedChat>, StorageError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Replace the stored record. Written to a sibling temp file first, then renamed.
    pub fn save(&self, messages: &[ChatMessage], session_id: &str) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(&PersistedChatRef {
            messages,
            session_id,
        })?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Move an unreadable record aside to `chat-storage.json.corrupt` so it can be recovered by hand.
    pub fn quarantine(&self) -> Result<PathBuf, StorageError> {
        let aside = self.path.with_extension("json.corrupt");
        fs::rename(&self.path, &aside)?;
        Ok(aside)
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::chat_api::Role;
    use tempfile::TempDir;

    fn message(id: &str, role: Role, content: &str) -> ChatMessage {
        ChatMessage {
            id: id.into(),
            role,
            content: content.into(),
            timestamp: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_load_missing_is_none() {
        let dir = TempDir::new().unwrap();
        let storage = ChatStorage::new(dir.path());
        assert!(storage.load().unwrap().is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let storage = ChatStorage::new(dir.path().join("nested"));
        let messages = vec![
            message("1", Role::User, "hello"),
            message("2", Role::Assistant, "hi there"),
        ];

        storage.save(&messages, "session-a").unwrap();
        let loaded = storage.load().unwrap().unwrap();
        assert_eq!(loaded.messages, messages);
        assert_eq!(loaded.session_id, "session-a");
        assert!(!storage.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn test_record_shape() {
        let dir = TempDir::new().unwrap();
        let storage = ChatStorage::new(dir.path());
        storage
            .save(&[message("1", Role::User, "hello")], "session-a")
            .unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&fs::read(storage.path()).unwrap()).unwrap();
        let keys: Vec<_> = raw.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys.len(), 2);
        assert_eq!(raw["sessionId"], "session-a");
        assert_eq!(raw["messages"][0]["role"], "user");
    }

    #[test]
    fn test_corrupt_record() {
        let dir = TempDir::new().unwrap();
        let storage = ChatStorage::new(dir.path());
        fs::write(storage.path(), b"{not json").unwrap();
        assert!(matches!(storage.load(), Err(StorageError::Corrupt(_))));
    }

    #[test]
    fn test_default_location_shares_settings_dir() {
        match shared::settings::config_dir() {
            Some(dir) => assert_eq!(
                ChatStorage::default_location().unwrap().path(),
                dir.join("chat-storage.json")
            ),
            None => assert!(matches!(
                ChatStorage::default_location(),
                Err(StorageError::NoConfigDir)
            )),
        }
    }

    #[test]
    fn test_quarantine_keeps_bad_record() {
        let dir = TempDir::new().unwrap();
        let storage = ChatStorage::new(dir.path());
        fs::write(storage.path(), b"{not json").unwrap();

        let aside = storage.quarantine().unwrap();
        assert_eq!(aside, dir.path().join("chat-storage.json.corrupt"));
        assert_eq!(fs::read(&aside).unwrap(), b"{not json");
        assert!(storage.load().unwrap().is_none());
    }

    #[test]
    fn test_clear() {
        let dir = TempDir::new().unwrap();
        let storage = ChatStorage::new(dir.path());
        storage.save(&[], "s").unwrap();
        storage.clear().unwrap();
        assert!(storage.load().unwrap().is_none());
        storage.clear().unwrap();
    }
}
