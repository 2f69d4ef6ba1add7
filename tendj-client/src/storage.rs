//! Key-value persistence for the active conversation and bearer token.

use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

use shared::models::{ConversationId, ConversationRef, TaskId, meaningful_value};
use thiserror::Error;
use tracing::debug;

/// Key suffix of the active conversation id.
pub const CHAT_ID_KEY: &str = "chatId";
/// Key suffix of the active task id.
pub const TASK_ID_KEY: &str = "taskId";
/// Key suffix of the stored bearer token.
pub const AUTH_TOKEN_KEY: &str = "authToken";

/// Failures reading or writing session state.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The state file could not be read or written.
    #[error("failed to access session state at {path}: {source}")]
    Io {
        /// State file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The state file holds something other than a JSON object of strings.
    #[error("session state at {path} is not a JSON object: {source}")]
    Corrupt {
        /// State file.
        path: PathBuf,
        /// Parse error.
        #[source]
        source: serde_json::Error,
    },
    /// The state could not be serialized.
    #[error("failed to encode session state: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Opaque string store with get/set/remove.
pub trait KeyValueStore {
    /// Value stored under `key`.
    ///
    /// # Errors
    /// Fails when the backing store cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    /// Stores `value` under `key`.
    ///
    /// # Errors
    /// Fails when the backing store cannot be written.
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
    /// Deletes `key`; absent keys are not an error.
    ///
    /// # Errors
    /// Fails when the backing store cannot be written.
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;
}

/// Process-local store, used in tests and for throwaway sessions.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: BTreeMap<String, String>,
}

impl MemoryStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.values.remove(key);
        Ok(())
    }
}

/// A flat JSON object on disk, rewritten on every change.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// A store backed by `path`; the file is created on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, StorageError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(source) => {
                return Err(StorageError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&contents).map_err(|source| StorageError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    fn write_all(&self, values: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let io_error = |source| StorageError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        let body = serde_json::to_string_pretty(values)?;
        fs::write(&self.path, body).map_err(io_error)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600)).map_err(io_error)?;
        }
        debug!(path = %self.path.display(), keys = values.len(), "session state written");
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut values = self.read_all()?;
        values.insert(key.to_string(), value.to_string());
        self.write_all(&values)
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        let mut values = self.read_all()?;
        if values.remove(key).is_some() {
            self.write_all(&values)?;
        }
        Ok(())
    }
}

/// Everything persisted between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    /// Active conversation and task.
    pub conversation: ConversationRef,
    /// Token saved by `login`.
    pub auth_token: Option<String>,
}

/// Typed view over a [`KeyValueStore`] using `<prefix>-<key>` names.
#[derive(Debug)]
pub struct SessionStore<S> {
    store: S,
    prefix: String,
}

impl<S: KeyValueStore> SessionStore<S> {
    /// Wraps `store`, naming keys `<prefix>-<key>`.
    pub fn new(store: S, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    /// Underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Full key for `name`.
    pub fn key(&self, name: &str) -> String {
        format!("{}-{name}", self.prefix)
    }

    fn read(&self, name: &str) -> Result<Option<String>, StorageError> {
        let value = self.store.get(&self.key(name))?;
        Ok(value
            .as_deref()
            .and_then(meaningful_value)
            .map(ToString::to_string))
    }

    fn write(&mut self, name: &str, value: Option<&str>) -> Result<(), StorageError> {
        let key = self.key(name);
        match value {
            Some(value) => self.store.set(&key, value),
            None => self.store.remove(&key),
        }
    }

    /// The stored conversation; placeholder values read as absent.
    ///
    /// # Errors
    /// Propagates store failures.
    pub fn conversation(&self) -> Result<ConversationRef, StorageError> {
        Ok(ConversationRef::new(
            self.read(CHAT_ID_KEY)?.map(ConversationId::from),
            self.read(TASK_ID_KEY)?.map(TaskId::from),
        ))
    }

    /// Persists `conversation`; absent ids remove their keys.
    ///
    /// # Errors
    /// Propagates store failures.
    pub fn save_conversation(&mut self, conversation: &ConversationRef) -> Result<(), StorageError> {
        self.write(
            CHAT_ID_KEY,
            conversation.conversation_id.as_ref().map(ConversationId::as_str),
        )?;
        self.write(
            TASK_ID_KEY,
            conversation.task_id.as_ref().map(TaskId::as_str),
        )
    }

    /// Removes both conversation keys.
    ///
    /// # Errors
    /// Propagates store failures.
    pub fn clear_conversation(&mut self) -> Result<(), StorageError> {
        self.write(CHAT_ID_KEY, None)?;
        self.write(TASK_ID_KEY, None)
    }

    /// Stored bearer token.
    ///
    /// # Errors
    /// Propagates store failures.
    pub fn auth_token(&self) -> Result<Option<String>, StorageError> {
        self.read(AUTH_TOKEN_KEY)
    }

    /// Saves `token`; a blank token removes the key.
    ///
    /// # Errors
    /// Propagates store failures.
    pub fn set_auth_token(&mut self, token: &str) -> Result<(), StorageError> {
        self.write(AUTH_TOKEN_KEY, meaningful_value(token))
    }

    /// Removes the stored token.
    ///
    /// # Errors
    /// Propagates store failures.
    pub fn clear_auth_token(&mut self) -> Result<(), StorageError> {
        self.write(AUTH_TOKEN_KEY, None)
    }

    /// Everything persisted, in one read.
    ///
    /// # Errors
    /// Propagates store failures.
    pub fn load(&self) -> Result<Session, StorageError> {
        Ok(Session {
            conversation: self.conversation()?,
            auth_token: self.auth_token()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn placeholder_values_read_back_as_absent() {
        let mut store = MemoryStore::new();
        store.set("10dj-chatId", "undefined").unwrap();
        store.set("10dj-taskId", "null").unwrap();
        store.set("10dj-authToken", "").unwrap();

        let session = SessionStore::new(store, "10dj").load().unwrap();
        assert_eq!(session, Session::default());
    }

    #[test]
    fn conversation_round_trips_and_clears() {
        let mut session = SessionStore::new(MemoryStore::new(), "10dj");
        let conversation = ConversationRef::new(
            Some(ConversationId::new("c1")),
            Some(TaskId::new("t1")),
        );

        session.save_conversation(&conversation).unwrap();
        assert_eq!(
            session.store().get("10dj-chatId").unwrap().as_deref(),
            Some("c1")
        );
        assert_eq!(session.conversation().unwrap(), conversation);

        session
            .save_conversation(&ConversationRef::new(Some(ConversationId::new("c2")), None))
            .unwrap();
        assert_eq!(session.store().get("10dj-taskId").unwrap(), None);

        session.clear_conversation().unwrap();
        assert!(session.conversation().unwrap().is_new());
    }

    #[test]
    fn file_store_persists_between_instances() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("session.json");

        let mut session = SessionStore::new(FileStore::new(&path), "tendj");
        session.set_auth_token("secret").unwrap();
        session
            .save_conversation(&ConversationRef::new(Some(ConversationId::new("42")), None))
            .unwrap();

        let reopened = SessionStore::new(FileStore::new(&path), "tendj")
            .load()
            .unwrap();
        assert_eq!(reopened.auth_token.as_deref(), Some("secret"));
        assert_eq!(
            reopened.conversation.conversation_id,
            Some(ConversationId::new("42"))
        );

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn file_store_rejects_corrupt_state() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "[1, 2]").unwrap();

        let err = FileStore::new(&path).get("anything").unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { .. }));
    }

    #[test]
    fn missing_file_reads_empty() {
        let dir = TempDir::new().unwrap();
        let mut store = FileStore::new(dir.path().join("absent.json"));
        assert_eq!(store.get("k").unwrap(), None);
        store.remove("k").unwrap();
        assert!(!store.path().exists());
    }
}
