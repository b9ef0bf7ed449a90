//! Token Persistence
//!
//! Durable backends for the single session's token set.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};

use crate::error::{OAuth2Error, StorageError};
use crate::types::TokenSet;

/// Default token file name.
pub const TOKEN_FILE: &str = "session-tokens.json";

/// Persistence backend interface.
///
/// Holds at most one token set. `load` on an empty backend is `Ok(None)`.
#[async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Write the token set, replacing any previous one.
    async fn store(&self, tokens: &TokenSet) -> Result<(), OAuth2Error>;

    /// Read the persisted token set.
    async fn load(&self) -> Result<Option<TokenSet>, OAuth2Error>;

    /// Erase the persisted token set.
    async fn clear(&self) -> Result<(), OAuth2Error>;
}

/// In-memory backend.
#[derive(Default)]
pub struct InMemoryPersistence {
    tokens: Mutex<Option<TokenSet>>,
}

impl InMemoryPersistence {
    /// Create new in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PersistenceBackend for InMemoryPersistence {
    async fn store(&self, tokens: &TokenSet) -> Result<(), OAuth2Error> {
        *self.tokens.lock() = Some(tokens.clone());
        Ok(())
    }

    async fn load(&self) -> Result<Option<TokenSet>, OAuth2Error> {
        Ok(self.tokens.lock().clone())
    }

    async fn clear(&self) -> Result<(), OAuth2Error> {
        *self.tokens.lock() = None;
        Ok(())
    }
}

/// JSON file backend.
///
/// Writes go to a sibling temp file first and are renamed into place, so a
/// crash mid-write never leaves a truncated token file behind.
#[derive(Debug)]
pub struct FilePersistence {
    path: PathBuf,
}

impl FilePersistence {
    /// Backend storing [`TOKEN_FILE`] inside `data_dir`.
    pub fn new(data_dir: &Path) -> Self {
        Self::with_path(data_dir.join(TOKEN_FILE))
    }

    /// Backend storing the token set at `path`.
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    /// Token file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl PersistenceBackend for FilePersistence {
    async fn store(&self, tokens: &TokenSet) -> Result<(), OAuth2Error> {
        let write_failed = |e: std::io::Error| {
            OAuth2Error::Storage(StorageError::WriteFailed {
                message: e.to_string(),
            })
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(write_failed)?;
            }
        }

        let json = serde_json::to_vec_pretty(tokens).map_err(|e| {
            OAuth2Error::Storage(StorageError::WriteFailed {
                message: format!("Failed to serialize tokens: {}", e),
            })
        })?;

        let temp = self.temp_path();
        tokio::fs::write(&temp, json).await.map_err(write_failed)?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(write_failed)?;

        tracing::debug!(path = %self.path.display(), "token file written");
        Ok(())
    }

    async fn load(&self) -> Result<Option<TokenSet>, OAuth2Error> {
        let content = match tokio::fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(OAuth2Error::Storage(StorageError::ReadFailed {
                    message: e.to_string(),
                }))
            }
        };

        serde_json::from_slice(&content).map(Some).map_err(|e| {
            OAuth2Error::Storage(StorageError::CorruptedData {
                message: format!("Failed to parse token file: {}", e),
            })
        })
    }

    async fn clear(&self) -> Result<(), OAuth2Error> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(OAuth2Error::Storage(StorageError::DeleteFailed {
                message: e.to_string(),
            })),
        }
    }
}

/// Mock backend for testing.
#[derive(Default)]
pub struct MockPersistence {
    tokens: Mutex<Option<TokenSet>>,
    next_error: Mutex<Option<OAuth2Error>>,
    should_fail: Mutex<bool>,
    store_history: Mutex<Vec<TokenSet>>,
    load_count: Mutex<usize>,
    clear_count: Mutex<usize>,
}

impl MockPersistence {
    /// Create new mock backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the persisted token set without recording a store.
    pub fn seed(&self, tokens: TokenSet) -> &Self {
        *self.tokens.lock() = Some(tokens);
        self
    }

    /// Fail the next operation with `error`.
    pub fn set_next_error(&self, error: OAuth2Error) -> &Self {
        *self.next_error.lock() = Some(error);
        self
    }

    /// Fail every operation until reset.
    pub fn set_should_fail(&self, should_fail: bool) -> &Self {
        *self.should_fail.lock() = should_fail;
        self
    }

    /// Currently persisted token set.
    pub fn persisted(&self) -> Option<TokenSet> {
        self.tokens.lock().clone()
    }

    /// Token sets passed to `store`, in order.
    pub fn get_store_history(&self) -> Vec<TokenSet> {
        self.store_history.lock().clone()
    }

    /// Number of `load` calls.
    pub fn load_count(&self) -> usize {
        *self.load_count.lock()
    }

    /// Number of `clear` calls.
    pub fn clear_count(&self) -> usize {
        *self.clear_count.lock()
    }

    fn check_error(&self) -> Result<(), OAuth2Error> {
        if let Some(error) = self.next_error.lock().take() {
            return Err(error);
        }
        if *self.should_fail.lock() {
            return Err(OAuth2Error::Storage(StorageError::WriteFailed {
                message: "Mock storage failure".to_string(),
            }));
        }
        Ok(())
    }
}

#[async_trait]
impl PersistenceBackend for MockPersistence {
    async fn store(&self, tokens: &TokenSet) -> Result<(), OAuth2Error> {
        self.store_history.lock().push(tokens.clone());
        self.check_error()?;
        *self.tokens.lock() = Some(tokens.clone());
        Ok(())
    }

    async fn load(&self) -> Result<Option<TokenSet>, OAuth2Error> {
        *self.load_count.lock() += 1;
        self.check_error()?;
        Ok(self.tokens.lock().clone())
    }

    async fn clear(&self) -> Result<(), OAuth2Error> {
        *self.clear_count.lock() += 1;
        self.check_error()?;
        *self.tokens.lock() = None;
        Ok(())
    }
}
