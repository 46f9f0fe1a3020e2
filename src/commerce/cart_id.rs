//! Persistence of the shopper's cart identifier.
//!
//! The cart id is the only piece of state the synchronization layer keeps across
//! sessions; everything else is refetched from the commerce API.

use crate::core::error::{SyncError, SyncResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Storage for the current cart id
#[async_trait]
pub trait CartIdStore: Send + Sync {
    /// Stored cart id, `None` when the shopper has no cart yet
    async fn load(&self) -> SyncResult<Option<String>>;

    async fn save(&self, cart_id: &str) -> SyncResult<()>;

    /// Forget the cart id, e.g. after checkout completes
    async fn clear(&self) -> SyncResult<()>;
}

/// Cart id kept in memory only
#[derive(Debug, Default)]
pub struct MemoryCartIdStore {
    cart_id: Mutex<Option<String>>,
}

impl MemoryCartIdStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CartIdStore for MemoryCartIdStore {
    async fn load(&self) -> SyncResult<Option<String>> {
        Ok(self.cart_id.lock().clone())
    }

    async fn save(&self, cart_id: &str) -> SyncResult<()> {
        *self.cart_id.lock() = Some(cart_id.to_string());
        Ok(())
    }

    async fn clear(&self) -> SyncResult<()> {
        *self.cart_id.lock() = None;
        Ok(())
    }
}

/// Cart id kept in a small text file
#[derive(Debug, Clone)]
pub struct FileCartIdStore {
    path: PathBuf,
}

impl FileCartIdStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CartIdStore for FileCartIdStore {
    async fn load(&self) -> SyncResult<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => {
                let cart_id = contents.trim();
                if cart_id.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(cart_id.to_string()))
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SyncError::from(e)),
        }
    }

    async fn save(&self, cart_id: &str) -> SyncResult<()> {
        if cart_id.trim().is_empty() {
            return Err(SyncError::validation("cart_id", "must not be empty"));
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        tokio::fs::write(&self.path, cart_id).await?;
        debug!(path = %self.path.display(), "Saved cart id");
        Ok(())
    }

    async fn clear(&self) -> SyncResult<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SyncError::from(e)),
        }
    }
}
