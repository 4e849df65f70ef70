//! Flat-file storage backend for idstore.
//!
//! This crate provides a plain-file implementation of the `UserStore`
//! and `RoleStore` traits from `idstore-storage`. Every user and role is
//! one JSON file; case-insensitive name, email and login lookups go
//! through flat key/value files that are rewritten in full on every
//! mutation.
//!
//! # Example
//!
//! ```ignore
//! use idstore_fs::{FilesystemConfig, FilesystemIdentityDb};
//! use idstore_storage::UserStore;
//!
//! # async fn example() -> Result<(), idstore_storage::StorageError> {
//! let config = FilesystemConfig::new("/var/lib/idstore");
//! let db = FilesystemIdentityDb::open(&config).await?;
//!
//! let users = db.users();
//! let found = users.find_by_normalized_username("BOB").await?;
//! # Ok(())
//! # }
//! ```
//!
//! # On-disk layout
//!
//! See [`layout`] for the directory tree. The tree is created on first
//! open; a base directory with a partial structure is rejected as a
//! fatal configuration error.
//!
//! # Concurrency
//!
//! Writers are serialized per file through an in-process lock registry;
//! readers are lock-free because every rewrite is an atomic rename.
//! The registry does not coordinate separate processes sharing a base
//! directory.

mod context;
mod io;
mod locks;
mod lookup;
mod record;

pub mod config;
pub mod layout;
pub mod role;
pub mod user;

use std::path::Path;
use std::sync::Arc;

use idstore_core::IdCodec;
use idstore_storage::{StorageError, StorageResult};

use context::FsContext;

// Re-export main types
pub use config::FilesystemConfig;
pub use layout::LayoutStatus;
pub use role::FsRoleStore;
pub use user::FsUserStore;

// Re-export storage traits for convenience
pub use idstore_storage::{RoleStore, UserStore};

/// Flat-file identity database handle.
///
/// Owns the base-path state and hands out store instances sharing the
/// per-file lock registry.
#[derive(Debug, Clone)]
pub struct FilesystemIdentityDb {
    ctx: Arc<FsContext>,
}

impl FilesystemIdentityDb {
    /// Opens the store at the configured base path, creating the
    /// directory skeleton on first use.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidInput` when the base path holds a
    /// partial or foreign directory structure, or an internal error for
    /// I/O failures.
    pub async fn open(config: &FilesystemConfig) -> StorageResult<Self> {
        Self::open_with_codec(config, IdCodec::default()).await
    }

    /// Opens the store with a custom id conversion policy.
    ///
    /// # Errors
    ///
    /// See [`FilesystemIdentityDb::open`].
    pub async fn open_with_codec(
        config: &FilesystemConfig,
        codec: IdCodec,
    ) -> StorageResult<Self> {
        match layout::validate(&config.base_path).await? {
            LayoutStatus::Valid => {}
            LayoutStatus::Missing => layout::create(&config.base_path).await?,
            LayoutStatus::Invalid(reason) => {
                return Err(StorageError::invalid_input(format!(
                    "identity store directory structure is invalid: {reason}"
                )));
            }
        }

        Ok(Self {
            ctx: FsContext::new(config.base_path.clone(), codec),
        })
    }

    /// Returns the base path of the store tree.
    #[must_use]
    pub fn base_path(&self) -> &Path {
        self.ctx.base()
    }

    /// Creates a user store sharing this handle's lock registry.
    #[must_use]
    pub fn users(&self) -> FsUserStore {
        FsUserStore::new(Arc::clone(&self.ctx))
    }

    /// Creates a role store sharing this handle's lock registry.
    #[must_use]
    pub fn roles(&self) -> FsRoleStore {
        FsRoleStore::new(Arc::clone(&self.ctx))
    }
}
