//! # idstore-storage
//!
//! Storage provider traits for the idstore identity backends.
//!
//! This crate defines the contracts that every identity storage backend
//! must implement. It does not contain any implementations — those are
//! provided by separate crates (`idstore-postgres`, `idstore-fs`).
//!
//! ## Overview
//!
//! The two traits are [`UserStore`] and [`RoleStore`]. Together they
//! cover the full persistence surface a membership host expects: record
//! CRUD, case-insensitive name/email lookup, per-attribute access,
//! role membership, claims and external logins. Every operation is
//! implemented by every backend; a partial store violates the host
//! contract.
//!
//! ## Conventions
//!
//! - Lookups return `Ok(None)` for missing records; only mutations
//!   against missing records produce [`StorageError::NotFound`].
//! - Updates reassign the record's concurrency stamp; a stale stamp is
//!   rejected with [`StorageError::ConcurrencyConflict`], retryable after
//!   re-reading the record.
//! - Cancellation is drop-based: dropping an operation future abandons
//!   it before the next I/O call.
//!
//! ## Example
//!
//! ```ignore
//! use idstore_storage::{StorageError, UserStore};
//!
//! async fn must_find(store: &dyn UserStore, id: &str) -> Result<idstore_core::User, StorageError> {
//!     store
//!         .find_by_id(id)
//!         .await?
//!         .ok_or_else(|| StorageError::not_found("user", id))
//! }
//! ```

pub mod error;
pub mod role;
pub mod user;

pub use error::{ErrorCategory, StorageError, StorageResult};
pub use role::RoleStore;
pub use user::UserStore;
