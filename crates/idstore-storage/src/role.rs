//! Role storage provider trait.

use async_trait::async_trait;
use idstore_core::{Claim, Role};

use crate::error::StorageResult;

/// Provider for role persistence operations.
///
/// Mirrors [`crate::UserStore`] at reduced scope. Role-name lookup uses
/// the same case-insensitive folding as user-name lookup.
#[async_trait]
pub trait RoleStore: Send + Sync {
    /// Creates a new role record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::AlreadyExists` if a role with the same id
    /// exists.
    async fn create_role(&self, role: &Role) -> StorageResult<Role>;

    /// Persists all mutable fields of an existing role and reassigns a
    /// fresh concurrency stamp. Returns the stored record carrying the
    /// new stamp.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the role doesn't exist, and
    /// `StorageError::ConcurrencyConflict` on a stale stamp.
    async fn update_role(&self, role: &Role) -> StorageResult<Role>;

    /// Deletes a role and, by cascade, its claims and all memberships
    /// referencing it.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the role doesn't exist.
    async fn delete_role(&self, id: &str) -> StorageResult<()>;

    /// Finds a role by exact id. Returns `None` when absent.
    async fn find_by_id(&self, id: &str) -> StorageResult<Option<Role>>;

    /// Finds a role by normalized name (case-insensitive).
    async fn find_by_normalized_name(&self, normalized: &str) -> StorageResult<Option<Role>>;

    /// Returns the role's display name, or `None` when the role is
    /// absent.
    async fn role_name(&self, id: &str) -> StorageResult<Option<String>>;

    /// Lists the role's claims.
    async fn claims_for_role(&self, role_id: &str) -> StorageResult<Vec<Claim>>;

    /// Adds a claim to the role.
    async fn add_claim(&self, role_id: &str, claim: &Claim) -> StorageResult<()>;

    /// Removes every claim matching the given (type, value) pair.
    /// Removing an absent claim is a no-op.
    async fn remove_claim(&self, role_id: &str, claim: &Claim) -> StorageResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time check that RoleStore is object-safe.
    fn _assert_object_safe(_: &dyn RoleStore) {}
}
