//! User storage provider trait.

use async_trait::async_trait;
use idstore_core::{Claim, Login, User};
use time::OffsetDateTime;

use crate::error::StorageResult;

/// Provider for user persistence operations.
///
/// Implementations must be thread-safe and support concurrent callers;
/// coordination guarantees beyond a single operation are backend-specific
/// and documented on the implementing type.
///
/// Identifier arguments are exact and case-sensitive. Name and email
/// lookups marked *normalized* are case-insensitive: both the stored
/// value and the query argument are folded before comparison.
#[async_trait]
pub trait UserStore: Send + Sync {
    // ==================== Record CRUD ====================

    /// Creates a new user record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::AlreadyExists` if a user with the same id
    /// exists, `StorageError::InvalidInput` for malformed ids or names.
    async fn create_user(&self, user: &User) -> StorageResult<User>;

    /// Persists all mutable fields of an existing user and reassigns a
    /// fresh concurrency stamp. Returns the stored record carrying the
    /// new stamp.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the user doesn't exist, and
    /// `StorageError::ConcurrencyConflict` if `user.concurrency_stamp`
    /// is stale (the record changed since it was read). The caller may
    /// retry after re-reading.
    async fn update_user(&self, user: &User) -> StorageResult<User>;

    /// Deletes a user and, by cascade, all of its claims, logins and
    /// role memberships.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the user doesn't exist.
    async fn delete_user(&self, id: &str) -> StorageResult<()>;

    // ==================== Lookup ====================

    /// Finds a user by exact id. Returns `None` when absent.
    async fn find_by_id(&self, id: &str) -> StorageResult<Option<User>>;

    /// Finds a user by normalized user name (case-insensitive).
    ///
    /// An empty argument returns `None` without touching the backend.
    async fn find_by_normalized_username(&self, normalized: &str) -> StorageResult<Option<User>>;

    /// Finds a user by normalized email (case-insensitive).
    async fn find_by_normalized_email(&self, normalized: &str) -> StorageResult<Option<User>>;

    /// Finds the user owning the external login (provider, provider key).
    async fn find_by_login(&self, provider: &str, provider_key: &str)
    -> StorageResult<Option<User>>;

    // ==================== Scalar attributes ====================
    //
    // Each getter reads, and each setter persists, a single attribute of
    // the stored record; an operation against a missing user fails with
    // `StorageError::NotFound`. Setters do not disturb the concurrency
    // stamp; only `update_user` reassigns it.

    /// Returns the user's display name, or `None` when no such user
    /// exists (name reads are lookups, not attribute reads).
    async fn user_name(&self, id: &str) -> StorageResult<Option<String>>;

    /// Sets the user's display name. The caller is responsible for
    /// keeping the normalized name in sync via `set_normalized_user_name`.
    async fn set_user_name(&self, id: &str, user_name: &str) -> StorageResult<()>;

    /// Sets the user's normalized name, re-keying case-insensitive lookup.
    async fn set_normalized_user_name(&self, id: &str, normalized: &str) -> StorageResult<()>;

    /// Returns the password hash, if one is set.
    async fn password_hash(&self, id: &str) -> StorageResult<Option<String>>;

    /// Sets or clears the password hash.
    async fn set_password_hash(&self, id: &str, hash: Option<&str>) -> StorageResult<()>;

    /// Returns the security stamp, if one is set.
    async fn security_stamp(&self, id: &str) -> StorageResult<Option<String>>;

    /// Sets the security stamp.
    async fn set_security_stamp(&self, id: &str, stamp: &str) -> StorageResult<()>;

    /// Returns the email address, if any.
    async fn email(&self, id: &str) -> StorageResult<Option<String>>;

    /// Sets or clears the email address. The caller is responsible for
    /// keeping the normalized email in sync via `set_normalized_email`.
    async fn set_email(&self, id: &str, email: Option<&str>) -> StorageResult<()>;

    /// Sets or clears the normalized email, re-keying case-insensitive
    /// lookup.
    async fn set_normalized_email(&self, id: &str, normalized: Option<&str>) -> StorageResult<()>;

    /// Returns whether the email address is confirmed.
    async fn email_confirmed(&self, id: &str) -> StorageResult<bool>;

    /// Sets the email-confirmed flag.
    async fn set_email_confirmed(&self, id: &str, confirmed: bool) -> StorageResult<()>;

    /// Returns the phone number, if any.
    async fn phone_number(&self, id: &str) -> StorageResult<Option<String>>;

    /// Sets or clears the phone number.
    async fn set_phone_number(&self, id: &str, phone: Option<&str>) -> StorageResult<()>;

    /// Returns whether the phone number is confirmed.
    async fn phone_number_confirmed(&self, id: &str) -> StorageResult<bool>;

    /// Sets the phone-confirmed flag.
    async fn set_phone_number_confirmed(&self, id: &str, confirmed: bool) -> StorageResult<()>;

    /// Returns whether two-factor authentication is enabled.
    async fn two_factor_enabled(&self, id: &str) -> StorageResult<bool>;

    /// Sets the two-factor flag.
    async fn set_two_factor_enabled(&self, id: &str, enabled: bool) -> StorageResult<()>;

    /// Returns the end of the current lockout window, if locked out.
    async fn lockout_end(&self, id: &str) -> StorageResult<Option<OffsetDateTime>>;

    /// Sets or clears the lockout end timestamp.
    async fn set_lockout_end(&self, id: &str, end: Option<OffsetDateTime>) -> StorageResult<()>;

    /// Returns whether lockout is enabled for this user.
    async fn lockout_enabled(&self, id: &str) -> StorageResult<bool>;

    /// Sets the lockout-enabled flag.
    async fn set_lockout_enabled(&self, id: &str, enabled: bool) -> StorageResult<()>;

    /// Returns the failed-access counter.
    async fn access_failed_count(&self, id: &str) -> StorageResult<i32>;

    /// Increments the failed-access counter and returns the new value.
    async fn increment_access_failed_count(&self, id: &str) -> StorageResult<i32>;

    /// Resets the failed-access counter to zero.
    async fn reset_access_failed_count(&self, id: &str) -> StorageResult<()>;

    // ==================== Role membership ====================

    /// Adds the user to the role with the given name (normalized,
    /// case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if either the user or the role
    /// doesn't exist. Adding an existing membership is a no-op.
    async fn add_to_role(&self, user_id: &str, role_name: &str) -> StorageResult<()>;

    /// Removes the user from the named role. Removing a membership that
    /// doesn't exist is a no-op.
    async fn remove_from_role(&self, user_id: &str, role_name: &str) -> StorageResult<()>;

    /// Lists the names of the roles the user belongs to.
    async fn role_names_for_user(&self, user_id: &str) -> StorageResult<Vec<String>>;

    /// Returns whether the user belongs to the named role.
    async fn is_in_role(&self, user_id: &str, role_name: &str) -> StorageResult<bool>;

    /// Lists all users in the named role.
    async fn users_in_role(&self, role_name: &str) -> StorageResult<Vec<User>>;

    // ==================== Claims ====================

    /// Lists the user's claims.
    async fn claims_for_user(&self, user_id: &str) -> StorageResult<Vec<Claim>>;

    /// Adds claims to the user. Duplicate (type, value) pairs are
    /// permitted.
    async fn add_claims(&self, user_id: &str, claims: &[Claim]) -> StorageResult<()>;

    /// Replaces every claim matching `claim` with `new_claim`.
    async fn replace_claim(
        &self,
        user_id: &str,
        claim: &Claim,
        new_claim: &Claim,
    ) -> StorageResult<()>;

    /// Removes every claim matching one of the given (type, value) pairs.
    async fn remove_claims(&self, user_id: &str, claims: &[Claim]) -> StorageResult<()>;

    /// Lists all users holding the given claim.
    async fn users_for_claim(&self, claim: &Claim) -> StorageResult<Vec<User>>;

    // ==================== External logins ====================

    /// Adds an external login to the user.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::AlreadyExists` if the (provider, key) pair
    /// is already recorded for this user.
    async fn add_login(&self, user_id: &str, login: &Login) -> StorageResult<()>;

    /// Removes the login identified by (provider, provider key).
    /// Removing an absent login is a no-op.
    async fn remove_login(
        &self,
        user_id: &str,
        provider: &str,
        provider_key: &str,
    ) -> StorageResult<()>;

    /// Lists the user's external logins.
    async fn logins_for_user(&self, user_id: &str) -> StorageResult<Vec<Login>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time check that UserStore is object-safe.
    fn _assert_object_safe(_: &dyn UserStore) {}
}
