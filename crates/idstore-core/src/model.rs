//! Identity records persisted by the storage backends.
//!
//! All records are plain data. The host framework constructs them fully
//! formed and the stores persist them verbatim; no normalization or
//! validation beyond id handling happens here.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A user account record.
///
/// `id` is immutable after creation. `normalized_user_name` and
/// `normalized_email` drive case-insensitive lookup and must be kept in
/// sync with their display counterparts by the caller.
/// `concurrency_stamp` is an opaque token reassigned on every full-record
/// update; a stale stamp on update is rejected as a conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier, canonical string form.
    pub id: String,
    /// Display user name.
    pub user_name: String,
    /// Canonicalized user name used for case-insensitive lookup.
    pub normalized_user_name: String,
    /// Email address, if any.
    pub email: Option<String>,
    /// Canonicalized email used for case-insensitive lookup.
    pub normalized_email: Option<String>,
    /// Whether the email address has been confirmed.
    pub email_confirmed: bool,
    /// Password hash as produced by the host's hasher.
    pub password_hash: Option<String>,
    /// Host-managed security stamp.
    pub security_stamp: Option<String>,
    /// Opaque optimistic-concurrency token.
    pub concurrency_stamp: String,
    /// Phone number, if any.
    pub phone_number: Option<String>,
    /// Whether the phone number has been confirmed.
    pub phone_number_confirmed: bool,
    /// Whether two-factor authentication is enabled.
    pub two_factor_enabled: bool,
    /// End of the current lockout window; a past or absent value means
    /// not locked out.
    #[serde(with = "time::serde::rfc3339::option")]
    pub lockout_end: Option<OffsetDateTime>,
    /// Whether this account can be locked out at all.
    pub lockout_enabled: bool,
    /// Consecutive failed access attempts since the last reset.
    pub access_failed_count: i32,
}

impl User {
    /// Creates a user with the given identity fields and defaults for
    /// everything else. A fresh concurrency stamp is assigned.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        user_name: impl Into<String>,
        normalized_user_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            user_name: user_name.into(),
            normalized_user_name: normalized_user_name.into(),
            email: None,
            normalized_email: None,
            email_confirmed: false,
            password_hash: None,
            security_stamp: None,
            concurrency_stamp: crate::id::new_concurrency_stamp(),
            phone_number: None,
            phone_number_confirmed: false,
            two_factor_enabled: false,
            lockout_end: None,
            lockout_enabled: false,
            access_failed_count: 0,
        }
    }

    /// Sets the email and its normalized form.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>, normalized: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self.normalized_email = Some(normalized.into());
        self
    }

    /// Sets the password hash.
    #[must_use]
    pub fn with_password_hash(mut self, hash: impl Into<String>) -> Self {
        self.password_hash = Some(hash.into());
        self
    }
}

/// A role record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    /// Unique identifier, canonical string form.
    pub id: String,
    /// Display role name.
    pub name: String,
    /// Canonicalized role name used for lookup.
    pub normalized_name: String,
    /// Opaque optimistic-concurrency token.
    pub concurrency_stamp: String,
}

impl Role {
    /// Creates a role with a fresh concurrency stamp.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        normalized_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            normalized_name: normalized_name.into(),
            concurrency_stamp: crate::id::new_concurrency_stamp(),
        }
    }
}

/// A typed key/value attribute attached to a user or a role.
///
/// (type, value) pairs are not required to be unique; removal matches on
/// owning id plus the exact pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    /// Claim type, e.g. `"dept"`.
    pub claim_type: String,
    /// Claim value, e.g. `"eng"`.
    pub claim_value: String,
}

impl Claim {
    /// Creates a claim.
    #[must_use]
    pub fn new(claim_type: impl Into<String>, claim_value: impl Into<String>) -> Self {
        Self {
            claim_type: claim_type.into(),
            claim_value: claim_value.into(),
        }
    }
}

/// An external-identity-provider correlation record.
///
/// (provider, provider key) is the primary external-identity lookup key
/// and is unique per login record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Login {
    /// Provider name, e.g. `"google"`.
    pub login_provider: String,
    /// Provider-issued key for the user.
    pub provider_key: String,
    /// Human-readable provider display name.
    pub display_name: String,
}

impl Login {
    /// Creates a login record.
    #[must_use]
    pub fn new(
        login_provider: impl Into<String>,
        provider_key: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            login_provider: login_provider.into(),
            provider_key: provider_key.into(),
            display_name: display_name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user_defaults() {
        let user = User::new("u1", "Bob", "BOB");
        assert_eq!(user.id, "u1");
        assert_eq!(user.user_name, "Bob");
        assert_eq!(user.normalized_user_name, "BOB");
        assert!(user.email.is_none());
        assert!(!user.email_confirmed);
        assert!(user.lockout_end.is_none());
        assert_eq!(user.access_failed_count, 0);
        assert!(!user.concurrency_stamp.is_empty());
    }

    #[test]
    fn test_user_builder() {
        let user = User::new("u1", "Bob", "BOB")
            .with_email("Bob@Example.com", "BOB@EXAMPLE.COM")
            .with_password_hash("hash");
        assert_eq!(user.email.as_deref(), Some("Bob@Example.com"));
        assert_eq!(user.normalized_email.as_deref(), Some("BOB@EXAMPLE.COM"));
        assert_eq!(user.password_hash.as_deref(), Some("hash"));
    }

    #[test]
    fn test_fresh_stamps_differ() {
        let a = User::new("u1", "a", "A");
        let b = User::new("u2", "b", "B");
        assert_ne!(a.concurrency_stamp, b.concurrency_stamp);
    }

    #[test]
    fn test_lockout_end_round_trips_as_rfc3339() {
        let mut user = User::new("u1", "Bob", "BOB");
        user.lockout_end = Some(time::macros::datetime!(2030-01-02 03:04:05 UTC));

        let json = serde_json::to_string(&user).expect("serialize");
        assert!(json.contains("2030-01-02T03:04:05Z"));

        let back: User = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.lockout_end, user.lockout_end);
    }
}
