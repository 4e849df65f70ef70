//! On-disk record format for users and roles.
//!
//! Each record is one JSON object with a recognized, PascalCase field
//! set; the record's id is carried by the file name, not the object.
//! Readers fail closed: an unrecognized field aborts the read as a
//! format error. Recognized fields may be absent, in which case they
//! default. `LockoutEnd` encodes as an RFC 3339 timestamp; an absent
//! field means "not locked out".
//!
//! Role memberships, claims and logins are stored inline as arrays.

use idstore_core::{Claim, Login, Role, User};
use idstore_storage::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Inline claim entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ClaimRecord {
    #[serde(rename = "Type")]
    pub claim_type: String,
    #[serde(rename = "Value")]
    pub claim_value: String,
}

impl From<&Claim> for ClaimRecord {
    fn from(claim: &Claim) -> Self {
        Self {
            claim_type: claim.claim_type.clone(),
            claim_value: claim.claim_value.clone(),
        }
    }
}

impl ClaimRecord {
    pub(crate) fn to_claim(&self) -> Claim {
        Claim::new(&self.claim_type, &self.claim_value)
    }

    pub(crate) fn matches(&self, claim: &Claim) -> bool {
        self.claim_type == claim.claim_type && self.claim_value == claim.claim_value
    }
}

/// Inline external-login entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct LoginRecord {
    #[serde(rename = "LoginProvider")]
    pub login_provider: String,
    #[serde(rename = "ProviderKey")]
    pub provider_key: String,
    #[serde(rename = "DisplayName")]
    pub display_name: String,
}

impl From<&Login> for LoginRecord {
    fn from(login: &Login) -> Self {
        Self {
            login_provider: login.login_provider.clone(),
            provider_key: login.provider_key.clone(),
            display_name: login.display_name.clone(),
        }
    }
}

impl LoginRecord {
    pub(crate) fn to_login(&self) -> Login {
        Login::new(&self.login_provider, &self.provider_key, &self.display_name)
    }
}

/// One user file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct UserRecord {
    #[serde(rename = "UserName", default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(
        rename = "NormalizedUserName",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub normalized_user_name: Option<String>,
    #[serde(rename = "Email", default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(
        rename = "NormalizedEmail",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub normalized_email: Option<String>,
    #[serde(rename = "EmailConfirmed", default)]
    pub email_confirmed: bool,
    #[serde(
        rename = "PasswordHash",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub password_hash: Option<String>,
    #[serde(
        rename = "SecurityStamp",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub security_stamp: Option<String>,
    #[serde(
        rename = "ConcurrencyStamp",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub concurrency_stamp: Option<String>,
    #[serde(
        rename = "PhoneNumber",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub phone_number: Option<String>,
    #[serde(rename = "PhoneNumberConfirmed", default)]
    pub phone_number_confirmed: bool,
    #[serde(rename = "TwoFactorEnabled", default)]
    pub two_factor_enabled: bool,
    #[serde(
        rename = "LockoutEnd",
        with = "time::serde::rfc3339::option",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub lockout_end: Option<OffsetDateTime>,
    #[serde(rename = "LockoutEnabled", default)]
    pub lockout_enabled: bool,
    #[serde(rename = "AccessFailedCount", default)]
    pub access_failed_count: i32,
    #[serde(rename = "RoleIds", default)]
    pub role_ids: Vec<String>,
    #[serde(rename = "Claims", default)]
    pub claims: Vec<ClaimRecord>,
    #[serde(rename = "Logins", default)]
    pub logins: Vec<LoginRecord>,
}

impl UserRecord {
    /// Builds a record from a user, with empty membership/claim/login
    /// arrays.
    pub(crate) fn from_user(user: &User) -> Self {
        let mut record = Self::default();
        record.apply_user(user);
        record
    }

    /// Overwrites the scalar fields from the user, keeping the inline
    /// arrays.
    pub(crate) fn apply_user(&mut self, user: &User) {
        self.user_name = Some(user.user_name.clone());
        self.normalized_user_name = Some(user.normalized_user_name.clone());
        self.email = user.email.clone();
        self.normalized_email = user.normalized_email.clone();
        self.email_confirmed = user.email_confirmed;
        self.password_hash = user.password_hash.clone();
        self.security_stamp = user.security_stamp.clone();
        self.concurrency_stamp = Some(user.concurrency_stamp.clone());
        self.phone_number = user.phone_number.clone();
        self.phone_number_confirmed = user.phone_number_confirmed;
        self.two_factor_enabled = user.two_factor_enabled;
        self.lockout_end = user.lockout_end;
        self.lockout_enabled = user.lockout_enabled;
        self.access_failed_count = user.access_failed_count;
    }

    /// Reconstructs the user, re-attaching the id from the file name.
    pub(crate) fn to_user(&self, id: &str) -> User {
        User {
            id: id.to_string(),
            user_name: self.user_name.clone().unwrap_or_default(),
            normalized_user_name: self.normalized_user_name.clone().unwrap_or_default(),
            email: self.email.clone(),
            normalized_email: self.normalized_email.clone(),
            email_confirmed: self.email_confirmed,
            password_hash: self.password_hash.clone(),
            security_stamp: self.security_stamp.clone(),
            concurrency_stamp: self.concurrency_stamp.clone().unwrap_or_default(),
            phone_number: self.phone_number.clone(),
            phone_number_confirmed: self.phone_number_confirmed,
            two_factor_enabled: self.two_factor_enabled,
            lockout_end: self.lockout_end,
            lockout_enabled: self.lockout_enabled,
            access_failed_count: self.access_failed_count,
        }
    }
}

/// One role file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RoleRecord {
    #[serde(rename = "Name", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(
        rename = "NormalizedName",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub normalized_name: Option<String>,
    #[serde(
        rename = "ConcurrencyStamp",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub concurrency_stamp: Option<String>,
    #[serde(rename = "Claims", default)]
    pub claims: Vec<ClaimRecord>,
}

impl RoleRecord {
    pub(crate) fn from_role(role: &Role) -> Self {
        let mut record = Self::default();
        record.apply_role(role);
        record
    }

    pub(crate) fn apply_role(&mut self, role: &Role) {
        self.name = Some(role.name.clone());
        self.normalized_name = Some(role.normalized_name.clone());
        self.concurrency_stamp = Some(role.concurrency_stamp.clone());
    }

    pub(crate) fn to_role(&self, id: &str) -> Role {
        Role {
            id: id.to_string(),
            name: self.name.clone().unwrap_or_default(),
            normalized_name: self.normalized_name.clone().unwrap_or_default(),
            concurrency_stamp: self.concurrency_stamp.clone().unwrap_or_default(),
        }
    }
}

/// Parses a record, mapping malformed data to a fatal format error.
pub(crate) fn parse<T: for<'de> Deserialize<'de>>(
    contents: &str,
    what: &str,
) -> StorageResult<T> {
    serde_json::from_str(contents)
        .map_err(|e| StorageError::invalid_record(format!("malformed {what}: {e}")))
}

/// Serializes a record.
pub(crate) fn render<T: Serialize>(record: &T) -> StorageResult<String> {
    serde_json::to_string_pretty(record)
        .map_err(|e| StorageError::internal(format!("serializing record: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_record_round_trip() {
        let mut user = User::new("ab12", "Bob", "BOB").with_email("b@e.com", "B@E.COM");
        user.lockout_end = Some(time::macros::datetime!(2030-06-01 12:00:00 UTC));

        let record = UserRecord::from_user(&user);
        let json = render(&record).expect("render");
        let parsed: UserRecord = parse(&json, "user record").expect("parse");

        assert_eq!(parsed.to_user("ab12"), user);
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let json = r#"{"UserName":"Bob","FavoriteColor":"green"}"#;
        let err = parse::<UserRecord>(json, "user record").unwrap_err();
        assert!(err.is_invalid_record());
        assert!(err.to_string().contains("FavoriteColor"));
    }

    #[test]
    fn test_absent_optional_fields_default() {
        let json = r#"{"UserName":"Bob"}"#;
        let record: UserRecord = parse(json, "user record").expect("parse");
        assert!(!record.email_confirmed);
        assert!(record.lockout_end.is_none());
        assert_eq!(record.access_failed_count, 0);
        assert!(record.role_ids.is_empty());
    }

    #[test]
    fn test_lockout_end_is_rfc3339() {
        let mut user = User::new("ab12", "Bob", "BOB");
        user.lockout_end = Some(time::macros::datetime!(2030-06-01 12:00:00 UTC));
        let json = render(&UserRecord::from_user(&user)).expect("render");
        assert!(json.contains("\"LockoutEnd\": \"2030-06-01T12:00:00Z\""));
    }

    #[test]
    fn test_apply_user_keeps_arrays() {
        let user = User::new("ab12", "Bob", "BOB");
        let mut record = UserRecord::from_user(&user);
        record.role_ids.push("r1".to_string());
        record.claims.push(ClaimRecord {
            claim_type: "dept".into(),
            claim_value: "eng".into(),
        });

        let mut renamed = user.clone();
        renamed.user_name = "Robert".into();
        record.apply_user(&renamed);

        assert_eq!(record.user_name.as_deref(), Some("Robert"));
        assert_eq!(record.role_ids, vec!["r1".to_string()]);
        assert_eq!(record.claims.len(), 1);
    }

    #[test]
    fn test_role_record_round_trip() {
        let role = Role::new("r1", "Admin", "ADMIN");
        let json = render(&RoleRecord::from_role(&role)).expect("render");
        let parsed: RoleRecord = parse(&json, "role record").expect("parse");
        assert_eq!(parsed.to_role("r1"), role);
    }
}
