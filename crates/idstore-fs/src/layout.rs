//! Directory-layout bootstrap and validation for the flat-file backend.
//!
//! The tree under the base path is fixed:
//!
//! ```text
//! <base>/users/<2-char-bucket>/<user-id>   one file per user
//! <base>/users-by-name/<prefix>            normalized-name → id lookup
//! <base>/users-by-email/<prefix>           normalized-email → id lookup
//! <base>/users-by-login/<provider>         (provider, key) → id lookup
//! <base>/roles/<role-id>                   one file per role
//! <base>/roles-by-name/<prefix>            normalized-name → id lookup
//! ```
//!
//! Buckets cover every `[0-9a-z]` pair, 1296 directories. A base whose
//! `users` directory exists but lacks the expected substructure is
//! treated as a fatal configuration error, never silently repaired.

use std::path::Path;

use idstore_storage::{StorageError, StorageResult};
use tracing::{info, instrument};

use crate::io::io_err;

/// Characters allowed in bucket directory names.
const BUCKET_CHARS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Sibling directories created next to `users/`.
const SIBLINGS: &[&str] = &[
    "users-by-name",
    "users-by-email",
    "users-by-login",
    "roles",
    "roles-by-name",
];

/// State of the on-disk directory structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutStatus {
    /// No store exists at the base path yet.
    Missing,
    /// The full expected structure is present.
    Valid,
    /// A partial or foreign structure occupies the base path.
    Invalid(String),
}

/// Returns the names of all 1296 bucket directories.
pub(crate) fn bucket_names() -> impl Iterator<Item = String> {
    BUCKET_CHARS.iter().flat_map(|a| {
        BUCKET_CHARS
            .iter()
            .map(move |b| format!("{}{}", *a as char, *b as char))
    })
}

/// Inspects the directory structure under `base`.
///
/// # Errors
///
/// Returns an error only for I/O failures; structural problems are
/// reported through [`LayoutStatus::Invalid`].
pub async fn validate(base: &Path) -> StorageResult<LayoutStatus> {
    let users = base.join("users");
    if !exists(&users).await? {
        return Ok(LayoutStatus::Missing);
    }

    for bucket in bucket_names() {
        let dir = users.join(&bucket);
        if !exists(&dir).await? {
            return Ok(LayoutStatus::Invalid(format!(
                "missing bucket directory users/{bucket}"
            )));
        }
    }
    for sibling in SIBLINGS {
        if !exists(&base.join(sibling)).await? {
            return Ok(LayoutStatus::Invalid(format!(
                "missing directory {sibling}"
            )));
        }
    }

    Ok(LayoutStatus::Valid)
}

/// Creates the full directory skeleton under `base`.
///
/// # Errors
///
/// Returns an error when any directory cannot be created.
#[instrument(skip(base), fields(base = %base.display()))]
pub async fn create(base: &Path) -> StorageResult<()> {
    info!("Creating identity store directory skeleton");

    let users = base.join("users");
    tokio::fs::create_dir_all(&users)
        .await
        .map_err(|e| io_err("creating users directory", e))?;
    for bucket in bucket_names() {
        tokio::fs::create_dir(users.join(&bucket))
            .await
            .map_err(|e| io_err("creating bucket directory", e))?;
    }
    for sibling in SIBLINGS {
        tokio::fs::create_dir_all(base.join(sibling))
            .await
            .map_err(|e| io_err("creating sibling directory", e))?;
    }

    info!("Identity store directory skeleton created");
    Ok(())
}

/// Derives the bucket directory name for a user id: its first two
/// characters, lowercased.
///
/// # Errors
///
/// Returns `StorageError::InvalidInput` for ids shorter than two
/// characters or ids whose prefix falls outside the bucket character
/// set.
pub(crate) fn bucket_of(id: &str) -> StorageResult<String> {
    let prefix: String = id.chars().take(2).flat_map(char::to_lowercase).collect();
    if prefix.chars().count() < 2 {
        return Err(StorageError::invalid_input(format!(
            "id {id:?} is too short to map to a user bucket"
        )));
    }
    if !prefix
        .bytes()
        .all(|b| BUCKET_CHARS.contains(&b))
    {
        return Err(StorageError::invalid_input(format!(
            "id {id:?} does not map to a user bucket"
        )));
    }
    Ok(prefix)
}

async fn exists(path: &Path) -> StorageResult<bool> {
    tokio::fs::try_exists(path)
        .await
        .map_err(|e| io_err("checking directory", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_names_cover_every_pair() {
        let names: Vec<String> = bucket_names().collect();
        assert_eq!(names.len(), 1296);
        assert_eq!(names.first().map(String::as_str), Some("00"));
        assert_eq!(names.last().map(String::as_str), Some("zz"));
        assert!(names.contains(&"a7".to_string()));
    }

    #[test]
    fn test_bucket_of_lowercases() {
        assert_eq!(bucket_of("AB12").unwrap(), "ab");
        assert_eq!(bucket_of("7f3c").unwrap(), "7f");
    }

    #[test]
    fn test_bucket_of_rejects_unbucketable_ids() {
        assert!(bucket_of("a").is_err());
        assert!(bucket_of("_x12").is_err());
        assert!(bucket_of("-abc").is_err());
    }

    #[tokio::test]
    async fn test_validate_missing_then_valid() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert_eq!(
            validate(dir.path()).await.expect("validate"),
            LayoutStatus::Missing
        );

        create(dir.path()).await.expect("create");
        assert_eq!(
            validate(dir.path()).await.expect("validate"),
            LayoutStatus::Valid
        );
    }

    #[tokio::test]
    async fn test_validate_flags_partial_tree() {
        let dir = tempfile::tempdir().expect("tempdir");
        tokio::fs::create_dir_all(dir.path().join("users"))
            .await
            .expect("mkdir");

        let status = validate(dir.path()).await.expect("validate");
        assert!(matches!(status, LayoutStatus::Invalid(_)));
    }
}
