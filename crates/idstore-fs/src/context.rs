//! Shared state and path layout helpers for the flat-file stores.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use idstore_core::normalize::{file_safe, fold, lookup_prefix};
use idstore_core::{IdCodec, User};
use idstore_storage::{StorageError, StorageResult};
use tracing::debug;

use crate::io::{read_optional, write_atomic};
use crate::layout::bucket_of;
use crate::locks::LockRegistry;
use crate::record::{self, RoleRecord, UserRecord};

/// Shared backend state: base path, write-lock registry and id policy.
///
/// Stores hold this behind an `Arc`; all path derivation lives here so
/// the layout is written down exactly once.
#[derive(Debug)]
pub(crate) struct FsContext {
    base: PathBuf,
    pub(crate) locks: LockRegistry,
    pub(crate) codec: IdCodec,
}

impl FsContext {
    pub(crate) fn new(base: PathBuf, codec: IdCodec) -> Arc<Self> {
        Arc::new(Self {
            base,
            locks: LockRegistry::new(),
            codec,
        })
    }

    pub(crate) fn base(&self) -> &Path {
        &self.base
    }

    pub(crate) fn decode_id(&self, raw: &str) -> StorageResult<String> {
        Ok(self.codec.decode(raw)?)
    }

    // ==================== Paths and lock keys ====================

    pub(crate) fn user_path(&self, id: &str) -> StorageResult<PathBuf> {
        let bucket = bucket_of(id)?;
        Ok(self.base.join("users").join(bucket).join(id))
    }

    pub(crate) fn user_lock_key(id: &str) -> String {
        format!("users/{id}")
    }

    pub(crate) fn role_path(&self, id: &str) -> PathBuf {
        self.base.join("roles").join(id)
    }

    pub(crate) fn role_lock_key(id: &str) -> String {
        format!("roles/{id}")
    }

    /// Lookup file and lock key for a folded normalized user name.
    pub(crate) fn name_lookup(&self, folded: &str) -> (PathBuf, String) {
        let prefix = lookup_prefix(folded);
        (
            self.base.join("users-by-name").join(&prefix),
            format!("users-by-name/{prefix}"),
        )
    }

    /// Lookup file and lock key for a folded normalized email.
    pub(crate) fn email_lookup(&self, folded: &str) -> (PathBuf, String) {
        let prefix = lookup_prefix(folded);
        (
            self.base.join("users-by-email").join(&prefix),
            format!("users-by-email/{prefix}"),
        )
    }

    /// Lookup file and lock key for an external-login provider.
    pub(crate) fn login_lookup(&self, provider: &str) -> (PathBuf, String) {
        let file = file_safe(provider);
        (
            self.base.join("users-by-login").join(&file),
            format!("users-by-login/{file}"),
        )
    }

    /// Lookup file and lock key for a folded normalized role name.
    pub(crate) fn role_lookup(&self, folded: &str) -> (PathBuf, String) {
        let prefix = lookup_prefix(folded);
        (
            self.base.join("roles-by-name").join(&prefix),
            format!("roles-by-name/{prefix}"),
        )
    }

    /// Composite key for a login lookup entry. Matching is exact on
    /// both parts, like the relational backend. Tabs are rejected in
    /// provider names and keys before writes, which makes this
    /// injective.
    pub(crate) fn login_key(provider: &str, provider_key: &str) -> String {
        format!("{provider}\t{provider_key}")
    }

    // ==================== Records ====================

    pub(crate) async fn load_user_record(&self, id: &str) -> StorageResult<Option<UserRecord>> {
        let path = self.user_path(id)?;
        match read_optional(&path).await? {
            Some(contents) => Ok(Some(record::parse(&contents, "user record")?)),
            None => Ok(None),
        }
    }

    pub(crate) async fn save_user_record(
        &self,
        id: &str,
        record: &UserRecord,
    ) -> StorageResult<()> {
        let path = self.user_path(id)?;
        write_atomic(&path, &record::render(record)?).await
    }

    pub(crate) async fn load_role_record(&self, id: &str) -> StorageResult<Option<RoleRecord>> {
        match read_optional(&self.role_path(id)).await? {
            Some(contents) => Ok(Some(record::parse(&contents, "role record")?)),
            None => Ok(None),
        }
    }

    pub(crate) async fn save_role_record(
        &self,
        id: &str,
        record: &RoleRecord,
    ) -> StorageResult<()> {
        write_atomic(&self.role_path(id), &record::render(record)?).await
    }

    pub(crate) async fn load_user(&self, id: &str) -> StorageResult<Option<User>> {
        Ok(self
            .load_user_record(id)
            .await?
            .map(|record| record.to_user(id)))
    }

    /// Resolves a role name (normalized, case-insensitive) to a role id
    /// through the `roles-by-name` lookup.
    pub(crate) async fn resolve_role_id(&self, role_name: &str) -> StorageResult<Option<String>> {
        let key = fold(role_name);
        let (path, _) = self.role_lookup(&key);
        let map = crate::lookup::load(&path).await?;
        Ok(map.get(&key).cloned())
    }

    /// Walks every bucket directory and returns the ids of all stored
    /// users. Full scan; used by the membership and claim queries that
    /// have no lookup file.
    pub(crate) async fn scan_user_ids(&self) -> StorageResult<Vec<String>> {
        let users = self.base.join("users");
        let mut ids = Vec::new();

        let mut buckets = tokio::fs::read_dir(&users)
            .await
            .map_err(|e| crate::io::io_err("reading users directory", e))?;
        while let Some(bucket) = buckets
            .next_entry()
            .await
            .map_err(|e| crate::io::io_err("reading users directory", e))?
        {
            let bucket_path = bucket.path();
            if !bucket_path.is_dir() {
                continue;
            }
            let mut entries = tokio::fs::read_dir(&bucket_path)
                .await
                .map_err(|e| crate::io::io_err("reading bucket directory", e))?;
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| crate::io::io_err("reading bucket directory", e))?
            {
                let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                    continue;
                };
                // Skip leftovers from interrupted atomic writes.
                if name.ends_with(".tmp") {
                    debug!(file = %name, "Skipping stale temp file");
                    continue;
                }
                ids.push(name);
            }
        }

        Ok(ids)
    }
}

/// Returns the folded email key when a normalized email is present and
/// non-empty.
pub(crate) fn email_key(normalized_email: Option<&str>) -> Option<String> {
    normalized_email
        .filter(|email| !email.is_empty())
        .map(fold)
}

/// Precondition shared by user create/update.
pub(crate) fn require_names(user_name: &str, normalized: &str) -> StorageResult<()> {
    if user_name.is_empty() || normalized.is_empty() {
        return Err(StorageError::invalid_input(
            "user name and normalized user name are required",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_paths_use_prefixes() {
        let ctx = FsContext::new(PathBuf::from("/base"), IdCodec::default());
        let (path, lock) = ctx.name_lookup("alice");
        assert_eq!(path, PathBuf::from("/base/users-by-name/al"));
        assert_eq!(lock, "users-by-name/al");

        let (path, _) = ctx.name_lookup("a");
        assert_eq!(path, PathBuf::from("/base/users-by-name/a"));
    }

    #[test]
    fn test_login_key_is_composite() {
        assert_eq!(FsContext::login_key("Google", "g-1"), "Google\tg-1");
    }

    #[test]
    fn test_email_key_skips_empty() {
        assert_eq!(email_key(None), None);
        assert_eq!(email_key(Some("")), None);
        assert_eq!(email_key(Some("B@E.COM")), Some("b@e.com".to_string()));
    }
}
