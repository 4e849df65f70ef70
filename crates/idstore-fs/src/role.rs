//! Flat-file implementation of the role storage provider.

use std::sync::Arc;

use async_trait::async_trait;
use idstore_core::normalize::fold;
use idstore_core::{Claim, Role, new_concurrency_stamp};
use idstore_storage::role::RoleStore;
use idstore_storage::{StorageError, StorageResult};

use crate::context::FsContext;
use crate::io::remove_optional;
use crate::lookup;
use crate::record::{ClaimRecord, RoleRecord};

/// Flat-file role storage provider.
///
/// One file per role under `roles/`, with a `roles-by-name` lookup for
/// case-insensitive name resolution. Deleting a role scrubs its id from
/// every user record, replicating the relational backend's cascade.
#[derive(Debug, Clone)]
pub struct FsRoleStore {
    ctx: Arc<FsContext>,
}

impl FsRoleStore {
    pub(crate) fn new(ctx: Arc<FsContext>) -> Self {
        Self { ctx }
    }

    async fn read_record(&self, id: &str) -> StorageResult<RoleRecord> {
        self.ctx
            .load_role_record(id)
            .await?
            .ok_or_else(|| StorageError::not_found("role", id))
    }

    async fn index_name(&self, folded: &str, id: &str) -> StorageResult<()> {
        let (path, lock_key) = self.ctx.role_lookup(folded);
        let _guard = self.ctx.locks.acquire(&lock_key).await;
        lookup::insert(&path, folded, id).await
    }

    async fn unindex_name(&self, folded: &str) -> StorageResult<()> {
        let (path, lock_key) = self.ctx.role_lookup(folded);
        let _guard = self.ctx.locks.acquire(&lock_key).await;
        lookup::remove(&path, folded).await
    }

    /// Removes the role id from every user record that references it.
    async fn scrub_memberships(&self, role_id: &str) -> StorageResult<()> {
        for user_id in self.ctx.scan_user_ids().await? {
            let references = self
                .ctx
                .load_user_record(&user_id)
                .await?
                .is_some_and(|record| record.role_ids.iter().any(|id| id == role_id));
            if !references {
                continue;
            }

            // Re-read under the user's write lock; the unlocked peek
            // only avoids locking the whole tree.
            let _guard = self
                .ctx
                .locks
                .acquire(&FsContext::user_lock_key(&user_id))
                .await;
            if let Some(mut record) = self.ctx.load_user_record(&user_id).await? {
                let before = record.role_ids.len();
                record.role_ids.retain(|id| id != role_id);
                if record.role_ids.len() != before {
                    self.ctx.save_user_record(&user_id, &record).await?;
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RoleStore for FsRoleStore {
    async fn create_role(&self, role: &Role) -> StorageResult<Role> {
        let id = self.ctx.decode_id(&role.id)?;
        if role.name.is_empty() || role.normalized_name.is_empty() {
            return Err(StorageError::invalid_input(
                "role name and normalized name are required",
            ));
        }
        let name_key = fold(&role.normalized_name);
        lookup::ensure_line_safe(&name_key)?;

        let mut stored = role.clone();
        stored.id = id.clone();
        if stored.concurrency_stamp.is_empty() {
            stored.concurrency_stamp = new_concurrency_stamp();
        }

        {
            let _guard = self.ctx.locks.acquire(&FsContext::role_lock_key(&id)).await;
            if self.ctx.load_role_record(&id).await?.is_some() {
                return Err(StorageError::already_exists("role", &id));
            }
            self.ctx
                .save_role_record(&id, &RoleRecord::from_role(&stored))
                .await?;
        }

        self.index_name(&name_key, &id).await?;
        Ok(stored)
    }

    async fn update_role(&self, role: &Role) -> StorageResult<Role> {
        let id = self.ctx.decode_id(&role.id)?;
        if role.name.is_empty() || role.normalized_name.is_empty() {
            return Err(StorageError::invalid_input(
                "role name and normalized name are required",
            ));
        }
        let new_key = fold(&role.normalized_name);
        lookup::ensure_line_safe(&new_key)?;

        let mut stored = role.clone();
        stored.id = id.clone();
        stored.concurrency_stamp = new_concurrency_stamp();

        let old_key = {
            let _guard = self.ctx.locks.acquire(&FsContext::role_lock_key(&id)).await;
            let mut record = self.read_record(&id).await?;
            if let Some(current) = &record.concurrency_stamp
                && current != &role.concurrency_stamp
            {
                return Err(StorageError::concurrency_conflict("role", &id));
            }

            let old_key = record.normalized_name.as_deref().map(fold);
            record.apply_role(&stored);
            self.ctx.save_role_record(&id, &record).await?;
            old_key
        };

        if old_key.as_deref() != Some(new_key.as_str()) {
            if let Some(old) = old_key {
                self.unindex_name(&old).await?;
            }
            self.index_name(&new_key, &id).await?;
        }

        Ok(stored)
    }

    async fn delete_role(&self, id: &str) -> StorageResult<()> {
        let id = self.ctx.decode_id(id)?;

        let record = {
            let _guard = self.ctx.locks.acquire(&FsContext::role_lock_key(&id)).await;
            let record = self.read_record(&id).await?;
            remove_optional(&self.ctx.role_path(&id)).await?;
            record
        };

        if let Some(name) = record.normalized_name.as_deref() {
            self.unindex_name(&fold(name)).await?;
        }
        self.scrub_memberships(&id).await?;

        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> StorageResult<Option<Role>> {
        let id = self.ctx.decode_id(id)?;
        Ok(self
            .ctx
            .load_role_record(&id)
            .await?
            .map(|record| record.to_role(&id)))
    }

    async fn find_by_normalized_name(&self, normalized: &str) -> StorageResult<Option<Role>> {
        if normalized.is_empty() {
            return Ok(None);
        }
        match self.ctx.resolve_role_id(normalized).await? {
            Some(id) => self.find_by_id(&id).await,
            None => Ok(None),
        }
    }

    async fn role_name(&self, id: &str) -> StorageResult<Option<String>> {
        let id = self.ctx.decode_id(id)?;
        Ok(self
            .ctx
            .load_role_record(&id)
            .await?
            .and_then(|record| record.name))
    }

    async fn claims_for_role(&self, role_id: &str) -> StorageResult<Vec<Claim>> {
        let role_id = self.ctx.decode_id(role_id)?;
        Ok(self
            .ctx
            .load_role_record(&role_id)
            .await?
            .map(|record| record.claims.iter().map(ClaimRecord::to_claim).collect())
            .unwrap_or_default())
    }

    async fn add_claim(&self, role_id: &str, claim: &Claim) -> StorageResult<()> {
        let role_id = self.ctx.decode_id(role_id)?;
        let _guard = self
            .ctx
            .locks
            .acquire(&FsContext::role_lock_key(&role_id))
            .await;
        let mut record = self.read_record(&role_id).await?;
        record.claims.push(ClaimRecord::from(claim));
        self.ctx.save_role_record(&role_id, &record).await
    }

    async fn remove_claim(&self, role_id: &str, claim: &Claim) -> StorageResult<()> {
        let role_id = self.ctx.decode_id(role_id)?;
        let _guard = self
            .ctx
            .locks
            .acquire(&FsContext::role_lock_key(&role_id))
            .await;
        let mut record = self.read_record(&role_id).await?;
        let before = record.claims.len();
        record.claims.retain(|entry| !entry.matches(claim));
        if record.claims.len() != before {
            self.ctx.save_role_record(&role_id, &record).await?;
        }
        Ok(())
    }
}
