//! Flat-file implementation of the user storage provider.

use std::sync::Arc;

use async_trait::async_trait;
use idstore_core::normalize::fold;
use idstore_core::{Claim, Login, User, new_concurrency_stamp};
use idstore_storage::user::UserStore;
use idstore_storage::{StorageError, StorageResult};
use time::OffsetDateTime;

use crate::context::{FsContext, email_key, require_names};
use crate::io::remove_optional;
use crate::lookup;
use crate::record::{ClaimRecord, LoginRecord, UserRecord};

/// Flat-file user storage provider.
///
/// One file per user under a two-character bucket; memberships, claims
/// and logins live inline in the record. Writers are serialized per
/// file; cascade behavior on delete is replicated manually by scrubbing
/// the affected lookup files.
///
/// A multi-file operation (record plus lookups) is not transactional: a
/// crash between steps can leave a stale lookup entry, which readers
/// treat as a miss. Each individual file write is atomic.
#[derive(Debug, Clone)]
pub struct FsUserStore {
    ctx: Arc<FsContext>,
}

impl FsUserStore {
    pub(crate) fn new(ctx: Arc<FsContext>) -> Self {
        Self { ctx }
    }

    async fn read_record(&self, id: &str) -> StorageResult<UserRecord> {
        self.ctx
            .load_user_record(id)
            .await?
            .ok_or_else(|| StorageError::not_found("user", id))
    }

    /// Load-modify-save of a user record under its write lock.
    async fn with_record<F>(&self, id: &str, mutate: F) -> StorageResult<()>
    where
        F: FnOnce(&mut UserRecord) + Send,
    {
        let id = self.ctx.decode_id(id)?;
        let _guard = self.ctx.locks.acquire(&FsContext::user_lock_key(&id)).await;
        let mut record = self.read_record(&id).await?;
        mutate(&mut record);
        self.ctx.save_user_record(&id, &record).await
    }

    async fn index_name(&self, folded: &str, id: &str) -> StorageResult<()> {
        let (path, lock_key) = self.ctx.name_lookup(folded);
        let _guard = self.ctx.locks.acquire(&lock_key).await;
        lookup::insert(&path, folded, id).await
    }

    async fn unindex_name(&self, folded: &str) -> StorageResult<()> {
        let (path, lock_key) = self.ctx.name_lookup(folded);
        let _guard = self.ctx.locks.acquire(&lock_key).await;
        lookup::remove(&path, folded).await
    }

    async fn index_email(&self, folded: &str, id: &str) -> StorageResult<()> {
        let (path, lock_key) = self.ctx.email_lookup(folded);
        let _guard = self.ctx.locks.acquire(&lock_key).await;
        lookup::insert(&path, folded, id).await
    }

    async fn unindex_email(&self, folded: &str) -> StorageResult<()> {
        let (path, lock_key) = self.ctx.email_lookup(folded);
        let _guard = self.ctx.locks.acquire(&lock_key).await;
        lookup::remove(&path, folded).await
    }

    async fn index_login(&self, provider: &str, provider_key: &str, id: &str) -> StorageResult<()> {
        let (path, lock_key) = self.ctx.login_lookup(provider);
        let _guard = self.ctx.locks.acquire(&lock_key).await;
        lookup::insert(&path, &FsContext::login_key(provider, provider_key), id).await
    }

    async fn unindex_login(&self, provider: &str, provider_key: &str) -> StorageResult<()> {
        let (path, lock_key) = self.ctx.login_lookup(provider);
        let _guard = self.ctx.locks.acquire(&lock_key).await;
        lookup::remove(&path, &FsContext::login_key(provider, provider_key)).await
    }

    /// Loads every user whose record satisfies the filter. Full scan.
    async fn scan_users<F>(&self, keep: F) -> StorageResult<Vec<User>>
    where
        F: Fn(&UserRecord) -> bool + Send,
    {
        let mut users = Vec::new();
        for id in self.ctx.scan_user_ids().await? {
            if let Some(record) = self.ctx.load_user_record(&id).await?
                && keep(&record)
            {
                users.push(record.to_user(&id));
            }
        }
        users.sort_by(|a, b| a.normalized_user_name.cmp(&b.normalized_user_name));
        Ok(users)
    }
}

#[async_trait]
impl UserStore for FsUserStore {
    async fn create_user(&self, user: &User) -> StorageResult<User> {
        let id = self.ctx.decode_id(&user.id)?;
        require_names(&user.user_name, &user.normalized_user_name)?;

        let name_key = fold(&user.normalized_user_name);
        lookup::ensure_line_safe(&name_key)?;
        let email = email_key(user.normalized_email.as_deref());
        if let Some(email) = &email {
            lookup::ensure_line_safe(email)?;
        }

        let mut stored = user.clone();
        stored.id = id.clone();
        if stored.concurrency_stamp.is_empty() {
            stored.concurrency_stamp = new_concurrency_stamp();
        }

        {
            let _guard = self.ctx.locks.acquire(&FsContext::user_lock_key(&id)).await;
            if self.ctx.load_user_record(&id).await?.is_some() {
                return Err(StorageError::already_exists("user", &id));
            }
            self.ctx
                .save_user_record(&id, &UserRecord::from_user(&stored))
                .await?;
        }

        self.index_name(&name_key, &id).await?;
        if let Some(email) = &email {
            self.index_email(email, &id).await?;
        }

        Ok(stored)
    }

    async fn update_user(&self, user: &User) -> StorageResult<User> {
        let id = self.ctx.decode_id(&user.id)?;
        require_names(&user.user_name, &user.normalized_user_name)?;

        let new_name = fold(&user.normalized_user_name);
        lookup::ensure_line_safe(&new_name)?;
        let new_email = email_key(user.normalized_email.as_deref());
        if let Some(email) = &new_email {
            lookup::ensure_line_safe(email)?;
        }

        let mut stored = user.clone();
        stored.id = id.clone();
        stored.concurrency_stamp = new_concurrency_stamp();

        let (old_name, old_email) = {
            let _guard = self.ctx.locks.acquire(&FsContext::user_lock_key(&id)).await;
            let mut record = self.read_record(&id).await?;
            if let Some(current) = &record.concurrency_stamp
                && current != &user.concurrency_stamp
            {
                return Err(StorageError::concurrency_conflict("user", &id));
            }

            let old_name = record.normalized_user_name.as_deref().map(fold);
            let old_email = email_key(record.normalized_email.as_deref());
            record.apply_user(&stored);
            self.ctx.save_user_record(&id, &record).await?;
            (old_name, old_email)
        };

        if old_name.as_deref() != Some(new_name.as_str()) {
            if let Some(old) = old_name {
                self.unindex_name(&old).await?;
            }
            self.index_name(&new_name, &id).await?;
        }
        if old_email != new_email {
            if let Some(old) = old_email {
                self.unindex_email(&old).await?;
            }
            if let Some(new) = &new_email {
                self.index_email(new, &id).await?;
            }
        }

        Ok(stored)
    }

    async fn delete_user(&self, id: &str) -> StorageResult<()> {
        let id = self.ctx.decode_id(id)?;

        let record = {
            let _guard = self.ctx.locks.acquire(&FsContext::user_lock_key(&id)).await;
            let record = self.read_record(&id).await?;
            remove_optional(&self.ctx.user_path(&id)?).await?;
            record
        };

        // Cascade: scrub every lookup that referenced the record.
        if let Some(name) = record.normalized_user_name.as_deref() {
            self.unindex_name(&fold(name)).await?;
        }
        if let Some(email) = email_key(record.normalized_email.as_deref()) {
            self.unindex_email(&email).await?;
        }
        for login in &record.logins {
            self.unindex_login(&login.login_provider, &login.provider_key)
                .await?;
        }

        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> StorageResult<Option<User>> {
        let id = self.ctx.decode_id(id)?;
        self.ctx.load_user(&id).await
    }

    async fn find_by_normalized_username(&self, normalized: &str) -> StorageResult<Option<User>> {
        if normalized.is_empty() {
            return Ok(None);
        }
        let key = fold(normalized);
        let (path, _) = self.ctx.name_lookup(&key);
        let map = lookup::load(&path).await?;
        match map.get(&key) {
            Some(id) => self.ctx.load_user(id).await,
            None => Ok(None),
        }
    }

    async fn find_by_normalized_email(&self, normalized: &str) -> StorageResult<Option<User>> {
        if normalized.is_empty() {
            return Ok(None);
        }
        let key = fold(normalized);
        let (path, _) = self.ctx.email_lookup(&key);
        let map = lookup::load(&path).await?;
        match map.get(&key) {
            Some(id) => self.ctx.load_user(id).await,
            None => Ok(None),
        }
    }

    async fn find_by_login(
        &self,
        provider: &str,
        provider_key: &str,
    ) -> StorageResult<Option<User>> {
        if provider.is_empty() || provider_key.is_empty() {
            return Ok(None);
        }
        let (path, _) = self.ctx.login_lookup(provider);
        let map = lookup::load(&path).await?;
        match map.get(&FsContext::login_key(provider, provider_key)) {
            Some(id) => self.ctx.load_user(id).await,
            None => Ok(None),
        }
    }

    async fn user_name(&self, id: &str) -> StorageResult<Option<String>> {
        let id = self.ctx.decode_id(id)?;
        Ok(self
            .ctx
            .load_user_record(&id)
            .await?
            .and_then(|record| record.user_name))
    }

    async fn set_user_name(&self, id: &str, user_name: &str) -> StorageResult<()> {
        if user_name.is_empty() {
            return Err(StorageError::invalid_input("user name is required"));
        }
        let user_name = user_name.to_string();
        self.with_record(id, |record| record.user_name = Some(user_name))
            .await
    }

    async fn set_normalized_user_name(&self, id: &str, normalized: &str) -> StorageResult<()> {
        let id = self.ctx.decode_id(id)?;
        if normalized.is_empty() {
            return Err(StorageError::invalid_input(
                "normalized user name is required",
            ));
        }
        let new_key = fold(normalized);
        lookup::ensure_line_safe(&new_key)?;

        let old_key = {
            let _guard = self.ctx.locks.acquire(&FsContext::user_lock_key(&id)).await;
            let mut record = self.read_record(&id).await?;
            let old_key = record.normalized_user_name.as_deref().map(fold);
            record.normalized_user_name = Some(normalized.to_string());
            self.ctx.save_user_record(&id, &record).await?;
            old_key
        };

        if let Some(old) = old_key
            && old != new_key
        {
            self.unindex_name(&old).await?;
        }
        self.index_name(&new_key, &id).await
    }

    async fn password_hash(&self, id: &str) -> StorageResult<Option<String>> {
        let id = self.ctx.decode_id(id)?;
        Ok(self.read_record(&id).await?.password_hash)
    }

    async fn set_password_hash(&self, id: &str, hash: Option<&str>) -> StorageResult<()> {
        let hash = hash.map(str::to_string);
        self.with_record(id, |record| record.password_hash = hash)
            .await
    }

    async fn security_stamp(&self, id: &str) -> StorageResult<Option<String>> {
        let id = self.ctx.decode_id(id)?;
        Ok(self.read_record(&id).await?.security_stamp)
    }

    async fn set_security_stamp(&self, id: &str, stamp: &str) -> StorageResult<()> {
        let stamp = stamp.to_string();
        self.with_record(id, |record| record.security_stamp = Some(stamp))
            .await
    }

    async fn email(&self, id: &str) -> StorageResult<Option<String>> {
        let id = self.ctx.decode_id(id)?;
        Ok(self.read_record(&id).await?.email)
    }

    async fn set_email(&self, id: &str, email: Option<&str>) -> StorageResult<()> {
        let email = email.map(str::to_string);
        self.with_record(id, |record| record.email = email).await
    }

    async fn set_normalized_email(&self, id: &str, normalized: Option<&str>) -> StorageResult<()> {
        let id = self.ctx.decode_id(id)?;
        let new_key = email_key(normalized);
        if let Some(new) = &new_key {
            lookup::ensure_line_safe(new)?;
        }

        let old_key = {
            let _guard = self.ctx.locks.acquire(&FsContext::user_lock_key(&id)).await;
            let mut record = self.read_record(&id).await?;
            let old_key = email_key(record.normalized_email.as_deref());
            record.normalized_email = normalized.map(str::to_string);
            self.ctx.save_user_record(&id, &record).await?;
            old_key
        };

        if old_key != new_key {
            if let Some(old) = old_key {
                self.unindex_email(&old).await?;
            }
            if let Some(new) = &new_key {
                self.index_email(new, &id).await?;
            }
        }
        Ok(())
    }

    async fn email_confirmed(&self, id: &str) -> StorageResult<bool> {
        let id = self.ctx.decode_id(id)?;
        Ok(self.read_record(&id).await?.email_confirmed)
    }

    async fn set_email_confirmed(&self, id: &str, confirmed: bool) -> StorageResult<()> {
        self.with_record(id, |record| record.email_confirmed = confirmed)
            .await
    }

    async fn phone_number(&self, id: &str) -> StorageResult<Option<String>> {
        let id = self.ctx.decode_id(id)?;
        Ok(self.read_record(&id).await?.phone_number)
    }

    async fn set_phone_number(&self, id: &str, phone: Option<&str>) -> StorageResult<()> {
        let phone = phone.map(str::to_string);
        self.with_record(id, |record| record.phone_number = phone)
            .await
    }

    async fn phone_number_confirmed(&self, id: &str) -> StorageResult<bool> {
        let id = self.ctx.decode_id(id)?;
        Ok(self.read_record(&id).await?.phone_number_confirmed)
    }

    async fn set_phone_number_confirmed(&self, id: &str, confirmed: bool) -> StorageResult<()> {
        self.with_record(id, |record| record.phone_number_confirmed = confirmed)
            .await
    }

    async fn two_factor_enabled(&self, id: &str) -> StorageResult<bool> {
        let id = self.ctx.decode_id(id)?;
        Ok(self.read_record(&id).await?.two_factor_enabled)
    }

    async fn set_two_factor_enabled(&self, id: &str, enabled: bool) -> StorageResult<()> {
        self.with_record(id, |record| record.two_factor_enabled = enabled)
            .await
    }

    async fn lockout_end(&self, id: &str) -> StorageResult<Option<OffsetDateTime>> {
        let id = self.ctx.decode_id(id)?;
        Ok(self.read_record(&id).await?.lockout_end)
    }

    async fn set_lockout_end(&self, id: &str, end: Option<OffsetDateTime>) -> StorageResult<()> {
        self.with_record(id, |record| record.lockout_end = end).await
    }

    async fn lockout_enabled(&self, id: &str) -> StorageResult<bool> {
        let id = self.ctx.decode_id(id)?;
        Ok(self.read_record(&id).await?.lockout_enabled)
    }

    async fn set_lockout_enabled(&self, id: &str, enabled: bool) -> StorageResult<()> {
        self.with_record(id, |record| record.lockout_enabled = enabled)
            .await
    }

    async fn access_failed_count(&self, id: &str) -> StorageResult<i32> {
        let id = self.ctx.decode_id(id)?;
        Ok(self.read_record(&id).await?.access_failed_count)
    }

    async fn increment_access_failed_count(&self, id: &str) -> StorageResult<i32> {
        let id = self.ctx.decode_id(id)?;
        let _guard = self.ctx.locks.acquire(&FsContext::user_lock_key(&id)).await;
        let mut record = self.read_record(&id).await?;
        record.access_failed_count += 1;
        self.ctx.save_user_record(&id, &record).await?;
        Ok(record.access_failed_count)
    }

    async fn reset_access_failed_count(&self, id: &str) -> StorageResult<()> {
        self.with_record(id, |record| record.access_failed_count = 0)
            .await
    }

    async fn add_to_role(&self, user_id: &str, role_name: &str) -> StorageResult<()> {
        let user_id = self.ctx.decode_id(user_id)?;
        if role_name.trim().is_empty() {
            return Err(StorageError::invalid_input("role name is required"));
        }
        let Some(role_id) = self.ctx.resolve_role_id(role_name).await? else {
            return Err(StorageError::not_found("role", role_name));
        };

        let _guard = self
            .ctx
            .locks
            .acquire(&FsContext::user_lock_key(&user_id))
            .await;
        let mut record = self.read_record(&user_id).await?;
        if !record.role_ids.contains(&role_id) {
            record.role_ids.push(role_id);
            self.ctx.save_user_record(&user_id, &record).await?;
        }
        Ok(())
    }

    async fn remove_from_role(&self, user_id: &str, role_name: &str) -> StorageResult<()> {
        let user_id = self.ctx.decode_id(user_id)?;
        if role_name.trim().is_empty() {
            return Err(StorageError::invalid_input("role name is required"));
        }
        let Some(role_id) = self.ctx.resolve_role_id(role_name).await? else {
            return Ok(());
        };

        let _guard = self
            .ctx
            .locks
            .acquire(&FsContext::user_lock_key(&user_id))
            .await;
        let mut record = self.read_record(&user_id).await?;
        if record.role_ids.contains(&role_id) {
            record.role_ids.retain(|id| id != &role_id);
            self.ctx.save_user_record(&user_id, &record).await?;
        }
        Ok(())
    }

    async fn role_names_for_user(&self, user_id: &str) -> StorageResult<Vec<String>> {
        let user_id = self.ctx.decode_id(user_id)?;
        let Some(record) = self.ctx.load_user_record(&user_id).await? else {
            return Ok(Vec::new());
        };

        let mut names = Vec::with_capacity(record.role_ids.len());
        for role_id in &record.role_ids {
            if let Some(role) = self.ctx.load_role_record(role_id).await? {
                names.push(role.name.unwrap_or_default());
            }
        }
        names.sort_unstable();
        Ok(names)
    }

    async fn is_in_role(&self, user_id: &str, role_name: &str) -> StorageResult<bool> {
        let user_id = self.ctx.decode_id(user_id)?;
        if role_name.trim().is_empty() {
            return Err(StorageError::invalid_input("role name is required"));
        }
        let Some(role_id) = self.ctx.resolve_role_id(role_name).await? else {
            return Ok(false);
        };
        Ok(self
            .ctx
            .load_user_record(&user_id)
            .await?
            .is_some_and(|record| record.role_ids.contains(&role_id)))
    }

    async fn users_in_role(&self, role_name: &str) -> StorageResult<Vec<User>> {
        if role_name.trim().is_empty() {
            return Err(StorageError::invalid_input("role name is required"));
        }
        let Some(role_id) = self.ctx.resolve_role_id(role_name).await? else {
            return Ok(Vec::new());
        };
        self.scan_users(|record| record.role_ids.contains(&role_id))
            .await
    }

    async fn claims_for_user(&self, user_id: &str) -> StorageResult<Vec<Claim>> {
        let user_id = self.ctx.decode_id(user_id)?;
        Ok(self
            .ctx
            .load_user_record(&user_id)
            .await?
            .map(|record| record.claims.iter().map(ClaimRecord::to_claim).collect())
            .unwrap_or_default())
    }

    async fn add_claims(&self, user_id: &str, claims: &[Claim]) -> StorageResult<()> {
        if claims.is_empty() {
            return Ok(());
        }
        let new: Vec<ClaimRecord> = claims.iter().map(ClaimRecord::from).collect();
        self.with_record(user_id, |record| record.claims.extend(new))
            .await
    }

    async fn replace_claim(
        &self,
        user_id: &str,
        claim: &Claim,
        new_claim: &Claim,
    ) -> StorageResult<()> {
        let claim = claim.clone();
        let replacement = ClaimRecord::from(new_claim);
        self.with_record(user_id, move |record| {
            for entry in &mut record.claims {
                if entry.matches(&claim) {
                    *entry = replacement.clone();
                }
            }
        })
        .await
    }

    async fn remove_claims(&self, user_id: &str, claims: &[Claim]) -> StorageResult<()> {
        if claims.is_empty() {
            return Ok(());
        }
        let remove = claims.to_vec();
        self.with_record(user_id, move |record| {
            record
                .claims
                .retain(|entry| !remove.iter().any(|claim| entry.matches(claim)));
        })
        .await
    }

    async fn users_for_claim(&self, claim: &Claim) -> StorageResult<Vec<User>> {
        self.scan_users(|record| record.claims.iter().any(|entry| entry.matches(claim)))
            .await
    }

    async fn add_login(&self, user_id: &str, login: &Login) -> StorageResult<()> {
        let user_id = self.ctx.decode_id(user_id)?;
        if login.login_provider.is_empty() || login.provider_key.is_empty() {
            return Err(StorageError::invalid_input(
                "login provider and provider key are required",
            ));
        }
        lookup::ensure_line_safe(&login.login_provider)?;
        lookup::ensure_line_safe(&login.provider_key)?;

        {
            let _guard = self
                .ctx
                .locks
                .acquire(&FsContext::user_lock_key(&user_id))
                .await;
            let mut record = self.read_record(&user_id).await?;
            if record.logins.iter().any(|entry| {
                entry.login_provider == login.login_provider
                    && entry.provider_key == login.provider_key
            }) {
                return Err(StorageError::already_exists(
                    "login",
                    format!("{}/{}", login.login_provider, login.provider_key),
                ));
            }
            record.logins.push(LoginRecord::from(login));
            self.ctx.save_user_record(&user_id, &record).await?;
        }

        self.index_login(&login.login_provider, &login.provider_key, &user_id)
            .await
    }

    async fn remove_login(
        &self,
        user_id: &str,
        provider: &str,
        provider_key: &str,
    ) -> StorageResult<()> {
        let user_id = self.ctx.decode_id(user_id)?;

        let removed = {
            let _guard = self
                .ctx
                .locks
                .acquire(&FsContext::user_lock_key(&user_id))
                .await;
            let mut record = self.read_record(&user_id).await?;
            let before = record.logins.len();
            record.logins.retain(|entry| {
                !(entry.login_provider == provider && entry.provider_key == provider_key)
            });
            let removed = record.logins.len() != before;
            if removed {
                self.ctx.save_user_record(&user_id, &record).await?;
            }
            removed
        };

        if removed {
            self.unindex_login(provider, provider_key).await?;
        }
        Ok(())
    }

    async fn logins_for_user(&self, user_id: &str) -> StorageResult<Vec<Login>> {
        let user_id = self.ctx.decode_id(user_id)?;
        Ok(self
            .ctx
            .load_user_record(&user_id)
            .await?
            .map(|record| record.logins.iter().map(LoginRecord::to_login).collect())
            .unwrap_or_default())
    }
}
