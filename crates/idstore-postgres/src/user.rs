//! PostgreSQL implementation of the user storage provider.

use async_trait::async_trait;
use idstore_core::{Claim, IdCodec, Login, User, new_concurrency_stamp};
use idstore_storage::user::UserStore;
use idstore_storage::{StorageError, StorageResult};
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_postgres::PgPool;
use time::OffsetDateTime;

use crate::error::{is_foreign_key_violation, is_unique_violation, map_sqlx_error};

/// Column list shared by every user SELECT, in table order.
const USER_COLUMNS: &str = "id, user_name, normalized_user_name, email, normalized_email, \
     email_confirmed, password_hash, security_stamp, concurrency_stamp, phone_number, \
     phone_number_confirmed, two_factor_enabled, lockout_end, lockout_enabled, \
     access_failed_count";

type UserTuple = (
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    bool,
    Option<String>,
    Option<String>,
    String,
    Option<String>,
    bool,
    bool,
    Option<OffsetDateTime>,
    bool,
    i32,
);

fn user_from_tuple(row: UserTuple) -> User {
    User {
        id: row.0,
        user_name: row.1,
        normalized_user_name: row.2,
        email: row.3,
        normalized_email: row.4,
        email_confirmed: row.5,
        password_hash: row.6,
        security_stamp: row.7,
        concurrency_stamp: row.8,
        phone_number: row.9,
        phone_number_confirmed: row.10,
        two_factor_enabled: row.11,
        lockout_end: row.12,
        lockout_enabled: row.13,
        access_failed_count: row.14,
    }
}

/// PostgreSQL user storage provider.
///
/// Each operation is a single statement (or a short, fixed sequence of
/// statements) against the pooled connection; cascade semantics come
/// from the schema's foreign keys.
#[derive(Debug, Clone)]
pub struct PgUserStore {
    pool: PgPool,
    codec: IdCodec,
}

impl PgUserStore {
    /// Creates a new PostgreSQL user store over the given pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            codec: IdCodec::default(),
        }
    }

    /// Creates a store with a custom id conversion policy.
    #[must_use]
    pub fn with_codec(pool: PgPool, codec: IdCodec) -> Self {
        Self { pool, codec }
    }

    fn decode_id(&self, raw: &str) -> StorageResult<String> {
        Ok(self.codec.decode(raw)?)
    }

    async fn fetch_scalar<T>(&self, sql: &str, id: &str) -> StorageResult<T>
    where
        T: Send + Unpin + for<'r> sqlx_core::decode::Decode<'r, sqlx_postgres::Postgres>,
        T: sqlx_core::types::Type<sqlx_postgres::Postgres>,
    {
        let row: Option<(T,)> = query_as(sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(|(value,)| value)
            .ok_or_else(|| StorageError::not_found("user", id))
    }

}

/// Maps a zero-row mutation result to a user not-found error.
fn require_affected(
    result: Result<sqlx_postgres::PgQueryResult, sqlx_core::error::Error>,
    id: &str,
) -> StorageResult<()> {
    let result = result.map_err(map_sqlx_error)?;
    if result.rows_affected() == 0 {
        return Err(StorageError::not_found("user", id));
    }
    Ok(())
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create_user(&self, user: &User) -> StorageResult<User> {
        let id = self.decode_id(&user.id)?;
        if user.user_name.is_empty() || user.normalized_user_name.is_empty() {
            return Err(StorageError::invalid_input(
                "user name and normalized user name are required",
            ));
        }

        let mut stored = user.clone();
        stored.id = id;
        if stored.concurrency_stamp.is_empty() {
            stored.concurrency_stamp = new_concurrency_stamp();
        }

        let sql = format!(
            "INSERT INTO users ({USER_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)"
        );
        query(&sql)
            .bind(&stored.id)
            .bind(&stored.user_name)
            .bind(&stored.normalized_user_name)
            .bind(stored.email.as_deref())
            .bind(stored.normalized_email.as_deref())
            .bind(stored.email_confirmed)
            .bind(stored.password_hash.as_deref())
            .bind(stored.security_stamp.as_deref())
            .bind(&stored.concurrency_stamp)
            .bind(stored.phone_number.as_deref())
            .bind(stored.phone_number_confirmed)
            .bind(stored.two_factor_enabled)
            .bind(stored.lockout_end)
            .bind(stored.lockout_enabled)
            .bind(stored.access_failed_count)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StorageError::already_exists("user", &stored.id)
                } else {
                    map_sqlx_error(e)
                }
            })?;

        Ok(stored)
    }

    async fn update_user(&self, user: &User) -> StorageResult<User> {
        let id = self.decode_id(&user.id)?;
        if user.user_name.is_empty() || user.normalized_user_name.is_empty() {
            return Err(StorageError::invalid_input(
                "user name and normalized user name are required",
            ));
        }

        let mut stored = user.clone();
        stored.id = id;
        stored.concurrency_stamp = new_concurrency_stamp();

        let result = query(
            "UPDATE users SET \
                user_name = $2, normalized_user_name = $3, email = $4, normalized_email = $5, \
                email_confirmed = $6, password_hash = $7, security_stamp = $8, \
                concurrency_stamp = $9, phone_number = $10, phone_number_confirmed = $11, \
                two_factor_enabled = $12, lockout_end = $13, lockout_enabled = $14, \
                access_failed_count = $15 \
             WHERE id = $1 AND concurrency_stamp = $16",
        )
        .bind(&stored.id)
        .bind(&stored.user_name)
        .bind(&stored.normalized_user_name)
        .bind(stored.email.as_deref())
        .bind(stored.normalized_email.as_deref())
        .bind(stored.email_confirmed)
        .bind(stored.password_hash.as_deref())
        .bind(stored.security_stamp.as_deref())
        .bind(&stored.concurrency_stamp)
        .bind(stored.phone_number.as_deref())
        .bind(stored.phone_number_confirmed)
        .bind(stored.two_factor_enabled)
        .bind(stored.lockout_end)
        .bind(stored.lockout_enabled)
        .bind(stored.access_failed_count)
        .bind(&user.concurrency_stamp)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            // Zero rows is either a missing record or a stale stamp.
            let current: Option<(String,)> =
                query_as("SELECT concurrency_stamp FROM users WHERE id = $1")
                    .bind(&stored.id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;
            return match current {
                None => Err(StorageError::not_found("user", &stored.id)),
                Some(_) => Err(StorageError::concurrency_conflict("user", &stored.id)),
            };
        }

        Ok(stored)
    }

    async fn delete_user(&self, id: &str) -> StorageResult<()> {
        let id = self.decode_id(id)?;
        // Claims, logins and memberships are removed by cascade.
        let result = query("DELETE FROM users WHERE id = $1")
            .bind(&id)
            .execute(&self.pool)
            .await;
        require_affected(result, &id)
    }

    async fn find_by_id(&self, id: &str) -> StorageResult<Option<User>> {
        let id = self.decode_id(id)?;
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row: Option<UserTuple> = query_as(&sql)
            .bind(&id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(user_from_tuple))
    }

    async fn find_by_normalized_username(&self, normalized: &str) -> StorageResult<Option<User>> {
        if normalized.is_empty() {
            return Ok(None);
        }
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE LOWER(normalized_user_name) = LOWER($1)"
        );
        let row: Option<UserTuple> = query_as(&sql)
            .bind(normalized)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(user_from_tuple))
    }

    async fn find_by_normalized_email(&self, normalized: &str) -> StorageResult<Option<User>> {
        if normalized.is_empty() {
            return Ok(None);
        }
        let sql =
            format!("SELECT {USER_COLUMNS} FROM users WHERE LOWER(normalized_email) = LOWER($1)");
        let row: Option<UserTuple> = query_as(&sql)
            .bind(normalized)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(user_from_tuple))
    }

    async fn find_by_login(
        &self,
        provider: &str,
        provider_key: &str,
    ) -> StorageResult<Option<User>> {
        if provider.is_empty() || provider_key.is_empty() {
            return Ok(None);
        }
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id IN \
             (SELECT user_id FROM user_logins WHERE login_provider = $1 AND provider_key = $2)"
        );
        let row: Option<UserTuple> = query_as(&sql)
            .bind(provider)
            .bind(provider_key)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(user_from_tuple))
    }

    async fn user_name(&self, id: &str) -> StorageResult<Option<String>> {
        let id = self.decode_id(id)?;
        let row: Option<(String,)> = query_as("SELECT user_name FROM users WHERE id = $1")
            .bind(&id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(|(name,)| name))
    }

    async fn set_user_name(&self, id: &str, user_name: &str) -> StorageResult<()> {
        let id = self.decode_id(id)?;
        if user_name.is_empty() {
            return Err(StorageError::invalid_input("user name is required"));
        }
        let result = query("UPDATE users SET user_name = $2 WHERE id = $1")
            .bind(&id)
            .bind(user_name)
            .execute(&self.pool)
            .await;
        require_affected(result, &id)
    }

    async fn set_normalized_user_name(&self, id: &str, normalized: &str) -> StorageResult<()> {
        let id = self.decode_id(id)?;
        if normalized.is_empty() {
            return Err(StorageError::invalid_input(
                "normalized user name is required",
            ));
        }
        let result = query("UPDATE users SET normalized_user_name = $2 WHERE id = $1")
            .bind(&id)
            .bind(normalized)
            .execute(&self.pool)
            .await;
        require_affected(result, &id)
    }

    async fn password_hash(&self, id: &str) -> StorageResult<Option<String>> {
        let id = self.decode_id(id)?;
        self.fetch_scalar("SELECT password_hash FROM users WHERE id = $1", &id)
            .await
    }

    async fn set_password_hash(&self, id: &str, hash: Option<&str>) -> StorageResult<()> {
        let id = self.decode_id(id)?;
        let result = query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(&id)
            .bind(hash)
            .execute(&self.pool)
            .await;
        require_affected(result, &id)
    }

    async fn security_stamp(&self, id: &str) -> StorageResult<Option<String>> {
        let id = self.decode_id(id)?;
        self.fetch_scalar("SELECT security_stamp FROM users WHERE id = $1", &id)
            .await
    }

    async fn set_security_stamp(&self, id: &str, stamp: &str) -> StorageResult<()> {
        let id = self.decode_id(id)?;
        let result = query("UPDATE users SET security_stamp = $2 WHERE id = $1")
            .bind(&id)
            .bind(stamp)
            .execute(&self.pool)
            .await;
        require_affected(result, &id)
    }

    async fn email(&self, id: &str) -> StorageResult<Option<String>> {
        let id = self.decode_id(id)?;
        self.fetch_scalar("SELECT email FROM users WHERE id = $1", &id)
            .await
    }

    async fn set_email(&self, id: &str, email: Option<&str>) -> StorageResult<()> {
        let id = self.decode_id(id)?;
        let result = query("UPDATE users SET email = $2 WHERE id = $1")
            .bind(&id)
            .bind(email)
            .execute(&self.pool)
            .await;
        require_affected(result, &id)
    }

    async fn set_normalized_email(&self, id: &str, normalized: Option<&str>) -> StorageResult<()> {
        let id = self.decode_id(id)?;
        let result = query("UPDATE users SET normalized_email = $2 WHERE id = $1")
            .bind(&id)
            .bind(normalized)
            .execute(&self.pool)
            .await;
        require_affected(result, &id)
    }

    async fn email_confirmed(&self, id: &str) -> StorageResult<bool> {
        let id = self.decode_id(id)?;
        self.fetch_scalar("SELECT email_confirmed FROM users WHERE id = $1", &id)
            .await
    }

    async fn set_email_confirmed(&self, id: &str, confirmed: bool) -> StorageResult<()> {
        let id = self.decode_id(id)?;
        let result = query("UPDATE users SET email_confirmed = $2 WHERE id = $1")
            .bind(&id)
            .bind(confirmed)
            .execute(&self.pool)
            .await;
        require_affected(result, &id)
    }

    async fn phone_number(&self, id: &str) -> StorageResult<Option<String>> {
        let id = self.decode_id(id)?;
        self.fetch_scalar("SELECT phone_number FROM users WHERE id = $1", &id)
            .await
    }

    async fn set_phone_number(&self, id: &str, phone: Option<&str>) -> StorageResult<()> {
        let id = self.decode_id(id)?;
        let result = query("UPDATE users SET phone_number = $2 WHERE id = $1")
            .bind(&id)
            .bind(phone)
            .execute(&self.pool)
            .await;
        require_affected(result, &id)
    }

    async fn phone_number_confirmed(&self, id: &str) -> StorageResult<bool> {
        let id = self.decode_id(id)?;
        self.fetch_scalar("SELECT phone_number_confirmed FROM users WHERE id = $1", &id)
            .await
    }

    async fn set_phone_number_confirmed(&self, id: &str, confirmed: bool) -> StorageResult<()> {
        let id = self.decode_id(id)?;
        let result = query("UPDATE users SET phone_number_confirmed = $2 WHERE id = $1")
            .bind(&id)
            .bind(confirmed)
            .execute(&self.pool)
            .await;
        require_affected(result, &id)
    }

    async fn two_factor_enabled(&self, id: &str) -> StorageResult<bool> {
        let id = self.decode_id(id)?;
        self.fetch_scalar("SELECT two_factor_enabled FROM users WHERE id = $1", &id)
            .await
    }

    async fn set_two_factor_enabled(&self, id: &str, enabled: bool) -> StorageResult<()> {
        let id = self.decode_id(id)?;
        let result = query("UPDATE users SET two_factor_enabled = $2 WHERE id = $1")
            .bind(&id)
            .bind(enabled)
            .execute(&self.pool)
            .await;
        require_affected(result, &id)
    }

    async fn lockout_end(&self, id: &str) -> StorageResult<Option<OffsetDateTime>> {
        let id = self.decode_id(id)?;
        self.fetch_scalar("SELECT lockout_end FROM users WHERE id = $1", &id)
            .await
    }

    async fn set_lockout_end(&self, id: &str, end: Option<OffsetDateTime>) -> StorageResult<()> {
        let id = self.decode_id(id)?;
        let result = query("UPDATE users SET lockout_end = $2 WHERE id = $1")
            .bind(&id)
            .bind(end)
            .execute(&self.pool)
            .await;
        require_affected(result, &id)
    }

    async fn lockout_enabled(&self, id: &str) -> StorageResult<bool> {
        let id = self.decode_id(id)?;
        self.fetch_scalar("SELECT lockout_enabled FROM users WHERE id = $1", &id)
            .await
    }

    async fn set_lockout_enabled(&self, id: &str, enabled: bool) -> StorageResult<()> {
        let id = self.decode_id(id)?;
        let result = query("UPDATE users SET lockout_enabled = $2 WHERE id = $1")
            .bind(&id)
            .bind(enabled)
            .execute(&self.pool)
            .await;
        require_affected(result, &id)
    }

    async fn access_failed_count(&self, id: &str) -> StorageResult<i32> {
        let id = self.decode_id(id)?;
        self.fetch_scalar("SELECT access_failed_count FROM users WHERE id = $1", &id)
            .await
    }

    async fn increment_access_failed_count(&self, id: &str) -> StorageResult<i32> {
        let id = self.decode_id(id)?;
        let row: Option<(i32,)> = query_as(
            "UPDATE users SET access_failed_count = access_failed_count + 1 \
             WHERE id = $1 RETURNING access_failed_count",
        )
        .bind(&id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(|(count,)| count)
            .ok_or_else(|| StorageError::not_found("user", &id))
    }

    async fn reset_access_failed_count(&self, id: &str) -> StorageResult<()> {
        let id = self.decode_id(id)?;
        let result = query("UPDATE users SET access_failed_count = 0 WHERE id = $1")
            .bind(&id)
            .execute(&self.pool)
            .await;
        require_affected(result, &id)
    }

    async fn add_to_role(&self, user_id: &str, role_name: &str) -> StorageResult<()> {
        let user_id = self.decode_id(user_id)?;
        if role_name.trim().is_empty() {
            return Err(StorageError::invalid_input("role name is required"));
        }

        let role: Option<(String,)> =
            query_as("SELECT id FROM roles WHERE LOWER(normalized_name) = LOWER($1)")
                .bind(role_name)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
        let Some((role_id,)) = role else {
            return Err(StorageError::not_found("role", role_name));
        };

        query("INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(&user_id)
            .bind(&role_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    StorageError::not_found("user", &user_id)
                } else {
                    map_sqlx_error(e)
                }
            })?;

        Ok(())
    }

    async fn remove_from_role(&self, user_id: &str, role_name: &str) -> StorageResult<()> {
        let user_id = self.decode_id(user_id)?;
        if role_name.trim().is_empty() {
            return Err(StorageError::invalid_input("role name is required"));
        }

        query(
            "DELETE FROM user_roles WHERE user_id = $1 AND role_id IN \
             (SELECT id FROM roles WHERE LOWER(normalized_name) = LOWER($2))",
        )
        .bind(&user_id)
        .bind(role_name)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn role_names_for_user(&self, user_id: &str) -> StorageResult<Vec<String>> {
        let user_id = self.decode_id(user_id)?;
        let rows: Vec<(String,)> = query_as(
            "SELECT r.name FROM roles r \
             JOIN user_roles ur ON ur.role_id = r.id \
             WHERE ur.user_id = $1 \
             ORDER BY r.name",
        )
        .bind(&user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn is_in_role(&self, user_id: &str, role_name: &str) -> StorageResult<bool> {
        let user_id = self.decode_id(user_id)?;
        if role_name.trim().is_empty() {
            return Err(StorageError::invalid_input("role name is required"));
        }

        let row: (bool,) = query_as(
            "SELECT EXISTS (
                SELECT FROM user_roles ur
                JOIN roles r ON r.id = ur.role_id
                WHERE ur.user_id = $1 AND LOWER(r.normalized_name) = LOWER($2)
            )",
        )
        .bind(&user_id)
        .bind(role_name)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.0)
    }

    async fn users_in_role(&self, role_name: &str) -> StorageResult<Vec<User>> {
        if role_name.trim().is_empty() {
            return Err(StorageError::invalid_input("role name is required"));
        }
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id IN \
             (SELECT user_id FROM user_roles WHERE role_id IN \
              (SELECT id FROM roles WHERE LOWER(normalized_name) = LOWER($1))) \
             ORDER BY normalized_user_name"
        );
        let rows: Vec<UserTuple> = query_as(&sql)
            .bind(role_name)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(user_from_tuple).collect())
    }

    async fn claims_for_user(&self, user_id: &str) -> StorageResult<Vec<Claim>> {
        let user_id = self.decode_id(user_id)?;
        let rows: Vec<(Option<String>, Option<String>)> =
            query_as("SELECT claim_type, claim_value FROM user_claims WHERE user_id = $1")
                .bind(&user_id)
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        Ok(rows
            .into_iter()
            .map(|(claim_type, claim_value)| {
                Claim::new(claim_type.unwrap_or_default(), claim_value.unwrap_or_default())
            })
            .collect())
    }

    async fn add_claims(&self, user_id: &str, claims: &[Claim]) -> StorageResult<()> {
        let user_id = self.decode_id(user_id)?;
        for claim in claims {
            query("INSERT INTO user_claims (claim_type, claim_value, user_id) VALUES ($1, $2, $3)")
                .bind(&claim.claim_type)
                .bind(&claim.claim_value)
                .bind(&user_id)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    if is_foreign_key_violation(&e) {
                        StorageError::not_found("user", &user_id)
                    } else {
                        map_sqlx_error(e)
                    }
                })?;
        }
        Ok(())
    }

    async fn replace_claim(
        &self,
        user_id: &str,
        claim: &Claim,
        new_claim: &Claim,
    ) -> StorageResult<()> {
        let user_id = self.decode_id(user_id)?;
        query(
            "UPDATE user_claims SET claim_type = $4, claim_value = $5 \
             WHERE user_id = $1 AND claim_type = $2 AND claim_value = $3",
        )
        .bind(&user_id)
        .bind(&claim.claim_type)
        .bind(&claim.claim_value)
        .bind(&new_claim.claim_type)
        .bind(&new_claim.claim_value)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn remove_claims(&self, user_id: &str, claims: &[Claim]) -> StorageResult<()> {
        let user_id = self.decode_id(user_id)?;
        for claim in claims {
            query(
                "DELETE FROM user_claims \
                 WHERE user_id = $1 AND claim_type = $2 AND claim_value = $3",
            )
            .bind(&user_id)
            .bind(&claim.claim_type)
            .bind(&claim.claim_value)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        }
        Ok(())
    }

    async fn users_for_claim(&self, claim: &Claim) -> StorageResult<Vec<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id IN \
             (SELECT user_id FROM user_claims WHERE claim_type = $1 AND claim_value = $2) \
             ORDER BY normalized_user_name"
        );
        let rows: Vec<UserTuple> = query_as(&sql)
            .bind(&claim.claim_type)
            .bind(&claim.claim_value)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(user_from_tuple).collect())
    }

    async fn add_login(&self, user_id: &str, login: &Login) -> StorageResult<()> {
        let user_id = self.decode_id(user_id)?;
        if login.login_provider.is_empty() || login.provider_key.is_empty() {
            return Err(StorageError::invalid_input(
                "login provider and provider key are required",
            ));
        }

        query(
            "INSERT INTO user_logins (user_id, login_provider, provider_key, display_name) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(&user_id)
        .bind(&login.login_provider)
        .bind(&login.provider_key)
        .bind(&login.display_name)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StorageError::already_exists(
                    "login",
                    format!("{}/{}", login.login_provider, login.provider_key),
                )
            } else if is_foreign_key_violation(&e) {
                StorageError::not_found("user", &user_id)
            } else {
                map_sqlx_error(e)
            }
        })?;

        Ok(())
    }

    async fn remove_login(
        &self,
        user_id: &str,
        provider: &str,
        provider_key: &str,
    ) -> StorageResult<()> {
        let user_id = self.decode_id(user_id)?;
        query(
            "DELETE FROM user_logins \
             WHERE user_id = $1 AND login_provider = $2 AND provider_key = $3",
        )
        .bind(&user_id)
        .bind(provider)
        .bind(provider_key)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn logins_for_user(&self, user_id: &str) -> StorageResult<Vec<Login>> {
        let user_id = self.decode_id(user_id)?;
        let rows: Vec<(String, String, String)> = query_as(
            "SELECT login_provider, provider_key, display_name \
             FROM user_logins WHERE user_id = $1",
        )
        .bind(&user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows
            .into_iter()
            .map(|(provider, key, display)| Login::new(provider, key, display))
            .collect())
    }
}
