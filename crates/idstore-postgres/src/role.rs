//! PostgreSQL implementation of the role storage provider.

use async_trait::async_trait;
use idstore_core::{Claim, IdCodec, Role, new_concurrency_stamp};
use idstore_storage::role::RoleStore;
use idstore_storage::{StorageError, StorageResult};
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_postgres::PgPool;

use crate::error::{is_foreign_key_violation, is_unique_violation, map_sqlx_error};

const ROLE_COLUMNS: &str = "id, name, normalized_name, concurrency_stamp";

type RoleTuple = (String, String, String, String);

fn role_from_tuple(row: RoleTuple) -> Role {
    Role {
        id: row.0,
        name: row.1,
        normalized_name: row.2,
        concurrency_stamp: row.3,
    }
}

/// PostgreSQL role storage provider.
#[derive(Debug, Clone)]
pub struct PgRoleStore {
    pool: PgPool,
    codec: IdCodec,
}

impl PgRoleStore {
    /// Creates a new PostgreSQL role store over the given pool.
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
}

#[async_trait]
impl RoleStore for PgRoleStore {
    async fn create_role(&self, role: &Role) -> StorageResult<Role> {
        let id = self.decode_id(&role.id)?;
        if role.name.is_empty() || role.normalized_name.is_empty() {
            return Err(StorageError::invalid_input(
                "role name and normalized name are required",
            ));
        }

        let mut stored = role.clone();
        stored.id = id;
        if stored.concurrency_stamp.is_empty() {
            stored.concurrency_stamp = new_concurrency_stamp();
        }

        query(
            "INSERT INTO roles (id, name, normalized_name, concurrency_stamp) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(&stored.id)
        .bind(&stored.name)
        .bind(&stored.normalized_name)
        .bind(&stored.concurrency_stamp)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StorageError::already_exists("role", &stored.id)
            } else {
                map_sqlx_error(e)
            }
        })?;

        Ok(stored)
    }

    async fn update_role(&self, role: &Role) -> StorageResult<Role> {
        let id = self.decode_id(&role.id)?;
        if role.name.is_empty() || role.normalized_name.is_empty() {
            return Err(StorageError::invalid_input(
                "role name and normalized name are required",
            ));
        }

        let mut stored = role.clone();
        stored.id = id;
        stored.concurrency_stamp = new_concurrency_stamp();

        let result = query(
            "UPDATE roles SET name = $2, normalized_name = $3, concurrency_stamp = $4 \
             WHERE id = $1 AND concurrency_stamp = $5",
        )
        .bind(&stored.id)
        .bind(&stored.name)
        .bind(&stored.normalized_name)
        .bind(&stored.concurrency_stamp)
        .bind(&role.concurrency_stamp)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            let current: Option<(String,)> =
                query_as("SELECT concurrency_stamp FROM roles WHERE id = $1")
                    .bind(&stored.id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;
            return match current {
                None => Err(StorageError::not_found("role", &stored.id)),
                Some(_) => Err(StorageError::concurrency_conflict("role", &stored.id)),
            };
        }

        Ok(stored)
    }

    async fn delete_role(&self, id: &str) -> StorageResult<()> {
        let id = self.decode_id(id)?;
        // Role claims and memberships are removed by cascade.
        let result = query("DELETE FROM roles WHERE id = $1")
            .bind(&id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::not_found("role", &id));
        }
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> StorageResult<Option<Role>> {
        let id = self.decode_id(id)?;
        let sql = format!("SELECT {ROLE_COLUMNS} FROM roles WHERE id = $1");
        let row: Option<RoleTuple> = query_as(&sql)
            .bind(&id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(role_from_tuple))
    }

    async fn find_by_normalized_name(&self, normalized: &str) -> StorageResult<Option<Role>> {
        if normalized.is_empty() {
            return Ok(None);
        }
        let sql =
            format!("SELECT {ROLE_COLUMNS} FROM roles WHERE LOWER(normalized_name) = LOWER($1)");
        let row: Option<RoleTuple> = query_as(&sql)
            .bind(normalized)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(role_from_tuple))
    }

    async fn role_name(&self, id: &str) -> StorageResult<Option<String>> {
        let id = self.decode_id(id)?;
        let row: Option<(String,)> = query_as("SELECT name FROM roles WHERE id = $1")
            .bind(&id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(|(name,)| name))
    }

    async fn claims_for_role(&self, role_id: &str) -> StorageResult<Vec<Claim>> {
        let role_id = self.decode_id(role_id)?;
        let rows: Vec<(Option<String>, Option<String>)> =
            query_as("SELECT claim_type, claim_value FROM role_claims WHERE role_id = $1")
                .bind(&role_id)
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

    async fn add_claim(&self, role_id: &str, claim: &Claim) -> StorageResult<()> {
        let role_id = self.decode_id(role_id)?;
        query("INSERT INTO role_claims (claim_type, claim_value, role_id) VALUES ($1, $2, $3)")
            .bind(&claim.claim_type)
            .bind(&claim.claim_value)
            .bind(&role_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    StorageError::not_found("role", &role_id)
                } else {
                    map_sqlx_error(e)
                }
            })?;

        Ok(())
    }

    async fn remove_claim(&self, role_id: &str, claim: &Claim) -> StorageResult<()> {
        let role_id = self.decode_id(role_id)?;
        query(
            "DELETE FROM role_claims \
             WHERE role_id = $1 AND claim_type = $2 AND claim_value = $3",
        )
        .bind(&role_id)
        .bind(&claim.claim_type)
        .bind(&claim.claim_value)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }
}
