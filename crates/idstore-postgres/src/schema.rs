//! Schema bootstrap for the PostgreSQL storage backend.
//!
//! Provisions the fixed identity table set on first use: tables, then
//! indexes on every foreign-key column, then cascade-delete foreign keys
//! from child tables to `users`/`roles`. The batch runs only when the
//! catalog shows the table set absent, so calling it against an already
//! provisioned database is safe.

use sqlx_postgres::PgPool;
use tracing::{debug, info, instrument};

use idstore_storage::{StorageResult, StorageError};

use crate::error::map_sqlx_error;

/// Table-creation statements, in dependency order.
const CREATE_TABLES: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS roles (
        id varchar(128) NOT NULL PRIMARY KEY,
        name varchar(256) NOT NULL,
        normalized_name varchar(256) NOT NULL,
        concurrency_stamp varchar(64) NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id varchar(128) NOT NULL PRIMARY KEY,
        user_name varchar(256) NOT NULL,
        normalized_user_name varchar(256) NOT NULL,
        email varchar(256),
        normalized_email varchar(256),
        email_confirmed boolean NOT NULL DEFAULT false,
        password_hash text,
        security_stamp varchar(256),
        concurrency_stamp varchar(64) NOT NULL,
        phone_number varchar(64),
        phone_number_confirmed boolean NOT NULL DEFAULT false,
        two_factor_enabled boolean NOT NULL DEFAULT false,
        lockout_end timestamptz,
        lockout_enabled boolean NOT NULL DEFAULT false,
        access_failed_count integer NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_claims (
        id serial NOT NULL PRIMARY KEY,
        claim_type varchar(256),
        claim_value varchar(256),
        user_id varchar(128) NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_logins (
        user_id varchar(128) NOT NULL,
        login_provider varchar(128) NOT NULL,
        provider_key varchar(128) NOT NULL,
        display_name varchar(256) NOT NULL,
        PRIMARY KEY (user_id, login_provider, provider_key)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_roles (
        user_id varchar(128) NOT NULL,
        role_id varchar(128) NOT NULL,
        PRIMARY KEY (user_id, role_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS role_claims (
        id serial NOT NULL PRIMARY KEY,
        claim_type varchar(256),
        claim_value varchar(256),
        role_id varchar(128) NOT NULL
    )
    "#,
];

/// Index statements, one per foreign-key column.
const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS ix_user_claims_user_id ON user_claims (user_id)",
    "CREATE INDEX IF NOT EXISTS ix_user_logins_user_id ON user_logins (user_id)",
    "CREATE INDEX IF NOT EXISTS ix_user_roles_user_id ON user_roles (user_id)",
    "CREATE INDEX IF NOT EXISTS ix_user_roles_role_id ON user_roles (role_id)",
    "CREATE INDEX IF NOT EXISTS ix_role_claims_role_id ON role_claims (role_id)",
];

/// Cascade-delete foreign keys from child tables to their parents.
const CREATE_FOREIGN_KEYS: &[&str] = &[
    r"ALTER TABLE user_claims
      ADD CONSTRAINT fk_user_claims_users_user_id FOREIGN KEY (user_id) REFERENCES users (id)
      ON DELETE CASCADE",
    r"ALTER TABLE user_logins
      ADD CONSTRAINT fk_user_logins_users_user_id FOREIGN KEY (user_id) REFERENCES users (id)
      ON DELETE CASCADE",
    r"ALTER TABLE user_roles
      ADD CONSTRAINT fk_user_roles_users_user_id FOREIGN KEY (user_id) REFERENCES users (id)
      ON DELETE CASCADE",
    r"ALTER TABLE user_roles
      ADD CONSTRAINT fk_user_roles_roles_role_id FOREIGN KEY (role_id) REFERENCES roles (id)
      ON DELETE CASCADE",
    r"ALTER TABLE role_claims
      ADD CONSTRAINT fk_role_claims_roles_role_id FOREIGN KEY (role_id) REFERENCES roles (id)
      ON DELETE CASCADE",
];

/// Provisions the identity schema on first use.
#[derive(Debug, Clone)]
pub struct SchemaBootstrap {
    pool: PgPool,
}

impl SchemaBootstrap {
    /// Creates a new bootstrap helper over the given pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Ensures the identity table set exists.
    ///
    /// # Errors
    ///
    /// Returns an error when the catalog query or any DDL statement
    /// fails.
    #[instrument(skip(self))]
    pub async fn ensure(&self) -> StorageResult<()> {
        if self.tables_exist().await? {
            debug!("Identity schema already provisioned");
            return Ok(());
        }

        info!("Provisioning identity schema");
        for statement in CREATE_TABLES
            .iter()
            .chain(CREATE_INDEXES)
            .chain(CREATE_FOREIGN_KEYS)
        {
            sqlx_core::query::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    StorageError::internal(format!("schema bootstrap statement failed: {e}"))
                })?;
        }

        info!("Identity schema provisioned");
        Ok(())
    }

    /// Checks the catalog for the `users` table, which gates the batch.
    async fn tables_exist(&self) -> StorageResult<bool> {
        let row: Option<(bool,)> = sqlx_core::query_as::query_as(
            "SELECT EXISTS (
                SELECT FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = 'users'
            )",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(|(exists,)| exists).unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_is_ordered_tables_then_indexes_then_keys() {
        assert_eq!(CREATE_TABLES.len(), 6);
        assert_eq!(CREATE_INDEXES.len(), 5);
        assert_eq!(CREATE_FOREIGN_KEYS.len(), 5);

        for stmt in CREATE_TABLES {
            assert!(stmt.trim_start().starts_with("CREATE TABLE IF NOT EXISTS"));
        }
        for stmt in CREATE_INDEXES {
            assert!(stmt.trim_start().starts_with("CREATE INDEX IF NOT EXISTS"));
        }
        for stmt in CREATE_FOREIGN_KEYS {
            assert!(stmt.trim_start().starts_with("ALTER TABLE"));
            assert!(stmt.contains("ON DELETE CASCADE"));
        }
    }

    #[test]
    fn test_roles_created_before_membership_tables() {
        let roles_pos = CREATE_TABLES
            .iter()
            .position(|s| s.contains("TABLE IF NOT EXISTS roles"))
            .expect("roles table");
        let user_roles_pos = CREATE_TABLES
            .iter()
            .position(|s| s.contains("TABLE IF NOT EXISTS user_roles"))
            .expect("user_roles table");
        assert!(roles_pos < user_roles_pos);
    }
}
