//! SQL DDL for the credential table and the provisioner that applies it.

use sqlx::{Connection, Pool, Sqlite, SqliteConnection};
use tracing::{debug, info};

use crate::error::StoreError;

/// SQLite schema with:
/// - the five credential columns, all NOT NULL
/// - `failures` and `mfa_enabled` range-checked, MFA flag/secret pairing checked
/// - a UNIQUE index on `username` using the default BINARY (byte-exact) collation
///
/// The index is created separately, after the column check, so a pre-existing
/// table created without the constraint still gets it.
pub const SQLITE_CREATE_USERS: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    username TEXT NOT NULL,
    password TEXT NOT NULL,
    failures INTEGER NOT NULL DEFAULT 0 CHECK (failures >= 0),
    mfa_enabled INTEGER NOT NULL DEFAULT 0 CHECK (mfa_enabled IN (0, 1)),
    mfa_secret TEXT NOT NULL DEFAULT '',
    CHECK ((mfa_enabled = 1) = (mfa_secret <> ''))
)
"#;

pub const SQLITE_CREATE_USERNAME_INDEX: &str =
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_users_username ON users(username)";

pub const USERS_COLUMNS: [&str; 5] = [
    "username",
    "password",
    "failures",
    "mfa_enabled",
    "mfa_secret",
];

/// Creates and checks the `users` table.
pub struct SchemaProvisioner<'a> {
    pool: &'a Pool<Sqlite>,
}

impl<'a> SchemaProvisioner<'a> {
    pub fn new(pool: &'a Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Idempotent. The DDL runs inside `BEGIN IMMEDIATE`, so instances racing
    /// at start-up serialize on the write lock and the losers find the schema
    /// already in place. Dropping the future mid-way rolls the transaction back.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        let mut tx = conn.begin_with("BEGIN IMMEDIATE").await?;

        let columns = provision(&mut *tx).await?;
        tx.commit().await?;

        debug!(columns, "users schema verified");
        info!("credential schema ready");
        Ok(())
    }
}

async fn provision(conn: &mut SqliteConnection) -> Result<usize, StoreError> {
    sqlx::query(SQLITE_CREATE_USERS).execute(&mut *conn).await?;

    let present: Vec<String> = sqlx::query_scalar("SELECT name FROM pragma_table_info('users')")
        .fetch_all(&mut *conn)
        .await?;
    let missing: Vec<String> = USERS_COLUMNS
        .iter()
        .filter(|col| !present.iter().any(|p| p == *col))
        .map(|col| col.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(StoreError::SchemaMismatch { missing });
    }

    // A legacy table already holding duplicate usernames cannot take the index.
    sqlx::query(SQLITE_CREATE_USERNAME_INDEX)
        .execute(&mut *conn)
        .await
        .map_err(StoreError::from_unique_write)?;
    Ok(present.len())
}
