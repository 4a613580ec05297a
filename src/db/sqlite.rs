use crate::config::StoreConfig;
use crate::db::models::{CredentialRecord, validate_mfa};
use crate::db::schema::SchemaProvisioner;
use crate::error::StoreError;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::str::FromStr;
use tracing::{debug, info, warn};

pub type SqlitePool = Pool<Sqlite>;

const SELECT_BY_USERNAME: &str = r#"SELECT username, password, failures, mfa_enabled, mfa_secret
    FROM users WHERE username = ?"#;

const SELECT_BY_PASSWORD: &str = r#"SELECT username, password, failures, mfa_enabled, mfa_secret
    FROM users WHERE password = ? ORDER BY rowid LIMIT 1"#;

const SELECT_ALL: &str = r#"SELECT username, password, failures, mfa_enabled, mfa_secret
    FROM users ORDER BY rowid"#;

/// Credential records in the `users` table.
///
/// Every caller-supplied value reaches SQLite as a bound `?` parameter; no
/// statement text in this type is ever assembled from input.
#[derive(Clone)]
pub struct CredentialStore {
    pool: SqlitePool,
}

impl CredentialStore {
    /// Connect using `cfg` and provision the schema.
    ///
    /// Release the handle with [`CredentialStore::close`].
    pub async fn open(cfg: &StoreConfig) -> Result<Self, StoreError> {
        let store = Self::connect(cfg).await?;
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Connect without touching the schema.
    pub async fn connect(cfg: &StoreConfig) -> Result<Self, StoreError> {
        let mut connect_opts = SqliteConnectOptions::from_str(&cfg.database_url)?
            .create_if_missing(true)
            .busy_timeout(cfg.busy_timeout());

        let mut pool_opts = SqlitePoolOptions::new().acquire_timeout(cfg.acquire_timeout());
        if cfg.is_in_memory() {
            // Each in-memory connection is its own database; keep exactly one alive.
            pool_opts = pool_opts
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        } else {
            connect_opts = connect_opts.journal_mode(SqliteJournalMode::Wal);
            pool_opts = pool_opts.max_connections(cfg.max_connections.max(1));
        }

        let pool = pool_opts.connect_with(connect_opts).await?;
        info!(
            in_memory = cfg.is_in_memory(),
            max_connections = cfg.max_connections,
            "credential store connected"
        );
        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close every pooled connection. Clones of this store become unusable.
    pub async fn close(self) {
        self.pool.close().await;
        info!("credential store closed");
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        SchemaProvisioner::new(&self.pool).ensure_schema().await
    }

    /// Enroll a new account with a clean failure counter and MFA disabled.
    pub async fn insert(
        &self,
        username: &str,
        password_credential: &str,
    ) -> Result<(), StoreError> {
        if username.is_empty() {
            return Err(StoreError::EmptyUsername);
        }

        let rec = CredentialRecord::enrolled(username, password_credential);
        let result = sqlx::query(
            r#"INSERT INTO users (username, password, failures, mfa_enabled, mfa_secret)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(rec.username.as_str())
        .bind(rec.password_credential.as_str())
        .bind(i64::from(rec.failure_count))
        .bind(if rec.mfa_enabled { 1_i64 } else { 0_i64 })
        .bind(rec.mfa_secret.as_str())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!(username = ?username, "credential record inserted");
                Ok(())
            }
            Err(e) => {
                let err = StoreError::from_unique_write(e);
                if matches!(err, StoreError::DuplicateUsername) {
                    warn!(username = ?username, "insert rejected: username taken");
                }
                Err(err)
            }
        }
    }

    pub async fn lookup_by_username(&self, username: &str) -> Result<CredentialRecord, StoreError> {
        let row = sqlx::query(SELECT_BY_USERNAME)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        debug!(username = ?username, found = row.is_some(), "lookup by username");
        row.map(Self::row_to_model).unwrap_or(Err(StoreError::NotFound))
    }

    /// First record, in insertion order, holding exactly this credential.
    pub async fn lookup_by_password_credential(
        &self,
        password_credential: &str,
    ) -> Result<CredentialRecord, StoreError> {
        let row = sqlx::query(SELECT_BY_PASSWORD)
            .bind(password_credential)
            .fetch_optional(&self.pool)
            .await?;
        debug!(found = row.is_some(), "lookup by password credential");
        row.map(Self::row_to_model).unwrap_or(Err(StoreError::NotFound))
    }

    /// Bump the failure counter in a single statement and return the new value.
    ///
    /// The increment happens inside SQLite, so concurrent callers never lose
    /// an update.
    pub async fn increment_failure(&self, username: &str) -> Result<u32, StoreError> {
        let failures: Option<i64> = sqlx::query_scalar(
            "UPDATE users SET failures = failures + 1 WHERE username = ? RETURNING failures",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        let failures = failures.ok_or(StoreError::NotFound)?;
        debug!(username = ?username, failures, "failure counter incremented");
        Self::decode_failures(failures)
    }

    pub async fn reset_failure(&self, username: &str) -> Result<(), StoreError> {
        let res = sqlx::query("UPDATE users SET failures = 0 WHERE username = ?")
            .bind(username)
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        debug!(username = ?username, "failure counter reset");
        Ok(())
    }

    /// Set the MFA flag and secret together. Enabling requires a secret and
    /// disabling requires an empty one.
    pub async fn set_mfa(
        &self,
        username: &str,
        enabled: bool,
        secret: &str,
    ) -> Result<(), StoreError> {
        if let Err(e) = validate_mfa(enabled, secret) {
            warn!(username = ?username, enabled, "rejected inconsistent MFA state");
            return Err(e);
        }

        let res =
            sqlx::query("UPDATE users SET mfa_enabled = ?, mfa_secret = ? WHERE username = ?")
                .bind(if enabled { 1_i64 } else { 0_i64 })
                .bind(secret)
                .bind(username)
                .execute(&self.pool)
                .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        debug!(username = ?username, enabled, "mfa settings updated");
        Ok(())
    }

    pub async fn count(&self) -> Result<u64, StoreError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(n.max(0) as u64)
    }

    /// Every record in insertion order.
    pub async fn list_all(&self) -> Result<Vec<CredentialRecord>, StoreError> {
        let rows = sqlx::query(SELECT_ALL)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Self::row_to_model).collect()
    }

    /// Administrative removal of an account.
    pub async fn delete(&self, username: &str) -> Result<(), StoreError> {
        let res = sqlx::query("DELETE FROM users WHERE username = ?")
            .bind(username)
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        info!(username = ?username, "credential record deleted");
        Ok(())
    }

    fn row_to_model(row: SqliteRow) -> Result<CredentialRecord, StoreError> {
        // NULLs only show up in tables created outside this store
        let corrupt = |e: sqlx::Error| StoreError::CorruptRecord(e.to_string());
        let username: String = row.try_get("username").map_err(corrupt)?;
        let password_credential: String = row.try_get("password").map_err(corrupt)?;
        let failures: i64 = row.try_get("failures").map_err(corrupt)?;
        let mfa_enabled_i: i64 = row.try_get("mfa_enabled").map_err(corrupt)?;
        let mfa_secret: String = row.try_get("mfa_secret").map_err(corrupt)?;

        let mfa_enabled = match mfa_enabled_i {
            0 => false,
            1 => true,
            other => {
                return Err(StoreError::CorruptRecord(format!(
                    "mfa_enabled is {other}, expected 0 or 1"
                )));
            }
        };

        Ok(CredentialRecord {
            username,
            password_credential,
            failure_count: Self::decode_failures(failures)?,
            mfa_enabled,
            mfa_secret,
        })
    }

    fn decode_failures(failures: i64) -> Result<u32, StoreError> {
        u32::try_from(failures).map_err(|_| {
            StoreError::CorruptRecord(format!("failures is {failures}, outside 0..=u32::MAX"))
        })
    }
}
