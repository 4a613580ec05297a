use sqlx::Error as SqlxError;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum StoreError {
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[from] SqlxError),

    #[error("No credential record matches")]
    NotFound,

    #[error("Username already exists")]
    DuplicateUsername,

    #[error("MFA must be enabled with a non-empty secret, or disabled with an empty one")]
    InvalidMfaState,

    #[error("Username must not be empty")]
    EmptyUsername,

    #[error("Existing users table is missing columns: {missing:?}")]
    SchemaMismatch { missing: Vec<String> },

    #[error("Corrupt credential record: {0}")]
    CorruptRecord(String),

    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),
}

impl From<figment::Error> for StoreError {
    fn from(e: figment::Error) -> Self {
        StoreError::Config(Box::new(e))
    }
}

impl StoreError {
    /// For writes guarded by the username index: a unique-constraint violation
    /// means two records share a username.
    pub(crate) fn from_unique_write(e: SqlxError) -> Self {
        match e.as_database_error() {
            Some(db) if db.is_unique_violation() => StoreError::DuplicateUsername,
            _ => StoreError::StorageUnavailable(e),
        }
    }
}
