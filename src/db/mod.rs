//! Database module: credential records and their SQLite storage.
//!
//! Layout:
//! - `models.rs`: the record struct mirroring a `users` row, MFA pairing rule
//! - `schema.rs`: DDL and the provisioner that applies and verifies it
//! - `sqlite.rs`: `CredentialStore`, every read and write against `users`

pub mod models;
pub mod schema;
pub mod sqlite;

pub use models::CredentialRecord;
pub use schema::SchemaProvisioner;
pub use sqlite::{CredentialStore, SqlitePool};
