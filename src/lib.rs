pub mod config;
pub mod db;
pub mod error;
pub mod telemetry;

pub use config::StoreConfig;
pub use db::{CredentialRecord, CredentialStore, SchemaProvisioner};
pub use error::StoreError;
