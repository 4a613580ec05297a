use std::fmt;

use crate::error::StoreError;

/// One row of the `users` table.
///
/// Usernames compare byte-for-byte: no case folding or Unicode normalization
/// happens anywhere in the store, so `Admin` and `admin` are two accounts.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub username: String,
    pub password_credential: String,
    pub failure_count: u32,
    pub mfa_enabled: bool,
    pub mfa_secret: String,
}

impl CredentialRecord {
    /// A freshly enrolled account: no failures, MFA off.
    pub fn enrolled(username: impl Into<String>, password_credential: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password_credential: password_credential.into(),
            failure_count: 0,
            mfa_enabled: false,
            mfa_secret: String::new(),
        }
    }
}

// Secrets stay out of logs and panic messages.
impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("username", &self.username)
            .field("password_credential", &"<redacted>")
            .field("failure_count", &self.failure_count)
            .field("mfa_enabled", &self.mfa_enabled)
            .field("mfa_secret", &"<redacted>")
            .finish()
    }
}

/// Enabled requires a secret; disabled requires none.
pub fn validate_mfa(enabled: bool, secret: &str) -> Result<(), StoreError> {
    if enabled == secret.is_empty() {
        return Err(StoreError::InvalidMfaState);
    }
    Ok(())
}
