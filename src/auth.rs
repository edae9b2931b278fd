#![forbid(unsafe_code)]

//! Authentication gate: a binary allow-list check for relay clients plus the
//! admin-session check. No scopes, expiry, or rate limiting.

use thiserror::Error;

use crate::store::RelayStore;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing key")]
    MissingKey,
    #[error("invalid key")]
    InvalidKey,
    #[error("not authenticated")]
    NotAuthenticated,
    /// The key lookup itself failed. Surfaced as a server error, never as an
    /// auth rejection.
    #[error("key lookup failed")]
    Backend(anyhow::Error),
}

/// Validates a presented API key against the key store. Returns the key value
/// itself on success so the caller can stamp it into the audit log.
pub async fn authorize_key(
    store: &RelayStore,
    presented: Option<&str>,
) -> Result<String, AuthError> {
    let key = presented
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .ok_or(AuthError::MissingKey)?;

    match store.key_exists(key).await {
        Ok(true) => Ok(key.to_string()),
        Ok(false) => Err(AuthError::InvalidKey),
        Err(err) => Err(AuthError::Backend(err)),
    }
}

/// Admin operations require an established session; there is nothing more to
/// the check than the per-request flag.
pub fn authorize_admin(is_admin: bool) -> Result<(), AuthError> {
    if is_admin {
        Ok(())
    } else {
        Err(AuthError::NotAuthenticated)
    }
}
