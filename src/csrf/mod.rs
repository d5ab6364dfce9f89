//! Session-bound anti-forgery (CSRF) tokens.
//!
//! Tokens are 256-bit random values, URL-safe base64 encoded, each bound to
//! exactly one owner. Validation fails closed and never says why: a missing,
//! expired, or foreign token all look the same to the caller.

use crate::store::TtlStore;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::rngs::OsRng;
use rand::RngCore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

#[cfg(test)]
mod tests;

/// Random bytes per token (256 bits).
pub const TOKEN_BYTES: usize = 32;

/// CSRF token service errors
#[derive(Debug)]
pub enum CsrfError {
    /// The OS random source failed. Issuing must stop; a weaker token is never substituted.
    Entropy(String),
}

impl std::fmt::Display for CsrfError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CsrfError::Entropy(msg) => write!(f, "Secure random source unavailable: {}", msg),
        }
    }
}

impl std::error::Error for CsrfError {}

/// Issues, validates, refreshes and revokes per-owner CSRF tokens.
pub struct CsrfTokenService {
    /// token → owner id
    store: Arc<TtlStore<String>>,
    ttl: Duration,
}

impl CsrfTokenService {
    /// Create a service over `store` whose tokens live for `ttl`.
    pub fn new(store: Arc<TtlStore<String>>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn store(&self) -> &Arc<TtlStore<String>> {
        &self.store
    }

    /// Generate and store a token bound to `owner_id`.
    ///
    /// # Errors
    /// `CsrfError::Entropy` if the OS random source fails. Treat as fatal.
    pub fn issue(&self, owner_id: &str) -> Result<String, CsrfError> {
        let token = generate_token()?;
        self.store.put(&token, owner_id.to_string(), self.ttl);
        debug!(owner = %owner_id, "CSRF token issued");
        Ok(token)
    }

    /// True only if `token` exists, is unexpired, and is bound to `owner_id`.
    pub fn validate(&self, token: &str, owner_id: &str) -> bool {
        if token.is_empty() {
            return false;
        }

        match self.store.get(token) {
            Some(owner) => owner == owner_id,
            None => false,
        }
    }

    /// Extend an unexpired token so it lives a full TTL from now.
    ///
    /// Returns false for unknown or expired tokens, which are left untouched.
    pub fn refresh(&self, token: &str) -> bool {
        self.store.touch(token, self.ttl)
    }

    /// Delete `token`. Revoking an unknown token is a no-op.
    pub fn revoke(&self, token: &str) {
        self.store.delete(token);
    }

    /// Delete every token bound to `owner_id` (logout everywhere).
    ///
    /// Returns how many were removed.
    pub fn revoke_owner(&self, owner_id: &str) -> usize {
        let removed = self.store.remove_where(|owner| owner == owner_id);
        debug!(owner = %owner_id, removed, "CSRF tokens revoked for owner");
        removed
    }

    /// Tokens currently held, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

fn generate_token() -> Result<String, CsrfError> {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.try_fill_bytes(&mut bytes).map_err(|e| {
        error!(error = %e, "OS random source failed while issuing CSRF token");
        CsrfError::Entropy(e.to_string())
    })?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}
