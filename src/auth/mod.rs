//! Caller identity types and credential extraction from request headers.

mod identity;


pub use identity::{AuthMethod, Plan, ResolvedIdentity};

use axum::http::HeaderMap;

/// Header carrying the API key half of an API-key pair.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Header carrying the secret half of an API-key pair.
pub const API_SECRET_HEADER: &str = "x-api-secret";

/// Extract bearer token from HTTP Authorization header
///
/// Expected format: "Authorization: Bearer <token>"
/// Returns the token string if present and valid.
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<String, TokenError> {
    let auth_header = headers
        .get("authorization")
        .ok_or(TokenError::Missing)?
        .to_str()
        .map_err(|_| TokenError::InvalidFormat)?;

    parse_bearer_token(auth_header)
}

/// Read a non-empty header value as a string.
///
/// Returns `None` when the header is absent, empty, or not valid ASCII.
pub fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let value = headers.get(name)?.to_str().ok()?.trim();
    if value.is_empty() {
        return None;
    }
    Some(value.to_string())
}

/// True if both halves of an API-key pair are present.
pub fn has_api_key_pair(headers: &HeaderMap) -> bool {
    header_value(headers, API_KEY_HEADER).is_some()
        && header_value(headers, API_SECRET_HEADER).is_some()
}

/// True if the request carries credentials a browser would never attach on
/// its own: a bearer token or an API-key pair.
pub fn presents_non_cookie_credentials(headers: &HeaderMap) -> bool {
    extract_bearer_token(headers).is_ok() || has_api_key_pair(headers)
}

/// Parse bearer token from Authorization header value
fn parse_bearer_token(header_value: &str) -> Result<String, TokenError> {
    let parts: Vec<&str> = header_value.splitn(2, ' ').collect();

    if parts.len() != 2 {
        return Err(TokenError::InvalidFormat);
    }

    if !parts[0].eq_ignore_ascii_case("bearer") {
        return Err(TokenError::InvalidFormat);
    }

    let token = parts[1].trim();

    if token.is_empty() {
        return Err(TokenError::Empty);
    }

    Ok(token.to_string())
}

/// Token extraction errors
#[derive(Debug, PartialEq, Clone)]
pub enum TokenError {
    /// Authorization header not present
    Missing,
    /// Not "Bearer <token>" or not valid header text
    InvalidFormat,
    /// Token is empty string
    Empty,
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::Missing => write!(f, "Authorization token not provided"),
            TokenError::InvalidFormat => write!(f, "Invalid authorization token format"),
            TokenError::Empty => write!(f, "Authorization token is empty"),
        }
    }
}

impl std::error::Error for TokenError {}
