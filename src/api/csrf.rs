use super::error::AppError;
use crate::auth::{header_value, ResolvedIdentity};
use crate::gatekeeper::Gatekeeper;
use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Extension, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

/// Token issue/refresh response
#[derive(Serialize)]
pub struct CsrfTokenResponse {
    pub token: String,
    pub header: String,
    pub expires_in: u64,
}

/// Refresh result
#[derive(Serialize)]
pub struct RefreshResponse {
    pub refreshed: bool,
    pub expires_in: u64,
}

/// Query for the revoke endpoint
#[derive(Debug, Default, Deserialize)]
pub struct RevokeQuery {
    #[serde(default)]
    pub all: bool,
}

/// Create CSRF token router
pub fn create_csrf_router(gatekeeper: Arc<Gatekeeper>) -> Router {
    Router::new()
        .route("/api/v1/csrf/token", get(issue_token))
        .route("/api/v1/csrf/refresh", post(refresh_token))
        .route("/api/v1/csrf/revoke", post(revoke_token))
        .with_state(gatekeeper)
}

fn require_identity(identity: Option<Extension<ResolvedIdentity>>) -> Result<ResolvedIdentity, AppError> {
    identity
        .map(|Extension(identity)| identity)
        .ok_or_else(|| AppError::Unauthorized("authentication required".to_string()))
}

/// Presented token, only if it belongs to the caller.
fn owned_token(
    gatekeeper: &Gatekeeper,
    headers: &HeaderMap,
    identity: &ResolvedIdentity,
) -> Result<String, AppError> {
    let token = header_value(headers, gatekeeper.csrf_header()).ok_or(AppError::Forbidden)?;
    if !gatekeeper.csrf().validate(&token, &identity.owner_id()) {
        return Err(AppError::Forbidden);
    }
    Ok(token)
}

/// GET /api/v1/csrf/token
///
/// Issues a fresh token bound to the caller. Called after login and
/// whenever the client has lost its token.
async fn issue_token(
    State(gatekeeper): State<Arc<Gatekeeper>>,
    identity: Option<Extension<ResolvedIdentity>>,
) -> Result<Json<CsrfTokenResponse>, AppError> {
    let identity = require_identity(identity)?;

    let token = gatekeeper.csrf().issue(&identity.owner_id()).map_err(|e| {
        error!(error = %e, user = %identity.user_id, "Refusing to issue CSRF token");
        AppError::ServerError("unable to issue CSRF token".to_string())
    })?;

    info!(user = %identity.user_id, "CSRF token issued");

    Ok(Json(CsrfTokenResponse {
        token,
        header: gatekeeper.csrf_header().to_string(),
        expires_in: gatekeeper.csrf().ttl().as_secs(),
    }))
}

/// POST /api/v1/csrf/refresh
///
/// Extends the presented token by a full TTL.
async fn refresh_token(
    State(gatekeeper): State<Arc<Gatekeeper>>,
    identity: Option<Extension<ResolvedIdentity>>,
    headers: HeaderMap,
) -> Result<Json<RefreshResponse>, AppError> {
    let identity = require_identity(identity)?;
    let token = owned_token(&gatekeeper, &headers, &identity)?;

    // Token may expire between validate and refresh
    if !gatekeeper.csrf().refresh(&token) {
        return Err(AppError::Forbidden);
    }

    Ok(Json(RefreshResponse {
        refreshed: true,
        expires_in: gatekeeper.csrf().ttl().as_secs(),
    }))
}

/// POST /api/v1/csrf/revoke
///
/// Revokes the presented token, or every token of the caller when the
/// `all=true` query is given. Idempotent.
async fn revoke_token(
    State(gatekeeper): State<Arc<Gatekeeper>>,
    identity: Option<Extension<ResolvedIdentity>>,
    headers: HeaderMap,
    Query(query): Query<RevokeQuery>,
) -> Result<StatusCode, AppError> {
    let identity = require_identity(identity)?;

    if query.all {
        let removed = gatekeeper.csrf().revoke_owner(&identity.owner_id());
        info!(user = %identity.user_id, removed, "CSRF tokens revoked");
        return Ok(StatusCode::NO_CONTENT);
    }

    if let Some(token) = header_value(&headers, gatekeeper.csrf_header()) {
        // Only the owner may revoke; a foreign token is silently left alone
        if gatekeeper.csrf().validate(&token, &identity.owner_id()) {
            gatekeeper.csrf().revoke(&token);
        }
    }

    Ok(StatusCode::NO_CONTENT)
}

