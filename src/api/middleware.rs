use super::error::AppError;
use crate::admission::{AdmissionOutcome, RequestInfo};
use crate::auth::{header_value, presents_non_cookie_credentials, ResolvedIdentity};
use crate::gatekeeper::Gatekeeper;
use crate::rate_limit::Quota;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{debug, warn};

pub const RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const RATE_LIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Client address as resolved by the proxy-trust layer.
///
/// Takes precedence over the socket peer address when present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientIp(pub IpAddr);

/// Admission control for every request behind this layer.
///
/// Rate limits first, then the CSRF check. Admitted responses get
/// `X-RateLimit-*` headers for the most specific tier evaluated; rejections
/// become 429 (with `Retry-After`) or 403.
pub async fn admission_middleware(
    State(gatekeeper): State<Arc<Gatekeeper>>,
    request: Request,
    next: Next,
) -> Response {
    let client_ip = match resolve_client_ip(&request) {
        Some(ip) => ip,
        None => {
            warn!(path = %request.uri().path(), "Request without a client address");
            return AppError::BadRequest("client address unavailable".to_string())
                .into_response();
        }
    };

    let info = request_info(&gatekeeper, &request, client_ip);

    match gatekeeper.policy().admit(&info) {
        AdmissionOutcome::Admitted { quota } => {
            let mut response = next.run(request).await;
            insert_quota_headers(response.headers_mut(), &quota);
            response
        }
        AdmissionOutcome::Rejected(rejection) => {
            debug!(
                ip = %client_ip,
                method = %info.method,
                path = %info.path,
                stage = ?rejection.stage(),
                "Request rejected"
            );
            AppError::Rejected(rejection).into_response()
        }
    }
}

/// Build the admission view of an HTTP request.
pub fn request_info(gatekeeper: &Gatekeeper, request: &Request, client_ip: IpAddr) -> RequestInfo {
    let headers = request.headers();

    let mut info = RequestInfo::new(client_ip, request.method().clone(), request.uri().path())
        .with_non_cookie_credentials(presents_non_cookie_credentials(headers));

    if let Some(identity) = request.extensions().get::<ResolvedIdentity>() {
        info = info.with_identity(identity.clone());
    }

    if let Some(token) = header_value(headers, gatekeeper.csrf_header()) {
        info = info.with_csrf_token(token);
    }

    info
}

fn resolve_client_ip(request: &Request) -> Option<IpAddr> {
    if let Some(ClientIp(ip)) = request.extensions().get::<ClientIp>() {
        return Some(*ip);
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

fn insert_quota_headers(headers: &mut HeaderMap, quota: &Quota) {
    let reset_at = Utc::now().timestamp() + quota.reset_after.as_secs() as i64;

    headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from(quota.limit));
    headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(quota.remaining));
    headers.insert(RATE_LIMIT_RESET, HeaderValue::from(reset_at));
}
