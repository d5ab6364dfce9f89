//! Per-request admission: layered rate limits, then the CSRF check.
//!
//! ```text
//! START → IP_CHECK → ENDPOINT_CHECK → USER_CHECK → PLAN_CHECK → CSRF_CHECK → ADMITTED
//!            └──────────────┴──────────────┴────────────┴───────────┴──→ REJECTED
//! ```
//!
//! There is no retry inside the policy. A quota rejection carries the
//! retry hint; the caller decides what to do with it.

use crate::auth::ResolvedIdentity;
use crate::csrf::CsrfTokenService;
use crate::rate_limit::{Quota, RateDecision, RateLimiter, Tier};
use axum::http::Method;
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

#[cfg(test)]
mod tests;

/// Position in the admission state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    IpCheck,
    EndpointCheck,
    UserCheck,
    PlanCheck,
    CsrfCheck,
    Admitted,
    Rejected,
}

impl From<Tier> for Stage {
    fn from(tier: Tier) -> Self {
        match tier {
            Tier::Ip => Stage::IpCheck,
            Tier::Endpoint => Stage::EndpointCheck,
            Tier::User => Stage::UserCheck,
            Tier::Plan => Stage::PlanCheck,
        }
    }
}

/// Everything admission needs to know about one inbound request.
///
/// Assembled by the request-handling layer; the client IP has already been
/// resolved through whatever proxy trust rules apply upstream.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub client_ip: IpAddr,
    pub method: Method,
    pub path: String,
    pub identity: Option<ResolvedIdentity>,
    /// Value of the CSRF header, if sent.
    pub csrf_token: Option<String>,
    /// Bearer token or API-key pair present in headers.
    pub non_cookie_credentials: bool,
}

impl RequestInfo {
    pub fn new(client_ip: IpAddr, method: Method, path: impl Into<String>) -> Self {
        Self {
            client_ip,
            method,
            path: path.into(),
            identity: None,
            csrf_token: None,
            non_cookie_credentials: false,
        }
    }

    pub fn with_identity(mut self, identity: ResolvedIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn with_csrf_token(mut self, token: impl Into<String>) -> Self {
        self.csrf_token = Some(token.into());
        self
    }

    pub fn with_non_cookie_credentials(mut self, present: bool) -> Self {
        self.non_cookie_credentials = present;
        self
    }
}

/// Why a request was turned away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Over quota at `tier`; retry after the window.
    QuotaExceeded { tier: Tier, retry_after: Duration },
    /// Missing, unknown, expired, or foreign CSRF token. The reason is not exposed.
    CsrfFailed,
}

impl Rejection {
    /// Stage that produced the rejection.
    pub fn stage(&self) -> Stage {
        match self {
            Rejection::QuotaExceeded { tier, .. } => Stage::from(*tier),
            Rejection::CsrfFailed => Stage::CsrfCheck,
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::QuotaExceeded { tier, retry_after } => write!(
                f,
                "Rate limit exceeded at {} tier, retry after {}s",
                tier,
                retry_after.as_secs()
            ),
            Rejection::CsrfFailed => write!(f, "CSRF check failed"),
        }
    }
}

/// Terminal state of the admission state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionOutcome {
    Admitted { quota: Quota },
    Rejected(Rejection),
}

impl AdmissionOutcome {
    pub fn is_admitted(&self) -> bool {
        matches!(self, AdmissionOutcome::Admitted { .. })
    }

    pub fn stage(&self) -> Stage {
        match self {
            AdmissionOutcome::Admitted { .. } => Stage::Admitted,
            AdmissionOutcome::Rejected(_) => Stage::Rejected,
        }
    }
}

/// Methods that never change state and so never need a CSRF token.
pub fn is_safe_method(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}

/// Composes the rate limiter and the CSRF token service.
pub struct AdmissionPolicy {
    limiter: Arc<RateLimiter>,
    csrf: Arc<CsrfTokenService>,
    /// Pre-authentication routes exempt from the CSRF check.
    public_routes: HashSet<String>,
}

impl AdmissionPolicy {
    pub fn new(
        limiter: Arc<RateLimiter>,
        csrf: Arc<CsrfTokenService>,
        public_routes: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            limiter,
            csrf,
            public_routes: public_routes.into_iter().collect(),
        }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn csrf(&self) -> &Arc<CsrfTokenService> {
        &self.csrf
    }

    /// Run one request through every check. First failure wins.
    pub fn admit(&self, request: &RequestInfo) -> AdmissionOutcome {
        trace!(stage = ?Stage::Start, path = %request.path, "Admission started");

        let quota = match self.limiter.admit(
            request.client_ip,
            &request.path,
            request.identity.as_ref(),
        ) {
            RateDecision::Allowed(quota) => quota,
            RateDecision::Limited { tier, retry_after } => {
                let rejection = Rejection::QuotaExceeded { tier, retry_after };
                trace!(stage = ?rejection.stage(), "Admission rejected");
                return AdmissionOutcome::Rejected(rejection);
            }
        };

        if self.requires_csrf(request) {
            trace!(stage = ?Stage::CsrfCheck, path = %request.path, "Checking CSRF token");
            if !self.check_csrf(request) {
                return AdmissionOutcome::Rejected(Rejection::CsrfFailed);
            }
        }

        trace!(stage = ?Stage::Admitted, path = %request.path, "Admission granted");
        AdmissionOutcome::Admitted { quota }
    }

    /// Validate a CSRF token against an owner, bypassing the exemption rules.
    pub fn validate_csrf(&self, token: &str, owner_id: &str) -> bool {
        self.csrf.validate(token, owner_id)
    }

    /// Whether `request` has to present a valid CSRF token.
    ///
    /// Exempt: safe methods, public routes, and anything authenticated by
    /// a credential the browser does not attach by itself.
    pub fn requires_csrf(&self, request: &RequestInfo) -> bool {
        if is_safe_method(&request.method) {
            return false;
        }

        if self.public_routes.contains(&request.path) {
            return false;
        }

        if request.non_cookie_credentials {
            return false;
        }

        match &request.identity {
            Some(identity) => identity.auth_method.is_cookie(),
            // Nothing to bind a token to: fail closed in check_csrf.
            None => true,
        }
    }

    fn check_csrf(&self, request: &RequestInfo) -> bool {
        // Checked before any store access
        let token = match request.csrf_token.as_deref() {
            Some(token) if !token.is_empty() => token,
            _ => {
                debug!(path = %request.path, "CSRF token header missing");
                return false;
            }
        };

        let identity = match &request.identity {
            Some(identity) => identity,
            None => {
                debug!(path = %request.path, "CSRF token sent without an identity");
                return false;
            }
        };

        let valid = self.csrf.validate(token, &identity.owner_id());
        if !valid {
            debug!(path = %request.path, user = %identity.user_id, "CSRF token rejected");
        }
        valid
    }
}
