// HTTP adapter over the admission core: middleware + CSRF token endpoints

mod csrf;
mod error;
pub mod middleware;

pub use csrf::{create_csrf_router, CsrfTokenResponse, RefreshResponse, RevokeQuery};
pub use middleware::{admission_middleware, request_info, ClientIp};

use crate::gatekeeper::Gatekeeper;
use axum::{http::StatusCode, routing::get, Router};
use std::sync::Arc;

/// Put every route of `router` behind admission control.
pub fn with_admission(router: Router, gatekeeper: Arc<Gatekeeper>) -> Router {
    router.layer(axum::middleware::from_fn_with_state(
        gatekeeper,
        admission_middleware,
    ))
}

/// Liveness route
pub fn create_health_router() -> Router {
    Router::new().route("/health", get(|| async { StatusCode::OK }))
}

/// Health + CSRF routes, all behind admission control.
pub fn create_router(gatekeeper: Arc<Gatekeeper>) -> Router {
    let routes = create_health_router().merge(create_csrf_router(Arc::clone(&gatekeeper)));
    with_admission(routes, gatekeeper)
}
