// TTL-keyed store shared by rate limiting and CSRF tokens
pub mod store;

// Fixed-window rate limiter (IP, endpoint, user, plan tiers)
pub mod rate_limit;

// Session-bound CSRF tokens
pub mod csrf;

// Caller identity and header credentials
pub mod auth;

// Per-request composition of rate limits and CSRF
pub mod admission;

// Process-wide instance and lifecycle
pub mod gatekeeper;

// Configuration (TOML + env)
pub mod config;

// axum middleware and CSRF endpoints
pub mod api;

pub use admission::{AdmissionOutcome, AdmissionPolicy, Rejection, RequestInfo, Stage};
pub use gatekeeper::Gatekeeper;
