// Fixed-window admission counters, evaluated tier by tier.
//
// Tiers run in a fixed order (IP, endpoint, user, plan) and the first one
// over its cap rejects the request. Tiers that already counted the request
// keep that count; there is no rollback.

use crate::auth::{AuthMethod, Plan, ResolvedIdentity};
use crate::store::TtlStore;
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;


/// One independent rate-limit dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Ip,
    Endpoint,
    User,
    Plan,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Ip => "ip",
            Tier::Endpoint => "endpoint",
            Tier::User => "user",
            Tier::Plan => "plan",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caps for every tier. Immutable once the limiter is built.
#[derive(Debug, Clone)]
pub struct RateLimitPolicy {
    pub per_ip: u64,
    /// `None` skips the per-user tier entirely.
    pub per_user: Option<u64>,
    /// Exact route path → cap. Unlisted routes are not limited at this tier.
    pub per_endpoint: HashMap<String, u64>,
    pub plan_caps: HashMap<Plan, u64>,
    /// Window length shared by all tiers.
    pub window: Duration,
}

impl RateLimitPolicy {
    /// Cap for `plan`, falling back to the `free` cap.
    ///
    /// `None` if neither is configured, which disables the plan tier.
    pub fn plan_cap(&self, plan: Plan) -> Option<u64> {
        self.plan_caps
            .get(&plan)
            .or_else(|| self.plan_caps.get(&Plan::Free))
            .copied()
    }
}

/// Quota figures for the most specific tier that admitted a request.
///
/// Intended for `X-RateLimit-Limit` / `-Remaining` / `-Reset` headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quota {
    pub tier: Tier,
    pub limit: u64,
    pub remaining: u64,
    pub reset_after: Duration,
}

/// Outcome of a rate-limit evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateDecision {
    Allowed(Quota),
    Limited { tier: Tier, retry_after: Duration },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed(_))
    }

    /// Tier that rejected the request, if any.
    pub fn failed_tier(&self) -> Option<Tier> {
        match self {
            RateDecision::Allowed(_) => None,
            RateDecision::Limited { tier, .. } => Some(*tier),
        }
    }

    /// Seconds the caller should wait before retrying; 0 when allowed.
    pub fn retry_after_secs(&self) -> u64 {
        match self {
            RateDecision::Allowed(_) => 0,
            RateDecision::Limited { retry_after, .. } => retry_after.as_secs(),
        }
    }
}

/// A single tier evaluation: which tier, which counter key, which cap.
#[derive(Debug)]
struct TierCheck {
    tier: Tier,
    key: String,
    limit: u64,
}

/// Layered fixed-window rate limiter.
///
/// All tiers share one counter store; keys are namespaced per tier so they
/// never collide.
pub struct RateLimiter {
    policy: RateLimitPolicy,
    store: Arc<TtlStore<u64>>,
}

impl RateLimiter {
    pub fn new(policy: RateLimitPolicy, store: Arc<TtlStore<u64>>) -> Self {
        Self { policy, store }
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    pub fn store(&self) -> &Arc<TtlStore<u64>> {
        &self.store
    }

    /// Evaluate every applicable tier for one request.
    ///
    /// Unauthenticated requests only see the IP and endpoint tiers. The
    /// endpoint tier is keyed on IP + path, so it slows a hot route per
    /// caller rather than globally.
    pub fn admit(
        &self,
        client_ip: IpAddr,
        path: &str,
        identity: Option<&ResolvedIdentity>,
    ) -> RateDecision {
        let checks = self.applicable_checks(client_ip, path, identity);

        for check in &checks {
            if !self
                .store
                .try_consume(&check.key, check.limit, self.policy.window)
            {
                debug!(
                    tier = %check.tier,
                    key = %check.key,
                    limit = check.limit,
                    "Rate limit exceeded"
                );
                return RateDecision::Limited {
                    tier: check.tier,
                    retry_after: self.policy.window,
                };
            }
        }

        // Checks are ordered least to most specific; IP is always present.
        let quota = match checks.last() {
            Some(check) => Quota {
                tier: check.tier,
                limit: check.limit,
                remaining: self.store.remaining(&check.key, check.limit),
                reset_after: self
                    .store
                    .reset_in(&check.key)
                    .unwrap_or(self.policy.window),
            },
            None => Quota {
                tier: Tier::Ip,
                limit: self.policy.per_ip,
                remaining: self.policy.per_ip,
                reset_after: self.policy.window,
            },
        };

        RateDecision::Allowed(quota)
    }

    /// Remaining capacity for one tier without counting a request.
    ///
    /// Returns `None` when the tier does not apply to this caller.
    pub fn remaining(
        &self,
        tier: Tier,
        client_ip: IpAddr,
        path: &str,
        identity: Option<&ResolvedIdentity>,
    ) -> Option<u64> {
        self.applicable_checks(client_ip, path, identity)
            .into_iter()
            .find(|check| check.tier == tier)
            .map(|check| self.store.remaining(&check.key, check.limit))
    }

    fn applicable_checks(
        &self,
        client_ip: IpAddr,
        path: &str,
        identity: Option<&ResolvedIdentity>,
    ) -> Vec<TierCheck> {
        let mut checks = Vec::with_capacity(4);

        checks.push(TierCheck {
            tier: Tier::Ip,
            key: format!("ip:{}", client_ip),
            limit: self.policy.per_ip,
        });

        if let Some(&limit) = self.policy.per_endpoint.get(path) {
            checks.push(TierCheck {
                tier: Tier::Endpoint,
                key: format!("endpoint:{}:{}", client_ip, path),
                limit,
            });
        }

        let identity = match identity {
            Some(identity) => identity,
            None => return checks,
        };

        if let Some(limit) = self.policy.per_user {
            checks.push(TierCheck {
                tier: Tier::User,
                key: format!("user:{}", identity.user_id),
                limit,
            });
        }

        // API-key traffic always gets a plan (default free); other callers
        // only when the auth layer tagged one.
        let plan = match (identity.auth_method, identity.plan) {
            (_, Some(plan)) => Some(plan),
            (AuthMethod::ApiKey, None) => Some(Plan::Free),
            _ => None,
        };

        if let Some(limit) = plan.and_then(|plan| self.policy.plan_cap(plan)) {
            checks.push(TierCheck {
                tier: Tier::Plan,
                key: format!("apikey:{}", identity.user_id),
                limit,
            });
        }

        checks
    }
}
