use std::fmt;
use uuid::Uuid;

/// How the caller's credentials were presented.
///
/// Only cookie sessions are exposed to cross-site request forgery: browsers
/// attach cookies automatically, but never an explicit header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    CookieSession,
    Bearer,
    ApiKey,
}

impl AuthMethod {
    pub fn is_cookie(self) -> bool {
        matches!(self, AuthMethod::CookieSession)
    }
}

/// Subscription plan, used to pick the plan-tier cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Plan {
    Free,
    Basic,
    Pro,
    Enterprise,
}

impl Plan {
    /// Parse a plan tag, `None` if unrecognized.
    pub fn parse(tag: &str) -> Option<Plan> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "free" => Some(Plan::Free),
            "basic" => Some(Plan::Basic),
            "pro" => Some(Plan::Pro),
            "enterprise" => Some(Plan::Enterprise),
            _ => None,
        }
    }

    /// Parse a plan tag, falling back to `Free` for anything unrecognized.
    pub fn from_tag(tag: &str) -> Plan {
        Plan::parse(tag).unwrap_or(Plan::Free)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Basic => "basic",
            Plan::Pro => "pro",
            Plan::Enterprise => "enterprise",
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller identity as resolved by the authentication layer.
///
/// Built once per request upstream and handed to admission by value; the
/// admission code never looks identities up itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub user_id: Uuid,
    pub auth_method: AuthMethod,
    pub plan: Option<Plan>,
}

impl ResolvedIdentity {
    pub fn cookie_session(user_id: Uuid) -> Self {
        Self {
            user_id,
            auth_method: AuthMethod::CookieSession,
            plan: None,
        }
    }

    pub fn bearer(user_id: Uuid) -> Self {
        Self {
            user_id,
            auth_method: AuthMethod::Bearer,
            plan: None,
        }
    }

    pub fn api_key(user_id: Uuid, plan: Option<Plan>) -> Self {
        Self {
            user_id,
            auth_method: AuthMethod::ApiKey,
            plan,
        }
    }

    pub fn with_plan(mut self, plan: Plan) -> Self {
        self.plan = Some(plan);
        self
    }

    /// Identifier CSRF tokens are bound to.
    pub fn owner_id(&self) -> String {
        self.user_id.to_string()
    }
}
