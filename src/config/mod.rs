pub mod env;

use crate::auth::Plan;
use crate::rate_limit::RateLimitPolicy;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Complete gatekeeper configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatekeeperConfig {
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub csrf: CsrfConfig,
    #[serde(default)]
    pub sweep: SweepConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Rate limit caps, one fixed window for every tier
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_per_ip")]
    pub per_ip: u64,
    /// Unset disables the per-user tier
    #[serde(default)]
    pub per_user: Option<u64>,
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
    /// Exact route path → cap
    #[serde(default = "default_endpoints")]
    pub endpoints: HashMap<String, u64>,
    /// Plan name → cap. Unknown names are ignored with a warning.
    #[serde(default = "default_plans")]
    pub plans: HashMap<String, u64>,
}

fn default_per_ip() -> u64 {
    100
}

fn default_window_seconds() -> u64 {
    60
}

fn default_endpoints() -> HashMap<String, u64> {
    [
        ("/api/v1/auth/login", 5),
        ("/api/v1/auth/register", 3),
        ("/api/v1/auth/forgot-password", 3),
        ("/api/v1/auth/reset-password", 5),
    ]
    .into_iter()
    .map(|(path, cap)| (path.to_string(), cap))
    .collect()
}

fn default_plans() -> HashMap<String, u64> {
    [
        (Plan::Free, 100),
        (Plan::Basic, 1_000),
        (Plan::Pro, 10_000),
        (Plan::Enterprise, 100_000),
    ]
    .into_iter()
    .map(|(plan, cap)| (plan.to_string(), cap))
    .collect()
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_ip: default_per_ip(),
            per_user: None,
            window_seconds: default_window_seconds(),
            endpoints: default_endpoints(),
            plans: default_plans(),
        }
    }
}

impl RateLimitConfig {
    /// Build the immutable limiter policy.
    pub fn to_policy(&self) -> RateLimitPolicy {
        let window_seconds = if self.window_seconds == 0 {
            warn!("rate_limit.window_seconds is 0, using 1");
            1
        } else {
            self.window_seconds
        };

        let mut plan_caps = HashMap::with_capacity(self.plans.len());
        for (name, &cap) in &self.plans {
            match Plan::parse(name) {
                Some(plan) => {
                    plan_caps.insert(plan, cap);
                }
                None => warn!(plan = %name, "Ignoring cap for unknown plan"),
            }
        }

        RateLimitPolicy {
            per_ip: self.per_ip,
            per_user: self.per_user,
            per_endpoint: self.endpoints.clone(),
            plan_caps,
            window: Duration::from_secs(window_seconds),
        }
    }
}

/// CSRF token settings
#[derive(Debug, Clone, Deserialize)]
pub struct CsrfConfig {
    #[serde(default = "default_token_ttl")]
    pub token_ttl_seconds: u64,
    /// Request header the token is read from
    #[serde(default = "default_header_name")]
    pub header_name: String,
    /// Pre-authentication routes exempt from the CSRF check
    #[serde(default = "default_public_routes")]
    pub public_routes: Vec<String>,
}

fn default_token_ttl() -> u64 {
    24 * 60 * 60
}

fn default_header_name() -> String {
    "X-CSRF-Token".to_string()
}

fn default_public_routes() -> Vec<String> {
    vec![
        "/api/v1/auth/login".to_string(),
        "/api/v1/auth/register".to_string(),
        "/api/v1/auth/forgot-password".to_string(),
        "/api/v1/auth/reset-password".to_string(),
        "/health".to_string(),
    ]
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            token_ttl_seconds: default_token_ttl(),
            header_name: default_header_name(),
            public_routes: default_public_routes(),
        }
    }
}

impl CsrfConfig {
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_seconds.max(1))
    }
}

/// Background sweep settings
#[derive(Debug, Clone, Deserialize)]
pub struct SweepConfig {
    #[serde(default = "default_sweep_interval")]
    pub interval_seconds: u64,
    /// Counters are evicted after this many windows without activity
    #[serde(default = "default_rate_limit_stale_multiple")]
    pub rate_limit_stale_multiple: u32,
    /// Tokens are evicted after this many TTLs
    #[serde(default = "default_token_stale_multiple")]
    pub token_stale_multiple: u32,
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_rate_limit_stale_multiple() -> u32 {
    2
}

fn default_token_stale_multiple() -> u32 {
    1
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_sweep_interval(),
            rate_limit_stale_multiple: default_rate_limit_stale_multiple(),
            token_stale_multiple: default_token_stale_multiple(),
        }
    }
}

impl SweepConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds.max(1))
    }
}

/// HTTP server settings (binary only)
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config file: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
        }
    }
}

/// Load configuration from TOML file
pub fn load_config(path: impl AsRef<Path>) -> Result<GatekeeperConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
    toml::from_str(&contents).map_err(ConfigError::Parse)
}

/// Load from `path` if it exists, otherwise defaults; then apply env overrides.
pub fn load_or_default(path: impl AsRef<Path>) -> Result<GatekeeperConfig, ConfigError> {
    let path = path.as_ref();
    let mut config = if path.exists() {
        load_config(path)?
    } else {
        warn!(path = %path.display(), "Config file not found, using defaults");
        GatekeeperConfig::default()
    };
    config.apply_env_overrides();
    Ok(config)
}
