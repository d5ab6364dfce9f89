// Environment overrides, applied after the config file.
//
// Unparseable values are ignored and the file/default value is kept.

use super::GatekeeperConfig;
use std::str::FromStr;
use tracing::warn;

pub const ENV_CONFIG_PATH: &str = "GATEKEEPER_CONFIG";
pub const ENV_PER_IP: &str = "GATEKEEPER_PER_IP";
pub const ENV_PER_USER: &str = "GATEKEEPER_PER_USER";
pub const ENV_WINDOW_SECONDS: &str = "GATEKEEPER_WINDOW_SECONDS";
pub const ENV_CSRF_TTL_SECONDS: &str = "GATEKEEPER_CSRF_TTL_SECONDS";
pub const ENV_SWEEP_INTERVAL_SECONDS: &str = "GATEKEEPER_SWEEP_INTERVAL_SECONDS";
pub const ENV_BIND_ADDRESS: &str = "GATEKEEPER_BIND_ADDRESS";

/// Default config file location when `GATEKEEPER_CONFIG` is unset.
pub const DEFAULT_CONFIG_PATH: &str = "gatekeeper.toml";

/// Config file path from the environment, or the default.
pub fn config_path() -> String {
    std::env::var(ENV_CONFIG_PATH).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
}

fn parse<T, F>(lookup: &F, name: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(name)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(var = name, value = %raw, "Ignoring unparseable environment override");
            None
        }
    }
}

impl GatekeeperConfig {
    /// Apply `GATEKEEPER_*` variables from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Apply overrides from any variable source.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(n) = parse(&lookup, ENV_PER_IP) {
            self.rate_limit.per_ip = n;
        }
        if let Some(n) = parse(&lookup, ENV_PER_USER) {
            self.rate_limit.per_user = Some(n);
        }
        if let Some(n) = parse(&lookup, ENV_WINDOW_SECONDS) {
            self.rate_limit.window_seconds = n;
        }
        if let Some(n) = parse(&lookup, ENV_CSRF_TTL_SECONDS) {
            self.csrf.token_ttl_seconds = n;
        }
        if let Some(n) = parse(&lookup, ENV_SWEEP_INTERVAL_SECONDS) {
            self.sweep.interval_seconds = n;
        }
        if let Some(addr) = lookup(ENV_BIND_ADDRESS) {
            self.server.bind_address = addr;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_overrides_applied() {
        let mut config = GatekeeperConfig::default();
        config.apply_overrides_from(vars(&[
            (ENV_PER_IP, "250"),
            (ENV_PER_USER, "2000"),
            (ENV_WINDOW_SECONDS, "120"),
            (ENV_CSRF_TTL_SECONDS, "900"),
            (ENV_SWEEP_INTERVAL_SECONDS, "15"),
            (ENV_BIND_ADDRESS, "127.0.0.1:3000"),
        ]));

        assert_eq!(config.rate_limit.per_ip, 250);
        assert_eq!(config.rate_limit.per_user, Some(2000));
        assert_eq!(config.rate_limit.window_seconds, 120);
        assert_eq!(config.csrf.token_ttl_seconds, 900);
        assert_eq!(config.sweep.interval_seconds, 15);
        assert_eq!(config.server.bind_address, "127.0.0.1:3000");
    }

    #[test]
    fn test_bad_values_keep_defaults() {
        let mut config = GatekeeperConfig::default();
        config.apply_overrides_from(vars(&[(ENV_PER_IP, "lots"), (ENV_WINDOW_SECONDS, "-1")]));

        assert_eq!(config.rate_limit.per_ip, 100);
        assert_eq!(config.rate_limit.window_seconds, 60);
    }

    #[test]
    fn test_no_vars_no_change() {
        let mut config = GatekeeperConfig::default();
        config.apply_overrides_from(vars(&[]));
        assert_eq!(config.rate_limit.per_ip, 100);
        assert_eq!(config.rate_limit.per_user, None);
    }
}
