//! Process-wide admission state.
//!
//! One `Gatekeeper` owns the rate-limit counter store, the CSRF token store,
//! and their sweep tasks. It is built once and handed to the HTTP layer as
//! state; nothing reaches it through a global lookup on the request path.

use crate::admission::AdmissionPolicy;
use crate::config::GatekeeperConfig;
use crate::csrf::CsrfTokenService;
use crate::rate_limit::RateLimiter;
use crate::store::{spawn_sweeper, Clock, SweepHandle, SystemClock, TtlStore};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;
use tracing::{info, warn};

static GLOBAL: OnceLock<Arc<Gatekeeper>> = OnceLock::new();

pub struct Gatekeeper {
    policy: AdmissionPolicy,
    rate_store: Arc<TtlStore<u64>>,
    token_store: Arc<TtlStore<String>>,
    csrf_header: String,
    sweep_interval: Duration,
    sweepers: Mutex<Vec<SweepHandle>>,
}

impl Gatekeeper {
    /// Build stores, limiter, token service and policy from `config`.
    ///
    /// Does not start the sweepers; see [`Gatekeeper::start_sweepers`].
    pub fn new(config: &GatekeeperConfig, clock: Arc<dyn Clock>) -> Self {
        let rate_store = Arc::new(TtlStore::new(
            Arc::clone(&clock),
            config.sweep.rate_limit_stale_multiple,
        ));
        let token_store = Arc::new(TtlStore::new(clock, config.sweep.token_stale_multiple));

        let limiter = Arc::new(RateLimiter::new(
            config.rate_limit.to_policy(),
            Arc::clone(&rate_store),
        ));
        let csrf = Arc::new(CsrfTokenService::new(
            Arc::clone(&token_store),
            config.csrf.token_ttl(),
        ));
        let policy = AdmissionPolicy::new(limiter, csrf, config.csrf.public_routes.clone());

        Self {
            policy,
            rate_store,
            token_store,
            csrf_header: config.csrf.header_name.to_ascii_lowercase(),
            sweep_interval: config.sweep.interval(),
            sweepers: Mutex::new(Vec::new()),
        }
    }

    pub fn policy(&self) -> &AdmissionPolicy {
        &self.policy
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        self.policy.limiter()
    }

    pub fn csrf(&self) -> &Arc<CsrfTokenService> {
        self.policy.csrf()
    }

    /// Lower-cased name of the header the CSRF token is read from.
    pub fn csrf_header(&self) -> &str {
        &self.csrf_header
    }

    pub fn rate_store(&self) -> &Arc<TtlStore<u64>> {
        &self.rate_store
    }

    pub fn token_store(&self) -> &Arc<TtlStore<String>> {
        &self.token_store
    }

    /// Spawn the sweep task for each store.
    ///
    /// Needs a tokio runtime; without one it logs and does nothing.
    /// Calling it again while sweepers run is a no-op.
    pub fn start_sweepers(&self) {
        if tokio::runtime::Handle::try_current().is_err() {
            warn!("No tokio runtime, store sweepers not started");
            return;
        }

        let mut sweepers = self.sweepers.lock().unwrap_or_else(PoisonError::into_inner);
        if !sweepers.is_empty() {
            return;
        }

        sweepers.push(spawn_sweeper(
            Arc::clone(&self.rate_store),
            self.sweep_interval,
            "rate_limit",
        ));
        sweepers.push(spawn_sweeper(
            Arc::clone(&self.token_store),
            self.sweep_interval,
            "csrf_tokens",
        ));

        info!(
            interval_seconds = self.sweep_interval.as_secs(),
            "Store sweepers started"
        );
    }

    /// Number of sweep tasks currently owned.
    pub fn sweeper_count(&self) -> usize {
        self.sweepers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Stop and join every sweep task.
    pub async fn shutdown(&self) {
        let handles: Vec<SweepHandle> = {
            let mut sweepers = self.sweepers.lock().unwrap_or_else(PoisonError::into_inner);
            sweepers.drain(..).collect()
        };

        for handle in handles {
            handle.shutdown().await;
        }

        info!("Store sweepers stopped");
    }
}

/// Build the process-wide gatekeeper exactly once and start its sweepers.
///
/// Concurrent first callers race on the same `OnceLock`; only one
/// construction runs and every caller gets the same instance. Later calls
/// ignore `config`.
pub fn init_global(config: &GatekeeperConfig) -> Arc<Gatekeeper> {
    let gatekeeper = GLOBAL.get_or_init(|| {
        let gatekeeper = Arc::new(Gatekeeper::new(config, Arc::new(SystemClock)));
        info!(
            per_ip = config.rate_limit.per_ip,
            window_seconds = config.rate_limit.window_seconds,
            "Gatekeeper initialized"
        );
        gatekeeper
    });
    gatekeeper.start_sweepers();
    Arc::clone(gatekeeper)
}

/// The process-wide gatekeeper, if [`init_global`] has run.
pub fn global() -> Option<Arc<Gatekeeper>> {
    GLOBAL.get().cloned()
}
