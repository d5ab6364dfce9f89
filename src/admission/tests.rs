use super::*;
use crate::auth::{Plan, ResolvedIdentity};
use crate::rate_limit::RateLimitPolicy;
use crate::store::{ManualClock, TtlStore};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use uuid::Uuid;

const WINDOW: Duration = Duration::from_secs(60);
const SEND: &str = "/api/v1/email/send";
const LOGIN: &str = "/api/v1/auth/login";

fn client() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(198, 51, 100, 7))
}

fn open_policy() -> RateLimitPolicy {
    RateLimitPolicy {
        per_ip: 1_000,
        per_user: None,
        per_endpoint: HashMap::new(),
        plan_caps: HashMap::new(),
        window: WINDOW,
    }
}

fn admission(policy: RateLimitPolicy) -> (AdmissionPolicy, ManualClock) {
    let clock = ManualClock::new();
    let rate_store = Arc::new(TtlStore::new(Arc::new(clock.clone()), 2));
    let token_store = Arc::new(TtlStore::new(Arc::new(clock.clone()), 1));
    let limiter = Arc::new(RateLimiter::new(policy, rate_store));
    let csrf = Arc::new(CsrfTokenService::new(token_store, Duration::from_secs(3600)));
    let policy = AdmissionPolicy::new(limiter, csrf, vec![LOGIN.to_string()]);
    (policy, clock)
}

#[cfg(test)]
mod csrf_exemption_tests {
    use super::*;

    #[test]
    fn safe_methods_are_exempt() {
        let (policy, _clock) = admission(open_policy());
        let user = ResolvedIdentity::cookie_session(Uuid::new_v4());

        for method in [Method::GET, Method::HEAD, Method::OPTIONS, Method::TRACE] {
            let request = RequestInfo::new(client(), method, SEND).with_identity(user.clone());
            assert!(!policy.requires_csrf(&request));
            assert!(policy.admit(&request).is_admitted());
        }
    }

    #[test]
    fn state_changing_methods_need_token() {
        let (policy, _clock) = admission(open_policy());
        let user = ResolvedIdentity::cookie_session(Uuid::new_v4());

        for method in [Method::POST, Method::PUT, Method::PATCH, Method::DELETE] {
            let request = RequestInfo::new(client(), method, SEND).with_identity(user.clone());
            assert!(policy.requires_csrf(&request));
        }
    }

    #[test]
    fn public_routes_are_exempt() {
        let (policy, _clock) = admission(open_policy());

        let request = RequestInfo::new(client(), Method::POST, LOGIN);
        assert!(!policy.requires_csrf(&request));
        assert!(policy.admit(&request).is_admitted());
    }

    #[test]
    fn non_cookie_identities_are_exempt() {
        let (policy, _clock) = admission(open_policy());

        let bearer = RequestInfo::new(client(), Method::POST, SEND)
            .with_identity(ResolvedIdentity::bearer(Uuid::new_v4()));
        let api_key = RequestInfo::new(client(), Method::POST, SEND)
            .with_identity(ResolvedIdentity::api_key(Uuid::new_v4(), Some(Plan::Basic)));

        assert!(policy.admit(&bearer).is_admitted());
        assert!(policy.admit(&api_key).is_admitted());
    }

    #[test]
    fn presented_bearer_header_is_exempt_even_with_cookie_session() {
        let (policy, _clock) = admission(open_policy());

        let request = RequestInfo::new(client(), Method::POST, SEND)
            .with_identity(ResolvedIdentity::cookie_session(Uuid::new_v4()))
            .with_non_cookie_credentials(true);

        assert!(policy.admit(&request).is_admitted());
    }
}

#[cfg(test)]
mod csrf_check_tests {
    use super::*;

    #[test]
    fn cookie_session_without_header_is_rejected() {
        let (policy, _clock) = admission(open_policy());

        let request = RequestInfo::new(client(), Method::POST, SEND)
            .with_identity(ResolvedIdentity::cookie_session(Uuid::new_v4()));

        assert_eq!(
            policy.admit(&request),
            AdmissionOutcome::Rejected(Rejection::CsrfFailed)
        );
    }

    #[test]
    fn cookie_session_with_valid_token_is_admitted() {
        let (policy, _clock) = admission(open_policy());
        let user = ResolvedIdentity::cookie_session(Uuid::new_v4());
        let token = policy.csrf().issue(&user.owner_id()).unwrap();

        let request = RequestInfo::new(client(), Method::POST, SEND)
            .with_identity(user)
            .with_csrf_token(token);

        assert!(policy.admit(&request).is_admitted());
    }

    #[test]
    fn token_of_another_user_is_rejected() {
        let (policy, _clock) = admission(open_policy());
        let victim = ResolvedIdentity::cookie_session(Uuid::new_v4());
        let attacker = ResolvedIdentity::cookie_session(Uuid::new_v4());
        let token = policy.csrf().issue(&attacker.owner_id()).unwrap();

        let request = RequestInfo::new(client(), Method::POST, SEND)
            .with_identity(victim)
            .with_csrf_token(token);

        assert_eq!(
            policy.admit(&request),
            AdmissionOutcome::Rejected(Rejection::CsrfFailed)
        );
    }

    #[test]
    fn expired_token_is_rejected_like_missing_one() {
        let (policy, clock) = admission(open_policy());
        let user = ResolvedIdentity::cookie_session(Uuid::new_v4());
        let token = policy.csrf().issue(&user.owner_id()).unwrap();
        clock.advance(Duration::from_secs(3600));

        let expired = RequestInfo::new(client(), Method::POST, SEND)
            .with_identity(user.clone())
            .with_csrf_token(token);
        let missing = RequestInfo::new(client(), Method::POST, SEND).with_identity(user);

        assert_eq!(policy.admit(&expired), policy.admit(&missing));
    }

    #[test]
    fn anonymous_state_change_fails_closed() {
        let (policy, _clock) = admission(open_policy());

        let request =
            RequestInfo::new(client(), Method::POST, SEND).with_csrf_token("whatever");

        assert_eq!(
            policy.admit(&request),
            AdmissionOutcome::Rejected(Rejection::CsrfFailed)
        );
    }

    #[test]
    fn empty_header_counts_as_missing() {
        let (policy, _clock) = admission(open_policy());

        let request = RequestInfo::new(client(), Method::POST, SEND)
            .with_identity(ResolvedIdentity::cookie_session(Uuid::new_v4()))
            .with_csrf_token("");

        assert!(!policy.admit(&request).is_admitted());
    }

    #[test]
    fn validate_csrf_matches_service() {
        let (policy, _clock) = admission(open_policy());
        let token = policy.csrf().issue("owner-1").unwrap();

        assert!(policy.validate_csrf(&token, "owner-1"));
        assert!(!policy.validate_csrf(&token, "owner-2"));
    }
}

#[cfg(test)]
mod ordering_tests {
    use super::*;

    #[test]
    fn rate_limit_runs_before_csrf() {
        let (policy, _clock) = admission(RateLimitPolicy {
            per_ip: 1,
            ..open_policy()
        });
        let user = ResolvedIdentity::cookie_session(Uuid::new_v4());

        // Consumes the only IP slot, then fails CSRF
        let request = RequestInfo::new(client(), Method::POST, SEND).with_identity(user);
        assert_eq!(
            policy.admit(&request),
            AdmissionOutcome::Rejected(Rejection::CsrfFailed)
        );

        // Second attempt never reaches the CSRF check
        match policy.admit(&request) {
            AdmissionOutcome::Rejected(rejection) => {
                assert_eq!(
                    rejection,
                    Rejection::QuotaExceeded {
                        tier: Tier::Ip,
                        retry_after: WINDOW,
                    }
                );
                assert_eq!(rejection.stage(), Stage::IpCheck);
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn admitted_outcome_carries_quota() {
        let (policy, _clock) = admission(RateLimitPolicy {
            per_ip: 5,
            ..open_policy()
        });

        let request = RequestInfo::new(client(), Method::GET, "/api/v1/templates");
        match policy.admit(&request) {
            AdmissionOutcome::Admitted { quota } => {
                assert_eq!(quota.tier, Tier::Ip);
                assert_eq!(quota.limit, 5);
                assert_eq!(quota.remaining, 4);
            }
            other => panic!("expected admitted, got {:?}", other),
        }
    }

    #[test]
    fn plan_rejection_maps_to_plan_stage() {
        let mut plan_caps = HashMap::new();
        plan_caps.insert(Plan::Free, 1);
        let (policy, _clock) = admission(RateLimitPolicy {
            plan_caps,
            ..open_policy()
        });
        let caller = ResolvedIdentity::api_key(Uuid::new_v4(), None);
        let request = RequestInfo::new(client(), Method::POST, SEND).with_identity(caller);

        assert!(policy.admit(&request).is_admitted());
        let outcome = policy.admit(&request);
        assert_eq!(outcome.stage(), Stage::Rejected);
        match outcome {
            AdmissionOutcome::Rejected(rejection) => {
                assert_eq!(rejection.stage(), Stage::PlanCheck)
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn rejection_display_includes_retry_hint() {
        let rejection = Rejection::QuotaExceeded {
            tier: Tier::Endpoint,
            retry_after: WINDOW,
        };
        assert_eq!(
            rejection.to_string(),
            "Rate limit exceeded at endpoint tier, retry after 60s"
        );
        assert_eq!(Rejection::CsrfFailed.to_string(), "CSRF check failed");
    }
}
