use super::*;
use crate::store::ManualClock;

const TTL: Duration = Duration::from_secs(3600);

fn service() -> (CsrfTokenService, ManualClock) {
    let clock = ManualClock::new();
    let store = Arc::new(TtlStore::new(Arc::new(clock.clone()), 1));
    (CsrfTokenService::new(store, TTL), clock)
}

#[test]
fn test_issued_token_validates_for_owner() {
    let (service, _clock) = service();

    let token = service.issue("alice").unwrap();
    assert!(service.validate(&token, "alice"));
}

#[test]
fn test_token_rejected_for_other_owner() {
    let (service, _clock) = service();

    let token = service.issue("alice").unwrap();
    assert!(!service.validate(&token, "bob"));
    assert!(!service.validate(&token, ""));
    assert!(!service.validate(&token, "alice "));
}

#[test]
fn test_token_format() {
    let (service, _clock) = service();

    let token = service.issue("alice").unwrap();
    // 32 bytes, base64 without padding
    assert_eq!(token.len(), 43);
    assert!(token
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
}

#[test]
fn test_tokens_are_unique() {
    let (service, _clock) = service();

    let a = service.issue("alice").unwrap();
    let b = service.issue("alice").unwrap();
    assert_ne!(a, b);
    assert!(service.validate(&a, "alice"));
    assert!(service.validate(&b, "alice"));
}

#[test]
fn test_unknown_and_empty_tokens_rejected() {
    let (service, _clock) = service();

    assert!(!service.validate("never-issued", "alice"));
    assert!(!service.validate("", "alice"));
}

#[test]
fn test_expired_token_looks_like_unknown() {
    let (service, clock) = service();

    let token = service.issue("alice").unwrap();
    clock.advance(TTL);

    assert_eq!(
        service.validate(&token, "alice"),
        service.validate("never-issued", "alice")
    );
    assert!(!service.validate(&token, "alice"));
}

#[test]
fn test_refresh_extends_validity() {
    let (service, clock) = service();

    let token = service.issue("alice").unwrap();
    clock.advance(Duration::from_secs(3000));
    assert!(service.refresh(&token));

    clock.advance(Duration::from_secs(3000));
    assert!(service.validate(&token, "alice"));
}

#[test]
fn test_refresh_expired_or_unknown_is_noop() {
    let (service, clock) = service();

    let token = service.issue("alice").unwrap();
    clock.advance(TTL + Duration::from_secs(1));

    assert!(!service.refresh(&token));
    assert!(!service.validate(&token, "alice"));
    assert!(!service.refresh("never-issued"));
}

#[test]
fn test_revoke_is_idempotent() {
    let (service, _clock) = service();

    let token = service.issue("alice").unwrap();
    service.revoke(&token);
    assert!(!service.validate(&token, "alice"));

    service.revoke(&token);
    service.revoke("never-issued");
    assert!(service.is_empty());
}

#[test]
fn test_revoke_owner_leaves_other_owners() {
    let (service, _clock) = service();

    let a1 = service.issue("alice").unwrap();
    let a2 = service.issue("alice").unwrap();
    let b = service.issue("bob").unwrap();

    assert_eq!(service.revoke_owner("alice"), 2);
    assert!(!service.validate(&a1, "alice"));
    assert!(!service.validate(&a2, "alice"));
    assert!(service.validate(&b, "bob"));
}

#[test]
fn test_sweep_removes_expired_tokens() {
    let (service, clock) = service();

    service.issue("alice").unwrap();
    clock.advance(Duration::from_secs(3000));
    let live = service.issue("bob").unwrap();
    clock.advance(Duration::from_secs(1000));

    assert_eq!(service.len(), 2);
    assert_eq!(service.store().sweep(), 1);
    assert_eq!(service.len(), 1);
    assert!(service.validate(&live, "bob"));
}

#[test]
fn test_entropy_error_display() {
    let err = CsrfError::Entropy("device not configured".to_string());
    assert_eq!(
        err.to_string(),
        "Secure random source unavailable: device not configured"
    );
}
