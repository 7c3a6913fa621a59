use realmlink_types::{CorrelationId, RealmContext, RealmId, RealmRole};
use std::collections::HashSet;
use std::str::FromStr;

// ── RealmId ───────────────────────────────────────────────────────

#[test]
fn realm_id_new_is_unique() {
    assert_ne!(RealmId::new(), RealmId::new());
}

#[test]
fn realm_id_display_and_parse() {
    let id = RealmId::new();
    let parsed = RealmId::parse(&id.to_string()).unwrap();
    assert_eq!(id, parsed);
}

#[test]
fn realm_id_parse_invalid() {
    assert!(RealmId::parse("not-a-uuid").is_err());
}

#[test]
fn realm_ids_sort_by_creation() {
    let a = RealmId::new();
    std::thread::sleep(std::time::Duration::from_millis(2));
    let b = RealmId::new();
    assert!(a < b);
}

// ── CorrelationId ─────────────────────────────────────────────────

#[test]
fn correlation_ids_are_unique_in_bulk() {
    let ids: HashSet<CorrelationId> = (0..1000).map(|_| CorrelationId::new()).collect();
    assert_eq!(ids.len(), 1000);
}

#[test]
fn correlation_id_from_str_roundtrip() {
    let id = CorrelationId::new();
    let parsed = CorrelationId::from_str(&id.to_string()).unwrap();
    assert_eq!(id, parsed);
}

#[test]
fn correlation_id_is_v4() {
    assert_eq!(CorrelationId::new().as_uuid().get_version_num(), 4);
}

// ── RealmContext ──────────────────────────────────────────────────

#[test]
fn context_roles() {
    let top = RealmContext::new(RealmRole::Top, "https://host.test");
    let nested = RealmContext::new(RealmRole::Nested, "https://host.test");
    assert!(top.is_top());
    assert!(!nested.is_top());
    assert_ne!(top.id, nested.id);
}

#[test]
fn context_with_id_keeps_id() {
    let id = RealmId::new();
    let ctx = RealmContext::with_id(id, RealmRole::Worker, "https://host.test");
    assert_eq!(ctx.id, id);
    assert_eq!(ctx.origin, "https://host.test");
}
