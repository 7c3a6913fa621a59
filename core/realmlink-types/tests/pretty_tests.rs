use pretty_assertions::assert_eq;
use realmlink_types::pretty_print;
use serde_json::json;

#[test]
fn primitives() {
    assert_eq!(pretty_print(&json!("hi"), 2), "\"hi\"");
    assert_eq!(pretty_print(&json!(3), 2), "3");
    assert_eq!(pretty_print(&json!(true), 2), "true");
    assert_eq!(pretty_print(&json!(null), 2), "null");
}

#[test]
fn zero_depth_is_ellipsis() {
    assert_eq!(pretty_print(&json!("hi"), 0), "…");
}

#[test]
fn arrays_show_three_items() {
    assert_eq!(pretty_print(&json!([]), 2), "[]");
    assert_eq!(pretty_print(&json!([1, 2]), 2), "[ 1, 2 ]");
    assert_eq!(pretty_print(&json!([1, 2, 3]), 2), "[ 1, 2, 3 ]");
    assert_eq!(pretty_print(&json!([1, 2, 3, 4]), 2), "[ 1, 2, 3, … ]");
}

#[test]
fn shallow_arrays_collapse() {
    assert_eq!(pretty_print(&json!([1, 2]), 1), "[ … ]");
}

#[test]
fn objects_show_two_keys() {
    assert_eq!(pretty_print(&json!({}), 2), "{}");
    assert_eq!(pretty_print(&json!({"name": "x"}), 2), "{ name: \"x\" }");
    assert_eq!(
        pretty_print(&json!({"aa": 1, "bb": 2, "cc": 3}), 2),
        "{ aa: 1, bb: 2, … }"
    );
}

#[test]
fn objects_keep_insertion_order() {
    assert_eq!(
        pretty_print(&json!({"zeta": 1, "alpha": 2, "mid": 3}), 2),
        "{ zeta: 1, alpha: 2, … }"
    );
    let parsed: serde_json::Value = serde_json::from_str(r#"{"b": true, "a": false}"#).unwrap();
    assert_eq!(pretty_print(&parsed, 2), "{ b: true, a: false }");
}

#[test]
fn nested_values_truncate_at_depth() {
    assert_eq!(
        pretty_print(&json!({"outer": {"inner": 1}}), 2),
        "{ outer: { inner: … } }"
    );
}

#[test]
fn odd_keys_are_quoted() {
    assert_eq!(pretty_print(&json!({"my key": 1}), 2), "{ \"my key\": 1 }");
}
