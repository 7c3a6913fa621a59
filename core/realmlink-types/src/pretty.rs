//! Short, human-readable rendering of arbitrary values.
//!
//! Sandboxes hand console arguments to the host as JSON values; this turns
//! them into one-line previews. Output is bounded: arrays show at most three
//! items, objects at most their first two keys in insertion order, and nesting
//! past `depth` becomes `…`.

use serde_json::Value;

const ELLIPSIS: &str = "…";
const MAX_ITEMS: usize = 3;
const MAX_KEYS: usize = 2;

/// Renders `value` as a bounded one-line preview.
pub fn pretty_print(value: &Value, depth: usize) -> String {
    if depth == 0 {
        return ELLIPSIS.to_string();
    }
    match value {
        Value::Array(items) => print_array(items, depth),
        Value::Object(map) => print_object(map, depth),
        other => print_primitive(other),
    }
}

fn print_primitive(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{s}\""),
        other => other.to_string(),
    }
}

fn print_array(items: &[Value], depth: usize) -> String {
    if items.is_empty() {
        return "[]".to_string();
    }
    if depth <= 1 {
        return format!("[ {ELLIPSIS} ]");
    }
    let shown: Vec<String> = items
        .iter()
        .take(MAX_ITEMS)
        .map(|item| pretty_print(item, depth - 1))
        .collect();
    if items.len() <= MAX_ITEMS {
        format!("[ {} ]", shown.join(", "))
    } else {
        format!("[ {}, {ELLIPSIS} ]", shown.join(", "))
    }
}

fn print_object(map: &serde_json::Map<String, Value>, depth: usize) -> String {
    if map.is_empty() {
        return "{}".to_string();
    }
    let pairs: Vec<String> = map
        .iter()
        .take(MAX_KEYS)
        .map(|(key, value)| format!("{}: {}", print_key(key), pretty_print(value, depth - 1)))
        .collect();
    if map.len() <= MAX_KEYS {
        format!("{{ {} }}", pairs.join(", "))
    } else {
        format!("{{ {}, {ELLIPSIS} }}", pairs.join(", "))
    }
}

/// Identifier-like keys print bare, everything else quoted.
fn print_key(key: &str) -> String {
    let mut chars = key.chars();
    let bare = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {
            let rest: Vec<char> = chars.collect();
            !rest.is_empty() && rest.iter().all(|c| c.is_ascii_alphanumeric() || *c == '_')
        }
        _ => false,
    };
    if bare {
        key.to_string()
    } else {
        format!("\"{key}\"")
    }
}
