//! Manifest template and overlay merging.

use serde_json::{json, Map, Value};

/// Builds a fresh copy of the base manifest skeleton.
pub fn base_manifest(version: &str) -> Value {
    json!({
        "name": message_ref(EXTENSION_NAME),
        "description": message_ref(EXTENSION_DESCRIPTION),
        "manifest_version": 2,
        "version": version,
        "applications": { "gecko": { "id": "" } },
        "hidden": true,
        "default_locale": "",
        "chrome_settings_overrides": { "search_provider": {} }
    })
}

pub const EXTENSION_NAME: &str = "extensionName";
pub const EXTENSION_DESCRIPTION: &str = "extensionDescription";

/// Placeholder token referencing a message catalog key.
pub fn message_ref(key: &str) -> String {
    format!("__MSG_{}__", key)
}

/// Returns a new tree with `overlay` deep-merged onto `base`.
///
/// Objects merge key by key; any other overlay value replaces the base
/// value, and `null` removes the key.
pub fn merge(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            let mut merged = base_map.clone();
            merge_into(&mut merged, overlay_map);
            Value::Object(merged)
        }
        (_, overlay) => overlay.clone(),
    }
}

fn merge_into(target: &mut Map<String, Value>, overlay: &Map<String, Value>) {
    for (key, value) in overlay {
        match value {
            Value::Null => {
                target.remove(key);
            }
            Value::Object(_) => {
                let merged = match target.get(key) {
                    Some(existing) => merge(existing, value),
                    None => merge(&Value::Object(Map::new()), value),
                };
                target.insert(key.clone(), merged);
            }
            other => {
                target.insert(key.clone(), other.clone());
            }
        }
    }
}

/// Collects every `__MSG_key__` reference in a tree, in document order.
pub fn message_refs(value: &Value) -> Vec<String> {
    let mut refs = Vec::new();
    collect_refs(value, &mut refs);
    refs
}

fn collect_refs(value: &Value, refs: &mut Vec<String>) {
    match value {
        Value::String(s) => {
            if let Some(key) = s
                .strip_prefix("__MSG_")
                .and_then(|rest| rest.strip_suffix("__"))
            {
                if !refs.iter().any(|r| r == key) {
                    refs.push(key.to_string());
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_refs(v, refs)),
        Value::Object(map) => map.values().for_each(|v| collect_refs(v, refs)),
        _ => {}
    }
}
