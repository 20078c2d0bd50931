//! Minimal structural diff between two documents.
//!
//! Mappings are diffed per key, arrays per index. Keys are emitted in the
//! modified document's order followed by removed keys in the base document's
//! order, which makes the output deterministic.

use crate::patch::{delete_marker, escape_key, replacement, ARRAY, ARRAY_ITEMS, ARRAY_LEN};
use crate::Document;
use serde_json::{json, Map, Value};

/// Compute the patch that turns `base` into `modified`.
///
/// Returns `None` when both documents are structurally equal.
pub fn diff(base: &Document, modified: &Document) -> Option<Document> {
    if base == modified {
        return None;
    }
    Some(diff_values(base, modified))
}

/// Callers guarantee `base != modified`.
fn diff_values(base: &Value, modified: &Value) -> Value {
    match (base, modified) {
        (Value::Object(b), Value::Object(m)) => Value::Object(diff_objects(b, m)),
        (Value::Array(b), Value::Array(m)) => diff_arrays(b, m),
        _ => replacement(modified),
    }
}

fn diff_objects(base: &Map<String, Value>, modified: &Map<String, Value>) -> Map<String, Value> {
    let mut patch = Map::new();

    for (key, new_value) in modified {
        match base.get(key) {
            Some(old_value) if old_value == new_value => {}
            Some(old_value) => {
                patch.insert(escape_key(key), diff_values(old_value, new_value));
            }
            None => {
                patch.insert(escape_key(key), replacement(new_value));
            }
        }
    }

    for key in base.keys() {
        if !modified.contains_key(key) {
            patch.insert(escape_key(key), delete_marker());
        }
    }

    patch
}

/// Per-index patch, unless replacing the whole array serializes shorter.
fn diff_arrays(base: &[Value], modified: &[Value]) -> Value {
    let mut items = Map::new();
    for (idx, new_value) in modified.iter().enumerate() {
        match base.get(idx) {
            Some(old_value) if old_value == new_value => {}
            Some(old_value) => {
                items.insert(idx.to_string(), diff_values(old_value, new_value));
            }
            None => {
                items.insert(idx.to_string(), replacement(new_value));
            }
        }
    }

    let indexed = json!({ ARRAY: { ARRAY_LEN: modified.len(), ARRAY_ITEMS: items } });
    let whole = Value::Array(modified.to_vec());

    if indexed.to_string().len() < whole.to_string().len() {
        indexed
    } else {
        whole
    }
}
