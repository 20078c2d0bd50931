//! Patch vocabulary shared by [`diff`](crate::diff) and [`apply`](crate::apply).
//!
//! A patch is itself a [`Document`](crate::Document):
//!
//! | patch                                   | effect                                  |
//! |-----------------------------------------|-----------------------------------------|
//! | null, bool, number, string, array       | replace the target with this value      |
//! | `{ "key": patch, ... }`                 | patch each listed key of a mapping      |
//! | `{ "$delete": true }`                   | remove the key (mapping entries only)   |
//! | `{ "$replace": value }`                 | replace the target with `value` as-is   |
//! | `{ "$array": { "len": n, "items": {} } }` | resize to `n`, patch the listed indices |
//!
//! Mapping keys that begin with `$` are escaped inside a patch by doubling the
//! leading `$`, so user data can never be mistaken for a directive.

use serde_json::{json, Map, Value};

pub const DELETE: &str = "$delete";
pub const REPLACE: &str = "$replace";
pub const ARRAY: &str = "$array";
pub const ARRAY_LEN: &str = "len";
pub const ARRAY_ITEMS: &str = "items";

/// A directive recognized in a single-key patch object.
pub enum Directive<'a> {
    Delete,
    Replace(&'a Value),
    Array(&'a Value),
}

/// Recognize a directive object: exactly one key, and that key is a directive.
pub fn directive(map: &Map<String, Value>) -> Option<Directive<'_>> {
    if map.len() != 1 {
        return None;
    }
    let (key, value) = map.iter().next()?;
    match key.as_str() {
        DELETE => Some(Directive::Delete),
        REPLACE => Some(Directive::Replace(value)),
        ARRAY => Some(Directive::Array(value)),
        _ => None,
    }
}

pub fn delete_marker() -> Value {
    json!({ DELETE: true })
}

pub fn is_delete_marker(value: &Value) -> bool {
    matches!(value, Value::Object(map) if matches!(directive(map), Some(Directive::Delete)))
}

/// Wrap a value so that applying it replaces the target wholesale.
///
/// Non-object values already mean "replace"; objects would otherwise be read
/// as per-key patches.
pub fn replacement(value: &Value) -> Value {
    match value {
        Value::Object(_) => json!({ REPLACE: value }),
        other => other.clone(),
    }
}

pub fn escape_key(key: &str) -> String {
    if key.starts_with('$') {
        format!("${key}")
    } else {
        key.to_string()
    }
}

/// Reverse of [`escape_key`]. Returns `None` for an unescaped `$` key.
pub fn unescape_key(key: &str) -> Option<&str> {
    match key.strip_prefix('$') {
        Some(rest) if rest.starts_with('$') => Some(rest),
        Some(_) => None,
        None => Some(key),
    }
}
