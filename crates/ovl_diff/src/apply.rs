//! Merge a patch onto a base document.

use crate::error::{Error, Result};
use crate::patch::{directive, is_delete_marker, unescape_key, Directive, ARRAY_ITEMS, ARRAY_LEN};
use crate::Document;
use serde_json::{Map, Value};

/// Apply `patch` on top of `base`, producing a new document.
///
/// `base` is never modified. A per-key patch applied to something that is not
/// a mapping starts from an empty mapping, and a null patch replaces the target
/// with null (it does not delete it).
///
/// # Errors
///
/// Fails when the patch uses an unknown `$` directive, a misplaced `$delete`,
/// or a malformed `$array` table.
pub fn apply(base: &Document, patch: &Document) -> Result<Document> {
    apply_value(Some(base), patch, "")
}

fn apply_value(base: Option<&Value>, patch: &Value, path: &str) -> Result<Value> {
    let Value::Object(map) = patch else {
        return Ok(patch.clone());
    };

    match directive(map) {
        Some(Directive::Replace(value)) => Ok(value.clone()),
        Some(Directive::Array(table)) => apply_array(base, table, path),
        Some(Directive::Delete) => Err(Error::MisplacedDelete {
            path: path.to_string(),
        }),
        None => apply_object(base, map, path),
    }
}

fn apply_object(base: Option<&Value>, patch: &Map<String, Value>, path: &str) -> Result<Value> {
    let mut result = match base {
        Some(Value::Object(existing)) => existing.clone(),
        _ => Map::new(),
    };

    for (raw_key, sub_patch) in patch {
        let key = unescape_key(raw_key).ok_or_else(|| Error::UnknownDirective {
            path: path.to_string(),
            directive: raw_key.clone(),
        })?;

        if is_delete_marker(sub_patch) {
            result.shift_remove(key);
            continue;
        }

        let child_path = format!("{path}/{key}");
        let next = apply_value(result.get(key), sub_patch, &child_path)?;
        result.insert(key.to_string(), next);
    }

    Ok(Value::Object(result))
}

fn apply_array(base: Option<&Value>, table: &Value, path: &str) -> Result<Value> {
    let malformed = |reason: &str| Error::MalformedArrayPatch {
        path: path.to_string(),
        reason: reason.to_string(),
    };

    let Value::Object(table) = table else {
        return Err(malformed("expected a mapping"));
    };
    let len = table
        .get(ARRAY_LEN)
        .and_then(Value::as_u64)
        .and_then(|len| usize::try_from(len).ok())
        .ok_or_else(|| malformed("missing or invalid 'len'"))?;
    let empty = Map::new();
    let items = match table.get(ARRAY_ITEMS) {
        Some(Value::Object(items)) => items,
        None => &empty,
        Some(_) => return Err(malformed("'items' must be a mapping")),
    };

    let mut result = match base {
        Some(Value::Array(existing)) => existing.clone(),
        _ => Vec::new(),
    };
    // An array can grow at most by one element per patched index.
    if len > result.len().saturating_add(items.len()) {
        return Err(malformed(&format!(
            "length {len} exceeds {} existing and {} patched elements",
            result.len(),
            items.len()
        )));
    }
    result.resize(len, Value::Null);

    for (raw_idx, sub_patch) in items {
        let idx: usize = raw_idx
            .parse()
            .map_err(|_| malformed(&format!("invalid index '{raw_idx}'")))?;
        if idx >= len {
            return Err(malformed(&format!("index {idx} out of bounds for length {len}")));
        }

        let child_path = format!("{path}/{idx}");
        let next = apply_value(Some(&result[idx]), sub_patch, &child_path)?;
        result[idx] = next;
    }

    Ok(Value::Array(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_apply_key_patch() {
        let base = json!({ "name": "Sword", "power": 10 });
        let result = apply(&base, &json!({ "power": 12 })).unwrap();
        assert_eq!(result, json!({ "name": "Sword", "power": 12 }));
        // base is untouched
        assert_eq!(base["power"], json!(10));
    }

    #[test]
    fn test_apply_keeps_existing_key_position() {
        let base = json!({ "a": 1, "b": 2, "c": 3 });
        let result = apply(&base, &json!({ "b": { "$delete": true }, "a": 5, "d": 4 })).unwrap();
        assert_eq!(result.to_string(), r#"{"a":5,"c":3,"d":4}"#);
    }

    #[test]
    fn test_apply_null_replaces() {
        let result = apply(&json!({ "a": 1 }), &json!({ "a": null })).unwrap();
        assert_eq!(result, json!({ "a": null }));
        assert_eq!(apply(&json!({ "a": 1 }), &json!(null)).unwrap(), json!(null));
    }

    #[test]
    fn test_apply_object_patch_onto_scalar() {
        let result = apply(&json!(7), &json!({ "x": 1 })).unwrap();
        assert_eq!(result, json!({ "x": 1 }));
    }

    #[test]
    fn test_apply_array_patch() {
        let base = json!(["a", "b", "c"]);
        let patch = json!({ "$array": { "len": 4, "items": { "1": "B", "3": { "$replace": { "k": 1 } } } } });
        let result = apply(&base, &patch).unwrap();
        assert_eq!(result, json!(["a", "B", "c", { "k": 1 }]));
    }

    #[test]
    fn test_apply_array_truncates() {
        let patch = json!({ "$array": { "len": 1 } });
        assert_eq!(apply(&json!([1, 2, 3]), &patch).unwrap(), json!([1]));
    }

    #[test]
    fn test_unknown_directive() {
        let err = apply(&json!({}), &json!({ "a": { "$bogus": 1, "b": 2 } })).unwrap_err();
        assert_eq!(
            err,
            Error::UnknownDirective {
                path: "/a".to_string(),
                directive: "$bogus".to_string()
            }
        );
    }

    #[test]
    fn test_misplaced_delete() {
        let err = apply(&json!([1]), &json!({ "$delete": true })).unwrap_err();
        assert!(matches!(err, Error::MisplacedDelete { .. }));
    }

    #[test]
    fn test_array_index_out_of_bounds() {
        let patch = json!({ "$array": { "len": 1, "items": { "4": 1 } } });
        let err = apply(&json!([]), &patch).unwrap_err();
        assert!(matches!(err, Error::MalformedArrayPatch { .. }));
    }

    #[test]
    fn test_array_length_beyond_patched_items() {
        let patch = json!({ "$array": { "len": u64::MAX } });
        let err = apply(&json!([1, 2]), &patch).unwrap_err();
        assert!(matches!(err, Error::MalformedArrayPatch { .. }));

        let patch = json!({ "$array": { "len": 4, "items": { "2": 3 } } });
        assert!(apply(&json!([1, 2]), &patch).is_err());

        let patch = json!({ "$array": { "len": 3, "items": { "2": 3 } } });
        assert_eq!(apply(&json!([1, 2]), &patch).unwrap(), json!([1, 2, 3]));
    }
}
