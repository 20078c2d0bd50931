//! Schema-less structural diff and patch for overlay bundles.
//!
//! Every layer of an overlay stores its edits as *patches*: structured documents
//! describing only what changed between a base value and a modified value. This
//! crate provides the two pure operations the overlay engine is built on:
//!
//! - [`diff`] computes the minimal patch between two documents, or `None` when
//!   they are structurally equal.
//! - [`apply`] merges a patch onto a base document.
//!
//! The two obey the round-trip law `apply(b, diff(b, m)) == m`. Output is
//! deterministic: diffing the same pair twice yields byte-identical patches, so
//! callers may compare serialized patches to detect real changes.
//!
//! # Example
//!
//! ```
//! use ovl_diff::{apply, diff};
//! use serde_json::json;
//!
//! let base = json!({ "name": "Sword", "power": 12 });
//! let modified = json!({ "name": "Sword", "power": 15 });
//!
//! let patch = diff(&base, &modified).unwrap();
//! assert_eq!(patch, json!({ "power": 15 }));
//! assert_eq!(apply(&base, &patch).unwrap(), modified);
//! ```

pub mod apply;
pub mod diff;
pub mod error;
pub mod patch;

pub use apply::apply;
pub use diff::diff;
pub use error::{Error, Result};

/// The universal wire format for diffs and serialized bundles.
///
/// Mapping equality ignores key order while serialization keeps insertion
/// order (`serde_json` is built with `preserve_order`).
pub type Document = serde_json::Value;

/// Serialize a document to its compact textual form.
///
/// Used to decide whether a recomputed patch differs from a stored one.
pub fn to_canonical_string(doc: &Document) -> String {
    doc.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::{json, Map, Value};

    fn arb_document() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            "[a-c$]{0,4}".prop_map(Value::String),
        ];
        leaf.prop_recursive(4, 64, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                prop::collection::vec(("[$a-d]{1,3}", inner), 0..6)
                    .prop_map(|entries| Value::Object(entries.into_iter().collect::<Map<_, _>>())),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_round_trip(base in arb_document(), modified in arb_document()) {
            match diff(&base, &modified) {
                None => prop_assert_eq!(&base, &modified),
                Some(patch) => prop_assert_eq!(apply(&base, &patch).unwrap(), modified),
            }
        }

        #[test]
        fn prop_self_diff_is_none(doc in arb_document()) {
            prop_assert!(diff(&doc, &doc).is_none());
        }

        #[test]
        fn prop_diff_is_stable(base in arb_document(), modified in arb_document()) {
            let first = diff(&base, &modified).map(|p| to_canonical_string(&p));
            let second = diff(&base, &modified).map(|p| to_canonical_string(&p));
            prop_assert_eq!(first, second);
        }
    }

    #[test]
    fn test_layered_example() {
        let original = json!({ "name": "Sword", "power": 10 });
        let folded = apply(&original, &json!({ "power": 12 })).unwrap();
        assert_eq!(folded, json!({ "name": "Sword", "power": 12 }));

        let active = json!({ "name": "Sword", "power": 15 });
        assert_eq!(diff(&folded, &active), Some(json!({ "power": 15 })));
    }

    #[test]
    fn test_canonical_string_keeps_insertion_order() {
        let doc = json!({ "b": 1, "a": 2 });
        assert_eq!(to_canonical_string(&doc), r#"{"b":1,"a":2}"#);
    }
}
