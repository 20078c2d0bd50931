//! Raw-file listing entries.
//!
//! Every file a bundle touches is listed under its local path (relative to the
//! bundle directory) together with the game path it targets. The optional diff
//! has three observable states, see [`FileDiffState`].

use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use ovl_diff::Document;
use serde::{Deserialize, Serialize};

/// One entry of a bundle's `resourceListing`.
///
/// # JSON format
///
/// ```json
/// {
///   "target": "data/items/icons.json",
///   "diff": { "sword": { "frame": 3 } },
///   "diffTime": "2026-01-02T10:00:00Z"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingEntry {
    /// Game path of the file this entry overrides.
    pub target: Utf8PathBuf,

    /// Structured patch against the layered base file, `{}` for a full
    /// replacement, absent when the file has not been checked yet.
    #[serde(
        default,
        deserialize_with = "present_document",
        skip_serializing_if = "Option::is_none"
    )]
    pub diff: Option<Document>,

    /// When `diff` last changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_time: Option<DateTime<Utc>>,
}

/// A present `diff` key is always `Some`, so a `null` patch survives a reload.
fn present_document<'de, D>(deserializer: D) -> Result<Option<Document>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Document::deserialize(deserializer).map(Some)
}

/// How a listed file should be materialized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FileDiffState<'a> {
    /// No diff was ever computed. The local copy replaces the base file.
    Unchecked,
    /// Checked, and the file type has no diff support. The local copy replaces
    /// the base file.
    FullReplace,
    /// Apply this patch to the layered base file.
    Patch(&'a Document),
}

impl ListingEntry {
    pub fn new(target: impl Into<Utf8PathBuf>) -> Self {
        Self {
            target: target.into(),
            diff: None,
            diff_time: None,
        }
    }

    /// The explicit empty-but-non-null marker for "checked, replace in full".
    pub fn full_replace_marker() -> Document {
        Document::Object(Default::default())
    }

    pub fn diff_state(&self) -> FileDiffState<'_> {
        match &self.diff {
            None => FileDiffState::Unchecked,
            Some(Document::Object(map)) if map.is_empty() => FileDiffState::FullReplace,
            Some(patch) => FileDiffState::Patch(patch),
        }
    }

    /// Store a freshly computed diff if its serialized form differs from the
    /// stored one. Returns `true` when the entry changed.
    pub fn update_diff(&mut self, diff: Document, now: DateTime<Utc>) -> bool {
        let unchanged = self
            .diff
            .as_ref()
            .is_some_and(|old| ovl_diff::to_canonical_string(old) == ovl_diff::to_canonical_string(&diff));
        if unchanged {
            return false;
        }

        self.diff = Some(diff);
        self.diff_time = Some(now);
        true
    }
}
