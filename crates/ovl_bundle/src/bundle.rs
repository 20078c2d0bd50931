//! The [`Bundle`] record and its `bundle.json` persistence.

use crate::error::{Error, Result};
use crate::listing::ListingEntry;
use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use ovl_diff::Document;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// File name of the bundle manifest inside a bundle directory.
pub const BUNDLE_FILE_NAME: &str = "bundle.json";

/// A persisted layer of edits.
///
/// # JSON format
///
/// ```json
/// {
///   "name": "better-swords",
///   "gameVersion": "1.4.2",
///   "resourceListing": {
///     "files/icons.json": { "target": "data/items/icons.json", "diff": {} }
///   },
///   "entities": [
///     { "type": "Item", "id": 7, "data": { "stats": { "power": 12 } } }
///   ],
///   "enums": { "Rarity": { "Legendary": 4 } }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    /// Unique bundle name, also used as the layer id in logs.
    pub name: String,

    /// Game version the bundle was authored against.
    #[serde(default)]
    pub game_version: String,

    /// Local path (relative to the bundle directory) -> listed file.
    #[serde(default)]
    pub resource_listing: BTreeMap<Utf8PathBuf, ListingEntry>,

    /// Entity-level edits, in the order they were first recorded.
    #[serde(default)]
    pub entities: Vec<EntityEdit>,

    /// Enum name -> label -> numeric value.
    #[serde(default)]
    pub enums: BTreeMap<String, BTreeMap<String, i64>>,

    /// Directory the bundle was loaded from or will be saved to.
    #[serde(skip)]
    root: Option<Utf8PathBuf>,
}

/// Field diffs recorded for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityEdit {
    #[serde(rename = "type")]
    pub type_name: String,
    pub id: i64,
    /// Field name -> patch against the layered base value of that field.
    #[serde(default)]
    pub data: BTreeMap<String, Document>,
}

impl EntityEdit {
    pub fn new(type_name: impl Into<String>, id: i64) -> Self {
        Self {
            type_name: type_name.into(),
            id,
            data: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, field: impl Into<String>, diff: Document) -> Self {
        self.data.insert(field.into(), diff);
        self
    }
}

impl Bundle {
    /// Create an empty in-memory bundle.
    pub fn new(name: impl Into<String>, game_version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            game_version: game_version.into(),
            resource_listing: BTreeMap::new(),
            entities: Vec::new(),
            enums: BTreeMap::new(),
            root: None,
        }
    }

    /// Attach the bundle to a directory so it can be [saved](Self::save).
    pub fn with_root(mut self, root: impl Into<Utf8PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn root(&self) -> Option<&Utf8Path> {
        self.root.as_deref()
    }

    /// Load a bundle from its directory.
    ///
    /// # Arguments
    ///
    /// * `dir` - Bundle directory containing a `bundle.json`
    pub fn load(dir: &Utf8Path) -> Result<Self> {
        let path = dir.join(BUNDLE_FILE_NAME);
        if !path.as_std_path().exists() {
            return Err(Error::BundleNotFound(path));
        }

        let contents = std::fs::read_to_string(path.as_std_path())?;
        let mut bundle: Self = serde_json::from_str(&contents)?;
        bundle.root = Some(dir.to_path_buf());

        tracing::debug!(
            "Loaded bundle name={} files={} entities={} dir={}",
            bundle.name,
            bundle.resource_listing.len(),
            bundle.entities.len(),
            dir
        );
        Ok(bundle)
    }

    /// Save the bundle to its root directory.
    ///
    /// Creates the directory if needed.
    pub fn save(&self) -> Result<()> {
        let root = self
            .root
            .as_ref()
            .ok_or_else(|| Error::NoRoot(self.name.clone()))?;

        std::fs::create_dir_all(root.as_std_path())?;
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(root.join(BUNDLE_FILE_NAME).as_std_path(), contents)?;

        tracing::info!("Saved bundle name={} dir={}", self.name, root);
        Ok(())
    }

    /// Resolve a listing's local path against the bundle directory.
    ///
    /// Rejects absolute paths and `..` components.
    pub fn local_file_path(&self, local: &Utf8Path) -> Result<Utf8PathBuf> {
        let root = self
            .root
            .as_ref()
            .ok_or_else(|| Error::NoRoot(self.name.clone()))?;

        let escapes = local
            .components()
            .any(|c| !matches!(c, Utf8Component::Normal(_) | Utf8Component::CurDir));
        if escapes {
            return Err(Error::InvalidLocalPath(local.to_path_buf()));
        }

        Ok(root.join(local))
    }

    /// Find the listing entry targeting a game path.
    pub fn find_listing(&self, target: &Utf8Path) -> Option<(&Utf8Path, &ListingEntry)> {
        self.resource_listing
            .iter()
            .find(|(_, entry)| entry.target == target)
            .map(|(local, entry)| (local.as_path(), entry))
    }

    /// Find the listing entry targeting a game path, creating one whose local
    /// path mirrors the target when none exists.
    pub fn listing_for_target_mut(&mut self, target: &Utf8Path) -> (Utf8PathBuf, &mut ListingEntry) {
        let local = self
            .resource_listing
            .iter()
            .find(|(_, entry)| entry.target == target)
            .map(|(local, _)| local.clone())
            .unwrap_or_else(|| target.to_path_buf());

        let entry = self
            .resource_listing
            .entry(local.clone())
            .or_insert_with(|| ListingEntry::new(target));
        (local, entry)
    }

    pub fn entity_edit(&self, type_name: &str, id: i64) -> Option<&EntityEdit> {
        self.entities
            .iter()
            .find(|e| e.type_name == type_name && e.id == id)
    }

    /// Edits for any of the given entity types, in recorded order.
    pub fn edits_of_types<'a>(&'a self, type_names: &'a [&'a str]) -> impl Iterator<Item = &'a EntityEdit> + 'a {
        self.entities
            .iter()
            .filter(move |e| type_names.contains(&e.type_name.as_str()))
    }

    /// Entity types this bundle has edits for.
    pub fn entity_types(&self) -> BTreeSet<&str> {
        self.entities.iter().map(|e| e.type_name.as_str()).collect()
    }

    /// Replace the stored diff of an entity, keeping its position, or append it.
    pub fn set_entity_edit(&mut self, type_name: &str, id: i64, data: BTreeMap<String, Document>) {
        match self
            .entities
            .iter_mut()
            .find(|e| e.type_name == type_name && e.id == id)
        {
            Some(edit) => edit.data = data,
            None => self.entities.push(EntityEdit {
                type_name: type_name.to_string(),
                id,
                data,
            }),
        }
    }

    /// Remove an entity's edit. Returns `true` if one was present.
    pub fn remove_entity_edit(&mut self, type_name: &str, id: i64) -> bool {
        let before = self.entities.len();
        self.entities
            .retain(|e| !(e.type_name == type_name && e.id == id));
        before != self.entities.len()
    }

    pub fn add_enum_label(&mut self, enum_name: &str, label: &str, value: i64) {
        self.enums
            .entry(enum_name.to_string())
            .or_default()
            .insert(label.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn example_bundle() -> Bundle {
        let mut bundle = Bundle::new("better-swords", "1.4.2");
        bundle.entities.push(
            EntityEdit::new("Item", 7).with_field("stats", json!({ "power": 12 })),
        );
        bundle.resource_listing.insert(
            Utf8PathBuf::from("files/icons.json"),
            ListingEntry {
                target: Utf8PathBuf::from("data/items/icons.json"),
                diff: Some(ListingEntry::full_replace_marker()),
                diff_time: None,
            },
        );
        bundle.add_enum_label("Rarity", "Legendary", 4);
        bundle
    }

    #[test]
    fn test_serialization_format() {
        let json = serde_json::to_value(example_bundle()).unwrap();
        assert_eq!(
            json,
            json!({
                "name": "better-swords",
                "gameVersion": "1.4.2",
                "resourceListing": {
                    "files/icons.json": { "target": "data/items/icons.json", "diff": {} }
                },
                "entities": [
                    { "type": "Item", "id": 7, "data": { "stats": { "power": 12 } } }
                ],
                "enums": { "Rarity": { "Legendary": 4 } }
            })
        );
    }

    #[test]
    fn test_minimal_document_parses() {
        let bundle: Bundle = serde_json::from_str(r#"{ "name": "tiny" }"#).unwrap();
        assert_eq!(bundle.name, "tiny");
        assert!(bundle.entities.is_empty());
        assert!(bundle.root().is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap().join("better-swords");

        let bundle = example_bundle().with_root(root.clone());
        bundle.save().unwrap();

        let loaded = Bundle::load(&root).unwrap();
        assert_eq!(loaded, bundle);
        assert_eq!(loaded.root(), Some(root.as_path()));
    }

    #[test]
    fn test_load_missing() {
        let dir = tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        assert!(matches!(Bundle::load(root), Err(Error::BundleNotFound(_))));
    }

    #[test]
    fn test_save_without_root() {
        let bundle = Bundle::new("memory-only", "");
        assert!(matches!(bundle.save(), Err(Error::NoRoot(_))));
    }

    #[test]
    fn test_local_file_path_rejects_escape() {
        let bundle = Bundle::new("b", "").with_root("/bundles/b");
        assert_eq!(
            bundle.local_file_path(Utf8Path::new("data/a.json")).unwrap(),
            Utf8PathBuf::from("/bundles/b/data/a.json")
        );
        assert!(bundle.local_file_path(Utf8Path::new("../a.json")).is_err());
        assert!(bundle.local_file_path(Utf8Path::new("/etc/passwd")).is_err());
    }

    #[test]
    fn test_set_entity_edit_keeps_position() {
        let mut bundle = example_bundle();
        bundle.set_entity_edit("Item", 8, BTreeMap::new());
        bundle.set_entity_edit("Item", 7, BTreeMap::from([("stats".to_string(), json!(1))]));

        assert_eq!(bundle.entities[0].id, 7);
        assert_eq!(bundle.entities[0].data["stats"], json!(1));
        assert_eq!(bundle.entities[1].id, 8);

        bundle.set_entity_edit("Quest", 1, BTreeMap::new());
        let ids: Vec<i64> = bundle.edits_of_types(&["Item", "Quest"]).map(|e| e.id).collect();
        assert_eq!(ids, vec![7, 8, 1]);
        assert_eq!(bundle.edits_of_types(&["Quest"]).count(), 1);
        assert!(bundle.remove_entity_edit("Quest", 1));

        assert!(bundle.remove_entity_edit("Item", 7));
        assert!(!bundle.remove_entity_edit("Item", 7));
        assert_eq!(bundle.entity_types(), BTreeSet::from(["Item"]));
    }

    #[test]
    fn test_listing_for_target_reuses_entry() {
        let mut bundle = example_bundle();
        let (local, _) = bundle.listing_for_target_mut(Utf8Path::new("data/items/icons.json"));
        assert_eq!(local, Utf8PathBuf::from("files/icons.json"));

        let (local, entry) = bundle.listing_for_target_mut(Utf8Path::new("data/new.json"));
        assert_eq!(local, Utf8PathBuf::from("data/new.json"));
        assert_eq!(entry.diff, None);
        assert_eq!(bundle.resource_listing.len(), 2);
    }
}
