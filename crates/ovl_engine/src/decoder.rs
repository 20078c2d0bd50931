//! Resource decoder abstraction.
//!
//! This module defines the [`ResourceDecoder`] trait that decouples the engine
//! from any particular asset storage format. A decoder provides:
//!
//! - Every original object of a resource type, keyed by id
//! - New objects for freshly created entities
//!
//! The crate ships [`JsonDirDecoder`] for reading decoded objects from a
//! directory tree, and [`MemoryDecoder`] for tests and embedding.

use crate::error::{Error, Result};
use camino::{Utf8Path, Utf8PathBuf};
use ovl_diff::Document;
use std::collections::BTreeMap;

/// Produces the original objects of resource types.
///
/// # Implementing
///
/// Implementations must be [`Send`] so an engine can be moved onto a worker
/// thread. Methods take `&mut self` to allow stateful readers (e.g., an open
/// archive).
pub trait ResourceDecoder: Send {
    /// Enumerate every original object of `type_name`, in id order.
    ///
    /// Called at most once per type until the engine is reconfigured. Returns an
    /// empty list when the source has no objects of this type.
    fn load_all(&mut self, type_name: &str) -> Result<Vec<(i64, Document)>>;

    /// Create a new object for `(type_name, id)`.
    ///
    /// `template` is the value of the entity the new one is cloned from, if any.
    /// The default implementation copies the template or starts from an empty
    /// mapping.
    fn create(&mut self, type_name: &str, id: i64, template: Option<&Document>) -> Result<Document> {
        tracing::debug!("Creating resource type={} id={}", type_name, id);
        Ok(template
            .cloned()
            .unwrap_or_else(|| Document::Object(Default::default())))
    }
}

/// Filesystem-backed decoder.
///
/// Reads already-decoded objects stored as JSON, one file per object:
///
/// ```text
/// root/
///   ItemData/
///     7.json                     # { "name": "Sword", "power": 10 }
///     8.json
///   WeaponData/
///     7.json
/// ```
///
/// Files whose stem is not an integer or that fail to parse are skipped with a
/// warning.
#[derive(Debug, Clone)]
pub struct JsonDirDecoder {
    root: Utf8PathBuf,
}

impl JsonDirDecoder {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    fn read_object(path: &Utf8Path) -> Result<Document> {
        let contents = std::fs::read_to_string(path.as_std_path())?;
        Ok(serde_json::from_str(&contents)?)
    }
}

impl ResourceDecoder for JsonDirDecoder {
    fn load_all(&mut self, type_name: &str) -> Result<Vec<(i64, Document)>> {
        let dir = self.root.join(type_name);
        if !dir.as_std_path().is_dir() {
            tracing::debug!("No decoded objects type={} dir={}", type_name, dir);
            return Ok(Vec::new());
        }

        let mut objects = Vec::new();
        for entry in dir.read_dir_utf8()? {
            let entry = entry?;
            let path = entry.path();
            if path.extension() != Some("json") {
                continue;
            }

            let Some(id) = path.file_stem().and_then(|stem| stem.parse::<i64>().ok()) else {
                tracing::warn!("Skipping file without numeric id path={}", path);
                continue;
            };

            match Self::read_object(path) {
                Ok(object) => objects.push((id, object)),
                Err(e) => tracing::warn!("Skipping unreadable object path={} error={}", path, e),
            }
        }

        objects.sort_by_key(|(id, _)| *id);
        tracing::debug!("Decoded {} objects type={}", objects.len(), type_name);
        Ok(objects)
    }
}

/// In-memory decoder over a fixed set of objects.
#[derive(Debug, Clone, Default)]
pub struct MemoryDecoder {
    objects: BTreeMap<String, BTreeMap<i64, Document>>,
    templates: BTreeMap<String, Document>,
}

impl MemoryDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(mut self, type_name: &str, id: i64, object: Document) -> Self {
        self.objects
            .entry(type_name.to_string())
            .or_default()
            .insert(id, object);
        self
    }

    /// Object returned by [`create`](ResourceDecoder::create) when no
    /// template is given.
    pub fn with_template(mut self, type_name: &str, template: Document) -> Self {
        self.templates.insert(type_name.to_string(), template);
        self
    }
}

impl ResourceDecoder for MemoryDecoder {
    fn load_all(&mut self, type_name: &str) -> Result<Vec<(i64, Document)>> {
        Ok(self
            .objects
            .get(type_name)
            .map(|objects| objects.iter().map(|(id, o)| (*id, o.clone())).collect())
            .unwrap_or_default())
    }

    fn create(&mut self, type_name: &str, _id: i64, template: Option<&Document>) -> Result<Document> {
        template
            .or_else(|| self.templates.get(type_name))
            .cloned()
            .ok_or_else(|| Error::Decoder(format!("no template for resource type '{type_name}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_json_dir_decoder() {
        let dir = tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        let items = root.join("ItemData");
        std::fs::create_dir_all(&items).unwrap();
        std::fs::write(items.join("8.json"), r#"{ "name": "Shield" }"#).unwrap();
        std::fs::write(items.join("7.json"), r#"{ "name": "Sword" }"#).unwrap();
        std::fs::write(items.join("broken.json"), "{}").unwrap();
        std::fs::write(items.join("9.json"), "not json").unwrap();
        std::fs::write(items.join("10.txt"), "{}").unwrap();

        let mut decoder = JsonDirDecoder::new(root);
        let objects = decoder.load_all("ItemData").unwrap();
        assert_eq!(
            objects,
            vec![(7, json!({ "name": "Sword" })), (8, json!({ "name": "Shield" }))]
        );
        assert!(decoder.load_all("WeaponData").unwrap().is_empty());
    }

    #[test]
    fn test_default_create() {
        let mut decoder = JsonDirDecoder::new("/unused");
        assert_eq!(decoder.create("ItemData", 1, None).unwrap(), json!({}));
        assert_eq!(
            decoder.create("ItemData", 1, Some(&json!({ "a": 1 }))).unwrap(),
            json!({ "a": 1 })
        );
    }

    #[test]
    fn test_memory_decoder_create_needs_template() {
        let mut decoder = MemoryDecoder::new().with_template("ItemData", json!({ "power": 1 }));
        assert_eq!(decoder.create("ItemData", 5, None).unwrap(), json!({ "power": 1 }));
        assert!(matches!(
            decoder.create("WeaponData", 5, None),
            Err(Error::Decoder(_))
        ));
    }
}
