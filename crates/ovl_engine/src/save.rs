//! Recomputing and persisting the active bundle.

use crate::engine::OverlayEngine;
use crate::entities::{field_enabled, field_ref};
use crate::entity::ResourceState;
use crate::error::Result;
use camino::Utf8PathBuf;
use ovl_diff::Document;
use std::collections::{BTreeMap, BTreeSet};

/// Outcome of a save. Saving is best-effort: items that fail are reported
/// here and the rest are still written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveReport {
    /// Entities whose diff was written to the bundle.
    pub entities_saved: usize,
    /// Entities dropped from the bundle because they no longer differ from Base.
    pub entities_pruned: usize,
    /// Game paths of files whose local copy was written.
    pub files_saved: Vec<Utf8PathBuf>,
    /// Game paths of files that could not be saved, with the reason.
    pub files_skipped: Vec<(Utf8PathBuf, String)>,
}

impl OverlayEngine {
    /// Recompute every Active entity's diff against Base and store the result
    /// in the active bundle, without writing anything to disk.
    ///
    /// Disabled fields and computed fields are skipped. Entities left with no
    /// field diff are removed from the bundle.
    pub fn recompute_bundle(&mut self) -> Result<SaveReport> {
        let bundle_types: BTreeSet<String> = self
            .active_bundle()?
            .entity_types()
            .into_iter()
            .map(str::to_string)
            .collect();

        // Edits of types the active bundle carries must be loaded before they
        // are recomputed, or they would look like no-ops.
        for type_name in &bundle_types {
            if let Err(e) = self.ensure_entity_type(type_name) {
                tracing::warn!("Keeping edits of unloadable type={} error={}", type_name, e);
            }
        }

        let mut results: Vec<(String, i64, BTreeMap<String, Document>)> = Vec::new();
        for type_name in self.entities.touched_types() {
            let Ok(schema) = self.schema.entity(&type_name) else {
                continue;
            };

            for id in self.entities.active_ids(&type_name) {
                let Some(active) = self.entities.get(&type_name, id, ResourceState::Active) else {
                    continue;
                };
                let base = self.entities.get(&type_name, id, ResourceState::Base);

                let mut data = BTreeMap::new();
                for field in schema.fields.iter().filter(|f| f.is_persisted()) {
                    if !field_enabled(&self.resources, schema, active, field, ResourceState::Active) {
                        continue;
                    }
                    let base_value = base.and_then(|b| {
                        field_ref(&self.resources, schema, b, field.name(), ResourceState::Base)
                    });
                    let active_value =
                        field_ref(&self.resources, schema, active, field.name(), ResourceState::Active);

                    if let Some(diff) = field.compute_diff(base_value, active_value) {
                        data.insert(field.name().to_string(), diff);
                    }
                }
                results.push((type_name.clone(), id, data));
            }
        }

        let mut report = SaveReport::default();
        for (type_name, id, data) in results {
            let bundle = self.active_bundle_mut()?;
            if data.is_empty() {
                if bundle.remove_entity_edit(&type_name, id) {
                    tracing::debug!("Pruned no-op entity edit type={} id={}", type_name, id);
                    report.entities_pruned += 1;
                }
            } else {
                bundle.set_entity_edit(&type_name, id, data.clone());
                report.entities_saved += 1;
            }

            if let Some(entity) = self.entities.get_mut(&type_name, id, ResourceState::Active) {
                entity.diff = (!data.is_empty()).then_some(data);
            }
        }

        tracing::info!(
            "Recomputed bundle saved={} pruned={}",
            report.entities_saved,
            report.entities_pruned
        );
        Ok(report)
    }

    /// Recompute the active bundle, save modified open files and write
    /// `bundle.json`.
    pub fn save_bundle(&mut self) -> Result<SaveReport> {
        let mut report = self.recompute_bundle()?;
        self.write_modified_files(&mut report)?;

        let bundle = self.active_bundle()?;
        bundle.save()?;
        tracing::info!(
            "Saved bundle name={} entities={} files={}",
            bundle.name,
            report.entities_saved,
            report.files_saved.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::test_utils::{example_engine, stats_bundle};
    use ovl_bundle::Bundle;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_sword_example() {
        let fixes = stats_bundle("fixes", 7, json!({ "power": 12 }));
        let mine = Bundle::new("mine", "1.0");
        let mut engine = example_engine(vec![fixes, mine], Some(1));

        assert_eq!(
            engine.get_base_resource("ItemData", 7).unwrap().unwrap(),
            &json!({ "name": "Sword", "power": 12, "kind": "weapon" })
        );

        engine
            .set_field_value(
                "Item",
                7,
                "stats",
                json!({ "name": "Sword", "power": 15, "kind": "weapon" }),
            )
            .unwrap();
        let report = engine.recompute_bundle().unwrap();
        assert_eq!(report.entities_saved, 1);

        let bundle = engine.active_bundle().unwrap();
        assert_eq!(bundle.entities.len(), 1);
        assert_eq!(
            bundle.entities[0].data,
            BTreeMap::from([("stats".to_string(), json!({ "power": 15 }))])
        );
        assert_eq!(
            engine.get_base_resource("ItemData", 7).unwrap().unwrap()["power"],
            json!(12)
        );
    }

    #[test]
    fn test_direct_resource_edit_is_saved() {
        let mut engine = example_engine(vec![Bundle::new("mine", "1.0")], Some(0));

        let stats = engine.get_active_resource_mut("ItemData", 8).unwrap().unwrap();
        stats["power"] = json!(99);

        let report = engine.recompute_bundle().unwrap();
        assert_eq!(report.entities_saved, 1);

        let bundle = engine.active_bundle().unwrap();
        let edit = bundle.entity_edit("Item", 8).unwrap();
        assert_eq!(
            edit.data,
            BTreeMap::from([("stats".to_string(), json!({ "power": 99 }))])
        );
    }

    #[test]
    fn test_save_prunes_no_ops() {
        let mine = stats_bundle("mine", 7, json!({ "power": 10 }));
        let mut engine = example_engine(vec![mine], Some(0));

        let report = engine.recompute_bundle().unwrap();
        assert_eq!(report.entities_pruned, 1);
        assert!(engine.active_bundle().unwrap().entities.is_empty());
    }

    #[test]
    fn test_reverting_an_edit_prunes_it() {
        let mine = stats_bundle("mine", 8, json!({ "power": 6 }));
        let mut engine = example_engine(vec![mine], Some(0));
        engine
            .set_field_value(
                "Item",
                8,
                "stats",
                json!({ "name": "Shield", "power": 5, "kind": "armor" }),
            )
            .unwrap();

        engine.recompute_bundle().unwrap();
        assert!(engine.active_bundle().unwrap().entities.is_empty());
    }

    #[test]
    fn test_disabled_fields_are_not_saved() {
        let mut engine = example_engine(vec![Bundle::new("mine", "")], Some(0));
        engine.set_field_value("Item", 8, "notes", json!("armor note")).unwrap();

        engine.recompute_bundle().unwrap();
        assert!(engine.active_bundle().unwrap().entities.is_empty());

        engine.set_field_value("Item", 7, "notes", json!("sharp")).unwrap();
        engine.recompute_bundle().unwrap();
        let edit = engine.active_bundle().unwrap().entity_edit("Item", 7).unwrap();
        assert_eq!(edit.data["notes"], json!("sharp"));
    }

    #[test]
    fn test_created_entity_round_trip() {
        let dir = tempdir().unwrap();
        let root = camino::Utf8Path::from_path(dir.path()).unwrap().join("mine");

        let mut engine = example_engine(vec![Bundle::new("mine", "1.0").with_root(root.clone())], Some(0));
        let created = engine.create_entity("Item", Some(7)).unwrap();
        engine.set_field_value("Item", created.id, "notes", json!("copy")).unwrap();
        let report = engine.save_bundle().unwrap();
        assert_eq!(report.entities_saved, 1);

        let reloaded = Bundle::load(&root).unwrap();
        let mut engine = example_engine(vec![reloaded], Some(0));
        let entity = engine.get_active_entity("Item", created.id).unwrap().unwrap();
        assert_eq!(entity.label, format!("Sword ({})", created.id));
        assert_eq!(
            engine
                .field_value("Item", created.id, "notes", ResourceState::Active)
                .unwrap(),
            Some(&json!("copy"))
        );
        assert!(engine.get_base_entity("Item", created.id).unwrap().is_none());
    }

    #[test]
    fn test_save_needs_active_bundle() {
        let mut engine = example_engine(vec![Bundle::new("a", "")], None);
        assert!(matches!(engine.save_bundle(), Err(Error::NoActiveBundle)));
    }
}
