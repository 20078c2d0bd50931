//! The layer composer.
//!
//! The [`OverlayEngine`] owns every cache and the ordered bundle stack. It is
//! configured with [`set_bundles`](OverlayEngine::set_bundles) and computes
//! everything else lazily:
//!
//! 1. The first access to a resource type enumerates its original objects
//!    through the decoder bound to the type (and to every subtype), registering
//!    each object under all its alias types.
//! 2. The first access to an entity type derives its Base instances from the
//!    primary fields, folds the edits of every inactive bundle on top in layer
//!    order, then materializes the active bundle's edits into the Active
//!    partition.
//! 3. Active objects are cloned from Base on first touch.
//!
//! Reconfiguring drops every cache.

use crate::codec::{CodecRegistry, FileCodec};
use crate::decoder::ResourceDecoder;
use crate::entity::ResourceState;
use crate::entity_store::EntityStore;
use crate::error::{Error, Result};
use crate::files::OpenFile;
use crate::resource_store::ResourceStore;
use crate::schema::Schema;
use camino::{Utf8Path, Utf8PathBuf};
use ovl_bundle::Bundle;
use ovl_diff::Document;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// The ordered bundle stack. Later bundles win.
#[derive(Debug, Clone)]
pub struct LayerConfig {
    pub bundles: Vec<Bundle>,
    /// Index of the writable bundle, if any.
    pub active: Option<usize>,
}

impl LayerConfig {
    /// Bundles other than the active one, in layer order.
    pub fn inactive(&self) -> impl Iterator<Item = &Bundle> {
        self.bundles
            .iter()
            .enumerate()
            .filter(move |(idx, _)| Some(*idx) != self.active)
            .map(|(_, bundle)| bundle)
    }

    pub fn active_bundle(&self) -> Option<&Bundle> {
        self.bundles.get(self.active?)
    }
}

/// Composes original game data with an ordered stack of bundles.
///
/// # Example
///
/// ```no_run
/// use ovl_engine::{EngineConfig, JsonDirDecoder, OverlayEngine, ResourceState, Schema};
/// use ovl_bundle::Bundle;
/// use camino::Utf8Path;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = EngineConfig::load(Utf8Path::new("engine.config.json"))?;
/// let mut engine = OverlayEngine::new(Schema::compile(&config), "game")
///     .with_decoder("game", JsonDirDecoder::new("game/decoded"));
///
/// let base = Bundle::load(Utf8Path::new("bundles/base-fixes"))?;
/// let mine = Bundle::load(Utf8Path::new("bundles/better-swords"))?;
/// engine.set_bundles(vec![base, mine], Some(1))?;
///
/// engine.set_field_value("Item", 7, "stats", serde_json::json!({ "name": "Sword", "power": 15 }))?;
/// let report = engine.save_bundle()?;
/// println!("saved {} entities", report.entities_saved);
/// # Ok(())
/// # }
/// ```
pub struct OverlayEngine {
    pub(crate) schema: Arc<Schema>,
    pub(crate) game_dir: Utf8PathBuf,
    pub(crate) decoders: HashMap<String, Box<dyn ResourceDecoder>>,
    pub(crate) codecs: CodecRegistry,
    pub(crate) layers: Option<LayerConfig>,
    pub(crate) resources: ResourceStore,
    pub(crate) entities: EntityStore,
    pub(crate) open_files: BTreeMap<Utf8PathBuf, OpenFile>,
    pub(crate) rng: StdRng,
}

impl OverlayEngine {
    /// Create an unconfigured engine.
    ///
    /// # Arguments
    ///
    /// * `schema` - Compiled configuration
    /// * `game_dir` - Root of the original game files, used by the file overlay
    pub fn new(schema: Schema, game_dir: impl Into<Utf8PathBuf>) -> Self {
        let mut resources = ResourceStore::new();
        for resource in schema.resource_types() {
            if !resource.aliases.is_empty() {
                resources.set_aliases(resource.name.clone(), resource.aliases.clone());
            }
        }

        Self {
            schema: Arc::new(schema),
            game_dir: game_dir.into(),
            decoders: HashMap::new(),
            codecs: CodecRegistry::default(),
            layers: None,
            resources,
            entities: EntityStore::new(),
            open_files: BTreeMap::new(),
            rng: StdRng::from_entropy(),
        }
    }

    /// Make entity id allocation reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Bind a decoder to the name resource types refer to in their `decoder`
    /// setting.
    pub fn with_decoder(mut self, name: impl Into<String>, decoder: impl ResourceDecoder + 'static) -> Self {
        self.decoders.insert(name.into(), Box::new(decoder));
        self
    }

    /// Register a file codec for an extension (without the dot).
    pub fn with_codec(mut self, extension: &str, codec: impl FileCodec + 'static) -> Self {
        self.codecs.register(extension, Box::new(codec));
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn game_dir(&self) -> &Utf8Path {
        &self.game_dir
    }

    /// Configure the bundle stack and drop every cache.
    ///
    /// `active` indexes into `bundles`; `None` makes every bundle read-only.
    pub fn set_bundles(&mut self, bundles: Vec<Bundle>, active: Option<usize>) -> Result<()> {
        if let Some(idx) = active {
            if idx >= bundles.len() {
                return Err(Error::Configuration(format!(
                    "active bundle index {idx} out of range for {} bundles",
                    bundles.len()
                )));
            }
        }

        self.resources.clear();
        self.entities.clear();
        self.open_files.clear();

        tracing::info!(
            "Configured {} bundles active={}",
            bundles.len(),
            active
                .and_then(|idx| bundles.get(idx))
                .map(|b| b.name.as_str())
                .unwrap_or("<none>")
        );
        for (idx, bundle) in bundles.iter().enumerate() {
            tracing::debug!("Layer {} bundle={}", idx, bundle.name);
        }

        self.layers = Some(LayerConfig { bundles, active });
        Ok(())
    }

    pub fn layers(&self) -> Result<&LayerConfig> {
        self.layers.as_ref().ok_or(Error::NotConfigured)
    }

    pub fn active_bundle(&self) -> Result<&Bundle> {
        self.layers()?.active_bundle().ok_or(Error::NoActiveBundle)
    }

    pub(crate) fn active_bundle_mut(&mut self) -> Result<&mut Bundle> {
        let layers = self.layers.as_mut().ok_or(Error::NotConfigured)?;
        let idx = layers.active.ok_or(Error::NoActiveBundle)?;
        layers.bundles.get_mut(idx).ok_or(Error::NoActiveBundle)
    }

    /// Load the original objects of a resource type and of all its subtypes.
    pub(crate) fn ensure_resource_type(&mut self, type_name: &str) -> Result<()> {
        if !self.schema.is_resource_type(type_name) {
            return Err(Error::UnknownResourceType(type_name.to_string()));
        }

        let schema = Arc::clone(&self.schema);
        for subtype in schema.subtypes_of(type_name) {
            self.load_type_data(subtype)?;
        }
        if schema.resource_type(type_name).is_some() {
            self.load_type_data(type_name)?;
        }
        Ok(())
    }

    /// Enumerate a declared type's own decoder data once.
    fn load_type_data(&mut self, type_name: &str) -> Result<()> {
        if self.resources.is_loaded(type_name) {
            return Ok(());
        }

        let Some(decoder_name) = self
            .schema
            .resource_type(type_name)
            .and_then(|r| r.decoder.clone())
        else {
            self.resources.mark_loaded(type_name);
            return Ok(());
        };

        let Some(decoder) = self.decoders.get_mut(&decoder_name) else {
            tracing::error!(
                "Configuration error: no decoder registered name={} type={}",
                decoder_name,
                type_name
            );
            self.resources.mark_loaded(type_name);
            return Ok(());
        };

        let objects = decoder.load_all(type_name)?;
        let count = objects.len();
        let mut shadowed = 0;
        for (id, object) in objects {
            // Objects a subtype already registered under this id win.
            if !self
                .resources
                .register_fallback(type_name, id, object, ResourceState::Base)
            {
                shadowed += 1;
            }
        }
        self.resources.mark_loaded(type_name);

        tracing::info!(
            "Loaded {} base resources type={} shadowed={}",
            count,
            type_name,
            shadowed
        );
        Ok(())
    }

    /// Make sure every entity type whose fields can hold objects of
    /// `type_name` has folded its layers into the resource store.
    fn ensure_resource_view(&mut self, type_name: &str) -> Result<()> {
        self.layers()?;
        self.ensure_resource_type(type_name)?;
        for entity in self.schema.entity_types_touching(type_name) {
            self.ensure_entity_type(&entity.name)?;
        }
        Ok(())
    }

    /// All objects of a resource type in id order.
    pub fn resource_instances(&mut self, type_name: &str, state: ResourceState) -> Result<Vec<(i64, &Document)>> {
        self.ensure_resource_view(type_name)?;
        Ok(self.resources.iter(type_name, state).collect())
    }

    pub fn get_base_resource(&mut self, type_name: &str, id: i64) -> Result<Option<&Document>> {
        self.ensure_resource_view(type_name)?;
        let found = self.resources.get_base(type_name, id);
        if found.is_none() {
            tracing::info!("Resource not found type={} id={}", type_name, id);
        }
        Ok(found)
    }

    /// Active object, cloned from Base on first access.
    pub fn get_active_resource(&mut self, type_name: &str, id: i64) -> Result<Option<&Document>> {
        self.ensure_resource_view(type_name)?;
        let found = self.resources.get_active(type_name, id);
        if found.is_none() {
            tracing::info!("Resource not found type={} id={}", type_name, id);
        }
        Ok(found)
    }

    /// Mutable Active object. Entities holding it become Active too, so the
    /// edit is recorded by the next save.
    pub fn get_active_resource_mut(&mut self, type_name: &str, id: i64) -> Result<Option<&mut Document>> {
        self.ensure_resource_view(type_name)?;
        self.materialize_owners(type_name, id);
        Ok(self.resources.get_active_mut(type_name, id))
    }

    /// Merged labels of an enum: configuration defaults, then every bundle in
    /// layer order with the active bundle last. Later entries win.
    pub fn enum_labels(&self, enum_name: &str) -> BTreeMap<String, i64> {
        let mut labels = self
            .schema
            .enum_defaults(enum_name)
            .cloned()
            .unwrap_or_default();

        if let Some(layers) = &self.layers {
            let ordered = layers.inactive().chain(layers.active_bundle());
            for bundle in ordered {
                if let Some(extra) = bundle.enums.get(enum_name) {
                    labels.extend(extra.iter().map(|(label, value)| (label.clone(), *value)));
                }
            }
        }
        labels
    }

    /// Add a label to an enum in the active bundle.
    pub fn add_enum_label(&mut self, enum_name: &str, label: &str, value: i64) -> Result<()> {
        self.active_bundle_mut()?.add_enum_label(enum_name, label, value);
        tracing::debug!("Added enum label enum={} label={} value={}", enum_name, label, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{example_engine, example_schema, sword_decoder};
    use serde_json::json;

    #[test]
    fn test_engine_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<OverlayEngine>();
    }

    #[test]
    fn test_unconfigured() {
        let mut engine = OverlayEngine::new(example_schema(), "/game");
        assert!(matches!(
            engine.resource_instances("ItemData", ResourceState::Base),
            Err(Error::NotConfigured)
        ));
        assert!(matches!(engine.active_bundle(), Err(Error::NotConfigured)));
    }

    #[test]
    fn test_invalid_active_index() {
        let mut engine = OverlayEngine::new(example_schema(), "/game");
        let result = engine.set_bundles(vec![Bundle::new("a", "")], Some(1));
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_unknown_resource_type() {
        let mut engine = example_engine(vec![], None);
        assert!(matches!(
            engine.get_base_resource("Nope", 1),
            Err(Error::UnknownResourceType(_))
        ));
    }

    #[test]
    fn test_subtype_objects_win_over_base_type_data() {
        let decoder = sword_decoder().with_object("ItemData", 7, json!({ "name": "Plain" }));
        let mut engine = OverlayEngine::new(example_schema(), "/game").with_decoder("game", decoder);
        engine.set_bundles(vec![], None).unwrap();

        let item = engine.get_base_resource("ItemData", 7).unwrap().cloned();
        let weapon = engine.get_base_resource("WeaponData", 7).unwrap().cloned();
        assert_eq!(item, weapon);
        assert_eq!(item.unwrap()["name"], json!("Sword"));
    }

    #[test]
    fn test_alias_lookup_after_base_load() {
        let mut engine = example_engine(vec![], None);
        let ids: Vec<i64> = engine
            .resource_instances("ItemData", ResourceState::Base)
            .unwrap()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids, vec![7, 8]);
        assert!(engine.get_base_resource("WeaponData", 8).unwrap().is_none());
    }

    #[test]
    fn test_copy_on_write_resource() {
        let mut engine = example_engine(vec![Bundle::new("mine", "")], Some(0));
        engine.get_active_resource_mut("WeaponData", 7).unwrap().unwrap()["power"] = json!(99);

        assert_eq!(engine.get_base_resource("ItemData", 7).unwrap().unwrap()["power"], json!(10));
        assert_eq!(engine.get_active_resource("ItemData", 7).unwrap().unwrap()["power"], json!(99));
    }

    #[test]
    fn test_enum_labels_merge_in_layer_order() {
        let mut first = Bundle::new("first", "");
        first.add_enum_label("Rarity", "Legendary", 4);
        first.add_enum_label("Rarity", "Rare", 10);
        let mut second = Bundle::new("second", "");
        second.add_enum_label("Rarity", "Rare", 2);

        let mut engine = example_engine(vec![second, first], Some(0));
        let labels = engine.enum_labels("Rarity");
        assert_eq!(labels["Common"], 0);
        assert_eq!(labels["Legendary"], 4);
        // The active bundle is applied last.
        assert_eq!(labels["Rare"], 2);

        engine.add_enum_label("Rarity", "Mythic", 5).unwrap();
        assert_eq!(engine.enum_labels("Rarity")["Mythic"], 5);
    }

    #[test]
    fn test_add_enum_label_needs_active_bundle() {
        let mut engine = example_engine(vec![Bundle::new("a", "")], None);
        assert!(matches!(
            engine.add_enum_label("Rarity", "X", 1),
            Err(Error::NoActiveBundle)
        ));
    }
}
