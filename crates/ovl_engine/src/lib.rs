//! Layered resource/entity overlay engine.
//!
//! This crate composes a read-only base dataset of decoded game objects with an
//! ordered stack of bundles (mod packages) without ever mutating the base data.
//! It supports:
//!
//! - **Lazy loading**: a resource or entity type is loaded on first access
//! - **Layer folding**: inactive bundles are folded into the Base view in order,
//!   later bundles win
//! - **Type aliases**: an object is addressable under its own type and every
//!   alias type
//! - **Copy-on-write editing**: the active bundle edits a cloned Active view
//! - **Minimal diffs**: saving recomputes each edit against the current Base and
//!   prunes edits that no longer change anything
//!
//! # Example
//!
//! ```no_run
//! use ovl_engine::{EngineConfig, JsonDirDecoder, OverlayEngine, ResourceState, Schema};
//! use ovl_bundle::Bundle;
//! use camino::Utf8Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::load(Utf8Path::new("engine.config.toml"))?;
//! let mut engine = OverlayEngine::new(Schema::compile(&config), "game")
//!     .with_decoder("game", JsonDirDecoder::new("game/decoded"));
//!
//! engine.set_bundles(vec![Bundle::load(Utf8Path::new("bundles/mine"))?], Some(0))?;
//!
//! for (id, item) in engine.entity_instances("Item")? {
//!     println!("{id}: {}", item.label);
//! }
//!
//! let created = engine.create_entity("Item", Some(7))?;
//! engine.set_field_value("Item", created.id, "notes", serde_json::json!("copy of 7"))?;
//! engine.save_bundle()?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod decoder;
pub mod engine;
pub mod entities;
pub mod entity;
pub mod entity_store;
pub mod error;
pub mod files;
pub mod label;
pub mod resource_store;
pub mod save;
pub mod schema;

#[cfg(test)]
mod test_utils;

pub use codec::{Asset, CodecRegistry, FileCodec, JsonCodec, RawCodec};
pub use config::{EngineConfig, EntityConfig, FieldConfig, FieldKindConfig, IdRange, ResourceTypeConfig};
pub use decoder::{JsonDirDecoder, MemoryDecoder, ResourceDecoder};
pub use engine::{LayerConfig, OverlayEngine};
pub use entities::MAX_ID_ATTEMPTS;
pub use entity::{Entity, FieldValue, ResourceState};
pub use entity_store::EntityStore;
pub use error::{Error, Result};
pub use files::OpenFile;
pub use label::LabelFormat;
pub use resource_store::ResourceStore;
pub use save::SaveReport;
pub use schema::{EntitySchema, Field, Schema};
