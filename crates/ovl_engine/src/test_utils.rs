//! Shared fixtures for engine tests.

use crate::config::EngineConfig;
use crate::decoder::MemoryDecoder;
use crate::engine::OverlayEngine;
use crate::schema::Schema;
use ovl_bundle::{Bundle, EntityEdit};
use serde_json::{json, Value};

/// Route engine logs to the test harness. `RUST_LOG=ovl_engine=debug` shows them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn example_schema() -> Schema {
    let config = EngineConfig::from_json_str(include_str!("../test-data/engine.config.json"))
        .expect("example config parses");
    Schema::compile(&config)
}

/// `Item#7` is a weapon registered under `WeaponData`, `Item#8` plain item data.
pub fn sword_decoder() -> MemoryDecoder {
    MemoryDecoder::new()
        .with_object(
            "WeaponData",
            7,
            json!({ "name": "Sword", "power": 10, "kind": "weapon" }),
        )
        .with_object(
            "ItemData",
            8,
            json!({ "name": "Shield", "power": 5, "kind": "armor" }),
        )
        .with_template("ItemData", json!({ "name": "New item", "power": 0, "kind": "misc" }))
}

pub fn example_engine(bundles: Vec<Bundle>, active: Option<usize>) -> OverlayEngine {
    init_tracing();
    let mut engine = OverlayEngine::new(example_schema(), "/game")
        .with_decoder("game", sword_decoder())
        .with_seed(7);
    engine.set_bundles(bundles, active).expect("valid layer config");
    engine
}

/// A bundle with a single `Item.stats` edit.
pub fn stats_bundle(name: &str, id: i64, diff: Value) -> Bundle {
    let mut bundle = Bundle::new(name, "1.0");
    bundle
        .entities
        .push(EntityEdit::new("Item", id).with_field("stats", diff));
    bundle
}
