//! Layered view of path-addressed game files.
//!
//! Opening a file resolves it through the stack: the original game file, then
//! every inactive bundle listing the same target in layer order, then the
//! active bundle. A listing either patches the file resolved so far or
//! replaces it with the bundle's local copy, see [`FileDiffState`].

use crate::codec::{Asset, CodecRegistry};
use crate::engine::OverlayEngine;
use crate::error::{Error, Result};
use crate::save::SaveReport;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use ovl_bundle::{Bundle, FileDiffState, ListingEntry};
use ovl_diff::Document;

/// A file opened through the engine.
#[derive(Debug, Clone)]
pub struct OpenFile {
    pub target: Utf8PathBuf,
    /// The file as resolved by the game data and the inactive bundles.
    pub base: Option<Asset>,
    /// The file including the active bundle and any unsaved edits.
    pub asset: Asset,
    pub modified: bool,
}

/// Resolve one bundle's listing on top of the file resolved so far.
fn overlay_layer(
    codecs: &CodecRegistry,
    bundle: &Bundle,
    local: &Utf8Path,
    entry: &ListingEntry,
    current: Option<Asset>,
) -> Result<Asset> {
    let codec = codecs.for_path(&entry.target);

    if let FileDiffState::Patch(diff) = entry.diff_state() {
        if codec.supports_diff() {
            let base = current.unwrap_or(Asset::Document(Document::Null));
            return codec.apply_diff(base, diff).map_err(|e| match e {
                Error::DiffUnsupported(_) => Error::DiffUnsupported(entry.target.clone()),
                other => other,
            });
        }
        tracing::debug!(
            "Codec has no diff support, using local copy bundle={} target={}",
            bundle.name,
            entry.target
        );
    }

    let path = bundle.local_file_path(local)?;
    let mut file = std::fs::File::open(path.as_std_path())?;
    codec.read(&mut file)
}

impl OverlayEngine {
    /// Open a file through the layer stack. Opening an already open file
    /// returns its current state.
    pub fn open_file(&mut self, target: &Utf8Path) -> Result<&Asset> {
        if !self.open_files.contains_key(target) {
            let file = self.resolve_file(target)?;
            self.open_files.insert(target.to_path_buf(), file);
        }
        self.file_asset(target)
            .ok_or_else(|| Error::FileNotOpen(target.to_path_buf()))
    }

    fn resolve_file(&self, target: &Utf8Path) -> Result<OpenFile> {
        let layers = self.layers()?;

        let game_path = self.game_dir.join(target);
        let mut current = if game_path.as_std_path().is_file() {
            match self.codecs.read_file(&game_path) {
                Ok(asset) => Some(asset),
                Err(e) => {
                    tracing::warn!("Failed to read game file path={} error={}", game_path, e);
                    None
                }
            }
        } else {
            None
        };

        for bundle in layers.inactive() {
            current = self.apply_listing(bundle, target, current);
        }
        let base = current.clone();
        if let Some(active) = layers.active_bundle() {
            current = self.apply_listing(active, target, current);
        }

        let asset = current.ok_or_else(|| Error::FileNotFound(target.to_path_buf()))?;
        tracing::debug!("Opened file target={}", target);
        Ok(OpenFile {
            target: target.to_path_buf(),
            base,
            asset,
            modified: false,
        })
    }

    /// Apply one bundle's listing for `target`, keeping the previous state
    /// when the bundle has none or it fails to load.
    fn apply_listing(&self, bundle: &Bundle, target: &Utf8Path, current: Option<Asset>) -> Option<Asset> {
        let Some((local, entry)) = bundle.find_listing(target) else {
            return current;
        };

        match overlay_layer(&self.codecs, bundle, local, entry, current.clone()) {
            Ok(asset) => Some(asset),
            Err(e) => {
                tracing::warn!(
                    "Skipping file layer bundle={} target={} error={}",
                    bundle.name,
                    target,
                    e
                );
                current
            }
        }
    }

    pub fn file_asset(&self, target: &Utf8Path) -> Option<&Asset> {
        self.open_files.get(target).map(|f| &f.asset)
    }

    pub fn is_file_modified(&self, target: &Utf8Path) -> bool {
        self.open_files.get(target).is_some_and(|f| f.modified)
    }

    /// Flag an open file for saving.
    pub fn mark_modified(&mut self, target: &Utf8Path) -> Result<()> {
        let file = self
            .open_files
            .get_mut(target)
            .ok_or_else(|| Error::FileNotOpen(target.to_path_buf()))?;
        file.modified = true;
        Ok(())
    }

    /// Replace a file's content and flag it for saving. Files that exist in no
    /// layer are added as new files.
    pub fn set_file_asset(&mut self, target: &Utf8Path, asset: Asset) -> Result<()> {
        match self.open_file(target).map(|_| ()) {
            Ok(()) => {}
            Err(Error::FileNotFound(_)) => {
                self.open_files.insert(
                    target.to_path_buf(),
                    OpenFile {
                        target: target.to_path_buf(),
                        base: None,
                        asset: asset.clone(),
                        modified: true,
                    },
                );
            }
            Err(e) => return Err(e),
        }

        if let Some(file) = self.open_files.get_mut(target) {
            file.asset = asset;
            file.modified = true;
        }
        Ok(())
    }

    /// Forget an open file, discarding unsaved edits.
    pub fn close_file(&mut self, target: &Utf8Path) -> bool {
        self.open_files.remove(target).is_some()
    }

    /// Write every modified open file into the active bundle and save
    /// `bundle.json`.
    pub fn save_modified_files(&mut self) -> Result<SaveReport> {
        let mut report = SaveReport::default();
        self.write_modified_files(&mut report)?;
        self.active_bundle()?.save()?;
        Ok(report)
    }

    /// Write local copies and refresh listing diffs. Per-file failures are
    /// recorded in the report.
    pub(crate) fn write_modified_files(&mut self, report: &mut SaveReport) -> Result<()> {
        self.active_bundle()?;
        let modified: Vec<Utf8PathBuf> = self
            .open_files
            .values()
            .filter(|f| f.modified)
            .map(|f| f.target.clone())
            .collect();

        for target in modified {
            match self.write_file(&target) {
                Ok(()) => report.files_saved.push(target),
                Err(e) => {
                    tracing::warn!("Failed to save file target={} error={}", target, e);
                    report.files_skipped.push((target, e.to_string()));
                }
            }
        }
        Ok(())
    }

    fn write_file(&mut self, target: &Utf8Path) -> Result<()> {
        let file = self
            .open_files
            .get(target)
            .ok_or_else(|| Error::FileNotOpen(target.to_path_buf()))?;
        let codec = self.codecs.for_path(target);

        let diff = match (&file.base, codec.supports_diff()) {
            (Some(base), true) => match codec.find_diff(base, &file.asset) {
                Ok(Some(diff)) => diff,
                Ok(None) => ListingEntry::full_replace_marker(),
                Err(e) => {
                    tracing::warn!("Failed to diff file target={} error={}", target, e);
                    ListingEntry::full_replace_marker()
                }
            },
            _ => ListingEntry::full_replace_marker(),
        };

        let layers = self.layers.as_mut().ok_or(Error::NotConfigured)?;
        let bundle = match layers.active {
            Some(idx) => layers.bundles.get_mut(idx),
            None => None,
        }
        .ok_or(Error::NoActiveBundle)?;

        let local = bundle
            .find_listing(target)
            .map(|(local, _)| local.to_path_buf())
            .unwrap_or_else(|| target.to_path_buf());
        let path = bundle.local_file_path(&local)?;
        self.codecs.write_file(&path, &file.asset)?;

        let (_, entry) = bundle.listing_for_target_mut(target);
        if entry.update_diff(diff, Utc::now()) {
            tracing::debug!("Updated file diff target={}", target);
        }

        if let Some(file) = self.open_files.get_mut(target) {
            file.modified = false;
        }
        tracing::info!("Saved file target={} local={}", target, path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::example_engine;
    use serde_json::json;
    use tempfile::tempdir;

    struct Fixture {
        _dir: tempfile::TempDir,
        game: Utf8PathBuf,
        bundles: Utf8PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap().to_path_buf();
        let game = root.join("game");
        std::fs::create_dir_all(game.join("data")).unwrap();
        std::fs::write(
            game.join("data/icons.json"),
            r#"{ "sword": { "frame": 1 }, "shield": { "frame": 2 } }"#,
        )
        .unwrap();
        std::fs::write(game.join("data/tex.bin"), [1u8, 2, 3]).unwrap();

        Fixture {
            _dir: dir,
            game,
            bundles: root.join("bundles"),
        }
    }

    fn engine_for(fixture: &Fixture, bundles: Vec<Bundle>, active: Option<usize>) -> OverlayEngine {
        let mut engine = example_engine(vec![], None);
        engine.game_dir = fixture.game.clone();
        engine.set_bundles(bundles, active).unwrap();
        engine
    }

    fn patching_bundle(fixture: &Fixture) -> Bundle {
        let mut bundle = Bundle::new("fixes", "1.0").with_root(fixture.bundles.join("fixes"));
        let (_, entry) = bundle.listing_for_target_mut(Utf8Path::new("data/icons.json"));
        entry.diff = Some(json!({ "sword": { "frame": 3 } }));
        bundle
    }

    #[test]
    fn test_open_file_applies_layers() {
        let fixture = fixture();
        let mut engine = engine_for(&fixture, vec![patching_bundle(&fixture)], None);

        let asset = engine.open_file(Utf8Path::new("data/icons.json")).unwrap();
        assert_eq!(
            asset,
            &Asset::Document(json!({ "sword": { "frame": 3 }, "shield": { "frame": 2 } }))
        );
        assert!(!engine.is_file_modified(Utf8Path::new("data/icons.json")));
    }

    #[test]
    fn test_save_modified_json_file_stores_diff() {
        let fixture = fixture();
        let mine_root = fixture.bundles.join("mine");
        let mine = Bundle::new("mine", "1.0").with_root(mine_root.clone());
        let mut engine = engine_for(&fixture, vec![patching_bundle(&fixture), mine], Some(1));

        let target = Utf8Path::new("data/icons.json");
        engine
            .set_file_asset(
                target,
                Asset::Document(json!({ "sword": { "frame": 3 }, "shield": { "frame": 9 } })),
            )
            .unwrap();
        let report = engine.save_modified_files().unwrap();
        assert_eq!(report.files_saved, vec![target.to_path_buf()]);
        assert!(!engine.is_file_modified(target));

        let saved = Bundle::load(&mine_root).unwrap();
        let (local, entry) = saved.find_listing(target).unwrap();
        assert_eq!(local, target);
        assert_eq!(entry.diff, Some(json!({ "shield": { "frame": 9 } })));
        assert!(entry.diff_time.is_some());
        assert!(mine_root.join("data/icons.json").as_std_path().is_file());

        // Reopening through a fresh engine reproduces the edit.
        let mut engine = engine_for(&fixture, vec![patching_bundle(&fixture), saved], Some(1));
        assert_eq!(
            engine.open_file(target).unwrap(),
            &Asset::Document(json!({ "sword": { "frame": 3 }, "shield": { "frame": 9 } }))
        );
    }

    #[test]
    fn test_raw_file_is_replaced_in_full() {
        let fixture = fixture();
        let mine_root = fixture.bundles.join("mine");
        let mine = Bundle::new("mine", "1.0").with_root(mine_root.clone());
        let mut engine = engine_for(&fixture, vec![mine], Some(0));

        let target = Utf8Path::new("data/tex.bin");
        assert_eq!(engine.open_file(target).unwrap(), &Asset::Binary(vec![1, 2, 3]));
        engine.set_file_asset(target, Asset::Binary(vec![4, 5])).unwrap();
        engine.save_modified_files().unwrap();

        let saved = Bundle::load(&mine_root).unwrap();
        let (_, entry) = saved.find_listing(target).unwrap();
        assert_eq!(entry.diff_state(), FileDiffState::FullReplace);

        let mut engine = engine_for(&fixture, vec![saved], Some(0));
        assert_eq!(engine.open_file(target).unwrap(), &Asset::Binary(vec![4, 5]));
    }

    #[test]
    fn test_unchanged_save_keeps_diff_time() {
        let fixture = fixture();
        let mine_root = fixture.bundles.join("mine");
        let mine = Bundle::new("mine", "1.0").with_root(mine_root.clone());
        let mut engine = engine_for(&fixture, vec![mine], Some(0));

        let target = Utf8Path::new("data/icons.json");
        engine
            .set_file_asset(target, Asset::Document(json!({ "sword": { "frame": 5 } })))
            .unwrap();
        engine.save_modified_files().unwrap();
        let first = engine.active_bundle().unwrap().find_listing(target).unwrap().1.clone();

        engine.mark_modified(target).unwrap();
        engine.save_modified_files().unwrap();
        let second = engine.active_bundle().unwrap().find_listing(target).unwrap().1.clone();
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_and_unopened_files() {
        let fixture = fixture();
        let mut engine = engine_for(&fixture, vec![], None);

        assert!(matches!(
            engine.open_file(Utf8Path::new("data/none.json")),
            Err(Error::FileNotFound(_))
        ));
        assert!(matches!(
            engine.mark_modified(Utf8Path::new("data/icons.json")),
            Err(Error::FileNotOpen(_))
        ));
        engine.open_file(Utf8Path::new("data/icons.json")).unwrap();
        assert!(engine.close_file(Utf8Path::new("data/icons.json")));
    }

    #[test]
    fn test_new_file_without_base() {
        let fixture = fixture();
        let mine_root = fixture.bundles.join("mine");
        let mine = Bundle::new("mine", "1.0").with_root(mine_root.clone());
        let mut engine = engine_for(&fixture, vec![mine], Some(0));

        let target = Utf8Path::new("data/new.json");
        engine
            .set_file_asset(target, Asset::Document(json!({ "fresh": true })))
            .unwrap();
        engine.save_modified_files().unwrap();

        let saved = Bundle::load(&mine_root).unwrap();
        assert_eq!(
            saved.find_listing(target).unwrap().1.diff_state(),
            FileDiffState::FullReplace
        );
    }

    #[test]
    fn test_failed_file_does_not_block_the_others() {
        let fixture = fixture();
        let mine_root = fixture.bundles.join("mine");
        let mut mine = Bundle::new("mine", "1.0").with_root(mine_root.clone());
        mine.resource_listing
            .insert(Utf8PathBuf::from("../escape.json"), ListingEntry::new("data/bad.json"));
        let mut engine = engine_for(&fixture, vec![mine], Some(0));

        let bad = Utf8Path::new("data/bad.json");
        let good = Utf8Path::new("data/icons.json");
        engine
            .set_file_asset(bad, Asset::Document(json!({ "x": 1 })))
            .unwrap();
        engine
            .set_file_asset(good, Asset::Document(json!({ "sword": { "frame": 4 } })))
            .unwrap();

        let report = engine.save_modified_files().unwrap();
        assert_eq!(report.files_saved, vec![good.to_path_buf()]);
        assert_eq!(report.files_skipped.len(), 1);
        assert_eq!(report.files_skipped[0].0, bad.to_path_buf());
        assert!(engine.is_file_modified(bad));
        assert!(!engine.is_file_modified(good));

        assert!(mine_root.join("bundle.json").as_std_path().is_file());
        assert!(mine_root.join("data/icons.json").as_std_path().is_file());
        assert!(!fixture.bundles.join("escape.json").as_std_path().exists());
    }
}
