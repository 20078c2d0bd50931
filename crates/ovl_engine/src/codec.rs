//! Path-addressed file codecs.
//!
//! A [`FileCodec`] reads and writes one kind of game file and may support
//! structured diffs. Files without diff support are overlaid by full
//! replacement.

use crate::error::{Error, Result};
use camino::Utf8Path;
use ovl_diff::Document;
use std::collections::HashMap;
use std::io::{Read, Write};

/// A decoded file.
#[derive(Debug, Clone, PartialEq)]
pub enum Asset {
    Document(Document),
    Binary(Vec<u8>),
}

pub trait FileCodec: Send {
    fn read(&self, reader: &mut dyn Read) -> Result<Asset>;

    fn write(&self, asset: &Asset, writer: &mut dyn Write) -> Result<()>;

    fn supports_diff(&self) -> bool {
        false
    }

    /// Diff of `current` against `base`, `None` when they are equal.
    fn find_diff(&self, _base: &Asset, _current: &Asset) -> Result<Option<Document>> {
        Ok(None)
    }

    fn apply_diff(&self, _base: Asset, _diff: &Document) -> Result<Asset> {
        Err(Error::DiffUnsupported(Default::default()))
    }
}

/// JSON files, diffed structurally.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    fn document(asset: &Asset) -> Result<Document> {
        match asset {
            Asset::Document(doc) => Ok(doc.clone()),
            Asset::Binary(bytes) => Ok(serde_json::from_slice(bytes)?),
        }
    }
}

impl FileCodec for JsonCodec {
    fn read(&self, reader: &mut dyn Read) -> Result<Asset> {
        Ok(Asset::Document(serde_json::from_reader(reader)?))
    }

    fn write(&self, asset: &Asset, writer: &mut dyn Write) -> Result<()> {
        match asset {
            Asset::Document(doc) => serde_json::to_writer_pretty(writer, doc)?,
            Asset::Binary(bytes) => writer.write_all(bytes)?,
        }
        Ok(())
    }

    fn supports_diff(&self) -> bool {
        true
    }

    fn find_diff(&self, base: &Asset, current: &Asset) -> Result<Option<Document>> {
        Ok(ovl_diff::diff(&Self::document(base)?, &Self::document(current)?))
    }

    fn apply_diff(&self, base: Asset, diff: &Document) -> Result<Asset> {
        let base = Self::document(&base)?;
        let patched = ovl_diff::apply(&base, diff).map_err(|e| Error::diff_apply("file", e))?;
        Ok(Asset::Document(patched))
    }
}

/// Opaque bytes. Always replaced in full.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec;

impl FileCodec for RawCodec {
    fn read(&self, reader: &mut dyn Read) -> Result<Asset> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Ok(Asset::Binary(bytes))
    }

    fn write(&self, asset: &Asset, writer: &mut dyn Write) -> Result<()> {
        match asset {
            Asset::Binary(bytes) => writer.write_all(bytes)?,
            Asset::Document(doc) => serde_json::to_writer(writer, doc)?,
        }
        Ok(())
    }
}

/// Picks a codec by lowercase file extension, falling back to [`RawCodec`].
pub struct CodecRegistry {
    codecs: HashMap<String, Box<dyn FileCodec>>,
    fallback: Box<dyn FileCodec>,
}

impl Default for CodecRegistry {
    fn default() -> Self {
        let mut registry = Self {
            codecs: HashMap::new(),
            fallback: Box::new(RawCodec),
        };
        registry.register("json", Box::new(JsonCodec));
        registry
    }
}

impl std::fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("extensions", &self.codecs.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CodecRegistry {
    pub fn register(&mut self, extension: &str, codec: Box<dyn FileCodec>) {
        self.codecs.insert(extension.to_ascii_lowercase(), codec);
    }

    pub fn for_path(&self, path: &Utf8Path) -> &dyn FileCodec {
        path.extension()
            .and_then(|ext| self.codecs.get(&ext.to_ascii_lowercase()))
            .map(|codec| &**codec)
            .unwrap_or(&*self.fallback)
    }

    pub fn read_file(&self, path: &Utf8Path) -> Result<Asset> {
        let mut file = std::fs::File::open(path.as_std_path())?;
        self.for_path(path).read(&mut file)
    }

    pub fn write_file(&self, path: &Utf8Path, asset: &Asset) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent.as_std_path())?;
        }
        let mut file = std::fs::File::create(path.as_std_path())?;
        self.for_path(path).write(asset, &mut file)
    }
}
