//! Declarative engine configuration.
//!
//! The configuration is loaded once at startup from JSON or TOML and describes
//! every resource type (its alias types and decoder binding) and every entity
//! type (its fields, id range and label template). It is compiled into a
//! [`Schema`](crate::schema::Schema) before use.

use crate::error::{Error, Result};
use camino::Utf8Path;
use ovl_diff::Document;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Root of an engine configuration file.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Resource type name -> resource type settings.
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceTypeConfig>,

    /// Entity type name -> entity type settings.
    #[serde(default)]
    pub entities: BTreeMap<String, EntityConfig>,

    /// Enum labels known before any bundle is applied.
    #[serde(default)]
    pub enums: BTreeMap<String, BTreeMap<String, i64>>,

    /// Id range for entity types that do not declare their own.
    #[serde(default = "IdRange::default_range")]
    pub default_id_range: IdRange,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            resources: BTreeMap::new(),
            entities: BTreeMap::new(),
            enums: BTreeMap::new(),
            default_id_range: IdRange::default_range(),
        }
    }
}

/// Settings for one resource type.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTypeConfig {
    /// Base types this type is also addressable under.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,

    /// Name of the decoder adapter that enumerates the original objects.
    /// Types without a decoder only receive objects through their subtypes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decoder: Option<String>,
}

/// Settings for one entity type.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct EntityConfig {
    pub fields: Vec<FieldConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_range: Option<IdRange>,

    /// Label template, e.g. `"{stats/name} ({id})"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Inclusive range of ids new entities are drawn from.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy)]
pub struct IdRange {
    pub min: i64,
    pub max: i64,
}

impl IdRange {
    pub fn default_range() -> Self {
        Self {
            min: 1_000_000,
            max: 1_999_999_999,
        }
    }

    pub fn contains(&self, id: i64) -> bool {
        (self.min..=self.max).contains(&id)
    }
}

/// One field of an entity type.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct FieldConfig {
    pub name: String,

    #[serde(flatten)]
    pub kind: FieldKindConfig,

    /// The field only applies when this condition holds for the entity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<ConditionConfig>,
}

/// What backs a field's value.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum FieldKindConfig {
    /// The field's value is the resource `(resource_type, entity id)`.
    Resource {
        #[serde(rename = "resourceType")]
        resource_type: String,
        /// Ids of this resource type define which entities exist.
        #[serde(default)]
        primary: bool,
        /// New entities must receive a value for this field.
        #[serde(default)]
        required: bool,
        #[serde(default = "default_true")]
        diffable: bool,
    },
    /// A plain value stored on the entity itself.
    Value {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<Document>,
        #[serde(default = "default_true")]
        diffable: bool,
    },
    /// Read-only view into another field, selected by a JSON pointer.
    Computed {
        source: String,
        #[serde(default)]
        pointer: String,
    },
}

/// Enables a field depending on another field's value.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct ConditionConfig {
    pub field: String,

    /// JSON pointer into the field's value; empty means the whole value.
    #[serde(default)]
    pub pointer: String,

    /// Required value. Without it the condition holds when the value is
    /// present and neither null nor `false`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equals: Option<Document>,

    #[serde(default)]
    pub negate: bool,
}

fn default_true() -> bool {
    true
}

impl EngineConfig {
    /// Load a configuration file, choosing the format by extension
    /// (`.toml`, anything else is read as JSON).
    pub fn load(path: &Utf8Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_std_path())?;
        let config = match path.extension() {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Self::from_toml_str(&contents)?,
            _ => Self::from_json_str(&contents)?,
        };

        tracing::info!(
            "Loaded engine config path={} resources={} entities={}",
            path,
            config.resources.len(),
            config.entities.len()
        );
        Ok(config)
    }

    pub fn from_json_str(contents: &str) -> Result<Self> {
        Ok(serde_json::from_str(contents)?)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Look up an entity type, failing with [`Error::UnknownEntityType`].
    pub fn entity(&self, name: &str) -> Result<&EntityConfig> {
        self.entities
            .get(name)
            .ok_or_else(|| Error::UnknownEntityType(name.to_string()))
    }
}
