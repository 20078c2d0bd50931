use ovl_diff::Document;
use std::collections::BTreeMap;

/// Which partition of a store an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceState {
    /// Original data folded with every inactive layer. Read-only.
    Base,
    /// Copy-on-write view edited through the active layer.
    Active,
}

/// The value slot of one entity field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    /// The field's value lives in the resource store under `(type_name, id)`.
    Resource { type_name: String, id: i64 },
    /// The value is stored on the entity.
    Value(Document),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

/// A logical record composed of fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub type_name: String,
    pub id: i64,
    pub label: String,
    pub fields: BTreeMap<String, FieldValue>,
    /// Field diffs of the layer that last touched this entity.
    pub diff: Option<BTreeMap<String, Document>>,
}

impl Entity {
    pub fn new(type_name: impl Into<String>, id: i64) -> Self {
        Self {
            type_name: type_name.into(),
            id,
            label: String::new(),
            fields: BTreeMap::new(),
            diff: None,
        }
    }

    pub fn field(&self, name: &str) -> &FieldValue {
        self.fields.get(name).unwrap_or(&FieldValue::Null)
    }

    /// Set a field slot, removing it when the value is null.
    pub fn set_field(&mut self, name: &str, value: FieldValue) {
        if value.is_null() {
            self.fields.remove(name);
        } else {
            self.fields.insert(name.to_string(), value);
        }
    }
}
