//! Compiled configuration.
//!
//! [`Schema::compile`] validates an [`EngineConfig`] once at startup. Entries
//! that reference unknown types or fields are logged at error level, recorded
//! in [`Schema::issues`] and skipped, so one bad entry never prevents the rest
//! of the configuration from loading.

use crate::config::{ConditionConfig, EngineConfig, FieldKindConfig, IdRange};
use crate::error::{Error, Result};
use crate::label::LabelFormat;
use ovl_diff::Document;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

/// A declared resource type.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceType {
    pub name: String,
    /// Every type this type is also registered under, transitively, never
    /// including the type itself.
    pub aliases: Vec<String>,
    pub decoder: Option<String>,
}

/// Enables a field depending on another field's value.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldCondition {
    pub field: String,
    pub pointer: String,
    pub equals: Option<Document>,
    pub negate: bool,
}

impl FieldCondition {
    fn from_config(config: &ConditionConfig) -> Self {
        Self {
            field: config.field.clone(),
            pointer: config.pointer.clone(),
            equals: config.equals.clone(),
            negate: config.negate,
        }
    }

    /// Evaluate against the current value of the referenced field.
    pub fn evaluate(&self, value: Option<&Document>) -> bool {
        let target = value.and_then(|doc| {
            if self.pointer.is_empty() {
                Some(doc)
            } else {
                doc.pointer(&self.pointer)
            }
        });

        let holds = match &self.equals {
            Some(expected) => target == Some(expected),
            None => !matches!(target, None | Some(Document::Null) | Some(Document::Bool(false))),
        };
        holds != self.negate
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceField {
    pub name: String,
    pub resource_type: String,
    pub primary: bool,
    pub required: bool,
    pub diffable: bool,
    pub condition: Option<FieldCondition>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValueField {
    pub name: String,
    pub default: Option<Document>,
    pub diffable: bool,
    pub condition: Option<FieldCondition>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComputedField {
    pub name: String,
    pub source: String,
    pub pointer: String,
    pub condition: Option<FieldCondition>,
}

/// One field of an entity type, with its behavior fixed at compile time.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    /// Backed by the resource `(resource_type, entity id)`.
    Resource(ResourceField),
    /// Stored on the entity.
    Value(ValueField),
    /// Read-only view into another field.
    Computed(ComputedField),
}

impl Field {
    pub fn name(&self) -> &str {
        match self {
            Field::Resource(f) => &f.name,
            Field::Value(f) => &f.name,
            Field::Computed(f) => &f.name,
        }
    }

    pub fn condition(&self) -> Option<&FieldCondition> {
        match self {
            Field::Resource(f) => f.condition.as_ref(),
            Field::Value(f) => f.condition.as_ref(),
            Field::Computed(f) => f.condition.as_ref(),
        }
    }

    pub fn resource_type(&self) -> Option<&str> {
        match self {
            Field::Resource(f) => Some(&f.resource_type),
            _ => None,
        }
    }

    pub fn is_primary(&self) -> bool {
        matches!(self, Field::Resource(f) if f.primary)
    }

    pub fn is_required(&self) -> bool {
        matches!(self, Field::Resource(f) if f.required)
    }

    pub fn is_diffable(&self) -> bool {
        match self {
            Field::Resource(f) => f.diffable,
            Field::Value(f) => f.diffable,
            Field::Computed(_) => false,
        }
    }

    /// Whether the field's edits are stored in bundles.
    pub fn is_persisted(&self) -> bool {
        !matches!(self, Field::Computed(_))
    }

    /// Apply a stored diff on top of the field's current value.
    ///
    /// Diffable fields merge the patch, other fields take the stored value as
    /// a full replacement.
    pub fn apply_diff(&self, current: Option<&Document>, diff: &Document) -> ovl_diff::Result<Document> {
        if self.is_diffable() {
            ovl_diff::apply(current.unwrap_or(&Document::Null), diff)
        } else {
            Ok(diff.clone())
        }
    }

    /// Compute the diff to store for a field, `None` when nothing changed.
    pub fn compute_diff(&self, base: Option<&Document>, active: Option<&Document>) -> Option<Document> {
        if self.is_diffable() {
            return ovl_diff::diff(base.unwrap_or(&Document::Null), active.unwrap_or(&Document::Null));
        }

        if base == active {
            None
        } else {
            Some(active.cloned().unwrap_or(Document::Null))
        }
    }
}

/// Compiled entity type.
#[derive(Debug, Clone)]
pub struct EntitySchema {
    pub name: String,
    /// Fields in configuration order.
    pub fields: Vec<Field>,
    pub id_range: IdRange,
    pub label: LabelFormat,
}

impl EntitySchema {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name() == name)
    }

    pub fn primary_fields(&self) -> impl Iterator<Item = &ResourceField> {
        self.fields.iter().filter_map(|f| match f {
            Field::Resource(r) if r.primary => Some(r),
            _ => None,
        })
    }

    pub fn resource_fields(&self) -> impl Iterator<Item = &ResourceField> {
        self.fields.iter().filter_map(|f| match f {
            Field::Resource(r) => Some(r),
            _ => None,
        })
    }

    pub fn field_or_err(&self, name: &str) -> Result<&Field> {
        self.field(name).ok_or_else(|| Error::UnknownField {
            entity_type: self.name.clone(),
            field: name.to_string(),
        })
    }
}

/// Validated, compiled configuration shared by an engine.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    resources: BTreeMap<String, ResourceType>,
    /// Alias type -> declared types registered under it.
    subtypes: BTreeMap<String, Vec<String>>,
    entities: BTreeMap<String, Arc<EntitySchema>>,
    enums: BTreeMap<String, BTreeMap<String, i64>>,
    issues: Vec<String>,
}

/// Fields that reach themselves through conditions and computed sources.
fn dependency_cycles(fields: &[Field]) -> BTreeSet<String> {
    let deps: BTreeMap<&str, Vec<&str>> = fields
        .iter()
        .map(|field| {
            let mut out: Vec<&str> = field.condition().map(|c| c.field.as_str()).into_iter().collect();
            if let Field::Computed(computed) = field {
                out.push(&computed.source);
            }
            (field.name(), out)
        })
        .collect();

    let mut cyclic = BTreeSet::new();
    for (start, first) in &deps {
        let mut seen = BTreeSet::new();
        let mut pending = first.clone();
        while let Some(next) = pending.pop() {
            if next == *start {
                cyclic.insert(start.to_string());
                break;
            }
            if seen.insert(next) {
                pending.extend(deps.get(next).into_iter().flatten());
            }
        }
    }
    cyclic
}

impl Schema {
    pub fn compile(config: &EngineConfig) -> Self {
        let mut schema = Schema {
            enums: config.enums.clone(),
            ..Default::default()
        };

        schema.compile_resources(config);
        for (name, entity) in &config.entities {
            let compiled = schema.compile_entity(name, entity, config.default_id_range);
            schema.entities.insert(name.clone(), Arc::new(compiled));
        }

        tracing::info!(
            "Compiled schema resources={} entities={} issues={}",
            schema.resources.len(),
            schema.entities.len(),
            schema.issues.len()
        );
        schema
    }

    fn issue(&mut self, message: String) {
        tracing::error!("Configuration error: {}", message);
        self.issues.push(message);
    }

    fn compile_resources(&mut self, config: &EngineConfig) {
        for (name, resource) in &config.resources {
            let mut closure = Vec::new();
            let mut seen = HashSet::from([name.as_str()]);
            let mut queue: Vec<&str> = resource.aliases.iter().map(String::as_str).collect();
            let mut cyclic = false;

            while let Some(alias) = queue.pop() {
                if alias == name {
                    cyclic = true;
                    continue;
                }
                if !seen.insert(alias) {
                    continue;
                }
                closure.push(alias.to_string());
                if let Some(next) = config.resources.get(alias) {
                    queue.extend(next.aliases.iter().map(String::as_str));
                }
            }

            if cyclic {
                self.issue(format!(
                    "resource type '{name}' is its own alias, ignoring its aliases"
                ));
                closure.clear();
            }
            closure.sort();

            for alias in &closure {
                self.subtypes.entry(alias.clone()).or_default().push(name.clone());
            }
            self.resources.insert(
                name.clone(),
                ResourceType {
                    name: name.clone(),
                    aliases: closure,
                    decoder: resource.decoder.clone(),
                },
            );
        }
    }

    fn compile_entity(
        &mut self,
        name: &str,
        config: &crate::config::EntityConfig,
        default_range: IdRange,
    ) -> EntitySchema {
        let mut fields: Vec<Field> = Vec::new();
        let mut names = BTreeSet::new();

        for field in &config.fields {
            if !names.insert(field.name.as_str()) {
                self.issue(format!("duplicate field '{}' on entity '{name}'", field.name));
                continue;
            }

            let condition = field.condition.as_ref().map(FieldCondition::from_config);
            let compiled = match &field.kind {
                FieldKindConfig::Resource {
                    resource_type,
                    primary,
                    required,
                    diffable,
                } => {
                    if !self.is_resource_type(resource_type) {
                        self.issue(format!(
                            "field '{}' on entity '{name}' uses unknown resource type '{resource_type}'",
                            field.name
                        ));
                        continue;
                    }
                    Field::Resource(ResourceField {
                        name: field.name.clone(),
                        resource_type: resource_type.clone(),
                        primary: *primary,
                        required: *required,
                        diffable: *diffable,
                        condition,
                    })
                }
                FieldKindConfig::Value { default, diffable } => Field::Value(ValueField {
                    name: field.name.clone(),
                    default: default.clone(),
                    diffable: *diffable,
                    condition,
                }),
                FieldKindConfig::Computed { source, pointer } => Field::Computed(ComputedField {
                    name: field.name.clone(),
                    source: source.clone(),
                    pointer: pointer.clone(),
                    condition,
                }),
            };
            fields.push(compiled);
        }

        // Computed sources must be stored fields.
        let stored: BTreeSet<String> = fields
            .iter()
            .filter(|f| f.is_persisted())
            .map(|f| f.name().to_string())
            .collect();
        let mut kept = Vec::with_capacity(fields.len());
        for field in fields {
            if let Field::Computed(computed) = &field {
                if !stored.contains(&computed.source) {
                    self.issue(format!(
                        "computed field '{}' on entity '{name}' has invalid source '{}'",
                        computed.name, computed.source
                    ));
                    continue;
                }
            }
            kept.push(field);
        }

        let known: BTreeSet<String> = kept.iter().map(|f| f.name().to_string()).collect();
        let mut fields = Vec::with_capacity(kept.len());
        for field in kept {
            if let Some(condition) = field.condition() {
                if condition.field == field.name() || !known.contains(&condition.field) {
                    self.issue(format!(
                        "field '{}' on entity '{name}' has a condition on unknown field '{}'",
                        field.name(),
                        condition.field
                    ));
                    continue;
                }
            }
            fields.push(field);
        }

        let cyclic = dependency_cycles(&fields);
        fields.retain(|field| {
            if !cyclic.contains(field.name()) {
                return true;
            }
            self.issue(format!(
                "field '{}' on entity '{name}' is part of a condition cycle",
                field.name()
            ));
            false
        });

        let id_range = match config.id_range {
            Some(range) if range.min > range.max => {
                self.issue(format!(
                    "entity '{name}' has an empty id range {}..={}",
                    range.min, range.max
                ));
                default_range
            }
            Some(range) => range,
            None => default_range,
        };

        let mut label = config
            .label
            .as_deref()
            .map(LabelFormat::parse)
            .unwrap_or_default();
        let unknown_label_field = label
            .referenced_fields()
            .find(|f| !fields.iter().any(|field| field.name() == *f))
            .map(str::to_string);
        if let Some(unknown) = unknown_label_field {
            self.issue(format!("label of entity '{name}' references unknown field '{unknown}'"));
            label = LabelFormat::default();
        }

        if !fields.iter().any(Field::is_primary) {
            tracing::warn!(
                "Entity type has no primary field, only bundle and created instances will exist type={}",
                name
            );
        }

        EntitySchema {
            name: name.to_string(),
            fields,
            id_range,
            label,
        }
    }

    /// Problems found while compiling, in discovery order.
    pub fn issues(&self) -> &[String] {
        &self.issues
    }

    pub fn resource_type(&self, name: &str) -> Option<&ResourceType> {
        self.resources.get(name)
    }

    pub fn resource_types(&self) -> impl Iterator<Item = &ResourceType> {
        self.resources.values()
    }

    /// Declared types and types that are only ever used as an alias.
    pub fn is_resource_type(&self, name: &str) -> bool {
        self.resources.contains_key(name) || self.subtypes.contains_key(name)
    }

    /// Transitive aliases of a declared type.
    pub fn aliases_of(&self, name: &str) -> &[String] {
        self.resources
            .get(name)
            .map(|r| r.aliases.as_slice())
            .unwrap_or_default()
    }

    /// Declared types that register their objects under `name`.
    pub fn subtypes_of(&self, name: &str) -> &[String] {
        self.subtypes.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn entity(&self, name: &str) -> Result<&Arc<EntitySchema>> {
        self.entities
            .get(name)
            .ok_or_else(|| Error::UnknownEntityType(name.to_string()))
    }

    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    /// Entity types with a resource field that can hold objects of `resource_type`.
    pub fn entity_types_touching(&self, resource_type: &str) -> Vec<Arc<EntitySchema>> {
        let related = |field_type: &str| {
            field_type == resource_type
                || self.aliases_of(resource_type).iter().any(|a| a == field_type)
                || self.subtypes_of(resource_type).iter().any(|s| s == field_type)
        };

        self.entities
            .values()
            .filter(|entity| entity.resource_fields().any(|f| related(&f.resource_type)))
            .cloned()
            .collect()
    }

    /// `name` and every entity type transitively sharing resource objects
    /// with it, in name order. These types must fold their layers together.
    pub fn entity_group(&self, name: &str) -> Vec<Arc<EntitySchema>> {
        let mut group: BTreeMap<String, Arc<EntitySchema>> = BTreeMap::new();
        let mut pending: Vec<Arc<EntitySchema>> = self.entities.get(name).cloned().into_iter().collect();

        while let Some(entity) = pending.pop() {
            if group.contains_key(&entity.name) {
                continue;
            }
            for field in entity.resource_fields() {
                pending.extend(
                    self.entity_types_touching(&field.resource_type)
                        .into_iter()
                        .filter(|other| !group.contains_key(&other.name)),
                );
            }
            group.insert(entity.name.clone(), entity);
        }

        group.into_values().collect()
    }

    /// Enum labels declared in the configuration.
    pub fn enum_defaults(&self, name: &str) -> Option<&BTreeMap<String, i64>> {
        self.enums.get(name)
    }

    pub fn enum_names(&self) -> impl Iterator<Item = &str> {
        self.enums.keys().map(String::as_str)
    }
}
