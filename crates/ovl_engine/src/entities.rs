//! Entity loading, editing and creation.

use crate::engine::OverlayEngine;
use crate::entity::{Entity, FieldValue, ResourceState};
use crate::error::{Error, Result};
use crate::resource_store::ResourceStore;
use crate::schema::{EntitySchema, Field, ResourceField};
use ovl_bundle::EntityEdit;
use ovl_diff::Document;
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Attempts at drawing a free id before giving up.
pub const MAX_ID_ATTEMPTS: usize = 100;

/// Current value of a field. Computed fields are resolved through their source.
pub(crate) fn field_ref<'a>(
    resources: &'a ResourceStore,
    schema: &EntitySchema,
    entity: &'a Entity,
    name: &str,
    state: ResourceState,
) -> Option<&'a Document> {
    match schema.field(name)? {
        Field::Computed(computed) => {
            if let Some(condition) = &computed.condition {
                let value = field_ref(resources, schema, entity, &condition.field, state);
                if !condition.evaluate(value) {
                    return None;
                }
            }
            let source = field_ref(resources, schema, entity, &computed.source, state)?;
            if computed.pointer.is_empty() {
                Some(source)
            } else {
                source.pointer(&computed.pointer)
            }
        }
        _ => match entity.field(name) {
            FieldValue::Null => None,
            FieldValue::Value(doc) => Some(doc),
            FieldValue::Resource { type_name, id } => resources.get(type_name, *id, state),
        },
    }
}

/// Whether a field is enabled for an entity in a state.
pub(crate) fn field_enabled(
    resources: &ResourceStore,
    schema: &EntitySchema,
    entity: &Entity,
    field: &Field,
    state: ResourceState,
) -> bool {
    field.condition().map_or(true, |condition| {
        condition.evaluate(field_ref(resources, schema, entity, &condition.field, state))
    })
}

fn render_label(resources: &ResourceStore, schema: &EntitySchema, entity: &Entity, state: ResourceState) -> String {
    schema
        .label
        .render(&schema.name, entity.id, |name| field_ref(resources, schema, entity, name, state))
}

fn group_names(group: &[Arc<EntitySchema>]) -> Vec<&str> {
    group.iter().map(|member| member.name.as_str()).collect()
}

impl OverlayEngine {
    /// Load an entity type: Base instances, the inactive layers folded on top,
    /// then the active layer's edits.
    ///
    /// Entity types sharing resource objects load as one group, so every
    /// layer of the group is folded in bundle order whichever type asks first.
    pub(crate) fn ensure_entity_type(&mut self, type_name: &str) -> Result<Arc<EntitySchema>> {
        self.layers()?;
        let schema = Arc::clone(self.schema.entity(type_name)?);
        if self.entities.is_loaded(type_name) {
            return Ok(schema);
        }

        let group: Vec<Arc<EntitySchema>> = self
            .schema
            .entity_group(type_name)
            .into_iter()
            .filter(|member| !self.entities.is_loaded(&member.name))
            .collect();
        for member in &group {
            self.entities.mark_loaded(&member.name);
        }
        for member in &group {
            for field in member.resource_fields() {
                self.ensure_resource_type(&field.resource_type)?;
            }
        }

        for member in &group {
            self.load_base_entity_instances(member);
        }
        self.load_bundle_entities_as_base(&group);
        self.load_active_entities(&group);
        Ok(schema)
    }

    fn load_base_entity_instances(&mut self, schema: &EntitySchema) {
        let ids: BTreeSet<i64> = schema
            .primary_fields()
            .flat_map(|field| self.resources.ids(&field.resource_type, ResourceState::Base))
            .collect();

        for id in &ids {
            let mut entity = Entity::new(&schema.name, *id);
            for field in &schema.fields {
                let value = match field {
                    Field::Resource(resource) => {
                        if self.resources.get_base(&resource.resource_type, *id).is_some() {
                            FieldValue::Resource {
                                type_name: resource.resource_type.clone(),
                                id: *id,
                            }
                        } else {
                            FieldValue::Null
                        }
                    }
                    Field::Value(value) => value
                        .default
                        .clone()
                        .map(FieldValue::Value)
                        .unwrap_or(FieldValue::Null),
                    Field::Computed(_) => continue,
                };
                entity.set_field(field.name(), value);
            }

            let disabled: Vec<String> = schema
                .fields
                .iter()
                .filter(|f| f.is_persisted())
                .filter(|f| !field_enabled(&self.resources, schema, &entity, f, ResourceState::Base))
                .map(|f| f.name().to_string())
                .collect();
            for name in disabled {
                entity.set_field(&name, FieldValue::Null);
            }

            entity.label = render_label(&self.resources, schema, &entity, ResourceState::Base);
            self.entities.insert(entity, ResourceState::Base);
        }

        tracing::info!("Loaded {} base entities type={}", ids.len(), schema.name);
    }

    fn load_bundle_entities_as_base(&mut self, group: &[Arc<EntitySchema>]) {
        let Some(layers) = &self.layers else {
            return;
        };
        let names = group_names(group);
        let edits: Vec<(String, EntityEdit)> = layers
            .inactive()
            .flat_map(|bundle| {
                bundle
                    .edits_of_types(&names)
                    .map(move |edit| (bundle.name.clone(), edit.clone()))
            })
            .collect();

        for (bundle_name, edit) in &edits {
            let Some(schema) = group.iter().find(|member| member.name == edit.type_name) else {
                continue;
            };
            tracing::debug!(
                "Folding entity edit bundle={} type={} id={}",
                bundle_name,
                edit.type_name,
                edit.id
            );

            if self.entities.get(&schema.name, edit.id, ResourceState::Base).is_none() {
                self.entities
                    .insert(Entity::new(&schema.name, edit.id), ResourceState::Base);
            }
            if let Some(entity) = self.entities.get_mut(&schema.name, edit.id, ResourceState::Base) {
                entity.diff = Some(edit.data.clone());
            }

            self.apply_data_values(schema, edit.id, &edit.data, ResourceState::Base);
            self.refresh_label(schema, edit.id, ResourceState::Base);
        }

        if !edits.is_empty() {
            tracing::info!("Folded {} inactive entity edits types={}", edits.len(), names.join(","));
        }
    }

    fn load_active_entities(&mut self, group: &[Arc<EntitySchema>]) {
        let names = group_names(group);
        let edits: Vec<EntityEdit> = match self.layers.as_ref().and_then(|l| l.active_bundle()) {
            Some(bundle) => bundle.edits_of_types(&names).cloned().collect(),
            None => return,
        };

        for edit in &edits {
            let Some(schema) = group.iter().find(|member| member.name == edit.type_name) else {
                continue;
            };
            self.materialize_active(schema, edit.id, true);
            if let Some(entity) = self.entities.get_mut(&schema.name, edit.id, ResourceState::Active) {
                entity.diff = Some(edit.data.clone());
            }

            self.apply_data_values(schema, edit.id, &edit.data, ResourceState::Active);
            self.refresh_label(schema, edit.id, ResourceState::Active);
        }

        if !edits.is_empty() {
            tracing::info!("Loaded {} active entity edits types={}", edits.len(), names.join(","));
        }
    }

    /// Apply stored field diffs to one entity, in field declaration order.
    ///
    /// A field whose condition does not hold is cleared. A diff that fails to
    /// apply is logged and skipped, leaving the field's previous value.
    fn apply_data_values(
        &mut self,
        schema: &EntitySchema,
        id: i64,
        data: &BTreeMap<String, Document>,
        state: ResourceState,
    ) {
        for name in data.keys() {
            match schema.field(name) {
                None => tracing::warn!(
                    "Skipping diff for unknown field type={} id={} field={}",
                    schema.name,
                    id,
                    name
                ),
                Some(Field::Computed(_)) => tracing::warn!(
                    "Skipping diff for computed field type={} id={} field={}",
                    schema.name,
                    id,
                    name
                ),
                Some(_) => {}
            }
        }

        for field in schema.fields.iter().filter(|f| f.is_persisted()) {
            let Some(diff) = data.get(field.name()) else {
                continue;
            };
            let Some(entity) = self.entities.get(&schema.name, id, state) else {
                return;
            };

            if !field_enabled(&self.resources, schema, entity, field, state) {
                tracing::debug!(
                    "Field disabled by condition type={} id={} field={}",
                    schema.name,
                    id,
                    field.name()
                );
                if let Some(entity) = self.entities.get_mut(&schema.name, id, state) {
                    entity.set_field(field.name(), FieldValue::Null);
                }
                continue;
            }

            let current = field_ref(&self.resources, schema, entity, field.name(), state);
            let value = match field.apply_diff(current, diff) {
                Ok(value) => value,
                Err(e) => {
                    let err = Error::diff_apply(format!("{}#{}.{}", schema.name, id, field.name()), e);
                    tracing::warn!("Skipping field: {}", err);
                    continue;
                }
            };

            self.store_field(schema, field, id, value, state);
        }
    }

    /// Write a field value, routing resource fields through the resource store.
    fn store_field(&mut self, schema: &EntitySchema, field: &Field, id: i64, value: Document, state: ResourceState) {
        let slot = match (field, value) {
            (_, Document::Null) => FieldValue::Null,
            (Field::Resource(resource), value) => {
                self.resources.update(&resource.resource_type, id, value, state);
                FieldValue::Resource {
                    type_name: resource.resource_type.clone(),
                    id,
                }
            }
            (_, value) => FieldValue::Value(value),
        };

        if let Some(entity) = self.entities.get_mut(&schema.name, id, state) {
            entity.set_field(field.name(), slot);
        }
    }

    fn refresh_label(&mut self, schema: &EntitySchema, id: i64, state: ResourceState) {
        let Some(entity) = self.entities.get(&schema.name, id, state) else {
            return;
        };
        let label = render_label(&self.resources, schema, entity, state);
        if let Some(entity) = self.entities.get_mut(&schema.name, id, state) {
            entity.label = label;
        }
    }

    /// Make sure an Active copy of the entity exists. Clones the Base entity
    /// and its resources on first touch, or creates an empty entity when
    /// `create` is set. Returns `false` when the entity does not exist.
    fn materialize_active(&mut self, schema: &EntitySchema, id: i64, create: bool) -> bool {
        if self.entities.get(&schema.name, id, ResourceState::Active).is_some() {
            return true;
        }

        let entity = match self.entities.get(&schema.name, id, ResourceState::Base) {
            Some(base) => base.clone(),
            None if create => Entity::new(&schema.name, id),
            None => return false,
        };

        for value in entity.fields.values() {
            if let FieldValue::Resource { type_name, id } = value {
                self.resources.get_active(type_name, *id);
            }
        }

        tracing::trace!("Materialized active entity type={} id={}", schema.name, id);
        self.entities.insert(entity, ResourceState::Active);
        true
    }

    /// Materialize the Active entities holding `(type_name, id)` in a resource
    /// field, so a direct edit of the object is seen when the bundle is saved.
    pub(crate) fn materialize_owners(&mut self, type_name: &str, id: i64) {
        for schema in self.schema.entity_types_touching(type_name) {
            let holds = self
                .entities
                .get(&schema.name, id, ResourceState::Base)
                .is_some_and(|entity| {
                    entity
                        .fields
                        .values()
                        .any(|value| matches!(value, FieldValue::Resource { id: held, .. } if *held == id))
                });
            if holds {
                self.materialize_active(&schema, id, false);
            }
        }
    }

    /// All entities of a type in id order, Active entities replacing Base ones.
    pub fn entity_instances(&mut self, type_name: &str) -> Result<Vec<(i64, &Entity)>> {
        self.ensure_entity_type(type_name)?;
        Ok(self.entities.instances(type_name))
    }

    pub fn get_base_entity(&mut self, type_name: &str, id: i64) -> Result<Option<&Entity>> {
        self.ensure_entity_type(type_name)?;
        let found = self.entities.get(type_name, id, ResourceState::Base);
        if found.is_none() {
            tracing::info!("Entity not found type={} id={} state=Base", type_name, id);
        }
        Ok(found)
    }

    /// Active entity, cloned from Base on first access.
    pub fn get_active_entity(&mut self, type_name: &str, id: i64) -> Result<Option<&Entity>> {
        let schema = self.ensure_entity_type(type_name)?;
        if !self.materialize_active(&schema, id, false) {
            tracing::info!("Entity not found type={} id={} state=Active", type_name, id);
            return Ok(None);
        }
        Ok(self.entities.get(type_name, id, ResourceState::Active))
    }

    /// Read a field, including computed fields. Reading Active does not
    /// materialize the entity.
    pub fn field_value(
        &mut self,
        type_name: &str,
        id: i64,
        field: &str,
        state: ResourceState,
    ) -> Result<Option<&Document>> {
        let schema = self.ensure_entity_type(type_name)?;
        schema.field_or_err(field)?;

        let entity = match state {
            ResourceState::Base => self.entities.get(type_name, id, ResourceState::Base),
            ResourceState::Active => self
                .entities
                .get(type_name, id, ResourceState::Active)
                .or_else(|| self.entities.get(type_name, id, ResourceState::Base)),
        };
        let Some(entity) = entity else {
            return Err(Error::EntityNotFound {
                entity_type: type_name.to_string(),
                id,
            });
        };
        Ok(field_ref(&self.resources, &schema, entity, field, state))
    }

    /// Write a field of an Active entity. Resource fields write through to the
    /// Active resource partition; null clears the field.
    pub fn set_field_value(&mut self, type_name: &str, id: i64, field: &str, value: Document) -> Result<()> {
        let schema = self.ensure_entity_type(type_name)?;
        let field = schema.field_or_err(field)?;
        if !field.is_persisted() {
            return Err(Error::ReadOnlyField {
                entity_type: type_name.to_string(),
                field: field.name().to_string(),
            });
        }

        if !self.materialize_active(&schema, id, false) {
            return Err(Error::EntityNotFound {
                entity_type: type_name.to_string(),
                id,
            });
        }

        self.store_field(&schema, field, id, value, ResourceState::Active);
        self.refresh_label(&schema, id, ResourceState::Active);
        tracing::debug!("Set field type={} id={} field={}", type_name, id, field.name());
        Ok(())
    }

    /// Create a new Active entity with a fresh id, optionally cloning the
    /// fields of `source_id`.
    ///
    /// # Errors
    ///
    /// Fails when no free id is found after [`MAX_ID_ATTEMPTS`] draws, when the
    /// source entity does not exist, or when a required field cannot be created.
    pub fn create_entity(&mut self, type_name: &str, source_id: Option<i64>) -> Result<Entity> {
        let schema = self.ensure_entity_type(type_name)?;
        let id = self.allocate_id(&schema)?;

        let source: BTreeMap<String, Document> = match source_id {
            Some(source_id) => self.source_values(&schema, source_id)?,
            None => BTreeMap::new(),
        };

        // Build every field first so a failure leaves no partial entity behind.
        let mut values: Vec<(&Field, Document)> = Vec::new();
        for field in schema.fields.iter().filter(|f| f.is_persisted()) {
            let template = source.get(field.name());
            let value = match field {
                Field::Resource(resource) => {
                    if template.is_none() && !resource.required {
                        continue;
                    }
                    self.create_resource(&schema, resource, id, template)?
                }
                Field::Value(value) => match template.or(value.default.as_ref()) {
                    Some(doc) => doc.clone(),
                    None => continue,
                },
                Field::Computed(_) => continue,
            };
            values.push((field, value));
        }

        self.entities
            .insert(Entity::new(&schema.name, id), ResourceState::Active);
        for (field, value) in values {
            self.store_field(&schema, field, id, value, ResourceState::Active);
        }
        self.refresh_label(&schema, id, ResourceState::Active);

        tracing::info!(
            "Created entity type={} id={} source={:?}",
            type_name,
            id,
            source_id
        );
        self.entities
            .get(type_name, id, ResourceState::Active)
            .cloned()
            .ok_or(Error::EntityNotFound {
                entity_type: type_name.to_string(),
                id,
            })
    }

    fn allocate_id(&mut self, schema: &EntitySchema) -> Result<i64> {
        let range = schema.id_range;
        for attempt in 0..MAX_ID_ATTEMPTS {
            let id = self.rng.gen_range(range.min..=range.max);
            let taken = self.entities.contains_id(&schema.name, id)
                || schema
                    .resource_fields()
                    .any(|f| self.resources.contains(&f.resource_type, id));
            if !taken {
                return Ok(id);
            }
            tracing::trace!("Id collision type={} id={} attempt={}", schema.name, id, attempt);
        }

        Err(Error::IdRangeExhausted {
            entity_type: schema.name.clone(),
            attempts: MAX_ID_ATTEMPTS,
        })
    }

    /// Current Active values of an entity's stored fields.
    fn source_values(&self, schema: &EntitySchema, id: i64) -> Result<BTreeMap<String, Document>> {
        let entity = self
            .entities
            .get(&schema.name, id, ResourceState::Active)
            .or_else(|| self.entities.get(&schema.name, id, ResourceState::Base))
            .ok_or_else(|| Error::EntityNotFound {
                entity_type: schema.name.clone(),
                id,
            })?;

        Ok(schema
            .fields
            .iter()
            .filter(|f| f.is_persisted())
            .filter_map(|f| {
                field_ref(&self.resources, schema, entity, f.name(), ResourceState::Active)
                    .map(|doc| (f.name().to_string(), doc.clone()))
            })
            .collect())
    }

    fn create_resource(
        &mut self,
        schema: &EntitySchema,
        field: &ResourceField,
        id: i64,
        template: Option<&Document>,
    ) -> Result<Document> {
        let required_error = |reason: String| Error::RequiredField {
            entity_type: schema.name.clone(),
            field: field.name.clone(),
            reason,
        };

        let decoder_name = self
            .schema
            .resource_type(&field.resource_type)
            .and_then(|r| r.decoder.clone());
        let decoder = match decoder_name {
            Some(name) => self.decoders.get_mut(&name),
            None => None,
        };

        match (decoder, template) {
            (Some(decoder), template) => decoder
                .create(&field.resource_type, id, template)
                .map_err(|e| required_error(e.to_string())),
            (None, Some(template)) => Ok(template.clone()),
            (None, None) => Err(required_error(format!(
                "no decoder for resource type '{}'",
                field.resource_type
            ))),
        }
    }
}
