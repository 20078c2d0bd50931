use crate::entity::{Entity, ResourceState};
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Default)]
struct EntityPartitions {
    base: BTreeMap<i64, Entity>,
    active: BTreeMap<i64, Entity>,
}

/// Per-type cache of entities, split into Base and Active like the resource
/// store. A type is either fully loaded or absent.
#[derive(Debug, Default)]
pub struct EntityStore {
    types: HashMap<String, EntityPartitions>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_loaded(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    /// Create the (empty) partitions of a type, marking it loaded.
    pub fn mark_loaded(&mut self, type_name: &str) {
        self.types.entry(type_name.to_string()).or_default();
    }

    pub fn get(&self, type_name: &str, id: i64, state: ResourceState) -> Option<&Entity> {
        let partitions = self.types.get(type_name)?;
        match state {
            ResourceState::Base => partitions.base.get(&id),
            ResourceState::Active => partitions.active.get(&id),
        }
    }

    pub fn get_mut(&mut self, type_name: &str, id: i64, state: ResourceState) -> Option<&mut Entity> {
        let partitions = self.types.get_mut(type_name)?;
        match state {
            ResourceState::Base => partitions.base.get_mut(&id),
            ResourceState::Active => partitions.active.get_mut(&id),
        }
    }

    pub fn insert(&mut self, entity: Entity, state: ResourceState) {
        let partitions = self.types.entry(entity.type_name.clone()).or_default();
        let target = match state {
            ResourceState::Base => &mut partitions.base,
            ResourceState::Active => &mut partitions.active,
        };
        target.insert(entity.id, entity);
    }

    /// Entities of a type in id order. Active entities replace their Base
    /// counterparts.
    pub fn instances<'a>(&'a self, type_name: &str) -> Vec<(i64, &'a Entity)> {
        let Some(partitions) = self.types.get(type_name) else {
            return Vec::new();
        };

        let mut merged: BTreeMap<i64, &Entity> = partitions.base.iter().map(|(id, e)| (*id, e)).collect();
        merged.extend(partitions.active.iter().map(|(id, e)| (*id, e)));
        merged.into_iter().collect()
    }

    pub fn contains_id(&self, type_name: &str, id: i64) -> bool {
        self.types
            .get(type_name)
            .is_some_and(|p| p.base.contains_key(&id) || p.active.contains_key(&id))
    }

    /// Ids of a type present in the Active partition.
    pub fn active_ids(&self, type_name: &str) -> Vec<i64> {
        self.types
            .get(type_name)
            .map(|p| p.active.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Types with at least one Active entity.
    pub fn touched_types(&self) -> BTreeSet<String> {
        self.types
            .iter()
            .filter(|(_, p)| !p.active.is_empty())
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn clear(&mut self) {
        self.types.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instances_merge_active_over_base() {
        let mut store = EntityStore::new();
        let mut base = Entity::new("Item", 2);
        base.label = "base".to_string();
        store.insert(base.clone(), ResourceState::Base);
        store.insert(Entity::new("Item", 1), ResourceState::Base);

        let mut active = base;
        active.label = "active".to_string();
        store.insert(active, ResourceState::Active);

        let labels: Vec<_> = store
            .instances("Item")
            .into_iter()
            .map(|(id, e)| (id, e.label.as_str()))
            .collect();
        assert_eq!(labels, vec![(1, ""), (2, "active")]);
        assert_eq!(store.get("Item", 2, ResourceState::Base).unwrap().label, "base");
        assert_eq!(store.touched_types(), BTreeSet::from(["Item".to_string()]));
    }

    #[test]
    fn test_loaded_flag() {
        let mut store = EntityStore::new();
        assert!(!store.is_loaded("Item"));
        store.mark_loaded("Item");
        assert!(store.is_loaded("Item"));
        assert!(store.instances("Item").is_empty());
        assert!(store.touched_types().is_empty());

        store.clear();
        assert!(!store.is_loaded("Item"));
    }
}
