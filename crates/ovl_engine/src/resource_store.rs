//! Per-type cache of decoded objects, split into Base and Active partitions.
//!
//! Objects are owned by the partition of their concrete type. Every alias type
//! of that type gets an indirection slot with the same id, so a lookup through
//! an alias and through the concrete type always observe the same object.
//!
//! Active is copy-on-write: the first Active access of an id clones the
//! object from Base. Base is never touched by an Active operation.

use crate::entity::ResourceState;
use ovl_diff::Document;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Upper bound on alias hops, guarding against a cyclic indirection.
const MAX_ALIAS_HOPS: usize = 16;

#[derive(Debug, Clone, PartialEq)]
enum Slot {
    Owned(Document),
    /// The object is owned by this type's partition under the same id.
    Alias(String),
}

#[derive(Debug, Default)]
struct Partition {
    types: HashMap<String, BTreeMap<i64, Slot>>,
}

impl Partition {
    fn slot(&self, type_name: &str, id: i64) -> Option<&Slot> {
        self.types.get(type_name)?.get(&id)
    }

    /// Follow alias slots to the concrete type owning `(type_name, id)`.
    fn owner<'a>(&'a self, type_name: &'a str, id: i64) -> Option<&'a str> {
        let mut current = type_name;
        for _ in 0..MAX_ALIAS_HOPS {
            match self.slot(current, id)? {
                Slot::Owned(_) => return Some(current),
                Slot::Alias(owner) => current = owner,
            }
        }
        tracing::warn!("Alias chain too long type={} id={}", type_name, id);
        None
    }

    fn get(&self, type_name: &str, id: i64) -> Option<&Document> {
        let owner = self.owner(type_name, id)?;
        match self.slot(owner, id)? {
            Slot::Owned(doc) => Some(doc),
            Slot::Alias(_) => None,
        }
    }

    fn get_mut(&mut self, type_name: &str, id: i64) -> Option<&mut Document> {
        let owner = self.owner(type_name, id)?.to_string();
        match self.types.get_mut(&owner)?.get_mut(&id)? {
            Slot::Owned(doc) => Some(doc),
            Slot::Alias(_) => None,
        }
    }

    fn insert(&mut self, type_name: &str, id: i64, slot: Slot) {
        self.types
            .entry(type_name.to_string())
            .or_default()
            .insert(id, slot);
    }

    fn ids(&self, type_name: &str) -> impl Iterator<Item = i64> + '_ {
        self.types
            .get(type_name)
            .into_iter()
            .flat_map(|slots| slots.keys().copied())
    }
}

/// Cache of decoded objects for every resource type.
#[derive(Debug, Default)]
pub struct ResourceStore {
    base: Partition,
    active: Partition,
    /// Concrete type -> transitive alias types.
    aliases: HashMap<String, Vec<String>>,
    /// Types whose original data has been enumerated.
    loaded: HashSet<String>,
}

impl ResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the alias types objects of `type_name` are registered under.
    pub fn with_aliases(mut self, type_name: impl Into<String>, aliases: Vec<String>) -> Self {
        self.set_aliases(type_name, aliases);
        self
    }

    pub fn set_aliases(&mut self, type_name: impl Into<String>, aliases: Vec<String>) {
        self.aliases.insert(type_name.into(), aliases);
    }

    fn partition(&self, state: ResourceState) -> &Partition {
        match state {
            ResourceState::Base => &self.base,
            ResourceState::Active => &self.active,
        }
    }

    fn partition_mut(&mut self, state: ResourceState) -> &mut Partition {
        match state {
            ResourceState::Base => &mut self.base,
            ResourceState::Active => &mut self.active,
        }
    }

    /// Register an object under its type and every alias type.
    ///
    /// Registering the same id again overwrites it, so later layers win.
    pub fn register(&mut self, type_name: &str, id: i64, object: Document, state: ResourceState) {
        let aliases = self.aliases.get(type_name).cloned().unwrap_or_default();
        let partition = self.partition_mut(state);

        partition.insert(type_name, id, Slot::Owned(object));
        for alias in aliases {
            partition.insert(&alias, id, Slot::Alias(type_name.to_string()));
        }
        tracing::trace!("Registered resource type={} id={} state={:?}", type_name, id, state);
    }

    /// Register an object only if nothing is registered under `(type_name, id)`
    /// yet. Returns `true` when the object was stored.
    ///
    /// Used for a base type's own original data, which must not shadow objects
    /// that a subtype already registered under the same id.
    pub fn register_fallback(&mut self, type_name: &str, id: i64, object: Document, state: ResourceState) -> bool {
        if self.partition(state).slot(type_name, id).is_some() {
            return false;
        }
        self.register(type_name, id, object, state);
        true
    }

    /// Replace the object reachable through `(type_name, id)`, writing through
    /// alias slots to the owning type. Registers a new object when absent.
    pub fn update(&mut self, type_name: &str, id: i64, object: Document, state: ResourceState) {
        if state == ResourceState::Active {
            self.ensure_active(type_name, id);
        }
        match self.partition_mut(state).get_mut(type_name, id) {
            Some(slot) => *slot = object,
            None => self.register(type_name, id, object, state),
        }
    }

    pub fn get(&self, type_name: &str, id: i64, state: ResourceState) -> Option<&Document> {
        match state {
            ResourceState::Base => self.get_base(type_name, id),
            ResourceState::Active => self
                .active
                .get(type_name, id)
                .or_else(|| self.base.get(type_name, id)),
        }
    }

    pub fn get_base(&self, type_name: &str, id: i64) -> Option<&Document> {
        self.base.get(type_name, id)
    }

    /// Active object for `(type_name, id)`, cloned from Base on first access.
    pub fn get_active(&mut self, type_name: &str, id: i64) -> Option<&Document> {
        self.ensure_active(type_name, id)?;
        self.active.get(type_name, id)
    }

    /// Mutable Active object, cloned from Base on first access.
    pub fn get_active_mut(&mut self, type_name: &str, id: i64) -> Option<&mut Document> {
        self.ensure_active(type_name, id)?;
        self.active.get_mut(type_name, id)
    }

    /// Make sure `(type_name, id)` has an Active copy. The copy is registered
    /// under the concrete owner type so its aliases share it.
    fn ensure_active(&mut self, type_name: &str, id: i64) -> Option<()> {
        if self.active.get(type_name, id).is_some() {
            return Some(());
        }

        let owner = self.base.owner(type_name, id)?.to_string();
        let object = self.base.get(&owner, id)?.clone();
        tracing::trace!("Copy-on-write type={} id={}", owner, id);
        self.register(&owner, id, object, ResourceState::Active);
        Some(())
    }

    /// Sorted ids visible under a type. Active lists Base ids as well.
    pub fn ids(&self, type_name: &str, state: ResourceState) -> Vec<i64> {
        let mut ids: Vec<i64> = match state {
            ResourceState::Base => self.base.ids(type_name).collect(),
            ResourceState::Active => self
                .base
                .ids(type_name)
                .chain(self.active.ids(type_name))
                .collect(),
        };
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Objects visible under a type in id order, Active overriding Base.
    pub fn iter<'a>(
        &'a self,
        type_name: &str,
        state: ResourceState,
    ) -> impl Iterator<Item = (i64, &'a Document)> + 'a {
        let ids = self.ids(type_name, state);
        let type_name = type_name.to_string();
        ids.into_iter()
            .filter_map(move |id| self.get(&type_name, id, state).map(|doc| (id, doc)))
    }

    pub fn contains(&self, type_name: &str, id: i64) -> bool {
        self.base.slot(type_name, id).is_some() || self.active.slot(type_name, id).is_some()
    }

    pub fn is_loaded(&self, type_name: &str) -> bool {
        self.loaded.contains(type_name)
    }

    pub fn mark_loaded(&mut self, type_name: &str) {
        self.loaded.insert(type_name.to_string());
    }

    /// Drop every cached object. Alias declarations are kept.
    pub fn clear(&mut self) {
        self.base = Partition::default();
        self.active = Partition::default();
        self.loaded.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> ResourceStore {
        ResourceStore::new().with_aliases("WeaponData", vec!["ItemData".to_string()])
    }

    #[test]
    fn test_alias_propagation() {
        let mut store = store();
        let sword = json!({ "name": "Sword" });

        store.register("WeaponData", 7, sword.clone(), ResourceState::Base);
        assert_eq!(store.get("ItemData", 7, ResourceState::Base), Some(&sword));

        store.register("WeaponData", 8, json!(1), ResourceState::Active);
        assert_eq!(store.get("ItemData", 8, ResourceState::Active), Some(&json!(1)));
        assert_eq!(store.get_base("ItemData", 8), None);
    }

    #[test]
    fn test_registration_is_idempotent_and_last_wins() {
        let mut store = store();
        store.register("ItemData", 1, json!("a"), ResourceState::Base);
        store.register("ItemData", 1, json!("a"), ResourceState::Base);
        assert_eq!(store.ids("ItemData", ResourceState::Base), vec![1]);

        store.register("ItemData", 1, json!("b"), ResourceState::Base);
        assert_eq!(store.get_base("ItemData", 1), Some(&json!("b")));
    }

    #[test]
    fn test_fallback_does_not_shadow_subtype() {
        let mut store = store();
        store.register("WeaponData", 7, json!("weapon"), ResourceState::Base);

        assert!(!store.register_fallback("ItemData", 7, json!("item"), ResourceState::Base));
        assert!(store.register_fallback("ItemData", 9, json!("item"), ResourceState::Base));
        assert_eq!(store.get_base("ItemData", 7), Some(&json!("weapon")));
    }

    #[test]
    fn test_copy_on_write_isolation() {
        let mut store = store();
        store.register("WeaponData", 7, json!({ "power": 12 }), ResourceState::Base);

        *store.get_active_mut("ItemData", 7).unwrap() = json!({ "power": 15 });

        assert_eq!(store.get_base("WeaponData", 7), Some(&json!({ "power": 12 })));
        assert_eq!(store.get_active("WeaponData", 7), Some(&json!({ "power": 15 })));
        assert_eq!(store.get_active("ItemData", 7), Some(&json!({ "power": 15 })));
    }

    #[test]
    fn test_update_writes_through_alias() {
        let mut store = store();
        store.register("WeaponData", 7, json!(1), ResourceState::Base);
        store.update("ItemData", 7, json!(2), ResourceState::Base);

        assert_eq!(store.get_base("WeaponData", 7), Some(&json!(2)));
    }

    #[test]
    fn test_active_lists_base_ids() {
        let mut store = store();
        store.register("ItemData", 2, json!("b"), ResourceState::Base);
        store.register("ItemData", 1, json!("a"), ResourceState::Active);

        assert_eq!(store.ids("ItemData", ResourceState::Active), vec![1, 2]);
        let items: Vec<_> = store.iter("ItemData", ResourceState::Active).collect();
        assert_eq!(items, vec![(1, &json!("a")), (2, &json!("b"))]);

        store.clear();
        assert!(!store.contains("ItemData", 2));
    }

    #[test]
    fn test_missing_ids() {
        let mut store = store();
        assert!(store.get_active("ItemData", 1).is_none());
        assert!(store.get_active_mut("ItemData", 1).is_none());
    }
}
