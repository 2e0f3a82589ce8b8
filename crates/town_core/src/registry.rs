//! Entity storage owned by a session.
//!
//! Cross-entity references (structure to factory, factory to structure,
//! structure to hazard) are ids resolved here, never owning pointers, so a
//! destroyed entity simply stops resolving. Iteration is in id order.

use std::collections::BTreeMap;

use crate::components::{FactoryId, HazardId, ItemId, StructureId};
use crate::factory::Factory;
use crate::hazard::Hazard;
use crate::item::CollectibleItem;
use crate::structure::Structure;

/// Live entities of one session plus id allocation.
#[derive(Debug, Default)]
pub struct Registry {
    structures: BTreeMap<StructureId, Structure>,
    factories: BTreeMap<FactoryId, Factory>,
    hazards: BTreeMap<HazardId, Hazard>,
    items: BTreeMap<ItemId, CollectibleItem>,
    next_structure: u32,
    next_factory: u32,
    next_hazard: u32,
    next_item: u64,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next structure id.
    pub fn next_structure_id(&mut self) -> StructureId {
        self.next_structure += 1;
        StructureId(self.next_structure)
    }

    /// Reserve the next factory id.
    pub fn next_factory_id(&mut self) -> FactoryId {
        self.next_factory += 1;
        FactoryId(self.next_factory)
    }

    /// Reserve the next hazard id.
    pub fn next_hazard_id(&mut self) -> HazardId {
        self.next_hazard += 1;
        HazardId(self.next_hazard)
    }

    /// Reserve the next item id.
    pub fn next_item_id(&mut self) -> ItemId {
        self.next_item += 1;
        ItemId(self.next_item)
    }

    // ------------------------------------------------------------------------
    // Structures
    // ------------------------------------------------------------------------

    /// Store a structure.
    pub fn insert_structure(&mut self, structure: Structure) {
        self.structures.insert(structure.id(), structure);
    }

    /// Remove a structure.
    pub fn remove_structure(&mut self, id: StructureId) -> Option<Structure> {
        self.structures.remove(&id)
    }

    /// Look up a structure.
    #[must_use]
    pub fn structure(&self, id: StructureId) -> Option<&Structure> {
        self.structures.get(&id)
    }

    /// Look up a structure mutably.
    pub fn structure_mut(&mut self, id: StructureId) -> Option<&mut Structure> {
        self.structures.get_mut(&id)
    }

    /// All structures in id order.
    pub fn structures(&self) -> impl Iterator<Item = &Structure> {
        self.structures.values()
    }

    /// Ids of all structures.
    #[must_use]
    pub fn structure_ids(&self) -> Vec<StructureId> {
        self.structures.keys().copied().collect()
    }

    // ------------------------------------------------------------------------
    // Factories
    // ------------------------------------------------------------------------

    /// Store a factory.
    pub fn insert_factory(&mut self, factory: Factory) {
        self.factories.insert(factory.id(), factory);
    }

    /// Remove a factory.
    pub fn remove_factory(&mut self, id: FactoryId) -> Option<Factory> {
        self.factories.remove(&id)
    }

    /// Look up a factory.
    #[must_use]
    pub fn factory(&self, id: FactoryId) -> Option<&Factory> {
        self.factories.get(&id)
    }

    /// Look up a factory mutably.
    pub fn factory_mut(&mut self, id: FactoryId) -> Option<&mut Factory> {
        self.factories.get_mut(&id)
    }

    /// All factories in id order.
    pub fn factories(&self) -> impl Iterator<Item = &Factory> {
        self.factories.values()
    }

    /// Ids of all factories.
    #[must_use]
    pub fn factory_ids(&self) -> Vec<FactoryId> {
        self.factories.keys().copied().collect()
    }

    // ------------------------------------------------------------------------
    // Hazards
    // ------------------------------------------------------------------------

    /// Store a hazard.
    pub fn insert_hazard(&mut self, hazard: Hazard) {
        self.hazards.insert(hazard.id(), hazard);
    }

    /// Remove a hazard.
    pub fn remove_hazard(&mut self, id: HazardId) -> Option<Hazard> {
        self.hazards.remove(&id)
    }

    /// Look up a hazard.
    #[must_use]
    pub fn hazard(&self, id: HazardId) -> Option<&Hazard> {
        self.hazards.get(&id)
    }

    /// Look up a hazard mutably.
    pub fn hazard_mut(&mut self, id: HazardId) -> Option<&mut Hazard> {
        self.hazards.get_mut(&id)
    }

    /// All hazards in id order.
    pub fn hazards(&self) -> impl Iterator<Item = &Hazard> {
        self.hazards.values()
    }

    /// Ids of all hazards.
    #[must_use]
    pub fn hazard_ids(&self) -> Vec<HazardId> {
        self.hazards.keys().copied().collect()
    }

    // ------------------------------------------------------------------------
    // Items
    // ------------------------------------------------------------------------

    /// Store an item.
    pub fn insert_item(&mut self, item: CollectibleItem) {
        self.items.insert(item.id(), item);
    }

    /// Remove an item.
    pub fn remove_item(&mut self, id: ItemId) -> Option<CollectibleItem> {
        self.items.remove(&id)
    }

    /// Look up an item.
    #[must_use]
    pub fn item(&self, id: ItemId) -> Option<&CollectibleItem> {
        self.items.get(&id)
    }

    /// Look up an item mutably.
    pub fn item_mut(&mut self, id: ItemId) -> Option<&mut CollectibleItem> {
        self.items.get_mut(&id)
    }

    /// All items in id order.
    pub fn items(&self) -> impl Iterator<Item = &CollectibleItem> {
        self.items.values()
    }

    /// Ids of all items.
    #[must_use]
    pub fn item_ids(&self) -> Vec<ItemId> {
        self.items.keys().copied().collect()
    }

    /// Whether any factory holds `item` in its zone.
    #[must_use]
    pub fn is_item_held(&self, item: ItemId) -> bool {
        self.factories.values().any(|factory| factory.holds(item))
    }

    /// Total live entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.structures.len() + self.factories.len() + self.hazards.len() + self.items.len()
    }

    /// Whether nothing is alive.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entity. Ids keep counting.
    pub fn clear(&mut self) {
        self.structures.clear();
        self.factories.clear();
        self.hazards.clear();
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::DecorationIndex;
    use crate::math::Pose;
    use crate::wire::Outbox;

    #[test]
    fn test_ids_are_unique_and_increasing() {
        let mut registry = Registry::new();
        assert_eq!(registry.next_structure_id(), StructureId(1));
        assert_eq!(registry.next_structure_id(), StructureId(2));
        assert_eq!(registry.next_item_id(), ItemId(1));
    }

    #[test]
    fn test_removed_structure_stops_resolving() {
        let mut registry = Registry::new();
        let id = registry.next_structure_id();
        registry.insert_structure(Structure::new(id, Pose::default(), DecorationIndex(0), &Outbox::new()));
        assert!(registry.structure(id).is_some());
        assert_eq!(registry.len(), 1);

        registry.remove_structure(id);
        assert!(registry.structure(id).is_none());
        assert!(registry.is_empty());
    }
}
