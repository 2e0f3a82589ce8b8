//! Requirement counter: present + consumed items against a threshold.
//!
//! The present set is keyed by [`ItemId`] so an item that is reparented or
//! moved while inside the zone is still the same item. Consumption is a
//! one-way ratchet and always removes the item from the present set first,
//! so an item is never counted twice.

use std::collections::BTreeSet;

use crate::components::{Category, FactoryId, ItemId};
use crate::observer::Subscription;
use crate::replicated::ReplicatedVar;
use crate::wire::{Field, NetEntity, Outbox, VarKey};

/// Derives a replicated "requirement met" flag for one factory.
#[derive(Debug)]
pub struct RequirementCounter {
    target: Category,
    required: u32,
    present: BTreeSet<ItemId>,
    consumed: ReplicatedVar<u32>,
    met: ReplicatedVar<bool>,
}

impl RequirementCounter {
    /// Counter published under `factory`'s keys.
    #[must_use]
    pub fn new(factory: FactoryId, target: Category, required: u32, outbox: &Outbox) -> Self {
        let entity = NetEntity::Factory(factory);
        Self::with_vars(
            target,
            required,
            ReplicatedVar::authority(0, VarKey::new(entity, Field::ConsumedCount), outbox),
            ReplicatedVar::authority(false, VarKey::new(entity, Field::RequirementMet), outbox),
        )
    }

    /// Unpublished counter.
    #[must_use]
    pub fn local(target: Category, required: u32) -> Self {
        Self::with_vars(
            target,
            required,
            ReplicatedVar::local(0),
            ReplicatedVar::local(false),
        )
    }

    fn with_vars(
        target: Category,
        required: u32,
        consumed: ReplicatedVar<u32>,
        met: ReplicatedVar<bool>,
    ) -> Self {
        let mut counter = Self {
            target,
            required,
            present: BTreeSet::new(),
            consumed,
            met,
        };
        counter.recompute();
        counter
    }

    /// Add `id` to the present set. Returns `false` if it was already there.
    pub fn on_item_entered(&mut self, id: ItemId) -> bool {
        let added = self.present.insert(id);
        self.recompute();
        added
    }

    /// Remove `id` from the present set. Returns `false` if it was absent.
    pub fn on_item_exited(&mut self, id: ItemId) -> bool {
        let removed = self.present.remove(&id);
        self.recompute();
        removed
    }

    /// Record that `id` was destroyed by consumption.
    ///
    /// The item leaves the present set whatever its category; only a
    /// matching category is credited. Returns whether it was credited.
    pub fn on_item_consumed(&mut self, id: ItemId, category: Category) -> bool {
        self.present.remove(&id);
        let credited = category == self.target;
        if credited {
            let next = self.consumed.get().saturating_add(1);
            self.consumed.set(next);
        }
        self.recompute();
        credited
    }

    fn recompute(&mut self) {
        let total = self.present_count().saturating_add(*self.consumed.get());
        self.met.set(total >= self.required);
    }

    /// Category that counts toward the requirement.
    #[must_use]
    pub const fn target(&self) -> Category {
        self.target
    }

    /// Whether `id` is in the present set.
    #[must_use]
    pub fn contains(&self, id: ItemId) -> bool {
        self.present.contains(&id)
    }

    /// Items currently in the zone.
    #[must_use]
    pub fn present_count(&self) -> u32 {
        u32::try_from(self.present.len()).unwrap_or(u32::MAX)
    }

    /// Matching items consumed so far.
    #[must_use]
    pub fn consumed_count(&self) -> u32 {
        *self.consumed.get()
    }

    /// Threshold.
    #[must_use]
    pub const fn required_count(&self) -> u32 {
        self.required
    }

    /// Whether present + consumed reaches the threshold.
    #[must_use]
    pub fn is_met(&self) -> bool {
        *self.met.get()
    }

    /// Listen for changes of the met flag.
    pub fn on_met_change(&self, listener: impl FnMut(&bool, &bool) + 'static) -> Subscription {
        self.met.on_change(listener)
    }
}
