//! Production pipeline ("color factory").
//!
//! A factory belongs to exactly one structure and copies its decoration
//! index at creation. Items of any category can sit in its zone (kept in
//! entry order); only items of the matching category count toward the
//! requirement. Once the requirement is met the squeeze gesture is enabled,
//! and every `presses_per_item` presses consume the oldest item in the zone.

use std::collections::VecDeque;

use crate::components::{Category, DecorationIndex, FactoryId, ItemId, StructureId};
use crate::config::{FactoryConfig, SqueezeConfig};
use crate::math::{Pose, Vec3};
use crate::observer::Subscription;
use crate::replicated::ReplicatedVar;
use crate::requirement::RequirementCounter;
use crate::squeeze::{PressTrigger, SqueezeGauge, SqueezeSample};
use crate::structure::Structure;
use crate::wire::{FactorySnapshot, Field, NetEntity, Outbox, VarKey};

/// What one squeeze sample did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SqueezeStep {
    /// Clamped squeeze ratio.
    pub ratio: f32,
    /// Squeeze axis, if the grips are apart.
    pub axis: Option<Vec3>,
    /// Oldest item, if this sample completed enough presses to consume it.
    pub consumed: Option<ItemId>,
}

/// An authority-side production pipeline.
#[derive(Debug)]
pub struct Factory {
    id: FactoryId,
    owner: StructureId,
    decoration_index: DecorationIndex,
    pose: ReplicatedVar<Pose>,
    requirement: RequirementCounter,
    queue: VecDeque<ItemId>,
    gauge: SqueezeGauge,
    trigger: PressTrigger,
    rest_ratio: f32,
    squeeze_ratio: ReplicatedVar<f32>,
    raised: ReplicatedVar<bool>,
    raise_elapsed: Option<f32>,
}

impl Factory {
    /// Create a factory for `owner` at `pose`.
    #[must_use]
    pub fn new(
        id: FactoryId,
        owner: &Structure,
        pose: Pose,
        required_count: u32,
        squeeze: &SqueezeConfig,
        outbox: &Outbox,
    ) -> Self {
        let entity = NetEntity::Factory(id);
        let decoration_index = owner.decoration_index();
        Self {
            id,
            owner: owner.id(),
            decoration_index,
            pose: ReplicatedVar::authority(pose, VarKey::new(entity, Field::Pose), outbox),
            requirement: RequirementCounter::new(
                id,
                decoration_index.category(),
                required_count,
                outbox,
            ),
            queue: VecDeque::new(),
            gauge: SqueezeGauge::new(squeeze),
            trigger: PressTrigger::new(squeeze),
            rest_ratio: squeeze.max_ratio,
            squeeze_ratio: ReplicatedVar::authority(
                squeeze.max_ratio,
                VarKey::new(entity, Field::SqueezeRatio),
                outbox,
            ),
            raised: ReplicatedVar::authority(false, VarKey::new(entity, Field::Raised), outbox),
            raise_elapsed: None,
        }
    }

    /// Factory id.
    #[must_use]
    pub const fn id(&self) -> FactoryId {
        self.id
    }

    /// Owning structure.
    #[must_use]
    pub const fn owner(&self) -> StructureId {
        self.owner
    }

    /// Decoration palette copied from the owner.
    #[must_use]
    pub const fn decoration_index(&self) -> DecorationIndex {
        self.decoration_index
    }

    /// Category this factory consumes.
    #[must_use]
    pub const fn target(&self) -> Category {
        self.decoration_index.category()
    }

    /// World pose.
    #[must_use]
    pub fn pose(&self) -> &Pose {
        self.pose.get()
    }

    /// The requirement counter.
    #[must_use]
    pub const fn requirement(&self) -> &RequirementCounter {
        &self.requirement
    }

    /// Items in the zone, oldest first.
    pub fn queued(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.queue.iter().copied()
    }

    /// Whether `item` is in the zone.
    #[must_use]
    pub fn holds(&self, item: ItemId) -> bool {
        self.queue.contains(&item)
    }

    /// Current squeeze ratio.
    #[must_use]
    pub fn squeeze_ratio(&self) -> f32 {
        *self.squeeze_ratio.get()
    }

    /// Whether the one-shot raise has happened.
    #[must_use]
    pub fn is_raised(&self) -> bool {
        *self.raised.get()
    }

    /// Listen for requirement changes.
    pub fn on_requirement_change(&self, listener: impl FnMut(&bool, &bool) + 'static) -> Subscription {
        self.requirement.on_met_change(listener)
    }

    /// An item entered the zone. Returns `false` if it was already inside.
    pub fn item_entered(&mut self, item: ItemId, category: Category) -> bool {
        if self.holds(item) {
            return false;
        }
        self.queue.push_back(item);
        if category == self.target() {
            self.requirement.on_item_entered(item);
        }
        tracing::trace!(factory = %self.id, %item, "item entered zone");
        true
    }

    /// An item left the zone. Returns `false` if it was not inside.
    pub fn item_exited(&mut self, item: ItemId) -> bool {
        let Some(index) = self.queue.iter().position(|&queued| queued == item) else {
            return false;
        };
        self.queue.remove(index);
        self.requirement.on_item_exited(item);
        if self.queue.is_empty() {
            self.release_squeeze();
        }
        true
    }

    /// An item was destroyed by consumption. Returns whether it was credited.
    pub fn item_consumed(&mut self, item: ItemId, category: Category) -> bool {
        self.queue.retain(|&queued| queued != item);
        let credited = self.requirement.on_item_consumed(item, category);
        if self.queue.is_empty() {
            self.release_squeeze();
        }
        credited
    }

    /// Feed a grip sample.
    ///
    /// Ignored (`None`) while the requirement is unmet or the zone is empty.
    pub fn squeeze(&mut self, sample: &SqueezeSample) -> Option<SqueezeStep> {
        if !self.requirement.is_met() || self.queue.is_empty() {
            return None;
        }

        let reading = self.gauge.measure(sample);
        self.squeeze_ratio.set(reading.ratio);

        let consumed = if self.trigger.update(reading.ratio) {
            self.queue.front().copied()
        } else {
            None
        };

        Some(SqueezeStep {
            ratio: reading.ratio,
            axis: reading.axis,
            consumed,
        })
    }

    /// The grips were let go.
    pub fn release_squeeze(&mut self) {
        self.gauge.release();
        self.trigger.release();
        self.squeeze_ratio.set(self.rest_ratio);
    }

    /// Advance the one-shot raise. Returns `true` on the tick it happens.
    pub fn tick(&mut self, dt: f32, config: &FactoryConfig) -> bool {
        if self.is_raised() {
            return false;
        }
        if !self.requirement.is_met() {
            self.raise_elapsed = None;
            return false;
        }

        let elapsed = self.raise_elapsed.get_or_insert(0.0);
        *elapsed += dt;
        if *elapsed < config.raise_delay {
            return false;
        }

        self.raise_elapsed = None;
        let mut lifted = *self.pose.get();
        lifted.position = lifted.position + Vec3::UP * config.raise_height;
        self.pose.set(lifted);
        self.raised.set(true);
        tracing::debug!(factory = %self.id, "factory raised");
        true
    }

    /// Replicated view.
    #[must_use]
    pub fn snapshot(&self) -> FactorySnapshot {
        FactorySnapshot {
            id: self.id,
            owner: self.owner,
            decoration_index: self.decoration_index,
            pose: *self.pose(),
            requirement_met: self.requirement.is_met(),
            consumed_count: self.requirement.consumed_count(),
            required_count: self.requirement.required_count(),
            squeeze_ratio: self.squeeze_ratio(),
            raised: self.is_raised(),
        }
    }
}
