//! Observer-side mirror of the authority's replicated state.
//!
//! A [`Replica`] is built from a [`WorldSnapshot`] and then kept current by
//! applying [`Frame`]s in sequence order. Frames already folded into the
//! snapshot (sequence number at or below the snapshot's) are skipped, so a
//! late joiner never replays history.
//!
//! Presentation is re-derived from replicated values only: every structure
//! and fire is presented once on attach, then again after each change.

use std::collections::BTreeMap;

use crate::components::{
    Category, DecorationIndex, FactoryId, HazardId, ItemId, Origin, ParticipantId, StructureId,
};
use crate::error::Result;
use crate::hazard::intensity_ratio;
use crate::interfaces::Presentation;
use crate::item::ItemLifeState;
use crate::math::{Pose, Vec3};
use crate::observer::Subscription;
use crate::placement::Surface;
use crate::replicated::{ReplicatedVar, VarValue};
use crate::session::Request;
use crate::structure::{LifecycleState, PaintStage};
use crate::wire::{
    decode_frame, EntitySnapshot, FactorySnapshot, Field, Frame, HazardSnapshot, ItemSnapshot,
    NetEntity, ReplicationMessage, StructureSnapshot, VarKey, WorldSnapshot,
};

pub use crate::wire::{decode_snapshot, encode_frame, encode_snapshot};

/// Observer view of a structure.
#[derive(Debug)]
pub struct StructureView {
    /// Structure id.
    pub id: StructureId,
    /// World pose.
    pub pose: Pose,
    /// Surface it stands on.
    pub surface: Surface,
    /// Decoration palette.
    pub decoration_index: DecorationIndex,
    state: ReplicatedVar<LifecycleState>,
    paint: ReplicatedVar<PaintStage>,
    bound_factory: ReplicatedVar<Option<FactoryId>>,
}

impl StructureView {
    fn from_snapshot(s: &StructureSnapshot) -> Self {
        Self {
            id: s.id,
            pose: s.pose,
            surface: s.surface,
            decoration_index: s.decoration_index,
            state: ReplicatedVar::observer(s.state),
            paint: ReplicatedVar::observer(s.paint_stage),
            bound_factory: ReplicatedVar::observer(s.bound_factory),
        }
    }

    /// Lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        *self.state.get()
    }

    /// Paint progress.
    #[must_use]
    pub fn paint_stage(&self) -> PaintStage {
        *self.paint.get()
    }

    /// Bound factory.
    #[must_use]
    pub fn bound_factory(&self) -> Option<FactoryId> {
        *self.bound_factory.get()
    }

    /// Listen for lifecycle changes.
    pub fn on_state_change(
        &self,
        listener: impl FnMut(&LifecycleState, &LifecycleState) + 'static,
    ) -> Subscription {
        self.state.on_change(listener)
    }

    /// Listen for paint changes.
    pub fn on_paint_change(
        &self,
        listener: impl FnMut(&PaintStage, &PaintStage) + 'static,
    ) -> Subscription {
        self.paint.on_change(listener)
    }

    fn apply(&mut self, field: Field, value: &VarValue) -> bool {
        match field {
            Field::Lifecycle => self.state.apply_wire(value),
            Field::PaintStage => self.paint.apply_wire(value),
            Field::BoundFactory => self.bound_factory.apply_wire(value),
            _ => false,
        }
    }
}

/// Observer view of a factory.
#[derive(Debug)]
pub struct FactoryView {
    /// Factory id.
    pub id: FactoryId,
    /// Owning structure.
    pub owner: StructureId,
    /// Decoration palette.
    pub decoration_index: DecorationIndex,
    /// Items required.
    pub required_count: u32,
    pose: ReplicatedVar<Pose>,
    requirement_met: ReplicatedVar<bool>,
    consumed_count: ReplicatedVar<u32>,
    squeeze_ratio: ReplicatedVar<f32>,
    raised: ReplicatedVar<bool>,
}

impl FactoryView {
    fn from_snapshot(f: &FactorySnapshot) -> Self {
        Self {
            id: f.id,
            owner: f.owner,
            decoration_index: f.decoration_index,
            required_count: f.required_count,
            pose: ReplicatedVar::observer(f.pose),
            requirement_met: ReplicatedVar::observer(f.requirement_met),
            consumed_count: ReplicatedVar::observer(f.consumed_count),
            squeeze_ratio: ReplicatedVar::observer(f.squeeze_ratio),
            raised: ReplicatedVar::observer(f.raised),
        }
    }

    /// World pose; follows the one-shot raise.
    #[must_use]
    pub fn pose(&self) -> &Pose {
        self.pose.get()
    }

    /// Whether the requirement is met (squeeze controls shown).
    #[must_use]
    pub fn requirement_met(&self) -> bool {
        *self.requirement_met.get()
    }

    /// Matching items consumed so far.
    #[must_use]
    pub fn consumed_count(&self) -> u32 {
        *self.consumed_count.get()
    }

    /// Current squeeze ratio.
    #[must_use]
    pub fn squeeze_ratio(&self) -> f32 {
        *self.squeeze_ratio.get()
    }

    /// Whether the factory has risen.
    #[must_use]
    pub fn is_raised(&self) -> bool {
        *self.raised.get()
    }

    fn apply(&mut self, field: Field, value: &VarValue) -> bool {
        match field {
            Field::RequirementMet => self.requirement_met.apply_wire(value),
            Field::ConsumedCount => self.consumed_count.apply_wire(value),
            Field::SqueezeRatio => self.squeeze_ratio.apply_wire(value),
            Field::Raised => self.raised.apply_wire(value),
            Field::Pose => self.pose.apply_wire(value),
            _ => false,
        }
    }
}

/// Observer view of a fire.
#[derive(Debug)]
pub struct HazardView {
    /// Hazard id.
    pub id: HazardId,
    /// Burning structure.
    pub structure: StructureId,
    /// Intensity at ignition.
    pub max_intensity: f32,
    intensity: ReplicatedVar<f32>,
    spraying: ReplicatedVar<bool>,
}

impl HazardView {
    fn from_snapshot(h: &HazardSnapshot) -> Self {
        Self {
            id: h.id,
            structure: h.structure,
            max_intensity: h.max_intensity,
            intensity: ReplicatedVar::observer(h.intensity),
            spraying: ReplicatedVar::observer(h.spraying),
        }
    }

    /// Current intensity.
    #[must_use]
    pub fn intensity(&self) -> f32 {
        *self.intensity.get()
    }

    /// `intensity / max_intensity`.
    #[must_use]
    pub fn ratio(&self) -> f32 {
        intensity_ratio(self.intensity(), self.max_intensity)
    }

    /// Whether somebody is spraying it.
    #[must_use]
    pub fn is_spraying(&self) -> bool {
        *self.spraying.get()
    }

    fn apply(&mut self, field: Field, value: &VarValue) -> bool {
        match field {
            Field::Intensity => self.intensity.apply_wire(value),
            Field::Spraying => self.spraying.apply_wire(value),
            _ => false,
        }
    }
}

/// Observer view of an item.
#[derive(Debug)]
pub struct ItemView {
    /// Item id.
    pub id: ItemId,
    /// Category.
    pub category: Category,
    /// Position at spawn or landing.
    pub position: Vec3,
    life_state: ReplicatedVar<ItemLifeState>,
}

impl ItemView {
    fn from_snapshot(i: &ItemSnapshot) -> Self {
        Self {
            id: i.id,
            category: i.category,
            position: i.position,
            life_state: ReplicatedVar::observer(i.life_state),
        }
    }

    /// Life state.
    #[must_use]
    pub fn life_state(&self) -> ItemLifeState {
        *self.life_state.get()
    }
}

/// An observer's copy of the world.
pub struct Replica {
    participant: ParticipantId,
    last_seq: u64,
    structures: BTreeMap<StructureId, StructureView>,
    factories: BTreeMap<FactoryId, FactoryView>,
    hazards: BTreeMap<HazardId, HazardView>,
    items: BTreeMap<ItemId, ItemView>,
    presentation: Box<dyn Presentation>,
}

impl std::fmt::Debug for Replica {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replica")
            .field("participant", &self.participant)
            .field("last_seq", &self.last_seq)
            .field("structures", &self.structures.len())
            .field("factories", &self.factories.len())
            .field("hazards", &self.hazards.len())
            .field("items", &self.items.len())
            .finish_non_exhaustive()
    }
}

impl Replica {
    /// Build a replica from a join snapshot and present everything once.
    #[must_use]
    pub fn attach(
        participant: ParticipantId,
        snapshot: &WorldSnapshot,
        presentation: impl Presentation + 'static,
    ) -> Self {
        let mut replica = Self {
            participant,
            last_seq: snapshot.seq,
            structures: BTreeMap::new(),
            factories: BTreeMap::new(),
            hazards: BTreeMap::new(),
            items: BTreeMap::new(),
            presentation: Box::new(presentation),
        };
        for entity in &snapshot.entities {
            replica.spawn(entity);
        }
        tracing::debug!(
            %participant,
            seq = snapshot.seq,
            entities = snapshot.entities.len(),
            "replica attached"
        );
        replica
    }

    /// Participant this replica belongs to.
    #[must_use]
    pub const fn participant(&self) -> ParticipantId {
        self.participant
    }

    /// Sequence number of the last applied frame.
    #[must_use]
    pub const fn last_seq(&self) -> u64 {
        self.last_seq
    }

    /// Structure view.
    #[must_use]
    pub fn structure(&self, id: StructureId) -> Option<&StructureView> {
        self.structures.get(&id)
    }

    /// All structure views.
    pub fn structures(&self) -> impl Iterator<Item = &StructureView> {
        self.structures.values()
    }

    /// Factory view.
    #[must_use]
    pub fn factory(&self, id: FactoryId) -> Option<&FactoryView> {
        self.factories.get(&id)
    }

    /// All factory views.
    pub fn factories(&self) -> impl Iterator<Item = &FactoryView> {
        self.factories.values()
    }

    /// Hazard view.
    #[must_use]
    pub fn hazard(&self, id: HazardId) -> Option<&HazardView> {
        self.hazards.get(&id)
    }

    /// Fire burning on `structure`, if any.
    #[must_use]
    pub fn hazard_on(&self, structure: StructureId) -> Option<&HazardView> {
        self.hazards.values().find(|h| h.structure == structure)
    }

    /// Item view.
    #[must_use]
    pub fn item(&self, id: ItemId) -> Option<&ItemView> {
        self.items.get(&id)
    }

    /// Wrap a request for sending to the authority.
    #[must_use]
    pub fn request(&self, request: Request) -> (Origin, Request) {
        (Origin::Observer(self.participant), request)
    }

    /// Apply an encoded frame.
    pub fn apply_bytes(&mut self, bytes: &[u8]) -> Result<bool> {
        let frame = decode_frame(bytes)?;
        Ok(self.apply(&frame))
    }

    /// Apply a frame. Returns `false` if it was already applied.
    pub fn apply(&mut self, frame: &Frame) -> bool {
        if frame.seq <= self.last_seq {
            tracing::trace!(seq = frame.seq, last = self.last_seq, "skipping stale frame");
            return false;
        }
        if frame.seq != self.last_seq + 1 {
            tracing::warn!(
                expected = self.last_seq + 1,
                got = frame.seq,
                "replication frames skipped"
            );
        }
        self.last_seq = frame.seq;

        match &frame.message {
            ReplicationMessage::Spawn(entity) => self.spawn(entity),
            ReplicationMessage::Set { key, value } => self.set(*key, value),
            ReplicationMessage::Despawn(entity) => self.despawn(*entity),
        }
        true
    }

    fn spawn(&mut self, entity: &EntitySnapshot) {
        match entity {
            EntitySnapshot::Structure(s) => {
                self.structures.insert(s.id, StructureView::from_snapshot(s));
                self.present_structure(s.id);
            }
            EntitySnapshot::Factory(f) => {
                self.presentation.apply_requirement(f.id, f.requirement_met);
                self.factories.insert(f.id, FactoryView::from_snapshot(f));
            }
            EntitySnapshot::Hazard(h) => {
                let view = HazardView::from_snapshot(h);
                self.presentation.apply_hazard_intensity(view.structure, view.ratio());
                self.hazards.insert(h.id, view);
            }
            EntitySnapshot::Item(i) => {
                self.items.insert(i.id, ItemView::from_snapshot(i));
            }
        }
    }

    fn set(&mut self, key: VarKey, value: &VarValue) {
        let changed = match key.entity {
            NetEntity::Structure(id) => {
                let changed = self
                    .structures
                    .get_mut(&id)
                    .is_some_and(|view| view.apply(key.field, value));
                if changed && matches!(key.field, Field::Lifecycle | Field::PaintStage) {
                    self.present_structure(id);
                }
                changed
            }
            NetEntity::Factory(id) => {
                let changed = self
                    .factories
                    .get_mut(&id)
                    .is_some_and(|view| view.apply(key.field, value));
                if changed && key.field == Field::RequirementMet {
                    if let Some(view) = self.factories.get(&id) {
                        self.presentation.apply_requirement(id, view.requirement_met());
                    }
                }
                changed
            }
            NetEntity::Hazard(id) => {
                let changed = self
                    .hazards
                    .get_mut(&id)
                    .is_some_and(|view| view.apply(key.field, value));
                if changed && key.field == Field::Intensity {
                    if let Some(view) = self.hazards.get(&id) {
                        self.presentation
                            .apply_hazard_intensity(view.structure, view.ratio());
                    }
                }
                changed
            }
            NetEntity::Item(id) => self.items.get_mut(&id).is_some_and(|view| {
                key.field == Field::ItemLife && view.life_state.apply_wire(value)
            }),
        };
        if !changed {
            tracing::trace!(?key, "replicated value unchanged or entity unknown");
        }
    }

    fn despawn(&mut self, entity: NetEntity) {
        match entity {
            NetEntity::Structure(id) => {
                self.structures.remove(&id);
            }
            NetEntity::Factory(id) => {
                self.factories.remove(&id);
            }
            NetEntity::Hazard(id) => {
                if let Some(view) = self.hazards.remove(&id) {
                    self.presentation.apply_hazard_intensity(view.structure, 0.0);
                }
            }
            NetEntity::Item(id) => {
                self.items.remove(&id);
            }
        }
    }

    fn present_structure(&mut self, id: StructureId) {
        if let Some(view) = self.structures.get(&id) {
            self.presentation
                .apply_visual(id, view.state(), view.decoration_index, view.paint_stage());
        }
    }
}
