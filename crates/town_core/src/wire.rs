//! Replication messages, sequenced frames and the authority outbox.
//!
//! The authority never sends whole objects after they exist: it sends a
//! [`ReplicationMessage::Spawn`] once, then one [`ReplicationMessage::Set`]
//! per effective variable write, then a [`ReplicationMessage::Despawn`].
//! Every message gets the next sequence number from the [`Outbox`], which
//! lets a late joiner discard messages already folded into its snapshot.

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::components::{
    Category, DecorationIndex, FactoryId, HazardId, ItemId, StructureId,
};
use crate::error::{Result, TownError};
use crate::item::ItemLifeState;
use crate::math::{Pose, Vec3};
use crate::placement::Surface;
use crate::replicated::VarValue;
use crate::structure::{LifecycleState, PaintStage};

/// A replicated entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NetEntity {
    /// A structure (house).
    Structure(StructureId),
    /// A production pipeline (color factory).
    Factory(FactoryId),
    /// A fire hazard.
    Hazard(HazardId),
    /// A collectible item.
    Item(ItemId),
}

/// Replicated field of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Field {
    /// `Structure::state`.
    Lifecycle,
    /// `Structure::paint_stage`.
    PaintStage,
    /// `Structure::bound_factory`.
    BoundFactory,
    /// `RequirementCounter::is_met`.
    RequirementMet,
    /// `RequirementCounter::consumed_count`.
    ConsumedCount,
    /// `Factory::squeeze_ratio`.
    SqueezeRatio,
    /// `Factory::is_raised`.
    Raised,
    /// `Factory::pose`.
    Pose,
    /// `Hazard::intensity`.
    Intensity,
    /// `Hazard::is_spraying`.
    Spraying,
    /// `CollectibleItem::life_state`.
    ItemLife,
}

/// Address of one replicated variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VarKey {
    /// Owning entity.
    pub entity: NetEntity,
    /// Field within the entity.
    pub field: Field,
}

impl VarKey {
    /// Create a key.
    #[must_use]
    pub const fn new(entity: NetEntity, field: Field) -> Self {
        Self { entity, field }
    }
}

// ============================================================================
// Snapshots
// ============================================================================

/// Replicated view of a structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureSnapshot {
    /// Structure id.
    pub id: StructureId,
    /// World pose.
    pub pose: Pose,
    /// Surface the structure was placed on.
    pub surface: Surface,
    /// Decoration palette.
    pub decoration_index: DecorationIndex,
    /// Lifecycle state.
    pub state: LifecycleState,
    /// Paint progress.
    pub paint_stage: PaintStage,
    /// Bound factory, if any.
    pub bound_factory: Option<FactoryId>,
}

/// Replicated view of a factory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorySnapshot {
    /// Factory id.
    pub id: FactoryId,
    /// Owning structure.
    pub owner: StructureId,
    /// Decoration palette copied from the owner.
    pub decoration_index: DecorationIndex,
    /// World pose.
    pub pose: Pose,
    /// Whether the requirement is met.
    pub requirement_met: bool,
    /// Matching items consumed so far.
    pub consumed_count: u32,
    /// Items required.
    pub required_count: u32,
    /// Current squeeze ratio.
    pub squeeze_ratio: f32,
    /// Whether the one-shot raise has happened.
    pub raised: bool,
}

/// Replicated view of a hazard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HazardSnapshot {
    /// Hazard id.
    pub id: HazardId,
    /// Burning structure.
    pub structure: StructureId,
    /// Current intensity.
    pub intensity: f32,
    /// Intensity at ignition.
    pub max_intensity: f32,
    /// Whether a participant is spraying it.
    pub spraying: bool,
}

/// Replicated view of a collectible item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSnapshot {
    /// Item id.
    pub id: ItemId,
    /// Item category.
    pub category: Category,
    /// Life state.
    pub life_state: ItemLifeState,
    /// Last known position.
    pub position: Vec3,
}

/// Initial state of a replicated entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EntitySnapshot {
    /// Structure.
    Structure(StructureSnapshot),
    /// Factory.
    Factory(FactorySnapshot),
    /// Hazard.
    Hazard(HazardSnapshot),
    /// Item.
    Item(ItemSnapshot),
}

impl EntitySnapshot {
    /// Which entity this snapshot describes.
    #[must_use]
    pub fn entity(&self) -> NetEntity {
        match self {
            EntitySnapshot::Structure(s) => NetEntity::Structure(s.id),
            EntitySnapshot::Factory(f) => NetEntity::Factory(f.id),
            EntitySnapshot::Hazard(h) => NetEntity::Hazard(h.id),
            EntitySnapshot::Item(i) => NetEntity::Item(i.id),
        }
    }
}

/// Everything a late joiner needs to reconstruct current state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    /// Sequence number of the last message folded into this snapshot.
    pub seq: u64,
    /// Authority tick at which the snapshot was taken.
    pub tick: u64,
    /// Live entities, structures first, then factories, hazards and items.
    pub entities: Vec<EntitySnapshot>,
}

// ============================================================================
// Messages and frames
// ============================================================================

/// One replicated change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReplicationMessage {
    /// A new entity exists.
    Spawn(EntitySnapshot),
    /// A replicated variable changed.
    Set {
        /// Which variable.
        key: VarKey,
        /// Its new value.
        value: VarValue,
    },
    /// An entity is gone.
    Despawn(NetEntity),
}

/// A sequenced message as it travels over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Monotonic sequence number, starting at 1.
    pub seq: u64,
    /// The change.
    pub message: ReplicationMessage,
}

/// Encode a frame for transport.
pub fn encode_frame(frame: &Frame) -> Result<Vec<u8>> {
    bincode::serialize(frame).map_err(|e| TownError::Encode(format!("frame {}: {e}", frame.seq)))
}

/// Decode a frame received from the authority.
pub fn decode_frame(bytes: &[u8]) -> Result<Frame> {
    bincode::deserialize(bytes).map_err(|e| TownError::Decode(format!("frame: {e}")))
}

/// Encode a join snapshot.
pub fn encode_snapshot(snapshot: &WorldSnapshot) -> Result<Vec<u8>> {
    bincode::serialize(snapshot)
        .map_err(|e| TownError::Encode(format!("snapshot at seq {}: {e}", snapshot.seq)))
}

/// Decode a join snapshot.
pub fn decode_snapshot(bytes: &[u8]) -> Result<WorldSnapshot> {
    bincode::deserialize(bytes).map_err(|e| TownError::Decode(format!("snapshot: {e}")))
}

#[derive(Debug, Default)]
struct OutboxInner {
    last_seq: u64,
    frames: Vec<Frame>,
}

/// Ordered queue of outgoing frames, shared by every authority variable.
#[derive(Debug, Clone, Default)]
pub struct Outbox {
    inner: Rc<RefCell<OutboxInner>>,
}

impl Outbox {
    /// Create an empty outbox.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message and return its sequence number.
    pub fn push(&self, message: ReplicationMessage) -> u64 {
        let mut inner = self.inner.borrow_mut();
        inner.last_seq += 1;
        let seq = inner.last_seq;
        inner.frames.push(Frame { seq, message });
        seq
    }

    /// Take every pending frame, oldest first.
    pub fn drain(&self) -> Vec<Frame> {
        std::mem::take(&mut self.inner.borrow_mut().frames)
    }

    /// Sequence number of the most recent message (0 if none yet).
    #[must_use]
    pub fn last_seq(&self) -> u64 {
        self.inner.borrow().last_seq
    }

    /// Number of frames not yet drained.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.borrow().frames.len()
    }

    /// Whether no frames are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
