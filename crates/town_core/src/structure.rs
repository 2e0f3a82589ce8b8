//! Structures (houses) and their replicated lifecycle state.
//!
//! A structure only stores state. Transitions are driven by the session
//! (see `lifecycle.rs`), which owns the sub-entities a transition creates or
//! destroys and enforces the notify-before-destroy ordering.

use serde::{Deserialize, Serialize};

use crate::components::{DecorationIndex, FactoryId, HazardId, StructureId};
use crate::factory::Factory;
use crate::hazard::Hazard;
use crate::math::Pose;
use crate::observer::{Observers, Subscription};
use crate::placement::Surface;
use crate::replicated::ReplicatedVar;
use crate::wire::{Field, NetEntity, Outbox, StructureSnapshot, VarKey};

/// Lifecycle of a structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LifecycleState {
    /// Not yet placed.
    #[default]
    Unbuilt,
    /// Placed; waiting for decoration progress.
    Built,
    /// Decoration in progress.
    Coloring,
    /// Fully decorated.
    Colored,
    /// On fire.
    Firing,
    /// Fire put out.
    Saved,
    /// Burned down or torn down.
    Destroyed,
}

impl LifecycleState {
    /// Whether a structure in this state may have a bound factory.
    #[must_use]
    pub const fn can_hold_factory(self) -> bool {
        matches!(self, LifecycleState::Built | LifecycleState::Coloring)
    }

    /// Whether decoration progress is accepted in this state.
    #[must_use]
    pub const fn accepts_decoration(self) -> bool {
        self.can_hold_factory()
    }

    /// Whether the structure is gone.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, LifecycleState::Destroyed)
    }
}

/// Decoration progress. Never decreases and never passes `Full`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum PaintStage {
    /// Unpainted.
    #[default]
    None,
    /// First coat.
    One,
    /// Second coat.
    Two,
    /// Done.
    Full,
}

impl PaintStage {
    /// The following stage, saturating at `Full`.
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            PaintStage::None => PaintStage::One,
            PaintStage::One => PaintStage::Two,
            PaintStage::Two | PaintStage::Full => PaintStage::Full,
        }
    }

    /// Whether painting is complete.
    #[must_use]
    pub const fn is_full(self) -> bool {
        matches!(self, PaintStage::Full)
    }

    /// Progress in `[0, 1]`.
    #[must_use]
    pub const fn fraction(self) -> f32 {
        match self {
            PaintStage::None => 0.0,
            PaintStage::One => 1.0 / 3.0,
            PaintStage::Two => 2.0 / 3.0,
            PaintStage::Full => 1.0,
        }
    }
}

/// Context handed to state-change listeners.
///
/// Delivered after the new state is written but before any sub-entity of
/// the old state is destroyed, so `outgoing_factory` and `hazard` can still
/// be read.
#[derive(Debug, Clone, Copy)]
pub struct StateChange<'a> {
    /// Structure that changed.
    pub structure: StructureId,
    /// Previous state.
    pub old: LifecycleState,
    /// New state.
    pub new: LifecycleState,
    /// Decoration palette.
    pub decoration: DecorationIndex,
    /// Paint progress.
    pub paint: PaintStage,
    /// Binding after the transition.
    pub bound_factory: Option<FactoryId>,
    /// Factory that is about to be destroyed by this transition.
    pub outgoing_factory: Option<&'a Factory>,
    /// Hazard attached at the time of the transition.
    pub hazard: Option<&'a Hazard>,
}

type StateListener = dyn FnMut(&StateChange<'_>);

/// A placed structure.
#[derive(Debug)]
pub struct Structure {
    id: StructureId,
    pose: Pose,
    surface: Surface,
    decoration_index: DecorationIndex,
    state: ReplicatedVar<LifecycleState>,
    paint: ReplicatedVar<PaintStage>,
    bound_factory: ReplicatedVar<Option<FactoryId>>,
    hazard: Option<HazardId>,
    state_listeners: Observers<StateListener>,
    retry_in: f32,
}

impl Structure {
    /// Create an unbuilt structure at `pose`.
    #[must_use]
    pub fn new(id: StructureId, pose: Pose, decoration_index: DecorationIndex, outbox: &Outbox) -> Self {
        let entity = NetEntity::Structure(id);
        Self {
            id,
            pose,
            surface: Surface::classify(pose.up),
            decoration_index,
            state: ReplicatedVar::authority(
                LifecycleState::Unbuilt,
                VarKey::new(entity, Field::Lifecycle),
                outbox,
            ),
            paint: ReplicatedVar::authority(
                PaintStage::None,
                VarKey::new(entity, Field::PaintStage),
                outbox,
            ),
            bound_factory: ReplicatedVar::authority(
                None,
                VarKey::new(entity, Field::BoundFactory),
                outbox,
            ),
            hazard: None,
            state_listeners: Observers::new(),
            retry_in: 0.0,
        }
    }

    /// Structure id.
    #[must_use]
    pub const fn id(&self) -> StructureId {
        self.id
    }

    /// World pose.
    #[must_use]
    pub const fn pose(&self) -> &Pose {
        &self.pose
    }

    /// Surface the structure stands on.
    #[must_use]
    pub const fn surface(&self) -> Surface {
        self.surface
    }

    /// Decoration palette (fixed at creation).
    #[must_use]
    pub const fn decoration_index(&self) -> DecorationIndex {
        self.decoration_index
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        *self.state.get()
    }

    /// Current paint stage.
    #[must_use]
    pub fn paint_stage(&self) -> PaintStage {
        *self.paint.get()
    }

    /// Bound factory, if any.
    #[must_use]
    pub fn bound_factory(&self) -> Option<FactoryId> {
        *self.bound_factory.get()
    }

    /// Attached hazard, if any.
    #[must_use]
    pub const fn hazard(&self) -> Option<HazardId> {
        self.hazard
    }

    /// Listen for lifecycle transitions with full context.
    pub fn on_state_change(&self, listener: impl FnMut(&StateChange<'_>) + 'static) -> Subscription {
        self.state_listeners.subscribe(Box::new(listener))
    }

    /// Listen for raw lifecycle value changes.
    pub fn on_state_value_change(
        &self,
        listener: impl FnMut(&LifecycleState, &LifecycleState) + 'static,
    ) -> Subscription {
        self.state.on_change(listener)
    }

    /// Listen for paint stage changes.
    pub fn on_paint_change(
        &self,
        listener: impl FnMut(&PaintStage, &PaintStage) + 'static,
    ) -> Subscription {
        self.paint.on_change(listener)
    }

    /// Replicated view.
    #[must_use]
    pub fn snapshot(&self) -> StructureSnapshot {
        StructureSnapshot {
            id: self.id,
            pose: self.pose,
            surface: self.surface,
            decoration_index: self.decoration_index,
            state: self.state(),
            paint_stage: self.paint_stage(),
            bound_factory: self.bound_factory(),
        }
    }

    pub(crate) fn set_state(&mut self, state: LifecycleState) -> bool {
        self.state.set(state)
    }

    pub(crate) fn set_paint(&mut self, paint: PaintStage) -> bool {
        if paint < self.paint_stage() {
            tracing::debug!(structure = %self.id, ?paint, "refusing to lower paint stage");
            return false;
        }
        self.paint.set(paint)
    }

    pub(crate) fn set_bound_factory(&mut self, factory: Option<FactoryId>) -> bool {
        self.bound_factory.set(factory)
    }

    pub(crate) fn set_hazard(&mut self, hazard: Option<HazardId>) {
        self.hazard = hazard;
    }

    pub(crate) fn notify_state_change(&self, change: &StateChange<'_>) {
        self.state_listeners.notify(|listener| listener(change));
    }

    /// Count down the placement retry timer; `true` when an attempt is due.
    pub(crate) fn placement_due(&mut self, dt: f32) -> bool {
        self.retry_in -= dt;
        self.retry_in <= 0.0
    }

    pub(crate) fn schedule_placement_retry(&mut self, interval: f32) {
        self.retry_in = interval;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec3;

    #[test]
    fn test_paint_stage_saturates() {
        assert_eq!(PaintStage::None.next(), PaintStage::One);
        assert_eq!(PaintStage::Two.next(), PaintStage::Full);
        assert_eq!(PaintStage::Full.next(), PaintStage::Full);
        assert!(PaintStage::None < PaintStage::Full);
    }

    #[test]
    fn test_factory_states() {
        use LifecycleState::*;
        for state in [Unbuilt, Built, Coloring, Colored, Firing, Saved, Destroyed] {
            assert_eq!(state.can_hold_factory(), matches!(state, Built | Coloring));
        }
    }

    #[test]
    fn test_new_structure_is_unbuilt() {
        let s = Structure::new(StructureId(1), Pose::at(Vec3::ZERO), DecorationIndex(2), &Outbox::new());
        assert_eq!(s.state(), LifecycleState::Unbuilt);
        assert_eq!(s.paint_stage(), PaintStage::None);
        assert_eq!(s.bound_factory(), None);
        assert_eq!(s.surface(), Surface::Floor);
    }

    #[test]
    fn test_paint_never_decreases() {
        let mut s = Structure::new(StructureId(1), Pose::default(), DecorationIndex(0), &Outbox::new());
        assert!(s.set_paint(PaintStage::Two));
        assert!(!s.set_paint(PaintStage::One));
        assert_eq!(s.paint_stage(), PaintStage::Two);
    }
}
