//! Collaborator traits at the edge of the core.
//!
//! The core never renders, plays audio or casts rays. It asks these
//! collaborators to do it:
//!
//! - [`PlacementResolver`] finds a pose for a new factory
//! - [`Presentation`] turns replicated state into visuals
//! - [`EffectSpawner`] plays one-shot effects
//!
//! Presentation runs on every participant (the authority included), driven
//! only by replicated values, so a late joiner renders exactly what everybody
//! else renders.

use crate::components::{DecorationIndex, FactoryId, ItemId, StructureId};
use crate::math::{Pose, Vec3};
use crate::structure::{LifecycleState, PaintStage, Structure};

/// Finds where a structure's factory should stand.
pub trait PlacementResolver {
    /// Compute a factory pose, or `None` if no valid pose exists right now.
    ///
    /// Failure is not an error: the caller retries later.
    fn try_resolve_pose(&mut self, structure: &Structure) -> Option<Pose>;
}

/// Applies replicated state to whatever renders it.
pub trait Presentation {
    /// Show a structure in `state` with the given decoration and paint.
    ///
    /// Must be a pure function of its arguments: it is called on the
    /// authority, on observers after every change, and once on attach.
    fn apply_visual(
        &mut self,
        structure: StructureId,
        state: LifecycleState,
        decoration: DecorationIndex,
        paint: PaintStage,
    );

    /// Show a fire at `ratio` (intensity / max intensity, in `[0, 1]`).
    fn apply_hazard_intensity(&mut self, structure: StructureId, ratio: f32);

    /// Show or hide a factory's squeeze controls.
    fn apply_requirement(&mut self, factory: FactoryId, met: bool) {
        let _ = (factory, met);
    }

    /// Scale an item being squeezed.
    fn apply_item_scale(&mut self, item: ItemId, scale: Vec3) {
        let _ = (item, scale);
    }
}

/// One-shot effect kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum EffectKind {
    /// An item was squeezed out of existence.
    ItemBurst,
    /// A fire was put out.
    Extinguished,
    /// A structure burned down.
    Collapse,
}

/// Fire-and-forget effect playback.
pub trait EffectSpawner {
    /// Play `kind` at `position`.
    fn spawn_effect(&mut self, kind: EffectKind, position: Vec3);
}

/// Presentation that draws nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPresentation;

impl Presentation for NullPresentation {
    fn apply_visual(&mut self, _: StructureId, _: LifecycleState, _: DecorationIndex, _: PaintStage) {}

    fn apply_hazard_intensity(&mut self, _: StructureId, _: f32) {}
}

/// Effect spawner that plays nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEffects;

impl EffectSpawner for NullEffects {
    fn spawn_effect(&mut self, _: EffectKind, _: Vec3) {}
}
