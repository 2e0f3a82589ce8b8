//! Test fixtures and helpers.
//!
//! Recording collaborators that share their log with the test through an
//! `Rc`, plus helpers that drive a [`Session`] through common setups.

use std::cell::RefCell;
use std::rc::Rc;

use town_core::components::{Category, DecorationIndex, FactoryId, ItemId, StructureId};
use town_core::config::TownConfig;
use town_core::interfaces::{EffectKind, EffectSpawner, PlacementResolver, Presentation};
use town_core::math::{Pose, Vec3};
use town_core::session::{Request, Session, TickEvents};
use town_core::squeeze::SqueezeSample;
use town_core::structure::{LifecycleState, PaintStage, Structure};

/// Default tick length used by the helpers (30 Hz).
pub const DT: f32 = 1.0 / 30.0;

// ============================================================================
// Presentation
// ============================================================================

/// One call made on a [`RecordingPresentation`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PresentationCall {
    /// `apply_visual`.
    Visual {
        /// Structure.
        structure: StructureId,
        /// Lifecycle state shown.
        state: LifecycleState,
        /// Decoration palette.
        decoration: DecorationIndex,
        /// Paint shown.
        paint: PaintStage,
    },
    /// `apply_hazard_intensity`.
    Hazard {
        /// Structure.
        structure: StructureId,
        /// Intensity ratio.
        ratio: f32,
    },
    /// `apply_requirement`.
    Requirement {
        /// Factory.
        factory: FactoryId,
        /// Whether the requirement is met.
        met: bool,
    },
    /// `apply_item_scale`.
    ItemScale {
        /// Item.
        item: ItemId,
        /// Scale applied.
        scale: Vec3,
    },
}

/// Shared handle to the calls recorded by a [`RecordingPresentation`].
#[derive(Debug, Clone, Default)]
pub struct PresentationLog(Rc<RefCell<Vec<PresentationCall>>>);

impl PresentationLog {
    /// Every call so far.
    #[must_use]
    pub fn calls(&self) -> Vec<PresentationCall> {
        self.0.borrow().clone()
    }

    /// `(state, paint)` of every visual applied to `structure`, in order.
    #[must_use]
    pub fn visuals(&self, structure: StructureId) -> Vec<(LifecycleState, PaintStage)> {
        self.0
            .borrow()
            .iter()
            .filter_map(|call| match *call {
                PresentationCall::Visual {
                    structure: s,
                    state,
                    paint,
                    ..
                } if s == structure => Some((state, paint)),
                _ => None,
            })
            .collect()
    }

    /// Most recent visual applied to `structure`.
    #[must_use]
    pub fn last_visual(&self, structure: StructureId) -> Option<(LifecycleState, PaintStage)> {
        self.visuals(structure).last().copied()
    }

    /// Every fire ratio shown on `structure`, in order.
    #[must_use]
    pub fn hazard_ratios(&self, structure: StructureId) -> Vec<f32> {
        self.0
            .borrow()
            .iter()
            .filter_map(|call| match *call {
                PresentationCall::Hazard {
                    structure: s,
                    ratio,
                } if s == structure => Some(ratio),
                _ => None,
            })
            .collect()
    }

    /// Most recent requirement flag shown for `factory`.
    #[must_use]
    pub fn last_requirement(&self, factory: FactoryId) -> Option<bool> {
        self.0.borrow().iter().rev().find_map(|call| match *call {
            PresentationCall::Requirement { factory: f, met } if f == factory => Some(met),
            _ => None,
        })
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }

    fn push(&self, call: PresentationCall) {
        self.0.borrow_mut().push(call);
    }
}

/// Presentation that records every call.
#[derive(Debug, Clone, Default)]
pub struct RecordingPresentation {
    log: PresentationLog,
}

impl RecordingPresentation {
    /// Create a recorder and a handle to its log.
    #[must_use]
    pub fn new() -> (Self, PresentationLog) {
        let recorder = Self::default();
        let log = recorder.log.clone();
        (recorder, log)
    }
}

impl Presentation for RecordingPresentation {
    fn apply_visual(
        &mut self,
        structure: StructureId,
        state: LifecycleState,
        decoration: DecorationIndex,
        paint: PaintStage,
    ) {
        self.log.push(PresentationCall::Visual {
            structure,
            state,
            decoration,
            paint,
        });
    }

    fn apply_hazard_intensity(&mut self, structure: StructureId, ratio: f32) {
        self.log.push(PresentationCall::Hazard { structure, ratio });
    }

    fn apply_requirement(&mut self, factory: FactoryId, met: bool) {
        self.log.push(PresentationCall::Requirement { factory, met });
    }

    fn apply_item_scale(&mut self, item: ItemId, scale: Vec3) {
        self.log.push(PresentationCall::ItemScale { item, scale });
    }
}

// ============================================================================
// Effects
// ============================================================================

/// Shared handle to effects recorded by a [`RecordingEffects`].
#[derive(Debug, Clone, Default)]
pub struct EffectLog(Rc<RefCell<Vec<(EffectKind, Vec3)>>>);

impl EffectLog {
    /// Every effect so far.
    #[must_use]
    pub fn effects(&self) -> Vec<(EffectKind, Vec3)> {
        self.0.borrow().clone()
    }

    /// How many effects of `kind` were spawned.
    #[must_use]
    pub fn count(&self, kind: EffectKind) -> usize {
        self.0.borrow().iter().filter(|(k, _)| *k == kind).count()
    }
}

/// Effect spawner that records every effect.
#[derive(Debug, Clone, Default)]
pub struct RecordingEffects {
    log: EffectLog,
}

impl RecordingEffects {
    /// Create a recorder and a handle to its log.
    #[must_use]
    pub fn new() -> (Self, EffectLog) {
        let recorder = Self::default();
        let log = recorder.log.clone();
        (recorder, log)
    }
}

impl EffectSpawner for RecordingEffects {
    fn spawn_effect(&mut self, kind: EffectKind, position: Vec3) {
        self.log.0.borrow_mut().push((kind, position));
    }
}

// ============================================================================
// Placement
// ============================================================================

/// Places every factory at the structure's position plus `offset`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedPlacement {
    /// Offset from the structure position.
    pub offset: Vec3,
}

impl PlacementResolver for FixedPlacement {
    fn try_resolve_pose(&mut self, structure: &Structure) -> Option<Pose> {
        let mut pose = *structure.pose();
        pose.position = pose.position + self.offset;
        Some(pose)
    }
}

/// Fails a number of times, then places like [`FixedPlacement`].
#[derive(Debug, Clone, Default)]
pub struct FailingPlacement {
    failures_left: Option<u32>,
    attempts: Rc<RefCell<u32>>,
}

impl FailingPlacement {
    /// Never find a pose.
    #[must_use]
    pub fn always() -> Self {
        Self {
            failures_left: None,
            attempts: Rc::default(),
        }
    }

    /// Fail `n` times, then succeed.
    #[must_use]
    pub fn times(n: u32) -> Self {
        Self {
            failures_left: Some(n),
            attempts: Rc::default(),
        }
    }

    /// Shared counter of resolve attempts.
    #[must_use]
    pub fn attempts(&self) -> Rc<RefCell<u32>> {
        Rc::clone(&self.attempts)
    }
}

impl PlacementResolver for FailingPlacement {
    fn try_resolve_pose(&mut self, structure: &Structure) -> Option<Pose> {
        *self.attempts.borrow_mut() += 1;
        match &mut self.failures_left {
            None => None,
            Some(0) => Some(*structure.pose()),
            Some(n) => {
                *n -= 1;
                None
            }
        }
    }
}

// ============================================================================
// Session helpers
// ============================================================================

/// A session wired to recording collaborators.
#[derive(Debug)]
pub struct TestTown {
    /// The session.
    pub session: Session,
    /// Presentation calls.
    pub presentation: PresentationLog,
    /// Effects.
    pub effects: EffectLog,
}

impl TestTown {
    /// Session with default config, recorders and [`FixedPlacement`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(TownConfig::default())
    }

    /// Session with `config`, recorders and [`FixedPlacement`].
    #[must_use]
    pub fn with_config(config: TownConfig) -> Self {
        let (presentation, presentation_log) = RecordingPresentation::new();
        let (effects, effect_log) = RecordingEffects::new();
        let session = Session::new(config)
            .with_placement(FixedPlacement::default())
            .with_presentation(presentation)
            .with_effects(effects);
        Self {
            session,
            presentation: presentation_log,
            effects: effect_log,
        }
    }

    /// Add a structure, place it and return it with its new factory.
    ///
    /// # Panics
    ///
    /// Panics if no factory was spawned.
    pub fn built_house(&mut self, decoration: DecorationIndex) -> (StructureId, FactoryId) {
        let structure = self.session.add_structure(Pose::default(), decoration);
        self.session.submit(Request::Place { structure });
        let events = self.session.tick(DT);
        let factory = events.factories_spawned[0];
        (structure, factory)
    }

    /// Spawn `n` items of `category` and move them into `factory`'s zone.
    pub fn fill(&mut self, factory: FactoryId, category: Category, n: usize) -> Vec<ItemId> {
        let items: Vec<ItemId> = (0..n)
            .map(|_| self.session.spawn_item(category, Vec3::ZERO, None))
            .collect();
        for &item in &items {
            self.session.submit(Request::ItemEntered { factory, item });
        }
        self.session.tick(DT);
        items
    }

    /// One full press on `factory`: open grips, then squeeze to half.
    pub fn press(&mut self, factory: FactoryId) -> TickEvents {
        self.session.submit(Request::SqueezeSample {
            factory,
            sample: grips(1.0),
        });
        self.session.submit(Request::SqueezeSample {
            factory,
            sample: grips(0.5),
        });
        self.session.tick(DT)
    }

    /// Run `ticks` ticks of `dt`, collecting their events.
    pub fn run(&mut self, ticks: usize, dt: f32) -> Vec<TickEvents> {
        (0..ticks).map(|_| self.session.tick(dt)).collect()
    }

    /// Current state of `structure`, if it still exists.
    #[must_use]
    pub fn state(&self, structure: StructureId) -> Option<LifecycleState> {
        self.session.registry().structure(structure).map(Structure::state)
    }
}

impl Default for TestTown {
    fn default() -> Self {
        Self::new()
    }
}

/// Grips `separation` apart along Z.
#[must_use]
pub fn grips(separation: f32) -> SqueezeSample {
    SqueezeSample {
        grip_a: Vec3::new(0.0, 0.0, separation),
        grip_b: Vec3::ZERO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failing_placement_counts_attempts() {
        let mut placement = FailingPlacement::times(1);
        let attempts = placement.attempts();
        let structure = Structure::new(
            StructureId(1),
            Pose::default(),
            DecorationIndex(0),
            &town_core::wire::Outbox::new(),
        );
        assert!(placement.try_resolve_pose(&structure).is_none());
        assert!(placement.try_resolve_pose(&structure).is_some());
        assert_eq!(*attempts.borrow(), 2);
    }

    #[test]
    fn test_recording_presentation_shares_log() {
        let (mut presentation, log) = RecordingPresentation::new();
        presentation.apply_visual(
            StructureId(3),
            LifecycleState::Built,
            DecorationIndex(0),
            PaintStage::None,
        );
        assert_eq!(
            log.last_visual(StructureId(3)),
            Some((LifecycleState::Built, PaintStage::None))
        );
    }
}
