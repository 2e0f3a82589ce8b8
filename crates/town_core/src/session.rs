//! Authoritative session loop.
//!
//! A [`Session`] owns every entity, the replication outbox and the external
//! collaborators. Requests are queued by [`Session::submit`] and applied in
//! arrival order at the start of the next [`Session::tick`]; timers are then
//! advanced. Lifecycle transitions live in `lifecycle.rs`.
//!
//! # Example
//!
//! ```
//! use town_core::prelude::*;
//!
//! let mut session = Session::new(TownConfig::default());
//! let house = session.add_structure(Pose::default(), DecorationIndex(0));
//! session.submit(Request::Place { structure: house });
//!
//! let events = session.tick(1.0 / 30.0);
//! assert_eq!(events.factories_spawned.len(), 1);
//! assert_eq!(session.registry().structure(house).unwrap().state(), LifecycleState::Built);
//! ```

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::components::{Category, DecorationIndex, FactoryId, ItemId, Origin, StructureId};
use crate::config::TownConfig;
use crate::error::{Result, TownError};
use crate::hazard::HazardOutcome;
use crate::interfaces::{
    EffectKind, EffectSpawner, NullEffects, NullPresentation, PlacementResolver, Presentation,
};
use crate::item::{CollectibleItem, ItemTick};
use crate::math::{Pose, Vec3};
use crate::placement::{GroundPlane, SurfacePlacement};
use crate::registry::Registry;
use crate::squeeze::{target_scale, SqueezeSample};
use crate::structure::{LifecycleState, Structure};
use crate::wire::{EntitySnapshot, Frame, NetEntity, Outbox, ReplicationMessage, WorldSnapshot};

/// Something a participant asks the authority to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    /// Build an unbuilt structure.
    Place {
        /// Target structure.
        structure: StructureId,
    },
    /// Set a structure on fire.
    Ignite {
        /// Target structure.
        structure: StructureId,
    },
    /// Remove a fixed amount of fire intensity.
    Mitigate {
        /// Burning structure.
        structure: StructureId,
        /// Intensity to remove.
        amount: f32,
    },
    /// Start or stop spraying a fire.
    SetSpraying {
        /// Burning structure.
        structure: StructureId,
        /// Whether spraying is on.
        spraying: bool,
    },
    /// Tear a structure down immediately.
    ForceDestroy {
        /// Target structure.
        structure: StructureId,
    },
    /// Grip positions of an ongoing squeeze.
    SqueezeSample {
        /// Factory being squeezed.
        factory: FactoryId,
        /// Grip positions.
        sample: SqueezeSample,
    },
    /// The grips were let go.
    SqueezeReleased {
        /// Factory that was squeezed.
        factory: FactoryId,
    },
    /// Drop a hanging item now.
    ReleaseItem {
        /// Target item.
        item: ItemId,
    },
    /// A falling item came to rest.
    LandItem {
        /// Target item.
        item: ItemId,
        /// Resting position.
        position: Vec3,
    },
    /// An item entered a factory's capture zone.
    ItemEntered {
        /// Factory whose zone was entered.
        factory: FactoryId,
        /// The item.
        item: ItemId,
    },
    /// An item left a factory's capture zone.
    ItemExited {
        /// Factory whose zone was left.
        factory: FactoryId,
        /// The item.
        item: ItemId,
    },
}

impl Request {
    /// Whether an observer may send this request.
    ///
    /// Zone events and item physics come from the authority's own detectors
    /// and are never accepted from the outside.
    #[must_use]
    pub const fn allowed_from_observer(&self) -> bool {
        matches!(
            self,
            Request::Ignite { .. }
                | Request::Mitigate { .. }
                | Request::SetSpraying { .. }
                | Request::SqueezeSample { .. }
                | Request::SqueezeReleased { .. }
        )
    }
}

/// A lifecycle transition that happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    /// Structure that changed.
    pub structure: StructureId,
    /// Previous state.
    pub from: LifecycleState,
    /// New state.
    pub to: LifecycleState,
}

/// Everything that happened since the previous tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickEvents {
    /// Lifecycle transitions in the order they happened.
    pub transitions: Vec<Transition>,
    /// Factories created.
    pub factories_spawned: Vec<FactoryId>,
    /// Factories destroyed.
    pub factories_despawned: Vec<FactoryId>,
    /// Structures whose factory could not be placed.
    pub placement_failures: Vec<StructureId>,
    /// Items consumed by factories.
    pub items_consumed: Vec<ItemId>,
    /// Items despawned after lying around too long.
    pub items_expired: Vec<ItemId>,
    /// Requests dropped because they were not valid.
    pub rejected_requests: u32,
}

impl TickEvents {
    /// Whether nothing happened.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// The authoritative simulation of one town.
pub struct Session {
    pub(crate) config: TownConfig,
    pub(crate) registry: Registry,
    pub(crate) outbox: Outbox,
    pub(crate) pending: VecDeque<(Origin, Request)>,
    pub(crate) events: TickEvents,
    pub(crate) presentation: Box<dyn Presentation>,
    pub(crate) effects: Box<dyn EffectSpawner>,
    pub(crate) placement: Box<dyn PlacementResolver>,
    tick: u64,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("tick", &self.tick)
            .field("entities", &self.registry.len())
            .field("pending", &self.pending.len())
            .field("outbox", &self.outbox.len())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Create a session with no-op presentation and effects, placing
    /// factories against a ground plane at height zero.
    #[must_use]
    pub fn new(config: TownConfig) -> Self {
        let placement = SurfacePlacement::new(GroundPlane { height: 0.0 }, config.placement.clone());
        Self {
            config,
            registry: Registry::new(),
            outbox: Outbox::new(),
            pending: VecDeque::new(),
            events: TickEvents::default(),
            presentation: Box::new(NullPresentation),
            effects: Box::new(NullEffects),
            placement: Box::new(placement),
            tick: 0,
        }
    }

    /// Replace the placement resolver.
    #[must_use]
    pub fn with_placement(mut self, placement: impl PlacementResolver + 'static) -> Self {
        self.placement = Box::new(placement);
        self
    }

    /// Replace the presentation.
    #[must_use]
    pub fn with_presentation(mut self, presentation: impl Presentation + 'static) -> Self {
        self.presentation = Box::new(presentation);
        self
    }

    /// Replace the effect spawner.
    #[must_use]
    pub fn with_effects(mut self, effects: impl EffectSpawner + 'static) -> Self {
        self.effects = Box::new(effects);
        self
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &TownConfig {
        &self.config
    }

    /// Live entities.
    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Number of completed ticks.
    #[must_use]
    pub const fn current_tick(&self) -> u64 {
        self.tick
    }

    // ========================================================================
    // Authority-side spawning
    // ========================================================================

    /// Add an unbuilt structure.
    pub fn add_structure(&mut self, pose: Pose, decoration: DecorationIndex) -> StructureId {
        let id = self.registry.next_structure_id();
        let structure = Structure::new(id, pose, decoration, &self.outbox);
        self.outbox
            .push(ReplicationMessage::Spawn(EntitySnapshot::Structure(structure.snapshot())));
        self.presentation
            .apply_visual(id, structure.state(), decoration, structure.paint_stage());
        self.registry.insert_structure(structure);
        tracing::debug!(structure = %id, ?decoration, "structure added");
        id
    }

    /// Spawn a hanging item. `fall_delay` defaults to the configured delay.
    pub fn spawn_item(&mut self, category: Category, position: Vec3, fall_delay: Option<f32>) -> ItemId {
        let id = self.registry.next_item_id();
        let delay = fall_delay.unwrap_or(self.config.item.fall_delay);
        let item = CollectibleItem::new(id, category, position, delay, &self.outbox);
        self.outbox
            .push(ReplicationMessage::Spawn(EntitySnapshot::Item(item.snapshot())));
        self.registry.insert_item(item);
        tracing::trace!(item = %id, ?category, "item spawned");
        id
    }

    // ========================================================================
    // Requests
    // ========================================================================

    /// Queue a request raised by the authority itself.
    pub fn submit(&mut self, request: Request) {
        self.submit_from(Origin::Authority, request);
    }

    /// Queue a request from `origin`; it is validated when applied.
    pub fn submit_from(&mut self, origin: Origin, request: Request) {
        self.pending.push_back((origin, request));
    }

    /// Number of queued requests.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    fn apply_pending(&mut self) {
        while let Some((origin, request)) = self.pending.pop_front() {
            if let Origin::Observer(participant) = origin {
                if !request.allowed_from_observer() {
                    tracing::debug!(%participant, ?request, "rejecting request from observer");
                    self.events.rejected_requests += 1;
                    continue;
                }
            }
            if !self.apply_request(&request) {
                self.events.rejected_requests += 1;
            }
        }
    }

    /// Apply one request. Returns `false` if it was ignored.
    fn apply_request(&mut self, request: &Request) -> bool {
        match *request {
            Request::Place { structure } => self.place(structure),
            Request::Ignite { structure } => self.ignite(structure),
            Request::Mitigate { structure, amount } => self.mitigate(structure, amount),
            Request::SetSpraying {
                structure,
                spraying,
            } => self.set_spraying(structure, spraying),
            Request::ForceDestroy { structure } => self.force_destroy(structure),
            Request::SqueezeSample { factory, sample } => self.squeeze(factory, &sample),
            Request::SqueezeReleased { factory } => self.release_squeeze(factory),
            Request::ReleaseItem { item } => self
                .registry
                .item_mut(item)
                .is_some_and(CollectibleItem::release),
            Request::LandItem { item, position } => self
                .registry
                .item_mut(item)
                .is_some_and(|i| i.land(position)),
            Request::ItemEntered { factory, item } => self.item_entered(factory, item),
            Request::ItemExited { factory, item } => self.item_exited(factory, item),
        }
    }

    // ========================================================================
    // Production pipeline
    // ========================================================================

    fn item_entered(&mut self, factory_id: FactoryId, item_id: ItemId) -> bool {
        let Some(item) = self.registry.item(item_id) else {
            tracing::debug!(item = %item_id, "zone event for unknown item");
            return false;
        };
        if item.life_state().is_final() {
            return false;
        }
        let category = item.category();

        let Some(factory) = self.registry.factory_mut(factory_id) else {
            tracing::debug!(factory = %factory_id, "zone event for unknown factory");
            return false;
        };
        let was_met = factory.requirement().is_met();
        let entered = factory.item_entered(item_id, category);
        let met = factory.requirement().is_met();
        if met != was_met {
            self.presentation.apply_requirement(factory_id, met);
        }
        entered
    }

    fn item_exited(&mut self, factory_id: FactoryId, item_id: ItemId) -> bool {
        let Some(factory) = self.registry.factory_mut(factory_id) else {
            return false;
        };
        let was_met = factory.requirement().is_met();
        let exited = factory.item_exited(item_id);
        let met = factory.requirement().is_met();
        if met != was_met {
            self.presentation.apply_requirement(factory_id, met);
        }
        if exited {
            if let Some(item) = self.registry.item(item_id) {
                self.presentation.apply_item_scale(item_id, item.base_scale());
            }
        }
        exited
    }

    fn squeeze(&mut self, factory_id: FactoryId, sample: &SqueezeSample) -> bool {
        let compensation = self.config.squeeze.volume_compensation;
        let Some(factory) = self.registry.factory_mut(factory_id) else {
            return false;
        };
        let Some(step) = factory.squeeze(sample) else {
            tracing::trace!(factory = %factory_id, "squeeze ignored");
            return false;
        };

        let queued: Vec<ItemId> = factory.queued().collect();
        if let Some(axis) = step.axis {
            for item_id in queued {
                if let Some(item) = self.registry.item(item_id) {
                    let scale = target_scale(item.base_scale(), axis, step.ratio, compensation);
                    self.presentation.apply_item_scale(item_id, scale);
                }
            }
        }

        if let Some(item) = step.consumed {
            self.consume_item(factory_id, item);
        }
        true
    }

    fn release_squeeze(&mut self, factory_id: FactoryId) -> bool {
        let Some(factory) = self.registry.factory_mut(factory_id) else {
            return false;
        };
        factory.release_squeeze();
        let queued: Vec<ItemId> = factory.queued().collect();
        for item_id in queued {
            if let Some(item) = self.registry.item(item_id) {
                self.presentation.apply_item_scale(item_id, item.base_scale());
            }
        }
        true
    }

    /// Destroy `item_id` by consumption in `factory_id`.
    ///
    /// Effect first, then the counter, then the item itself, then the
    /// owner's decoration.
    fn consume_item(&mut self, factory_id: FactoryId, item_id: ItemId) {
        let Some(item) = self.registry.item(item_id) else {
            return;
        };
        let (category, position) = (item.category(), item.position());
        self.effects.spawn_effect(EffectKind::ItemBurst, position);

        let Some(factory) = self.registry.factory_mut(factory_id) else {
            return;
        };
        let owner = factory.owner();
        let was_met = factory.requirement().is_met();
        let credited = factory.item_consumed(item_id, category);
        let met = factory.requirement().is_met();
        if met != was_met {
            self.presentation.apply_requirement(factory_id, met);
        }

        // Destruction implies leaving every other zone too.
        for other in self.registry.factory_ids() {
            if other != factory_id {
                self.item_exited(other, item_id);
            }
        }

        if let Some(item) = self.registry.item_mut(item_id) {
            item.consume();
        }
        self.despawn_item(item_id);
        self.events.items_consumed.push(item_id);
        tracing::debug!(factory = %factory_id, item = %item_id, credited, "item consumed");

        self.advance_decoration(owner);
    }

    fn despawn_item(&mut self, item_id: ItemId) {
        if self.registry.remove_item(item_id).is_some() {
            self.outbox
                .push(ReplicationMessage::Despawn(NetEntity::Item(item_id)));
        }
    }

    // ========================================================================
    // Tick
    // ========================================================================

    /// Apply queued requests, then advance every timer by `dt` seconds.
    ///
    /// Returns everything that happened since the previous tick, including
    /// effects of calls made between ticks.
    pub fn tick(&mut self, dt: f32) -> TickEvents {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };

        self.apply_pending();
        self.advance_hazards(dt);
        self.advance_factories(dt);
        self.retry_placements(dt);
        self.advance_items(dt);

        self.tick += 1;

        if cfg!(feature = "debug-validation") {
            if let Err(e) = self.validate() {
                tracing::error!(error = %e, "session invariant violated");
                debug_assert!(false, "{e}");
            }
        }

        std::mem::take(&mut self.events)
    }

    fn advance_hazards(&mut self, dt: f32) {
        let rate = self.config.fire.extinguish_rate;
        for hazard_id in self.registry.hazard_ids() {
            let Some(hazard) = self.registry.hazard_mut(hazard_id) else {
                continue;
            };
            let before = hazard.intensity();
            let outcome = hazard.advance(dt, rate);
            let structure = hazard.structure();
            if hazard.intensity() != before {
                let ratio = hazard.ratio();
                self.presentation.apply_hazard_intensity(structure, ratio);
            }

            match outcome {
                HazardOutcome::Burning => {}
                HazardOutcome::Extinguished => {
                    self.transition(structure, LifecycleState::Saved);
                }
                HazardOutcome::TimedOut => {
                    tracing::info!(%structure, "fire timed out");
                    self.transition(structure, LifecycleState::Destroyed);
                }
            }
        }
    }

    fn advance_factories(&mut self, dt: f32) {
        for factory_id in self.registry.factory_ids() {
            if let Some(factory) = self.registry.factory_mut(factory_id) {
                if factory.tick(dt, &self.config.factory) {
                    tracing::info!(factory = %factory_id, "factory raised");
                }
            }
        }
    }

    fn retry_placements(&mut self, dt: f32) {
        for id in self.registry.structure_ids() {
            let due = match self.registry.structure_mut(id) {
                Some(s) if s.state() == LifecycleState::Built && s.bound_factory().is_none() => {
                    s.placement_due(dt)
                }
                _ => false,
            };
            if due {
                self.try_spawn_factory(id);
            }
        }
    }

    fn advance_items(&mut self, dt: f32) {
        for item_id in self.registry.item_ids() {
            let held = self.registry.is_item_held(item_id);
            let Some(item) = self.registry.item_mut(item_id) else {
                continue;
            };
            if item.tick(dt, held, &self.config.item) == ItemTick::Expired {
                item.destroy();
                self.despawn_item(item_id);
                self.events.items_expired.push(item_id);
                tracing::trace!(item = %item_id, "landed item expired");
            }
        }
    }

    // ========================================================================
    // Replication
    // ========================================================================

    /// Take every replication frame produced since the last drain.
    pub fn drain_outbox(&mut self) -> Vec<Frame> {
        self.outbox.drain()
    }

    /// Sequence number of the last frame produced.
    #[must_use]
    pub fn last_seq(&self) -> u64 {
        self.outbox.last_seq()
    }

    /// Current state for a late joiner.
    ///
    /// Frames with a sequence number up to `seq` are already folded in.
    #[must_use]
    pub fn snapshot(&self) -> WorldSnapshot {
        let mut entities = Vec::with_capacity(self.registry.len());
        entities.extend(
            self.registry
                .structures()
                .map(|s| EntitySnapshot::Structure(s.snapshot())),
        );
        entities.extend(
            self.registry
                .factories()
                .map(|f| EntitySnapshot::Factory(f.snapshot())),
        );
        entities.extend(
            self.registry
                .hazards()
                .map(|h| EntitySnapshot::Hazard(h.snapshot())),
        );
        entities.extend(self.registry.items().map(|i| EntitySnapshot::Item(i.snapshot())));

        WorldSnapshot {
            seq: self.outbox.last_seq(),
            tick: self.tick,
            entities,
        }
    }

    /// Check cross-entity invariants.
    pub fn validate(&self) -> Result<()> {
        for structure in self.registry.structures() {
            let id = structure.id();
            let state = structure.state();
            match structure.bound_factory() {
                Some(_) if !state.can_hold_factory() => {
                    return Err(TownError::Invariant(format!(
                        "{id} is {state:?} but still bound to a factory"
                    )));
                }
                Some(factory) => match self.registry.factory(factory) {
                    Some(f) if f.owner() == id => {}
                    Some(f) => {
                        return Err(TownError::Invariant(format!(
                            "{id} bound to {factory} owned by {}",
                            f.owner()
                        )));
                    }
                    None => {
                        return Err(TownError::Invariant(format!(
                            "{id} bound to missing {factory}"
                        )));
                    }
                },
                None => {}
            }
            if state == LifecycleState::Colored && !structure.paint_stage().is_full() {
                return Err(TownError::Invariant(format!(
                    "{id} is Colored with paint {:?}",
                    structure.paint_stage()
                )));
            }
            if structure.hazard().is_some() != (state == LifecycleState::Firing) {
                return Err(TownError::Invariant(format!(
                    "{id} is {state:?} with hazard {:?}",
                    structure.hazard()
                )));
            }
        }
        for factory in self.registry.factories() {
            let bound = self
                .registry
                .structure(factory.owner())
                .and_then(Structure::bound_factory);
            if bound != Some(factory.id()) {
                return Err(TownError::Invariant(format!(
                    "{} is not bound by its owner {}",
                    factory.id(),
                    factory.owner()
                )));
            }
        }
        Ok(())
    }

    /// End the session, despawning everything.
    pub fn shutdown(&mut self) {
        for id in self.registry.structure_ids() {
            self.transition(id, LifecycleState::Destroyed);
        }
        for id in self.registry.item_ids() {
            self.despawn_item(id);
        }
        tracing::info!(tick = self.tick, "session shut down");
    }
}
