//! Structure lifecycle transitions.
//!
//! ```text
//!  Unbuilt ──place──▶ Built ──progress──▶ Coloring ──paint Full──▶ Colored
//!     │                 │                    │
//!     └──────ignite─────┴────────────────────┴──▶ Firing ──intensity 0──▶ Saved
//!                                                   │
//!                                                timeout / force
//!                                                   ▼
//!                                               Destroyed
//! ```
//!
//! Every transition runs the same five steps, in order:
//!
//! 1. clear the factory binding if the new state cannot hold one
//! 2. write the replicated state (value listeners fire)
//! 3. notify state-change listeners, which can still read the outgoing
//!    factory and hazard
//! 4. apply presentation
//! 5. destroy or create sub-entities
//!
//! Because the binding is cleared before anything observes the new state,
//! no participant ever sees a bound factory on a structure that cannot hold
//! one; because sub-entities are destroyed last, listeners never see a
//! dangling reference.

use crate::components::{FactoryId, HazardId, StructureId};
use crate::factory::Factory;
use crate::hazard::Hazard;
use crate::interfaces::EffectKind;
use crate::session::{Session, Transition};
use crate::structure::{LifecycleState, StateChange};
use crate::wire::{EntitySnapshot, NetEntity, ReplicationMessage};

impl Session {
    /// Move `id` to `to`. Returns `false` for an unknown structure or a
    /// transition to the current state.
    pub(crate) fn transition(&mut self, id: StructureId, to: LifecycleState) -> bool {
        let Some(structure) = self.registry.structure_mut(id) else {
            tracing::debug!(structure = %id, ?to, "transition for unknown structure");
            return false;
        };
        let from = structure.state();
        if from == to {
            return false;
        }

        // 1. Binding.
        let outgoing = if to.can_hold_factory() {
            None
        } else {
            let bound = structure.bound_factory();
            structure.set_bound_factory(None);
            bound
        };

        // 2. State.
        structure.set_state(to);
        let decoration = structure.decoration_index();
        let paint = structure.paint_stage();

        // 3. Listeners, with the outgoing sub-entities still alive.
        let Some(structure) = self.registry.structure(id) else {
            return true;
        };
        let change = StateChange {
            structure: id,
            old: from,
            new: to,
            decoration,
            paint,
            bound_factory: structure.bound_factory(),
            outgoing_factory: outgoing.and_then(|f| self.registry.factory(f)),
            hazard: structure.hazard().and_then(|h| self.registry.hazard(h)),
        };
        structure.notify_state_change(&change);

        // 4. Presentation.
        self.presentation.apply_visual(id, to, decoration, paint);
        self.events.transitions.push(Transition {
            structure: id,
            from,
            to,
        });
        tracing::debug!(structure = %id, ?from, ?to, "transition");

        // 5. Side effects.
        if let Some(factory) = outgoing {
            self.despawn_factory(factory);
        }
        if from == LifecycleState::Firing {
            self.clear_hazard(id);
        }
        match to {
            LifecycleState::Built => {
                self.try_spawn_factory(id);
            }
            LifecycleState::Firing => self.ignite_hazard(id),
            LifecycleState::Saved => {
                tracing::info!(structure = %id, "structure saved");
            }
            LifecycleState::Colored => {
                tracing::info!(structure = %id, "structure fully colored");
            }
            LifecycleState::Destroyed => self.remove_destroyed(id),
            LifecycleState::Unbuilt | LifecycleState::Coloring => {}
        }
        true
    }

    // ========================================================================
    // Request handlers
    // ========================================================================

    pub(crate) fn place(&mut self, id: StructureId) -> bool {
        match self.registry.structure(id).map(|s| s.state()) {
            Some(LifecycleState::Unbuilt) => self.transition(id, LifecycleState::Built),
            state => {
                tracing::debug!(structure = %id, ?state, "ignoring place request");
                false
            }
        }
    }

    pub(crate) fn ignite(&mut self, id: StructureId) -> bool {
        match self.registry.structure(id).map(|s| s.state()) {
            Some(LifecycleState::Firing) | None => {
                tracing::debug!(structure = %id, "ignoring ignite request");
                false
            }
            Some(_) => self.transition(id, LifecycleState::Firing),
        }
    }

    pub(crate) fn force_destroy(&mut self, id: StructureId) -> bool {
        self.transition(id, LifecycleState::Destroyed)
    }

    pub(crate) fn mitigate(&mut self, id: StructureId, amount: f32) -> bool {
        let Some(hazard_id) = self.burning_hazard(id) else {
            tracing::debug!(structure = %id, "ignoring mitigation: not on fire");
            return false;
        };
        let Some(hazard) = self.registry.hazard_mut(hazard_id) else {
            return false;
        };
        let before = hazard.intensity();
        hazard.mitigate(amount);
        let (ratio, out) = (hazard.ratio(), hazard.is_extinguished());
        if hazard.intensity() != before {
            self.presentation.apply_hazard_intensity(id, ratio);
        }
        if out {
            self.transition(id, LifecycleState::Saved);
        }
        true
    }

    pub(crate) fn set_spraying(&mut self, id: StructureId, spraying: bool) -> bool {
        let Some(hazard_id) = self.burning_hazard(id) else {
            tracing::debug!(structure = %id, "ignoring spraying toggle: not on fire");
            return false;
        };
        self.registry
            .hazard_mut(hazard_id)
            .is_some_and(|hazard| {
                hazard.set_spraying(spraying);
                true
            })
    }

    fn burning_hazard(&self, id: StructureId) -> Option<HazardId> {
        let structure = self.registry.structure(id)?;
        if structure.state() != LifecycleState::Firing {
            return None;
        }
        structure.hazard()
    }

    /// Record one unit of decoration progress on `id`.
    ///
    /// Built moves to Coloring with the first coat; Coloring advances the
    /// paint and moves to Colored once it is full. Ignored in every other
    /// state.
    pub fn advance_decoration(&mut self, id: StructureId) -> bool {
        let Some(structure) = self.registry.structure_mut(id) else {
            return false;
        };
        let state = structure.state();
        if !state.accepts_decoration() {
            tracing::debug!(structure = %id, ?state, "ignoring decoration progress");
            return false;
        }

        let paint = structure.paint_stage().next();
        structure.set_paint(paint);
        let decoration = structure.decoration_index();

        if state == LifecycleState::Built {
            self.transition(id, LifecycleState::Coloring);
        } else {
            self.presentation.apply_visual(id, state, decoration, paint);
        }
        if paint.is_full() {
            self.transition(id, LifecycleState::Colored);
        }
        true
    }

    // ========================================================================
    // Sub-entities
    // ========================================================================

    /// Create and bind a factory for a Built structure without one.
    pub(crate) fn try_spawn_factory(&mut self, id: StructureId) -> Option<FactoryId> {
        let structure = self.registry.structure(id)?;
        if structure.state() != LifecycleState::Built || structure.bound_factory().is_some() {
            return None;
        }

        let Some(pose) = self.placement.try_resolve_pose(structure) else {
            let retry = self.config.factory.retry_interval;
            tracing::warn!(structure = %id, retry_in = retry, "factory placement failed");
            self.events.placement_failures.push(id);
            if let Some(structure) = self.registry.structure_mut(id) {
                structure.schedule_placement_retry(retry);
            }
            return None;
        };

        let factory_id = self.registry.next_factory_id();
        let structure = self.registry.structure(id)?;
        let factory = Factory::new(
            factory_id,
            structure,
            pose,
            self.config.requirement.required_count,
            &self.config.squeeze,
            &self.outbox,
        );
        self.outbox
            .push(ReplicationMessage::Spawn(EntitySnapshot::Factory(factory.snapshot())));
        self.registry.insert_factory(factory);
        if let Some(structure) = self.registry.structure_mut(id) {
            structure.set_bound_factory(Some(factory_id));
        }
        self.presentation.apply_requirement(factory_id, false);
        self.events.factories_spawned.push(factory_id);
        tracing::info!(structure = %id, factory = %factory_id, "factory spawned");
        Some(factory_id)
    }

    fn despawn_factory(&mut self, id: FactoryId) {
        let Some(factory) = self.registry.remove_factory(id) else {
            return;
        };
        // Items left in the zone stay in the world at their base scale.
        for item in factory.queued() {
            if let Some(item) = self.registry.item(item) {
                self.presentation.apply_item_scale(item.id(), item.base_scale());
            }
        }
        self.outbox.push(ReplicationMessage::Despawn(NetEntity::Factory(id)));
        self.events.factories_despawned.push(id);
        tracing::info!(factory = %id, owner = %factory.owner(), "factory despawned");
    }

    fn ignite_hazard(&mut self, id: StructureId) {
        let has_hazard = self
            .registry
            .structure(id)
            .map_or(true, |s| s.hazard().is_some());
        if has_hazard {
            return;
        }

        let hazard_id = self.registry.next_hazard_id();
        let hazard = Hazard::ignite(hazard_id, id, &self.config.fire, &self.outbox);
        self.outbox
            .push(ReplicationMessage::Spawn(EntitySnapshot::Hazard(hazard.snapshot())));
        let ratio = hazard.ratio();
        self.registry.insert_hazard(hazard);
        if let Some(structure) = self.registry.structure_mut(id) {
            structure.set_hazard(Some(hazard_id));
        }
        self.presentation.apply_hazard_intensity(id, ratio);
        tracing::info!(structure = %id, hazard = %hazard_id, "fire started");
    }

    fn clear_hazard(&mut self, id: StructureId) {
        let Some(hazard_id) = self.registry.structure_mut(id).and_then(|s| {
            let hazard = s.hazard();
            s.set_hazard(None);
            hazard
        }) else {
            return;
        };
        let Some(hazard) = self.registry.remove_hazard(hazard_id) else {
            return;
        };
        if hazard.is_extinguished() {
            let position = self
                .registry
                .structure(id)
                .map(|s| s.pose().position)
                .unwrap_or_default();
            self.effects.spawn_effect(EffectKind::Extinguished, position);
        }
        self.presentation.apply_hazard_intensity(id, 0.0);
        self.outbox.push(ReplicationMessage::Despawn(NetEntity::Hazard(hazard_id)));
        tracing::debug!(structure = %id, hazard = %hazard_id, "hazard cleared");
    }

    fn remove_destroyed(&mut self, id: StructureId) {
        let Some(structure) = self.registry.remove_structure(id) else {
            return;
        };
        self.effects
            .spawn_effect(EffectKind::Collapse, structure.pose().position);
        self.outbox
            .push(ReplicationMessage::Despawn(NetEntity::Structure(id)));
        tracing::info!(structure = %id, "structure destroyed");
    }
}
