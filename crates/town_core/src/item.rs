//! Collectible items ("fruit").
//!
//! Items hang idle until they are released (by hand or after a fall delay),
//! fall, land, and either get collected into a factory or rot away after a
//! fixed lifetime on the ground.

use serde::{Deserialize, Serialize};

use crate::components::{Category, ItemId};
use crate::config::ItemConfig;
use crate::math::Vec3;
use crate::replicated::ReplicatedVar;
use crate::wire::{Field, ItemSnapshot, NetEntity, Outbox, VarKey};

/// Life state of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ItemLifeState {
    /// Hanging where it was spawned.
    #[default]
    Idle,
    /// Released and under physics.
    Falling,
    /// Resting on a surface.
    Landed,
    /// Squeezed in a factory.
    Consumed,
    /// Expired or removed.
    Destroyed,
}

impl ItemLifeState {
    /// Whether the item is gone for good.
    #[must_use]
    pub const fn is_final(self) -> bool {
        matches!(self, ItemLifeState::Consumed | ItemLifeState::Destroyed)
    }
}

/// What a tick did to an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemTick {
    /// Nothing visible changed.
    Unchanged,
    /// Fall delay elapsed; the item started falling.
    Released,
    /// Landed lifetime elapsed; the item should be despawned.
    Expired,
}

/// An authority-side collectible item.
#[derive(Debug)]
pub struct CollectibleItem {
    id: ItemId,
    category: Category,
    position: Vec3,
    base_scale: Vec3,
    life: ReplicatedVar<ItemLifeState>,
    fall_delay: f32,
    elapsed: f32,
}

impl CollectibleItem {
    /// Spawn an idle item that starts falling after `fall_delay` seconds.
    #[must_use]
    pub fn new(
        id: ItemId,
        category: Category,
        position: Vec3,
        fall_delay: f32,
        outbox: &Outbox,
    ) -> Self {
        Self {
            id,
            category,
            position,
            base_scale: Vec3::ONE,
            life: ReplicatedVar::authority(
                ItemLifeState::Idle,
                VarKey::new(NetEntity::Item(id), Field::ItemLife),
                outbox,
            ),
            fall_delay: fall_delay.max(0.0),
            elapsed: 0.0,
        }
    }

    /// Item id.
    #[must_use]
    pub const fn id(&self) -> ItemId {
        self.id
    }

    /// Item category ("color").
    #[must_use]
    pub const fn category(&self) -> Category {
        self.category
    }

    /// Last known position.
    #[must_use]
    pub const fn position(&self) -> Vec3 {
        self.position
    }

    /// Scale before any squeeze.
    #[must_use]
    pub const fn base_scale(&self) -> Vec3 {
        self.base_scale
    }

    /// Current life state.
    #[must_use]
    pub fn life_state(&self) -> ItemLifeState {
        *self.life.get()
    }

    /// Start falling now. Only an idle item can be released.
    pub fn release(&mut self) -> bool {
        if self.life_state() != ItemLifeState::Idle {
            return false;
        }
        self.elapsed = 0.0;
        self.life.set(ItemLifeState::Falling)
    }

    /// Come to rest at `position`. Only a falling item can land.
    pub fn land(&mut self, position: Vec3) -> bool {
        if self.life_state() != ItemLifeState::Falling {
            return false;
        }
        self.position = position;
        self.elapsed = 0.0;
        self.life.set(ItemLifeState::Landed)
    }

    /// Mark as consumed by a factory.
    pub fn consume(&mut self) -> bool {
        if self.life_state().is_final() {
            return false;
        }
        self.life.set(ItemLifeState::Consumed)
    }

    /// Mark as destroyed.
    pub fn destroy(&mut self) -> bool {
        if self.life_state().is_final() {
            return false;
        }
        self.life.set(ItemLifeState::Destroyed)
    }

    /// Advance timers. `held` items (inside a capture zone) do not expire.
    pub fn tick(&mut self, dt: f32, held: bool, config: &ItemConfig) -> ItemTick {
        match self.life_state() {
            ItemLifeState::Idle => {
                self.elapsed += dt;
                if self.elapsed >= self.fall_delay && self.release() {
                    return ItemTick::Released;
                }
            }
            ItemLifeState::Landed if !held => {
                self.elapsed += dt;
                if self.elapsed >= config.landed_lifetime {
                    return ItemTick::Expired;
                }
            }
            _ => {}
        }
        ItemTick::Unchanged
    }

    /// Replicated view.
    #[must_use]
    pub fn snapshot(&self) -> ItemSnapshot {
        ItemSnapshot {
            id: self.id,
            category: self.category,
            life_state: self.life_state(),
            position: self.position,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(fall_delay: f32) -> CollectibleItem {
        CollectibleItem::new(ItemId(1), Category(0), Vec3::UP, fall_delay, &Outbox::new())
    }

    #[test]
    fn test_fall_delay_releases() {
        let config = ItemConfig::default();
        let mut item = item(1.0);
        assert_eq!(item.tick(0.5, false, &config), ItemTick::Unchanged);
        assert_eq!(item.tick(0.5, false, &config), ItemTick::Released);
        assert_eq!(item.life_state(), ItemLifeState::Falling);
    }

    #[test]
    fn test_landed_item_expires() {
        let config = ItemConfig {
            landed_lifetime: 2.0,
            ..ItemConfig::default()
        };
        let mut item = item(10.0);
        assert!(item.release());
        assert!(item.land(Vec3::ZERO));
        assert_eq!(item.tick(1.0, false, &config), ItemTick::Unchanged);
        assert_eq!(item.tick(1.0, false, &config), ItemTick::Expired);
    }

    #[test]
    fn test_held_item_does_not_expire() {
        let config = ItemConfig {
            landed_lifetime: 1.0,
            ..ItemConfig::default()
        };
        let mut item = item(0.0);
        item.release();
        item.land(Vec3::ZERO);
        assert_eq!(item.tick(5.0, true, &config), ItemTick::Unchanged);
    }

    #[test]
    fn test_invalid_transitions_ignored() {
        let mut item = item(1.0);
        assert!(!item.land(Vec3::ZERO));
        assert!(item.consume());
        assert!(!item.release());
        assert!(!item.destroy());
        assert_eq!(item.life_state(), ItemLifeState::Consumed);
    }
}
