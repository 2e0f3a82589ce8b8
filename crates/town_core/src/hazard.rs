//! Fire hazard attached to a burning structure.
//!
//! A hazard starts at full intensity and counts toward a timeout. Mitigation
//! (a direct amount, or a rate while somebody is spraying) lowers intensity.
//! Each tick applies mitigation before the timeout check, so a fire that
//! reaches zero in the same tick it times out is still saved.

use crate::components::{HazardId, StructureId};
use crate::config::FireConfig;
use crate::observer::Subscription;
use crate::replicated::ReplicatedVar;
use crate::wire::{Field, HazardSnapshot, NetEntity, Outbox, VarKey};

/// Result of advancing a hazard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HazardOutcome {
    /// Still burning.
    Burning,
    /// Intensity reached zero.
    Extinguished,
    /// Timeout elapsed with intensity left.
    TimedOut,
}

/// An active fire.
#[derive(Debug)]
pub struct Hazard {
    id: HazardId,
    structure: StructureId,
    max_intensity: f32,
    timeout: f32,
    elapsed: f32,
    intensity: ReplicatedVar<f32>,
    spraying: ReplicatedVar<bool>,
}

impl Hazard {
    /// Ignite a hazard at full intensity on `structure`.
    #[must_use]
    pub fn ignite(id: HazardId, structure: StructureId, config: &FireConfig, outbox: &Outbox) -> Self {
        let entity = NetEntity::Hazard(id);
        Self {
            id,
            structure,
            max_intensity: config.max_intensity,
            timeout: config.timeout,
            elapsed: 0.0,
            intensity: ReplicatedVar::authority(
                config.max_intensity,
                VarKey::new(entity, Field::Intensity),
                outbox,
            ),
            spraying: ReplicatedVar::authority(false, VarKey::new(entity, Field::Spraying), outbox),
        }
    }

    /// Hazard id.
    #[must_use]
    pub const fn id(&self) -> HazardId {
        self.id
    }

    /// Structure on fire.
    #[must_use]
    pub const fn structure(&self) -> StructureId {
        self.structure
    }

    /// Current intensity in `[0, max_intensity]`.
    #[must_use]
    pub fn intensity(&self) -> f32 {
        *self.intensity.get()
    }

    /// Intensity at ignition.
    #[must_use]
    pub const fn max_intensity(&self) -> f32 {
        self.max_intensity
    }

    /// `intensity / max_intensity`.
    #[must_use]
    pub fn ratio(&self) -> f32 {
        intensity_ratio(self.intensity(), self.max_intensity)
    }

    /// Seconds burned so far.
    #[must_use]
    pub const fn elapsed(&self) -> f32 {
        self.elapsed
    }

    /// Seconds until the structure is lost.
    #[must_use]
    pub fn remaining(&self) -> f32 {
        (self.timeout - self.elapsed).max(0.0)
    }

    /// Whether somebody is spraying it.
    #[must_use]
    pub fn is_spraying(&self) -> bool {
        *self.spraying.get()
    }

    /// Whether the fire is out.
    #[must_use]
    pub fn is_extinguished(&self) -> bool {
        self.intensity() <= 0.0
    }

    /// Remove `amount` intensity. Negative or non-finite amounts are ignored.
    pub fn mitigate(&mut self, amount: f32) -> f32 {
        if !amount.is_finite() || amount <= 0.0 {
            tracing::debug!(hazard = %self.id, amount, "ignoring invalid mitigation amount");
            return self.intensity();
        }
        let next = (self.intensity() - amount).clamp(0.0, self.max_intensity);
        self.intensity.set(next);
        next
    }

    /// Start or stop spraying.
    pub fn set_spraying(&mut self, spraying: bool) -> bool {
        self.spraying.set(spraying)
    }

    /// Advance by `dt`: spray mitigation first, then the timeout.
    pub fn advance(&mut self, dt: f32, extinguish_rate: f32) -> HazardOutcome {
        if self.is_spraying() {
            self.mitigate(extinguish_rate * dt);
        }
        if self.is_extinguished() {
            return HazardOutcome::Extinguished;
        }

        self.elapsed += dt;
        if self.elapsed >= self.timeout {
            HazardOutcome::TimedOut
        } else {
            HazardOutcome::Burning
        }
    }

    /// Listen for intensity changes.
    pub fn on_intensity_change(&self, listener: impl FnMut(&f32, &f32) + 'static) -> Subscription {
        self.intensity.on_change(listener)
    }

    /// Replicated view.
    #[must_use]
    pub fn snapshot(&self) -> HazardSnapshot {
        HazardSnapshot {
            id: self.id,
            structure: self.structure,
            intensity: self.intensity(),
            max_intensity: self.max_intensity,
            spraying: self.is_spraying(),
        }
    }
}

/// `intensity / max`, clamped to `[0, 1]`.
#[must_use]
pub fn intensity_ratio(intensity: f32, max: f32) -> f32 {
    if max <= 0.0 {
        return 0.0;
    }
    (intensity / max).clamp(0.0, 1.0)
}

/// Locally derived fire visuals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HazardVisual {
    /// Flame size.
    pub size: f32,
    /// Emission strength.
    pub emission: f32,
    /// Light intensity.
    pub light: f32,
    /// Audio volume.
    pub volume: f32,
}

impl HazardVisual {
    /// Map an intensity ratio to visuals.
    #[must_use]
    pub fn from_ratio(ratio: f32) -> Self {
        let t = ratio.clamp(0.0, 1.0);
        let lerp = |a: f32, b: f32| a + (b - a) * t;
        Self {
            size: lerp(0.1, 1.2),
            emission: lerp(0.0, 60.0),
            light: lerp(0.0, 3.0),
            volume: lerp(0.1, 1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hazard() -> Hazard {
        Hazard::ignite(HazardId(1), StructureId(1), &FireConfig::default(), &Outbox::new())
    }

    #[test]
    fn test_spraying_for_three_seconds_extinguishes() {
        let mut hazard = hazard();
        hazard.set_spraying(true);

        let mut outcome = HazardOutcome::Burning;
        for _ in 0..40 {
            outcome = hazard.advance(0.1, 10.0);
            if outcome != HazardOutcome::Burning {
                break;
            }
        }
        assert_eq!(outcome, HazardOutcome::Extinguished);
        assert_eq!(hazard.intensity(), 0.0);
    }

    #[test]
    fn test_unattended_fire_times_out() {
        let mut hazard = hazard();
        for _ in 0..29 {
            assert_eq!(hazard.advance(1.0, 10.0), HazardOutcome::Burning);
        }
        assert_eq!(hazard.advance(1.0, 10.0), HazardOutcome::TimedOut);
        assert_eq!(hazard.intensity(), 30.0);
    }

    #[test]
    fn test_extinguish_wins_over_timeout() {
        let mut hazard = hazard();
        for _ in 0..29 {
            hazard.advance(1.0, 10.0);
        }
        hazard.mitigate(25.0);
        hazard.set_spraying(true);
        assert_eq!(hazard.advance(1.0, 10.0), HazardOutcome::Extinguished);
    }

    #[test]
    fn test_mitigation_clamps_and_ignores_negative() {
        let mut hazard = hazard();
        assert_eq!(hazard.mitigate(-5.0), 30.0);
        assert_eq!(hazard.mitigate(f32::NAN), 30.0);
        assert_eq!(hazard.mitigate(100.0), 0.0);
        assert!(hazard.is_extinguished());
    }

    #[test]
    fn test_visual_mapping() {
        let full = HazardVisual::from_ratio(1.0);
        assert!((full.size - 1.2).abs() < 1e-6);
        assert!((full.emission - 60.0).abs() < 1e-6);
        let out = HazardVisual::from_ratio(-1.0);
        assert!((out.size - 0.1).abs() < 1e-6);
        assert_eq!(out.light, 0.0);
        assert_eq!(intensity_ratio(15.0, 30.0), 0.5);
    }
}
