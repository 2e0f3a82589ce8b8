//! Tuning configuration for a town session.
//!
//! Every field has a default matching the shipped tuning, so a config file
//! only needs to name what it overrides:
//!
//! ```ron
//! (
//!     fire: (timeout: 45.0),
//!     requirement: (required_count: 5),
//! )
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TownError};

/// Highest accepted tick rate. Hosts turn `1 / tick_rate` into a timer
/// period, which must stay non-zero.
pub const MAX_TICK_RATE: u32 = 1000;

/// Complete session configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TownConfig {
    /// Authority ticks per second (used by hosts, not by `Session::tick`).
    pub tick_rate: u32,
    /// Requirement counter tuning.
    pub requirement: RequirementConfig,
    /// Squeeze gesture tuning.
    pub squeeze: SqueezeConfig,
    /// Fire hazard tuning.
    pub fire: FireConfig,
    /// Collectible item timers.
    pub item: ItemConfig,
    /// Factory placement offsets.
    pub placement: PlacementConfig,
    /// Factory lifecycle timers.
    pub factory: FactoryConfig,
}

impl Default for TownConfig {
    fn default() -> Self {
        Self {
            tick_rate: 30,
            requirement: RequirementConfig::default(),
            squeeze: SqueezeConfig::default(),
            fire: FireConfig::default(),
            item: ItemConfig::default(),
            placement: PlacementConfig::default(),
            factory: FactoryConfig::default(),
        }
    }
}

/// How many matching items a factory needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequirementConfig {
    /// Present + consumed items needed for the requirement to be met.
    pub required_count: u32,
}

impl Default for RequirementConfig {
    fn default() -> Self {
        Self { required_count: 3 }
    }
}

/// Squeeze gesture geometry and trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqueezeConfig {
    /// Lowest reported squeeze ratio.
    pub min_ratio: f32,
    /// Highest reported squeeze ratio.
    pub max_ratio: f32,
    /// Ratio at or below which a press is counted.
    pub threshold: f32,
    /// How far above the threshold the ratio must rise to re-arm.
    pub hysteresis: f32,
    /// Presses needed to consume one item.
    pub presses_per_item: u32,
    /// Exponent for orthogonal volume compensation; 0 disables it.
    pub volume_compensation: f32,
}

impl Default for SqueezeConfig {
    fn default() -> Self {
        Self {
            min_ratio: 0.25,
            max_ratio: 1.0,
            threshold: 0.8,
            hysteresis: 0.01,
            presses_per_item: 3,
            volume_compensation: 0.5,
        }
    }
}

/// Fire hazard tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FireConfig {
    /// Intensity of a freshly ignited fire.
    pub max_intensity: f32,
    /// Seconds before an unresolved fire destroys the structure.
    pub timeout: f32,
    /// Intensity removed per second while spraying.
    pub extinguish_rate: f32,
}

impl Default for FireConfig {
    fn default() -> Self {
        Self {
            max_intensity: 30.0,
            timeout: 30.0,
            extinguish_rate: 10.0,
        }
    }
}

/// Collectible item timers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemConfig {
    /// Seconds an idle item waits before it starts falling on its own.
    pub fall_delay: f32,
    /// Seconds a landed item survives before it is despawned.
    pub landed_lifetime: f32,
}

impl Default for ItemConfig {
    fn default() -> Self {
        Self {
            fall_delay: 2.0,
            landed_lifetime: 15.0,
        }
    }
}

/// Offsets used to derive a factory pose from its structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementConfig {
    /// Offset of the probe origin for wall and ceiling structures.
    pub surface_offset: f32,
    /// Extra factor applied to `surface_offset` on walls.
    pub wall_offset_factor: f32,
    /// Maximum downward probe distance.
    pub probe_distance: f32,
    /// Lift applied above a probe hit.
    pub hit_lift: f32,
    /// Sideways distance for floor structures.
    pub floor_side_distance: f32,
    /// Lift applied to floor placements.
    pub floor_up_offset: f32,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            surface_offset: 0.3,
            wall_offset_factor: 1.5,
            probe_distance: 10.0,
            hit_lift: 0.1,
            floor_side_distance: 1.0,
            floor_up_offset: 0.05,
        }
    }
}

/// Factory lifecycle timers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactoryConfig {
    /// Seconds between placement attempts for a Built structure without a factory.
    pub retry_interval: f32,
    /// Seconds after the requirement is first met before the factory rises.
    pub raise_delay: f32,
    /// Height the factory rises by.
    pub raise_height: f32,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            retry_interval: 1.0,
            raise_delay: 2.0,
            raise_height: 0.5,
        }
    }
}

impl TownConfig {
    /// Load a configuration from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| TownError::ConfigRead {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_ron_str(&contents)
    }

    /// Parse and validate a configuration from a RON string.
    pub fn from_ron_str(ron: &str) -> Result<Self> {
        let config: Self = ron::from_str(ron).map_err(|e| TownError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty RON.
    pub fn to_ron_string(&self) -> Result<String> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| TownError::ConfigParse(e.to_string()))
    }

    /// Check that every value is usable by the simulation.
    pub fn validate(&self) -> Result<()> {
        fn positive(name: &str, value: f32) -> Result<()> {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(TownError::InvalidConfig(format!(
                    "{name} must be positive, got {value}"
                )))
            }
        }

        fn non_negative(name: &str, value: f32) -> Result<()> {
            if value.is_finite() && value >= 0.0 {
                Ok(())
            } else {
                Err(TownError::InvalidConfig(format!(
                    "{name} must not be negative, got {value}"
                )))
            }
        }

        if !(1..=MAX_TICK_RATE).contains(&self.tick_rate) {
            return Err(TownError::InvalidConfig(format!(
                "tick_rate must lie within [1, {MAX_TICK_RATE}], got {}",
                self.tick_rate
            )));
        }
        if self.requirement.required_count == 0 {
            return Err(TownError::InvalidConfig(
                "requirement.required_count must be at least 1".into(),
            ));
        }

        let squeeze = &self.squeeze;
        positive("squeeze.min_ratio", squeeze.min_ratio)?;
        positive("squeeze.max_ratio", squeeze.max_ratio)?;
        if squeeze.min_ratio > squeeze.max_ratio {
            return Err(TownError::InvalidConfig(format!(
                "squeeze.min_ratio ({}) exceeds squeeze.max_ratio ({})",
                squeeze.min_ratio, squeeze.max_ratio
            )));
        }
        if !(squeeze.min_ratio..=squeeze.max_ratio).contains(&squeeze.threshold) {
            return Err(TownError::InvalidConfig(format!(
                "squeeze.threshold ({}) must lie within [{}, {}]",
                squeeze.threshold, squeeze.min_ratio, squeeze.max_ratio
            )));
        }
        non_negative("squeeze.hysteresis", squeeze.hysteresis)?;
        // A press re-arms only once the ratio climbs above this level.
        if squeeze.threshold + squeeze.hysteresis >= squeeze.max_ratio {
            return Err(TownError::InvalidConfig(format!(
                "squeeze.threshold + squeeze.hysteresis ({}) must stay below squeeze.max_ratio ({})",
                squeeze.threshold + squeeze.hysteresis,
                squeeze.max_ratio
            )));
        }
        non_negative("squeeze.volume_compensation", squeeze.volume_compensation)?;
        if squeeze.presses_per_item == 0 {
            return Err(TownError::InvalidConfig(
                "squeeze.presses_per_item must be at least 1".into(),
            ));
        }

        positive("fire.max_intensity", self.fire.max_intensity)?;
        positive("fire.timeout", self.fire.timeout)?;
        non_negative("fire.extinguish_rate", self.fire.extinguish_rate)?;

        non_negative("item.fall_delay", self.item.fall_delay)?;
        positive("item.landed_lifetime", self.item.landed_lifetime)?;

        let placement = &self.placement;
        non_negative("placement.surface_offset", placement.surface_offset)?;
        non_negative("placement.wall_offset_factor", placement.wall_offset_factor)?;
        positive("placement.probe_distance", placement.probe_distance)?;
        non_negative("placement.hit_lift", placement.hit_lift)?;
        non_negative("placement.floor_side_distance", placement.floor_side_distance)?;
        non_negative("placement.floor_up_offset", placement.floor_up_offset)?;

        non_negative("factory.retry_interval", self.factory.retry_interval)?;
        non_negative("factory.raise_delay", self.factory.raise_delay)?;
        non_negative("factory.raise_height", self.factory.raise_height)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = TownConfig::default();
        config.validate().unwrap();
        assert_eq!(config.requirement.required_count, 3);
        assert_eq!(config.fire.max_intensity, 30.0);
        assert_eq!(config.squeeze.presses_per_item, 3);
    }

    #[test]
    fn test_partial_ron_uses_defaults() {
        let config = TownConfig::from_ron_str("(fire: (timeout: 45.0))").unwrap();
        assert_eq!(config.fire.timeout, 45.0);
        assert_eq!(config.fire.max_intensity, 30.0);
        assert_eq!(config.item, ItemConfig::default());
    }

    #[test]
    fn test_ron_round_trip() {
        let config = TownConfig::default();
        let text = config.to_ron_string().unwrap();
        assert_eq!(TownConfig::from_ron_str(&text).unwrap(), config);
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let err = TownConfig::from_ron_str("(squeeze: (threshold: 0.1))").unwrap_err();
        assert!(matches!(err, TownError::InvalidConfig(_)));
    }

    #[test]
    fn test_threshold_without_rearm_room_rejected() {
        let err = TownConfig::from_ron_str("(squeeze: (threshold: 0.995, hysteresis: 0.01))")
            .unwrap_err();
        assert!(err.to_string().contains("hysteresis"));
        let err = TownConfig::from_ron_str("(squeeze: (threshold: 1.0, hysteresis: 0.0))")
            .unwrap_err();
        assert!(matches!(err, TownError::InvalidConfig(_)));
    }

    #[test]
    fn test_tick_rate_bounds() {
        assert!(TownConfig::from_ron_str("(tick_rate: 0)").is_err());
        assert!(TownConfig::from_ron_str("(tick_rate: 2000000000)").is_err());
        assert_eq!(
            TownConfig::from_ron_str(&format!("(tick_rate: {MAX_TICK_RATE})"))
                .unwrap()
                .tick_rate,
            MAX_TICK_RATE
        );
    }

    #[test]
    fn test_zero_required_rejected() {
        let err = TownConfig::from_ron_str("(requirement: (required_count: 0))").unwrap_err();
        assert!(err.to_string().contains("required_count"));
    }

    #[test]
    fn test_malformed_ron() {
        let err = TownConfig::from_ron_str("(fire: ").unwrap_err();
        assert!(matches!(err, TownError::ConfigParse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("town.ron");
        std::fs::write(&path, "(tick_rate: 60, fire: (timeout: 12.0))").unwrap();

        let config = TownConfig::load(&path).unwrap();
        assert_eq!(config.tick_rate, 60);
        assert_eq!(config.fire.timeout, 12.0);
    }

    #[test]
    fn test_load_missing_file() {
        let err = TownConfig::load("/nonexistent/town.ron").unwrap_err();
        assert!(matches!(err, TownError::ConfigRead { .. }));
    }
}
