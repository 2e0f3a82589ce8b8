//! Scenario loading.
//!
//! A scenario lays out structures and items, then schedules requests by
//! tick. Entities get ids in declaration order starting at 1, and factories
//! in the order they are created, so scripts can name them directly.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use town_core::components::{Category, DecorationIndex, ParticipantId};
use town_core::math::{Pose, Vec3};
use town_core::session::Request;

/// Error type for scenario operations.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// File not found.
    #[error("Scenario file not found: {0}")]
    FileNotFound(String),
    /// Failed to read the scenario or write output.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse scenario: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    /// Scenario refers to something it does not declare.
    #[error("Invalid scenario: {0}")]
    Invalid(String),
    /// Configuration or replication failure in the core.
    #[error(transparent)]
    Core(#[from] town_core::error::TownError),
    /// Failed to write an output record.
    #[error("Failed to write output: {0}")]
    Output(#[from] serde_json::Error),
}

/// A complete scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Number of authority ticks to run.
    pub duration_ticks: u64,
    /// Structures, ids 1.. in order.
    pub structures: Vec<StructurePlacement>,
    /// Items, ids 1.. in order.
    #[serde(default)]
    pub items: Vec<ItemPlacement>,
    /// Requests by tick.
    #[serde(default)]
    pub script: Vec<ScheduledRequest>,
}

impl Scenario {
    /// Load a scenario from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_ron_str(&contents)
    }

    /// Load from a RON string (useful for embedded scenarios).
    pub fn from_ron_str(ron: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = ron::from_str(ron)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Reject scripts that run past the end.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        if let Some(late) = self.script.iter().find(|s| s.tick >= self.duration_ticks) {
            return Err(ScenarioError::Invalid(format!(
                "request at tick {} is past duration {}",
                late.tick, self.duration_ticks
            )));
        }
        Ok(())
    }

    /// Requests scheduled for `tick`, in file order.
    pub fn requests_at(&self, tick: u64) -> impl Iterator<Item = &ScheduledRequest> {
        self.script.iter().filter(move |s| s.tick == tick)
    }
}

/// A structure at scenario start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructurePlacement {
    /// World position.
    pub position: (f32, f32, f32),
    /// Surface normal; floor if omitted.
    #[serde(default)]
    pub up: Option<(f32, f32, f32)>,
    /// Decoration palette.
    pub decoration: u8,
}

impl StructurePlacement {
    /// Pose facing +Z with the configured up vector.
    #[must_use]
    pub fn pose(&self) -> Pose {
        let position = vec3(self.position);
        match self.up.map(vec3) {
            Some(up) => {
                let forward = if up.dot(Vec3::UP).abs() > 0.9 {
                    Vec3::FORWARD
                } else {
                    Vec3::UP
                };
                Pose::look_rotation(position, forward, up).unwrap_or_else(|| Pose::at(position))
            }
            None => Pose::at(position),
        }
    }

    /// Decoration index.
    #[must_use]
    pub const fn decoration(&self) -> DecorationIndex {
        DecorationIndex(self.decoration)
    }
}

/// A hanging item at scenario start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemPlacement {
    /// Item category.
    pub category: u8,
    /// World position.
    pub position: (f32, f32, f32),
    /// Seconds until it drops; configured default if omitted.
    #[serde(default)]
    pub fall_delay: Option<f32>,
}

impl ItemPlacement {
    /// Item category.
    #[must_use]
    pub const fn category(&self) -> Category {
        Category(self.category)
    }

    /// World position.
    #[must_use]
    pub fn position(&self) -> Vec3 {
        vec3(self.position)
    }
}

/// A request submitted at the start of a tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledRequest {
    /// Tick at which it is submitted.
    pub tick: u64,
    /// Observer participant sending it; the authority if omitted.
    #[serde(default)]
    pub from: Option<u64>,
    /// The request.
    pub request: Request,
}

impl ScheduledRequest {
    /// Sending participant, if an observer.
    #[must_use]
    pub fn participant(&self) -> Option<ParticipantId> {
        self.from.map(ParticipantId)
    }
}

fn vec3((x, y, z): (f32, f32, f32)) -> Vec3 {
    Vec3::new(x, y, z)
}

#[cfg(test)]
mod tests {
    use super::*;
    use town_core::components::StructureId;

    const FIRE_DRILL: &str = include_str!("../scenarios/fire_drill.ron");

    #[test]
    fn test_parse_bundled_scenario() {
        let scenario = Scenario::from_ron_str(FIRE_DRILL).unwrap();
        assert_eq!(scenario.structures.len(), 2);
        assert!(scenario
            .requests_at(0)
            .any(|s| s.request == Request::Place { structure: StructureId(1) }));
    }

    #[test]
    fn test_minimal_scenario() {
        let ron = r#"
            Scenario(
                name: "Empty",
                duration_ticks: 10,
                structures: [(position: (0.0, 0.0, 0.0), decoration: 0)],
            )
        "#;
        let scenario = Scenario::from_ron_str(ron).unwrap();
        assert!(scenario.items.is_empty());
        assert!(scenario.script.is_empty());
        assert_eq!(scenario.structures[0].pose(), Pose::default());
    }

    #[test]
    fn test_script_past_duration_rejected() {
        let ron = r#"
            Scenario(
                name: "Late",
                duration_ticks: 5,
                structures: [],
                script: [(tick: 5, request: Ignite(structure: StructureId(1)))],
            )
        "#;
        assert!(matches!(
            Scenario::from_ron_str(ron),
            Err(ScenarioError::Invalid(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Scenario::load("does/not/exist.ron"),
            Err(ScenarioError::FileNotFound(_))
        ));
    }
}
