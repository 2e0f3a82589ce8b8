//! Factory placement relative to its structure.
//!
//! A structure can sit on a floor, a wall or a ceiling. Floor structures get
//! their factory beside them, facing back. Wall and ceiling structures probe
//! straight down from an offset origin and put the factory on whatever is hit.

use serde::{Deserialize, Serialize};

use crate::config::PlacementConfig;
use crate::interfaces::PlacementResolver;
use crate::math::{Pose, Vec3};
use crate::structure::Structure;

/// Kind of surface a structure was placed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Surface {
    /// Up axis roughly along world up.
    #[default]
    Floor,
    /// Up axis roughly horizontal.
    Wall,
    /// Up axis roughly along world down.
    Ceiling,
}

impl Surface {
    /// Classify from a structure's up axis.
    #[must_use]
    pub fn classify(up: Vec3) -> Self {
        let d = up.dot(Vec3::UP);
        if d < -0.7 {
            Surface::Ceiling
        } else if d < 0.7 {
            Surface::Wall
        } else {
            Surface::Floor
        }
    }
}

/// Result of a downward probe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeHit {
    /// Hit point.
    pub point: Vec3,
    /// Surface normal at the hit point.
    pub normal: Vec3,
}

/// Spatial query used by [`SurfacePlacement`].
pub trait SurfaceProbe {
    /// Cast straight down from `origin` up to `max_distance`.
    fn cast_down(&self, origin: Vec3, max_distance: f32) -> Option<ProbeHit>;
}

/// Probe against a single horizontal plane at `height`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundPlane {
    /// World height of the plane.
    pub height: f32,
}

impl SurfaceProbe for GroundPlane {
    fn cast_down(&self, origin: Vec3, max_distance: f32) -> Option<ProbeHit> {
        let drop = origin.y - self.height;
        if drop < 0.0 || drop > max_distance {
            return None;
        }
        Some(ProbeHit {
            point: Vec3::new(origin.x, self.height, origin.z),
            normal: Vec3::UP,
        })
    }
}

/// Default placement resolver, driven by the structure's surface.
#[derive(Debug, Clone)]
pub struct SurfacePlacement<P> {
    probe: P,
    config: PlacementConfig,
}

impl<P: SurfaceProbe> SurfacePlacement<P> {
    /// Create a resolver using `probe` for wall and ceiling structures.
    #[must_use]
    pub fn new(probe: P, config: PlacementConfig) -> Self {
        Self { probe, config }
    }

    fn floor_pose(&self, pose: &Pose) -> Option<Pose> {
        let side = pose.right();
        let position = pose.position
            + side * self.config.floor_side_distance
            + Vec3::UP * self.config.floor_up_offset;
        Pose::look_rotation(position, -side, Vec3::UP)
    }

    fn probe_pose(&self, pose: &Pose, origin: Vec3) -> Option<Pose> {
        let hit = self.probe.cast_down(origin, self.config.probe_distance)?;
        let up = hit.normal.try_normalize()?;

        let forward = pose
            .forward
            .project_on_plane(up)
            .try_normalize()
            .or_else(|| pose.right().project_on_plane(up).try_normalize())?;

        let position = hit.point + Vec3::UP * self.config.hit_lift;
        Pose::look_rotation(position, forward, up)
    }
}

impl<P: SurfaceProbe> PlacementResolver for SurfacePlacement<P> {
    fn try_resolve_pose(&mut self, structure: &Structure) -> Option<Pose> {
        let pose = structure.pose();
        let offset = self.config.surface_offset;

        let resolved = match structure.surface() {
            Surface::Floor => self.floor_pose(pose),
            Surface::Wall => {
                let origin = pose.position + pose.up * (offset * self.config.wall_offset_factor);
                self.probe_pose(pose, origin)
            }
            Surface::Ceiling => {
                let origin = pose.position + pose.forward * offset + pose.up * offset;
                self.probe_pose(pose, origin)
            }
        };

        if resolved.is_none() {
            tracing::debug!(
                structure = %structure.id(),
                surface = ?structure.surface(),
                "no factory pose found"
            );
        }
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{DecorationIndex, StructureId};
    use crate::wire::Outbox;

    fn approx(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-4
    }

    fn structure(pose: Pose) -> Structure {
        Structure::new(StructureId(1), pose, DecorationIndex(0), &Outbox::new())
    }

    #[test]
    fn test_classify_surface() {
        assert_eq!(Surface::classify(Vec3::UP), Surface::Floor);
        assert_eq!(Surface::classify(Vec3::FORWARD), Surface::Wall);
        assert_eq!(Surface::classify(-Vec3::UP), Surface::Ceiling);
        assert_eq!(Surface::classify(Vec3::new(0.0, 0.69, 0.72)), Surface::Wall);
    }

    #[test]
    fn test_floor_pose_beside_and_facing_back() {
        let mut placement = SurfacePlacement::new(GroundPlane { height: 0.0 }, PlacementConfig::default());
        let s = structure(Pose::at(Vec3::new(2.0, 0.0, 0.0)));
        let pose = placement.try_resolve_pose(&s).unwrap();

        // Right of an identity pose is +X.
        assert!(approx(pose.position, Vec3::new(3.0, 0.05, 0.0)));
        assert!(approx(pose.forward, -Vec3::RIGHT));
    }

    #[test]
    fn test_wall_pose_probes_down() {
        let mut placement = SurfacePlacement::new(GroundPlane { height: 0.0 }, PlacementConfig::default());
        let wall = Pose::look_rotation(Vec3::new(0.0, 1.5, 0.0), Vec3::UP, -Vec3::FORWARD).unwrap();
        let s = structure(wall);
        assert_eq!(s.surface(), Surface::Wall);

        let pose = placement.try_resolve_pose(&s).unwrap();
        assert!((pose.position.y - 0.1).abs() < 1e-4);
        assert!(approx(pose.up, Vec3::UP));
    }

    #[test]
    fn test_probe_miss_fails() {
        let mut placement = SurfacePlacement::new(GroundPlane { height: -50.0 }, PlacementConfig::default());
        let ceiling = Pose::look_rotation(Vec3::new(0.0, 3.0, 0.0), Vec3::FORWARD, -Vec3::UP).unwrap();
        let s = structure(ceiling);
        assert_eq!(s.surface(), Surface::Ceiling);
        assert!(placement.try_resolve_pose(&s).is_none());
    }
}
