//! Squeeze gesture: geometry, press detection and item deformation.
//!
//! Two grips close in on the items in a factory. The ratio of their current
//! separation to the separation when the gesture started drives both the
//! visual squash and the discrete "press" events that consume items.

use serde::{Deserialize, Serialize};

use crate::config::SqueezeConfig;
use crate::math::{Mat3, Vec3, EPSILON};

/// Smallest baseline separation accepted.
pub const MIN_BASELINE: f32 = 1e-4;

/// Positions of the two grips.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SqueezeSample {
    /// First grip.
    pub grip_a: Vec3,
    /// Second grip.
    pub grip_b: Vec3,
}

impl SqueezeSample {
    /// Distance between the grips.
    #[must_use]
    pub fn separation(&self) -> f32 {
        self.grip_a.distance(self.grip_b)
    }

    /// Unit squeeze axis (from `grip_b` toward `grip_a`).
    #[must_use]
    pub fn axis(&self) -> Option<Vec3> {
        (self.grip_a - self.grip_b).try_normalize()
    }
}

/// Normalized squeeze measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SqueezeReading {
    /// Clamped separation / baseline.
    pub ratio: f32,
    /// Unit squeeze axis, if the grips are not coincident.
    pub axis: Option<Vec3>,
}

/// Tracks the baseline separation of one gesture.
#[derive(Debug, Clone)]
pub struct SqueezeGauge {
    min_ratio: f32,
    max_ratio: f32,
    baseline: Option<f32>,
}

impl SqueezeGauge {
    /// Gauge clamping to `[min_ratio, max_ratio]`.
    #[must_use]
    pub fn new(config: &SqueezeConfig) -> Self {
        Self {
            min_ratio: config.min_ratio,
            max_ratio: config.max_ratio,
            baseline: None,
        }
    }

    /// Measure a sample. The first sample after a release sets the baseline.
    pub fn measure(&mut self, sample: &SqueezeSample) -> SqueezeReading {
        let separation = sample.separation();
        let baseline = *self
            .baseline
            .get_or_insert_with(|| separation.max(MIN_BASELINE));

        let ratio = (separation / baseline).clamp(self.min_ratio, self.max_ratio);
        SqueezeReading {
            ratio,
            axis: sample.axis(),
        }
    }

    /// End the gesture; the next sample starts a new one.
    pub fn release(&mut self) {
        self.baseline = None;
    }

    /// Baseline of the current gesture.
    #[must_use]
    pub fn baseline(&self) -> Option<f32> {
        self.baseline
    }
}

/// Counts presses with hysteresis and reports when an item is used up.
#[derive(Debug, Clone)]
pub struct PressTrigger {
    threshold: f32,
    hysteresis: f32,
    presses_per_item: u32,
    pressed: bool,
    presses: u32,
}

impl PressTrigger {
    /// Trigger from squeeze tuning.
    #[must_use]
    pub fn new(config: &SqueezeConfig) -> Self {
        Self {
            threshold: config.threshold,
            hysteresis: config.hysteresis,
            presses_per_item: config.presses_per_item.max(1),
            pressed: false,
            presses: 0,
        }
    }

    /// Feed a ratio. Returns `true` when enough presses consumed one item.
    pub fn update(&mut self, ratio: f32) -> bool {
        if !self.pressed && ratio <= self.threshold {
            self.pressed = true;
            self.presses += 1;
            tracing::trace!(presses = self.presses, "squeeze press");
            if self.presses >= self.presses_per_item {
                self.presses = 0;
                return true;
            }
        } else if self.pressed && ratio > self.threshold + self.hysteresis {
            self.pressed = false;
        }
        false
    }

    /// Re-arm after the grips were let go. Counted presses are kept.
    pub fn release(&mut self) {
        self.pressed = false;
    }

    /// Presses counted toward the next item.
    #[must_use]
    pub const fn presses(&self) -> u32 {
        self.presses
    }
}

/// Orthonormal basis whose third column is `axis`.
fn squeeze_basis(axis: Vec3) -> Option<Mat3> {
    let helper = if axis.dot(Vec3::UP).abs() > 0.9 {
        Vec3::RIGHT
    } else {
        Vec3::UP
    };
    let x = helper.cross(axis).try_normalize()?;
    let y = axis.cross(x);
    Some(Mat3::from_cols(x, y, axis))
}

/// Target scale of an item with `base_scale` squeezed along `axis`.
///
/// The axis is scaled by `ratio`; with `compensation > 0` both orthogonal
/// directions grow by `ratio^-compensation` to roughly keep the volume.
#[must_use]
pub fn target_scale(base_scale: Vec3, axis: Vec3, ratio: f32, compensation: f32) -> Vec3 {
    let Some(basis) = axis.try_normalize().and_then(squeeze_basis) else {
        return base_scale;
    };
    let ratio = ratio.max(EPSILON);
    let side = if compensation > 0.0 {
        (1.0 / ratio).powf(compensation)
    } else {
        1.0
    };

    let scale = Mat3::from_diagonal(Vec3::new(side, side, ratio));
    let world = basis.mul_mat(&scale).mul_mat(&basis.transpose());
    base_scale.scale(world.column_lengths())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(separation: f32) -> SqueezeSample {
        SqueezeSample {
            grip_a: Vec3::new(0.0, 0.0, separation),
            grip_b: Vec3::ZERO,
        }
    }

    #[test]
    fn test_first_sample_sets_baseline() {
        let mut gauge = SqueezeGauge::new(&SqueezeConfig::default());
        assert_eq!(gauge.measure(&sample(0.4)).ratio, 1.0);
        assert_eq!(gauge.baseline(), Some(0.4));
        assert!((gauge.measure(&sample(0.3)).ratio - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_ratio_is_clamped() {
        let mut gauge = SqueezeGauge::new(&SqueezeConfig::default());
        gauge.measure(&sample(1.0));
        assert_eq!(gauge.measure(&sample(0.01)).ratio, 0.25);
        assert_eq!(gauge.measure(&sample(3.0)).ratio, 1.0);
    }

    #[test]
    fn test_degenerate_baseline() {
        let mut gauge = SqueezeGauge::new(&SqueezeConfig::default());
        let reading = gauge.measure(&sample(0.0));
        assert_eq!(gauge.baseline(), Some(MIN_BASELINE));
        assert!(reading.axis.is_none());
    }

    #[test]
    fn test_release_resets_baseline() {
        let mut gauge = SqueezeGauge::new(&SqueezeConfig::default());
        gauge.measure(&sample(1.0));
        gauge.release();
        assert!(gauge.baseline().is_none());
        gauge.measure(&sample(0.5));
        assert_eq!(gauge.baseline(), Some(0.5));
    }

    #[test]
    fn test_trigger_counts_presses_with_hysteresis() {
        let mut trigger = PressTrigger::new(&SqueezeConfig::default());

        // Hovering around the threshold counts once.
        assert!(!trigger.update(0.7));
        assert!(!trigger.update(0.805));
        assert!(!trigger.update(0.7));
        assert_eq!(trigger.presses(), 1);

        // Re-arm above threshold + hysteresis.
        assert!(!trigger.update(0.9));
        assert!(!trigger.update(0.7));
        assert!(!trigger.update(0.9));
        assert!(trigger.update(0.7));
        assert_eq!(trigger.presses(), 0);
    }

    #[test]
    fn test_target_scale_squashes_axis() {
        let scale = target_scale(Vec3::ONE, Vec3::FORWARD, 0.25, 0.5);
        assert!((scale.z - 0.25).abs() < 1e-5);
        assert!((scale.x - 2.0).abs() < 1e-5);
        assert!((scale.y - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_target_scale_without_compensation() {
        let scale = target_scale(Vec3::new(2.0, 2.0, 2.0), Vec3::UP, 0.5, 0.0);
        assert!((scale.y - 1.0).abs() < 1e-5);
        assert!((scale.x - 2.0).abs() < 1e-5);
    }
}
