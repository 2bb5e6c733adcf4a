// Copyright (C) 2023, Alex Badics
// This file is part of ar-scene
// Licensed under the MIT license. See LICENSE file in the project root for details.

//!
//! PoseSmoother is a tiny state machine that suppresses tracker jitter.
//!
//! Every frame the raw marker pose is compared to the last emitted pose:
//!
//! (
//!     assuming:
//!     S- = last emitted pose
//!     ~S = raw tracker pose
//!     d = difference(S-, ~S)
//!     j = |d.q.x + d.q.y + d.q.z|, the jitter magnitude
//! )
//!
//! S = ~S                                      if j <= threshold
//! S = (slerp(S-.q, ~S.q, alpha), ~S.p)        if j > threshold, for at most `max_steps` frames
//!
//! this implies:
//!
//! - only the orientation is smoothed, the position always follows the tracker
//! - a real fast motion is only delayed for a bounded number of frames
//! - once the cap is hit, smoothing stays off until the motion calms down, or the
//!   marker disappears for longer than `reset_after_hidden` frames
//!
//! The jitter heuristic sums the signed vector part of the delta quaternion. It is not
//! a proper distance (rotations around mixed axes can cancel out), but it is what
//! the rest of the engine was tuned with.
//!

use tracing::warn;

use crate::Pose;

/// Tunables of [`PoseSmoother`]. The defaults are the engine's tuned values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmootherConfig {
    /// Smoothing history is dropped after the marker was hidden for more frames than this
    pub reset_after_hidden: u32,
    /// Jitter magnitude above which the pose gets blended
    pub jitter_threshold: f32,
    /// Maximum number of consecutive blended frames
    pub max_steps: u32,
    /// Slerp factor towards the raw orientation
    pub blend_factor: f32,
}

impl Default for SmootherConfig {
    fn default() -> Self {
        Self {
            reset_after_hidden: 3,
            jitter_threshold: 0.06,
            max_steps: 10,
            blend_factor: 0.1,
        }
    }
}

/// State of a single marker after the last [`PoseSmoother::resolve`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SmoothingState {
    /// Marker not visible
    #[default]
    Hidden,
    /// Marker visible, raw pose emitted
    VisibleStable,
    /// Marker visible, blended pose emitted
    VisibleSmoothing,
}

impl SmoothingState {
    /// `true` for both visible states
    pub fn is_visible(self) -> bool {
        self != SmoothingState::Hidden
    }
}

/// Per-marker visibility gate and jitter filter
#[derive(Debug, Clone)]
pub struct PoseSmoother {
    config: SmootherConfig,
    lerping: bool,
    state: SmoothingState,
    /// Last emitted pose. `None` before the first sighting and after a long absence.
    anchor: Option<Pose>,
    hidden_frames: u32,
    smoothing_steps: u32,
}

impl PoseSmoother {
    /// Create a smoother with the default tunables. With `lerping == false`
    /// the raw pose is always passed through.
    pub fn new(lerping: bool) -> Self {
        Self::with_config(lerping, SmootherConfig::default())
    }

    /// Create a smoother with custom tunables
    pub fn with_config(lerping: bool, config: SmootherConfig) -> Self {
        Self {
            config,
            lerping,
            state: SmoothingState::Hidden,
            anchor: None,
            hidden_frames: 0,
            smoothing_steps: 0,
        }
    }

    /// Feed one tracker sample. Returns the pose to display, or `None` if the
    /// marker is hidden this frame.
    ///
    /// A visible sample with a non-finite pose is rejected: the smoother
    /// keeps its previous state and `None` is returned with a warning. Callers
    /// should then keep showing whatever they showed last frame.
    pub fn resolve(&mut self, raw_visible: bool, raw_pose: &Pose) -> Option<Pose> {
        if raw_visible && !raw_pose.is_finite() {
            warn!("Rejecting non-finite marker pose: {}", raw_pose);
            return None;
        }
        if !raw_visible {
            self.update_hidden();
            return None;
        }
        self.hidden_frames = 0;

        if !self.lerping {
            self.state = SmoothingState::VisibleStable;
            self.anchor = Some(*raw_pose);
            return Some(*raw_pose);
        }

        let resolved = match self.anchor {
            None => {
                self.smoothing_steps = 0;
                self.state = SmoothingState::VisibleStable;
                *raw_pose
            }
            Some(anchor) => {
                let jitter = Self::jitter_magnitude(&anchor, raw_pose);
                if jitter > self.config.jitter_threshold {
                    if self.smoothing_steps < self.config.max_steps {
                        self.smoothing_steps += 1;
                        self.state = SmoothingState::VisibleSmoothing;
                        Pose::new(
                            raw_pose.position,
                            anchor
                                .interpolate(raw_pose, self.config.blend_factor)
                                .orientation,
                        )
                    } else {
                        // Sustained motion, let it through at full rate
                        self.state = SmoothingState::VisibleStable;
                        *raw_pose
                    }
                } else {
                    self.smoothing_steps = 0;
                    self.state = SmoothingState::VisibleStable;
                    *raw_pose
                }
            }
        };
        self.anchor = Some(resolved);
        Some(resolved)
    }

    fn update_hidden(&mut self) {
        self.state = SmoothingState::Hidden;
        self.hidden_frames = self.hidden_frames.saturating_add(1);
        if self.hidden_frames > self.config.reset_after_hidden {
            self.smoothing_steps = 0;
            self.anchor = None;
        }
    }

    /// `|x + y + z|` of the vector part of the rotation between two poses
    pub fn jitter_magnitude(from: &Pose, to: &Pose) -> f32 {
        let imag = from.difference(to).orientation.imag();
        (imag.x + imag.y + imag.z).abs()
    }

    /// State after the last sample
    pub fn state(&self) -> SmoothingState {
        self.state
    }

    /// Number of consecutive blended frames emitted
    pub fn smoothing_steps(&self) -> u32 {
        self.smoothing_steps
    }

    /// Number of consecutive frames the marker was not seen
    pub fn hidden_frames(&self) -> u32 {
        self.hidden_frames
    }

    /// Whether smoothing is enabled at all
    pub fn lerping(&self) -> bool {
        self.lerping
    }

    /// Enable or disable smoothing. Disabling also drops the smoothing history.
    pub fn set_lerping(&mut self, lerping: bool) {
        if !lerping {
            self.smoothing_steps = 0;
        }
        self.lerping = lerping;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{UnitQuaternion, Vector3};

    fn base() -> Pose {
        Pose::new(Vector3::new(0.0, 0.0, 500.0), UnitQuaternion::identity())
    }

    /// Rotation about the x axis with a given jitter magnitude relative to `base()`
    fn rotated(jitter: f32) -> Pose {
        // vector part x component of a rotation by `angle` is sin(angle / 2)
        let angle = 2.0 * jitter.asin();
        Pose::new(
            Vector3::new(1.0, 2.0, 498.0),
            UnitQuaternion::from_euler_angles(angle, 0.0, 0.0),
        )
    }

    #[test]
    fn jitter_of_test_poses() {
        assert_relative_eq!(
            PoseSmoother::jitter_magnitude(&base(), &rotated(0.1)),
            0.1,
            epsilon = 1e-5
        );
    }

    #[test]
    fn first_sighting_is_raw() {
        let mut smoother = PoseSmoother::new(true);
        let raw = rotated(0.5);
        assert_eq!(smoother.resolve(true, &raw), Some(raw));
        assert_eq!(smoother.state(), SmoothingState::VisibleStable);
    }

    #[test]
    fn large_jitter_is_blended() {
        let mut smoother = PoseSmoother::new(true);
        smoother.resolve(true, &base());
        let raw = rotated(0.1);
        let resolved = smoother.resolve(true, &raw).unwrap();
        assert_eq!(smoother.state(), SmoothingState::VisibleSmoothing);
        assert_eq!(smoother.smoothing_steps(), 1);
        assert_eq!(resolved.position, raw.position);
        assert_relative_eq!(
            resolved.orientation,
            base().orientation.slerp(&raw.orientation, 0.1),
            epsilon = 1e-5
        );
    }

    #[test]
    fn small_jitter_passes_and_resets() {
        let mut smoother = PoseSmoother::new(true);
        smoother.resolve(true, &base());
        smoother.resolve(true, &rotated(0.1));
        assert_eq!(smoother.smoothing_steps(), 1);

        let raw = smoother.anchor.unwrap().compose(&Pose::new(
            Vector3::new(0.5, 0.0, 0.0),
            UnitQuaternion::from_euler_angles(2.0 * 0.02f32.asin(), 0.0, 0.0),
        ));
        assert_eq!(smoother.resolve(true, &raw), Some(raw));
        assert_eq!(smoother.state(), SmoothingState::VisibleStable);
        assert_eq!(smoother.smoothing_steps(), 0);
    }

    #[test]
    fn disabled_lerping_is_verbatim() {
        let mut smoother = PoseSmoother::new(false);
        smoother.resolve(true, &base());
        for jitter in [0.1, 0.5, 0.9] {
            let raw = rotated(jitter);
            assert_eq!(smoother.resolve(true, &raw), Some(raw));
            assert_eq!(smoother.smoothing_steps(), 0);
        }
    }

    #[test]
    fn hidden_emits_nothing() {
        let mut smoother = PoseSmoother::new(true);
        assert_eq!(smoother.resolve(false, &base()), None);
        assert_eq!(smoother.state(), SmoothingState::Hidden);
        assert_eq!(smoother.hidden_frames(), 1);
    }

    #[test]
    fn non_finite_pose_is_rejected_without_state_change() {
        let mut smoother = PoseSmoother::new(true);
        smoother.resolve(true, &base());
        smoother.resolve(true, &rotated(0.1));
        let mut broken = base();
        broken.position.x = f32::NAN;
        assert_eq!(smoother.resolve(true, &broken), None);
        assert_eq!(smoother.state(), SmoothingState::VisibleSmoothing);
        assert_eq!(smoother.smoothing_steps(), 1);
        assert_eq!(smoother.hidden_frames(), 0);
    }
}
