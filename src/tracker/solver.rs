use crate::config::{DeviceProfile, SolverConfig};
use crate::mapping::{self, Dimensions, Vec3};
use crate::overlay::Transform;
use crate::tracker::lerp::{lerp, lerp_vec3};
use crate::tracker::torso::TorsoAnchor;

/// Result of one solver step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SolveOutcome {
    Updated(Transform),
    /// Transform left untouched
    Held(HoldReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldReason {
    /// Torso gate failed this frame
    NoAnchor,
    /// Source or target reported a zero / non-finite size
    DegenerateDimensions,
    /// The target came out NaN
    NonFinite,
}

/// Turns torso anchors into a smoothed overlay transform.
///
/// Owns the only cross-frame pose state. Frames without a valid anchor leave
/// it exactly as it was.
pub struct TransformSolver {
    config: SolverConfig,
    current: Transform,
    locked: bool,
}

impl TransformSolver {
    /// `config` must satisfy [`Config::validate`](crate::config::Config::validate):
    /// the scale and depth clamps panic on inverted or NaN bounds.
    pub fn new(config: SolverConfig) -> Self {
        let scale = config.initial_scale.clamp(config.min_scale, config.max_scale);
        Self {
            config,
            current: Transform::at_origin(scale),
            locked: false,
        }
    }

    pub fn from_config(config: &SolverConfig) -> Self {
        Self::new(config.clone())
    }

    pub fn current(&self) -> Transform {
        self.current
    }

    /// Whether any anchor has been accepted since construction or `reset`.
    pub fn has_locked(&self) -> bool {
        self.locked
    }

    pub fn reset(&mut self) {
        self.current = Transform::at_origin(
            self.config
                .initial_scale
                .clamp(self.config.min_scale, self.config.max_scale),
        );
        self.locked = false;
    }

    fn device_factor(&self) -> f32 {
        match self.config.device {
            DeviceProfile::Desktop => 1.0,
            DeviceProfile::Mobile => self.config.mobile_scale_factor,
        }
    }

    /// Body size relative to the frame, scaled and clamped into [min_scale, max_scale].
    pub fn scale_for(&self, anchor: &TorsoAnchor, source: Dimensions) -> f32 {
        let c = &self.config;
        let relative_height = anchor.torso_height / source.height;
        let relative_width = anchor.shoulder_width / source.width;
        let size = c.height_weight * relative_height + c.width_weight * relative_width;
        // NaN passes through clamp and is caught by the finiteness check in `target`
        (c.scale_calibration * self.device_factor() * size).clamp(c.min_scale, c.max_scale)
    }

    /// Depth heuristic: wider shoulders mean a closer subject, so the overlay
    /// is pushed back linearly in the relative shoulder width.
    pub fn depth_for(&self, anchor: &TorsoAnchor, source: Dimensions) -> f32 {
        let c = &self.config;
        let relative_width = anchor.shoulder_width / source.width;
        (c.z_offset - c.depth_coefficient * relative_width).clamp(c.z_min, c.z_max)
    }

    /// Unsmoothed transform for this anchor.
    pub fn target(
        &self,
        anchor: &TorsoAnchor,
        source: Dimensions,
        target: Dimensions,
    ) -> Result<Transform, HoldReason> {
        if !anchor.is_valid {
            return Err(HoldReason::NoAnchor);
        }
        if !source.is_usable() || !target.is_usable() {
            return Err(HoldReason::DegenerateDimensions);
        }
        let z = self.depth_for(anchor, source);
        let position = mapping::map_to_space(self.config.position_space, anchor.center, source, target, z)
            .ok_or(HoldReason::DegenerateDimensions)?;
        let transform = Transform::new(
            self.clamp_position(position, target),
            self.scale_for(anchor, source),
        );
        if !transform.is_finite() {
            return Err(HoldReason::NonFinite);
        }
        Ok(transform)
    }

    fn clamp_position(&self, position: Vec3, target: Dimensions) -> Vec3 {
        let (hw, hh) = mapping::space_extents(self.config.position_space, target);
        Vec3::new(
            position.x.clamp(-hw, hw),
            position.y.clamp(-hh, hh),
            position.z.clamp(self.config.z_min, self.config.z_max),
        )
    }

    /// Blend towards the anchor's target. A no-op for invalid anchors.
    pub fn update(&mut self, anchor: &TorsoAnchor, source: Dimensions, target: Dimensions) -> SolveOutcome {
        let goal = match self.target(anchor, source, target) {
            Ok(goal) => goal,
            Err(reason) => return SolveOutcome::Held(reason),
        };

        let next = if !self.locked && self.config.snap_on_first_lock {
            goal
        } else {
            let alpha = self.config.transform_alpha;
            Transform::new(
                lerp_vec3(self.current.position, goal.position, alpha),
                lerp(self.current.scale, goal.scale, alpha),
            )
        };
        // The previous transform may sit outside a viewport that just shrank
        let next = Transform::new(
            self.clamp_position(next.position, target),
            next.scale.clamp(self.config.min_scale, self.config.max_scale),
        );
        if !next.is_finite() {
            return SolveOutcome::Held(HoldReason::NonFinite);
        }

        self.current = next;
        self.locked = true;
        SolveOutcome::Updated(next)
    }
}
