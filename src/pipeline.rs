//! Per-frame alignment state and the inference throttle.

use anyhow::Result;
use log::{debug, info, warn};
use std::time::Duration;
use tokio::time::Instant;

use crate::config::{Config, GarmentEntry};
use crate::error::ConfigError;
use crate::mapping::Dimensions;
use crate::overlay::{OverlaySink, Transform};
use crate::pose::Keypoint;
use crate::tracker::{
    GateFailure, KeypointFilter, SolveOutcome, TorsoAnchor, TorsoEstimator, TrackedKeypoint,
    TransformSolver,
};

/// What one processed frame did.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    /// Torso gate passed this frame
    pub detected: bool,
    pub anchor: TorsoAnchor,
    pub outcome: SolveOutcome,
    /// Transform after the frame (unchanged when not detected)
    pub transform: Transform,
}

/// All mutable state the overlay loop carries between frames.
///
/// Owned by the loop and passed explicitly; nothing here touches a renderer
/// except through [`OverlaySink`].
pub struct OverlayContext {
    filter: KeypointFilter,
    estimator: TorsoEstimator,
    solver: TransformSolver,
    tracked: Vec<TrackedKeypoint>,
    anchor: TorsoAnchor,
    detected: bool,
    garments: Vec<GarmentEntry>,
    selected: Option<usize>,
    last_applied: Option<(usize, Transform)>,
}

impl OverlayContext {
    /// Fails when `config` does not pass [`Config::validate`].
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            filter: KeypointFilter::from_config(&config.filter),
            estimator: TorsoEstimator::from_config(&config.torso),
            solver: TransformSolver::from_config(&config.solver),
            tracked: Vec::new(),
            anchor: TorsoAnchor::invalid(),
            detected: false,
            garments: config.garments.clone(),
            selected: None,
            last_applied: None,
        })
    }

    /// Run one frame of detections through filter, gate and solver.
    ///
    /// `source` is the pixel space the keypoints are in, `target` the
    /// render viewport; both are taken fresh for every frame.
    pub fn process(&mut self, keypoints: &[Keypoint], source: Dimensions, target: Dimensions) -> FrameReport {
        self.tracked = self.filter.apply(keypoints, &self.tracked);

        let anchor = match self.estimator.try_estimate(&self.tracked) {
            Ok(anchor) => anchor,
            Err(failure) => {
                if self.detected {
                    match failure {
                        GateFailure::Missing(part) => info!("[track] lost: {} missing", part.name()),
                        GateFailure::LowConfidence { part, score } => {
                            info!("[track] lost: {} score {:.2}", part.name(), score)
                        }
                    }
                }
                TorsoAnchor::invalid()
            }
        };

        let outcome = self.solver.update(&anchor, source, target);
        let detected = matches!(outcome, SolveOutcome::Updated(_));
        if detected && !self.detected {
            info!(
                "[track] locked: width={:.0}px height={:.0}px",
                anchor.shoulder_width, anchor.torso_height
            );
        }
        if let SolveOutcome::Held(reason) = outcome {
            debug!("[track] holding transform: {:?}", reason);
        }
        self.detected = detected;
        self.anchor = anchor;

        FrameReport {
            detected,
            anchor,
            outcome,
            transform: self.solver.current(),
        }
    }

    pub fn transform(&self) -> Transform {
        self.solver.current()
    }

    /// Whether the most recent frame passed the torso gate
    pub fn is_detected(&self) -> bool {
        self.detected
    }

    pub fn tracked(&self) -> &[TrackedKeypoint] {
        &self.tracked
    }

    /// Anchor from the most recent frame; invalid when the gate failed
    pub fn anchor(&self) -> TorsoAnchor {
        self.anchor
    }

    pub fn garments(&self) -> &[GarmentEntry] {
        &self.garments
    }

    pub fn selected_garment(&self) -> Option<&GarmentEntry> {
        self.selected.map(|i| &self.garments[i])
    }

    /// Switch garments. Returns false for an unknown id.
    pub fn select_garment(&mut self, id: &str) -> bool {
        match self.garments.iter().position(|g| g.id == id) {
            Some(index) => {
                if self.selected != Some(index) {
                    info!("[garment] selected {}", id);
                }
                self.selected = Some(index);
                true
            }
            None => {
                warn!("[garment] unknown id {:?}", id);
                false
            }
        }
    }

    pub fn clear_garment(&mut self) {
        self.selected = None;
        self.last_applied = None;
    }

    /// Drop tracking state and return the transform to its initial value.
    pub fn reset_tracking(&mut self) {
        self.tracked.clear();
        self.anchor = TorsoAnchor::invalid();
        self.solver.reset();
        self.detected = false;
    }

    /// Hand the transform to the sink if it or the garment changed since the
    /// last successful apply. Returns whether the sink was called.
    pub fn push_to_sink(&mut self, sink: &mut dyn OverlaySink) -> Result<bool> {
        let Some(index) = self.selected else {
            return Ok(false);
        };
        let transform = self.solver.current();
        if self.last_applied == Some((index, transform)) {
            return Ok(false);
        }
        if !transform.is_finite() || transform.scale <= 0.0 {
            warn!("[sink] refusing invalid transform {:?}", transform);
            return Ok(false);
        }
        sink.apply(&self.garments[index], &transform)?;
        self.last_applied = Some((index, transform));
        Ok(true)
    }
}

/// Throttle for inference requests: at most one in flight, and no new
/// request until `min_interval` has passed since the previous one.
#[derive(Debug)]
pub struct InferenceGate {
    min_interval: Duration,
    last_request: Option<Instant>,
    in_flight: bool,
}

impl InferenceGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: None,
            in_flight: false,
        }
    }

    pub fn may_request(&self, now: Instant) -> bool {
        !self.in_flight
            && self
                .last_request
                .map_or(true, |t| now.duration_since(t) >= self.min_interval)
    }

    pub fn begin(&mut self, now: Instant) {
        self.in_flight = true;
        self.last_request = Some(now);
    }

    pub fn finish(&mut self) {
        self.in_flight = false;
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::BodyPart;

    const SOURCE: Dimensions = Dimensions { width: 640.0, height: 480.0 };
    const TARGET: Dimensions = Dimensions { width: 1280.0, height: 720.0 };

    fn torso(score: f32) -> Vec<Keypoint> {
        vec![
            Keypoint::new(BodyPart::LeftShoulder, 100.0, 50.0, score),
            Keypoint::new(BodyPart::RightShoulder, 200.0, 50.0, score),
            Keypoint::new(BodyPart::LeftHip, 110.0, 150.0, score),
            Keypoint::new(BodyPart::RightHip, 190.0, 150.0, score),
        ]
    }

    struct RecordingSink {
        applied: Vec<(String, Transform)>,
        fail: bool,
    }

    impl OverlaySink for RecordingSink {
        fn viewport(&self) -> Dimensions {
            TARGET
        }

        fn apply(&mut self, garment: &GarmentEntry, transform: &Transform) -> Result<()> {
            if self.fail {
                anyhow::bail!("renderer went away");
            }
            self.applied.push((garment.id.clone(), *transform));
            Ok(())
        }
    }

    fn sink() -> RecordingSink {
        RecordingSink { applied: Vec::new(), fail: false }
    }

    #[test]
    fn test_scenario_valid_frame() {
        let mut ctx = OverlayContext::new(&Config::default()).unwrap();
        let report = ctx.process(&torso(0.9), SOURCE, TARGET);
        assert!(report.detected);
        assert!(report.anchor.is_valid);
        assert_eq!(report.anchor.shoulder_width, 100.0);
        assert_eq!(report.anchor.torso_height, 100.0);
        assert!(report.transform.position.x.abs() <= 640.0);
        assert!(report.transform.position.y.abs() <= 360.0);
        assert!(ctx.is_detected());
    }

    #[test]
    fn test_freeze_on_low_confidence() {
        let mut ctx = OverlayContext::new(&Config::default()).unwrap();
        ctx.process(&torso(0.9), SOURCE, TARGET);
        let before = ctx.transform();

        let mut frame = torso(0.9);
        frame[1].score = 0.3;
        let report = ctx.process(&frame, SOURCE, TARGET);
        assert!(!report.detected);
        assert!(!report.anchor.is_valid);
        assert_eq!(report.transform, before);
        assert_eq!(ctx.transform(), before);
        assert!(!ctx.is_detected());
    }

    #[test]
    fn test_freeze_when_all_parts_below_floor() {
        let mut ctx = OverlayContext::new(&Config::default()).unwrap();
        ctx.process(&torso(0.9), SOURCE, TARGET);
        ctx.process(&torso(0.9), SOURCE, TARGET);
        let before = ctx.transform();
        ctx.process(&torso(0.2), SOURCE, TARGET);
        assert_eq!(ctx.transform(), before);
    }

    #[test]
    fn test_empty_frame_holds() {
        let mut ctx = OverlayContext::new(&Config::default()).unwrap();
        let before = ctx.transform();
        let report = ctx.process(&[], SOURCE, TARGET);
        assert!(!report.detected);
        assert_eq!(report.transform, before);
        assert!(ctx.tracked().is_empty());
    }

    #[test]
    fn test_sink_only_driven_with_garment_selected() {
        let mut ctx = OverlayContext::new(&Config::default()).unwrap();
        let mut sink = sink();
        ctx.process(&torso(0.9), SOURCE, TARGET);
        assert!(!ctx.push_to_sink(&mut sink).unwrap());

        assert!(ctx.select_garment("model-2"));
        assert!(ctx.push_to_sink(&mut sink).unwrap());
        assert_eq!(sink.applied.len(), 1);
        assert_eq!(sink.applied[0].0, "model-2");
    }

    #[test]
    fn test_sink_skips_unchanged_transform() {
        let mut ctx = OverlayContext::new(&Config::default()).unwrap();
        let mut sink = sink();
        ctx.select_garment("model-1");
        ctx.process(&torso(0.9), SOURCE, TARGET);
        assert!(ctx.push_to_sink(&mut sink).unwrap());

        // Lost frame: transform frozen, nothing new to send
        ctx.process(&[], SOURCE, TARGET);
        assert!(!ctx.push_to_sink(&mut sink).unwrap());

        // Switching garment re-applies the same transform
        ctx.select_garment("model-3");
        assert!(ctx.push_to_sink(&mut sink).unwrap());
        assert_eq!(sink.applied[0].1, sink.applied[1].1);
    }

    #[test]
    fn test_sink_failure_is_retried() {
        let mut ctx = OverlayContext::new(&Config::default()).unwrap();
        let mut failing = RecordingSink { applied: Vec::new(), fail: true };
        ctx.select_garment("model-1");
        ctx.process(&torso(0.9), SOURCE, TARGET);
        assert!(ctx.push_to_sink(&mut failing).is_err());

        failing.fail = false;
        assert!(ctx.push_to_sink(&mut failing).unwrap());
    }

    #[test]
    fn test_unknown_garment() {
        let mut ctx = OverlayContext::new(&Config::default()).unwrap();
        assert!(!ctx.select_garment("ballgown"));
        assert!(ctx.selected_garment().is_none());
    }

    #[test]
    fn test_reset_tracking() {
        let mut ctx = OverlayContext::new(&Config::default()).unwrap();
        let initial = ctx.transform();
        ctx.process(&torso(0.9), SOURCE, TARGET);
        assert_ne!(ctx.transform(), initial);
        ctx.reset_tracking();
        assert_eq!(ctx.transform(), initial);
        assert!(ctx.tracked().is_empty());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = Config::default();
        config.solver.min_scale = 2.0;
        config.solver.max_scale = 1.0;
        assert!(matches!(OverlayContext::new(&config), Err(ConfigError::ScaleBounds { .. })));

        let mut config = Config::default();
        config.solver.max_scale = f32::NAN;
        assert!(OverlayContext::new(&config).is_err());

        let mut config = Config::default();
        config.schedule.refresh_hz = f64::INFINITY;
        assert!(matches!(OverlayContext::new(&config), Err(ConfigError::NotPositive { .. })));
    }

    #[test]
    fn test_gate_throttles_and_guards() {
        let start = Instant::now();
        let mut gate = InferenceGate::new(Duration::from_millis(100));
        assert!(gate.may_request(start));

        gate.begin(start);
        assert!(gate.in_flight());
        assert!(!gate.may_request(start + Duration::from_millis(500)));

        gate.finish();
        assert!(!gate.may_request(start + Duration::from_millis(99)));
        assert!(gate.may_request(start + Duration::from_millis(100)));
    }
}
