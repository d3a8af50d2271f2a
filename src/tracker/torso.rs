use crate::config::TorsoConfig;
use crate::pose::{BodyPart, Point2};
use crate::tracker::filter::TrackedKeypoint;

/// Parts that must all be locked before an anchor is produced.
pub const TORSO_PARTS: [BodyPart; 4] = [
    BodyPart::LeftShoulder,
    BodyPart::RightShoulder,
    BodyPart::LeftHip,
    BodyPart::RightHip,
];

/// Torso placement for one frame, in source pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TorsoAnchor {
    pub center: Point2,
    pub shoulder_width: f32,
    pub torso_height: f32,
    pub is_valid: bool,
}

impl TorsoAnchor {
    pub fn invalid() -> Self {
        Self {
            center: Point2::default(),
            shoulder_width: 0.0,
            torso_height: 0.0,
            is_valid: false,
        }
    }
}

/// Why a frame produced no anchor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateFailure {
    /// Not in the tracked set, or only carried forward from an earlier frame
    Missing(BodyPart),
    LowConfidence { part: BodyPart, score: f32 },
}

pub struct TorsoEstimator {
    confidence_floor: f32,
}

impl TorsoEstimator {
    pub fn new(confidence_floor: f32) -> Self {
        Self { confidence_floor }
    }

    pub fn from_config(config: &TorsoConfig) -> Self {
        Self::new(config.confidence_floor)
    }

    /// Locate the four torso parts, failing on the first one that is absent,
    /// stale, or not strictly above the floor.
    ///
    /// Gates on the raw detection score of the current frame; smoothing only
    /// touches positions.
    pub fn gate<'a>(
        &self,
        tracked: &'a [TrackedKeypoint],
    ) -> Result<[&'a TrackedKeypoint; 4], GateFailure> {
        let [ls, rs, lh, rh] = TORSO_PARTS;
        Ok([
            self.locate(tracked, ls)?,
            self.locate(tracked, rs)?,
            self.locate(tracked, lh)?,
            self.locate(tracked, rh)?,
        ])
    }

    fn locate<'a>(
        &self,
        tracked: &'a [TrackedKeypoint],
        part: BodyPart,
    ) -> Result<&'a TrackedKeypoint, GateFailure> {
        let kp = tracked
            .iter()
            .find(|t| t.part() == part && t.is_current())
            .ok_or(GateFailure::Missing(part))?;
        if kp.score() > self.confidence_floor {
            Ok(kp)
        } else {
            Err(GateFailure::LowConfidence {
                part,
                score: kp.score(),
            })
        }
    }

    /// Anchor for this frame, or the reason the gate failed.
    pub fn try_estimate(&self, tracked: &[TrackedKeypoint]) -> Result<TorsoAnchor, GateFailure> {
        self.gate(tracked).map(anchor_from_parts)
    }

    pub fn estimate(&self, tracked: &[TrackedKeypoint]) -> TorsoAnchor {
        self.try_estimate(tracked).unwrap_or_else(|_| TorsoAnchor::invalid())
    }
}

fn anchor_from_parts([ls, rs, lh, rh]: [&TrackedKeypoint; 4]) -> TorsoAnchor {
    let mid_shoulder = Point2::midpoint(ls.smoothed, rs.smoothed);
    let mid_hip = Point2::midpoint(lh.smoothed, rh.smoothed);
    TorsoAnchor {
        center: Point2::midpoint(mid_shoulder, mid_hip),
        shoulder_width: (ls.smoothed.x - rs.smoothed.x).abs(),
        torso_height: (mid_hip.y - mid_shoulder.y).abs(),
        is_valid: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::Keypoint;
    use crate::tracker::filter::KeypointFilter;

    fn tracked(frame: &[Keypoint]) -> Vec<TrackedKeypoint> {
        KeypointFilter::new(0.0, 0.5).apply(frame, &[])
    }

    fn torso_frame(score: f32) -> Vec<Keypoint> {
        vec![
            Keypoint::new(BodyPart::LeftShoulder, 100.0, 50.0, score),
            Keypoint::new(BodyPart::RightShoulder, 200.0, 50.0, score),
            Keypoint::new(BodyPart::LeftHip, 110.0, 150.0, score),
            Keypoint::new(BodyPart::RightHip, 190.0, 150.0, score),
        ]
    }

    #[test]
    fn test_anchor_geometry() {
        let anchor = TorsoEstimator::new(0.5).estimate(&tracked(&torso_frame(0.9)));
        assert!(anchor.is_valid);
        assert_eq!(anchor.shoulder_width, 100.0);
        assert_eq!(anchor.torso_height, 100.0);
        assert_eq!(anchor.center, Point2::new(150.0, 100.0));
    }

    #[test]
    fn test_one_low_part_invalidates() {
        let mut frame = torso_frame(0.9);
        frame[2].score = 0.3;
        let set = tracked(&frame);
        let estimator = TorsoEstimator::new(0.5);
        assert!(!estimator.estimate(&set).is_valid);
        assert_eq!(
            estimator.gate(&set).unwrap_err(),
            GateFailure::LowConfidence { part: BodyPart::LeftHip, score: 0.3 }
        );
    }

    #[test]
    fn test_floor_is_exclusive() {
        let anchor = TorsoEstimator::new(0.5).estimate(&tracked(&torso_frame(0.5)));
        assert!(!anchor.is_valid);
    }

    #[test]
    fn test_missing_part_invalidates() {
        let frame = torso_frame(0.9);
        let set = tracked(&frame[..3]);
        let estimator = TorsoEstimator::new(0.5);
        assert_eq!(
            estimator.gate(&set).unwrap_err(),
            GateFailure::Missing(BodyPart::RightHip)
        );
        assert_eq!(estimator.estimate(&set), TorsoAnchor::invalid());
    }

    #[test]
    fn test_stale_part_is_not_present() {
        let filter = KeypointFilter::new(0.5, 0.5).with_max_missed_frames(1);
        let first = filter.apply(&torso_frame(0.9), &[]);
        let frame = torso_frame(0.9);
        let second = filter.apply(&frame[..3], &first);
        assert_eq!(second.len(), 4);
        assert!(!TorsoEstimator::new(0.5).estimate(&second).is_valid);
    }

    #[test]
    fn test_uses_smoothed_positions() {
        let filter = KeypointFilter::new(0.5, 0.5);
        let first = filter.apply(&torso_frame(0.9), &[]);
        let mut moved = torso_frame(0.9);
        for kp in &mut moved {
            kp.position.x += 20.0;
        }
        let second = filter.apply(&moved, &first);
        let anchor = TorsoEstimator::new(0.5).estimate(&second);
        assert_eq!(anchor.center, Point2::new(160.0, 100.0));
    }

    #[test]
    fn test_mirrored_shoulders_give_positive_width() {
        let frame = vec![
            Keypoint::new(BodyPart::LeftShoulder, 200.0, 60.0, 0.9),
            Keypoint::new(BodyPart::RightShoulder, 100.0, 40.0, 0.9),
            Keypoint::new(BodyPart::LeftHip, 190.0, 150.0, 0.9),
            Keypoint::new(BodyPart::RightHip, 110.0, 150.0, 0.9),
        ];
        let anchor = TorsoEstimator::new(0.5).estimate(&tracked(&frame));
        assert_eq!(anchor.shoulder_width, 100.0);
        assert_eq!(anchor.torso_height, 100.0);
    }
}
