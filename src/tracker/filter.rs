use std::collections::BTreeMap;

use crate::config::FilterConfig;
use crate::pose::{BodyPart, Keypoint, Point2};
use crate::tracker::lerp::lerp_point;

/// A keypoint with its temporally smoothed position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackedKeypoint {
    /// The detection this frame (or the last one, when stale)
    pub keypoint: Keypoint,
    pub smoothed: Point2,
    /// Consecutive frames the part has been missing. 0 means detected this frame.
    pub missed_frames: u32,
}

impl TrackedKeypoint {
    pub fn part(&self) -> BodyPart {
        self.keypoint.part
    }

    /// Raw detection score of the frame that produced this entry
    pub fn score(&self) -> f32 {
        self.keypoint.score
    }

    pub fn is_current(&self) -> bool {
        self.missed_frames == 0
    }
}

/// Confidence gate plus per-part exponential smoothing.
///
/// No velocity model: it only damps noise between consecutive confident
/// observations of the same part.
#[derive(Debug, Clone)]
pub struct KeypointFilter {
    confidence_threshold: f32,
    alpha: f32,
    max_missed_frames: u32,
}

impl KeypointFilter {
    pub fn new(confidence_threshold: f32, alpha: f32) -> Self {
        Self {
            confidence_threshold,
            alpha,
            max_missed_frames: 0,
        }
    }

    pub fn from_config(config: &FilterConfig) -> Self {
        Self::new(config.confidence_threshold, config.alpha)
            .with_max_missed_frames(config.max_missed_frames)
    }

    /// How long a missing part is carried forward as stale state
    pub fn with_max_missed_frames(mut self, frames: u32) -> Self {
        self.max_missed_frames = frames;
        self
    }

    /// Produce this frame's tracked set from the detections and last frame's set.
    ///
    /// Output is ordered by body part.
    pub fn apply(&self, current: &[Keypoint], previous: &[TrackedKeypoint]) -> Vec<TrackedKeypoint> {
        // Highest score wins when the model reports a part twice
        let mut accepted: BTreeMap<BodyPart, Keypoint> = BTreeMap::new();
        for kp in current.iter().filter(|kp| kp.is_valid(self.confidence_threshold)) {
            match accepted.get(&kp.part) {
                Some(existing) if existing.score >= kp.score => {}
                _ => {
                    accepted.insert(kp.part, *kp);
                }
            }
        }

        let mut out: BTreeMap<BodyPart, TrackedKeypoint> = accepted
            .into_values()
            .map(|kp| {
                let prev = previous.iter().find(|t| t.part() == kp.part);
                let smoothed = match prev {
                    Some(prev) => lerp_point(prev.smoothed, kp.position, self.alpha),
                    None => kp.position,
                };
                (
                    kp.part,
                    TrackedKeypoint {
                        keypoint: kp,
                        smoothed,
                        missed_frames: 0,
                    },
                )
            })
            .collect();

        for prev in previous {
            if out.contains_key(&prev.part()) {
                continue;
            }
            let missed = prev.missed_frames + 1;
            if missed <= self.max_missed_frames {
                out.insert(
                    prev.part(),
                    TrackedKeypoint {
                        missed_frames: missed,
                        ..*prev
                    },
                );
            }
        }

        out.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find(set: &[TrackedKeypoint], part: BodyPart) -> Option<&TrackedKeypoint> {
        set.iter().find(|t| t.part() == part)
    }

    #[test]
    fn test_drops_low_confidence() {
        let filter = KeypointFilter::new(0.5, 0.5);
        let frame = [
            Keypoint::new(BodyPart::Nose, 10.0, 10.0, 0.9),
            Keypoint::new(BodyPart::LeftEye, 12.0, 8.0, 0.49),
        ];
        let out = filter.apply(&frame, &[]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].part(), BodyPart::Nose);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let filter = KeypointFilter::new(0.5, 0.5);
        let out = filter.apply(&[Keypoint::new(BodyPart::Nose, 1.0, 1.0, 0.5)], &[]);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_new_part_passes_through() {
        let filter = KeypointFilter::new(0.5, 0.5);
        let out = filter.apply(&[Keypoint::new(BodyPart::LeftHip, 110.0, 150.0, 0.9)], &[]);
        assert_eq!(out[0].smoothed, Point2::new(110.0, 150.0));
        assert!(out[0].is_current());
    }

    #[test]
    fn test_smooths_against_previous() {
        let filter = KeypointFilter::new(0.5, 0.5);
        let first = filter.apply(&[Keypoint::new(BodyPart::Nose, 0.0, 0.0, 0.9)], &[]);
        let second = filter.apply(&[Keypoint::new(BodyPart::Nose, 10.0, 20.0, 0.8)], &first);
        assert_eq!(second[0].smoothed, Point2::new(5.0, 10.0));
        // Raw detection is kept alongside
        assert_eq!(second[0].keypoint.position, Point2::new(10.0, 20.0));
        assert_eq!(second[0].score(), 0.8);
    }

    #[test]
    fn test_order_of_detections_does_not_matter() {
        let filter = KeypointFilter::new(0.5, 0.5);
        let a = [
            Keypoint::new(BodyPart::RightHip, 1.0, 1.0, 0.9),
            Keypoint::new(BodyPart::Nose, 2.0, 2.0, 0.9),
        ];
        let b = [a[1], a[0]];
        assert_eq!(filter.apply(&a, &[]), filter.apply(&b, &[]));
    }

    #[test]
    fn test_duplicate_part_keeps_highest_score() {
        let filter = KeypointFilter::new(0.5, 0.5);
        let frame = [
            Keypoint::new(BodyPart::Nose, 1.0, 1.0, 0.6),
            Keypoint::new(BodyPart::Nose, 9.0, 9.0, 0.95),
        ];
        let out = filter.apply(&frame, &[]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].smoothed, Point2::new(9.0, 9.0));
    }

    #[test]
    fn test_rejects_non_finite_position() {
        let filter = KeypointFilter::new(0.5, 0.5);
        let out = filter.apply(&[Keypoint::new(BodyPart::Nose, f32::NAN, 1.0, 0.9)], &[]);
        assert!(out.is_empty());
    }

    #[test]
    fn test_acceptance_matches_keypoint_validity() {
        let filter = KeypointFilter::new(0.5, 0.5);
        let candidates = [
            Keypoint::new(BodyPart::Nose, 1.0, 1.0, 0.5),
            Keypoint::new(BodyPart::LeftEye, 1.0, 1.0, 0.4999),
            Keypoint::new(BodyPart::RightEye, f32::INFINITY, 1.0, 0.9),
            Keypoint::new(BodyPart::LeftEar, 1.0, 1.0, f32::NAN),
            Keypoint::new(BodyPart::RightEar, 1.0, 1.0, f32::INFINITY),
        ];
        for kp in candidates {
            let kept = !filter.apply(&[kp], &[]).is_empty();
            assert_eq!(kept, kp.is_valid(0.5), "{:?}", kp);
        }
    }

    #[test]
    fn test_missing_part_is_forgotten_by_default() {
        let filter = KeypointFilter::new(0.5, 0.5);
        let first = filter.apply(&[Keypoint::new(BodyPart::Nose, 0.0, 0.0, 0.9)], &[]);
        let gap = filter.apply(&[], &first);
        assert!(gap.is_empty());

        // Re-acquired: no smoothing against the stale value
        let back = filter.apply(&[Keypoint::new(BodyPart::Nose, 10.0, 10.0, 0.9)], &gap);
        assert_eq!(back[0].smoothed, Point2::new(10.0, 10.0));
    }

    #[test]
    fn test_grace_frame_carries_stale_state() {
        let filter = KeypointFilter::new(0.5, 0.5).with_max_missed_frames(1);
        let first = filter.apply(&[Keypoint::new(BodyPart::Nose, 0.0, 0.0, 0.9)], &[]);

        let gap = filter.apply(&[], &first);
        let stale = find(&gap, BodyPart::Nose).unwrap();
        assert_eq!(stale.missed_frames, 1);
        assert!(!stale.is_current());
        assert_eq!(stale.smoothed, Point2::new(0.0, 0.0));

        let back = filter.apply(&[Keypoint::new(BodyPart::Nose, 10.0, 10.0, 0.9)], &gap);
        assert_eq!(back[0].smoothed, Point2::new(5.0, 5.0));
        assert!(back[0].is_current());
    }

    #[test]
    fn test_grace_expires_after_two_missing_frames() {
        let filter = KeypointFilter::new(0.5, 0.5).with_max_missed_frames(1);
        let first = filter.apply(&[Keypoint::new(BodyPart::Nose, 0.0, 0.0, 0.9)], &[]);
        let gap1 = filter.apply(&[], &first);
        let gap2 = filter.apply(&[], &gap1);
        assert!(find(&gap2, BodyPart::Nose).is_none());
    }

    #[test]
    fn test_low_confidence_counts_as_missing() {
        let filter = KeypointFilter::new(0.5, 0.5).with_max_missed_frames(1);
        let first = filter.apply(&[Keypoint::new(BodyPart::Nose, 0.0, 0.0, 0.9)], &[]);
        let weak = filter.apply(&[Keypoint::new(BodyPart::Nose, 50.0, 50.0, 0.2)], &first);
        let stale = find(&weak, BodyPart::Nose).unwrap();
        assert_eq!(stale.missed_frames, 1);
        assert_eq!(stale.smoothed, Point2::new(0.0, 0.0));
    }
}
