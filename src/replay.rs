//! JSON-lines keypoint traces, for tuning the tracker without a camera.
//!
//! One object per line:
//! `{"source_width":640,"source_height":480,"keypoints":[{"part":"leftShoulder","x":100,"y":50,"score":0.9}]}`

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::io::BufRead;

use crate::mapping::Dimensions;
use crate::overlay::OverlaySink;
use crate::pipeline::OverlayContext;
use crate::pose::{BodyPart, Keypoint};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceKeypoint {
    /// PoseNet part name
    pub part: String,
    pub x: f32,
    pub y: f32,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceFrame {
    pub source_width: f32,
    pub source_height: f32,
    #[serde(default)]
    pub keypoints: Vec<TraceKeypoint>,
}

impl TraceFrame {
    pub fn source(&self) -> Dimensions {
        Dimensions::new(self.source_width, self.source_height)
    }

    /// Keypoints with known part names; others are dropped.
    pub fn keypoints(&self) -> Vec<Keypoint> {
        self.keypoints
            .iter()
            .filter_map(|k| match BodyPart::from_name(&k.part) {
                Some(part) => Some(Keypoint::new(part, k.x, k.y, k.score)),
                None => {
                    debug!("[replay] unknown part {:?}", k.part);
                    None
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub frames: usize,
    pub detected: usize,
    pub skipped_lines: usize,
    pub sink_updates: usize,
}

/// Feed every trace line through `context`, pushing to `sink` after each.
/// Unparseable lines are logged and skipped.
pub fn replay<R: BufRead>(
    reader: R,
    context: &mut OverlayContext,
    sink: &mut dyn OverlaySink,
) -> Result<ReplaySummary> {
    let mut summary = ReplaySummary::default();

    for (i, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read trace line {}", i + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let frame: TraceFrame = match serde_json::from_str(&line) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("[replay] line {}: {}", i + 1, e);
                summary.skipped_lines += 1;
                continue;
            }
        };

        let report = context.process(&frame.keypoints(), frame.source(), sink.viewport());
        summary.frames += 1;
        if report.detected {
            summary.detected += 1;
        }
        match context.push_to_sink(sink) {
            Ok(true) => summary.sink_updates += 1,
            Ok(false) => {}
            Err(e) => warn!("[sink] apply failed: {:#}", e),
        }
    }

    Ok(summary)
}
