use anyhow::{Context, Result};
use futures::FutureExt;
use ndarray::Array4;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::keypoint::{BodyPart, Keypoint};
use super::preprocess::preprocess_for_movenet;
use super::source::{PoseFuture, PoseSource};
use crate::camera::VideoFrame;

/// MoveNet single-pose detector (ONNX).
pub struct PoseDetector {
    session: Session,
}

impl PoseDetector {
    /// Load the ONNX model
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let path = model_path.as_ref();
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(path)
            .with_context(|| format!("failed to load ONNX model {}", path.display()))?;

        Ok(Self { session })
    }

    /// Run on a preprocessed [1, 192, 192, 3] tensor. Keypoints are scaled to
    /// a `width` x `height` pixel space.
    pub fn detect(&mut self, input: Array4<f32>, width: u32, height: u32) -> Result<Vec<Keypoint>> {
        let input_tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs!["serving_default_input_0" => input_tensor])
            .context("inference failed")?;

        // MoveNet output is [1, 1, 17, 3] as (y, x, score), normalised
        let output: ndarray::ArrayViewD<f32> = outputs["StatefulPartitionedCall_0"]
            .try_extract_array()
            .context("failed to extract output tensor")?;

        let keypoints = BodyPart::ALL
            .iter()
            .enumerate()
            .map(|(i, &part)| {
                let y = output[[0, 0, i, 0]];
                let x = output[[0, 0, i, 1]];
                let score = output[[0, 0, i, 2]];
                Keypoint::new(part, x * width as f32, y * height as f32, score)
            })
            .collect();

        Ok(keypoints)
    }

    /// Preprocess and detect in one call.
    pub fn detect_frame(&mut self, frame: &VideoFrame) -> Result<Vec<Keypoint>> {
        let input = preprocess_for_movenet(frame)?;
        self.detect(input, frame.width, frame.height)
    }
}

/// Runs the detector on tokio's blocking pool. Clones share the model.
#[derive(Clone)]
pub struct MoveNetSource {
    detector: Arc<Mutex<PoseDetector>>,
}

impl MoveNetSource {
    pub fn new(detector: PoseDetector) -> Self {
        Self {
            detector: Arc::new(Mutex::new(detector)),
        }
    }

    pub fn load<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        Ok(Self::new(PoseDetector::new(model_path)?))
    }
}

impl PoseSource for MoveNetSource {
    fn estimate(&mut self, frame: VideoFrame) -> PoseFuture {
        let detector = self.detector.clone();
        async move {
            tokio::task::spawn_blocking(move || {
                let mut detector = detector
                    .lock()
                    .map_err(|_| anyhow::anyhow!("detector poisoned by an earlier panic"))?;
                detector.detect_frame(&frame)
            })
            .await
            .context("inference task aborted")?
        }
        .boxed()
    }
}
