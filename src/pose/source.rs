use anyhow::Result;
use futures::future::BoxFuture;

use crate::camera::VideoFrame;
use crate::pose::Keypoint;

/// Pending inference result, in the frame's pixel space.
pub type PoseFuture = BoxFuture<'static, Result<Vec<Keypoint>>>;

/// Asynchronous pose estimator.
///
/// The returned future owns everything it needs, so the loop can keep
/// ticking while it runs. Part order is unspecified and the list may be
/// empty when nobody is in frame.
pub trait PoseSource {
    fn estimate(&mut self, frame: VideoFrame) -> PoseFuture;
}
