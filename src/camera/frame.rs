use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::mapping::Dimensions;

/// One captured frame, packed BGR8.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub bgr: Vec<u8>,
}

impl VideoFrame {
    pub fn new(width: u32, height: u32, bgr: Vec<u8>) -> Self {
        Self { width, height, bgr }
    }

    /// Blank frame of the given size
    pub fn black(width: u32, height: u32) -> Self {
        Self::new(width, height, vec![0; width as usize * height as usize * 3])
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width as f32, self.height as f32)
    }

    /// Byte length matches width * height * 3
    pub fn is_well_formed(&self) -> bool {
        self.bgr.len() == self.width as usize * self.height as usize * 3
    }
}

/// Supplier of camera frames.
///
/// Resources are released when the source is dropped.
pub trait FrameSource {
    /// Resolution of the frames currently being produced. Can change at
    /// runtime (device rotation), so callers sample it every frame.
    fn dimensions(&self) -> Dimensions;

    /// Latest frame, or `None` when no new frame is ready yet.
    fn grab(&mut self) -> Result<Option<VideoFrame>>;

    /// No further frames will ever arrive (end of a file or script).
    fn is_closed(&self) -> bool {
        false
    }
}
