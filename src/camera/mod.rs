pub mod backoff;
#[cfg(feature = "desktop")]
pub mod capture;
pub mod frame;

pub use backoff::ReadBackoff;
#[cfg(feature = "desktop")]
pub use capture::OpenCvCamera;
pub use frame::{FrameSource, VideoFrame};
