#[cfg(feature = "desktop")]
pub mod detector;
pub mod keypoint;
#[cfg(feature = "desktop")]
pub mod preprocess;
pub mod remote;
pub mod source;

#[cfg(feature = "desktop")]
pub use detector::{MoveNetSource, PoseDetector};
pub use keypoint::{BodyPart, Keypoint, Point2};
#[cfg(feature = "desktop")]
pub use preprocess::preprocess_for_movenet;
pub use remote::RemotePoseSource;
pub use source::{PoseFuture, PoseSource};
