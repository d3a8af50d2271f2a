//! Aligns a 3D garment overlay to a person's torso in a live camera feed.
//!
//! Keypoints from a pose estimator go through [`tracker::KeypointFilter`],
//! [`tracker::TorsoEstimator`] and [`tracker::TransformSolver`]; the result is
//! handed to an [`overlay::OverlaySink`] once per refresh by
//! [`scheduler::OverlayLoop`].

pub mod camera;
pub mod config;
pub mod error;
pub mod mapping;
pub mod overlay;
pub mod pipeline;
pub mod pose;
pub mod protocol;
pub mod render;
pub mod replay;
pub mod scheduler;
pub mod tracker;

/// `git describe` of the build, or the crate version outside a checkout
pub const BUILD_VERSION: &str = env!("GIT_VERSION");
