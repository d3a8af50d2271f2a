pub mod filter;
pub mod lerp;
pub mod solver;
pub mod torso;

pub use filter::{KeypointFilter, TrackedKeypoint};
pub use solver::{HoldReason, SolveOutcome, TransformSolver};
pub use torso::{GateFailure, TorsoAnchor, TorsoEstimator, TORSO_PARTS};
