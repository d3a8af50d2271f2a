use thiserror::Error;

/// Failures acquiring the capture device.
///
/// Kept distinct from per-frame errors: the overlay loop is never started
/// while one of these is outstanding.
#[derive(Error, Debug, PartialEq)]
pub enum CaptureError {
    /// The OS or user refused access to the camera.
    #[error("permission to open camera {0} was denied")]
    PermissionDenied(i32),
    /// No device at the index, or it could not be opened.
    #[error("camera {0} is not available")]
    Unavailable(i32),
    /// The device opened but reports an unusable resolution.
    #[error("camera {index} reported an invalid resolution {width}x{height}")]
    InvalidResolution { index: i32, width: u32, height: u32 },
}

/// Configuration values that parse but cannot drive the pipeline.
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be within [0, 1], got {value}")]
    BlendOutOfRange { name: &'static str, value: f32 },
    #[error("scale bounds must satisfy 0 < min_scale <= max_scale, got [{min}, {max}]")]
    ScaleBounds { min: f32, max: f32 },
    #[error("{name} must be positive, got {value}")]
    NotPositive { name: &'static str, value: f64 },
    #[error("z bounds must satisfy z_min <= z_max, got [{min}, {max}]")]
    DepthBounds { min: f32, max: f32 },
    #[error("duplicate garment id {0:?}")]
    DuplicateGarment(String),
}
