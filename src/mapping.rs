//! Source-pixel to render-space coordinate conversion.
//!
//! Everything here is a pure function of its arguments. Both the capture
//! resolution and the render viewport can change between frames (rotation,
//! window resize), so callers pass the current dimensions every time.

use serde::Deserialize;

use crate::pose::Point2;

/// Width and height of a pixel space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dimensions {
    pub width: f32,
    pub height: f32,
}

impl Dimensions {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Usable as a divisor: finite and strictly positive on both axes.
    pub fn is_usable(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }

    pub fn half_extents(&self) -> (f32, f32) {
        (self.width / 2.0, self.height / 2.0)
    }
}

/// Which render-space convention the overlay position is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionSpace {
    /// Target pixels re-centred on the viewport, Y up.
    #[default]
    Centered,
    /// Centred and divided by the half extents: ±1 on both axes, Y up.
    Ndc,
}

/// 3D point in render space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Per-axis factors taking source pixels to target pixels.
pub fn scale_factors(source: Dimensions, target: Dimensions) -> Option<(f32, f32)> {
    if !source.is_usable() || !target.is_usable() {
        return None;
    }
    Some((target.width / source.width, target.height / source.height))
}

/// Pixel-space remap, for drawing on a 2D canvas laid over the video.
pub fn map_basic(point: Point2, source: Dimensions, target: Dimensions) -> Option<Point2> {
    let (sx, sy) = scale_factors(source, target)?;
    Some(Point2::new(point.x * sx, point.y * sy))
}

/// Remap and re-centre on the viewport. Image Y grows downward, scene Y
/// grows upward, hence the flip.
pub fn map_centered(point: Point2, source: Dimensions, target: Dimensions, z: f32) -> Option<Vec3> {
    let mapped = map_basic(point, source, target)?;
    let (hw, hh) = target.half_extents();
    Some(Vec3::new(mapped.x - hw, hh - mapped.y, z))
}

pub fn map_ndc(point: Point2, source: Dimensions, target: Dimensions, z: f32) -> Option<Vec3> {
    let centered = map_centered(point, source, target, z)?;
    let (hw, hh) = target.half_extents();
    Some(Vec3::new(centered.x / hw, centered.y / hh, z))
}

pub fn map_to_space(
    space: PositionSpace,
    point: Point2,
    source: Dimensions,
    target: Dimensions,
    z: f32,
) -> Option<Vec3> {
    match space {
        PositionSpace::Centered => map_centered(point, source, target, z),
        PositionSpace::Ndc => map_ndc(point, source, target, z),
    }
}

/// Extents of the visible region in the given space, as (half width, half height).
pub fn space_extents(space: PositionSpace, target: Dimensions) -> (f32, f32) {
    match space {
        PositionSpace::Centered => target.half_extents(),
        PositionSpace::Ndc => (1.0, 1.0),
    }
}
