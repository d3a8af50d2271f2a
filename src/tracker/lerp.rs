use crate::mapping::Vec3;
use crate::pose::Point2;

/// Linear interpolation: `alpha = 0` keeps `start`, `alpha = 1` takes `end`.
pub fn lerp(start: f32, end: f32, alpha: f32) -> f32 {
    start + (end - start) * alpha
}

pub fn lerp_point(start: Point2, end: Point2, alpha: f32) -> Point2 {
    Point2::new(lerp(start.x, end.x, alpha), lerp(start.y, end.y, alpha))
}

pub fn lerp_vec3(start: Vec3, end: Vec3, alpha: f32) -> Vec3 {
    Vec3::new(
        lerp(start.x, end.x, alpha),
        lerp(start.y, end.y, alpha),
        lerp(start.z, end.z, alpha),
    )
}
