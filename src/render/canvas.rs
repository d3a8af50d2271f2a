use crate::camera::VideoFrame;
use crate::mapping::{self, Dimensions};
use crate::pose::{BodyPart, Point2};
use crate::render::skeleton::{
    ANCHOR_COLOR, KEYPOINT_COLOR, SKELETON_COLOR, SKELETON_CONNECTIONS, STALE_COLOR,
};
use crate::tracker::{TorsoAnchor, TrackedKeypoint};

/// How far outside the canvas a mapped point may land before it is pinned.
/// Wider than the largest marker radius so pinned markers stay invisible.
const OFFSCREEN_MARGIN: f32 = 8.0;

/// 0RGB framebuffer for the debug view.
pub struct Canvas {
    buffer: Vec<u32>,
    width: usize,
    height: usize,
}

impl Canvas {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            buffer: vec![0u32; width * height],
            width,
            height,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width as f32, self.height as f32)
    }

    pub fn buffer(&self) -> &[u32] {
        &self.buffer
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<u32> {
        if x < self.width && y < self.height {
            Some(self.buffer[y * self.width + x])
        } else {
            None
        }
    }

    pub fn clear(&mut self) {
        self.buffer.fill(0);
    }

    /// Blit a BGR frame, nearest-neighbour scaled to the canvas.
    pub fn draw_frame(&mut self, frame: &VideoFrame) {
        if !frame.is_well_formed() || frame.width == 0 || frame.height == 0 {
            return;
        }
        let fw = frame.width as usize;
        let fh = frame.height as usize;
        for y in 0..self.height {
            let sy = y * fh / self.height;
            for x in 0..self.width {
                let sx = x * fw / self.width;
                let i = (sy * fw + sx) * 3;
                let b = frame.bgr[i] as u32;
                let g = frame.bgr[i + 1] as u32;
                let r = frame.bgr[i + 2] as u32;
                self.buffer[y * self.width + x] = (r << 16) | (g << 8) | b;
            }
        }
    }

    /// Skeleton, keypoints and torso anchor. Positions are in `source` pixels.
    pub fn draw_tracking(&mut self, tracked: &[TrackedKeypoint], anchor: &TorsoAnchor, source: Dimensions) {
        let canvas = self.dimensions();
        // Smoothed positions are unbounded; pin them near the canvas so the
        // integer drawing code never sees huge coordinates.
        let to_canvas = |p: Point2| {
            mapping::map_basic(p, source, canvas).map(|q| {
                let x = q.x.clamp(-OFFSCREEN_MARGIN, canvas.width + OFFSCREEN_MARGIN);
                let y = q.y.clamp(-OFFSCREEN_MARGIN, canvas.height + OFFSCREEN_MARGIN);
                (x.round() as i32, y.round() as i32)
            })
        };
        let find = |part: BodyPart| tracked.iter().find(|t| t.part() == part);

        for &(start, end) in SKELETON_CONNECTIONS.iter() {
            if let (Some(a), Some(b)) = (find(start), find(end)) {
                if let (Some((x0, y0)), Some((x1, y1))) = (to_canvas(a.smoothed), to_canvas(b.smoothed)) {
                    self.draw_line(x0, y0, x1, y1, SKELETON_COLOR);
                }
            }
        }

        for t in tracked {
            if let Some((x, y)) = to_canvas(t.smoothed) {
                let color = if t.is_current() { KEYPOINT_COLOR } else { STALE_COLOR };
                self.draw_circle(x, y, 4, color);
            }
        }

        if anchor.is_valid {
            let half_w = anchor.shoulder_width / 2.0;
            let half_h = anchor.torso_height / 2.0;
            let top_left = Point2::new(anchor.center.x - half_w, anchor.center.y - half_h);
            let bottom_right = Point2::new(anchor.center.x + half_w, anchor.center.y + half_h);
            if let (Some((x0, y0)), Some((x1, y1)), Some((cx, cy))) = (
                to_canvas(top_left),
                to_canvas(bottom_right),
                to_canvas(anchor.center),
            ) {
                self.draw_rect(x0, y0, x1, y1, ANCHOR_COLOR);
                self.draw_circle(cx, cy, 3, ANCHOR_COLOR);
            }
        }
    }

    /// Bresenham line
    pub fn draw_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, color: u32) {
        let (w, h) = (self.width as i64, self.height as i64);
        let (x0, y0, x1, y1) = (x0 as i64, y0 as i64, x1 as i64, y1 as i64);
        // Entirely to one side of the canvas
        if (x0 < 0 && x1 < 0) || (y0 < 0 && y1 < 0) || (x0 >= w && x1 >= w) || (y0 >= h && y1 >= h) {
            return;
        }

        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;

        let mut x = x0;
        let mut y = y0;

        loop {
            self.set_pixel(x, y, color);

            if x == x1 && y == y1 {
                break;
            }

            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    pub fn draw_rect(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, color: u32) {
        self.draw_line(x0, y0, x1, y0, color);
        self.draw_line(x1, y0, x1, y1, color);
        self.draw_line(x1, y1, x0, y1, color);
        self.draw_line(x0, y1, x0, y0, color);
    }

    /// Filled circle
    pub fn draw_circle(&mut self, cx: i32, cy: i32, radius: i32, color: u32) {
        let (cx, cy, r) = (cx as i64, cy as i64, radius as i64);
        for dy in -r..=r {
            for dx in -r..=r {
                if dx * dx + dy * dy <= r * r {
                    self.set_pixel(cx + dx, cy + dy, color);
                }
            }
        }
    }

    /// Out-of-bounds writes are dropped
    fn set_pixel(&mut self, x: i64, y: i64, color: u32) {
        if x >= 0 && x < self.width as i64 && y >= 0 && y < self.height as i64 {
            self.buffer[y as usize * self.width + x as usize] = color;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::Keypoint;

    fn tracked(part: BodyPart, x: f32, y: f32, missed_frames: u32) -> TrackedKeypoint {
        TrackedKeypoint {
            keypoint: Keypoint::new(part, x, y, 0.9),
            smoothed: Point2::new(x, y),
            missed_frames,
        }
    }

    #[test]
    fn test_line_endpoints_are_drawn() {
        let mut canvas = Canvas::new(10, 10);
        canvas.draw_line(1, 1, 8, 5, 0xFFFFFF);
        assert_eq!(canvas.pixel(1, 1), Some(0xFFFFFF));
        assert_eq!(canvas.pixel(8, 5), Some(0xFFFFFF));
        assert_eq!(canvas.pixel(9, 9), Some(0));
    }

    #[test]
    fn test_out_of_bounds_is_clipped() {
        let mut canvas = Canvas::new(4, 4);
        canvas.draw_circle(-10, -10, 3, 0xFFFFFF);
        canvas.draw_line(-5, 2, 10, 2, 0x123456);
        assert!(canvas.buffer().iter().all(|&p| p == 0 || p == 0x123456));
        assert_eq!(canvas.pixel(4, 0), None);
    }

    #[test]
    fn test_draw_frame_converts_bgr() {
        let frame = VideoFrame::new(1, 1, vec![0x10, 0x20, 0x30]);
        let mut canvas = Canvas::new(2, 2);
        canvas.draw_frame(&frame);
        assert!(canvas.buffer().iter().all(|&p| p == 0x302010));
    }

    #[test]
    fn test_keypoints_are_scaled_to_canvas() {
        let mut canvas = Canvas::new(100, 100);
        let source = Dimensions::new(200.0, 200.0);
        let points = [
            tracked(BodyPart::Nose, 100.0, 100.0, 0),
            tracked(BodyPart::LeftWrist, 20.0, 180.0, 2),
        ];
        canvas.draw_tracking(&points, &TorsoAnchor::invalid(), source);
        assert_eq!(canvas.pixel(50, 50), Some(KEYPOINT_COLOR));
        assert_eq!(canvas.pixel(10, 90), Some(STALE_COLOR));
    }

    #[test]
    fn test_anchor_box() {
        let mut canvas = Canvas::new(100, 100);
        let anchor = TorsoAnchor {
            center: Point2::new(50.0, 50.0),
            shoulder_width: 40.0,
            torso_height: 20.0,
            is_valid: true,
        };
        let source = canvas.dimensions();
        canvas.draw_tracking(&[], &anchor, source);
        assert_eq!(canvas.pixel(30, 40), Some(ANCHOR_COLOR));
        assert_eq!(canvas.pixel(70, 60), Some(ANCHOR_COLOR));
        assert_eq!(canvas.pixel(50, 50), Some(ANCHOR_COLOR));
        assert_eq!(canvas.pixel(5, 5), Some(0));
    }

    #[test]
    fn test_far_off_keypoints_are_pinned() {
        let mut canvas = Canvas::new(64, 36);
        let source = Dimensions::new(640.0, 480.0);
        let points = [
            tracked(BodyPart::LeftShoulder, 1e12, 100.0, 0),
            tracked(BodyPart::RightShoulder, 320.0, 240.0, 0),
            tracked(BodyPart::LeftHip, -1e12, -1e12, 0),
            tracked(BodyPart::RightHip, 320.0, 3e38, 1),
        ];
        canvas.draw_tracking(&points, &TorsoAnchor::invalid(), source);
        // The on-screen keypoint is still drawn; the pinned ones sit outside the canvas
        assert_eq!(canvas.pixel(32, 18), Some(KEYPOINT_COLOR));
        assert_eq!(canvas.pixel(63, 35), Some(0));
        // Bones towards the pinned points run off the canvas edges
        assert!((0..36).any(|y| canvas.pixel(63, y) == Some(SKELETON_COLOR)));
        assert_eq!(canvas.pixel(32, 30), Some(SKELETON_COLOR));
    }

    #[test]
    fn test_extreme_primitive_coordinates() {
        let mut canvas = Canvas::new(4, 4);
        canvas.draw_circle(i32::MAX, i32::MIN, 4, 0xFFFFFF);
        canvas.draw_line(i32::MIN, i32::MIN, i32::MIN, i32::MAX, 0xFFFFFF);
        canvas.draw_line(i32::MAX, 0, i32::MAX, 3, 0xFFFFFF);
        assert!(canvas.buffer().iter().all(|&p| p == 0));
    }

    #[test]
    fn test_degenerate_source_draws_nothing() {
        let mut canvas = Canvas::new(10, 10);
        let points = [tracked(BodyPart::Nose, 1.0, 1.0, 0)];
        canvas.draw_tracking(&points, &TorsoAnchor::invalid(), Dimensions::new(0.0, 10.0));
        assert!(canvas.buffer().iter().all(|&p| p == 0));
    }
}
