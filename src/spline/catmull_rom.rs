use bevy::prelude::*;

/// The four control points that shape one Catmull-Rom segment.
///
/// The curve runs from `p1` (t = 0) to `p2` (t = 1); `p0` and `p3` only
/// bend it. Along a flythrough these are the previous, current, next and
/// next-next waypoints.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplineWindow {
    pub p0: Vec3,
    pub p1: Vec3,
    pub p2: Vec3,
    pub p3: Vec3,
}

impl SplineWindow {
    pub fn new(p0: Vec3, p1: Vec3, p2: Vec3, p3: Vec3) -> Self {
        Self { p0, p1, p2, p3 }
    }

    /// Evaluate the segment at parameter `t` in `[0, 1]`.
    pub fn evaluate(&self, t: f32) -> Vec3 {
        let t = f64::from(t);
        Vec3::new(
            catmull_rom(self.p0.x, self.p1.x, self.p2.x, self.p3.x, t),
            catmull_rom(self.p0.y, self.p1.y, self.p2.y, self.p3.y, t),
            catmull_rom(self.p0.z, self.p1.z, self.p2.z, self.p3.z, t),
        )
    }

    /// Straight-line distance between the segment's end points.
    pub fn chord_length(&self) -> f32 {
        self.p1.distance(self.p2)
    }
}

/// Per-axis Catmull-Rom interpolation, computed in `f64` so long chains of
/// samples don't accumulate single-precision error.
fn catmull_rom(p0: f32, p1: f32, p2: f32, p3: f32, t: f64) -> f32 {
    let (p0, p1, p2, p3) = (f64::from(p0), f64::from(p1), f64::from(p2), f64::from(p3));
    let t2 = t * t;
    let t3 = t2 * t;

    (0.5 * ((2.0 * p1)
        + (p2 - p0) * t
        + (2.0 * p0 - 5.0 * p1 + 4.0 * p2 - p3) * t2
        + (3.0 * p1 - p0 - 3.0 * p2 + p3) * t3)) as f32
}
