//! Geometry - ROI and crossing-line math
//!
//! ## Responsibilities
//!
//! - Normalized [0,1] coordinates to pixel coordinates
//! - Crossing line canonicalization (stable "forward" direction)
//! - Signed perpendicular distance from the line
//! - Point-in-polygon test for the ROI
//!
//! ## Sign convention
//!
//! Which physical side of the line is positive follows from
//! canonicalization alone. Direction labels are a function of the
//! configured line, not of real-world geometry; only sign changes matter.

use serde::{Deserialize, Serialize};

/// Added to the line length so a degenerate line never divides by zero
pub const LINE_LENGTH_EPSILON: f64 = 1e-6;

/// Point in normalized image coordinates ([0,1] on both axes)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPoint {
    pub x: f64,
    pub y: f64,
}

/// Line in normalized image coordinates, as drawn by the user
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedLine {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl NormalizedLine {
    pub fn start(&self) -> NormalizedPoint {
        NormalizedPoint { x: self.x1, y: self.y1 }
    }

    pub fn end(&self) -> NormalizedPoint {
        NormalizedPoint { x: self.x2, y: self.y2 }
    }

    /// Euclidean length in normalized units
    pub fn length(&self) -> f64 {
        (self.x2 - self.x1).hypot(self.y2 - self.y1)
    }
}

/// Integer pixel coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelPoint {
    pub x: i32,
    pub y: i32,
}

impl PixelPoint {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Crossing line after endpoint reordering
///
/// `p1 -> p2` increases monotonically along the dominant axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalLine {
    pub p1: PixelPoint,
    pub p2: PixelPoint,
}

impl CanonicalLine {
    /// Signed distance of `point` from this line
    pub fn side_of(&self, point: PixelPoint) -> f64 {
        signed_distance(point, self.p1, self.p2)
    }
}

/// Bounding box in pixels as supplied by the tracker
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// All four coordinates are finite
    pub fn is_finite(&self) -> bool {
        self.x1.is_finite() && self.y1.is_finite() && self.x2.is_finite() && self.y2.is_finite()
    }

    /// Integer box center (coordinates truncated first, then floor-halved)
    ///
    /// Coordinates saturate at the `i32` range; the midpoint of two `i32`
    /// values always fits back into `i32`.
    pub fn center(&self) -> PixelPoint {
        PixelPoint {
            x: midpoint(self.x1 as i32, self.x2 as i32),
            y: midpoint(self.y1 as i32, self.y2 as i32),
        }
    }
}

fn midpoint(a: i32, b: i32) -> i32 {
    (i64::from(a) + i64::from(b)).div_euclid(2) as i32
}

/// Normalized point to pixel point (truncating)
pub fn denormalize(point: NormalizedPoint, frame_width: u32, frame_height: u32) -> PixelPoint {
    PixelPoint {
        x: (point.x * frame_width as f64) as i32,
        y: (point.y * frame_height as f64) as i32,
    }
}

/// Denormalize a whole polygon
pub fn denormalize_polygon(
    polygon: &[NormalizedPoint],
    frame_width: u32,
    frame_height: u32,
) -> Vec<PixelPoint> {
    polygon
        .iter()
        .map(|p| denormalize(*p, frame_width, frame_height))
        .collect()
}

/// Resolve the raw line to pixels and order its endpoints
///
/// If `|dx| > |dy|` endpoints are ordered by ascending x, otherwise by
/// ascending y. Ties fall to the y ordering.
pub fn canonicalize_line(raw_line: &NormalizedLine, width: u32, height: u32) -> CanonicalLine {
    let a = denormalize(raw_line.start(), width, height);
    let b = denormalize(raw_line.end(), width, height);

    let dx = (b.x - a.x).abs();
    let dy = (b.y - a.y).abs();

    let swap = if dx > dy { a.x > b.x } else { a.y > b.y };

    if swap {
        CanonicalLine { p1: b, p2: a }
    } else {
        CanonicalLine { p1: a, p2: b }
    }
}

/// Cross-product signed perpendicular distance, in pixels
pub fn signed_distance(point: PixelPoint, p1: PixelPoint, p2: PixelPoint) -> f64 {
    let (px, py) = (point.x as f64, point.y as f64);
    let (x1, y1) = (p1.x as f64, p1.y as f64);
    let (x2, y2) = (p2.x as f64, p2.y as f64);

    let cross = (x2 - x1) * (py - y1) - (y2 - y1) * (px - x1);
    let length = (x2 - x1).hypot(y2 - y1) + LINE_LENGTH_EPSILON;

    cross / length
}

/// Point-in-polygon test; boundary points count as outside
///
/// Polygons with fewer than 3 vertices contain nothing.
pub fn point_in_roi(point: PixelPoint, polygon: &[PixelPoint]) -> bool {
    if polygon.len() < 3 {
        return false;
    }

    let n = polygon.len();

    for i in 0..n {
        let a = polygon[i];
        let b = polygon[(i + 1) % n];
        if on_segment(point, a, b) {
            return false;
        }
    }

    // Even-odd ray cast towards +x
    let (px, py) = (point.x as f64, point.y as f64);
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = (polygon[i].x as f64, polygon[i].y as f64);
        let (xj, yj) = (polygon[j].x as f64, polygon[j].y as f64);

        if (yi > py) != (yj > py) {
            let x_cross = xi + (py - yi) * (xj - xi) / (yj - yi);
            if px < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }

    inside
}

fn on_segment(p: PixelPoint, a: PixelPoint, b: PixelPoint) -> bool {
    let (px, py) = (p.x as i64, p.y as i64);
    let (ax, ay) = (a.x as i64, a.y as i64);
    let (bx, by) = (b.x as i64, b.y as i64);

    let cross = (bx - ax) * (py - ay) - (by - ay) * (px - ax);
    if cross != 0 {
        return false;
    }

    px >= ax.min(bx) && px <= ax.max(bx) && py >= ay.min(by) && py <= ay.max(by)
}
