//! Load-line geometry in the (Va, Ia) plane.

/// A point on the anode characteristics: volts and milliamps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub va: f64,
    pub ia: f64,
}

impl Point {
    /// Sentinel for an intersection or operating point that does not exist.
    pub const NOT_FOUND: Point = Point { va: -1.0, ia: -1.0 };

    pub fn new(va: f64, ia: f64) -> Self {
        Self { va, ia }
    }

    /// True unless this is a sentinel (both coordinates must be non-negative).
    pub fn is_found(&self) -> bool {
        self.va >= 0.0 && self.ia >= 0.0
    }
}

impl Default for Point {
    fn default() -> Self {
        Self::NOT_FOUND
    }
}

/// Intersection of segments `p1..p2` and `q1..q2`, or [`Point::NOT_FOUND`]
/// when they are parallel or do not meet within both segments.
pub fn find_line_intersection(p1: Point, p2: Point, q1: Point, q2: Point) -> Point {
    let (x1, y1, x2, y2) = (p1.va, p1.ia, p2.va, p2.ia);
    let (x3, y3, x4, y4) = (q1.va, q1.ia, q2.va, q2.ia);

    let denom = (x1 - x2) * (y3 - y4) - (y1 - y2) * (x3 - x4);
    if denom.abs() < 1e-12 {
        return Point::NOT_FOUND;
    }

    let t = ((x1 - x3) * (y3 - y4) - (y1 - y3) * (x3 - x4)) / denom;
    let u = -((x1 - x2) * (y1 - y3) - (y1 - y2) * (x1 - x3)) / denom;
    if !(0.0..=1.0).contains(&t) || !(0.0..=1.0).contains(&u) {
        return Point::NOT_FOUND;
    }

    Point::new(x1 + t * (x2 - x1), y1 + t * (y2 - y1))
}

/// First crossing of the segment `start..end` with a sampled curve,
/// walking the curve from its first point.
pub fn first_intersection(start: Point, end: Point, curve: &[Point]) -> Point {
    curve
        .windows(2)
        .map(|w| find_line_intersection(start, end, w[0], w[1]))
        .find(Point::is_found)
        .unwrap_or(Point::NOT_FOUND)
}

/// Current (mA) on the DC load line of `raa` ohms from `vb` at anode
/// voltage `va`.
pub fn dc_load_line_current(vb: f64, raa: f64, va: f64) -> f64 {
    1000.0 * (vb - va) / raa
}

/// `count` evenly spaced points from `start` to `end` inclusive.
pub fn sample_line(start: Point, end: Point, count: usize) -> Vec<Point> {
    let last = count.saturating_sub(1).max(1) as f64;
    (0..count)
        .map(|i| {
            let t = i as f64 / last;
            Point::new(
                start.va + t * (end.va - start.va),
                start.ia + t * (end.ia - start.ia),
            )
        })
        .collect()
}
