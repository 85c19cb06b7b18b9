/// Lane membership geometry: point-in-polygon, polygon sanity checks and lane assignment
use common::traffic::Point;
use serde::{Deserialize, Serialize};

/// Tolerance for collinearity tests; calibration vertices are integer pixels and centroids
/// are half-pixel, so exact arithmetic is expected and this only absorbs float noise.
const COLLINEAR_EPSILON: f64 = 1e-9;

/// A closed lane boundary in image-pixel coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanePolygon {
    vertices: Vec<Point>,
}

impl LanePolygon {
    pub fn new(vertices: Vec<Point>) -> Self {
        Self { vertices }
    }

    pub fn from_pixels(vertices: &[(i64, i64)]) -> Self {
        Self::new(
            vertices
                .iter()
                .map(|&(x, y)| Point::new(x as f64, y as f64))
                .collect(),
        )
    }

    pub fn vertices(&self) -> &[Point] {
        &self.vertices
    }

    /// Boundary points count as inside
    pub fn contains(&self, point: Point) -> bool {
        is_inside_polygon(point, &self.vertices)
    }

    /// Shoelace area, positive for counter-clockwise winding in a y-up frame
    pub fn signed_area(&self) -> f64 {
        let n = self.vertices.len();
        if n < 3 {
            return 0.0;
        }
        let mut sum = 0.0;
        for i in 0..n {
            let a = self.vertices[i];
            let b = self.vertices[(i + 1) % n];
            sum += a.x * b.y - b.x * a.y;
        }
        sum / 2.0
    }

    /// True when no two non-adjacent edges touch or cross
    pub fn is_simple(&self) -> bool {
        let n = self.vertices.len();
        if n < 3 {
            return false;
        }
        for i in 0..n {
            let (a1, a2) = (self.vertices[i], self.vertices[(i + 1) % n]);
            for j in (i + 1)..n {
                // Skip the edge itself and its two neighbours
                if j == i + 1 || (i == 0 && j == n - 1) {
                    continue;
                }
                let (b1, b2) = (self.vertices[j], self.vertices[(j + 1) % n]);
                if segments_intersect(a1, a2, b1, b2) {
                    return false;
                }
            }
        }
        true
    }
}

/// Axis-aligned region of interest, inclusive on all edges
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoadRoi {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl RoadRoi {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn contains(&self, point: Point) -> bool {
        self.x1 <= point.x && point.x <= self.x2 && self.y1 <= point.y && point.y <= self.y2
    }
}

/// Build the two trapezoidal lanes of a road split at `divider_x`.
///
/// Each lane narrows by 40px towards the top edge of the road ROI to follow perspective.
pub fn trapezoid_lanes(roi: RoadRoi, divider_x: f64) -> (LanePolygon, LanePolygon) {
    const TAPER: f64 = 40.0;
    let RoadRoi { x1, y1, x2, y2 } = roi;

    let lane1 = LanePolygon::new(vec![
        Point::new(x1, y2),
        Point::new(divider_x, y2),
        Point::new(divider_x - TAPER, y1),
        Point::new(x1 + TAPER, y1),
    ]);
    let lane2 = LanePolygon::new(vec![
        Point::new(divider_x, y2),
        Point::new(x2, y2),
        Point::new(x2 - TAPER, y1),
        Point::new(divider_x + TAPER, y1),
    ]);

    (lane1, lane2)
}

/// Ray-casting point-in-polygon test with inclusive boundary.
///
/// Independent of winding order and starting vertex. Polygons with fewer than three
/// vertices contain nothing.
pub fn is_inside_polygon(point: Point, polygon: &[Point]) -> bool {
    let n = polygon.len();
    if n < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let a = polygon[i];
        let b = polygon[j];

        if on_segment(point, a, b) {
            return true;
        }

        if (a.y > point.y) != (b.y > point.y) {
            let x_cross = (b.x - a.x) * (point.y - a.y) / (b.y - a.y) + a.x;
            if point.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }

    inside
}

/// Index of the first polygon (in priority order) containing the point
pub fn first_containing<'a, I>(point: Point, polygons: I) -> Option<usize>
where
    I: IntoIterator<Item = &'a LanePolygon>,
{
    polygons.into_iter().position(|poly| poly.contains(point))
}

fn cross(o: Point, a: Point, b: Point) -> f64 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

fn on_segment(p: Point, a: Point, b: Point) -> bool {
    if cross(a, b, p).abs() > COLLINEAR_EPSILON {
        return false;
    }
    p.x >= a.x.min(b.x) - COLLINEAR_EPSILON
        && p.x <= a.x.max(b.x) + COLLINEAR_EPSILON
        && p.y >= a.y.min(b.y) - COLLINEAR_EPSILON
        && p.y <= a.y.max(b.y) + COLLINEAR_EPSILON
}

fn segments_intersect(p1: Point, p2: Point, q1: Point, q2: Point) -> bool {
    let d1 = cross(q1, q2, p1);
    let d2 = cross(q1, q2, p2);
    let d3 = cross(p1, p2, q1);
    let d4 = cross(p1, p2, q2);

    let straddles = |a: f64, b: f64| (a > 0.0 && b < 0.0) || (a < 0.0 && b > 0.0);
    if straddles(d1, d2) && straddles(d3, d4) {
        return true;
    }

    on_segment(p1, q1, q2) || on_segment(p2, q1, q2) || on_segment(q1, p1, p2) || on_segment(q2, p1, p2)
}
