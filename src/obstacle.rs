use geo::{Intersects, Line, LineString, Polygon};
use wkt::ToWkt;

use crate::error::PlannerError;
use crate::vector2d::{Vector2D, EPSILON};

/// A convex polygonal obstacle, vertices ordered counter-clockwise.
///
/// Collision queries run against whichever polygon this instance
/// represents; planners keep one inflated copy per obstacle (see
/// [`Obstacle::inflate`]) and test against that.
#[derive(Debug, Clone)]
pub struct Obstacle {
    vertices: Vec<Vector2D>,
    polygon: Polygon<f64>,
}

impl Obstacle {
    /// Validates and stores a convex polygon. Clockwise rings are
    /// reversed; fewer than three vertices or a non-convex ring is
    /// rejected.
    pub fn new(vertices: Vec<Vector2D>) -> Result<Self, PlannerError> {
        if vertices.len() < 3 {
            return Err(PlannerError::InvalidGeometry(format!(
                "polygon has {} vertices, need at least three",
                vertices.len()
            )));
        }

        let mut vertices = vertices;
        if signed_area(&vertices) < 0.0 {
            vertices.reverse();
        }

        let n = vertices.len();
        for i in 0..n {
            let a = vertices[i];
            let b = vertices[(i + 1) % n];
            let c = vertices[(i + 2) % n];
            let cross = (b - a).cross(&(c - b));
            if cross < -EPSILON {
                return Err(PlannerError::InvalidGeometry(
                    "polygon is not convex".to_string(),
                ));
            }
        }

        let ring: Vec<geo::Coord<f64>> = vertices.iter().map(|v| (*v).into()).collect();
        let polygon = Polygon::new(LineString::from(ring), vec![]);
        Ok(Obstacle { vertices, polygon })
    }

    pub fn vertices(&self) -> &[Vector2D] {
        &self.vertices
    }

    /// New obstacle with every edge pushed outward by `r` along its
    /// outward normal, adjacent offset edges re-intersected to form
    /// the new vertices. Offsetting a convex CCW ring keeps it convex
    /// and CCW, so the result needs no re-validation.
    pub fn inflate(&self, r: f64) -> Obstacle {
        let n = self.vertices.len();
        let mut inflated = Vec::with_capacity(n);
        for i in 0..n {
            let prev = self.vertices[(i + n - 1) % n];
            let curr = self.vertices[i];
            let next = self.vertices[(i + 1) % n];

            let d_in = (curr - prev).normalize();
            let d_out = (next - curr).normalize();
            // Outward normal of a CCW edge points to its right.
            let n_in = Vector2D::new(d_in.y, -d_in.x);
            let n_out = Vector2D::new(d_out.y, -d_out.x);

            let p_in = curr + n_in * r;
            let p_out = curr + n_out * r;
            inflated.push(intersect_lines(p_in, d_in, p_out, d_out));
        }

        let ring: Vec<geo::Coord<f64>> = inflated.iter().map(|v| (*v).into()).collect();
        let polygon = Polygon::new(LineString::from(ring), vec![]);
        Obstacle {
            vertices: inflated,
            polygon,
        }
    }

    /// Half-plane containment test: `p` is inside (or within tolerance
    /// of) the polygon iff it lies left of every CCW edge.
    pub fn contains(&self, p: &Vector2D) -> bool {
        let n = self.vertices.len();
        for i in 0..n {
            let a = self.vertices[i];
            let b = self.vertices[(i + 1) % n];
            let edge = b - a;
            if edge.cross(&(*p - a)) < -EPSILON * edge.norm() {
                return false;
            }
        }
        true
    }

    /// True iff segment `ab` intersects or is contained in the
    /// polygon. Containment is covered because a fully interior
    /// segment still intersects the polygon area.
    pub fn blocks_segment(&self, a: &Vector2D, b: &Vector2D) -> bool {
        let line = Line::new(
            geo::Coord::<f64>::from(*a),
            geo::Coord::<f64>::from(*b),
        );
        self.polygon.intersects(&line)
    }

    /// Distance from `p` to the polygon boundary: positive outside,
    /// zero inside.
    pub fn distance_to(&self, p: &Vector2D) -> f64 {
        if self.contains(p) {
            return 0.0;
        }
        p.distance(&self.closest_point(p))
    }

    /// Closest point on the polygon boundary to `p`.
    pub fn closest_point(&self, p: &Vector2D) -> Vector2D {
        let n = self.vertices.len();
        let mut best = self.vertices[0];
        let mut best_dist = f64::INFINITY;
        for i in 0..n {
            let a = self.vertices[i];
            let b = self.vertices[(i + 1) % n];
            let q = project_on_segment(p, &a, &b);
            let d = p.distance(&q);
            if d < best_dist {
                best_dist = d;
                best = q;
            }
        }
        best
    }

    pub fn to_wkt(&self) -> String {
        self.polygon.wkt_string()
    }
}

fn signed_area(vertices: &[Vector2D]) -> f64 {
    let n = vertices.len();
    let mut area = 0.0;
    for i in 0..n {
        let a = vertices[i];
        let b = vertices[(i + 1) % n];
        area += a.cross(&b);
    }
    area / 2.0
}

/// Intersection of two lines given as point + direction. Parallel
/// inputs (collinear adjacent edges) fall back to the first point.
fn intersect_lines(p1: Vector2D, d1: Vector2D, p2: Vector2D, d2: Vector2D) -> Vector2D {
    let denom = d1.cross(&d2);
    if denom.abs() < EPSILON {
        return p1;
    }
    let t = (p2 - p1).cross(&d2) / denom;
    p1 + d1 * t
}

fn project_on_segment(p: &Vector2D, a: &Vector2D, b: &Vector2D) -> Vector2D {
    let ab = *b - *a;
    let len2 = ab.dot(&ab);
    if len2 < EPSILON * EPSILON {
        return *a;
    }
    let t = ((*p - *a).dot(&ab) / len2).clamp(0.0, 1.0);
    *a + ab * t
}
