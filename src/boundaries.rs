use rand::Rng;

use crate::obstacle::Obstacle;
use crate::vector2d::Vector2D;

/// Axis-aligned rectangular workspace bounds.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Boundaries {
    pub x_lower: f64,
    pub x_upper: f64,
    pub y_lower: f64,
    pub y_upper: f64,
}

impl Boundaries {
    pub fn new(x_lower: f64, x_upper: f64, y_lower: f64, y_upper: f64) -> Self {
        Boundaries {
            x_lower,
            x_upper,
            y_lower,
            y_upper,
        }
    }

    /// Bounding box of every vertex of every obstacle. `None` when the
    /// obstacle set is empty and no bounds can be derived.
    pub fn from_obstacles(obstacles: &[Obstacle]) -> Option<Self> {
        let mut vertices = obstacles.iter().flat_map(|o| o.vertices().iter());
        let first = vertices.next()?;
        let mut bounds = Boundaries::new(first.x, first.x, first.y, first.y);
        for v in vertices {
            bounds.x_lower = bounds.x_lower.min(v.x);
            bounds.x_upper = bounds.x_upper.max(v.x);
            bounds.y_lower = bounds.y_lower.min(v.y);
            bounds.y_upper = bounds.y_upper.max(v.y);
        }
        Some(bounds)
    }

    pub fn is_inside(&self, p: &Vector2D) -> bool {
        p.x >= self.x_lower && p.x <= self.x_upper && p.y >= self.y_lower && p.y <= self.y_upper
    }

    /// Uniform random configuration inside the bounds.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Vector2D {
        let x: f64 = rng.random_range(self.x_lower..self.x_upper);
        let y: f64 = rng.random_range(self.y_lower..self.y_upper);
        Vector2D::new(x, y)
    }

    pub fn min(&self) -> Vector2D {
        Vector2D::new(self.x_lower, self.y_lower)
    }

    pub fn max(&self) -> Vector2D {
        Vector2D::new(self.x_upper, self.y_upper)
    }

    pub fn width(&self) -> f64 {
        self.x_upper - self.x_lower
    }

    pub fn height(&self) -> f64 {
        self.y_upper - self.y_lower
    }
}
