use tracing::debug;

use crate::error::PlannerError;
use crate::obstacle::Obstacle;
use crate::vector2d::Vector2D;

/// Success radius around the goal, metres.
const GOAL_TOLERANCE: f64 = 0.05;
/// Step displacement below which descent counts as stalled.
const STALL_TOLERANCE: f64 = 1e-4;
/// Stall detection only arms after this many iterations.
const WARMUP_ITERATIONS: usize = 25;
/// Hard stop; a mission this long without reaching the goal is a
/// local minimum in all but name.
const MAX_ITERATIONS: usize = 5000;
/// Lower clamp on the obstacle distance to keep the repulsive
/// magnitude finite on contact.
const MIN_CLEARANCE: f64 = 1e-3;

/// Gradient-descent planner over attractive and repulsive potentials.
///
/// The attractive well is quadratic within `d_star` of the goal and
/// conic beyond it, bounding the far-field gradient; each obstacle
/// repels within `q_star` of its inflated polygon.
pub struct PotentialField {
    inflated: Vec<Obstacle>,
    /// Repulsive gain.
    eta: f64,
    /// Descent step size.
    alpha: f64,
    /// Attractive gain.
    zeta: f64,
    /// Quadratic/conic switch distance.
    d_star: f64,
    /// Repulsive influence range.
    q_star: f64,
    terminate: bool,
    reached: bool,
    iterations: usize,
}

impl PotentialField {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        obstacles: Vec<Obstacle>,
        inflate: f64,
        eta: f64,
        alpha: f64,
        zeta: f64,
        d_star: f64,
        q_star: f64,
    ) -> Self {
        let inflated = obstacles.iter().map(|o| o.inflate(inflate)).collect();
        PotentialField {
            inflated,
            eta,
            alpha,
            zeta,
            d_star,
            q_star,
            terminate: false,
            reached: false,
            iterations: 0,
        }
    }

    /// One descent step from `q` toward `goal`. Sets the terminate
    /// flag on success and surfaces `LocalMinimum` when the descent
    /// stalls away from the goal. Calls after termination are no-ops.
    pub fn one_step_gd(&mut self, q: Vector2D, goal: Vector2D) -> Result<Vector2D, PlannerError> {
        if self.terminate {
            return Ok(q);
        }
        self.iterations += 1;

        let gradient = self.attractive_gradient(&q, &goal) + self.repulsive_gradient(&q);
        let next = q - gradient * self.alpha;

        if next.distance(&goal) <= GOAL_TOLERANCE {
            self.terminate = true;
            self.reached = true;
            debug!(iterations = self.iterations, "goal reached");
            return Ok(next);
        }
        let stalled = self.iterations >= WARMUP_ITERATIONS && next.distance(&q) <= STALL_TOLERANCE;
        if stalled || self.iterations >= MAX_ITERATIONS {
            self.terminate = true;
            self.reached = false;
            debug!(iterations = self.iterations, "descent stalled");
            return Err(PlannerError::LocalMinimum);
        }
        Ok(next)
    }

    /// Quadratic well near the goal, conic beyond `d_star`.
    fn attractive_gradient(&self, q: &Vector2D, goal: &Vector2D) -> Vector2D {
        let d = q.distance(goal);
        if d <= self.d_star {
            (*q - *goal) * self.zeta
        } else {
            (*q - *goal) * (self.d_star * self.zeta / d)
        }
    }

    /// Sum of per-obstacle gradients; an obstacle farther than
    /// `q_star` contributes nothing. The gradient points toward the
    /// obstacle (the descent step then moves away from it).
    fn repulsive_gradient(&self, q: &Vector2D) -> Vector2D {
        let mut gradient = Vector2D::default();
        for obstacle in &self.inflated {
            let d = obstacle.distance_to(q).max(MIN_CLEARANCE);
            if d > self.q_star {
                continue;
            }
            let boundary = obstacle.closest_point(q);
            let outward = if obstacle.contains(q) {
                (boundary - *q).normalize()
            } else {
                (*q - boundary).normalize()
            };
            let magnitude = self.eta * (1.0 / self.q_star - 1.0 / d) / (d * d);
            gradient += outward * magnitude;
        }
        gradient
    }

    pub fn return_terminate(&self) -> bool {
        self.terminate
    }

    pub fn reached_goal(&self) -> bool {
        self.reached
    }
}
