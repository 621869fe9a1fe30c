use thiserror::Error;

/// Failures surfaced by map construction and the planners.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlannerError {
    #[error("invalid obstacle geometry: {0}")]
    InvalidGeometry(String),
    #[error("configuration ({x:.3}, {y:.3}) is outside the free workspace")]
    OutOfBounds { x: f64, y: f64 },
    #[error("no collision-free path between start and goal")]
    Infeasible,
    #[error("gradient descent stalled in a local minimum")]
    LocalMinimum,
    #[error("search exceeded the iteration cap of {0}")]
    IterationCapExceeded(usize),
}
