use tracing::{debug, info};

use crate::boundaries::Boundaries;
use crate::error::PlannerError;
use crate::obstacle::Obstacle;
use crate::vector2d::{Vector2D, EPSILON};

/// Occupancy byte emitted for a free cell.
pub const FREE: u8 = 0;
/// Occupancy byte emitted for an occupied cell.
pub const OCCUPIED: u8 = 100;

/// One cell of the uniform grid.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Cell {
    /// `(i, j)` column/row index, `i` along x, `j` along y.
    pub index: (usize, usize),
    pub center_coords: Vector2D,
    pub occupied: bool,
}

/// Axis-aligned uniform occupancy grid over the workspace bounds.
///
/// `cells` is ground truth and immutable after [`Grid::build_map`];
/// `fake_cells` is the robot's perception, which starts free in the
/// interior and is aligned to the truth by [`Grid::update_grid`] as
/// visibility grows.
#[derive(Debug, Clone)]
pub struct Grid {
    obstacles: Vec<Obstacle>,
    inflated: Vec<Obstacle>,
    bounds: Boundaries,
    resolution: f64,
    width: usize,
    height: usize,
    cells: Vec<Cell>,
    fake_cells: Vec<Cell>,
}

impl Grid {
    /// Workspace bounds are the bounding box of all obstacle vertices.
    pub fn new(obstacles: Vec<Obstacle>, inflate: f64) -> Result<Self, PlannerError> {
        let bounds = Boundaries::from_obstacles(&obstacles).ok_or_else(|| {
            PlannerError::InvalidGeometry(
                "cannot derive workspace bounds from an empty obstacle set".to_string(),
            )
        })?;
        Ok(Self::with_bounds(obstacles, inflate, bounds))
    }

    /// Explicit workspace bounds, for maps whose obstacles do not
    /// span the workspace (or contain none at all).
    pub fn with_bounds(obstacles: Vec<Obstacle>, inflate: f64, bounds: Boundaries) -> Self {
        let inflated = obstacles.iter().map(|o| o.inflate(inflate)).collect();
        Grid {
            obstacles,
            inflated,
            bounds,
            resolution: 0.0,
            width: 0,
            height: 0,
            cells: Vec::new(),
            fake_cells: Vec::new(),
        }
    }

    /// Discretizes the workspace at `resolution`, expanding the upper
    /// bounds so the cell counts are integral. Cells on the outer
    /// boundary ring or whose centre lies in an inflated obstacle are
    /// occupied. The perceived grid starts with every interior cell
    /// free.
    pub fn build_map(&mut self, resolution: f64) -> Result<(), PlannerError> {
        if resolution <= 0.0 {
            return Err(PlannerError::InvalidGeometry(
                "grid resolution must be positive".to_string(),
            ));
        }
        self.resolution = resolution;
        // the tolerance keeps a quotient that is an integer up to
        // float rounding from ceiling into an extra cell
        self.width = (self.bounds.width() / resolution - EPSILON).ceil() as usize;
        self.height = (self.bounds.height() / resolution - EPSILON).ceil() as usize;
        self.bounds.x_upper = self.bounds.x_lower + self.width as f64 * resolution;
        self.bounds.y_upper = self.bounds.y_lower + self.height as f64 * resolution;

        self.cells = Vec::with_capacity(self.width * self.height);
        self.fake_cells = Vec::with_capacity(self.width * self.height);
        for j in 0..self.height {
            for i in 0..self.width {
                let center = self.bounds.min()
                    + Vector2D::new((i as f64 + 0.5) * resolution, (j as f64 + 0.5) * resolution);
                let on_boundary =
                    i == 0 || j == 0 || i == self.width - 1 || j == self.height - 1;
                let occupied =
                    on_boundary || self.inflated.iter().any(|o| o.contains(&center));
                self.cells.push(Cell {
                    index: (i, j),
                    center_coords: center,
                    occupied,
                });
                self.fake_cells.push(Cell {
                    index: (i, j),
                    center_coords: center,
                    occupied: on_boundary,
                });
            }
        }

        info!(
            width = self.width,
            height = self.height,
            occupied = self.cells.iter().filter(|c| c.occupied).count(),
            "grid built"
        );
        Ok(())
    }

    /// Row-major truth occupancy as 0/100 bytes.
    pub fn occupancy_grid(&self, out: &mut Vec<u8>) {
        out.clear();
        out.extend(
            self.cells
                .iter()
                .map(|c| if c.occupied { OCCUPIED } else { FREE }),
        );
    }

    /// Row-major perceived occupancy as 0/100 bytes.
    pub fn fake_occupancy_grid(&self, out: &mut Vec<u8>) {
        out.clear();
        out.extend(
            self.fake_cells
                .iter()
                .map(|c| if c.occupied { OCCUPIED } else { FREE }),
        );
    }

    /// Copies the true occupancy of every cell within Chebyshev
    /// distance `visibility` of `from_cell` into the perceived grid.
    /// Returns the cells whose perceived occupancy flipped.
    pub fn update_grid(&mut self, from_cell: &Cell, visibility: usize) -> Vec<Cell> {
        let (ci, cj) = from_cell.index;
        let i_lo = ci.saturating_sub(visibility);
        let j_lo = cj.saturating_sub(visibility);
        let i_hi = (ci + visibility).min(self.width.saturating_sub(1));
        let j_hi = (cj + visibility).min(self.height.saturating_sub(1));

        let mut changed = Vec::new();
        for j in j_lo..=j_hi {
            for i in i_lo..=i_hi {
                let id = j * self.width + i;
                if self.fake_cells[id].occupied != self.cells[id].occupied {
                    self.fake_cells[id].occupied = self.cells[id].occupied;
                    changed.push(self.fake_cells[id]);
                }
            }
        }
        debug!(
            from = ?from_cell.index,
            visibility,
            flipped = changed.len(),
            "visibility update"
        );
        changed
    }

    pub fn return_fake_grid(&self) -> &[Cell] {
        &self.fake_cells
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// `[map_min, map_max]` of the (expanded) workspace.
    pub fn return_map_bounds(&self) -> (Vector2D, Vector2D) {
        (self.bounds.min(), self.bounds.max())
    }

    pub fn return_grid_dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    pub fn inflated_obstacles(&self) -> &[Obstacle] {
        &self.inflated
    }

    pub fn obstacles(&self) -> &[Obstacle] {
        &self.obstacles
    }

    /// Cell index containing a world position, if inside the bounds.
    pub fn cell_index(&self, p: &Vector2D) -> Option<(usize, usize)> {
        if !self.bounds.is_inside(p) {
            return None;
        }
        // the tolerance keeps positions on a cell border (up to float
        // rounding) in the upper cell instead of truncating down
        let i = ((p.x - self.bounds.x_lower) / self.resolution + EPSILON) as usize;
        let j = ((p.y - self.bounds.y_lower) / self.resolution + EPSILON) as usize;
        Some((i.min(self.width - 1), j.min(self.height - 1)))
    }

    /// True cell containing a world position.
    pub fn cell_at(&self, p: &Vector2D) -> Option<&Cell> {
        let (i, j) = self.cell_index(p)?;
        self.cells.get(j * self.width + i)
    }
}
