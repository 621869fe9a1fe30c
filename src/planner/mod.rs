/*!
Planners over the roadmap and grid maps.

All planners share one search-node shape, held in a flat
index-addressed arena; nodes reference parents and neighbours by id
only, never by pointer.
*/

pub mod astar;
pub mod incremental;
pub mod potential_field;
pub mod thetastar;

pub use astar::Astar;
pub use incremental::{DstarLite, LpaStar};
pub use potential_field::PotentialField;
pub use thetastar::Thetastar;

use geo::LineString;
use wkt::ToWkt;

use crate::grid::Cell;
use crate::obstacle::Obstacle;
use crate::prm::Vertex;
use crate::vector2d::Vector2D;

/// Search lifecycle of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    New,
    Open,
    Closed,
}

/// Search node shared by every planner. `gcost`/`hcost`/`fcost` drive
/// A* and Theta*; `rhs`/`key1`/`key2` drive LPA* and D* Lite. Exactly
/// one of `vertex` (roadmap) or `cell` (grid) is populated.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: usize,
    pub parent_id: Option<usize>,
    pub gcost: f64,
    pub hcost: f64,
    pub fcost: f64,
    pub rhs: f64,
    pub key1: f64,
    pub key2: f64,
    pub state: NodeState,
    pub vertex: Option<Vertex>,
    pub cell: Option<Cell>,
}

impl Node {
    pub fn from_vertex(vertex: Vertex) -> Self {
        Node {
            id: vertex.id,
            parent_id: None,
            gcost: f64::INFINITY,
            hcost: 0.0,
            fcost: f64::INFINITY,
            rhs: f64::INFINITY,
            key1: f64::INFINITY,
            key2: f64::INFINITY,
            state: NodeState::New,
            vertex: Some(vertex),
            cell: None,
        }
    }

    pub fn from_cell(id: usize, cell: Cell) -> Self {
        Node {
            id,
            parent_id: None,
            gcost: f64::INFINITY,
            hcost: 0.0,
            fcost: f64::INFINITY,
            rhs: f64::INFINITY,
            key1: f64::INFINITY,
            key2: f64::INFINITY,
            state: NodeState::New,
            vertex: None,
            cell: Some(cell),
        }
    }

    /// Workspace position of the node.
    pub fn coords(&self) -> Vector2D {
        if let Some(vertex) = &self.vertex {
            vertex.coords
        } else if let Some(cell) = &self.cell {
            cell.center_coords
        } else {
            Vector2D::default()
        }
    }
}

/// Euclidean distance heuristic.
pub fn heuristic(a: &Vector2D, b: &Vector2D) -> f64 {
    a.distance(b)
}

/// True iff segment `ab` crosses none of the inflated obstacles.
pub fn line_of_sight(obstacles: &[Obstacle], a: &Vector2D, b: &Vector2D) -> bool {
    !obstacles.iter().any(|o| o.blocks_segment(a, b))
}

/// Total polyline length of a path.
pub fn path_length(path: &[Node]) -> f64 {
    path.windows(2)
        .map(|w| w[0].coords().distance(&w[1].coords()))
        .sum()
}

/// WKT LINESTRING of the path waypoints, for external rendering.
pub fn path_to_wkt(path: &[Node]) -> String {
    let line: LineString<f64> = path
        .iter()
        .map(|n| geo::Coord::<f64>::from(n.coords()))
        .collect::<Vec<_>>()
        .into();
    line.wkt_string()
}

pub(crate) const NEIGHBOUR_OFFSETS: [(isize, isize); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// In-bounds 8-neighbours of a grid node, as `(id, is_diagonal)`.
pub(crate) fn grid_neighbours(id: usize, width: usize, height: usize) -> Vec<(usize, bool)> {
    let i = (id % width) as isize;
    let j = (id / width) as isize;
    let mut out = Vec::with_capacity(8);
    for (di, dj) in NEIGHBOUR_OFFSETS {
        let (ni, nj) = (i + di, j + dj);
        if ni < 0 || nj < 0 || ni >= width as isize || nj >= height as isize {
            continue;
        }
        out.push((nj as usize * width + ni as usize, di != 0 && dj != 0));
    }
    out
}
