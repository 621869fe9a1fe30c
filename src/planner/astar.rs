use std::cmp::Ordering;
use std::collections::BinaryHeap;

use tracing::debug;

use crate::error::PlannerError;
use crate::grid::{Cell, Grid};
use crate::obstacle::Obstacle;
use crate::planner::{grid_neighbours, heuristic, line_of_sight, Node, NodeState};
use crate::prm::Vertex;
use crate::vector2d::{Vector2D, EPSILON};

/// Min-ordering on (fcost, hcost, id). `BinaryHeap` is a max-heap, so
/// every comparison is inverted; the id tie-break keeps expansions
/// deterministic.
#[derive(Debug, Clone, Copy)]
pub(crate) struct OpenEntry {
    pub(crate) fcost: f64,
    pub(crate) hcost: f64,
    pub(crate) gcost: f64,
    pub(crate) id: usize,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenEntry {}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .fcost
            .total_cmp(&self.fcost)
            .then(other.hcost.total_cmp(&self.hcost))
            .then(other.id.cmp(&self.id))
    }
}

/// A* planner over a roadmap or an occupancy grid.
pub struct Astar {
    inflated: Vec<Obstacle>,
}

impl Astar {
    pub fn new(obstacles: Vec<Obstacle>, inflate: f64) -> Self {
        let inflated = obstacles.iter().map(|o| o.inflate(inflate)).collect();
        Astar { inflated }
    }

    /// Plans on a roadmap. Start and goal are appended as temporary
    /// vertices connected to every visible roadmap vertex.
    pub fn plan_prm(
        &self,
        start: Vector2D,
        goal: Vector2D,
        vertices: &[Vertex],
    ) -> Result<Vec<Node>, PlannerError> {
        check_query_free(&self.inflated, start, goal)?;
        let (mut nodes, start_id, goal_id) = roadmap_arena(&self.inflated, start, goal, vertices);
        if start_id == goal_id {
            return Ok(vec![nodes.swap_remove(start_id)]);
        }
        for node in &mut nodes {
            node.hcost = heuristic(&node.coords(), &goal);
        }

        self.search(&mut nodes, start_id, goal_id, |nodes, id| {
            roadmap_edges(nodes, id)
        })?;
        Ok(reconstruct(&nodes, goal_id))
    }

    /// Plans on the true occupancy grid, 8-connected.
    pub fn plan_grid(
        &self,
        start: Vector2D,
        goal: Vector2D,
        grid: &Grid,
        resolution: f64,
    ) -> Result<Vec<Node>, PlannerError> {
        self.plan_cells(start, goal, grid, grid.cells(), resolution)
    }

    /// Plans on the robot's perceived copy of the grid instead of the
    /// ground truth, for callers simulating partial knowledge.
    pub fn plan_fake_grid(
        &self,
        start: Vector2D,
        goal: Vector2D,
        grid: &Grid,
        resolution: f64,
    ) -> Result<Vec<Node>, PlannerError> {
        self.plan_cells(start, goal, grid, grid.return_fake_grid(), resolution)
    }

    fn plan_cells(
        &self,
        start: Vector2D,
        goal: Vector2D,
        grid: &Grid,
        cells: &[Cell],
        resolution: f64,
    ) -> Result<Vec<Node>, PlannerError> {
        let (width, height) = grid.return_grid_dimensions();
        let (mut nodes, start_id, goal_id) = grid_arena(grid, cells, start, goal)?;
        if start_id == goal_id {
            return Ok(vec![nodes.swap_remove(start_id)]);
        }
        let goal_coords = nodes[goal_id].coords();
        for node in &mut nodes {
            node.hcost = heuristic(&node.coords(), &goal_coords);
        }

        self.search(&mut nodes, start_id, goal_id, move |nodes, id| {
            grid_edges(nodes, id, width, height, resolution)
        })?;
        Ok(reconstruct(&nodes, goal_id))
    }

    /// Best-first expansion with lazy heap deletion. `edges` yields
    /// `(neighbour id, traversal cost)` pairs for an expanded node.
    fn search<F>(
        &self,
        nodes: &mut [Node],
        start_id: usize,
        goal_id: usize,
        edges: F,
    ) -> Result<(), PlannerError>
    where
        F: Fn(&[Node], usize) -> Vec<(usize, f64)>,
    {
        let mut open = BinaryHeap::new();
        nodes[start_id].gcost = 0.0;
        nodes[start_id].fcost = nodes[start_id].hcost;
        nodes[start_id].state = NodeState::Open;
        open.push(OpenEntry {
            fcost: nodes[start_id].fcost,
            hcost: nodes[start_id].hcost,
            gcost: 0.0,
            id: start_id,
        });

        let mut expanded = 0usize;
        while let Some(entry) = open.pop() {
            if nodes[entry.id].state == NodeState::Closed
                || entry.gcost - nodes[entry.id].gcost > EPSILON
            {
                continue;
            }
            nodes[entry.id].state = NodeState::Closed;
            expanded += 1;
            if entry.id == goal_id {
                debug!(expanded, cost = nodes[goal_id].gcost, "search finished");
                return Ok(());
            }

            for (nb, cost) in edges(nodes, entry.id) {
                if nodes[nb].state == NodeState::Closed || !cost.is_finite() {
                    continue;
                }
                let tentative = nodes[entry.id].gcost + cost;
                if tentative + EPSILON < nodes[nb].gcost {
                    nodes[nb].gcost = tentative;
                    nodes[nb].fcost = tentative + nodes[nb].hcost;
                    nodes[nb].parent_id = Some(entry.id);
                    nodes[nb].state = NodeState::Open;
                    open.push(OpenEntry {
                        fcost: nodes[nb].fcost,
                        hcost: nodes[nb].hcost,
                        gcost: tentative,
                        id: nb,
                    });
                }
            }
        }
        Err(PlannerError::Infeasible)
    }
}

/// Rejects a roadmap query whose endpoint sits inside an inflated
/// obstacle.
pub(crate) fn check_query_free(
    inflated: &[Obstacle],
    start: Vector2D,
    goal: Vector2D,
) -> Result<(), PlannerError> {
    for p in [start, goal] {
        if inflated.iter().any(|o| o.contains(&p)) {
            return Err(PlannerError::OutOfBounds { x: p.x, y: p.y });
        }
    }
    Ok(())
}

/// Arena of roadmap nodes with start and goal appended and connected
/// to every visible vertex (and to each other when visible). Returns
/// the arena and the start/goal ids; a query with start equal to goal
/// gets the start id for both.
pub(crate) fn roadmap_arena(
    inflated: &[Obstacle],
    start: Vector2D,
    goal: Vector2D,
    vertices: &[Vertex],
) -> (Vec<Node>, usize, usize) {
    let mut extended: Vec<Vertex> = vertices.to_vec();
    let start_id = extended.len();
    let goal_id = start_id + 1;
    extended.push(Vertex::new(start_id, start));
    extended.push(Vertex::new(goal_id, goal));

    for query in [start_id, goal_id] {
        let coords = extended[query].coords;
        for other in 0..start_id {
            let target = extended[other].coords;
            if line_of_sight(inflated, &coords, &target) {
                let cost = coords.distance(&target);
                extended[query].id_set.insert(other);
                extended[query].edge_costs.insert(other, cost);
                extended[other].id_set.insert(query);
                extended[other].edge_costs.insert(query, cost);
            }
        }
    }
    if line_of_sight(inflated, &start, &goal) {
        let cost = start.distance(&goal);
        extended[start_id].id_set.insert(goal_id);
        extended[start_id].edge_costs.insert(goal_id, cost);
        extended[goal_id].id_set.insert(start_id);
        extended[goal_id].edge_costs.insert(start_id, cost);
    }

    let nodes = extended.into_iter().map(Node::from_vertex).collect();
    if start == goal {
        (nodes, start_id, start_id)
    } else {
        (nodes, start_id, goal_id)
    }
}

pub(crate) fn roadmap_edges(nodes: &[Node], id: usize) -> Vec<(usize, f64)> {
    let vertex = nodes[id].vertex.as_ref().expect("roadmap node");
    vertex
        .edge_costs
        .iter()
        .map(|(nb, cost)| (*nb, *cost))
        .collect()
}

/// Arena of grid nodes. Fails with `OutOfBounds` when start or goal
/// maps outside the grid or onto an occupied cell.
pub(crate) fn grid_arena(
    grid: &Grid,
    cells: &[Cell],
    start: Vector2D,
    goal: Vector2D,
) -> Result<(Vec<Node>, usize, usize), PlannerError> {
    let (width, _) = grid.return_grid_dimensions();
    let locate = |p: Vector2D| -> Result<usize, PlannerError> {
        let (i, j) = grid
            .cell_index(&p)
            .ok_or(PlannerError::OutOfBounds { x: p.x, y: p.y })?;
        let id = j * width + i;
        if cells[id].occupied {
            return Err(PlannerError::OutOfBounds { x: p.x, y: p.y });
        }
        Ok(id)
    };
    let start_id = locate(start)?;
    let goal_id = locate(goal)?;
    let nodes = cells
        .iter()
        .enumerate()
        .map(|(id, c)| Node::from_cell(id, *c))
        .collect();
    Ok((nodes, start_id, goal_id))
}

/// 8-connected traversal costs: `resolution` straight, `√2·resolution`
/// diagonal, infinite into an occupied cell.
pub(crate) fn grid_edges(
    nodes: &[Node],
    id: usize,
    width: usize,
    height: usize,
    resolution: f64,
) -> Vec<(usize, f64)> {
    grid_neighbours(id, width, height)
        .into_iter()
        .map(|(nb, diagonal)| {
            let occupied = nodes[nb].cell.map(|c| c.occupied).unwrap_or(true);
            let cost = if occupied {
                f64::INFINITY
            } else if diagonal {
                std::f64::consts::SQRT_2 * resolution
            } else {
                resolution
            };
            (nb, cost)
        })
        .collect()
}

/// Follows `parent_id` from the goal back to the start and reverses.
pub(crate) fn reconstruct(nodes: &[Node], goal_id: usize) -> Vec<Node> {
    let mut path = Vec::new();
    let mut current = goal_id;
    loop {
        path.push(nodes[current].clone());
        match nodes[current].parent_id {
            Some(parent) if parent != current => current = parent,
            _ => break,
        }
    }
    path.reverse();
    path
}
