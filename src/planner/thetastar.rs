use std::collections::BinaryHeap;

use tracing::debug;

use crate::error::PlannerError;
use crate::grid::Grid;
use crate::obstacle::Obstacle;
use crate::planner::astar::{
    check_query_free, grid_arena, grid_edges, reconstruct, roadmap_arena, roadmap_edges,
    OpenEntry,
};
use crate::planner::{heuristic, line_of_sight, Node, NodeState};
use crate::prm::Vertex;
use crate::vector2d::{Vector2D, EPSILON};

/// Theta* planner: the A* skeleton with an any-angle relaxation.
///
/// When the parent of the expanded node has line of sight to a
/// neighbour, the neighbour inherits that parent directly, so path
/// segments are not restricted to roadmap or grid edges.
pub struct Thetastar {
    inflated: Vec<Obstacle>,
}

impl Thetastar {
    pub fn new(obstacles: Vec<Obstacle>, inflate: f64) -> Self {
        let inflated = obstacles.iter().map(|o| o.inflate(inflate)).collect();
        Thetastar { inflated }
    }

    /// Plans on a roadmap, producing an any-angle path.
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

    /// Plans on the true occupancy grid, 8-connected expansion with
    /// any-angle shortcutting.
    pub fn plan_grid(
        &self,
        start: Vector2D,
        goal: Vector2D,
        grid: &Grid,
        resolution: f64,
    ) -> Result<Vec<Node>, PlannerError> {
        let (width, height) = grid.return_grid_dimensions();
        let (mut nodes, start_id, goal_id) = grid_arena(grid, grid.cells(), start, goal)?;
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
        // the start is its own parent so its successors line-of-sight
        // against it like any other node
        nodes[start_id].parent_id = Some(start_id);
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
                let (candidate_parent, tentative) = self.relax(nodes, entry.id, nb, cost);
                if tentative + EPSILON < nodes[nb].gcost {
                    nodes[nb].gcost = tentative;
                    nodes[nb].fcost = tentative + nodes[nb].hcost;
                    nodes[nb].parent_id = Some(candidate_parent);
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

    /// Any-angle update: inherit the parent of `current` when it can
    /// see the neighbour (never worse by the triangle inequality),
    /// otherwise fall back to the plain A* relaxation via `current`.
    fn relax(&self, nodes: &[Node], current: usize, neighbour: usize, cost: f64) -> (usize, f64) {
        if let Some(parent) = nodes[current].parent_id {
            let parent_coords = nodes[parent].coords();
            let neighbour_coords = nodes[neighbour].coords();
            if line_of_sight(&self.inflated, &parent_coords, &neighbour_coords) {
                return (
                    parent,
                    nodes[parent].gcost + parent_coords.distance(&neighbour_coords),
                );
            }
        }
        (current, nodes[current].gcost + cost)
    }
}
