use std::cmp::Ordering;
use std::collections::{BTreeSet, BinaryHeap};

use tracing::debug;

use crate::error::PlannerError;
use crate::grid::{Cell, Grid};
use crate::obstacle::Obstacle;
use crate::planner::{grid_neighbours, heuristic, Node, NodeState};
use crate::vector2d::{almost_equal, Vector2D, EPSILON};

/// Equality that also holds for two like-signed infinities, which
/// `almost_equal` cannot express (inf - inf is NaN).
fn values_equal(a: f64, b: f64) -> bool {
    (a.is_infinite() && b.is_infinite() && a.signum() == b.signum()) || almost_equal(a, b)
}

/// Lexicographic key comparison: `key1` with absolute tolerance, ties
/// broken on smaller `key2`.
fn key_less(a: (f64, f64), b: (f64, f64)) -> bool {
    if almost_equal(a.0, b.0) {
        return a.1 < b.1;
    }
    a.0 < b.0
}

/// Open-list entry; min-ordering on (key1, key2, id) through an
/// inverted `Ord` since `BinaryHeap` is a max-heap.
#[derive(Debug, Clone, Copy)]
struct KeyEntry {
    key1: f64,
    key2: f64,
    id: usize,
}

impl PartialEq for KeyEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for KeyEntry {}

impl PartialOrd for KeyEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for KeyEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .key1
            .total_cmp(&self.key1)
            .then(other.key2.total_cmp(&self.key2))
            .then(other.id.cmp(&self.id))
    }
}

/// Lifelong Planning A* on an occupancy grid.
///
/// Keeps `g` (best known cost from the search root) and `rhs`
/// (one-step lookahead) per cell; the open list holds exactly the
/// locally inconsistent cells. Between searches the caller feeds
/// perceived-occupancy flips through [`LpaStar::simulate_update`] and
/// only the affected portion of the search tree is repaired.
pub struct LpaStar {
    inflated: Vec<Obstacle>,
    nodes: Vec<Node>,
    open: BinaryHeap<KeyEntry>,
    fake_grid: Vec<Cell>,
    width: usize,
    height: usize,
    resolution: f64,
    /// Search root (rhs = 0).
    start_id: usize,
    /// Search target; termination compares against its key.
    goal_id: usize,
    /// Heuristic anchor. Equals `goal_id` for plain LPA*; D* Lite
    /// moves it along with the robot.
    h_target_id: usize,
    km: f64,
    path: Vec<Node>,
    valid_path: bool,
    iteration_cap: usize,
}

impl LpaStar {
    pub fn new(obstacles: Vec<Obstacle>, inflate: f64) -> Self {
        let inflated = obstacles.iter().map(|o| o.inflate(inflate)).collect();
        LpaStar {
            inflated,
            nodes: Vec::new(),
            open: BinaryHeap::new(),
            fake_grid: Vec::new(),
            width: 0,
            height: 0,
            resolution: 0.0,
            start_id: 0,
            goal_id: 0,
            h_target_id: 0,
            km: 0.0,
            path: Vec::new(),
            valid_path: true,
            iteration_cap: usize::MAX,
        }
    }

    /// Caps the node expansions of one `compute_shortest_path` call.
    pub fn set_iteration_cap(&mut self, cap: usize) {
        self.iteration_cap = cap;
    }

    /// Allocates one node per grid cell, snapshots the perceived grid
    /// and seeds the open list with the start, so the first
    /// `compute_shortest_path` performs an exact A* search.
    pub fn initialize(
        &mut self,
        start: Vector2D,
        goal: Vector2D,
        grid: &Grid,
        resolution: f64,
    ) -> Result<(), PlannerError> {
        let (width, height) = grid.return_grid_dimensions();
        self.width = width;
        self.height = height;
        self.resolution = resolution;
        self.fake_grid = grid.return_fake_grid().to_vec();
        self.nodes = self
            .fake_grid
            .iter()
            .enumerate()
            .map(|(id, c)| Node::from_cell(id, *c))
            .collect();
        self.open = BinaryHeap::new();
        self.km = 0.0;
        self.path.clear();
        self.valid_path = true;

        self.start_id = self.locate(grid, start)?;
        self.goal_id = self.locate(grid, goal)?;
        self.h_target_id = self.goal_id;

        self.nodes[self.start_id].rhs = 0.0;
        let key = self.calculate_key(self.start_id);
        self.push_open(self.start_id, key);
        Ok(())
    }

    fn locate(&self, grid: &Grid, p: Vector2D) -> Result<usize, PlannerError> {
        let (i, j) = grid
            .cell_index(&p)
            .ok_or(PlannerError::OutOfBounds { x: p.x, y: p.y })?;
        let id = j * self.width + i;
        if self.fake_grid[id].occupied {
            return Err(PlannerError::OutOfBounds { x: p.x, y: p.y });
        }
        Ok(id)
    }

    fn calculate_key(&self, id: usize) -> (f64, f64) {
        let m = self.nodes[id].gcost.min(self.nodes[id].rhs);
        let h = heuristic(
            &self.nodes[id].coords(),
            &self.nodes[self.h_target_id].coords(),
        );
        (m + h + self.km, m)
    }

    fn push_open(&mut self, id: usize, key: (f64, f64)) {
        self.nodes[id].key1 = key.0;
        self.nodes[id].key2 = key.1;
        self.nodes[id].state = NodeState::Open;
        self.open.push(KeyEntry {
            key1: key.0,
            key2: key.1,
            id,
        });
    }

    /// Traversal cost between two adjacent cells on the perceived
    /// grid: infinite when either endpoint is occupied.
    fn edge_cost(&self, a: usize, b: usize, diagonal: bool) -> f64 {
        if self.fake_grid[a].occupied || self.fake_grid[b].occupied {
            return f64::INFINITY;
        }
        if diagonal {
            std::f64::consts::SQRT_2 * self.resolution
        } else {
            self.resolution
        }
    }

    /// Recomputes `rhs` from the predecessors and re-queues the cell
    /// iff it is locally inconsistent.
    fn update_cell(&mut self, s: usize) {
        if s != self.start_id {
            let mut best = f64::INFINITY;
            for (nb, diagonal) in grid_neighbours(s, self.width, self.height) {
                let value = self.nodes[nb].gcost + self.edge_cost(nb, s, diagonal);
                if value < best {
                    best = value;
                }
            }
            self.nodes[s].rhs = best;
        }

        if values_equal(self.nodes[s].gcost, self.nodes[s].rhs) {
            // consistent: lazily removed from the open list
            self.nodes[s].state = NodeState::Closed;
        } else {
            let key = self.calculate_key(s);
            self.push_open(s, key);
        }
    }

    /// Pops the lowest live key, discarding stale entries. An entry is
    /// stale when its node left the open list or was re-queued under a
    /// different key.
    fn peek_open(&mut self) -> Option<KeyEntry> {
        while let Some(entry) = self.open.peek().copied() {
            let node = &self.nodes[entry.id];
            let live = node.state == NodeState::Open
                && entry.key1 == node.key1
                && entry.key2 == node.key2;
            if live {
                return Some(entry);
            }
            self.open.pop();
        }
        None
    }

    /// Expands inconsistent cells until the goal is settled or the
    /// open list runs dry. Surfaces `Infeasible` when the goal stays
    /// unreachable and `IterationCapExceeded` past the cap; the best
    /// path so far and the validity flag stay queryable either way.
    pub fn compute_shortest_path(&mut self) -> Result<(), PlannerError> {
        let mut expanded = 0usize;
        loop {
            let top = self.peek_open();
            let goal_key = self.calculate_key(self.goal_id);
            let goal_settled = values_equal(
                self.nodes[self.goal_id].gcost,
                self.nodes[self.goal_id].rhs,
            );
            let proceed = match top {
                Some(entry) => {
                    key_less((entry.key1, entry.key2), goal_key) || !goal_settled
                }
                None => false,
            };
            if !proceed {
                break;
            }

            expanded += 1;
            if expanded > self.iteration_cap {
                self.extract_path();
                self.valid_path = false;
                return Err(PlannerError::IterationCapExceeded(self.iteration_cap));
            }

            let entry = top.expect("open list entry");
            self.open.pop();
            let u = entry.id;

            // a moved heuristic anchor (D* Lite) can leave the stored
            // key behind the true one; re-queue instead of expanding
            let current_key = self.calculate_key(u);
            if key_less((entry.key1, entry.key2), current_key) {
                self.push_open(u, current_key);
                continue;
            }

            self.nodes[u].state = NodeState::Closed;
            if self.nodes[u].gcost - self.nodes[u].rhs > EPSILON {
                // overconsistent: settle and propagate to successors
                self.nodes[u].gcost = self.nodes[u].rhs;
                for (nb, _) in grid_neighbours(u, self.width, self.height) {
                    self.update_cell(nb);
                }
            } else {
                // underconsistent: retract and repair
                self.nodes[u].gcost = f64::INFINITY;
                self.update_cell(u);
                for (nb, _) in grid_neighbours(u, self.width, self.height) {
                    self.update_cell(nb);
                }
            }
        }

        debug!(expanded, "incremental search settled");
        self.extract_path();
        if self.valid_path {
            Ok(())
        } else {
            Err(PlannerError::Infeasible)
        }
    }

    /// Applies a batch of perceived-occupancy flips, repairs every
    /// affected cell and recomputes the path. Returns the repaired
    /// nodes.
    pub fn simulate_update(&mut self, changed: &[Cell]) -> Vec<Node> {
        let mut touched: BTreeSet<usize> = BTreeSet::new();
        for cell in changed {
            let id = cell.index.1 * self.width + cell.index.0;
            self.fake_grid[id].occupied = cell.occupied;
            if let Some(own) = &mut self.nodes[id].cell {
                own.occupied = cell.occupied;
            }
            touched.insert(id);
            for (nb, _) in grid_neighbours(id, self.width, self.height) {
                touched.insert(nb);
            }
        }
        for id in &touched {
            self.update_cell(*id);
        }
        let _ = self.compute_shortest_path();
        touched.iter().map(|id| self.nodes[*id].clone()).collect()
    }

    /// Traces the current path from the search target back along the
    /// steepest descent of `g` and stores it root-to-target. Flags the
    /// path invalid when the target is unreachable.
    fn extract_path(&mut self) {
        self.path.clear();
        self.valid_path = true;
        let settled = self.nodes[self.goal_id].gcost.is_finite()
            && values_equal(
                self.nodes[self.goal_id].gcost,
                self.nodes[self.goal_id].rhs,
            );
        if !settled {
            self.valid_path = false;
            return;
        }

        let mut trace = vec![self.goal_id];
        let mut current = self.goal_id;
        while current != self.start_id {
            let mut best: Option<(usize, f64)> = None;
            for (nb, diagonal) in grid_neighbours(current, self.width, self.height) {
                let value = self.nodes[nb].gcost + self.edge_cost(nb, current, diagonal);
                if value.is_finite() && best.map_or(true, |(_, b)| value < b) {
                    best = Some((nb, value));
                }
            }
            match best {
                Some((nb, _)) => {
                    current = nb;
                    trace.push(current);
                }
                None => {
                    self.valid_path = false;
                    return;
                }
            }
            if trace.len() > self.nodes.len() {
                self.valid_path = false;
                return;
            }
        }
        trace.reverse();
        self.path = trace.into_iter().map(|id| self.nodes[id].clone()).collect();
    }

    /// Most current path, search root first.
    pub fn return_path(&self) -> Vec<Node> {
        self.path.clone()
    }

    pub fn return_valid(&self) -> bool {
        self.valid_path
    }

    pub fn inflated_obstacles(&self) -> &[Obstacle] {
        &self.inflated
    }
}

/// D* Lite: LPA* rooted at the goal, replanning from a moving robot.
///
/// Holds the LPA* machinery by composition with start and goal
/// swapped; as the robot advances, the heuristic anchor follows it
/// and `km` accumulates the travelled heuristic so stale open-list
/// keys remain valid lower bounds.
pub struct DstarLite {
    inner: LpaStar,
    last: Option<usize>,
}

impl DstarLite {
    pub fn new(obstacles: Vec<Obstacle>, inflate: f64) -> Self {
        DstarLite {
            inner: LpaStar::new(obstacles, inflate),
            last: None,
        }
    }

    pub fn set_iteration_cap(&mut self, cap: usize) {
        self.inner.set_iteration_cap(cap);
    }

    /// Roots the search at the goal so the tree survives robot motion.
    pub fn initialize(
        &mut self,
        start: Vector2D,
        goal: Vector2D,
        grid: &Grid,
        resolution: f64,
    ) -> Result<(), PlannerError> {
        self.inner.initialize(goal, start, grid, resolution)?;
        self.last = Some(self.inner.goal_id);
        Ok(())
    }

    pub fn compute_shortest_path(&mut self) -> Result<(), PlannerError> {
        self.inner.compute_shortest_path()
    }

    /// Advances the effective start to `position` (bumping `km` by the
    /// heuristic distance travelled), then applies the cell flips
    /// exactly as LPA* does.
    pub fn simulate_update(&mut self, position: &Cell, changed: &[Cell]) -> Vec<Node> {
        let pos_id = position.index.1 * self.inner.width + position.index.0;
        if let Some(last) = self.last {
            if last != pos_id {
                let from = self.inner.nodes[last].coords();
                let to = self.inner.nodes[pos_id].coords();
                self.inner.km += heuristic(&from, &to);
                self.inner.h_target_id = pos_id;
                self.inner.goal_id = pos_id;
                self.last = Some(pos_id);
            }
        }
        self.inner.simulate_update(changed)
    }

    /// Most current path, robot position first: the LPA* trace
    /// reversed, since the underlying search runs goal-to-robot.
    pub fn return_path(&self) -> Vec<Node> {
        let mut path = self.inner.return_path();
        path.reverse();
        path
    }

    pub fn return_valid(&self) -> bool {
        self.inner.return_valid()
    }

    /// Heuristic accumulator; monotone non-decreasing over a mission.
    pub fn km(&self) -> f64 {
        self.inner.km
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundaries::Boundaries;
    use crate::planner::astar::Astar;
    use crate::planner::path_length;
    use approx::assert_relative_eq;

    fn scenario_grid() -> Grid {
        let obstacle = Obstacle::new(vec![
            Vector2D::new(0.3, 1.0),
            Vector2D::new(1.1, 1.0),
            Vector2D::new(1.1, 1.5),
            Vector2D::new(0.3, 1.5),
        ])
        .unwrap();
        let mut grid =
            Grid::with_bounds(vec![obstacle], 0.1, Boundaries::new(0.0, 3.0, 0.0, 3.0));
        grid.build_map(0.1).unwrap();
        grid
    }

    fn start() -> Vector2D {
        Vector2D::new(0.7, 0.3)
    }

    fn goal() -> Vector2D {
        Vector2D::new(0.7, 2.6)
    }

    #[test]
    fn test_initial_plan_ignores_unseen_obstacle() {
        let grid = scenario_grid();
        let mut lpa = LpaStar::new(vec![], 0.1);
        lpa.initialize(start(), goal(), &grid, 0.1).unwrap();
        lpa.compute_shortest_path().unwrap();
        // perceived grid is empty, so the first path runs straight
        assert!(lpa.return_valid());
        assert_relative_eq!(path_length(&lpa.return_path()), 2.3, epsilon = 1e-9);
    }

    #[test]
    fn test_open_list_settles_consistent() {
        let grid = scenario_grid();
        let mut lpa = LpaStar::new(vec![], 0.1);
        lpa.initialize(start(), goal(), &grid, 0.1).unwrap();
        lpa.compute_shortest_path().unwrap();

        let goal_key = lpa.calculate_key(lpa.goal_id);
        for node in &lpa.nodes {
            match node.state {
                NodeState::Open => {
                    assert!(
                        !key_less((node.key1, node.key2), goal_key),
                        "open node {} below goal key",
                        node.id
                    );
                }
                _ => {
                    assert!(
                        values_equal(node.gcost, node.rhs),
                        "settled node {} is inconsistent",
                        node.id
                    );
                }
            }
        }
    }

    #[test]
    fn test_replan_matches_fresh_astar() {
        let mut grid = scenario_grid();
        let mut lpa = LpaStar::new(vec![], 0.1);
        lpa.initialize(start(), goal(), &grid, 0.1).unwrap();
        lpa.compute_shortest_path().unwrap();

        // reveal the whole obstacle at once
        let from = *grid.cell_at(&Vector2D::new(0.7, 1.2)).unwrap();
        let changed = grid.update_grid(&from, 12);
        assert!(!changed.is_empty());
        lpa.simulate_update(&changed);
        assert!(lpa.return_valid());

        let reference = Astar::new(vec![], 0.1)
            .plan_fake_grid(start(), goal(), &grid, 0.1)
            .unwrap();
        assert_relative_eq!(
            path_length(&lpa.return_path()),
            path_length(&reference),
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_start_on_boundary_cell_is_out_of_bounds() {
        let grid = scenario_grid();
        let mut lpa = LpaStar::new(vec![], 0.1);
        let result = lpa.initialize(Vector2D::new(0.01, 0.01), goal(), &grid, 0.1);
        assert!(matches!(result, Err(PlannerError::OutOfBounds { .. })));
    }

    #[test]
    fn test_dstar_lite_static_path_matches_lpastar() {
        let mut grid = Grid::with_bounds(vec![], 0.1, Boundaries::new(0.0, 3.0, 0.0, 3.0));
        grid.build_map(0.1).unwrap();

        let mut lpa = LpaStar::new(vec![], 0.1);
        lpa.initialize(start(), goal(), &grid, 0.1).unwrap();
        lpa.compute_shortest_path().unwrap();

        let mut dsl = DstarLite::new(vec![], 0.1);
        dsl.initialize(start(), goal(), &grid, 0.1).unwrap();
        dsl.compute_shortest_path().unwrap();

        let lpa_cells: Vec<_> = lpa
            .return_path()
            .iter()
            .map(|n| n.cell.unwrap().index)
            .collect();
        let dsl_cells: Vec<_> = dsl
            .return_path()
            .iter()
            .map(|n| n.cell.unwrap().index)
            .collect();
        // unique optimal column path, so the sequences agree exactly
        assert_eq!(lpa_cells, dsl_cells);
        assert_relative_eq!(dsl.km(), 0.0);
    }

    #[test]
    fn test_iteration_cap_flags_path_invalid() {
        let grid = scenario_grid();
        let mut lpa = LpaStar::new(vec![], 0.1);
        lpa.initialize(start(), goal(), &grid, 0.1).unwrap();
        lpa.set_iteration_cap(3);
        let result = lpa.compute_shortest_path();
        assert!(matches!(result, Err(PlannerError::IterationCapExceeded(3))));
        assert!(!lpa.return_valid());
    }
}
