use std::collections::{BTreeMap, BTreeSet};

use petgraph::graph::{Graph, NodeIndex};
use petgraph::Undirected;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rstar::primitives::GeomWithData;
use rstar::RTree;
use tracing::info;

use crate::boundaries::Boundaries;
use crate::error::PlannerError;
use crate::obstacle::Obstacle;
use crate::vector2d::Vector2D;

/// Roadmap node: a collision-free configuration with its symmetric
/// adjacency. `edge_costs` holds the Euclidean length per neighbour.
#[derive(Debug, Clone, PartialEq)]
pub struct Vertex {
    pub id: usize,
    pub coords: Vector2D,
    pub id_set: BTreeSet<usize>,
    pub edge_costs: BTreeMap<usize, f64>,
}

impl Vertex {
    pub fn new(id: usize, coords: Vector2D) -> Self {
        Vertex {
            id,
            coords,
            id_set: BTreeSet::new(),
            edge_costs: BTreeMap::new(),
        }
    }
}

type SamplePoint = GeomWithData<[f64; 2], usize>;

/// Probabilistic roadmap builder.
///
/// Samples collision-free configurations inside the workspace bounds
/// and connects each to its nearest visible neighbours. The roadmap
/// is mirrored into a petgraph graph for export and for reference
/// algorithms.
pub struct Prm {
    inflated: Vec<Obstacle>,
    bounds: Boundaries,
    rng: StdRng,
    nodes: Vec<Vertex>,
    graph: Graph<Vector2D, f64, Undirected>,
}

impl Prm {
    /// Workspace bounds are the bounding box of all obstacle vertices.
    pub fn new(obstacles: Vec<Obstacle>, inflate: f64) -> Result<Self, PlannerError> {
        let bounds = Boundaries::from_obstacles(&obstacles).ok_or_else(|| {
            PlannerError::InvalidGeometry(
                "cannot derive workspace bounds from an empty obstacle set".to_string(),
            )
        })?;
        Ok(Self::with_bounds(obstacles, inflate, bounds))
    }

    pub fn with_bounds(obstacles: Vec<Obstacle>, inflate: f64, bounds: Boundaries) -> Self {
        let inflated = obstacles.iter().map(|o| o.inflate(inflate)).collect();
        Prm {
            inflated,
            bounds,
            rng: StdRng::from_os_rng(),
            nodes: Vec::new(),
            graph: Graph::new_undirected(),
        }
    }

    /// Reseeds the sampler for reproducible roadmaps.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Samples `n` configurations (rejecting collisions and samples
    /// closer than `thresh` to an existing one) and connects each to
    /// its `k` nearest visible neighbours with symmetric edges.
    pub fn build_map(&mut self, n: usize, k: usize, thresh: f64) -> Result<(), PlannerError> {
        self.nodes.clear();
        self.graph = Graph::new_undirected();
        let mut tree: RTree<SamplePoint> = RTree::new();

        let max_attempts = 100 * n.max(1);
        let mut attempts = 0usize;
        while self.nodes.len() < n {
            attempts += 1;
            if attempts > max_attempts {
                return Err(PlannerError::IterationCapExceeded(max_attempts));
            }

            let candidate = self.bounds.sample(&mut self.rng);
            if self.inflated.iter().any(|o| o.contains(&candidate)) {
                continue;
            }
            if let Some(nearest) = tree.nearest_neighbor(&[candidate.x, candidate.y]) {
                let closest = Vector2D::new(nearest.geom()[0], nearest.geom()[1]);
                if candidate.distance(&closest) < thresh {
                    continue;
                }
            }

            let id = self.nodes.len();
            tree.insert(SamplePoint::new([candidate.x, candidate.y], id));
            self.nodes.push(Vertex::new(id, candidate));
            self.graph.add_node(candidate);
        }

        for id in 0..self.nodes.len() {
            self.connect_node(id, k, &tree);
        }

        info!(
            nodes = self.nodes.len(),
            edges = self.graph.edge_count(),
            "roadmap built"
        );
        Ok(())
    }

    /// Walks neighbour candidates in increasing distance and stops
    /// after `k` collision-free connections. Edges inserted earlier
    /// from the symmetric side count toward `k`.
    fn connect_node(&mut self, id: usize, k: usize, tree: &RTree<SamplePoint>) {
        let coords = self.nodes[id].coords;
        let mut connected = 0usize;
        for candidate in tree.nearest_neighbor_iter(&[coords.x, coords.y]) {
            if candidate.data == id {
                continue;
            }
            if connected >= k {
                break;
            }
            if self.nodes[id].id_set.contains(&candidate.data) {
                connected += 1;
                continue;
            }
            let other = self.nodes[candidate.data].coords;
            if self.inflated.iter().any(|o| o.blocks_segment(&coords, &other)) {
                continue;
            }
            self.insert_edge(id, candidate.data, coords.distance(&other));
            connected += 1;
        }
    }

    fn insert_edge(&mut self, a: usize, b: usize, cost: f64) {
        self.nodes[a].id_set.insert(b);
        self.nodes[a].edge_costs.insert(b, cost);
        self.nodes[b].id_set.insert(a);
        self.nodes[b].edge_costs.insert(a, cost);

        let (na, nb) = (NodeIndex::new(a), NodeIndex::new(b));
        if self.graph.find_edge(na, nb).is_none() {
            self.graph.add_edge(na, nb, cost);
        }
    }

    pub fn return_prm(&self) -> &[Vertex] {
        &self.nodes
    }

    pub fn get_graph(&self) -> &Graph<Vector2D, f64, Undirected> {
        &self.graph
    }

    pub fn inflated_obstacles(&self) -> &[Obstacle] {
        &self.inflated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn obstacle() -> Obstacle {
        Obstacle::new(vec![
            Vector2D::new(1.0, 1.0),
            Vector2D::new(2.0, 1.0),
            Vector2D::new(2.0, 2.0),
            Vector2D::new(1.0, 2.0),
        ])
        .unwrap()
    }

    fn build_roadmap(seed: u64) -> Prm {
        let bounds = Boundaries::new(0.0, 3.0, 0.0, 3.0);
        let mut prm = Prm::with_bounds(vec![obstacle()], 0.1, bounds);
        prm.reseed(seed);
        prm.build_map(60, 4, 0.05).unwrap();
        prm
    }

    #[test]
    fn test_samples_are_collision_free_and_separated() {
        let prm = build_roadmap(1);
        let nodes = prm.return_prm();
        assert_eq!(nodes.len(), 60);
        for v in nodes {
            assert!(
                !prm.inflated[0].contains(&v.coords),
                "sample inside obstacle"
            );
        }
        for a in nodes {
            for b in nodes.iter().skip(a.id + 1) {
                assert!(a.coords.distance(&b.coords) >= 0.05);
            }
        }
    }

    #[test]
    fn test_edges_are_symmetric_with_equal_cost() {
        let prm = build_roadmap(2);
        let nodes = prm.return_prm();
        for v in nodes {
            for (nb, cost) in &v.edge_costs {
                assert!(nodes[*nb].id_set.contains(&v.id));
                assert_relative_eq!(nodes[*nb].edge_costs[&v.id], *cost);
                assert_relative_eq!(*cost, v.coords.distance(&nodes[*nb].coords));
            }
        }
    }

    #[test]
    fn test_edges_avoid_obstacles() {
        let prm = build_roadmap(3);
        let nodes = prm.return_prm();
        for v in nodes {
            for nb in &v.id_set {
                assert!(
                    !prm.inflated[0].blocks_segment(&v.coords, &nodes[*nb].coords),
                    "edge {} -> {} crosses the obstacle",
                    v.id,
                    nb
                );
            }
        }
    }

    #[test]
    fn test_same_seed_same_roadmap() {
        let a = build_roadmap(42);
        let b = build_roadmap(42);
        for (va, vb) in a.return_prm().iter().zip(b.return_prm()) {
            assert_eq!(va.coords, vb.coords);
            assert_eq!(va.id_set, vb.id_set);
        }
    }

    #[test]
    fn test_graph_mirror_matches_adjacency() {
        let prm = build_roadmap(5);
        let edge_total: usize = prm.return_prm().iter().map(|v| v.id_set.len()).sum();
        assert_eq!(prm.get_graph().edge_count() * 2, edge_total);
        assert_eq!(prm.get_graph().node_count(), 60);
    }
}
