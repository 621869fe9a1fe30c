use approx::assert_relative_eq;

use gplan::boundaries::Boundaries;
use gplan::grid::Grid;
use gplan::obstacle::Obstacle;
use gplan::planner::{path_length, Astar, DstarLite, LpaStar};
use gplan::vector2d::Vector2D;

fn workspace() -> Boundaries {
    Boundaries::new(0.0, 3.0, 0.0, 3.0)
}

fn start() -> Vector2D {
    Vector2D::new(0.7, 0.3)
}

fn goal() -> Vector2D {
    Vector2D::new(0.7, 2.6)
}

fn square_obstacle() -> Obstacle {
    Obstacle::new(vec![
        Vector2D::new(0.3, 1.0),
        Vector2D::new(1.1, 1.0),
        Vector2D::new(1.1, 1.5),
        Vector2D::new(0.3, 1.5),
    ])
    .unwrap()
}

fn scenario_grid() -> Grid {
    let mut grid = Grid::with_bounds(vec![square_obstacle()], 0.1, workspace());
    grid.build_map(0.1).unwrap();
    grid
}

/// Walks the LPA* mission the way the original replay loop does:
/// advance a waypoint, reveal the surroundings, feed the flips back.
#[test]
fn lpastar_replan_matches_astar_on_perceived_grid() {
    let mut grid = scenario_grid();
    let mut lpa = LpaStar::new(vec![square_obstacle()], 0.1);
    lpa.initialize(start(), goal(), &grid, 0.1).unwrap();
    lpa.compute_shortest_path().unwrap();

    let mut path = lpa.return_path();
    assert_relative_eq!(path_length(&path), 2.3, epsilon = 1e-9);

    let mut first_update_at = None;
    let mut counter = 0usize;
    while counter + 1 < path.len() {
        let cell = path[counter].cell.unwrap();
        let changed = grid.update_grid(&cell, 1);
        if !changed.is_empty() {
            first_update_at.get_or_insert(counter);
            lpa.simulate_update(&changed);
            assert!(lpa.return_valid());
            path = lpa.return_path();
        }
        counter += 1;
    }

    // with visibility 1 the obstacle enters view five waypoints in
    assert_eq!(first_update_at, Some(5));
    assert!(path_length(&path) > 2.3);

    let reference = Astar::new(vec![square_obstacle()], 0.1)
        .plan_fake_grid(start(), goal(), &grid, 0.1)
        .unwrap();
    assert_relative_eq!(
        path_length(&path),
        path_length(&reference),
        epsilon = 1e-6
    );
}

#[test]
fn dstar_lite_moving_start() {
    let mut grid = scenario_grid();
    let mut dsl = DstarLite::new(vec![square_obstacle()], 0.1);
    dsl.initialize(start(), goal(), &grid, 0.1).unwrap();
    dsl.compute_shortest_path().unwrap();

    let mut position = dsl.return_path()[0].cell.unwrap();
    let mut last_km = 0.0;
    for _ in 0..10 {
        let path = dsl.return_path();
        assert!(dsl.return_valid());
        if path.len() > 1 {
            position = path[1].cell.unwrap();
        }
        let changed = grid.update_grid(&position, 1);
        dsl.simulate_update(&position, &changed);

        assert!(dsl.km() >= last_km, "km decreased");
        last_km = dsl.km();
    }
    assert!(dsl.km() > 0.0);
    assert!(dsl.return_valid());

    // the remaining plan runs from the robot to the goal and is as
    // good as a fresh A* on the same perceived grid
    let remaining = dsl.return_path();
    assert_eq!(remaining.first().unwrap().cell.unwrap().index, position.index);
    assert_eq!(
        remaining.last().unwrap().cell.unwrap().index,
        (7, 26),
        "plan no longer ends at the goal cell"
    );
    let reference = Astar::new(vec![square_obstacle()], 0.1)
        .plan_fake_grid(position.center_coords, goal(), &grid, 0.1)
        .unwrap();
    assert_relative_eq!(
        path_length(&remaining),
        path_length(&reference),
        epsilon = 1e-6
    );
}

/// Incremental equivalence after an arbitrary update sequence: every
/// replan must match a fresh search on the current perception.
#[test]
fn lpastar_stays_equivalent_across_update_batches() {
    let mut grid = scenario_grid();
    let mut lpa = LpaStar::new(vec![square_obstacle()], 0.1);
    lpa.initialize(start(), goal(), &grid, 0.1).unwrap();
    lpa.compute_shortest_path().unwrap();

    let astar = Astar::new(vec![square_obstacle()], 0.1);
    let probes = [
        Vector2D::new(0.45, 0.95),
        Vector2D::new(1.15, 1.25),
        Vector2D::new(0.45, 1.55),
    ];
    for probe in probes {
        let from = *grid.cell_at(&probe).unwrap();
        let changed = grid.update_grid(&from, 2);
        lpa.simulate_update(&changed);
        assert!(lpa.return_valid());

        let reference = astar.plan_fake_grid(start(), goal(), &grid, 0.1).unwrap();
        assert_relative_eq!(
            path_length(&lpa.return_path()),
            path_length(&reference),
            epsilon = 1e-6
        );
    }
}
