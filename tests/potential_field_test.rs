use gplan::error::PlannerError;
use gplan::obstacle::Obstacle;
use gplan::planner::PotentialField;
use gplan::vector2d::Vector2D;

fn rectangle(min: Vector2D, max: Vector2D) -> Obstacle {
    Obstacle::new(vec![
        Vector2D::new(min.x, min.y),
        Vector2D::new(max.x, min.y),
        Vector2D::new(max.x, max.y),
        Vector2D::new(min.x, max.y),
    ])
    .unwrap()
}

/// Three walls forming a U open at the top, pocketing the goal. The
/// straight-line descent from below runs into the closed side.
fn u_trap() -> Vec<Obstacle> {
    vec![
        rectangle(Vector2D::new(0.2, 1.8), Vector2D::new(0.8, 1.9)),
        rectangle(Vector2D::new(0.2, 1.9), Vector2D::new(0.3, 2.8)),
        rectangle(Vector2D::new(0.7, 1.9), Vector2D::new(0.8, 2.8)),
    ]
}

#[test]
fn u_shaped_trap_terminates_in_local_minimum() {
    let mut pf = PotentialField::new(u_trap(), 0.05, 0.01, 0.01, 1.0, 2.0, 0.1);
    let goal = Vector2D::new(0.5, 2.4);
    let mut q = Vector2D::new(0.5, 0.5);

    let mut outcome = Ok(());
    for _ in 0..6000 {
        if pf.return_terminate() {
            break;
        }
        match pf.one_step_gd(q, goal) {
            Ok(next) => q = next,
            Err(e) => outcome = Err(e),
        }
    }

    assert!(pf.return_terminate());
    assert!(!pf.reached_goal());
    assert_eq!(outcome, Err(PlannerError::LocalMinimum));
    assert!(
        q.distance(&goal) > 0.05,
        "descent should be stuck outside the goal tolerance"
    );
    // the bottom wall is between the robot and the goal
    assert!(q.y < 1.8);

    // once terminated, further steps do not move the robot
    let frozen = pf.one_step_gd(q, goal).unwrap();
    assert_eq!(frozen, q);
}

#[test]
fn offset_obstacle_is_skirted() {
    // obstacle well off the straight line: repulsion perturbs but
    // cannot trap the descent
    let obstacle = rectangle(Vector2D::new(0.9, 0.8), Vector2D::new(1.4, 1.2));
    let mut pf = PotentialField::new(vec![obstacle.clone()], 0.05, 0.01, 0.02, 1.0, 2.0, 0.1);
    let goal = Vector2D::new(2.0, 0.2);
    let mut q = Vector2D::new(0.0, 0.2);

    for _ in 0..6000 {
        if pf.return_terminate() {
            break;
        }
        if let Ok(next) = pf.one_step_gd(q, goal) {
            q = next;
        }
    }

    assert!(pf.return_terminate());
    assert!(pf.reached_goal());
    let inflated = obstacle.inflate(0.05);
    assert!(!inflated.contains(&q));
}
