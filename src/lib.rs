/*!
gplan
========

**gplan** is a **g**lobal path **plan**ning library written with
the rust programming language.

It plans collision-free polyline paths for a point-like robot moving
among convex polygonal obstacles in a bounded 2D workspace. Maps come
in two flavours (probabilistic roadmaps and occupancy grids), planners
in four: A* and Theta* for single-shot queries, LPA* and D* Lite for
incremental replanning under growing visibility, plus a potential
field descender.

*/

pub mod boundaries;
pub mod error;
pub mod grid;
pub mod obstacle;
pub mod planner;
pub mod prm;
pub mod vector2d;
