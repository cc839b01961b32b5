//! Geometry calculations for node placement.
//!
//! Contains helper functions for:
//! - Distance calculations (squared distance to avoid sqrt in hot paths)
//! - Radial node placement around the base station with a minimum separation

use rand::Rng;

use super::types::Point;

/// Minimum separation between two nodes in meters.
pub const MIN_NODE_SEPARATION: f64 = 10.0;

/// Number of candidate positions tried per node before placement gives up.
pub const MAX_PLACEMENT_ATTEMPTS: usize = 1000;

/// Squared Euclidean distance in meters (avoids a sqrt in hot paths).
///
/// Used by the separation check, which compares d² against the squared minimum.
pub fn distance2(a: &Point, b: &Point) -> f64 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    dx * dx + dy * dy
}

/// Euclidean distance in meters.
pub fn distance(a: &Point, b: &Point) -> f64 {
    distance2(a, b).sqrt()
}

/// Draw a candidate position inside a disc of radius `max_distance` around `center`.
///
/// Two uniform draws `a <= b` are mapped to polar coordinates
/// (r = b·R, θ = 2π·a/b), which spreads nodes evenly over the disc area.
fn radial_candidate<R: Rng + ?Sized>(center: &Point, max_distance: f64, rng: &mut R) -> Point {
    let mut a: f64 = rng.gen_range(0.0..1.0);
    let mut b: f64 = rng.gen_range(0.0..1.0);
    if b < a {
        std::mem::swap(&mut a, &mut b);
    }
    // b == 0 implies a == 0; the node sits on the center
    let angle = if b > 0.0 { 2.0 * std::f64::consts::PI * a / b } else { 0.0 };
    Point {
        x: b * max_distance * angle.cos() + center.x,
        y: b * max_distance * angle.sin() + center.y,
    }
}

/// Place a new node around `center`, keeping `MIN_NODE_SEPARATION` from every
/// already placed node.
///
/// # Parameters
///
/// * `center` - Base station position
/// * `max_distance` - Coverage radius in meters
/// * `existing` - Positions of the nodes placed so far
/// * `rng` - Simulation random source
///
/// # Returns
///
/// `Some(position)` on success, `None` when `MAX_PLACEMENT_ATTEMPTS` candidates
/// were all too close to an existing node.
pub fn place_node<R: Rng + ?Sized>(center: &Point, max_distance: f64, existing: &[Point], rng: &mut R) -> Option<Point> {
    let min_d2 = MIN_NODE_SEPARATION * MIN_NODE_SEPARATION;

    for _ in 0..MAX_PLACEMENT_ATTEMPTS {
        let candidate = radial_candidate(center, max_distance, rng);
        if existing.iter().all(|p| distance2(p, &candidate) >= min_d2) {
            return Some(candidate);
        }
    }

    None
}
