//! Merge-candidate predicates and the passes built on them.
//!
//! Every family follows the same outline: find a representative close pair
//! of points, cut on their distance, fit local directions near the pair,
//! classify the join as parallel (perpendicular to drift), prolonged (along
//! a wire plane) or regular, and accept when the angles fit that case's
//! tolerances. The thresholds are empirical tunings and are exposed as
//! parameter structs.

mod close;
mod extend;
mod live_dead;
mod parallel_prolong;
mod regular;

pub use close::{close_accepts, ClosePass, CloseParams};
pub use extend::{
    dead_bridge_accepts, parallel_accepts, prolong_accepts, regular_extension_accepts,
    ExtendFlavor, ExtendParams, ExtendPass,
};
pub use live_dead::{live_dead_accepts, LiveDeadParams, LiveDeadPass};
pub use parallel_prolong::{parallel_prolong_accepts, ParallelProlongParams, ParallelProlongPass};
pub use regular::{regular_accepts, RegularParams, RegularPass};

use blobclus_core::geom::{angle_deg, parallel_deviation};
use blobclus_core::units::CM;
use blobclus_core::{DetectorParams, Point, Vector};

use crate::facade::Cluster;

/// Angle in degrees; callers rule out zero vectors first.
pub(crate) fn angle(a: &Vector, b: &Vector) -> f64 {
    angle_deg(a, b).unwrap_or(0.0)
}

/// Returns true if any direction is zero or not finite.
pub(crate) fn degenerate(dirs: &[&Vector]) -> bool {
    dirs.iter().any(|d| {
        let n = d.norm();
        n == 0.0 || !n.is_finite()
    })
}

/// `|angle(dir, drift) - 90|` in degrees; callers rule out zero vectors first.
pub(crate) fn drift_deviation(dir: &Vector, detector: &DetectorParams) -> f64 {
    parallel_deviation(dir, detector).unwrap_or(90.0)
}

/// Checks a joint for a continuous track by sampling along `dir`.
///
/// Starting from `start`, points at `-(dis + 2k cm) * dir` for k in -5..10
/// are snapped to `target`; snaps within 1.5 cm are projected back onto
/// `dir`. Returns the extent of those projections, 0 if fewer than one hit.
pub(crate) fn spread_along(target: &Cluster<'_>, start: &Point, dir: &Vector, dis: f64) -> f64 {
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for k in -5..10 {
        let probe = start - dir * (dis + f64::from(k) * 2.0 * CM);
        let Some((snap, _)) = target.closest_point(&probe) else {
            return 0.0;
        };
        if (snap - probe).norm() < 1.5 * CM {
            let t = -(snap - start).dot(dir);
            lo = lo.min(t);
            hi = hi.max(t);
        }
    }
    if hi >= lo {
        hi - lo
    } else {
        0.0
    }
}

/// Direction fit with a radius chosen by local density.
///
/// Uses `dense_radius` when more than `min_points` points lie within it and
/// `dense` allows it, otherwise `wide_radius`.
pub(crate) fn density_direction(
    cluster: &Cluster<'_>,
    at: &Point,
    dense: bool,
    dense_radius: f64,
    min_points: usize,
    wide_radius: f64,
) -> Vector {
    let radius = if dense && cluster.point_count(at, dense_radius) > min_points {
        dense_radius
    } else {
        wide_radius
    };
    cluster.direction(at, radius)
}
