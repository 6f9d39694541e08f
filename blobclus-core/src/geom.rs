//! Detector geometry and direction tests.
//!
//! The detector reads out through three wire planes. A direction that runs
//! along a plane's wires ("prolonged") or perpendicular to the drift axis
//! ("parallel") is poorly resolved, and the merge heuristics treat those
//! cases with their own tolerances.

#![allow(clippy::similar_names)]

use nalgebra::{Point3, Vector2, Vector3};

use crate::units::{DEGREE, MM};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A 3D position.
pub type Point = Point3<f64>;
/// A 3D displacement or direction.
pub type Vector = Vector3<f64>;

/// Wire plane label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Plane {
    U,
    V,
    W,
}

impl Plane {
    pub const ALL: [Plane; 3] = [Plane::U, Plane::V, Plane::W];

    /// Position of the plane in per-plane arrays.
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Plane::U => 0,
            Plane::V => 1,
            Plane::W => 2,
        }
    }
}

/// Fixed detector constants used by the clustering.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DetectorParams {
    /// Wire angle of each plane in radians, U V W.
    pub angles: [f64; 3],
    /// Wire pitch of each plane.
    pub pitches: [f64; 3],
    /// Time-slice width along the drift axis.
    pub ts_width: f64,
    /// Drift axis.
    pub drift: [f64; 3],
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            angles: [1.0472, -1.0472, 0.0],
            pitches: [3.0 * MM; 3],
            ts_width: 3.2 * MM,
            drift: [1.0, 0.0, 0.0],
        }
    }
}

impl DetectorParams {
    #[must_use]
    pub fn with_angles(mut self, angles: [f64; 3]) -> Self {
        self.angles = angles;
        self
    }

    #[must_use]
    pub fn with_pitches(mut self, pitches: [f64; 3]) -> Self {
        self.pitches = pitches;
        self
    }

    #[must_use]
    pub fn with_ts_width(mut self, ts_width: f64) -> Self {
        self.ts_width = ts_width;
        self
    }

    /// Drift axis as a vector.
    #[must_use]
    pub fn drift_dir(&self) -> Vector {
        Vector::new(self.drift[0], self.drift[1], self.drift[2])
    }

    /// Unit vector along the wires of `plane`.
    #[must_use]
    pub fn wire_dir(&self, plane: Plane) -> Vector {
        let a = self.angles[plane.index()];
        Vector::new(0.0, a.cos(), a.sin())
    }

    /// Unit vector across the wires of `plane`, within the wire plane.
    #[must_use]
    pub fn pitch_dir(&self, plane: Plane) -> Vector {
        let a = self.angles[plane.index()];
        Vector::new(0.0, -a.sin(), a.cos())
    }
}

/// Angle between two vectors in radians, `None` if either is zero or not
/// finite.
#[must_use]
pub fn angle_between(a: &Vector, b: &Vector) -> Option<f64> {
    let na = a.norm();
    let nb = b.norm();
    if na == 0.0 || nb == 0.0 || !na.is_finite() || !nb.is_finite() {
        return None;
    }
    Some((a.dot(b) / (na * nb)).clamp(-1.0, 1.0).acos())
}

/// Angle in degrees, `None` when degenerate.
#[must_use]
pub fn angle_deg(a: &Vector, b: &Vector) -> Option<f64> {
    angle_between(a, b).map(|r| r / DEGREE)
}

/// Deviation of `dir` from running along the wires of `plane`, in degrees.
///
/// The transverse part of `dir` is split into its component along the
/// plane's wires and across them; the result is the angle between the
/// drift axis and (|drift part|, across-wire part). Small values mean the
/// direction is seen by that plane as a single wire.
#[must_use]
pub fn prolong_angle(dir: &Vector, plane: Plane, params: &DetectorParams) -> Option<f64> {
    let drift = params.drift_dir();
    if dir.norm() == 0.0 || !dir.norm().is_finite() || drift.norm() == 0.0 {
        return None;
    }
    let along = drift * dir.dot(&drift) / drift.norm_squared();
    let transverse = dir - along;
    let a = angle_between(&transverse, &params.wire_dir(plane)).unwrap_or(0.0);
    let projected = Vector::new(along.norm(), transverse.norm() * a.sin(), 0.0);
    // Exactly along the wires projects to nothing.
    Some(angle_deg(&projected, &Vector::new(1.0, 0.0, 0.0)).unwrap_or(0.0))
}

/// Per-plane prolongation angles in degrees, U V W.
#[must_use]
pub fn wire_plane_angles(dir: &Vector, params: &DetectorParams) -> Option<[f64; 3]> {
    let u = prolong_angle(dir, Plane::U, params)?;
    let v = prolong_angle(dir, Plane::V, params)?;
    let w = prolong_angle(dir, Plane::W, params)?;
    Some([u, v, w])
}

/// Returns true if `dir` runs along the wires of any plane within `cut_deg`.
#[must_use]
pub fn is_prolonged(dir: &Vector, params: &DetectorParams, cut_deg: f64) -> bool {
    wire_plane_angles(dir, params).is_some_and(|a| a.iter().any(|&x| x < cut_deg))
}

/// `|angle(dir, drift) - 90°|` in degrees.
#[must_use]
pub fn parallel_deviation(dir: &Vector, params: &DetectorParams) -> Option<f64> {
    angle_deg(dir, &params.drift_dir()).map(|a| (a - 90.0).abs())
}

/// Returns true if `dir` is perpendicular to the drift axis within `cut_deg`.
#[must_use]
pub fn is_parallel(dir: &Vector, params: &DetectorParams, cut_deg: f64) -> bool {
    parallel_deviation(dir, params).is_some_and(|d| d < cut_deg)
}

/// Compares two directions as seen by each wire plane.
///
/// Both directions are projected onto each plane's (drift, pitch) view. A
/// view counts when the projections agree within `cut_deg` (or are
/// anti-parallel within `cut_deg` when `same_direction` is false), or when
/// either projection vanishes. The directions are consistent when at least
/// `num_cut` views count.
#[must_use]
pub fn is_angle_consistent(
    dir1: &Vector,
    dir2: &Vector,
    same_direction: bool,
    cut_deg: f64,
    params: &DetectorParams,
    num_cut: usize,
) -> bool {
    if dir1.norm() == 0.0 || dir2.norm() == 0.0 {
        return false;
    }
    let drift = params.drift_dir();
    let count = Plane::ALL
        .iter()
        .filter(|&&plane| {
            let pitch = params.pitch_dir(plane);
            let p1 = Vector2::new(dir1.dot(&drift), dir1.dot(&pitch));
            let p2 = Vector2::new(dir2.dot(&drift), dir2.dot(&pitch));
            let (n1, n2) = (p1.norm(), p2.norm());
            if n1 == 0.0 || n2 == 0.0 {
                return true;
            }
            let angle = (p1.dot(&p2) / (n1 * n2)).clamp(-1.0, 1.0).acos() / DEGREE;
            let angle = if same_direction { angle } else { 180.0 - angle };
            angle < cut_deg
        })
        .count();
    count >= num_cut
}
