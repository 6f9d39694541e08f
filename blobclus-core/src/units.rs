//! System of units.
//!
//! Lengths are carried in millimetres and angles in radians, so a value
//! written as `60.0 * CM` reads the same as the detector literature.

/// Millimetre, the base length unit.
pub const MM: f64 = 1.0;
/// Centimetre.
pub const CM: f64 = 10.0 * MM;
/// Metre.
pub const M: f64 = 1000.0 * MM;

/// Degree expressed in radians.
pub const DEGREE: f64 = std::f64::consts::PI / 180.0;
