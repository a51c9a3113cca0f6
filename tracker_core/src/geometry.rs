//! Positional covariance and the small amount of 3-D geometry the
//! correlators need.
//!
//! # Frames
//! World frame is a flat, right-handed [x, y, z] frame in metres. Bearing is
//! measured from +x towards +y (same convention as `atan2(dy, dx)`), elevation
//! from the x-y plane towards +z.
//!
//! # Separation frame
//! Gating compares uncertainty *along the line between two tracks*. Both
//! covariances are rotated into the frame whose x-axis is the separation
//! vector; the rotated (0,0) element is then the variance along that line.

use crate::types::{Mat3, Vec3};
use nalgebra::{Rotation3, Unit};
use serde::{Deserialize, Serialize};

/// Below this norm a direction vector is treated as zero.
const DIRECTION_EPSILON: f64 = 1e-9;

/// Inverse cosine with its argument clamped to [-1, 1].
///
/// Dot products of unit vectors drift slightly outside the domain for
/// (anti)parallel inputs; unclamped `acos` would return NaN there.
pub fn clamped_acos(cos_angle: f64) -> f64 {
    cos_angle.clamp(-1.0, 1.0).acos()
}

/// Rotation that maps the direction of `direction` onto +x.
///
/// Returns `None` for a zero-length direction.
pub fn separation_frame(direction: &Vec3) -> Option<Rotation3<f64>> {
    let norm = direction.norm();
    if norm < DIRECTION_EPSILON {
        return None;
    }
    let unit = direction / norm;
    let x_axis = Vec3::x();
    let angle = clamped_acos(unit.dot(&x_axis));
    let axis = unit.cross(&x_axis);
    if axis.norm() < DIRECTION_EPSILON {
        // Parallel: nothing to do. Antiparallel: any half-turn about an axis
        // orthogonal to x will do; use z.
        return Some(if unit.x > 0.0 {
            Rotation3::identity()
        } else {
            Rotation3::from_axis_angle(&Vec3::z_axis(), std::f64::consts::PI)
        });
    }
    Some(Rotation3::from_axis_angle(&Unit::new_normalize(axis), angle))
}

/// Convert a spherical observation relative to `origin` into the world frame.
pub fn spherical_to_cartesian(origin: &Vec3, range: f64, bearing: f64, elevation: f64) -> Vec3 {
    let horizontal = range * elevation.cos();
    origin
        + Vec3::new(
            horizontal * bearing.cos(),
            horizontal * bearing.sin(),
            range * elevation.sin(),
        )
}

/// Root-sum-square position error of a spherical measurement at `range`:
/// σ² = σr² + (r·σb)² + (r·σe)².
pub fn spherical_position_error(range: f64, range_error: f64, bearing_error: f64, elevation_error: f64) -> f64 {
    let cross_b = range * bearing_error;
    let cross_e = range * elevation_error;
    (range_error * range_error + cross_b * cross_b + cross_e * cross_e).sqrt()
}

// ---------------------------------------------------------------------------
// Covariance
// ---------------------------------------------------------------------------

/// 3×3 positional covariance (m²).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Covariance(pub Mat3);

impl Covariance {
    pub fn new(matrix: Mat3) -> Self {
        Self(matrix)
    }

    pub fn from_diagonal(var_x: f64, var_y: f64, var_z: f64) -> Self {
        Self(Mat3::from_diagonal(&Vec3::new(var_x, var_y, var_z)))
    }

    /// Same standard deviation `sigma` on every axis.
    pub fn isotropic(sigma: f64) -> Self {
        let v = sigma * sigma;
        Self::from_diagonal(v, v, v)
    }

    /// Covariance of a spherical measurement taken from `origin` of a point
    /// at `location`. Range error lies along the line of sight, bearing error
    /// horizontally across it and elevation error vertically across it.
    pub fn from_spherical_errors(
        origin: &Vec3,
        location: &Vec3,
        range_error: f64,
        bearing_error: f64,
        elevation_error: f64,
    ) -> Option<Self> {
        let los = location - origin;
        let range = los.norm();
        if range < DIRECTION_EPSILON {
            return None;
        }
        let e_range = los / range;
        let mut e_bearing = Vec3::z().cross(&e_range);
        if e_bearing.norm() < DIRECTION_EPSILON {
            // Looking straight up or down.
            e_bearing = Vec3::y();
        }
        let e_bearing = e_bearing.normalize();
        let e_elev = e_range.cross(&e_bearing);

        let basis = Mat3::from_columns(&[e_range, e_bearing, e_elev]);
        let cross_b = range * bearing_error;
        let cross_e = range * elevation_error;
        let local = Mat3::from_diagonal(&Vec3::new(
            range_error * range_error,
            cross_b * cross_b,
            cross_e * cross_e,
        ));
        Some(Self(basis * local * basis.transpose()))
    }

    pub fn matrix(&self) -> &Mat3 {
        &self.0
    }

    /// R·P·Rᵀ
    pub fn rotated(&self, rotation: &Rotation3<f64>) -> Self {
        let r = rotation.matrix();
        Self(r * self.0 * r.transpose())
    }

    /// This covariance expressed in the frame whose x-axis is `direction`.
    /// A zero direction leaves the covariance unchanged.
    pub fn in_separation_frame(&self, direction: &Vec3) -> Self {
        match separation_frame(direction) {
            Some(rotation) => self.rotated(&rotation),
            None => *self,
        }
    }

    /// Variance along x (after rotation this is the along-line variance).
    pub fn x_variance(&self) -> f64 {
        self.0[(0, 0)]
    }

    /// Largest diagonal element.
    pub fn max_variance(&self) -> f64 {
        self.0[(0, 0)].max(self.0[(1, 1)]).max(self.0[(2, 2)])
    }

    pub fn trace(&self) -> f64 {
        self.0.trace()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn clamped_acos_never_nan() {
        assert_abs_diff_eq!(clamped_acos(1.000_000_1), 0.0);
        assert_abs_diff_eq!(clamped_acos(-1.000_000_1), std::f64::consts::PI);
    }

    #[test]
    fn separation_frame_maps_direction_onto_x() {
        let dirs = [
            Vec3::new(3.0, 4.0, 0.0),
            Vec3::new(-1.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, -7.0),
            Vec3::new(2.0, 0.0, 0.0),
        ];
        for d in dirs {
            let rot = separation_frame(&d).expect("non-zero direction");
            let mapped = rot * d.normalize();
            assert_abs_diff_eq!(mapped.x, 1.0, epsilon = 1e-9);
            assert_abs_diff_eq!(mapped.y, 0.0, epsilon = 1e-9);
            assert_abs_diff_eq!(mapped.z, 0.0, epsilon = 1e-9);
        }
        assert!(separation_frame(&Vec3::zeros()).is_none());
    }

    #[test]
    fn rotated_x_variance_is_projection_onto_direction() {
        let cov = Covariance::from_diagonal(100.0, 25.0, 4.0);
        let dir = Vec3::new(1.0, 1.0, 0.0);
        let u = dir.normalize();
        let expected = (u.transpose() * cov.matrix() * u)[(0, 0)];
        assert_abs_diff_eq!(cov.in_separation_frame(&dir).x_variance(), expected, epsilon = 1e-9);
        assert_abs_diff_eq!(expected, 62.5, epsilon = 1e-9);
    }

    #[test]
    fn isotropic_covariance_is_rotation_invariant() {
        let cov = Covariance::isotropic(25.0);
        let rotated = cov.in_separation_frame(&Vec3::new(-3.0, 2.0, 9.0));
        assert_abs_diff_eq!(rotated.x_variance(), 625.0, epsilon = 1e-9);
    }

    #[test]
    fn spherical_covariance_puts_range_error_on_line_of_sight() {
        let origin = Vec3::zeros();
        let target = Vec3::new(10_000.0, 0.0, 0.0);
        let cov = Covariance::from_spherical_errors(&origin, &target, 50.0, 0.001, 0.002)
            .expect("non-degenerate geometry");
        assert_abs_diff_eq!(cov.matrix()[(0, 0)], 2500.0, epsilon = 1e-6);
        assert_abs_diff_eq!(cov.matrix()[(1, 1)], 100.0, epsilon = 1e-6);
        assert_abs_diff_eq!(cov.matrix()[(2, 2)], 400.0, epsilon = 1e-6);
    }

    #[test]
    fn spherical_round_trip_geometry() {
        let origin = Vec3::new(100.0, 0.0, 0.0);
        let p = spherical_to_cartesian(&origin, 1000.0, std::f64::consts::FRAC_PI_2, 0.0);
        assert_abs_diff_eq!(p.x, 100.0, epsilon = 1e-9);
        assert_abs_diff_eq!(p.y, 1000.0, epsilon = 1e-9);
        assert_abs_diff_eq!(spherical_position_error(1000.0, 30.0, 0.04, 0.0), 50.0, epsilon = 1e-9);
    }
}
