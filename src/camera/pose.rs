//! Camera location and orientation.

use crate::camera::{validation, CameraEnvError};
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

/// Rotation matrix for a `(yaw, pitch, roll)` orientation in radians.
///
/// The rows are the camera axes expressed in world coordinates, the third
/// row being the viewing direction. The first two rows are negated to flip
/// from the world's right-handed convention to the image axes (u to the
/// right, v downwards). The formula is closed-form; pitch values near
/// `±π/2` align yaw and roll and are not treated specially.
///
/// # Examples
///
/// ```rust
/// use camenv_tools::camera::rotation_matrix;
/// use std::f64::consts::{FRAC_PI_2, PI};
///
/// // Looking straight down
/// let r = rotation_matrix(PI, FRAC_PI_2, 0.0);
/// assert!((r[(2, 2)] + 1.0).abs() < 1e-12);
/// ```
pub fn rotation_matrix(yaw: f64, pitch: f64, roll: f64) -> Matrix3<f64> {
    let (s0, c0) = yaw.sin_cos();
    let (s1, c1) = pitch.sin_cos();
    let (s2, c2) = roll.sin_cos();

    #[rustfmt::skip]
    let rotation = Matrix3::new(
        -(s2 * s1 * c0 - c2 * s0), -(s2 * s1 * s0 + c2 * c0), -(s2 * c1),
        -(c2 * s1 * c0 + s2 * s0), -(c2 * s1 * s0 - s2 * c0), -(c2 * c1),
        c1 * c0,                   c1 * s0,                   -s1,
    );
    rotation
}

/// Fixed camera pose: world location and `(yaw, pitch, roll)` orientation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraPose {
    /// Camera centre in world units.
    pub location: [f64; 3],
    /// Yaw (about the vertical), pitch (up/down) and roll (about the view
    /// direction), in radians.
    pub yaw_pitch_roll: [f64; 3],
}

impl CameraPose {
    pub fn new(
        location: Vector3<f64>,
        yaw_pitch_roll: Vector3<f64>,
    ) -> Result<Self, CameraEnvError> {
        validation::validate_finite_vector(&location, "camera location")?;
        validation::validate_finite_vector(&yaw_pitch_roll, "yaw/pitch/roll")?;
        Ok(CameraPose {
            location: location.into(),
            yaw_pitch_roll: yaw_pitch_roll.into(),
        })
    }

    pub fn location(&self) -> Vector3<f64> {
        Vector3::from(self.location)
    }

    pub fn orientation(&self) -> Vector3<f64> {
        Vector3::from(self.yaw_pitch_roll)
    }

    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        let [yaw, pitch, roll] = self.yaw_pitch_roll;
        rotation_matrix(yaw, pitch, roll)
    }

    /// Whether the orientation was left at its zero default.
    pub fn is_unset(&self) -> bool {
        self.yaw_pitch_roll == [0.0; 3]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::{FRAC_PI_2, PI};

    #[test]
    fn test_rotation_is_orthonormal() {
        let steps = [-3.0, -2.1, -1.2, -0.4, 0.0, 0.3, 0.9, 1.5, 2.4, 3.1];
        for yaw in steps {
            for pitch in steps {
                for roll in steps {
                    let r = rotation_matrix(yaw, pitch, roll);
                    let product = r * r.transpose();
                    assert_relative_eq!(product, Matrix3::identity(), epsilon = 1e-12);
                    assert_relative_eq!(r.determinant().abs(), 1.0, epsilon = 1e-12);
                }
            }
        }
    }

    #[test]
    fn test_rotation_matches_closed_form() {
        let (yaw, pitch, roll) = (0.3_f64, -0.2_f64, 0.1_f64);
        let r = rotation_matrix(yaw, pitch, roll);
        let (c, s) = (
            [yaw.cos(), pitch.cos(), roll.cos()],
            [yaw.sin(), pitch.sin(), roll.sin()],
        );

        assert_relative_eq!(r[(0, 0)], -(s[2] * s[1] * c[0] - c[2] * s[0]), epsilon = 1e-15);
        assert_relative_eq!(r[(1, 1)], -(c[2] * s[1] * s[0] - s[2] * c[0]), epsilon = 1e-15);
        assert_relative_eq!(r[(2, 0)], c[1] * c[0], epsilon = 1e-15);
        assert_relative_eq!(r[(2, 2)], -s[1], epsilon = 1e-15);
    }

    #[test]
    fn test_zero_orientation_looks_along_x() {
        let r = rotation_matrix(0.0, 0.0, 0.0);
        // Viewing axis is world +x, image u points to world +y after the flip.
        assert_relative_eq!(r.row(2).transpose(), Vector3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(r.row(0).transpose(), Vector3::new(0.0, -1.0, 0.0));
        assert_relative_eq!(r.row(1).transpose(), Vector3::new(0.0, 0.0, -1.0));
    }

    #[test]
    fn test_downward_pose() {
        let pose =
            CameraPose::new(Vector3::new(0.0, 0.0, 100.0), Vector3::new(PI, FRAC_PI_2, 0.0))
                .unwrap();
        let r = pose.rotation_matrix();

        assert_relative_eq!(r.row(2).transpose(), Vector3::new(0.0, 0.0, -1.0), epsilon = 1e-12);
        assert_eq!(pose.location(), Vector3::new(0.0, 0.0, 100.0));
        assert!(!pose.is_unset());
    }

    #[test]
    fn test_pose_rejects_non_finite() {
        assert!(CameraPose::new(Vector3::new(f64::NAN, 0.0, 0.0), Vector3::zeros()).is_err());
        assert!(CameraPose::new(Vector3::zeros(), Vector3::new(0.0, f64::INFINITY, 0.0)).is_err());
    }
}
