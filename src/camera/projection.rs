//! Forward projection of world points into image pixels.
//!
//! A world point `p` is moved into the camera frame with
//! `d = R (p - t)`, where `t` is the camera location and `R` the pose
//! rotation, then divided through by its depth `d.z`:
//!
//! `u = fx * d.x / d.z + cx`
//! `v = fy * d.y / d.z + cy`
//!
//! Pixel coordinates are 1-based: a point is in frame when its depth is
//! positive and `1 <= u <= width`, `1 <= v <= height`. Points with
//! non-positive depth project to `(NaN, NaN)`. Nothing here fails per point;
//! NaN is the sentinel for an undefined projection.

use crate::camera::pose::CameraPose;
use crate::camera::{
    calibration::{CalibrationData, RADIAL_LEN, TANGENTIAL_LEN},
    validation, CameraEnvError, Resolution,
};
use nalgebra::{DVector, Matrix2xX, Matrix3, Matrix3xX, Vector2, Vector3};
use serde::{Deserialize, Serialize};

/// Squared radius at which the distortion polynomial is clamped.
const MAX_DISTORTION_R2: f64 = 4.0;

/// Options controlling forward projection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectionOptions {
    /// Apply the lens distortion model to normalised coordinates before
    /// scaling to pixels. Off by default: inverse projection never undoes
    /// distortion, and the distortion branch has not been validated against
    /// a reference dataset.
    pub apply_lens_distortion: bool,
}

/// Projection of a single world point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectedPoint {
    /// `(u, v)` in pixels, `(NaN, NaN)` when the point is behind the camera.
    pub pixel: Vector2<f64>,
    pub depth: f64,
    pub in_frame: bool,
}

/// Projection of a batch of world points, one column per point.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionResult {
    pub pixels: Matrix2xX<f64>,
    pub depth: DVector<f64>,
    pub in_frame: Vec<bool>,
}

impl ProjectionResult {
    pub fn len(&self) -> usize {
        self.in_frame.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_frame.is_empty()
    }

    pub fn in_frame_count(&self) -> usize {
        self.in_frame.iter().filter(|f| **f).count()
    }
}

/// Pinhole projection for a fixed pose and calibration.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionEngine {
    location: Vector3<f64>,
    rotation: Matrix3<f64>,
    focal_length: Vector2<f64>,
    principal_point: Vector2<f64>,
    radial: [f64; RADIAL_LEN],
    tangential: [f64; TANGENTIAL_LEN],
    resolution: Resolution,
    options: ProjectionOptions,
}

impl ProjectionEngine {
    pub fn new(
        calibration: &CalibrationData,
        pose: &CameraPose,
        resolution: Resolution,
        options: ProjectionOptions,
    ) -> Result<Self, CameraEnvError> {
        validation::validate_resolution(&resolution)?;
        Ok(ProjectionEngine {
            location: pose.location(),
            rotation: pose.rotation_matrix(),
            focal_length: calibration.focal_length(),
            principal_point: calibration.principal_point(),
            radial: *calibration.radial(),
            tangential: *calibration.tangential(),
            resolution,
            options,
        })
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn options(&self) -> ProjectionOptions {
        self.options
    }

    pub fn rotation(&self) -> &Matrix3<f64> {
        &self.rotation
    }

    /// Projects a single world point.
    pub fn project_point(&self, point: &Vector3<f64>) -> ProjectedPoint {
        let camera = self.rotation * (point - self.location);
        let depth = camera.z;

        if depth.is_nan() || depth <= 0.0 {
            return ProjectedPoint {
                pixel: Vector2::new(f64::NAN, f64::NAN),
                depth,
                in_frame: false,
            };
        }

        let mut normalised = Vector2::new(camera.x / depth, camera.y / depth);
        if self.options.apply_lens_distortion {
            normalised = distort(&normalised, &self.radial, &self.tangential);
        }

        let pixel = normalised.component_mul(&self.focal_length) + self.principal_point;
        let in_frame = pixel.x >= 1.0
            && pixel.y >= 1.0
            && pixel.x <= self.resolution.width as f64
            && pixel.y <= self.resolution.height as f64;

        ProjectedPoint {
            pixel,
            depth,
            in_frame,
        }
    }

    /// Projects every column of `points`.
    pub fn project(&self, points: &Matrix3xX<f64>) -> ProjectionResult {
        let n = points.ncols();
        let mut pixels = Matrix2xX::from_element(n, f64::NAN);
        let mut depth = DVector::from_element(n, f64::NAN);
        let mut in_frame = vec![false; n];

        for (i, column) in points.column_iter().enumerate() {
            let projected = self.project_point(&column.into_owned());
            pixels.set_column(i, &projected.pixel);
            depth[i] = projected.depth;
            in_frame[i] = projected.in_frame;
        }

        ProjectionResult {
            pixels,
            depth,
            in_frame,
        }
    }
}

/// Applies radial (rational, `k1..k6`) and tangential (`p1, p2`) distortion
/// to normalised image coordinates.
///
/// The tangential terms are kept as the legacy toolchain wrote them: both
/// axes use `2 p1 x y + p2 (r² + 2 t²)`, with `t` the axis coordinate. This
/// is not the Brown-Conrady/OpenCV form for `v`, which would swap `p1` and
/// `p2`. Revalidate against a reference dataset before changing it.
pub fn distort(
    xy: &Vector2<f64>,
    radial: &[f64; RADIAL_LEN],
    tangential: &[f64; TANGENTIAL_LEN],
) -> Vector2<f64> {
    let [k1, k2, k3, k4, k5, k6] = *radial;
    let [p1, p2] = *tangential;
    let (x, y) = (xy.x, xy.y);

    let r2 = (x * x + y * y).min(MAX_DISTORTION_R2);
    let r4 = r2 * r2;
    let r6 = r4 * r2;
    let a = (1.0 + k1 * r2 + k2 * r4 + k3 * r6) / (1.0 + k4 * r2 + k5 * r4 + k6 * r6);
    let xty = x * y;

    Vector2::new(
        a * x + 2.0 * p1 * xty + p2 * (r2 + 2.0 * x * x),
        a * y + 2.0 * p1 * xty + p2 * (r2 + 2.0 * y * y),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::DMatrix;
    use std::f64::consts::{FRAC_PI_2, PI};

    fn nadir_engine(options: ProjectionOptions, radial: &[f64]) -> ProjectionEngine {
        let k = DMatrix::from_row_slice(
            3,
            3,
            &[1000.0, 0.0, 500.0, 0.0, 1000.0, 500.0, 0.0, 0.0, 1.0],
        );
        let calib = CalibrationData::new(&k, &[], radial).unwrap();
        let pose =
            CameraPose::new(Vector3::new(0.0, 0.0, 100.0), Vector3::new(PI, FRAC_PI_2, 0.0))
                .unwrap();
        ProjectionEngine::new(
            &calib,
            &pose,
            Resolution {
                width: 1000,
                height: 1000,
            },
            options,
        )
        .unwrap()
    }

    #[test]
    fn test_downward_camera_regression() {
        let engine = nadir_engine(ProjectionOptions::default(), &[]);
        let projected = engine.project_point(&Vector3::new(10.0, 10.0, 0.0));

        // d = R (p - t) = (10, 10, 100) -> u = 1000 * 0.1 + 500
        assert_relative_eq!(projected.pixel, Vector2::new(600.0, 600.0), epsilon = 1e-9);
        assert_relative_eq!(projected.depth, 100.0, epsilon = 1e-9);
        assert!(projected.in_frame);
    }

    #[test]
    fn test_behind_camera_is_nan() {
        let engine = nadir_engine(ProjectionOptions::default(), &[]);
        let points = Matrix3xX::from_columns(&[
            Vector3::new(0.0, 0.0, 150.0),
            Vector3::new(5.0, -5.0, 100.0),
            Vector3::new(-20.0, 3.0, 0.0),
        ]);
        let result = engine.project(&points);

        assert_eq!(result.len(), 3);
        for i in 0..2 {
            assert!(result.depth[i] <= 0.0);
            assert!(result.pixels[(0, i)].is_nan());
            assert!(result.pixels[(1, i)].is_nan());
            assert!(!result.in_frame[i]);
        }
        assert!(result.in_frame[2]);
        assert_eq!(result.in_frame_count(), 1);
    }

    #[test]
    fn test_frame_bounds_are_one_based() {
        let engine = nadir_engine(ProjectionOptions::default(), &[]);

        // Looking down with yaw = pi, u follows world y: u = 1000 * y / 100 + 500
        let on_edge = engine.project_point(&Vector3::new(0.0, -49.9, 0.0));
        assert_relative_eq!(on_edge.pixel.x, 1.0, epsilon = 1e-9);

        let outside = engine.project_point(&Vector3::new(0.0, -50.0, 0.0));
        assert_relative_eq!(outside.pixel.x, 0.0, epsilon = 1e-9);
        assert!(!outside.in_frame);
        assert!(outside.depth > 0.0);

        let far = engine.project_point(&Vector3::new(0.0, 60.0, 0.0));
        assert!(far.pixel.x > 1000.0);
        assert!(!far.in_frame);
    }

    #[test]
    fn test_distortion_flag() {
        let point = Vector3::new(20.0, 10.0, 0.0);
        let plain = nadir_engine(ProjectionOptions::default(), &[-0.3, 0.1]).project_point(&point);
        let distorted = nadir_engine(
            ProjectionOptions {
                apply_lens_distortion: true,
            },
            &[-0.3, 0.1],
        )
        .project_point(&point);

        // Distortion coefficients are ignored unless the flag is set.
        assert_relative_eq!(plain.pixel, Vector2::new(600.0, 700.0), epsilon = 1e-9);
        // Barrel distortion pulls the point towards the principal point.
        assert!(distorted.pixel.x < plain.pixel.x);
        assert!(distorted.pixel.y < plain.pixel.y);
    }

    #[test]
    fn test_distort_identity_without_coefficients() {
        let xy = Vector2::new(0.3, -0.2);
        assert_relative_eq!(distort(&xy, &[0.0; 6], &[0.0; 2]), xy);
    }

    #[test]
    fn test_distort_tangential_terms() {
        let (x, y) = (0.2, 0.1);
        let (p1, p2) = (0.01, 0.02);
        let out = distort(&Vector2::new(x, y), &[0.0; 6], &[p1, p2]);

        let r2 = x * x + y * y;
        assert_relative_eq!(out.x, x + 2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x), epsilon = 1e-15);
        assert_relative_eq!(out.y, y + 2.0 * p1 * x * y + p2 * (r2 + 2.0 * y * y), epsilon = 1e-15);
        // 0.1 + 0.0004 + 0.02 * 0.07
        assert_relative_eq!(out.y, 0.1018, epsilon = 1e-12);
    }

    #[test]
    fn test_distort_clamps_radius() {
        let radial = [0.1, 0.0, 0.0, 0.0, 0.0, 0.0];
        let far = distort(&Vector2::new(10.0, 0.0), &radial, &[0.0; 2]);
        // r2 clamped to 4 -> a = 1.4
        assert_relative_eq!(far.x, 14.0, epsilon = 1e-12);
    }
}
