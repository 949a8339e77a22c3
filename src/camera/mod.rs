//! Camera geometry for a calibrated, fixed, oblique camera.
//!
//! This module holds the types shared by every camera component:
//! the image [`Resolution`], the crate-wide [`CameraEnvError`] and the
//! parameter [`validation`] helpers. The components themselves live in
//! the submodules:
//!
//! - [`calibration`]: intrinsic matrix and distortion normalisation.
//! - [`pose`]: camera location, orientation and rotation matrix.
//! - [`projection`]: forward projection of world points into pixels.

use serde::{Deserialize, Serialize};

pub mod calibration;
pub mod pose;
pub mod projection;

pub use calibration::{
    CalibrationData, CalibrationModel, CalibrationSource, ChessboardCalibrator, DistortionTerms,
};
pub use pose::{rotation_matrix, CameraPose};
pub use projection::{ProjectionEngine, ProjectionOptions, ProjectionResult};

/// Size of the reference image in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

#[derive(thiserror::Error, Debug)]
pub enum CameraEnvError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Terrain load error: {0}")]
    TerrainLoad(String),
    #[error("Inverse projection requires a bound terrain model")]
    TerrainNotBound,
    #[error("Failed to load YAML: {0}")]
    YamlError(String),
    #[error("Failed to read CSV: {0}")]
    CsvError(String),
    #[error("IO Error: {0}")]
    IOError(String),
}

impl From<std::io::Error> for CameraEnvError {
    fn from(err: std::io::Error) -> Self {
        CameraEnvError::IOError(err.to_string())
    }
}

impl From<yaml_rust::ScanError> for CameraEnvError {
    fn from(err: yaml_rust::ScanError) -> Self {
        CameraEnvError::YamlError(err.to_string())
    }
}

impl From<serde_yaml::Error> for CameraEnvError {
    fn from(err: serde_yaml::Error) -> Self {
        CameraEnvError::YamlError(err.to_string())
    }
}

impl From<csv::Error> for CameraEnvError {
    fn from(err: csv::Error) -> Self {
        CameraEnvError::CsvError(err.to_string())
    }
}

/// Common validation functions for camera parameters
pub mod validation {
    use super::*;
    use nalgebra::Vector3;

    pub fn validate_focal_length(fx: f64, fy: f64) -> Result<(), CameraEnvError> {
        if !fx.is_finite() || !fy.is_finite() || fx <= 0.0 || fy <= 0.0 {
            return Err(CameraEnvError::Configuration(format!(
                "focal length must be positive and finite, got ({fx}, {fy})"
            )));
        }
        Ok(())
    }

    pub fn validate_principal_point(cx: f64, cy: f64) -> Result<(), CameraEnvError> {
        if !cx.is_finite() || !cy.is_finite() {
            return Err(CameraEnvError::Configuration(format!(
                "principal point must be finite, got ({cx}, {cy})"
            )));
        }
        Ok(())
    }

    pub fn validate_resolution(resolution: &Resolution) -> Result<(), CameraEnvError> {
        if resolution.width == 0 || resolution.height == 0 {
            return Err(CameraEnvError::Configuration(format!(
                "image size must be non-zero, got {}x{}",
                resolution.width, resolution.height
            )));
        }
        Ok(())
    }

    pub fn validate_finite_vector(
        vector: &Vector3<f64>,
        what: &str,
    ) -> Result<(), CameraEnvError> {
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(CameraEnvError::Configuration(format!(
                "{what} must be finite, got {vector:?}"
            )));
        }
        Ok(())
    }
}
