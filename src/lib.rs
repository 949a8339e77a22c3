//! Camera Environment Tools
//!
//! Camera geometry for oblique time-lapse photogrammetry: a calibrated camera
//! at a fixed location looks at a known terrain surface, and this library
//! converts between image pixels and terrain coordinates. It provides:
//! - Calibration loading, averaging and canonicalisation of the intrinsic matrix
//! - Camera pose and the closed-form yaw/pitch/roll rotation
//! - Forward projection of world points into the image frame
//! - Inverse projection of pixels onto the terrain, by linear interpolation
//!   over a Delaunay triangulation of forward-projected terrain cells
//! - A camera environment that owns these pieces, caches the correspondence
//!   index and reads versioned environment descriptors
//!
//! Pixels outside the imaged part of the terrain, and points behind the
//! camera, resolve to NaN rather than errors.

pub mod camera;
pub mod environment;
pub mod geometry;
pub mod inverse;
pub mod terrain;

// Re-export commonly used types
pub use camera::{
    rotation_matrix, CalibrationData, CalibrationModel, CameraEnvError, CameraPose,
    ProjectionEngine, ProjectionOptions, ProjectionResult, Resolution,
};

pub use environment::{
    CameraEnvironment, CameraEnvironmentBuilder, EnvironmentDescriptor, EnvironmentState,
};
pub use geometry::{GroundControlPoints, ProjectionError};
pub use inverse::{CorrespondenceIndex, InverseProjector};
pub use terrain::{GridTerrain, TerrainModel, TerrainProvider};
