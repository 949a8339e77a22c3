//! Measurement helpers built on top of projection: ground control points,
//! reprojection statistics and world-space areas of pixel outlines.

use crate::camera::{CameraEnvError, ProjectionEngine, Resolution};
use log::{debug, info};
use nalgebra::{Matrix2xX, Matrix3xX, Vector2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

/// Generate a grid of sample pixels evenly distributed across the image.
///
/// # Arguments
///
/// * `resolution` - Size of the image in pixels
/// * `n` - The approximate number of pixels to generate
///
/// # Returns
///
/// One column per pixel, at cell centres, in the 1-based pixel convention
/// used by forward projection.
pub fn sample_pixels(resolution: Resolution, n: usize) -> Matrix2xX<f64> {
    let width = resolution.width as f64;
    let height = resolution.height as f64;

    // Calculate the number of cells in each dimension
    let num_cells_x = ((n as f64 * (width / height)).sqrt().round() as usize).max(1);
    let num_cells_y = ((n as f64 * (height / width)).sqrt().round() as usize).max(1);

    let cell_width = width / num_cells_x as f64;
    let cell_height = height / num_cells_y as f64;

    let mut pixels = Vec::with_capacity(num_cells_x * num_cells_y);
    for i in 0..num_cells_y {
        for j in 0..num_cells_x {
            let u = 0.5 + (j as f64 + 0.5) * cell_width;
            let v = 0.5 + (i as f64 + 0.5) * cell_height;
            pixels.push(Vector2::new(u, v));
        }
    }

    Matrix2xX::from_columns(&pixels)
}

/// Matched world and image coordinates of surveyed ground control points.
#[derive(Debug, Clone, PartialEq)]
pub struct GroundControlPoints {
    pub world: Matrix3xX<f64>,
    pub pixels: Matrix2xX<f64>,
}

impl GroundControlPoints {
    pub fn new(world: Matrix3xX<f64>, pixels: Matrix2xX<f64>) -> Result<Self, CameraEnvError> {
        if world.ncols() != pixels.ncols() {
            return Err(CameraEnvError::Configuration(format!(
                "{} world GCPs but {} image GCPs",
                world.ncols(),
                pixels.ncols()
            )));
        }
        Ok(GroundControlPoints { world, pixels })
    }

    /// Reads a GCP file: a header line, then one `x y z u v` row per point,
    /// separated by tabs or runs of spaces. Lines starting with `#` are
    /// skipped.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CameraEnvError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let gcps = Self::from_str(&text)?;
        info!("Loaded {} ground control points from {}", gcps.len(), path.display());
        Ok(gcps)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(text: &str) -> Result<Self, CameraEnvError> {
        // csv needs a single delimiter byte; collapse whitespace runs to tabs.
        let normalised: String = text
            .lines()
            .map(|line| line.split_whitespace().collect::<Vec<_>>().join("\t"))
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .comment(Some(b'#'))
            .from_reader(normalised.as_bytes());

        let mut world = Vec::new();
        let mut pixels = Vec::new();
        for record in reader.records() {
            let (x, y, z, u, v): (f64, f64, f64, f64, f64) = record?.deserialize(None)?;
            world.push(nalgebra::Vector3::new(x, y, z));
            pixels.push(Vector2::new(u, v));
        }
        debug!("Parsed {} GCP rows", world.len());
        if world.is_empty() {
            return Err(CameraEnvError::Configuration("GCP file has no points".to_string()));
        }

        Self::new(Matrix3xX::from_columns(&world), Matrix2xX::from_columns(&pixels))
    }

    pub fn len(&self) -> usize {
        self.world.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.world.ncols() == 0
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProjectionError {
    pub rmse: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub stddev: f64,
    pub median: f64,
}

impl fmt::Debug for ProjectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Projection Error [ rmse: {}, min: {}, max: {}, mean: {}, stddev: {}, median: {} ]",
            self.rmse, self.min, self.max, self.mean, self.stddev, self.median
        )
    }
}

impl ProjectionError {
    /// Summary statistics of a set of pixel distances. `None` when empty.
    pub fn from_errors(errors: &[f64]) -> Option<Self> {
        if errors.is_empty() {
            return None;
        }

        let n = errors.len() as f64;
        let mean = errors.iter().sum::<f64>() / n;

        let variance: f64 = errors.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
        let stddev = variance.sqrt();

        let sum_squared: f64 = errors.iter().map(|x| x.powi(2)).sum::<f64>();
        let rmse = (sum_squared / n).sqrt();

        let min = errors.iter().fold(f64::INFINITY, |a, &b| a.min(b));
        let max = errors.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));

        let mut sorted_errors = errors.to_vec();
        sorted_errors.sort_by(f64::total_cmp);
        let mid = sorted_errors.len() / 2;
        let median = if sorted_errors.len() % 2 == 0 {
            (sorted_errors[mid - 1] + sorted_errors[mid]) / 2.0
        } else {
            sorted_errors[mid]
        };

        Some(ProjectionError {
            rmse,
            min,
            max,
            mean,
            stddev,
            median,
        })
    }
}

/// Projects the world GCPs and measures their pixel distance to the
/// surveyed image GCPs. Only GCPs that project inside the frame count.
pub fn gcp_reprojection_error(
    engine: &ProjectionEngine,
    gcps: &GroundControlPoints,
) -> Result<ProjectionError, CameraEnvError> {
    let projected = engine.project(&gcps.world);
    let errors: Vec<f64> = (0..projected.len())
        .filter(|&i| projected.in_frame[i])
        .map(|i| (projected.pixels.column(i) - gcps.pixels.column(i)).norm())
        .collect();

    debug!(
        "{} of {} GCPs project inside the image",
        errors.len(),
        gcps.len()
    );

    ProjectionError::from_errors(&errors).ok_or_else(|| {
        CameraEnvError::Configuration(
            "no ground control point projects inside the image".to_string(),
        )
    })
}

/// Planar (x, y) area of a closed polygon given as world-coordinate
/// columns. Columns with a NaN coordinate are dropped first.
pub fn polygon_area(vertices: &Matrix3xX<f64>) -> f64 {
    let ring: Vec<(f64, f64)> = vertices
        .column_iter()
        .filter(|v| !v[0].is_nan() && !v[1].is_nan())
        .map(|v| (v[0], v[1]))
        .collect();
    if ring.len() < 3 {
        return 0.0;
    }

    let twice: f64 = ring
        .iter()
        .zip(ring.iter().cycle().skip(1))
        .map(|((x0, y0), (x1, y1))| x0 * y1 - x1 * y0)
        .sum();
    twice.abs() / 2.0
}
