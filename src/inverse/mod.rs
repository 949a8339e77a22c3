//! Inverse projection: image pixels back to terrain coordinates.
//!
//! A pixel fixes a viewing ray, not a point; the terrain supplies the missing
//! constraint. Visible terrain cells are forward-projected once into a
//! [`CorrespondenceIndex`] of `(u, v) <-> (x, y, z)` pairs, and an
//! [`InverseProjector`] answers pixel queries by linear interpolation over a
//! Delaunay triangulation of the index pixels, one channel at a time.
//!
//! Pixels outside the convex hull of the index interpolate to NaN in every
//! channel. This is part of the contract: callers aggregating areas or
//! displacements must filter NaN rows.

use crate::camera::{CameraEnvError, ProjectionEngine};
use crate::terrain::TerrainModel;
use log::info;
use nalgebra::{DMatrix, Matrix2xX, Matrix3xX, Vector2, Vector3};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

pub mod interpolation;

pub use interpolation::LinearInterpolator;

/// One `(pixel, world point)` pair, as exported to JSON.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Correspondence {
    pub pixel: [f64; 2],
    pub world: [f64; 3],
}

/// Pixel/world pairs for every visible, in-frame terrain cell.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrespondenceIndex {
    pixels: Matrix2xX<f64>,
    world: Matrix3xX<f64>,
    visible_cells: usize,
}

impl CorrespondenceIndex {
    /// Forward-projects the visible cells of `terrain` and keeps those that
    /// land inside the image frame.
    ///
    /// Cells with non-finite coordinates (no-data elevations) are skipped.
    ///
    /// # Errors
    ///
    /// [`CameraEnvError::TerrainLoad`] when `visibility` does not have the
    /// terrain's shape.
    pub fn build(
        engine: &ProjectionEngine,
        terrain: &TerrainModel,
        visibility: &DMatrix<bool>,
    ) -> Result<Self, CameraEnvError> {
        if visibility.shape() != terrain.shape() {
            return Err(CameraEnvError::TerrainLoad(format!(
                "visibility mask shape {:?} does not match terrain {:?}",
                visibility.shape(),
                terrain.shape()
            )));
        }

        let (rows, cols) = terrain.shape();
        let mut visible = Vec::new();
        for c in 0..cols {
            for r in 0..rows {
                if !visibility[(r, c)] {
                    continue;
                }
                let point = terrain.point(r, c);
                if point.iter().all(|v| v.is_finite()) {
                    visible.push(point);
                }
            }
        }
        let visible_cells = visible.len();
        let visible = Matrix3xX::from_fn(visible.len(), |r, c| visible[c][r]);

        let projection = engine.project(&visible);
        let kept: Vec<usize> = (0..projection.len())
            .filter(|&i| projection.in_frame[i])
            .collect();

        let pixels = Matrix2xX::from_fn(kept.len(), |r, c| projection.pixels[(r, kept[c])]);
        let world = Matrix3xX::from_fn(kept.len(), |r, c| visible[(r, kept[c])]);

        info!(
            "Correspondence index: {} of {} terrain cells visible, {} in frame",
            visible_cells,
            terrain.len(),
            kept.len()
        );

        Ok(CorrespondenceIndex {
            pixels,
            world,
            visible_cells,
        })
    }

    /// Builds an index from explicit pairs, one column per correspondence.
    pub fn from_pairs(
        pixels: Matrix2xX<f64>,
        world: Matrix3xX<f64>,
    ) -> Result<Self, CameraEnvError> {
        if pixels.ncols() != world.ncols() {
            return Err(CameraEnvError::Configuration(format!(
                "{} pixels but {} world points",
                pixels.ncols(),
                world.ncols()
            )));
        }
        let finite = pixels.iter().chain(world.iter()).all(|v| v.is_finite());
        if !finite {
            return Err(CameraEnvError::Configuration(
                "correspondences must be finite".to_string(),
            ));
        }
        let visible_cells = pixels.ncols();
        Ok(CorrespondenceIndex {
            pixels,
            world,
            visible_cells,
        })
    }

    pub fn len(&self) -> usize {
        self.pixels.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.ncols() == 0
    }

    pub fn pixels(&self) -> &Matrix2xX<f64> {
        &self.pixels
    }

    pub fn world(&self) -> &Matrix3xX<f64> {
        &self.world
    }

    /// Number of visible terrain cells considered, in frame or not.
    pub fn visible_cells(&self) -> usize {
        self.visible_cells
    }

    pub fn correspondences(&self) -> Vec<Correspondence> {
        self.pixels
            .column_iter()
            .zip(self.world.column_iter())
            .map(|(p, w)| Correspondence {
                pixel: [p[0], p[1]],
                world: [w[0], w[1], w[2]],
            })
            .collect()
    }

    /// Writes the correspondences as a JSON array.
    pub fn save_to_json<P: AsRef<Path>>(&self, path: P) -> Result<(), CameraEnvError> {
        let file = File::create(path.as_ref())?;
        serde_json::to_writer_pretty(BufWriter::new(file), &self.correspondences())
            .map_err(|e| CameraEnvError::IOError(e.to_string()))?;
        Ok(())
    }
}

/// Interpolates world coordinates for arbitrary pixels from an index.
#[derive(Debug, Clone)]
pub struct InverseProjector {
    index: CorrespondenceIndex,
    interpolator: LinearInterpolator,
    channels: [Vec<f64>; 3],
}

impl InverseProjector {
    pub fn new(index: CorrespondenceIndex) -> Self {
        let nodes: Vec<Vector2<f64>> = index
            .pixels
            .column_iter()
            .map(|p| Vector2::new(p[0], p[1]))
            .collect();
        let interpolator = LinearInterpolator::new(nodes);
        let channels: [Vec<f64>; 3] =
            [0, 1, 2].map(|r| index.world.row(r).iter().copied().collect());

        info!(
            "Inverse projector ready: {} correspondences, {} triangles",
            index.len(),
            interpolator.triangle_count()
        );

        InverseProjector {
            index,
            interpolator,
            channels,
        }
    }

    pub fn index(&self) -> &CorrespondenceIndex {
        &self.index
    }

    pub fn triangle_count(&self) -> usize {
        self.interpolator.triangle_count()
    }

    /// World coordinates for one pixel, NaN where undefined.
    pub fn invproject_point(&self, pixel: &Vector2<f64>) -> Vector3<f64> {
        let [x, y, z] = &self.channels;
        let [xi, yi, zi] = self
            .interpolator
            .interpolate_channels(pixel, [x.as_slice(), y.as_slice(), z.as_slice()]);
        Vector3::new(xi, yi, zi)
    }

    /// World coordinates for every column of `pixels`.
    pub fn invproject(&self, pixels: &Matrix2xX<f64>) -> Matrix3xX<f64> {
        let mut world = Matrix3xX::from_element(pixels.ncols(), f64::NAN);
        for (i, column) in pixels.column_iter().enumerate() {
            let pixel = Vector2::new(column[0], column[1]);
            world.set_column(i, &self.invproject_point(&pixel));
        }
        world
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CalibrationData, CameraPose, ProjectionOptions, Resolution};
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    /// Oblique camera south of a flat patch, looking north and slightly down.
    fn oblique_engine() -> ProjectionEngine {
        let k = DMatrix::from_row_slice(
            3,
            3,
            &[800.0, 0.0, 400.0, 0.0, 800.0, 300.0, 0.0, 0.0, 1.0],
        );
        let calib = CalibrationData::new(&k, &[], &[]).unwrap();
        let pose = CameraPose::new(
            Vector3::new(50.0, -60.0, 40.0),
            Vector3::new(FRAC_PI_2, 0.45, 0.0),
        )
        .unwrap();
        ProjectionEngine::new(
            &calib,
            &pose,
            Resolution {
                width: 800,
                height: 600,
            },
            ProjectionOptions::default(),
        )
        .unwrap()
    }

    fn flat_patch(n: usize, spacing: f64) -> TerrainModel {
        TerrainModel::from_elevation(DMatrix::from_element(n, n, 5.0), (0.0, 0.0), spacing)
            .unwrap()
    }

    #[test]
    fn test_index_keeps_visible_in_frame_cells() {
        let engine = oblique_engine();
        let terrain = flat_patch(11, 10.0);
        let all = DMatrix::from_element(11, 11, true);

        let index = CorrespondenceIndex::build(&engine, &terrain, &all).unwrap();
        assert_eq!(index.visible_cells(), 121);
        assert!(!index.is_empty());
        assert!(index.len() <= 121);
        for (p, w) in index.pixels().column_iter().zip(index.world().column_iter()) {
            let projected = engine.project_point(&w.into_owned());
            assert!(projected.in_frame);
            assert_eq!(projected.pixel, p.into_owned());
        }

        let mut half = DMatrix::from_element(11, 11, true);
        for c in 0..11 {
            for r in 0..5 {
                half[(r, c)] = false;
            }
        }
        let masked = CorrespondenceIndex::build(&engine, &terrain, &half).unwrap();
        assert_eq!(masked.visible_cells(), 66);
        assert!(masked.len() <= index.len());
        assert!(masked.world().row(1).iter().all(|y| *y >= 50.0));
    }

    #[test]
    fn test_index_skips_nodata_and_checks_mask_shape() {
        let engine = oblique_engine();
        let mut z = DMatrix::from_element(4, 4, 5.0);
        z[(2, 2)] = f64::NAN;
        let terrain = TerrainModel::from_elevation(z, (40.0, 0.0), 5.0).unwrap();

        let index =
            CorrespondenceIndex::build(&engine, &terrain, &DMatrix::from_element(4, 4, true))
                .unwrap();
        assert_eq!(index.visible_cells(), 15);

        let wrong = DMatrix::from_element(3, 4, true);
        assert!(matches!(
            CorrespondenceIndex::build(&engine, &terrain, &wrong),
            Err(CameraEnvError::TerrainLoad(_))
        ));
    }

    #[test]
    fn test_nodata_terrain_gives_empty_index() {
        let engine = oblique_engine();
        let terrain =
            TerrainModel::from_elevation(DMatrix::from_element(4, 4, f64::NAN), (40.0, 0.0), 5.0)
                .unwrap();

        let index =
            CorrespondenceIndex::build(&engine, &terrain, &DMatrix::from_element(4, 4, true))
                .unwrap();
        assert!(index.is_empty());
        assert_eq!(index.visible_cells(), 0);
        assert!(index.correspondences().is_empty());

        let projector = InverseProjector::new(index);
        let world = projector.invproject_point(&Vector2::new(400.0, 300.0));
        assert!(world.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_invproject_recovers_index_nodes() {
        let engine = oblique_engine();
        let terrain = flat_patch(11, 10.0);
        let index =
            CorrespondenceIndex::build(&engine, &terrain, &DMatrix::from_element(11, 11, true))
                .unwrap();
        let projector = InverseProjector::new(index.clone());

        let recovered = projector.invproject(index.pixels());
        for (got, want) in recovered.column_iter().zip(index.world().column_iter()) {
            assert_relative_eq!(got.into_owned(), want.into_owned(), max_relative = 1e-12);
        }
    }

    #[test]
    fn test_invproject_flat_plane_between_nodes() {
        let engine = oblique_engine();
        let terrain = flat_patch(21, 5.0);
        let index =
            CorrespondenceIndex::build(&engine, &terrain, &DMatrix::from_element(21, 21, true))
                .unwrap();
        let projector = InverseProjector::new(index);

        // Elevation is constant, so any interpolated z must be exactly on the plane.
        let query = engine.project_point(&Vector3::new(47.3, 52.1, 5.0));
        assert!(query.in_frame);
        let world = projector.invproject_point(&query.pixel);
        assert_relative_eq!(world.z, 5.0, epsilon = 1e-9);
        assert_relative_eq!(world.x, 47.3, epsilon = 0.5);
        assert_relative_eq!(world.y, 52.1, epsilon = 0.5);
    }

    #[test]
    fn test_far_pixel_is_nan() {
        let engine = oblique_engine();
        let terrain = flat_patch(5, 5.0);
        let index =
            CorrespondenceIndex::build(&engine, &terrain, &DMatrix::from_element(5, 5, true))
                .unwrap();
        let projector = InverseProjector::new(index);

        let world = projector.invproject_point(&Vector2::new(-5000.0, 9000.0));
        assert!(world.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_from_pairs_and_json_export() {
        let pixels = Matrix2xX::from_columns(&[
            Vector2::new(10.0, 10.0),
            Vector2::new(20.0, 10.0),
            Vector2::new(10.0, 20.0),
        ]);
        let world = Matrix3xX::from_columns(&[
            Vector3::new(0.0, 0.0, 1.0),
            Vector3::new(1.0, 0.0, 2.0),
            Vector3::new(0.0, 1.0, 3.0),
        ]);
        let index = CorrespondenceIndex::from_pairs(pixels.clone(), world).unwrap();
        assert_eq!(index.correspondences()[1].world, [1.0, 0.0, 2.0]);

        std::fs::create_dir_all("output").expect("Failed to create output directory for test.");
        let path = "output/correspondences.json";
        index.save_to_json(path).unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        let parsed: Vec<Correspondence> = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, index.correspondences());
        std::fs::remove_file(path).unwrap();

        let short = Matrix3xX::from_columns(&[Vector3::new(0.0, 0.0, 0.0)]);
        assert!(CorrespondenceIndex::from_pairs(pixels, short).is_err());
    }
}
