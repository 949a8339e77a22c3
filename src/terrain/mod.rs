//! Terrain surface observed by the camera.
//!
//! A [`TerrainModel`] is a set of co-registered `X`, `Y` and `Z` grids. It is
//! immutable once built; resampling with [`TerrainModel::densify`] produces a
//! new model. Terrain comes from a [`TerrainProvider`], which also answers
//! which cells are visible from a camera location. Reading elevation files
//! and computing line-of-sight viewsheds are the provider's business.
//! [`GridTerrain`] is the in-memory provider.

use crate::camera::CameraEnvError;
use log::debug;
use nalgebra::{DMatrix, Vector3};

/// Co-registered terrain grids.
#[derive(Debug, Clone, PartialEq)]
pub struct TerrainModel {
    x: DMatrix<f64>,
    y: DMatrix<f64>,
    z: DMatrix<f64>,
    revision: u64,
}

impl TerrainModel {
    pub fn new(x: DMatrix<f64>, y: DMatrix<f64>, z: DMatrix<f64>) -> Result<Self, CameraEnvError> {
        if x.shape() != y.shape() || x.shape() != z.shape() {
            return Err(CameraEnvError::TerrainLoad(format!(
                "terrain grids are not co-registered: X {:?}, Y {:?}, Z {:?}",
                x.shape(),
                y.shape(),
                z.shape()
            )));
        }
        if x.is_empty() {
            return Err(CameraEnvError::TerrainLoad("terrain grid is empty".to_string()));
        }
        Ok(TerrainModel {
            x,
            y,
            z,
            revision: 0,
        })
    }

    /// Builds a regular grid from `z`, with cell `(r, c)` at
    /// `(x0 + c * spacing, y0 + r * spacing)`.
    pub fn from_elevation(
        z: DMatrix<f64>,
        origin: (f64, f64),
        spacing: f64,
    ) -> Result<Self, CameraEnvError> {
        if spacing.is_nan() || spacing <= 0.0 {
            return Err(CameraEnvError::TerrainLoad(format!(
                "grid spacing must be positive, got {spacing}"
            )));
        }
        let (rows, cols) = z.shape();
        let x = DMatrix::from_fn(rows, cols, |_, c| origin.0 + c as f64 * spacing);
        let y = DMatrix::from_fn(rows, cols, |r, _| origin.1 + r as f64 * spacing);
        Self::new(x, y, z)
    }

    /// Tags the model with a revision number. Environments key their
    /// correspondence cache on it, so a provider that reloads changed data
    /// should bump it.
    pub fn with_revision(mut self, revision: u64) -> Self {
        self.revision = revision;
        self
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn shape(&self) -> (usize, usize) {
        self.z.shape()
    }

    pub fn len(&self) -> usize {
        self.z.len()
    }

    pub fn is_empty(&self) -> bool {
        self.z.is_empty()
    }

    pub fn x(&self) -> &DMatrix<f64> {
        &self.x
    }

    pub fn y(&self) -> &DMatrix<f64> {
        &self.y
    }

    pub fn z(&self) -> &DMatrix<f64> {
        &self.z
    }

    pub fn point(&self, row: usize, col: usize) -> Vector3<f64> {
        Vector3::new(self.x[(row, col)], self.y[(row, col)], self.z[(row, col)])
    }

    /// `(min_x, max_x, min_y, max_y)` over finite cells.
    pub fn extent(&self) -> (f64, f64, f64, f64) {
        let fold = |m: &DMatrix<f64>| {
            m.iter()
                .filter(|v| v.is_finite())
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                    (lo.min(*v), hi.max(*v))
                })
        };
        let (min_x, max_x) = fold(&self.x);
        let (min_y, max_y) = fold(&self.y);
        (min_x, max_x, min_y, max_y)
    }

    /// Resamples the grid by an integer factor with bilinear interpolation.
    ///
    /// A grid of `r x c` cells becomes `((r-1)*factor+1) x ((c-1)*factor+1)`;
    /// every original node is kept at position `(r*factor, c*factor)`. A factor
    /// of one returns an identical copy.
    pub fn densify(&self, factor: usize) -> Result<TerrainModel, CameraEnvError> {
        if factor == 0 {
            return Err(CameraEnvError::TerrainLoad(
                "densification factor must be at least 1".to_string(),
            ));
        }
        if factor == 1 {
            return Ok(self.clone());
        }

        let (rows, cols) = self.shape();
        let new_rows = (rows - 1) * factor + 1;
        let new_cols = (cols - 1) * factor + 1;
        debug!("Densifying terrain {rows}x{cols} -> {new_rows}x{new_cols}");

        let resample = |grid: &DMatrix<f64>| {
            DMatrix::from_fn(new_rows, new_cols, |r, c| {
                let (r0, tr) = split_index(r, factor, rows);
                let (c0, tc) = split_index(c, factor, cols);
                let r1 = (r0 + 1).min(rows - 1);
                let c1 = (c0 + 1).min(cols - 1);
                let top = lerp(grid[(r0, c0)], grid[(r0, c1)], tc);
                let bottom = lerp(grid[(r1, c0)], grid[(r1, c1)], tc);
                lerp(top, bottom, tr)
            })
        };

        Ok(TerrainModel {
            x: resample(&self.x),
            y: resample(&self.y),
            z: resample(&self.z),
            revision: self.revision,
        })
    }
}

fn split_index(index: usize, factor: usize, len: usize) -> (usize, f64) {
    let base = (index / factor).min(len - 1);
    let frac = (index - base * factor) as f64 / factor as f64;
    (base, frac)
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    if t == 0.0 {
        a
    } else {
        a + (b - a) * t
    }
}

/// Source of terrain and visibility for a camera environment.
pub trait TerrainProvider: Send + Sync {
    /// Loads the terrain grids. Called once per environment; failures are
    /// surfaced as [`CameraEnvError::TerrainLoad`] without retry.
    fn load(&self) -> Result<TerrainModel, CameraEnvError>;

    /// Computes which cells of `terrain` are visible from `camera_location`.
    /// The returned mask has the same shape as the terrain grids.
    fn visibility(
        &self,
        terrain: &TerrainModel,
        camera_location: &Vector3<f64>,
    ) -> Result<DMatrix<bool>, CameraEnvError>;
}

/// In-memory terrain with an optional precomputed visibility mask.
///
/// Without a mask every cell is treated as visible.
#[derive(Debug, Clone)]
pub struct GridTerrain {
    terrain: TerrainModel,
    mask: Option<DMatrix<bool>>,
}

impl GridTerrain {
    pub fn new(terrain: TerrainModel) -> Self {
        GridTerrain {
            terrain,
            mask: None,
        }
    }

    pub fn with_visibility(
        terrain: TerrainModel,
        mask: DMatrix<bool>,
    ) -> Result<Self, CameraEnvError> {
        if mask.shape() != terrain.shape() {
            return Err(CameraEnvError::TerrainLoad(format!(
                "visibility mask shape {:?} does not match terrain {:?}",
                mask.shape(),
                terrain.shape()
            )));
        }
        Ok(GridTerrain {
            terrain,
            mask: Some(mask),
        })
    }

    pub fn terrain(&self) -> &TerrainModel {
        &self.terrain
    }
}

impl TerrainProvider for GridTerrain {
    fn load(&self) -> Result<TerrainModel, CameraEnvError> {
        Ok(self.terrain.clone())
    }

    fn visibility(
        &self,
        terrain: &TerrainModel,
        _camera_location: &Vector3<f64>,
    ) -> Result<DMatrix<bool>, CameraEnvError> {
        match &self.mask {
            None => {
                let (rows, cols) = terrain.shape();
                Ok(DMatrix::from_element(rows, cols, true))
            }
            Some(mask) if mask.shape() == terrain.shape() => Ok(mask.clone()),
            Some(mask) => Err(CameraEnvError::TerrainLoad(format!(
                "visibility mask shape {:?} does not match terrain {:?}",
                mask.shape(),
                terrain.shape()
            ))),
        }
    }
}
