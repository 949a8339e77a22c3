//! The camera environment: one fixed camera observing one terrain.
//!
//! A [`CameraEnvironment`] owns the calibration, the pose, the reference
//! image size and, once bound, a [`TerrainProvider`]. It answers forward
//! projections directly and inverse projections through a cached
//! [`InverseProjector`].
//!
//! Environments move through [`EnvironmentState`] in one direction only:
//!
//! ```text
//! Unconfigured -> Calibrated -> PoseSet -> TerrainBound -> IndexBuilt
//! ```
//!
//! The first three states belong to the [`CameraEnvironmentBuilder`]; a built
//! environment starts at `PoseSet`. Binding a terrain consumes the
//! environment and returns a new one, and the first inverse projection (or an
//! explicit [`CameraEnvironment::build_inverse_index`]) moves it to
//! `IndexBuilt`.

use crate::camera::{
    CalibrationData, CalibrationModel, CameraEnvError, CameraPose, ProjectionEngine,
    ProjectionOptions, ProjectionResult, Resolution,
};
use crate::geometry::{self, GroundControlPoints, ProjectionError};
use crate::inverse::{CorrespondenceIndex, InverseProjector};
use crate::terrain::{TerrainModel, TerrainProvider};
use log::{debug, info};
use nalgebra::{Matrix2xX, Matrix3, Matrix3xX};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub mod cache;
pub mod descriptor;

pub use cache::{IndexCache, IndexKey};
pub use descriptor::{EnvironmentDescriptor, CURRENT_VERSION};

/// Lifecycle state of a camera environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EnvironmentState {
    Unconfigured,
    Calibrated,
    PoseSet,
    TerrainBound,
    IndexBuilt,
}

/// Collects the inputs of a [`CameraEnvironment`].
#[derive(Default)]
pub struct CameraEnvironmentBuilder {
    name: Option<String>,
    calibration: Option<CalibrationModel>,
    pose: Option<CameraPose>,
    resolution: Option<Resolution>,
    options: ProjectionOptions,
    terrain: Option<Arc<dyn TerrainProvider>>,
    densify: Option<usize>,
    gcp_path: Option<PathBuf>,
    dem_path: Option<PathBuf>,
    image_path: Option<PathBuf>,
}

impl CameraEnvironmentBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        CameraEnvironmentBuilder {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// Seeds a builder from a descriptor: loads the calibration, sets the
    /// pose, options and densification, and resolves the image size.
    ///
    /// The terrain is not loaded; bind a provider for the descriptor's
    /// `dem_path` separately.
    pub fn from_descriptor(descriptor: &EnvironmentDescriptor) -> Result<Self, CameraEnvError> {
        let calibration = descriptor.calibration()?;
        let pose = descriptor.pose()?;
        let resolution = descriptor.resolution()?;
        if let Some(dem) = &descriptor.dem_path {
            debug!("DEM {} is loaded by the bound terrain provider", dem.display());
        }

        Ok(CameraEnvironmentBuilder {
            name: Some(descriptor.camera_environment_name.clone()),
            calibration: Some(calibration),
            pose: Some(pose),
            resolution: Some(resolution),
            options: ProjectionOptions {
                apply_lens_distortion: descriptor.apply_lens_distortion,
            },
            terrain: None,
            densify: Some(descriptor.dem_densification),
            gcp_path: descriptor.gcp_path.clone(),
            dem_path: descriptor.dem_path.clone(),
            image_path: descriptor.image_path.clone(),
        })
    }

    pub fn calibration(mut self, calibration: CalibrationModel) -> Self {
        self.calibration = Some(calibration);
        self
    }

    pub fn pose(mut self, pose: CameraPose) -> Self {
        self.pose = Some(pose);
        self
    }

    pub fn resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = Some(resolution);
        self
    }

    pub fn options(mut self, options: ProjectionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn terrain<T: TerrainProvider + 'static>(self, provider: T) -> Self {
        self.terrain_provider(Arc::new(provider))
    }

    pub fn terrain_provider(mut self, provider: Arc<dyn TerrainProvider>) -> Self {
        self.terrain = Some(provider);
        self
    }

    pub fn densify(mut self, factor: usize) -> Self {
        self.densify = Some(factor);
        self
    }

    pub fn gcp_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.gcp_path = Some(path.into());
        self
    }

    pub fn state(&self) -> EnvironmentState {
        match (&self.calibration, &self.pose, &self.terrain) {
            (None, _, _) => EnvironmentState::Unconfigured,
            (Some(_), None, _) => EnvironmentState::Calibrated,
            (Some(_), Some(_), None) => EnvironmentState::PoseSet,
            (Some(_), Some(_), Some(_)) => EnvironmentState::TerrainBound,
        }
    }

    pub fn build(self) -> Result<CameraEnvironment, CameraEnvError> {
        let calibration = self.calibration.ok_or_else(|| {
            CameraEnvError::Configuration("camera environment has no calibration".to_string())
        })?;
        let pose = self.pose.ok_or_else(|| {
            CameraEnvError::Configuration("camera environment has no pose".to_string())
        })?;
        let resolution = self.resolution.ok_or_else(|| {
            CameraEnvError::Configuration("camera environment has no image size".to_string())
        })?;
        let densify = self.densify.unwrap_or(1);
        if densify == 0 {
            return Err(CameraEnvError::Configuration(
                "DEM densification must be at least 1".to_string(),
            ));
        }

        let engine = ProjectionEngine::new(calibration.data(), &pose, resolution, self.options)?;
        let name = self.name.unwrap_or_else(|| "camera".to_string());
        info!("Camera environment '{name}' ready ({}x{})", resolution.width, resolution.height);

        Ok(CameraEnvironment {
            name,
            calibration,
            pose,
            engine,
            terrain_provider: self.terrain,
            densify,
            terrain: Mutex::new(None),
            index: IndexCache::new(),
            gcp_path: self.gcp_path,
            dem_path: self.dem_path,
            image_path: self.image_path,
        })
    }
}

/// A calibrated, posed camera with an optional terrain.
pub struct CameraEnvironment {
    name: String,
    calibration: CalibrationModel,
    pose: CameraPose,
    engine: ProjectionEngine,
    terrain_provider: Option<Arc<dyn TerrainProvider>>,
    densify: usize,
    terrain: Mutex<Option<Arc<TerrainModel>>>,
    index: IndexCache,
    gcp_path: Option<PathBuf>,
    dem_path: Option<PathBuf>,
    image_path: Option<PathBuf>,
}

impl fmt::Debug for CameraEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CameraEnvironment")
            .field("name", &self.name)
            .field("pose", &self.pose)
            .field("resolution", &self.engine.resolution())
            .field("densify", &self.densify)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl CameraEnvironment {
    pub fn builder(name: impl Into<String>) -> CameraEnvironmentBuilder {
        CameraEnvironmentBuilder::new(name)
    }

    /// Builds an environment from a descriptor file. Files ending in `.yaml`
    /// or `.yml` are read as YAML, anything else as keyword/value text.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CameraEnvError> {
        let path = path.as_ref();
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));
        let descriptor = if is_yaml {
            EnvironmentDescriptor::load_from_yaml(path)?
        } else {
            EnvironmentDescriptor::load(path)?
        };
        CameraEnvironmentBuilder::from_descriptor(&descriptor)?.build()
    }

    /// Returns this environment with `provider` as its terrain source.
    /// Any cached terrain or projector is discarded.
    pub fn bind_terrain<T: TerrainProvider + 'static>(self, provider: T) -> Self {
        CameraEnvironment {
            terrain_provider: Some(Arc::new(provider)),
            terrain: Mutex::new(None),
            index: IndexCache::new(),
            ..self
        }
    }

    pub fn state(&self) -> EnvironmentState {
        if self.index.is_built() {
            EnvironmentState::IndexBuilt
        } else if self.terrain_provider.is_some() {
            EnvironmentState::TerrainBound
        } else {
            EnvironmentState::PoseSet
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Canonical intrinsic matrix and padded distortion vectors.
    pub fn calibration(&self) -> &CalibrationData {
        self.calibration.data()
    }

    pub fn calibration_model(&self) -> &CalibrationModel {
        &self.calibration
    }

    pub fn pose(&self) -> &CameraPose {
        &self.pose
    }

    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        self.pose.rotation_matrix()
    }

    pub fn resolution(&self) -> Resolution {
        self.engine.resolution()
    }

    pub fn engine(&self) -> &ProjectionEngine {
        &self.engine
    }

    /// Forward-projects world points, one per column.
    pub fn project(&self, points: &Matrix3xX<f64>) -> ProjectionResult {
        self.engine.project(points)
    }

    /// Loads the terrain on first use, densified by the configured factor.
    ///
    /// # Errors
    ///
    /// [`CameraEnvError::TerrainNotBound`] without a provider, and
    /// [`CameraEnvError::TerrainLoad`] when the provider fails. A failed load
    /// is not cached; the next call asks the provider again.
    pub fn terrain(&self) -> Result<Arc<TerrainModel>, CameraEnvError> {
        let provider = self
            .terrain_provider
            .as_ref()
            .ok_or(CameraEnvError::TerrainNotBound)?;

        let mut slot = self.terrain.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(terrain) = slot.as_ref() {
            return Ok(Arc::clone(terrain));
        }

        let raw = provider.load().map_err(as_terrain_error)?;
        let terrain = Arc::new(raw.densify(self.densify)?);
        info!(
            "Terrain loaded: {}x{} cells (densification x{})",
            terrain.shape().0,
            terrain.shape().1,
            self.densify
        );
        *slot = Some(Arc::clone(&terrain));
        Ok(terrain)
    }

    /// Builds the inverse projector, or returns the cached one when nothing
    /// it depends on has changed.
    pub fn build_inverse_index(&self) -> Result<Arc<InverseProjector>, CameraEnvError> {
        let provider = self
            .terrain_provider
            .as_ref()
            .ok_or(CameraEnvError::TerrainNotBound)?;
        let terrain = self.terrain()?;
        let key = IndexKey::new(
            &self.pose,
            self.calibration.data(),
            terrain.revision(),
            self.densify,
            self.engine.resolution(),
            self.engine.options(),
        );

        self.index.get_or_build(key, || {
            let visibility = provider
                .visibility(&terrain, &self.pose.location())
                .map_err(as_terrain_error)?;
            let index = CorrespondenceIndex::build(&self.engine, &terrain, &visibility)?;
            Ok(InverseProjector::new(index))
        })
    }

    /// Discards the cached projector and builds a new one.
    pub fn rebuild_inverse_index(&self) -> Result<Arc<InverseProjector>, CameraEnvError> {
        self.index.invalidate();
        self.build_inverse_index()
    }

    /// World coordinates for each pixel column, NaN where the pixel falls
    /// outside the correspondence hull.
    pub fn invproject(&self, pixels: &Matrix2xX<f64>) -> Result<Matrix3xX<f64>, CameraEnvError> {
        let projector = self.build_inverse_index()?;
        Ok(projector.invproject(pixels))
    }

    /// Planar world area enclosed by a pixel outline.
    ///
    /// Returns the area and the inverse-projected vertices that were used;
    /// vertices outside the correspondence hull are dropped.
    pub fn pixel_polygon_area(
        &self,
        outline: &Matrix2xX<f64>,
    ) -> Result<(f64, Matrix3xX<f64>), CameraEnvError> {
        let world = self.invproject(outline)?;
        let kept: Vec<_> = world
            .column_iter()
            .filter(|v| v.iter().all(|c| !c.is_nan()))
            .map(|v| v.into_owned())
            .collect();
        if kept.len() < world.ncols() {
            debug!(
                "{} of {} outline vertices fall outside the terrain",
                world.ncols() - kept.len(),
                world.ncols()
            );
        }
        let vertices = Matrix3xX::from_fn(kept.len(), |r, c| kept[c][r]);
        Ok((geometry::polygon_area(&vertices), vertices))
    }

    /// Reads the ground control points named by the environment.
    pub fn ground_control_points(&self) -> Result<GroundControlPoints, CameraEnvError> {
        let path = self.gcp_path.as_ref().ok_or_else(|| {
            CameraEnvError::Configuration("camera environment has no GCP file".to_string())
        })?;
        GroundControlPoints::load(path)
    }

    pub fn gcp_reprojection_error(
        &self,
        gcps: &GroundControlPoints,
    ) -> Result<ProjectionError, CameraEnvError> {
        geometry::gcp_reprojection_error(&self.engine, gcps)
    }

    /// Logs a summary of the environment at info level.
    pub fn report(&self) {
        let resolution = self.engine.resolution();
        info!("Camera environment: {}", self.name);
        info!("Camera location [X,Y,Z]: {:?}", self.pose.location);
        match &self.image_path {
            Some(path) => info!(
                "Reference image: {} ({}x{})",
                path.display(),
                resolution.width,
                resolution.height
            ),
            None => info!("Reference image size: {}x{}", resolution.width, resolution.height),
        }
        if let Some(path) = &self.dem_path {
            info!("DEM file: {}", path.display());
        }
        if self.densify == 1 {
            info!("DEM is used at raw resolution");
        } else {
            info!("DEM is resampled at {} times resolution", self.densify);
        }
        match &self.gcp_path {
            Some(path) => info!("GCP file: {}", path.display()),
            None => info!("No GCP file defined"),
        }
        if self.pose.is_unset() {
            info!("Camera pose assumed unset (zero values)");
        } else {
            info!("Camera pose [yaw, pitch, roll]: {:?}", self.pose.yaw_pitch_roll);
        }
        info!(
            "Lens distortion applied in projection: {}",
            self.engine.options().apply_lens_distortion
        );
        self.calibration.report();
        info!("State: {:?}", self.state());
    }
}

fn as_terrain_error(err: CameraEnvError) -> CameraEnvError {
    match err {
        CameraEnvError::TerrainLoad(_) => err,
        other => CameraEnvError::TerrainLoad(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terrain::GridTerrain;
    use approx::assert_relative_eq;
    use nalgebra::{DMatrix, Vector2, Vector3};
    use std::f64::consts::{FRAC_PI_2, PI};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn nadir_builder() -> CameraEnvironmentBuilder {
        let k = DMatrix::from_row_slice(
            3,
            3,
            &[1000.0, 0.0, 500.0, 0.0, 1000.0, 500.0, 0.0, 0.0, 1.0],
        );
        CameraEnvironment::builder("nadir")
            .calibration(CalibrationModel::from_raw(&k, &[], &[]).unwrap())
            .pose(
                CameraPose::new(Vector3::new(0.0, 0.0, 100.0), Vector3::new(PI, FRAC_PI_2, 0.0))
                    .unwrap(),
            )
            .resolution(Resolution {
                width: 1000,
                height: 1000,
            })
    }

    fn flat_grid(n: usize, origin: f64, spacing: f64) -> GridTerrain {
        let z = DMatrix::zeros(n, n);
        GridTerrain::new(TerrainModel::from_elevation(z, (origin, origin), spacing).unwrap())
    }

    /// Counts provider calls and can be told to fail.
    struct CountingTerrain {
        inner: GridTerrain,
        loads: Arc<AtomicUsize>,
        fail: bool,
    }

    impl TerrainProvider for CountingTerrain {
        fn load(&self) -> Result<TerrainModel, CameraEnvError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(CameraEnvError::IOError("dem.asc: no such file".to_string()));
            }
            self.inner.load()
        }

        fn visibility(
            &self,
            terrain: &TerrainModel,
            camera_location: &Vector3<f64>,
        ) -> Result<DMatrix<bool>, CameraEnvError> {
            self.inner.visibility(terrain, camera_location)
        }
    }

    #[test]
    fn test_builder_states() {
        let empty = CameraEnvironmentBuilder::default();
        assert_eq!(empty.state(), EnvironmentState::Unconfigured);
        assert!(matches!(empty.build(), Err(CameraEnvError::Configuration(_))));

        let k = DMatrix::identity(3, 3) * 500.0;
        let calibrated = CameraEnvironment::builder("x")
            .calibration(CalibrationModel::from_raw(&k, &[], &[]).unwrap());
        assert_eq!(calibrated.state(), EnvironmentState::Calibrated);
        assert!(calibrated.build().is_err());

        assert_eq!(nadir_builder().state(), EnvironmentState::PoseSet);
        assert_eq!(
            nadir_builder().terrain(flat_grid(3, -10.0, 10.0)).state(),
            EnvironmentState::TerrainBound
        );
        assert!(nadir_builder().densify(0).build().is_err());
    }

    #[test]
    fn test_environment_states() {
        let env = nadir_builder().build().unwrap();
        assert_eq!(env.state(), EnvironmentState::PoseSet);
        let pixels = Matrix2xX::from_columns(&[Vector2::new(500.0, 500.0)]);
        assert!(matches!(env.invproject(&pixels), Err(CameraEnvError::TerrainNotBound)));

        let env = env.bind_terrain(flat_grid(5, -20.0, 10.0));
        assert_eq!(env.state(), EnvironmentState::TerrainBound);
        env.invproject(&pixels).unwrap();
        assert_eq!(env.state(), EnvironmentState::IndexBuilt);
    }

    #[test]
    fn test_downward_projection() {
        let env = nadir_builder().build().unwrap();
        let result = env.project(&Matrix3xX::from_columns(&[Vector3::new(10.0, 10.0, 0.0)]));

        assert_relative_eq!(result.pixels[(0, 0)], 600.0, epsilon = 1e-9);
        assert_relative_eq!(result.pixels[(1, 0)], 600.0, epsilon = 1e-9);
        assert_relative_eq!(result.depth[0], 100.0, epsilon = 1e-9);
        assert!(result.in_frame[0]);
        assert_relative_eq!(
            env.rotation_matrix() * env.rotation_matrix().transpose(),
            Matrix3::identity(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_three_by_three_grid_reproduces_nodes_exactly() {
        let terrain = flat_grid(3, -10.0, 10.0);
        let model = terrain.terrain().clone();
        let env = nadir_builder().terrain(terrain).build().unwrap();

        let (rows, cols) = model.shape();
        let nodes: Vec<Vector3<f64>> = (0..rows)
            .flat_map(|r| (0..cols).map(move |c| (r, c)))
            .map(|(r, c)| model.point(r, c))
            .collect();
        let nodes = Matrix3xX::from_columns(&nodes);

        let projected = env.project(&nodes);
        assert_eq!(projected.in_frame_count(), 9);
        let recovered = env.invproject(&projected.pixels).unwrap();
        assert_eq!(recovered, nodes);
        assert_eq!(env.build_inverse_index().unwrap().index().len(), 9);
    }

    #[test]
    fn test_far_query_is_nan() {
        let env = nadir_builder().terrain(flat_grid(3, -10.0, 10.0)).build().unwrap();
        let far = Matrix2xX::from_columns(&[Vector2::new(-1.0e6, 1.0e6)]);
        let world = env.invproject(&far).unwrap();
        assert!(world.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_round_trip_on_densified_oblique_terrain() {
        let k = DMatrix::from_row_slice(
            3,
            3,
            &[800.0, 0.0, 400.0, 0.0, 800.0, 300.0, 0.0, 0.0, 1.0],
        );
        let terrain = flat_grid(11, 0.0, 10.0);
        let env = CameraEnvironment::builder("oblique")
            .calibration(CalibrationModel::from_raw(&k, &[], &[]).unwrap())
            .pose(
                CameraPose::new(Vector3::new(50.0, -60.0, 40.0), Vector3::new(FRAC_PI_2, 0.45, 0.0))
                    .unwrap(),
            )
            .resolution(Resolution {
                width: 800,
                height: 600,
            })
            .terrain(terrain)
            .densify(2)
            .build()
            .unwrap();

        let dense = env.terrain().unwrap();
        assert_eq!(dense.shape(), (21, 21));

        let mut checked = 0;
        for r in 0..21 {
            for c in 0..21 {
                let node = dense.point(r, c);
                let projected = env.project(&Matrix3xX::from_columns(&[node]));
                if !projected.in_frame[0] {
                    continue;
                }
                let world = env.invproject(&projected.pixels).unwrap();
                let back = world.column(0).into_owned();
                assert_relative_eq!(back, node, max_relative = 1e-3, epsilon = 1e-9);
                checked += 1;
            }
        }
        assert!(checked > 50);
    }

    #[test]
    fn test_hidden_terrain_gives_empty_index() {
        let model =
            TerrainModel::from_elevation(DMatrix::zeros(3, 3), (-10.0, -10.0), 10.0).unwrap();
        let hidden =
            GridTerrain::with_visibility(model, DMatrix::from_element(3, 3, false)).unwrap();
        let env = nadir_builder().terrain(hidden).build().unwrap();

        let pixels =
            Matrix2xX::from_columns(&[Vector2::new(500.0, 500.0), Vector2::new(1.0, 1.0)]);
        let world = env.invproject(&pixels).unwrap();
        assert_eq!(world.ncols(), 2);
        assert!(world.iter().all(|v| v.is_nan()));

        let projector = env.build_inverse_index().unwrap();
        assert!(projector.index().is_empty());
        assert_eq!(projector.triangle_count(), 0);
        assert_eq!(env.state(), EnvironmentState::IndexBuilt);
    }

    #[test]
    fn test_index_is_cached_until_rebuilt() {
        let loads = Arc::new(AtomicUsize::new(0));
        let env = nadir_builder()
            .terrain(CountingTerrain {
                inner: flat_grid(5, -20.0, 10.0),
                loads: Arc::clone(&loads),
                fail: false,
            })
            .build()
            .unwrap();

        let first = env.build_inverse_index().unwrap();
        let second = env.build_inverse_index().unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let rebuilt = env.rebuild_inverse_index().unwrap();
        assert!(!Arc::ptr_eq(&first, &rebuilt));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_terrain_failure_surfaces_as_terrain_load() {
        let loads = Arc::new(AtomicUsize::new(0));
        let env = nadir_builder()
            .terrain(CountingTerrain {
                inner: flat_grid(3, -10.0, 10.0),
                loads: Arc::clone(&loads),
                fail: true,
            })
            .build()
            .unwrap();

        let pixels = Matrix2xX::from_columns(&[Vector2::new(500.0, 500.0)]);
        assert!(matches!(env.invproject(&pixels), Err(CameraEnvError::TerrainLoad(_))));
        assert_eq!(env.state(), EnvironmentState::TerrainBound);
        assert!(env.terrain().is_err());
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_pixel_polygon_area() {
        let env = nadir_builder().terrain(flat_grid(21, -50.0, 5.0)).build().unwrap();
        // 100 px square around the principal point covers 10 m x 10 m.
        let outline = Matrix2xX::from_columns(&[
            Vector2::new(450.0, 450.0),
            Vector2::new(550.0, 450.0),
            Vector2::new(-5000.0, -5000.0),
            Vector2::new(550.0, 550.0),
            Vector2::new(450.0, 550.0),
        ]);
        let (area, vertices) = env.pixel_polygon_area(&outline).unwrap();

        assert_eq!(vertices.ncols(), 4);
        assert_relative_eq!(area, 100.0, epsilon = 1e-6);
    }

    #[test]
    fn test_outline_off_terrain_has_no_area() {
        let env = nadir_builder().terrain(flat_grid(5, -20.0, 10.0)).build().unwrap();
        let outline = Matrix2xX::from_columns(&[
            Vector2::new(-1.0e6, -1.0e6),
            Vector2::new(-2.0e6, -1.0e6),
            Vector2::new(-2.0e6, -2.0e6),
        ]);
        let (area, vertices) = env.pixel_polygon_area(&outline).unwrap();

        assert_eq!(area, 0.0);
        assert_eq!(vertices.ncols(), 0);
    }

    #[test]
    fn test_load_from_descriptor() {
        let env = CameraEnvironment::load("samples/environment.txt").unwrap();
        assert_eq!(env.name(), "NadirRig");
        assert_eq!(env.state(), EnvironmentState::PoseSet);
        assert_relative_eq!(env.calibration().focal_length().x, 1210.0, epsilon = 1e-9);
        assert_eq!(env.ground_control_points().unwrap().len(), 4);
        env.report();

        let yaml = CameraEnvironment::load("samples/environment.yaml").unwrap();
        assert_eq!(yaml.calibration().focal_length().x, 1200.0);
        assert_eq!(
            yaml.resolution(),
            Resolution {
                width: 1000,
                height: 1000
            }
        );
    }
}
