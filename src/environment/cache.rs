//! Keyed cache for the inverse projector.
//!
//! The projector is a function of the pose, the calibration, the terrain
//! revision, the densification factor, the image size and the projection
//! options. [`IndexKey`] captures exactly those inputs, so a cached projector
//! is reused only when every one of them matches.

use crate::camera::{CalibrationData, CameraEnvError, CameraPose, ProjectionOptions, Resolution};
use crate::inverse::InverseProjector;
use log::debug;
use std::sync::{Arc, Mutex, MutexGuard};

/// Identity of the inputs an inverse projector was built from.
///
/// Floating-point inputs are compared by bit pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexKey {
    pose: [u64; 6],
    calibration: Vec<u64>,
    terrain_revision: u64,
    densify: usize,
    resolution: Resolution,
    options: ProjectionOptions,
}

impl IndexKey {
    pub fn new(
        pose: &CameraPose,
        calibration: &CalibrationData,
        terrain_revision: u64,
        densify: usize,
        resolution: Resolution,
        options: ProjectionOptions,
    ) -> Self {
        let mut pose_bits = [0u64; 6];
        for (bits, value) in pose_bits
            .iter_mut()
            .zip(pose.location.iter().chain(pose.yaw_pitch_roll.iter()))
        {
            *bits = value.to_bits();
        }

        let calibration_bits = calibration
            .intrinsic_matrix()
            .iter()
            .chain(calibration.tangential().iter())
            .chain(calibration.radial().iter())
            .map(|v| v.to_bits())
            .collect();

        IndexKey {
            pose: pose_bits,
            calibration: calibration_bits,
            terrain_revision,
            densify,
            resolution,
            options,
        }
    }
}

/// Single-slot cache holding the most recently built projector.
///
/// The slot lock is held while building, so concurrent first callers wait
/// for one build instead of racing.
#[derive(Debug, Default)]
pub struct IndexCache {
    slot: Mutex<Option<(IndexKey, Arc<InverseProjector>)>>,
}

impl IndexCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached projector for `key`, building it with `build` when
    /// the slot is empty or holds a different key. A failed build leaves the
    /// slot untouched.
    pub fn get_or_build<F>(
        &self,
        key: IndexKey,
        build: F,
    ) -> Result<Arc<InverseProjector>, CameraEnvError>
    where
        F: FnOnce() -> Result<InverseProjector, CameraEnvError>,
    {
        let mut slot = self.lock();
        if let Some((cached_key, projector)) = slot.as_ref() {
            if *cached_key == key {
                return Ok(Arc::clone(projector));
            }
            debug!("Cached inverse projector is stale, rebuilding");
        }

        let projector = Arc::new(build()?);
        *slot = Some((key, Arc::clone(&projector)));
        Ok(projector)
    }

    /// Drops the cached projector. Handles already given out stay valid.
    pub fn invalidate(&self) {
        *self.lock() = None;
    }

    pub fn is_built(&self) -> bool {
        self.lock().is_some()
    }

    pub fn key(&self) -> Option<IndexKey> {
        self.lock().as_ref().map(|(key, _)| key.clone())
    }

    fn lock(&self) -> MutexGuard<'_, Option<(IndexKey, Arc<InverseProjector>)>> {
        // A panic inside a build never stores a partial value, so the slot
        // is still consistent after poisoning.
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
