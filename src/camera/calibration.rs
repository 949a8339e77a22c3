//! Camera calibration: intrinsic matrix and lens distortion coefficients.
//!
//! Calibrations arrive in several layouts. Some tools store the intrinsic
//! matrix with the principal point in the bottom row (`[fx 0 0; s fy 0; cx cy 1]`),
//! others in the last column (`[fx s cx; 0 fy cy; 0 0 1]`), and distortion
//! vectors come with anywhere between zero and six radial terms. This module
//! normalises all of them into a single [`CalibrationData`] value:
//!
//! * radial coefficients padded to [`RADIAL_LEN`] and tangential coefficients
//!   padded to [`TANGENTIAL_LEN`], trailing entries zero;
//! * an intrinsic matrix in column-principal-point layout with zeros at
//!   `(0,1)`, `(1,0)`, `(2,0)`, `(2,1)` and a one at `(2,2)`.
//!
//! [`CalibrationModel`] records where a calibration came from (a descriptor
//! file, an average over several files, raw parameters or a chessboard
//! estimation) and delegates all numeric work to the free functions here.

use crate::camera::{validation, CameraEnvError};
use log::{debug, info};
use nalgebra::{DMatrix, Matrix3, Vector2};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Number of radial distortion coefficients stored (`k1..k6`).
pub const RADIAL_LEN: usize = 6;
/// Number of tangential distortion coefficients stored (`p1, p2`).
pub const TANGENTIAL_LEN: usize = 2;

/// Matrix cells forced to zero during canonicalisation.
const ZEROED_CELLS: [(usize, usize); 4] = [(0, 1), (1, 0), (2, 0), (2, 1)];

/// Calibration values exactly as read from a source, before normalisation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCalibration {
    pub intrinsic: DMatrix<f64>,
    pub tangential: Vec<f64>,
    pub radial: Vec<f64>,
}

/// How many distortion terms an undistortion consumer has to use.
///
/// Derived from which radial coefficients are nonzero, following the
/// OpenCV conventions of 4, 5 and 8 coefficient vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistortionTerms {
    /// `k1, k2, p1, p2`
    Four,
    /// `k1, k2, p1, p2, k3`
    Five,
    /// `k1, k2, p1, p2, k3, k4, k5, k6`
    Eight,
}

impl DistortionTerms {
    pub fn from_radial(radial: &[f64; RADIAL_LEN]) -> Self {
        if radial[3..].iter().any(|k| *k != 0.0) {
            DistortionTerms::Eight
        } else if radial[2] != 0.0 {
            DistortionTerms::Five
        } else {
            DistortionTerms::Four
        }
    }

    pub fn count(&self) -> usize {
        match self {
            DistortionTerms::Four => 4,
            DistortionTerms::Five => 5,
            DistortionTerms::Eight => 8,
        }
    }
}

/// Normalised camera calibration.
///
/// Invariants, enforced by every constructor:
/// * `intrinsic` is canonical (see [`canonicalize_intrinsic`]);
/// * focal lengths are positive and the principal point is finite;
/// * `radial` and `tangential` hold the original values in their leading
///   positions followed by zeros.
#[derive(Clone, PartialEq)]
pub struct CalibrationData {
    intrinsic: Matrix3<f64>,
    tangential: [f64; TANGENTIAL_LEN],
    radial: [f64; RADIAL_LEN],
}

impl CalibrationData {
    /// Builds a calibration from a raw `(intrinsic, tangential, radial)` triple.
    ///
    /// # Errors
    ///
    /// [`CameraEnvError::Configuration`] when the matrix is not 3x3, contains
    /// non-finite values, yields a non-positive focal length, or when a
    /// distortion vector is longer than its fixed cap.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use nalgebra::DMatrix;
    /// use camenv_tools::camera::CalibrationData;
    ///
    /// // Principal point stored in the bottom row
    /// let k = DMatrix::from_row_slice(3, 3, &[
    ///     1000.0, 0.0, 0.0,
    ///     0.5, 1010.0, 0.0,
    ///     640.0, 480.0, 1.0,
    /// ]);
    /// let calib = CalibrationData::new(&k, &[0.001], &[-0.1, 0.02]).unwrap();
    ///
    /// assert_eq!(calib.principal_point().x, 640.0);
    /// assert_eq!(calib.intrinsic_matrix()[(1, 0)], 0.0);
    /// assert_eq!(calib.tangential(), &[0.001, 0.0]);
    /// assert_eq!(calib.radial(), &[-0.1, 0.02, 0.0, 0.0, 0.0, 0.0]);
    /// ```
    pub fn new(
        intrinsic: &DMatrix<f64>,
        tangential: &[f64],
        radial: &[f64],
    ) -> Result<Self, CameraEnvError> {
        let matrix = to_matrix3(intrinsic)?;
        let tangential = pad_coefficients::<TANGENTIAL_LEN>(tangential, "tangential")?;
        let radial = pad_coefficients::<RADIAL_LEN>(radial, "radial")?;
        Self::from_parts(canonicalize_intrinsic(&matrix), tangential, radial)
    }

    pub fn from_raw(raw: &RawCalibration) -> Result<Self, CameraEnvError> {
        Self::new(&raw.intrinsic, &raw.tangential, &raw.radial)
    }

    /// Parses and normalises a calibration descriptor.
    pub fn from_descriptor_str(text: &str) -> Result<Self, CameraEnvError> {
        Self::from_raw(&parse_descriptor(text)?)
    }

    /// Reads a calibration descriptor file.
    pub fn load_descriptor<P: AsRef<Path>>(path: P) -> Result<Self, CameraEnvError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            CameraEnvError::Configuration(format!(
                "cannot read calibration descriptor {}: {e}",
                path.display()
            ))
        })?;
        Self::from_descriptor_str(&contents).map_err(|e| match e {
            CameraEnvError::Configuration(msg) => {
                CameraEnvError::Configuration(format!("{}: {msg}", path.display()))
            }
            other => other,
        })
    }

    /// Elementwise mean over several calibrations.
    ///
    /// Each input is already canonical, so the mean is taken over matrices of
    /// the same layout and is itself canonical.
    pub fn mean(calibrations: &[CalibrationData]) -> Result<Self, CameraEnvError> {
        if calibrations.is_empty() {
            return Err(CameraEnvError::Configuration(
                "cannot average an empty set of calibrations".to_string(),
            ));
        }
        let n = calibrations.len() as f64;

        let mut intrinsic = Matrix3::zeros();
        let mut tangential = [0.0; TANGENTIAL_LEN];
        let mut radial = [0.0; RADIAL_LEN];
        for calib in calibrations {
            intrinsic += calib.intrinsic;
            for (acc, v) in tangential.iter_mut().zip(calib.tangential.iter()) {
                *acc += v;
            }
            for (acc, v) in radial.iter_mut().zip(calib.radial.iter()) {
                *acc += v;
            }
        }
        intrinsic /= n;
        tangential.iter_mut().for_each(|v| *v /= n);
        radial.iter_mut().for_each(|v| *v /= n);

        Self::from_parts(canonicalize_intrinsic(&intrinsic), tangential, radial)
    }

    fn from_parts(
        intrinsic: Matrix3<f64>,
        tangential: [f64; TANGENTIAL_LEN],
        radial: [f64; RADIAL_LEN],
    ) -> Result<Self, CameraEnvError> {
        let calib = CalibrationData {
            intrinsic,
            tangential,
            radial,
        };
        calib.validate_params()?;
        Ok(calib)
    }

    pub fn validate_params(&self) -> Result<(), CameraEnvError> {
        let f = self.focal_length();
        let c = self.principal_point();
        validation::validate_focal_length(f.x, f.y)?;
        validation::validate_principal_point(c.x, c.y)?;
        if self
            .tangential
            .iter()
            .chain(self.radial.iter())
            .any(|v| !v.is_finite())
        {
            return Err(CameraEnvError::Configuration(
                "distortion coefficients must be finite".to_string(),
            ));
        }
        Ok(())
    }

    /// The canonical intrinsic matrix.
    pub fn intrinsic_matrix(&self) -> &Matrix3<f64> {
        &self.intrinsic
    }

    /// `(fx, fy)` read from cells `(0,0)` and `(1,1)`.
    pub fn focal_length(&self) -> Vector2<f64> {
        Vector2::new(self.intrinsic[(0, 0)], self.intrinsic[(1, 1)])
    }

    /// `(cx, cy)` read from cells `(0,2)` and `(1,2)`.
    pub fn principal_point(&self) -> Vector2<f64> {
        Vector2::new(self.intrinsic[(0, 2)], self.intrinsic[(1, 2)])
    }

    pub fn tangential(&self) -> &[f64; TANGENTIAL_LEN] {
        &self.tangential
    }

    pub fn radial(&self) -> &[f64; RADIAL_LEN] {
        &self.radial
    }

    pub fn distortion_terms(&self) -> DistortionTerms {
        DistortionTerms::from_radial(&self.radial)
    }

    /// Distortion coefficients in OpenCV order, truncated to the number of
    /// terms the calibration actually uses.
    pub fn opencv_coefficients(&self) -> Vec<f64> {
        let [k1, k2, k3, k4, k5, k6] = self.radial;
        let [p1, p2] = self.tangential;
        let mut coeffs = vec![k1, k2, p1, p2, k3, k4, k5, k6];
        coeffs.truncate(self.distortion_terms().count());
        coeffs
    }

    /// Whether any distortion coefficient is nonzero.
    pub fn has_distortion(&self) -> bool {
        self.radial
            .iter()
            .chain(self.tangential.iter())
            .any(|v| *v != 0.0)
    }
}

impl fmt::Debug for CalibrationData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let focal = self.focal_length();
        let centre = self.principal_point();
        write!(
            f,
            "CalibrationData [fx: {} fy: {} cx: {} cy: {} radial: {:?} tangential: {:?}]",
            focal.x, focal.y, centre.x, centre.y, self.radial, self.tangential
        )
    }
}

/// Canonicalises an intrinsic matrix.
///
/// A matrix whose bottom row carries the principal point (nonzero `(2,0)` and
/// `(2,1)`, zero `(0,2)` and `(1,2)`) is transposed first. The cells
/// `(0,1)`, `(1,0)`, `(2,0)`, `(2,1)` are then zeroed and `(2,2)` set to one.
pub fn canonicalize_intrinsic(matrix: &Matrix3<f64>) -> Matrix3<f64> {
    let transposed = matrix[(2, 0)] != 0.0
        && matrix[(2, 1)] != 0.0
        && matrix[(0, 2)] == 0.0
        && matrix[(1, 2)] == 0.0;

    let mut canonical = if transposed {
        debug!("Intrinsic matrix has row-principal-point layout, transposing");
        matrix.transpose()
    } else {
        *matrix
    };
    for (row, col) in ZEROED_CELLS {
        canonical[(row, col)] = 0.0;
    }
    canonical[(2, 2)] = 1.0;
    canonical
}

/// Pads `values` with trailing zeros to exactly `N` entries.
pub fn pad_coefficients<const N: usize>(
    values: &[f64],
    what: &str,
) -> Result<[f64; N], CameraEnvError> {
    if values.len() > N {
        return Err(CameraEnvError::Configuration(format!(
            "{what} distortion has {} coefficients, at most {N} are supported",
            values.len()
        )));
    }
    let mut padded = [0.0; N];
    padded[..values.len()].copy_from_slice(values);
    Ok(padded)
}

fn to_matrix3(matrix: &DMatrix<f64>) -> Result<Matrix3<f64>, CameraEnvError> {
    if matrix.nrows() != 3 || matrix.ncols() != 3 {
        return Err(CameraEnvError::Configuration(format!(
            "intrinsic matrix must be 3x3, got {}x{}",
            matrix.nrows(),
            matrix.ncols()
        )));
    }
    if matrix.iter().any(|v| !v.is_finite()) {
        return Err(CameraEnvError::Configuration(
            "intrinsic matrix contains non-finite values".to_string(),
        ));
    }
    Ok(Matrix3::from_fn(|r, c| matrix[(r, c)]))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Radial,
    Tangential,
    Intrinsic,
}

enum Label {
    Section(Section),
    End,
}

fn parse_label(line: &str) -> Option<Label> {
    let word = line.trim_end_matches(':');
    if word.eq_ignore_ascii_case("RadialDistortion") {
        Some(Label::Section(Section::Radial))
    } else if word.eq_ignore_ascii_case("TangentialDistortion") {
        Some(Label::Section(Section::Tangential))
    } else if word.eq_ignore_ascii_case("IntrinsicMatrix") {
        Some(Label::Section(Section::Intrinsic))
    } else if word.eq_ignore_ascii_case("End") {
        Some(Label::End)
    } else {
        None
    }
}

/// Splits a value line on whitespace, commas and semicolons, ignoring brackets.
pub(crate) fn parse_values(line: &str, line_no: usize) -> Result<Vec<f64>, CameraEnvError> {
    line.split(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | '[' | ']'))
        .filter(|token| !token.is_empty())
        .map(|token| {
            token.parse::<f64>().map_err(|_| {
                CameraEnvError::Configuration(format!(
                    "invalid number '{token}' on line {line_no}"
                ))
            })
        })
        .collect()
}

/// Parses the sectioned calibration descriptor text format.
///
/// ```text
/// RadialDistortion
/// [-0.12 0.03]
/// TangentialDistortion
/// [0.001 0.0]
/// IntrinsicMatrix
/// [1000 0 0]
/// [0 1000 0]
/// [640 480 1]
/// End
/// ```
pub fn parse_descriptor(text: &str) -> Result<RawCalibration, CameraEnvError> {
    let mut section: Option<Section> = None;
    let mut radial = Vec::new();
    let mut tangential = Vec::new();
    let mut rows: Vec<Vec<f64>> = Vec::new();
    let mut seen_intrinsic = false;

    for (idx, raw_line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        match parse_label(line) {
            Some(Label::End) => break,
            Some(Label::Section(s)) => {
                if s == Section::Intrinsic {
                    seen_intrinsic = true;
                }
                section = Some(s);
            }
            None => {
                let values = parse_values(line, line_no)?;
                match section {
                    Some(Section::Radial) => radial.extend(values),
                    Some(Section::Tangential) => tangential.extend(values),
                    Some(Section::Intrinsic) => rows.push(values),
                    None => {
                        return Err(CameraEnvError::Configuration(format!(
                            "value on line {line_no} appears before any section label"
                        )))
                    }
                }
            }
        }
    }

    if !seen_intrinsic || rows.is_empty() {
        return Err(CameraEnvError::Configuration(
            "calibration descriptor has no IntrinsicMatrix section".to_string(),
        ));
    }
    if rows.len() != 3 || rows.iter().any(|row| row.len() != 3) {
        let shape: Vec<usize> = rows.iter().map(Vec::len).collect();
        return Err(CameraEnvError::Configuration(format!(
            "intrinsic matrix must be three rows of three values, got row lengths {shape:?}"
        )));
    }

    let flat: Vec<f64> = rows.into_iter().flatten().collect();
    Ok(RawCalibration {
        intrinsic: DMatrix::from_row_slice(3, 3, &flat),
        tangential,
        radial,
    })
}

/// External chessboard calibration.
///
/// Implementors detect chessboard corners in a set of images and solve for
/// the camera matrix and distortion. Only the resulting values are consumed
/// here.
pub trait ChessboardCalibrator {
    fn calibrate(&self, images: &[PathBuf]) -> Result<RawCalibration, CameraEnvError>;
}

/// Where a [`CalibrationModel`] got its values from.
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationSource {
    Descriptor(PathBuf),
    Averaged(Vec<PathBuf>),
    Raw,
    Chessboard { images: usize },
}

/// A normalised calibration together with its provenance.
#[derive(Debug, Clone)]
pub struct CalibrationModel {
    data: CalibrationData,
    source: CalibrationSource,
}

impl CalibrationModel {
    pub fn from_descriptor<P: AsRef<Path>>(path: P) -> Result<Self, CameraEnvError> {
        let path = path.as_ref();
        info!("Reading camera calibration from {}", path.display());
        let data = CalibrationData::load_descriptor(path)?;
        Ok(CalibrationModel {
            data,
            source: CalibrationSource::Descriptor(path.to_path_buf()),
        })
    }

    /// Averages the calibrations stored in several descriptor files.
    pub fn from_descriptors<P: AsRef<Path>>(paths: &[P]) -> Result<Self, CameraEnvError> {
        info!("Averaging camera calibration over {} files", paths.len());
        let calibrations = paths
            .iter()
            .map(CalibrationData::load_descriptor)
            .collect::<Result<Vec<_>, _>>()?;
        let data = CalibrationData::mean(&calibrations)?;
        Ok(CalibrationModel {
            data,
            source: CalibrationSource::Averaged(
                paths.iter().map(|p| p.as_ref().to_path_buf()).collect(),
            ),
        })
    }

    /// Loads one descriptor, or the mean of several.
    pub fn from_paths<P: AsRef<Path>>(paths: &[P]) -> Result<Self, CameraEnvError> {
        match paths {
            [] => Err(CameraEnvError::Configuration(
                "no calibration descriptor given".to_string(),
            )),
            [single] => Self::from_descriptor(single),
            many => Self::from_descriptors(many),
        }
    }

    pub fn from_raw(
        intrinsic: &DMatrix<f64>,
        tangential: &[f64],
        radial: &[f64],
    ) -> Result<Self, CameraEnvError> {
        Ok(CalibrationModel {
            data: CalibrationData::new(intrinsic, tangential, radial)?,
            source: CalibrationSource::Raw,
        })
    }

    pub fn from_chessboard<C: ChessboardCalibrator + ?Sized>(
        calibrator: &C,
        images: &[PathBuf],
    ) -> Result<Self, CameraEnvError> {
        if images.is_empty() {
            return Err(CameraEnvError::Configuration(
                "chessboard calibration needs at least one image".to_string(),
            ));
        }
        info!("Estimating calibration from {} chessboard images", images.len());
        let raw = calibrator.calibrate(images)?;
        Ok(CalibrationModel {
            data: CalibrationData::from_raw(&raw)?,
            source: CalibrationSource::Chessboard {
                images: images.len(),
            },
        })
    }

    pub fn data(&self) -> &CalibrationData {
        &self.data
    }

    pub fn source(&self) -> &CalibrationSource {
        &self.source
    }

    pub fn report(&self) {
        let k = self.data.intrinsic_matrix();
        info!("Calibration source: {:?}", self.source);
        info!("Intrinsic matrix:");
        for r in 0..3 {
            info!("  {} {} {}", k[(r, 0)], k[(r, 1)], k[(r, 2)]);
        }
        info!("Tangential correction: {:?}", self.data.tangential());
        info!("Radial correction: {:?}", self.data.radial());
        info!(
            "Focal length: {:?}  Principal point: {:?}",
            self.data.focal_length().as_slice(),
            self.data.principal_point().as_slice()
        );
    }
}
