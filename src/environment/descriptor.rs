//! Versioned camera environment descriptor.
//!
//! One schema, two encodings. The keyword/value text form puts each keyword
//! on its own line with the value on the next non-comment line:
//!
//! ```text
//! descriptor_version
//! 1
//! camera_environment_name
//! Glacier_North
//! calibration_path
//! [calib_2014.txt, calib_2015.txt]
//! camera_location
//! [447948.820 8759457.100 407.092]
//! yaw_pitch_roll
//! [2.1 0.2 0.0]
//! ```
//!
//! The YAML form uses the same keys. Relative paths are resolved against the
//! directory of the descriptor file.

use crate::camera::calibration::parse_values;
use crate::camera::{CalibrationModel, CameraEnvError, CameraPose, Resolution};
use log::{debug, warn};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use yaml_rust::{Yaml, YamlLoader};

/// Descriptor schema version written by this crate.
pub const CURRENT_VERSION: u32 = 1;

const KEYWORDS: [&str; 11] = [
    "descriptor_version",
    "camera_environment_name",
    "gcp_path",
    "dem_path",
    "image_path",
    "calibration_path",
    "camera_location",
    "yaw_pitch_roll",
    "dem_densification",
    "image_size",
    "apply_lens_distortion",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentDescriptor {
    pub descriptor_version: u32,
    pub camera_environment_name: String,
    pub gcp_path: Option<PathBuf>,
    pub dem_path: Option<PathBuf>,
    pub image_path: Option<PathBuf>,
    pub calibration_path: Vec<PathBuf>,
    pub camera_location: [f64; 3],
    pub yaw_pitch_roll: [f64; 3],
    pub dem_densification: usize,
    pub image_size: Option<[u32; 2]>,
    pub apply_lens_distortion: bool,
}

impl EnvironmentDescriptor {
    /// Reads a keyword/value text descriptor and resolves its paths.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CameraEnvError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            CameraEnvError::Configuration(format!(
                "cannot read environment descriptor {}: {e}",
                path.display()
            ))
        })?;
        let mut descriptor = Self::from_text(&text)?;
        descriptor.resolve_paths(path.parent().unwrap_or(Path::new("")));
        Ok(descriptor)
    }

    /// Parses the keyword/value text form without touching the filesystem.
    pub fn from_text(text: &str) -> Result<Self, CameraEnvError> {
        let lines: Vec<(usize, &str)> = text
            .lines()
            .enumerate()
            .map(|(i, line)| (i + 1, line.split('#').next().unwrap_or("").trim()))
            .filter(|(_, line)| !line.is_empty())
            .collect();

        let mut fields = RawFields::default();
        let mut i = 0;
        while i < lines.len() {
            let (line_no, line) = lines[i];
            let keyword = line.trim_end_matches(':').to_ascii_lowercase();
            if !KEYWORDS.contains(&keyword.as_str()) {
                return Err(CameraEnvError::Configuration(format!(
                    "unknown keyword '{line}' on line {line_no}"
                )));
            }
            let (value_line_no, value) = lines.get(i + 1).copied().ok_or_else(|| {
                CameraEnvError::Configuration(format!("keyword '{keyword}' has no value"))
            })?;
            fields.set(&keyword, value, value_line_no)?;
            i += 2;
        }

        fields.finish()
    }

    /// Reads the YAML encoding and resolves its paths.
    pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, CameraEnvError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let docs = YamlLoader::load_from_str(&contents)?;
        let doc = docs.first().ok_or_else(|| {
            CameraEnvError::YamlError(format!("{} holds no YAML document", path.display()))
        })?;

        let mut fields = RawFields::default();
        for keyword in KEYWORDS {
            match &doc[keyword] {
                Yaml::BadValue | Yaml::Null => {}
                value => fields.set_yaml(keyword, value)?,
            }
        }
        let mut descriptor = fields.finish()?;
        descriptor.resolve_paths(path.parent().unwrap_or(Path::new("")));
        Ok(descriptor)
    }

    /// Writes the YAML encoding. Paths are written as they are held.
    pub fn save_to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), CameraEnvError> {
        let yaml_string = serde_yaml::to_string(self)?;
        let mut file = fs::File::create(path.as_ref())?;
        file.write_all(yaml_string.as_bytes())?;
        Ok(())
    }

    /// Joins every relative path onto `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        let paths = self
            .gcp_path
            .iter_mut()
            .chain(self.dem_path.iter_mut())
            .chain(self.image_path.iter_mut())
            .chain(self.calibration_path.iter_mut());
        for path in paths {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }

    pub fn calibration(&self) -> Result<CalibrationModel, CameraEnvError> {
        CalibrationModel::from_paths(&self.calibration_path)
    }

    pub fn pose(&self) -> Result<CameraPose, CameraEnvError> {
        CameraPose::new(
            Vector3::from(self.camera_location),
            Vector3::from(self.yaw_pitch_roll),
        )
    }

    /// Reference image size: `image_size` when given, otherwise read from the
    /// header of `image_path`.
    pub fn resolution(&self) -> Result<Resolution, CameraEnvError> {
        if let Some([width, height]) = self.image_size {
            return Ok(Resolution { width, height });
        }
        let image_path = self.image_path.as_ref().ok_or_else(|| {
            CameraEnvError::Configuration(
                "descriptor gives neither image_size nor image_path".to_string(),
            )
        })?;
        let (width, height) = image::image_dimensions(image_path).map_err(|e| {
            CameraEnvError::Configuration(format!(
                "cannot read reference image size from {}: {e}",
                image_path.display()
            ))
        })?;
        debug!("Reference image {}: {width}x{height}", image_path.display());
        Ok(Resolution { width, height })
    }
}

/// Fields collected from either encoding before defaults and checks apply.
#[derive(Default)]
struct RawFields {
    version: Option<u32>,
    name: Option<String>,
    gcp_path: Option<PathBuf>,
    dem_path: Option<PathBuf>,
    image_path: Option<PathBuf>,
    calibration_path: Vec<PathBuf>,
    camera_location: Option<[f64; 3]>,
    yaw_pitch_roll: Option<[f64; 3]>,
    dem_densification: Option<usize>,
    image_size: Option<[u32; 2]>,
    apply_lens_distortion: Option<bool>,
}

impl RawFields {
    fn set(&mut self, keyword: &str, value: &str, line_no: usize) -> Result<(), CameraEnvError> {
        match keyword {
            "descriptor_version" => self.version = Some(parse_count(value, keyword)?),
            "camera_environment_name" => self.name = Some(value.to_string()),
            "gcp_path" => self.gcp_path = Some(PathBuf::from(value)),
            "dem_path" => self.dem_path = Some(PathBuf::from(value)),
            "image_path" => self.image_path = Some(PathBuf::from(value)),
            "calibration_path" => {
                self.calibration_path = value
                    .trim_matches(|c| c == '[' || c == ']')
                    .split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(PathBuf::from)
                    .collect()
            }
            "camera_location" => {
                self.camera_location = Some(triple(&parse_values(value, line_no)?, keyword)?)
            }
            "yaw_pitch_roll" => {
                self.yaw_pitch_roll = Some(triple(&parse_values(value, line_no)?, keyword)?)
            }
            "dem_densification" => self.dem_densification = Some(parse_count(value, keyword)?),
            "image_size" => {
                let values = parse_values(value, line_no)?;
                self.image_size = Some(pair(&values, keyword)?);
            }
            "apply_lens_distortion" => {
                self.apply_lens_distortion = Some(parse_flag(value)?);
            }
            _ => {
                return Err(CameraEnvError::Configuration(format!(
                    "unknown keyword '{keyword}'"
                )))
            }
        }
        Ok(())
    }

    fn set_yaml(&mut self, keyword: &str, value: &Yaml) -> Result<(), CameraEnvError> {
        let text = match value {
            Yaml::Array(items) => {
                let parts = items
                    .iter()
                    .map(|item| scalar_text(item, keyword))
                    .collect::<Result<Vec<_>, _>>()?;
                if keyword == "calibration_path" {
                    parts.join(",")
                } else {
                    parts.join(" ")
                }
            }
            other => scalar_text(other, keyword)?,
        };
        self.set(keyword, &text, 0)
    }

    fn finish(self) -> Result<EnvironmentDescriptor, CameraEnvError> {
        let descriptor_version = match self.version {
            Some(CURRENT_VERSION) => CURRENT_VERSION,
            Some(other) => {
                return Err(CameraEnvError::Configuration(format!(
                    "unsupported descriptor version {other}, expected {CURRENT_VERSION}"
                )))
            }
            None => {
                warn!(
                    "Environment descriptor has no descriptor_version, reading it as version {}",
                    CURRENT_VERSION
                );
                CURRENT_VERSION
            }
        };

        let camera_environment_name = self
            .name
            .ok_or_else(|| missing("camera_environment_name"))?;
        let camera_location = self.camera_location.ok_or_else(|| missing("camera_location"))?;
        if self.calibration_path.is_empty() {
            return Err(missing("calibration_path"));
        }
        let yaw_pitch_roll = self.yaw_pitch_roll.unwrap_or_else(|| {
            warn!("No yaw_pitch_roll given, camera pose assumed unset");
            [0.0; 3]
        });
        let dem_densification = self.dem_densification.unwrap_or(1);
        if dem_densification == 0 {
            return Err(CameraEnvError::Configuration(
                "dem_densification must be at least 1".to_string(),
            ));
        }

        Ok(EnvironmentDescriptor {
            descriptor_version,
            camera_environment_name,
            gcp_path: self.gcp_path,
            dem_path: self.dem_path,
            image_path: self.image_path,
            calibration_path: self.calibration_path,
            camera_location,
            yaw_pitch_roll,
            dem_densification,
            image_size: self.image_size,
            apply_lens_distortion: self.apply_lens_distortion.unwrap_or(false),
        })
    }
}

fn missing(keyword: &str) -> CameraEnvError {
    CameraEnvError::Configuration(format!("environment descriptor is missing '{keyword}'"))
}

fn scalar_text(value: &Yaml, keyword: &str) -> Result<String, CameraEnvError> {
    match value {
        Yaml::Real(s) | Yaml::String(s) => Ok(s.clone()),
        Yaml::Integer(i) => Ok(i.to_string()),
        Yaml::Boolean(b) => Ok(b.to_string()),
        _ => Err(CameraEnvError::YamlError(format!(
            "unexpected value for '{keyword}': {value:?}"
        ))),
    }
}

fn parse_count<T: FromStr>(value: &str, keyword: &str) -> Result<T, CameraEnvError> {
    value.parse::<T>().map_err(|_| {
        CameraEnvError::Configuration(format!("'{keyword}' must be a whole number, got '{value}'"))
    })
}

fn parse_flag(value: &str) -> Result<bool, CameraEnvError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(CameraEnvError::Configuration(format!(
            "expected true or false, got '{value}'"
        ))),
    }
}

fn triple(values: &[f64], keyword: &str) -> Result<[f64; 3], CameraEnvError> {
    <[f64; 3]>::try_from(values).map_err(|_| {
        CameraEnvError::Configuration(format!(
            "'{keyword}' needs 3 values, got {}",
            values.len()
        ))
    })
}

const MAX_SIDE: f64 = u32::MAX as f64;

fn pair(values: &[f64], keyword: &str) -> Result<[u32; 2], CameraEnvError> {
    match values {
        [w, h] if [w, h].iter().all(|v| v.fract() == 0.0 && (1.0..=MAX_SIDE).contains(*v)) => {
            Ok([*w as u32, *h as u32])
        }
        _ => Err(CameraEnvError::Configuration(format!(
            "'{keyword}' needs two positive whole numbers, got {values:?}"
        ))),
    }
}
