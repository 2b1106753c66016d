//! KITTI calibration and object label parsing.

use std::fs;
use std::path::Path;

use nalgebra::Matrix4;
use thiserror::Error;

/// Errors that can occur while reading KITTI frame metadata.
#[derive(Error, Debug)]
pub enum KittiError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("calibration entry '{0}' not found")]
    MissingEntry(String),

    #[error("calibration entry '{key}' has {found} values, expected {expected}")]
    WrongArity {
        key: String,
        found: usize,
        expected: usize,
    },

    #[error("line {line}: invalid number '{value}'")]
    InvalidNumber { line: usize, value: String },

    #[error("line {line}: expected at least 15 fields, found {found}")]
    ShortLabel { line: usize, found: usize },
}

/// Result type for KITTI parsing.
pub type Result<T> = std::result::Result<T, KittiError>;

/// Camera/LiDAR calibration for one frame, as homogeneous 4x4 matrices.
#[derive(Debug, Clone, PartialEq)]
pub struct Calibration {
    /// Rectifying rotation `R0_rect`.
    pub rect: Matrix4<f64>,
    /// LiDAR-to-camera rigid transform `Tr_velo_to_cam`.
    pub velo_to_cam: Matrix4<f64>,
}

impl Calibration {
    /// Parse a KITTI `calib/*.txt` file body.
    ///
    /// Each line is `key: v0 v1 ...`. `R0_rect` (3x3) and `Tr_velo_to_cam`
    /// (3x4) are required; other entries are ignored.
    pub fn parse(text: &str) -> Result<Self> {
        let mut rect = None;
        let mut velo_to_cam = None;

        for (line_no, line) in text.lines().enumerate() {
            let Some((key, values)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim();
            if key != "R0_rect" && key != "Tr_velo_to_cam" {
                continue;
            }

            let values = parse_numbers(values, line_no + 1)?;
            match key {
                "R0_rect" => rect = Some(lift_rotation(key, &values)?),
                _ => velo_to_cam = Some(lift_rigid(key, &values)?),
            }
        }

        Ok(Self {
            rect: rect.ok_or_else(|| KittiError::MissingEntry("R0_rect".to_string()))?,
            velo_to_cam: velo_to_cam
                .ok_or_else(|| KittiError::MissingEntry("Tr_velo_to_cam".to_string()))?,
        })
    }

    /// Read and parse a calibration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::parse(&fs::read_to_string(path)?)
    }
}

fn parse_numbers(values: &str, line: usize) -> Result<Vec<f64>> {
    values
        .split_whitespace()
        .map(|v| {
            v.parse::<f64>().map_err(|_| KittiError::InvalidNumber {
                line,
                value: v.to_string(),
            })
        })
        .collect()
}

fn check_arity(key: &str, values: &[f64], expected: usize) -> Result<()> {
    if values.len() != expected {
        return Err(KittiError::WrongArity {
            key: key.to_string(),
            found: values.len(),
            expected,
        });
    }
    Ok(())
}

/// Embed a row-major 3x3 rotation in a homogeneous 4x4 matrix.
fn lift_rotation(key: &str, v: &[f64]) -> Result<Matrix4<f64>> {
    check_arity(key, v, 9)?;
    #[rustfmt::skip]
    let m = Matrix4::new(
        v[0], v[1], v[2], 0.0,
        v[3], v[4], v[5], 0.0,
        v[6], v[7], v[8], 0.0,
        0.0,  0.0,  0.0,  1.0,
    );
    Ok(m)
}

/// Embed a row-major 3x4 rigid transform in a homogeneous 4x4 matrix.
fn lift_rigid(key: &str, v: &[f64]) -> Result<Matrix4<f64>> {
    check_arity(key, v, 12)?;
    #[rustfmt::skip]
    let m = Matrix4::new(
        v[0], v[1], v[2],  v[3],
        v[4], v[5], v[6],  v[7],
        v[8], v[9], v[10], v[11],
        0.0,  0.0,  0.0,   1.0,
    );
    Ok(m)
}

/// One annotated object from a KITTI `label_2/*.txt` file.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectLabel {
    /// Class name, e.g. `Car`, `Pedestrian`, `DontCare`.
    pub kind: String,
    pub truncated: f64,
    pub occluded: i32,
    /// Observation angle.
    pub alpha: f64,
    /// 2D box in image pixels: left, top, right, bottom.
    pub bbox_2d: [f64; 4],
    /// Object size in meters as (height, width, length).
    pub dimensions: [f64; 3],
    /// Bottom-center in camera coordinates.
    pub location: [f64; 3],
    /// Rotation about the camera y axis.
    pub rotation_y: f64,
}

/// Parse every object line of a KITTI label file body.
///
/// Blank lines are skipped. Trailing fields beyond the fifteenth (such as
/// detection scores) are ignored.
pub fn parse_objects(text: &str) -> Result<Vec<ObjectLabel>> {
    let mut objects = Vec::new();

    for (line_no, line) in text.lines().enumerate() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }
        if fields.len() < 15 {
            return Err(KittiError::ShortLabel {
                line: line_no + 1,
                found: fields.len(),
            });
        }

        let num = |i: usize| -> Result<f64> {
            fields[i].parse::<f64>().map_err(|_| KittiError::InvalidNumber {
                line: line_no + 1,
                value: fields[i].to_string(),
            })
        };

        objects.push(ObjectLabel {
            kind: fields[0].to_string(),
            truncated: num(1)?,
            occluded: num(2)? as i32,
            alpha: num(3)?,
            bbox_2d: [num(4)?, num(5)?, num(6)?, num(7)?],
            dimensions: [num(8)?, num(9)?, num(10)?],
            location: [num(11)?, num(12)?, num(13)?],
            rotation_y: num(14)?,
        });
    }

    Ok(objects)
}

/// Read and parse a label file.
pub fn load_objects<P: AsRef<Path>>(path: P) -> Result<Vec<ObjectLabel>> {
    parse_objects(&fs::read_to_string(path)?)
}
