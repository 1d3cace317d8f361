//! The `.exp` experiment descriptor.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use elastid_math::{Aabb, DVec, Mat3, Mat4};

use crate::{DescriptorError, Result};

const HEADER: &str = "EXPERIMENT SETTINGS";

/// Everything one estimation run needs to locate its inputs.
#[derive(Debug, Clone)]
pub struct ExperimentDescriptor {
    pub experiment_out_path: PathBuf,
    /// Captured length in seconds.
    pub duration: f64,
    /// Simulation sub-step size in seconds.
    pub dt: f64,
    /// Sub-steps per rendered frame.
    pub sub_steps: usize,
    pub fps: usize,
    pub camera_data_path: PathBuf,
    /// Row-major pinhole intrinsics.
    pub camera_intrinsics: Mat3,
    pub camera_distortion: DVec,
    pub rgb_to_depth_transform: Mat4,
    pub camera_transform: Mat4,
    pub object_data_path: PathBuf,
    pub object_transform: Mat4,
    /// Per-box [axis][min, max] Dirichlet selections.
    pub object_dirichlet_boundary_conditions: Vec<[[f64; 2]; 3]>,
    /// Per-box [axis][min, max] material partitions.
    pub object_parameter_bounding_boxes: Vec<[[f64; 2]; 3]>,
}

impl ExperimentDescriptor {
    /// Number of rendered frames over the captured duration.
    pub fn num_frames(&self) -> usize {
        (self.duration * self.fps as f64).round() as usize
    }

    /// Total sub-steps over the captured duration.
    pub fn total_steps(&self) -> usize {
        self.num_frames() * self.sub_steps
    }

    pub fn dirichlet_boxes(&self) -> Vec<Aabb> {
        self.object_dirichlet_boundary_conditions
            .iter()
            .map(|&pairs| Aabb::from_pairs(pairs))
            .collect()
    }

    pub fn parameter_boxes(&self) -> Vec<Aabb> {
        self.object_parameter_bounding_boxes
            .iter()
            .map(|&pairs| Aabb::from_pairs(pairs))
            .collect()
    }

    pub fn load(path: &Path) -> Result<Self> {
        if path.extension().and_then(|e| e.to_str()) != Some("exp") {
            return Err(DescriptorError::BadExtension(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if path.extension().and_then(|e| e.to_str()) != Some("exp") {
            return Err(DescriptorError::BadExtension(path.to_path_buf()));
        }
        std::fs::write(path, self.serialize())?;
        Ok(())
    }

    fn parse(text: &str) -> Result<Self> {
        let mut lines = text.lines();
        let header = lines.next().unwrap_or_default();
        if header != HEADER {
            return Err(DescriptorError::BadHeader {
                found: header.to_string(),
            });
        }

        let mut settings = HashMap::new();
        for (number, line) in lines.enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or(DescriptorError::BadLine { line: number + 2 })?;
            settings.insert(key.trim().to_string(), value.trim().to_string());
        }

        Ok(Self {
            experiment_out_path: PathBuf::from(take(&mut settings, "experiment_out_path")?),
            duration: parse_float(&mut settings, "duration")?,
            dt: parse_float(&mut settings, "dt")?,
            sub_steps: parse_int(&mut settings, "sub_steps")?,
            fps: parse_int(&mut settings, "fps")?,
            camera_data_path: PathBuf::from(take(&mut settings, "camera_data_path")?),
            camera_intrinsics: parse_mat3(&mut settings, "camera_intrinsics")?,
            camera_distortion: DVec::from_vec(parse_floats(&mut settings, "camera_distortion")?),
            rgb_to_depth_transform: parse_mat4(&mut settings, "rgb_to_depth_transform")?,
            camera_transform: parse_mat4(&mut settings, "camera_transform")?,
            object_data_path: PathBuf::from(take(&mut settings, "object_data_path")?),
            object_transform: parse_mat4(&mut settings, "object_transform")?,
            object_dirichlet_boundary_conditions: parse_boxes(
                &mut settings,
                "object_dirichlet_boundary_conditions",
            )?,
            object_parameter_bounding_boxes: parse_boxes(
                &mut settings,
                "object_parameter_bounding_boxes",
            )?,
        })
    }

    fn serialize(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{HEADER}");
        let _ = writeln!(
            out,
            "experiment_out_path={}",
            self.experiment_out_path.display()
        );
        let _ = writeln!(out, "duration={}", self.duration);
        let _ = writeln!(out, "dt={}", self.dt);
        let _ = writeln!(out, "sub_steps={}", self.sub_steps);
        let _ = writeln!(out, "fps={}", self.fps);
        let _ = writeln!(out, "camera_data_path={}", self.camera_data_path.display());
        let _ = writeln!(
            out,
            "camera_intrinsics={}",
            float_list(self.camera_intrinsics.transpose().as_slice())
        );
        let _ = writeln!(
            out,
            "camera_distortion={}",
            float_list(self.camera_distortion.as_slice())
        );
        let _ = writeln!(
            out,
            "rgb_to_depth_transform={}",
            float_list(self.rgb_to_depth_transform.transpose().as_slice())
        );
        let _ = writeln!(
            out,
            "camera_transform={}",
            float_list(self.camera_transform.transpose().as_slice())
        );
        let _ = writeln!(out, "object_data_path={}", self.object_data_path.display());
        let _ = writeln!(
            out,
            "object_transform={}",
            float_list(self.object_transform.transpose().as_slice())
        );
        let _ = writeln!(
            out,
            "object_dirichlet_boundary_conditions={}",
            float_list(&flatten_boxes(&self.object_dirichlet_boundary_conditions))
        );
        let _ = writeln!(
            out,
            "object_parameter_bounding_boxes={}",
            float_list(&flatten_boxes(&self.object_parameter_bounding_boxes))
        );
        out
    }
}

fn take(settings: &mut HashMap<String, String>, key: &'static str) -> Result<String> {
    settings
        .remove(key)
        .ok_or(DescriptorError::MissingKey { key })
}

fn parse_float(settings: &mut HashMap<String, String>, key: &'static str) -> Result<f64> {
    let raw = take(settings, key)?;
    raw.parse().map_err(|_| DescriptorError::BadValue {
        key: key.to_string(),
        msg: format!("'{raw}' is not a float"),
    })
}

fn parse_int(settings: &mut HashMap<String, String>, key: &'static str) -> Result<usize> {
    let raw = take(settings, key)?;
    raw.parse().map_err(|_| DescriptorError::BadValue {
        key: key.to_string(),
        msg: format!("'{raw}' is not an integer"),
    })
}

/// Parse a bracketed comma-separated float list.
fn parse_floats(settings: &mut HashMap<String, String>, key: &'static str) -> Result<Vec<f64>> {
    let raw = take(settings, key)?;
    let inner = raw
        .strip_prefix('[')
        .and_then(|r| r.strip_suffix(']'))
        .ok_or_else(|| DescriptorError::BadValue {
            key: key.to_string(),
            msg: "expected a bracketed list".to_string(),
        })?;
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }
    inner
        .split(',')
        .map(|tok| {
            tok.trim().parse().map_err(|_| DescriptorError::BadValue {
                key: key.to_string(),
                msg: format!("'{}' is not a float", tok.trim()),
            })
        })
        .collect()
}

fn parse_mat3(settings: &mut HashMap<String, String>, key: &'static str) -> Result<Mat3> {
    let vals = parse_floats(settings, key)?;
    if vals.len() != 9 {
        return Err(DescriptorError::BadShape {
            key: key.to_string(),
            expected: "9 (3x3)".to_string(),
            got: vals.len(),
        });
    }
    Ok(Mat3::from_row_slice(&vals))
}

fn parse_mat4(settings: &mut HashMap<String, String>, key: &'static str) -> Result<Mat4> {
    let vals = parse_floats(settings, key)?;
    if vals.len() != 16 {
        return Err(DescriptorError::BadShape {
            key: key.to_string(),
            expected: "16 (4x4)".to_string(),
            got: vals.len(),
        });
    }
    Ok(Mat4::from_row_slice(&vals))
}

/// N boxes flattened as N * 3 axes * 2 bounds.
fn parse_boxes(
    settings: &mut HashMap<String, String>,
    key: &'static str,
) -> Result<Vec<[[f64; 2]; 3]>> {
    let vals = parse_floats(settings, key)?;
    if vals.len() % 6 != 0 {
        return Err(DescriptorError::BadShape {
            key: key.to_string(),
            expected: "a multiple of 6 (N x 3 x 2)".to_string(),
            got: vals.len(),
        });
    }
    Ok(vals
        .chunks_exact(6)
        .map(|c| [[c[0], c[1]], [c[2], c[3]], [c[4], c[5]]])
        .collect())
}

fn flatten_boxes(boxes: &[[[f64; 2]; 3]]) -> Vec<f64> {
    boxes
        .iter()
        .flat_map(|b| b.iter().flat_map(|axis| axis.iter().copied()))
        .collect()
}

fn float_list(vals: &[f64]) -> String {
    let body = vals
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    format!("[{body}]")
}
