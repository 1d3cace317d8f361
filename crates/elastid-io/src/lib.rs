//! Experiment descriptor (`.exp`) files.
//!
//! A descriptor bundles everything one estimation run needs to find its
//! inputs: timing, camera calibration, mesh location, and the boxes
//! selecting Dirichlet regions and material partitions. The format is a
//! fixed header line followed by `key=value` pairs, with array values
//! written as bracketed comma-separated floats.

pub mod descriptor;

pub use descriptor::ExperimentDescriptor;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("descriptor file {} does not have the .exp extension", .0.display())]
    BadExtension(PathBuf),

    #[error("bad descriptor header: expected 'EXPERIMENT SETTINGS', found '{found}'")]
    BadHeader { found: String },

    #[error("descriptor line {line} has no '=' separator")]
    BadLine { line: usize },

    #[error("descriptor is missing key '{key}'")]
    MissingKey { key: &'static str },

    #[error("bad value for '{key}': {msg}")]
    BadValue { key: String, msg: String },

    #[error("'{key}' has {got} values, expected {expected}")]
    BadShape {
        key: String,
        expected: String,
        got: usize,
    },
}

pub type Result<T> = std::result::Result<T, DescriptorError>;
