//! Tetrahedral mesh loading and topology analysis for elastid.
//!
//! `TetMesh` is the static description of the deformable object: vertex
//! positions, tetrahedral elements, and the derived adjacency tables that
//! drive spatial regularization and material partitioning.

pub mod mesh;
pub mod partition;
pub mod topology;

pub use mesh::TetMesh;
pub use topology::{compute_neighbors, compute_two_ring, ring_members, SENTINEL, TWO_RING_SLOTS};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MeshError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error at line {line}: {msg}")]
    Parse { line: usize, msg: String },

    #[error("tetrahedron {index} is invalid: {reason}")]
    InvalidTet { index: usize, reason: String },

    #[error("surface vertex {index} has no matching volume vertex")]
    UnmatchedSurfaceVertex { index: usize },
}

pub type Result<T> = std::result::Result<T, MeshError>;
