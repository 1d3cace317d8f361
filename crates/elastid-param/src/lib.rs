//! Material parameter model for the elastid estimation pipeline.
//!
//! Maps the flat optimizable-parameter vector `[density] ++ (mu, lambda,
//! damping) triples` to per-element physical properties, at either
//! per-material or per-element ("tetwise") granularity.

pub mod model;
pub mod perturb;

pub use model::{
    Distributed, Granularity, ParameterModel, MAT_MAX, MAT_MIN, NUM_PARAMS, POISSON_RATIO,
};
pub use perturb::PerturbProfile;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParamError {
    #[error("parameter list length {len} is not divisible by {divisor}")]
    BadLength { len: usize, divisor: usize },

    #[error("optimizable mask has length {len}, expected exactly 4")]
    BadMaskLength { len: usize },

    #[error("unknown perturbation profile '{name}', expected one of none/small/large")]
    UnknownProfile { name: String },

    #[error("parameter vector has length {got}, expected {expected}")]
    BadVectorLength { expected: usize, got: usize },

    #[error("distribution map refers to material {material}, but only {materials} exist")]
    BadDistribution { material: i32, materials: usize },
}

pub type Result<T> = std::result::Result<T, ParamError>;
