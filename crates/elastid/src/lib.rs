//! elastid — material parameter estimation for deformable objects.
//!
//! Estimates stiffness, damping, and density of a tetrahedral object by
//! descending an image-space loss: simulate the object under the current
//! parameters, render depth images, compare against captured targets,
//! and pull gradients back through renderer and simulator onto the
//! parameters.
//!
//! This umbrella crate re-exports the sub-crates and provides the
//! [`Experiment`] composition layer that wires them together from a
//! descriptor file.

pub use elastid_io::{self, DescriptorError, ExperimentDescriptor};
pub use elastid_loss::{
    self, DiffRenderer, Image, ImageLoss, ImageLossConfig, Loss, LossError, SimMode, StoredTargets,
    TargetSource, TwoModeLoss,
};
pub use elastid_math::{self, Aabb, Quat, Vec3, GRAVITY};
pub use elastid_mesh::{self, MeshError, TetMesh};
pub use elastid_opt::{self, AdaptiveMomentum, Minimizer, Minimum, OptError, StopReason};
pub use elastid_param::{self, Granularity, ParamError, ParameterModel, PerturbProfile};
pub use elastid_sim::{
    self, EdgeSpringStepper, SimConfig, SimError, Simulator, State, TwistConfig, TwistSchedule,
};

pub mod experiment;

pub use experiment::{Experiment, ExperimentConfig, Scenario, TwistSettings};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Mesh(#[from] MeshError),

    #[error(transparent)]
    Param(#[from] ParamError),

    #[error(transparent)]
    Sim(#[from] SimError),

    #[error(transparent)]
    Loss(#[from] LossError),

    #[error(transparent)]
    Opt(#[from] OptError),

    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    #[error("bad experiment config: {0}")]
    Config(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
