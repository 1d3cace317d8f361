//! Image-space objectives over rendered simulation states.
//!
//! The loss side of the pipeline: simulate under the current parameters,
//! render depth images at frame boundaries, compare against observed
//! targets, and pull the resulting cotangents back through renderer and
//! simulator onto the flat parameter vector. Renderer and target feed
//! stay behind traits so the objective is independent of any concrete
//! camera or capture format.

pub mod image;
pub mod image_loss;
pub mod observer;
pub mod render;
pub mod two_mode;

pub use image::Image;
pub use image_loss::{ImageLoss, ImageLossConfig, SimMode};
pub use observer::{Evaluation, LossObserver, MemoryObserver, NullObserver};
pub use render::{DiffRenderer, StoredTargets, TargetSource};
pub use two_mode::TwoModeLoss;

use elastid_math::DVec;
use elastid_param::ParamError;
use elastid_sim::SimError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LossError {
    #[error(transparent)]
    Sim(#[from] SimError),

    #[error(transparent)]
    Param(#[from] ParamError),

    #[error("rendered image is {got_w}x{got_h}, target is {want_w}x{want_h}")]
    ResolutionMismatch {
        got_w: usize,
        got_h: usize,
        want_w: usize,
        want_h: usize,
    },

    #[error("no target image for frame {frame}")]
    MissingTarget { frame: usize },
}

pub type Result<T> = std::result::Result<T, LossError>;

/// A differentiable scalar objective over a flat parameter vector.
///
/// The parameter layout is `[density, mu, lambda, damping, ...]` per
/// material, matching `ParameterModel::parameter_tensor`.
pub trait Loss {
    /// Current parameter vector.
    fn parameters(&self) -> DVec;

    /// Write an updated parameter vector back into the shared model.
    fn set_parameters(&mut self, p: &DVec) -> Result<()>;

    /// Evaluate the loss and its gradient at the current parameters.
    fn value_and_grad(&mut self) -> Result<(f64, DVec)>;

    /// Evaluate the loss only.
    fn value(&mut self) -> Result<f64> {
        self.value_and_grad().map(|(v, _)| v)
    }
}
