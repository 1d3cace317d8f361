//! First-order minimizers over [`elastid_loss::Loss`] objectives.

pub mod minimize;
pub mod trace;

pub use minimize::{AdaptiveMomentum, Minimizer, Minimum, MomentumDescent, StopReason};
pub use trace::{FileTrace, MemoryTrace, NullTrace, ParameterDump, TraceRecord, TraceSink};

use elastid_loss::LossError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OptError {
    #[error(transparent)]
    Loss(#[from] LossError),

    #[error("trace IO error: {0}")]
    Trace(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, OptError>;
