//! Checkpointed differentiable simulation for elastid.
//!
//! The physics integrator stays opaque behind the [`DiffStepper`] trait:
//! given a state and a time-step it produces the next state, and it can
//! pull a cotangent on its outputs back onto its inputs (state, per-element
//! materials, density). [`Simulator`] drives a stepper over many sub-steps
//! under gradient checkpointing, optionally overlaying a scripted
//! moving-boundary motion.

pub mod simulator;
pub mod state;
pub mod stepper;
pub mod twist;

pub use simulator::{segment_lengths, SimConfig, SimGrads, Simulator};
pub use state::State;
pub use stepper::{DiffStepper, EdgeSpringStepper};
pub use twist::{TwistConfig, TwistSchedule};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("material tensor has {got} rows, expected one per element ({expected})")]
    MaterialRows { got: usize, expected: usize },

    #[error("cotangent has {got} entries, expected one per vertex ({expected})")]
    CotangentLength { got: usize, expected: usize },

    #[error("gradient seed refers to frame {frame}, but only {frames} were advanced")]
    UnknownFrame { frame: usize, frames: usize },

    #[error("state has {got} vertices, expected {expected}")]
    StateLength { got: usize, expected: usize },
}

pub type Result<T> = std::result::Result<T, SimError>;
