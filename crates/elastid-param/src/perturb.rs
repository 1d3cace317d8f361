//! Initial-value perturbation profiles.
//!
//! Before optimization the initial parameters are optionally perturbed by
//! a signed random percentage so runs do not start exactly at a known-good
//! value. Only dimensions flagged optimizable are touched.

use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::{ParamError, Result};

/// Named perturbation magnitude profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerturbProfile {
    /// No perturbation.
    None,
    /// ~15% ± 5%, random sign.
    Small,
    /// ~40% ± 5%, random sign.
    Large,
}

impl PerturbProfile {
    /// Parse one of the recognized profile names.
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "none" => Ok(Self::None),
            "small" => Ok(Self::Small),
            "large" => Ok(Self::Large),
            other => Err(ParamError::UnknownProfile {
                name: other.to_string(),
            }),
        }
    }

    /// Draw the signed relative perturbation factor for this profile.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> f64 {
        let mean = match self {
            Self::None => return 0.0,
            Self::Small => 15.0,
            Self::Large => 40.0,
        };
        let magnitude = Normal::new(mean, 5.0)
            .map(|n| n.sample(rng))
            .unwrap_or(mean);
        let sign = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
        sign * magnitude * 0.01
    }
}
