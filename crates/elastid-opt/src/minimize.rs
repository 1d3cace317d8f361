//! Gradient-descent minimizers.

use elastid_loss::Loss;
use elastid_math::DVec;

use crate::trace::{NullTrace, TraceRecord, TraceSink};
use crate::Result;

/// Why a minimization run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The parameter update fell below `delta`.
    StepBelowDelta,
    /// The gradient norm fell below `eps`.
    GradientBelowEps,
    /// The iteration budget ran out.
    BudgetExhausted,
}

/// Result of a minimization run: the best evaluated point, not
/// necessarily the last one.
#[derive(Debug, Clone)]
pub struct Minimum {
    pub parameters: DVec,
    pub value: f64,
    pub iterations: usize,
    pub stop: StopReason,
}

pub trait Minimizer {
    fn minimize(&mut self, loss: &mut dyn Loss) -> Result<Minimum>;
}

/// Adam-style minimizer with an iteration-decayed first-moment
/// coefficient and a dual stopping rule.
///
/// The first moment accumulates as `m = g + beta_i * m` where `beta_i`
/// shrinks towards zero over the budget, fading momentum out as the run
/// approaches its end. Stops when either the parameter step or the
/// gradient norm falls under its threshold.
pub struct AdaptiveMomentum {
    pub num_iters: usize,
    pub lr: f64,
    pub betas: (f64, f64),
    /// Gradient-norm stopping threshold.
    pub eps: f64,
    /// Parameter-step stopping threshold.
    pub delta: f64,
    /// Print progress every N iterations; 0 disables.
    pub print_every: usize,
    pub trace: Box<dyn TraceSink>,
}

impl AdaptiveMomentum {
    pub fn new(num_iters: usize, lr: f64) -> Self {
        Self {
            num_iters,
            lr,
            betas: (0.9, 0.999),
            eps: 1e-16,
            delta: 1e-16,
            print_every: 0,
            trace: Box::new(NullTrace),
        }
    }

    pub fn with_trace(mut self, trace: Box<dyn TraceSink>) -> Self {
        self.trace = trace;
        self
    }

    fn beta_i(&self, i: usize) -> f64 {
        let (b1, _) = self.betas;
        let remaining = b1 * (1.0 - i as f64 / self.num_iters as f64);
        remaining / ((1.0 + b1) + remaining)
    }
}

/// Tracks the lowest evaluated value and where it occurred.
struct Best {
    parameters: DVec,
    value: f64,
}

impl Best {
    fn offer(&mut self, parameters: &DVec, value: f64) {
        if value < self.value {
            self.value = value;
            self.parameters = parameters.clone();
        }
    }
}

impl Minimizer for AdaptiveMomentum {
    fn minimize(&mut self, loss: &mut dyn Loss) -> Result<Minimum> {
        let mut current = loss.parameters();
        let n = current.len();
        let mut m = DVec::zeros(n);
        let mut v = DVec::zeros(n);
        let mut best = Best {
            parameters: current.clone(),
            value: f64::INFINITY,
        };

        let mut iterations = 0;
        let mut stop = StopReason::BudgetExhausted;
        for i in 1..=self.num_iters {
            iterations = i;
            let (value, grad) = loss.value_and_grad()?;
            best.offer(&current, value);

            let beta_i = self.beta_i(i);
            m = &grad + &m * beta_i;
            v = &v * self.betas.1 + grad.component_mul(&grad) * (1.0 - self.betas.1);
            let m_hat = &m / (1.0 - self.betas.0.powi(i as i32));
            let v_hat = &v / (1.0 - self.betas.1.powi(i as i32));
            let step = m_hat
                .zip_map(&v_hat, |mh, vh| mh / (vh + 1e-8).sqrt())
                * self.lr;
            let next = &current - &step;
            loss.set_parameters(&next)?;

            if self.print_every != 0 && i % self.print_every == 0 {
                println!("Iteration {}: loss = {:.6e}", i, value);
            }

            let step_norm = (&current - &next).norm();
            self.trace.record(&TraceRecord {
                iteration: i,
                value,
                grad_norm: grad.norm(),
                step_norm,
                parameters: next.clone(),
            })?;

            current = next;
            if step_norm < self.delta {
                stop = StopReason::StepBelowDelta;
                break;
            }
            if grad.norm() < self.eps {
                stop = StopReason::GradientBelowEps;
                break;
            }
        }

        Ok(Minimum {
            parameters: best.parameters,
            value: best.value,
            iterations,
            stop,
        })
    }
}

/// Plain momentum descent running its budget to the end.
pub struct MomentumDescent {
    pub num_iters: usize,
    pub lr: f64,
    pub beta: f64,
    /// Print progress every N iterations; 0 disables.
    pub print_every: usize,
    pub trace: Box<dyn TraceSink>,
}

impl MomentumDescent {
    pub fn new(num_iters: usize, lr: f64) -> Self {
        Self {
            num_iters,
            lr,
            beta: 0.9,
            print_every: 0,
            trace: Box::new(NullTrace),
        }
    }
}

impl Minimizer for MomentumDescent {
    fn minimize(&mut self, loss: &mut dyn Loss) -> Result<Minimum> {
        let mut current = loss.parameters();
        let mut m = DVec::zeros(current.len());
        let mut best = Best {
            parameters: current.clone(),
            value: f64::INFINITY,
        };

        for i in 1..=self.num_iters {
            let (value, grad) = loss.value_and_grad()?;
            best.offer(&current, value);

            m = &m * self.beta + &grad;
            let next = &current - &m * self.lr;
            loss.set_parameters(&next)?;
            if self.print_every != 0 && i % self.print_every == 0 {
                println!("Iteration {}: loss = {:.6e}", i, value);
            }
            self.trace.record(&TraceRecord {
                iteration: i,
                value,
                grad_norm: grad.norm(),
                step_norm: (&current - &next).norm(),
                parameters: next.clone(),
            })?;
            current = next;
        }

        Ok(Minimum {
            parameters: best.parameters,
            value: best.value,
            iterations: self.num_iters,
            stop: StopReason::BudgetExhausted,
        })
    }
}
