//! Convex blend of two objectives over the same parameters.

use elastid_math::DVec;

use crate::observer::{Evaluation, LossObserver, NullObserver};
use crate::{Loss, Result};

/// `alpha * primary + (1 - alpha) * secondary`.
///
/// Both sides usually share one parameter model and differ in target
/// feed or simulation mode. The cosine similarity of the two gradients
/// is reported to the observer as a diagnostic of how much the modes
/// agree on the descent direction.
pub struct TwoModeLoss {
    primary: Box<dyn Loss>,
    secondary: Box<dyn Loss>,
    alpha: f64,
    observer: Box<dyn LossObserver>,
}

impl TwoModeLoss {
    pub fn new(primary: Box<dyn Loss>, secondary: Box<dyn Loss>, alpha: f64) -> Self {
        Self {
            primary,
            secondary,
            alpha,
            observer: Box::new(NullObserver),
        }
    }

    pub fn with_observer(mut self, observer: Box<dyn LossObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }
}

fn cosine_similarity(a: &DVec, b: &DVec) -> Option<f64> {
    let na = a.norm();
    let nb = b.norm();
    if na <= f64::EPSILON || nb <= f64::EPSILON {
        return None;
    }
    Some(a.dot(b) / (na * nb))
}

impl Loss for TwoModeLoss {
    fn parameters(&self) -> DVec {
        self.primary.parameters()
    }

    fn set_parameters(&mut self, p: &DVec) -> Result<()> {
        self.primary.set_parameters(p)?;
        self.secondary.set_parameters(p)
    }

    fn value_and_grad(&mut self) -> Result<(f64, DVec)> {
        let (va, ga) = self.primary.value_and_grad()?;
        let (vb, gb) = self.secondary.value_and_grad()?;
        let value = self.alpha * va + (1.0 - self.alpha) * vb;
        let grad = &ga * self.alpha + &gb * (1.0 - self.alpha);
        self.observer.record(&Evaluation {
            value,
            data_term: 0.0,
            reg_term: 0.0,
            mode_terms: Some((self.alpha * va, (1.0 - self.alpha) * vb)),
            grad_alignment: cosine_similarity(&ga, &gb),
        });
        Ok((value, grad))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::MemoryObserver;
    use approx::assert_relative_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// `value = scale * ||p||^2`, gradient `2 * scale * p`.
    struct Quadratic {
        p: DVec,
        scale: f64,
    }

    impl Loss for Quadratic {
        fn parameters(&self) -> DVec {
            self.p.clone()
        }

        fn set_parameters(&mut self, p: &DVec) -> Result<()> {
            self.p = p.clone();
            Ok(())
        }

        fn value_and_grad(&mut self) -> Result<(f64, DVec)> {
            Ok((self.scale * self.p.norm_squared(), &self.p * (2.0 * self.scale)))
        }
    }

    fn quadratic(scale: f64) -> Box<dyn Loss> {
        Box::new(Quadratic {
            p: DVec::from_vec(vec![1.0, -2.0]),
            scale,
        })
    }

    #[test]
    fn test_blend_weights_both_sides() {
        let mut loss = TwoModeLoss::new(quadratic(1.0), quadratic(3.0), 0.25);
        let (value, grad) = loss.value_and_grad().unwrap();
        // ||p||^2 = 5: 0.25 * 5 + 0.75 * 15 = 12.5.
        assert_relative_eq!(value, 12.5, epsilon = 1e-12);
        // 0.25 * 2p + 0.75 * 6p = 5p.
        assert_relative_eq!(grad[0], 5.0, epsilon = 1e-12);
        assert_relative_eq!(grad[1], -10.0, epsilon = 1e-12);
    }

    #[test]
    fn test_set_parameters_reaches_both_sides() {
        let mut loss = TwoModeLoss::new(quadratic(1.0), quadratic(1.0), 0.0);
        loss.set_parameters(&DVec::zeros(2)).unwrap();
        let (value, _) = loss.value_and_grad().unwrap();
        assert_relative_eq!(value, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_mode_terms_report_weighted_contributions() {
        let observer = Rc::new(RefCell::new(MemoryObserver::default()));
        let mut loss = TwoModeLoss::new(quadratic(1.0), quadratic(3.0), 0.25)
            .with_observer(Box::new(Rc::clone(&observer)));
        let (value, _) = loss.value_and_grad().unwrap();
        let seen = observer.borrow();
        let (primary, secondary) = seen.evaluations[0].mode_terms.unwrap();
        assert_relative_eq!(primary, 0.25 * 5.0, epsilon = 1e-12);
        assert_relative_eq!(secondary, 0.75 * 15.0, epsilon = 1e-12);
        assert_relative_eq!(primary + secondary, value, epsilon = 1e-12);
        // The image-term fields stay untouched.
        assert_eq!(seen.evaluations[0].data_term, 0.0);
        assert_eq!(seen.evaluations[0].reg_term, 0.0);
    }

    #[test]
    fn test_alignment_of_parallel_gradients() {
        let observer = Rc::new(RefCell::new(MemoryObserver::default()));
        let mut loss = TwoModeLoss::new(quadratic(1.0), quadratic(2.0), 0.5)
            .with_observer(Box::new(Rc::clone(&observer)));
        loss.value_and_grad().unwrap();
        let seen = observer.borrow();
        assert_relative_eq!(
            seen.evaluations[0].grad_alignment.unwrap(),
            1.0,
            epsilon = 1e-12
        );
    }
}
