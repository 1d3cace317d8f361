//! The parameter model: flat vector ⇄ per-element material properties.

use elastid_math::{DMat, DVec};
use elastid_mesh::SENTINEL;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::perturb::PerturbProfile;
use crate::{ParamError, Result};

/// Entries per material triple: (mu, lambda, damping).
pub const NUM_PARAMS: usize = 3;

/// Fixed Poisson ratio used when only one of {mu, lambda} is optimized.
pub const POISSON_RATIO: f64 = 0.49;

/// Lower physical bounds for (mu, lambda, damping).
pub const MAT_MIN: [f64; NUM_PARAMS] = [5.0, 1e4, 0.5];

/// Upper physical bounds for (mu, lambda, damping).
pub const MAT_MAX: [f64; NUM_PARAMS] = [25e4, 1e8, 100.0];

/// Material-parameter granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    /// One triple per user-defined spatial partition.
    PerMaterial,
    /// One independently optimizable triple per element ("tetwise").
    PerElement,
}

/// Per-element material values after distribution and clamping, together
/// with the clamp gradient mask (0 where a component sat at a bound or the
/// element is unassigned).
#[derive(Debug, Clone)]
pub struct Distributed {
    /// (elements × 3) clamped values.
    pub values: DMat,
    /// (elements × 3) multiplier applied to cotangents flowing back
    /// through the clamp.
    pub grad_mask: DMat,
}

/// The shared, mutable parameter state of one estimation run.
///
/// The minimizer writes the parameter vector back once per iteration; the
/// simulator and loss read derived tensors. Derived quantities are
/// recomputed on access rather than cached, so a set can never leave a
/// stale view behind.
#[derive(Debug, Clone)]
pub struct ParameterModel {
    granularity: Granularity,
    density: f64,
    initial_density: f64,
    /// (materials × 3) raw optimizable block.
    parameters: DMat,
    /// [density, mu, lambda, damping] optimizability.
    optimizable: [bool; 4],
    /// Element index → material index, sentinel for unassigned.
    distribution: Vec<i32>,
}

impl ParameterModel {
    /// Per-material model over an explicit element → material map.
    ///
    /// The number of materials is `initial.len() / 3`; `distribution` may
    /// leave elements at the sentinel (they receive no material and are
    /// excluded from regularization).
    pub fn per_material<R: Rng>(
        initial: &[f64],
        optimizable: &[bool],
        profile: PerturbProfile,
        initial_density: f64,
        distribution: Vec<i32>,
        rng: &mut R,
    ) -> Result<Self> {
        let mask = Self::validate(initial, optimizable)?;
        let num_materials = initial.len() / NUM_PARAMS;
        for &m in &distribution {
            if m != SENTINEL && m as usize >= num_materials {
                return Err(ParamError::BadDistribution {
                    material: m,
                    materials: num_materials,
                });
            }
        }
        let parameters = Self::perturbed(initial, num_materials, mask, profile, rng);
        Ok(Self {
            granularity: Granularity::PerMaterial,
            density: initial_density,
            initial_density,
            parameters,
            optimizable: mask,
            distribution,
        })
    }

    /// Per-element ("tetwise") model: the first triple of `initial` is
    /// broadcast to every element and the distribution map is the
    /// identity. Gradients are what subsequently differentiate elements
    /// from each other.
    pub fn per_element<R: Rng>(
        initial: &[f64],
        optimizable: &[bool],
        profile: PerturbProfile,
        initial_density: f64,
        num_elements: usize,
        rng: &mut R,
    ) -> Result<Self> {
        let mask = Self::validate(initial, optimizable)?;
        let triple = &initial[..NUM_PARAMS];
        let broadcast: Vec<f64> = triple
            .iter()
            .cycle()
            .take(NUM_PARAMS * num_elements)
            .copied()
            .collect();
        let parameters = Self::perturbed(&broadcast, num_elements, mask, profile, rng);
        Ok(Self {
            granularity: Granularity::PerElement,
            density: initial_density,
            initial_density,
            parameters,
            optimizable: mask,
            distribution: (0..num_elements as i32).collect(),
        })
    }

    fn validate(initial: &[f64], optimizable: &[bool]) -> Result<[bool; 4]> {
        if initial.is_empty() || initial.len() % NUM_PARAMS != 0 {
            return Err(ParamError::BadLength {
                len: initial.len(),
                divisor: NUM_PARAMS,
            });
        }
        if optimizable.len() != 4 {
            return Err(ParamError::BadMaskLength {
                len: optimizable.len(),
            });
        }
        Ok([
            optimizable[0],
            optimizable[1],
            optimizable[2],
            optimizable[3],
        ])
    }

    /// One signed relative factor is drawn per construction and applied to
    /// every optimizable material dimension.
    fn perturbed<R: Rng>(
        initial: &[f64],
        rows: usize,
        optimizable: [bool; 4],
        profile: PerturbProfile,
        rng: &mut R,
    ) -> DMat {
        let factor = profile.sample(rng);
        DMat::from_fn(rows, NUM_PARAMS, |m, k| {
            let base = initial[m * NUM_PARAMS + k];
            if optimizable[1 + k] {
                base * (1.0 + factor)
            } else {
                base
            }
        })
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn num_materials(&self) -> usize {
        self.parameters.nrows()
    }

    pub fn num_elements(&self) -> usize {
        self.distribution.len()
    }

    pub fn optimizable(&self) -> [bool; 4] {
        self.optimizable
    }

    pub fn density(&self) -> f64 {
        self.density
    }

    pub fn initial_density(&self) -> f64 {
        self.initial_density
    }

    pub fn distribution(&self) -> &[i32] {
        &self.distribution
    }

    fn only_mu(&self) -> bool {
        self.optimizable[1] && !self.optimizable[2]
    }

    fn only_lambda(&self) -> bool {
        self.optimizable[2] && !self.optimizable[1]
    }

    /// Derive lambda from mu through the fixed-Poisson linear-elastic
    /// relation.
    pub fn lambda_from_mu(mu: f64) -> f64 {
        2.0 * mu * POISSON_RATIO / (1.0 - 2.0 * POISSON_RATIO)
    }

    /// Inverse of [`Self::lambda_from_mu`].
    pub fn mu_from_lambda(lambda: f64) -> f64 {
        lambda * (1.0 - 2.0 * POISSON_RATIO) / (2.0 * POISSON_RATIO)
    }

    /// The (materials × 3) material tensor.
    ///
    /// When exactly one of {mu, lambda} is optimizable the other is
    /// derived from it, keeping the material physically consistent under
    /// single-axis optimization. Otherwise both are taken verbatim.
    pub fn material_tensor(&self) -> DMat {
        DMat::from_fn(self.num_materials(), NUM_PARAMS, |m, k| {
            if k == 1 && self.only_mu() {
                Self::lambda_from_mu(self.parameters[(m, 0)])
            } else if k == 0 && self.only_lambda() {
                Self::mu_from_lambda(self.parameters[(m, 1)])
            } else {
                self.parameters[(m, k)]
            }
        })
    }

    /// Expand the material tensor to per-element triples, clamping every
    /// component into its physical range. The clamp keeps the simulation
    /// numerically stable; its subgradient at a bound is zero, recorded in
    /// the returned mask.
    pub fn distribute(&self) -> Distributed {
        let materials = self.material_tensor();
        let n = self.num_elements();
        let mut values = DMat::zeros(n, NUM_PARAMS);
        let mut grad_mask = DMat::zeros(n, NUM_PARAMS);
        for (e, &m) in self.distribution.iter().enumerate() {
            if m == SENTINEL {
                continue;
            }
            for k in 0..NUM_PARAMS {
                let raw = materials[(m as usize, k)];
                values[(e, k)] = raw.clamp(MAT_MIN[k], MAT_MAX[k]);
                if raw > MAT_MIN[k] && raw < MAT_MAX[k] {
                    grad_mask[(e, k)] = 1.0;
                }
            }
        }
        Distributed { values, grad_mask }
    }

    /// The flat parameter vector `[density] ++ flattened triples`.
    pub fn parameter_tensor(&self) -> DVec {
        let mut t = DVec::zeros(1 + self.num_materials() * NUM_PARAMS);
        t[0] = self.density;
        for m in 0..self.num_materials() {
            for k in 0..NUM_PARAMS {
                t[1 + m * NUM_PARAMS + k] = self.parameters[(m, k)];
            }
        }
        t
    }

    /// Rebind density and the raw parameter block from a flat vector.
    pub fn set_parameter_tensor(&mut self, t: &DVec) -> Result<()> {
        let expected = 1 + self.num_materials() * NUM_PARAMS;
        if t.len() != expected {
            return Err(ParamError::BadVectorLength {
                expected,
                got: t.len(),
            });
        }
        self.density = t[0];
        for m in 0..self.num_materials() {
            for k in 0..NUM_PARAMS {
                self.parameters[(m, k)] = t[1 + m * NUM_PARAMS + k];
            }
        }
        Ok(())
    }

    /// Pull a per-element cotangent back onto the material tensor:
    /// clamp mask, then scatter-add over the distribution map.
    pub fn scatter_to_materials(&self, dist_bar: &DMat, grad_mask: &DMat) -> DMat {
        let mut material_bar = DMat::zeros(self.num_materials(), NUM_PARAMS);
        for (e, &m) in self.distribution.iter().enumerate() {
            if m == SENTINEL {
                continue;
            }
            for k in 0..NUM_PARAMS {
                material_bar[(m as usize, k)] += dist_bar[(e, k)] * grad_mask[(e, k)];
            }
        }
        material_bar
    }

    /// Assemble the parameter-vector-shaped gradient from a material
    /// cotangent and a density cotangent, masking non-optimizable
    /// dimensions to zero.
    pub fn parameter_gradient(&self, material_bar: &DMat, density_bar: f64) -> DVec {
        let mut g = DVec::zeros(1 + self.num_materials() * NUM_PARAMS);
        if self.optimizable[0] {
            g[0] = density_bar;
        }
        for m in 0..self.num_materials() {
            for k in 0..NUM_PARAMS {
                if self.optimizable[1 + k] {
                    g[1 + m * NUM_PARAMS + k] = material_bar[(m, k)];
                }
            }
        }
        g
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(0)
    }

    fn model(optimizable: &[bool]) -> ParameterModel {
        ParameterModel::per_material(
            &[5e4, 2.5e6, 5.0],
            optimizable,
            PerturbProfile::None,
            1080.0,
            vec![0, 0],
            &mut rng(),
        )
        .unwrap()
    }

    #[test]
    fn test_no_perturbation_exposes_raw_block() {
        let m = model(&[false, true, true, false]);
        let mat = m.material_tensor();
        assert_eq!(mat[(0, 0)], 5e4);
        assert_eq!(mat[(0, 1)], 2.5e6);
        assert_eq!(mat[(0, 2)], 5.0);
    }

    #[test]
    fn test_only_mu_derives_lambda() {
        let m = model(&[false, true, false, false]);
        let mat = m.material_tensor();
        assert_eq!(mat[(0, 0)], 5e4);
        assert_relative_eq!(mat[(0, 1)], 49.0 * 5e4, epsilon = 1e-6);
        assert_eq!(mat[(0, 2)], 5.0);
    }

    #[test]
    fn test_single_axis_derivation_round_trip() {
        for mu in [5e4, 1.3e5, 7.7e2] {
            let lambda = ParameterModel::lambda_from_mu(mu);
            assert_relative_eq!(ParameterModel::mu_from_lambda(lambda), mu, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_parameter_tensor_round_trip() {
        let mut m = model(&[false, true, false, false]);
        let v = DVec::from_vec(vec![1200.0, 1e4, 3e6, 7.0]);
        m.set_parameter_tensor(&v).unwrap();
        assert_eq!(m.parameter_tensor(), v);
        assert_eq!(m.density(), 1200.0);
    }

    #[test]
    fn test_set_parameter_tensor_wrong_length() {
        let mut m = model(&[false, true, false, false]);
        let err = m
            .set_parameter_tensor(&DVec::from_vec(vec![1.0, 2.0]))
            .unwrap_err();
        assert!(matches!(
            err,
            ParamError::BadVectorLength {
                expected: 4,
                got: 2
            }
        ));
    }

    #[test]
    fn test_distribute_clamps_and_masks() {
        let mut m = model(&[false, true, true, true]);
        // mu below its lower bound, damping above its upper bound.
        m.set_parameter_tensor(&DVec::from_vec(vec![1080.0, 1.0, 2.5e6, 500.0]))
            .unwrap();
        let d = m.distribute();
        assert_eq!(d.values[(0, 0)], MAT_MIN[0]);
        assert_eq!(d.values[(0, 2)], MAT_MAX[2]);
        assert_eq!(d.grad_mask[(0, 0)], 0.0);
        assert_eq!(d.grad_mask[(0, 1)], 1.0);
        assert_eq!(d.grad_mask[(0, 2)], 0.0);
    }

    #[test]
    fn test_clamping_is_idempotent() {
        let mut m = model(&[false, true, true, true]);
        m.set_parameter_tensor(&DVec::from_vec(vec![1080.0, 1.0, 2.5e6, 500.0]))
            .unwrap();
        let once = m.distribute();
        let clamped_again = DMat::from_fn(once.values.nrows(), NUM_PARAMS, |e, k| {
            once.values[(e, k)].clamp(MAT_MIN[k], MAT_MAX[k])
        });
        assert_eq!(once.values, clamped_again);
    }

    #[test]
    fn test_unassigned_elements_stay_zero() {
        let m = ParameterModel::per_material(
            &[5e4, 2.5e6, 5.0],
            &[false, true, true, false],
            PerturbProfile::None,
            1080.0,
            vec![0, -1],
            &mut rng(),
        )
        .unwrap();
        let d = m.distribute();
        assert_eq!(d.values.row(1).iter().copied().sum::<f64>(), 0.0);
        assert_eq!(d.grad_mask.row(1).iter().copied().sum::<f64>(), 0.0);
    }

    #[test]
    fn test_per_element_broadcast() {
        let m = ParameterModel::per_element(
            &[6e4, 2.5e6, 5.0],
            &[false, true, false, false],
            PerturbProfile::None,
            1080.0,
            5,
            &mut rng(),
        )
        .unwrap();
        assert_eq!(m.num_materials(), 5);
        assert_eq!(m.distribution(), &[0, 1, 2, 3, 4]);
        let mat = m.material_tensor();
        for e in 0..5 {
            assert_eq!(mat[(e, 0)], 6e4);
            assert_eq!(mat[(e, 2)], 5.0);
        }
    }

    #[test]
    fn test_perturbation_touches_only_optimizable_dims() {
        let m = ParameterModel::per_material(
            &[5e4, 2.5e6, 5.0],
            &[false, true, false, false],
            PerturbProfile::Large,
            1080.0,
            vec![0],
            &mut rng(),
        )
        .unwrap();
        let t = m.parameter_tensor();
        assert_ne!(t[1], 5e4);
        assert_eq!(t[2], 2.5e6);
        assert_eq!(t[3], 5.0);
        // Large profile lands around ±40%.
        let rel = (t[1] - 5e4).abs() / 5e4;
        assert!(rel > 0.2 && rel < 0.6, "relative perturbation {rel}");
    }

    #[test]
    fn test_validation_errors() {
        let mut r = rng();
        let err = ParameterModel::per_material(
            &[1.0, 2.0],
            &[false, true, false, false],
            PerturbProfile::None,
            1080.0,
            vec![],
            &mut r,
        )
        .unwrap_err();
        assert!(matches!(err, ParamError::BadLength { len: 2, .. }));

        let err = ParameterModel::per_material(
            &[1.0, 2.0, 3.0],
            &[true, false],
            PerturbProfile::None,
            1080.0,
            vec![],
            &mut r,
        )
        .unwrap_err();
        assert!(matches!(err, ParamError::BadMaskLength { len: 2 }));

        let err = ParameterModel::per_material(
            &[1.0, 2.0, 3.0],
            &[false, true, false, false],
            PerturbProfile::None,
            1080.0,
            vec![3],
            &mut r,
        )
        .unwrap_err();
        assert!(matches!(err, ParamError::BadDistribution { material: 3, .. }));
    }

    #[test]
    fn test_scatter_adjoint_counts() {
        // Two elements mapped to the same material: cotangents sum.
        let m = ParameterModel::per_material(
            &[5e4, 2.5e6, 5.0],
            &[false, true, true, true],
            PerturbProfile::None,
            1080.0,
            vec![0, 0],
            &mut rng(),
        )
        .unwrap();
        let dist_bar = DMat::repeat(2, NUM_PARAMS, 1.0);
        let mask = DMat::repeat(2, NUM_PARAMS, 1.0);
        let mat_bar = m.scatter_to_materials(&dist_bar, &mask);
        for k in 0..NUM_PARAMS {
            assert_eq!(mat_bar[(0, k)], 2.0);
        }
    }

    #[test]
    fn test_parameter_gradient_masks() {
        let m = model(&[false, true, false, false]);
        let material_bar = DMat::repeat(1, NUM_PARAMS, 3.0);
        let g = m.parameter_gradient(&material_bar, 9.0);
        assert_eq!(g[0], 0.0); // density not optimizable
        assert_eq!(g[1], 3.0);
        assert_eq!(g[2], 0.0);
        assert_eq!(g[3], 0.0);
    }
}
