//! The image-space data term plus spatial smoothness regularizer.

use std::cell::RefCell;
use std::rc::Rc;

use elastid_math::{DMat, DVec, Vec3};
use elastid_mesh::{ring_members, TWO_RING_SLOTS};
use elastid_param::{Granularity, ParameterModel, NUM_PARAMS};
use elastid_sim::{DiffStepper, Simulator};

use crate::image::Image;
use crate::observer::{Evaluation, LossObserver, NullObserver};
use crate::render::{DiffRenderer, TargetSource};
use crate::{Loss, LossError, Result};

/// How simulated frames relate to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimMode {
    /// Every frame is an independent run from the initial state.
    Static,
    /// Frames continue one trajectory; gradients flow across frames.
    Dynamic,
}

#[derive(Debug, Clone)]
pub struct ImageLossConfig {
    /// Weight on the per-frame image distance.
    pub data_weight: f64,
    /// Weight on the 2-ring smoothness term.
    pub reg_weight: f64,
    pub mode: SimMode,
}

impl Default for ImageLossConfig {
    fn default() -> Self {
        Self {
            data_weight: 1e3,
            reg_weight: 1e-1,
            mode: SimMode::Dynamic,
        }
    }
}

/// L2 distance between rendered and observed depth images, summed over
/// frames, plus a 2-ring smoothness regularizer on the stiffness field
/// when parameters are per-element.
pub struct ImageLoss<S: DiffStepper> {
    sim: Simulator<S>,
    renderer: Box<dyn DiffRenderer>,
    targets: Box<dyn TargetSource>,
    model: Rc<RefCell<ParameterModel>>,
    two_ring: Vec<[i32; TWO_RING_SLOTS]>,
    config: ImageLossConfig,
    observer: Box<dyn LossObserver>,
}

impl<S: DiffStepper> ImageLoss<S> {
    pub fn new(
        sim: Simulator<S>,
        renderer: Box<dyn DiffRenderer>,
        targets: Box<dyn TargetSource>,
        model: Rc<RefCell<ParameterModel>>,
        two_ring: Vec<[i32; TWO_RING_SLOTS]>,
        config: ImageLossConfig,
    ) -> Self {
        Self {
            sim,
            renderer,
            targets,
            model,
            two_ring,
            config,
            observer: Box::new(NullObserver),
        }
    }

    pub fn with_observer(mut self, observer: Box<dyn LossObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Data term for the current simulator state against the given
    /// frame's target, and the position cotangent seeding the backward
    /// pass. No seed when the images already match.
    fn frame_term(&mut self, frame: usize) -> Result<(f64, Option<Vec<Vec3>>)> {
        let q = self.sim.state().q.clone();
        let rendered = self.renderer.render(&q);
        let target = self.targets.target(frame)?;
        if !rendered.same_shape(&target) {
            return Err(LossError::ResolutionMismatch {
                got_w: rendered.width,
                got_h: rendered.height,
                want_w: target.width,
                want_h: target.height,
            });
        }
        let norm = rendered.l2_distance(&target);
        let term = self.config.data_weight * norm;
        if norm <= f64::EPSILON {
            return Ok((term, None));
        }
        // d‖r - t‖ / dr = (r - t) / ‖r - t‖
        let scale = self.config.data_weight / norm;
        let image_bar = Image {
            width: rendered.width,
            height: rendered.height,
            data: rendered
                .data
                .iter()
                .zip(&target.data)
                .map(|(r, t)| scale * (r - t))
                .collect(),
        };
        let q_bar = self.renderer.render_vjp(&q, &image_bar);
        Ok((term, Some(q_bar)))
    }

    /// 2-ring smoothness on the raw per-element stiffness column.
    ///
    /// Value is `w / M * ||mean_ring(mu) - mu||`; the gradient lands in
    /// `reg_bar`'s mu column. Works on the unclamped values so an element
    /// that drifted outside the physical range still feels the pull of
    /// its neighbors instead of going gradient-dead at the bound.
    fn regularizer(&self, values: &DMat, reg_bar: &mut DMat) -> f64 {
        let m = self.two_ring.len();
        if m == 0 {
            return 0.0;
        }
        let mut d = vec![0.0; m];
        let mut ring_sizes = vec![0usize; m];
        for i in 0..m {
            let members = ring_members(&self.two_ring[i]);
            ring_sizes[i] = members.len();
            if members.is_empty() {
                continue;
            }
            let mean =
                members.iter().map(|&j| values[(j, 0)]).sum::<f64>() / members.len() as f64;
            d[i] = mean - values[(i, 0)];
        }
        let norm = d.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm > f64::EPSILON {
            let scale = self.config.reg_weight / (m as f64 * norm);
            for i in 0..m {
                reg_bar[(i, 0)] -= scale * d[i];
                if ring_sizes[i] == 0 {
                    continue;
                }
                let w = scale * d[i] / ring_sizes[i] as f64;
                for j in ring_members(&self.two_ring[i]) {
                    reg_bar[(j, 0)] += w;
                }
            }
        }
        self.config.reg_weight * norm / m as f64
    }
}

impl<S: DiffStepper> Loss for ImageLoss<S> {
    fn parameters(&self) -> DVec {
        self.model.borrow().parameter_tensor()
    }

    fn set_parameters(&mut self, p: &DVec) -> Result<()> {
        self.model.borrow_mut().set_parameter_tensor(p)?;
        Ok(())
    }

    fn value_and_grad(&mut self) -> Result<(f64, DVec)> {
        let (dist, density, granularity) = {
            let m = self.model.borrow();
            (m.distribute(), m.density(), m.granularity())
        };
        let num_frames = self.targets.num_frames();
        let steps = self.sim.config().sim_steps;

        let mut data_term = 0.0;
        let mut dist_bar = DMat::zeros(dist.values.nrows(), NUM_PARAMS);
        let mut density_bar = 0.0;

        match self.config.mode {
            SimMode::Dynamic => {
                self.sim.reset();
                let mut seeds = Vec::new();
                for frame in 0..num_frames {
                    self.sim.advance(&dist.values, density, steps)?;
                    let (term, seed) = self.frame_term(frame)?;
                    data_term += term;
                    if let Some(seed) = seed {
                        seeds.push((frame, seed));
                    }
                }
                if !seeds.is_empty() {
                    let grads = self.sim.backward(&seeds)?;
                    dist_bar += &grads.material_bar;
                    density_bar += grads.density_bar;
                }
            }
            SimMode::Static => {
                for frame in 0..num_frames {
                    self.sim.reset();
                    self.sim.advance(&dist.values, density, steps)?;
                    let (term, seed) = self.frame_term(frame)?;
                    data_term += term;
                    if let Some(seed) = seed {
                        let grads = self.sim.backward(&[(0, seed)])?;
                        dist_bar += &grads.material_bar;
                        density_bar += grads.density_bar;
                    }
                }
            }
        }

        // The smoothness term sees the raw material tensor, not the
        // clamped one, so its cotangent skips the clamp mask.
        let (reg_term, reg_bar) = if granularity == Granularity::PerElement {
            let materials = self.model.borrow().material_tensor();
            let mut reg_bar = DMat::zeros(materials.nrows(), NUM_PARAMS);
            let term = self.regularizer(&materials, &mut reg_bar);
            (term, Some(reg_bar))
        } else {
            (0.0, None)
        };

        let (value, grad) = {
            let m = self.model.borrow();
            let mut material_bar = m.scatter_to_materials(&dist_bar, &dist.grad_mask);
            if let Some(reg_bar) = &reg_bar {
                material_bar += reg_bar;
            }
            (
                data_term + reg_term,
                m.parameter_gradient(&material_bar, density_bar),
            )
        };
        self.observer.record(&Evaluation {
            value,
            data_term,
            reg_term,
            mode_terms: None,
            grad_alignment: None,
        });
        Ok((value, grad))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::StoredTargets;
    use crate::MemoryObserver;
    use approx::assert_relative_eq;
    use elastid_math::GRAVITY;
    use elastid_mesh::TetMesh;
    use elastid_param::PerturbProfile;
    use elastid_sim::{EdgeSpringStepper, SimConfig, State};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// Pixel p is a fixed linear functional of the positions, so the
    /// renderer VJP is exact and the whole chain can be checked against
    /// finite differences.
    struct LinearRenderer {
        width: usize,
        height: usize,
        weights: Vec<Vec<f64>>,
        axis: Vec3,
    }

    impl LinearRenderer {
        fn new(width: usize, height: usize, num_vertices: usize) -> Self {
            let weights = (0..width * height)
                .map(|p| {
                    (0..num_vertices)
                        .map(|i| ((p * 31 + i * 17) % 7) as f64 * 0.1)
                        .collect()
                })
                .collect();
            Self {
                width,
                height,
                weights,
                axis: Vec3::new(0.2, 1.0, -0.4),
            }
        }
    }

    impl DiffRenderer for LinearRenderer {
        fn resolution(&self) -> (usize, usize) {
            (self.width, self.height)
        }

        fn render(&mut self, q: &[Vec3]) -> Image {
            let data = self
                .weights
                .iter()
                .map(|row| row.iter().zip(q).map(|(w, p)| w * p.dot(&self.axis)).sum())
                .collect();
            Image {
                width: self.width,
                height: self.height,
                data,
            }
        }

        fn render_vjp(&mut self, q: &[Vec3], image_bar: &Image) -> Vec<Vec3> {
            (0..q.len())
                .map(|i| {
                    let s: f64 = self
                        .weights
                        .iter()
                        .zip(&image_bar.data)
                        .map(|(row, b)| row[i] * b)
                        .sum();
                    self.axis * s
                })
                .collect()
        }
    }

    fn two_tet_mesh() -> TetMesh {
        let vertices = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(1.0, 1.0, 1.0),
        ];
        TetMesh::new(vertices, vec![[0, 1, 2, 3], [4, 1, 2, 3]], Vec::new()).unwrap()
    }

    fn model() -> Rc<RefCell<ParameterModel>> {
        let mut rng = StdRng::seed_from_u64(7);
        Rc::new(RefCell::new(
            ParameterModel::per_element(
                &[5e4, 2.45e6, 5.0],
                &[true, true, true, true],
                PerturbProfile::None,
                1080.0,
                2,
                &mut rng,
            )
            .unwrap(),
        ))
    }

    fn loss(
        mesh: &TetMesh,
        model: Rc<RefCell<ParameterModel>>,
        mode: SimMode,
        targets: Vec<Image>,
    ) -> ImageLoss<EdgeSpringStepper> {
        let dirichlet = [true, false, false, false, false];
        let stepper = EdgeSpringStepper::new(mesh, &dirichlet, Vec3::new(0.0, -GRAVITY, 0.0));
        // Start deformed and moving so every material axis has leverage
        // on the images from the first step.
        let mut initial = State::at_rest(mesh.vertices.clone());
        for i in 0..initial.len() {
            initial.q[i] += Vec3::new(0.01, -0.02, 0.005) * (i as f64 + 1.0);
            initial.v[i] = Vec3::new(0.1, 0.0, -0.05) * i as f64;
        }
        let sim = Simulator::new(
            stepper,
            SimConfig {
                dt: 1e-3,
                sim_steps: 3,
                ..SimConfig::default()
            },
            initial,
            None,
        )
        .unwrap();
        ImageLoss::new(
            sim,
            Box::new(LinearRenderer::new(3, 2, 5)),
            Box::new(StoredTargets::new(targets)),
            model,
            mesh.two_ring.clone(),
            ImageLossConfig {
                mode,
                ..ImageLossConfig::default()
            },
        )
    }

    fn flat_targets(frames: usize, value: f64) -> Vec<Image> {
        (0..frames)
            .map(|_| Image {
                width: 3,
                height: 2,
                data: vec![value; 6],
            })
            .collect()
    }

    #[test]
    fn test_gradient_matches_finite_differences() {
        let mesh = two_tet_mesh();
        let model = model();
        let mut loss = loss(&mesh, model, SimMode::Dynamic, flat_targets(2, 0.5));

        let p0 = loss.parameters();
        let (_, grad) = loss.value_and_grad().unwrap();

        // density, mu of element 0, damping of element 0, lambda of
        // element 1.
        for slot in [0usize, 1, 3, 5] {
            let eps = p0[slot].abs().max(1.0) * 1e-2;
            let mut plus = p0.clone();
            plus[slot] += eps;
            loss.set_parameters(&plus).unwrap();
            let vp = loss.value().unwrap();
            let mut minus = p0.clone();
            minus[slot] -= eps;
            loss.set_parameters(&minus).unwrap();
            let vm = loss.value().unwrap();
            loss.set_parameters(&p0).unwrap();
            let fd = (vp - vm) / (2.0 * eps);
            assert_relative_eq!(grad[slot], fd, epsilon = 1e-12, max_relative = 1e-3);
        }
    }

    #[test]
    fn test_static_and_dynamic_agree_on_one_frame() {
        let mesh = two_tet_mesh();
        let mut dynamic = loss(&mesh, model(), SimMode::Dynamic, flat_targets(1, 0.5));
        let mut fixed = loss(&mesh, model(), SimMode::Static, flat_targets(1, 0.5));

        let (vd, gd) = dynamic.value_and_grad().unwrap();
        let (vs, gs) = fixed.value_and_grad().unwrap();
        assert_relative_eq!(vd, vs, epsilon = 1e-12);
        for i in 0..gd.len() {
            assert_relative_eq!(gd[i], gs[i], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_regularizer_on_uneven_stiffness() {
        let mesh = two_tet_mesh();
        let model = model();
        // Zero renderer weights would complicate the data term; instead
        // make the target equal to the rendered image so only the
        // smoothness term remains.
        let mut probe = loss(&mesh, Rc::clone(&model), SimMode::Dynamic, flat_targets(1, 0.0));
        // Uneven stiffness: 6e4 vs 4e4.
        let p = DVec::from_vec(vec![1080.0, 6e4, 2.45e6, 5.0, 4e4, 2.45e6, 5.0]);
        probe.set_parameters(&p).unwrap();
        let rendered = {
            probe.sim.reset();
            let dist = model.borrow().distribute();
            probe.sim.advance(&dist.values, 1080.0, 3).unwrap();
            let q = probe.sim.state().q.clone();
            probe.renderer.render(&q)
        };
        let mut only_reg = loss(&mesh, Rc::clone(&model), SimMode::Dynamic, vec![rendered]);

        let (value, grad) = only_reg.value_and_grad().unwrap();
        // d = (mu_other - mu_self) for each element: (-2e4, 2e4).
        let norm = 2e4 * 2f64.sqrt();
        assert_relative_eq!(value, 0.1 * norm / 2.0, epsilon = 1e-9);
        assert_relative_eq!(grad[1], 0.1 / 2f64.sqrt(), epsilon = 1e-12);
        assert_relative_eq!(grad[4], -0.1 / 2f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_smoothness_pulls_stiffness_back_inside_bounds() {
        let mesh = two_tet_mesh();
        let model = model();
        let mut loss = loss(&mesh, model, SimMode::Dynamic, flat_targets(1, 0.5));
        // Element 0's stiffness has drifted below the physical lower
        // bound; its neighbor sits comfortably inside the range.
        let p = DVec::from_vec(vec![1080.0, 1.0, 2.45e6, 5.0, 6e4, 2.45e6, 5.0]);
        loss.set_parameters(&p).unwrap();

        let (value, grad) = loss.value_and_grad().unwrap();
        assert!(value > 0.0);
        // The clamp freezes the data-term gradient at the bound, but the
        // smoothness term still pulls the stray stiffness up towards its
        // neighbor.
        assert!(grad[1] < 0.0, "out-of-range stiffness gradient {}", grad[1]);
        assert_ne!(grad[4], 0.0);
    }

    #[test]
    fn test_non_optimizable_slots_get_zero_gradient() {
        let mesh = two_tet_mesh();
        let mut rng = StdRng::seed_from_u64(7);
        let model = Rc::new(RefCell::new(
            ParameterModel::per_element(
                &[5e4, 2.45e6, 5.0],
                &[false, true, false, false],
                PerturbProfile::None,
                1080.0,
                2,
                &mut rng,
            )
            .unwrap(),
        ));
        let mut loss = loss(&mesh, model, SimMode::Dynamic, flat_targets(1, 0.5));
        let (_, grad) = loss.value_and_grad().unwrap();
        // Only the mu slots may be non-zero.
        assert_eq!(grad[0], 0.0);
        for slot in [2, 3, 5, 6] {
            assert_eq!(grad[slot], 0.0);
        }
        assert_ne!(grad[1], 0.0);
    }

    #[test]
    fn test_resolution_mismatch_is_an_error() {
        let mesh = two_tet_mesh();
        let bad = vec![Image::zeros(2, 2)];
        let mut loss = loss(&mesh, model(), SimMode::Dynamic, bad);
        assert!(matches!(
            loss.value_and_grad(),
            Err(LossError::ResolutionMismatch { .. })
        ));
    }

    #[test]
    fn test_observer_sees_terms() {
        let mesh = two_tet_mesh();
        let observer = Rc::new(RefCell::new(MemoryObserver::default()));
        let mut loss = loss(&mesh, model(), SimMode::Dynamic, flat_targets(2, 0.5))
            .with_observer(Box::new(Rc::clone(&observer)));
        let (value, _) = loss.value_and_grad().unwrap();
        let seen = observer.borrow();
        assert_eq!(seen.evaluations.len(), 1);
        assert_relative_eq!(
            seen.evaluations[0].data_term + seen.evaluations[0].reg_term,
            value,
            epsilon = 1e-12
        );
    }
}
