//! Scripted moving-boundary motion.
//!
//! A handle region of the mesh is clamped (zero inverse mass) and driven
//! through a sequence of rigid keyframe poses interpolated between a
//! start and an end pose. The schedule is a pure function of the global
//! step index so that recomputing a checkpointed segment reproduces the
//! same trajectory bit for bit.

use elastid_math::{Aabb, Quat, Vec3};

/// Rigid start/end pose pair for the driven handle region.
#[derive(Debug, Clone)]
pub struct TwistConfig {
    /// Handle selection box, relative to the mean vertex position.
    pub bbox: Aabb,
    pub rotation_a: Quat,
    pub rotation_b: Quat,
    pub position_a: Vec3,
    pub position_b: Vec3,
    /// Number of intermediate poses between the two end poses.
    pub num_keyframes: usize,
    /// Fraction of the run over which the keyframes are spread.
    pub interpolation_duration: f64,
}

impl TwistConfig {
    pub fn new(
        bbox: Aabb,
        rotation_a: Quat,
        rotation_b: Quat,
        position_a: Vec3,
        position_b: Vec3,
        num_keyframes: usize,
    ) -> Self {
        Self {
            bbox,
            rotation_a,
            rotation_b,
            position_a,
            position_b,
            num_keyframes,
            interpolation_duration: 0.5,
        }
    }
}

/// Precomputed per-keyframe position deltas for the handle vertices.
#[derive(Debug, Clone)]
pub struct TwistSchedule {
    /// Indices of the driven vertices, ascending.
    masked: Vec<usize>,
    /// `deltas[k][m]` moves `masked[m]` from keyframe `k` to `k + 1`.
    deltas: Vec<Vec<Vec3>>,
    /// Steps between consecutive keyframe applications.
    cadence: usize,
}

impl TwistSchedule {
    /// Bake the keyframe deltas from the rest positions.
    pub fn new(config: &TwistConfig, rest_positions: &[Vec3], total_steps: usize) -> Self {
        let n = rest_positions.len();
        let mean = if n == 0 {
            Vec3::zeros()
        } else {
            rest_positions.iter().sum::<Vec3>() / n as f64
        };
        let masked: Vec<usize> = (0..n)
            .filter(|&i| config.bbox.contains_relative(&rest_positions[i], &mean))
            .collect();

        // Pivot: midpoint of the handle's bounds.
        let pivot = if masked.is_empty() {
            Vec3::zeros()
        } else {
            let mut lo = rest_positions[masked[0]];
            let mut hi = lo;
            for &i in &masked[1..] {
                lo = lo.inf(&rest_positions[i]);
                hi = hi.sup(&rest_positions[i]);
            }
            (lo + hi) / 2.0
        };

        let pose = |t: f64| -> (Quat, Vec3) {
            let r = Quat::slerp(&config.rotation_a, &config.rotation_b, t);
            let p = config.position_a + (config.position_b - config.position_a) * t;
            (r, p)
        };
        let keyframe = |t: f64| -> Vec<Vec3> {
            let (r, p) = pose(t);
            masked
                .iter()
                .map(|&i| r.rotate(&(rest_positions[i] - pivot)) + pivot + p)
                .collect()
        };

        let num = config.num_keyframes.max(1);
        let mut deltas = Vec::with_capacity(num);
        let mut prev = keyframe(0.0);
        for k in 1..=num {
            let next = keyframe(k as f64 / num as f64);
            deltas.push(
                next.iter()
                    .zip(&prev)
                    .map(|(a, b)| a - b)
                    .collect::<Vec<_>>(),
            );
            prev = next;
        }

        let window = (total_steps as f64 * config.interpolation_duration) as usize;
        let cadence = (window / num).max(1);

        Self {
            masked,
            deltas,
            cadence,
        }
    }

    /// Driven vertex indices; these must be clamped in the stepper.
    pub fn masked_vertices(&self) -> &[usize] {
        &self.masked
    }

    /// The delta applied after the step at global index `step`, if any.
    pub fn delta_at(&self, step: usize) -> Option<&[Vec3]> {
        if step % self.cadence != 0 {
            return None;
        }
        let k = step / self.cadence;
        self.deltas.get(k).map(|d| d.as_slice())
    }

    /// Add the scheduled delta for `step` onto the driven positions.
    pub fn apply(&self, step: usize, q: &mut [Vec3]) {
        if let Some(delta) = self.delta_at(step) {
            for (m, &vi) in self.masked.iter().enumerate() {
                q[vi] += delta[m];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn bar_positions() -> Vec<Vec3> {
        // A 2x2 column of vertices at z = 0 and a 2x2 column at z = 1.
        let mut q = Vec::new();
        for z in [0.0, 1.0] {
            for y in [0.0, 0.1] {
                for x in [0.0, 0.1] {
                    q.push(Vec3::new(x, y, z));
                }
            }
        }
        q
    }

    fn top_handle() -> TwistConfig {
        TwistConfig::new(
            Aabb::from_pairs([[-1.0, 1.0], [-1.0, 1.0], [0.4, 0.6]]),
            Quat::identity(),
            Quat::from_axis_angle(&Vec3::new(0.0, 0.0, 1.0), std::f64::consts::FRAC_PI_2),
            Vec3::zeros(),
            Vec3::zeros(),
            4,
        )
    }

    #[test]
    fn test_mask_selects_handle_region() {
        let q = bar_positions();
        let schedule = TwistSchedule::new(&top_handle(), &q, 100);
        // Mean z is 0.5, so the box [0.4, 0.6] relative to the mean
        // selects the z = 1 layer.
        assert_eq!(schedule.masked_vertices(), &[4, 5, 6, 7]);
    }

    #[test]
    fn test_deltas_compose_to_end_pose() {
        let q = bar_positions();
        let config = top_handle();
        let schedule = TwistSchedule::new(&config, &q, 100);

        // Summing all keyframe deltas lands each handle vertex on the
        // fully rotated end pose about the handle pivot.
        let pivot = Vec3::new(0.05, 0.05, 1.0);
        for (m, &vi) in schedule.masked.iter().enumerate() {
            let total: Vec3 = schedule.deltas.iter().map(|d| d[m]).sum();
            let end = config.rotation_b.rotate(&(q[vi] - pivot)) + pivot;
            assert_relative_eq!((q[vi] + total).x, end.x, epsilon = 1e-12);
            assert_relative_eq!((q[vi] + total).y, end.y, epsilon = 1e-12);
            assert_relative_eq!((q[vi] + total).z, end.z, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_cadence_spreads_keyframes_over_half_the_run() {
        let q = bar_positions();
        let schedule = TwistSchedule::new(&top_handle(), &q, 100);
        // 100 steps, duration 0.5, 4 keyframes: one application every
        // 12 steps, at steps 0, 12, 24, 36, then silence.
        assert_eq!(schedule.cadence, 12);
        let applied: Vec<usize> = (0..100).filter(|&s| schedule.delta_at(s).is_some()).collect();
        assert_eq!(applied, vec![0, 12, 24, 36]);
    }

    #[test]
    fn test_apply_moves_only_masked_vertices() {
        let rest = bar_positions();
        let schedule = TwistSchedule::new(&top_handle(), &rest, 100);
        let mut q = rest.clone();
        schedule.apply(0, &mut q);
        // First delta is a genuine rotation step, so the handle moves.
        assert_ne!(q[4], rest[4]);
        for i in 0..4 {
            assert_eq!(q[i], rest[i]);
        }
    }

    #[test]
    fn test_schedule_is_pure_in_the_step_index() {
        let rest = bar_positions();
        let schedule = TwistSchedule::new(&top_handle(), &rest, 100);
        let a: Vec<Vec3> = schedule.delta_at(24).unwrap().to_vec();
        let b: Vec<Vec3> = schedule.delta_at(24).unwrap().to_vec();
        assert_eq!(a, b);
    }
}
