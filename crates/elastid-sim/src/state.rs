//! Simulation state: a vertex position/velocity snapshot.

use elastid_math::Vec3;

/// The state threaded through repeated stepper calls.
///
/// Owned exclusively by one [`crate::Simulator`] for the duration of a run.
#[derive(Debug, Clone)]
pub struct State {
    /// Vertex positions.
    pub q: Vec<Vec3>,
    /// Vertex velocities.
    pub v: Vec<Vec3>,
    /// Simulated time.
    pub time: f64,
}

impl State {
    /// Rest state: given positions, zero velocities, time zero.
    pub fn at_rest(q: Vec<Vec3>) -> Self {
        let n = q.len();
        Self {
            q,
            v: vec![Vec3::zeros(); n],
            time: 0.0,
        }
    }

    /// Number of vertices.
    pub fn len(&self) -> usize {
        self.q.len()
    }

    /// Whether the state holds no vertices.
    pub fn is_empty(&self) -> bool {
        self.q.is_empty()
    }
}
