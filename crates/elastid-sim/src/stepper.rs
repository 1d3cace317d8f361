//! The opaque differentiable stepper boundary and a reference integrator.
//!
//! [`DiffStepper`] is the seam behind which the physics solver's internal
//! kernel lives: one forward step, plus a vector-Jacobian product pulling
//! cotangents on the produced state back onto the input state, the
//! per-element material triples, and the density.
//!
//! [`EdgeSpringStepper`] is the reference implementation: semi-implicit
//! Euler over per-element linear springs (mu on edges, lambda on
//! centroid offsets, damping on relative velocities) with lumped vertex
//! masses and zero inverse mass on Dirichlet vertices. Forces are linear
//! in positions, velocities, and materials, so its VJP is exact.

use elastid_math::{DMat, Vec3};
use elastid_mesh::TetMesh;

use crate::state::State;

/// One differentiable simulation step.
pub trait DiffStepper {
    /// Advance `state` by `dt` under the given per-element materials.
    fn step(&self, materials: &DMat, density: f64, state: &State, dt: f64) -> State;

    /// Pull cotangents on the step's output back onto its inputs.
    ///
    /// Accumulates into `material_bar` (elements × 3) and `density_bar`,
    /// and returns the cotangents on the input (q, v).
    #[allow(clippy::too_many_arguments)]
    fn step_vjp(
        &self,
        materials: &DMat,
        density: f64,
        state: &State,
        dt: f64,
        q_out_bar: &[Vec3],
        v_out_bar: &[Vec3],
        material_bar: &mut DMat,
        density_bar: &mut f64,
    ) -> (Vec<Vec3>, Vec<Vec3>);

    /// Number of vertices the stepper expects.
    fn num_vertices(&self) -> usize;

    /// Number of elements the stepper expects materials for.
    fn num_elements(&self) -> usize;
}

#[derive(Debug, Clone)]
struct Edge {
    elem: usize,
    i: usize,
    j: usize,
    rest: Vec3,
    /// vol / rest_len²: geometric part of the mu spring constant.
    k_geom: f64,
    /// vol: geometric part of the damping constant.
    c_geom: f64,
}

#[derive(Debug, Clone)]
struct CentroidSpring {
    verts: [usize; 4],
    rest_offsets: [Vec3; 4],
    /// vol / mean rest offset²: geometric part of the lambda constant.
    k_geom: f64,
}

/// Reference semi-implicit integrator over per-element linear springs.
#[derive(Debug, Clone)]
pub struct EdgeSpringStepper {
    edges: Vec<Edge>,
    centroids: Vec<CentroidSpring>,
    /// Lumped volume share per vertex.
    weights: Vec<f64>,
    /// Vertices integrated at all; Dirichlet and isolated vertices are
    /// held fixed.
    movable: Vec<bool>,
    gravity: Vec3,
    num_elements: usize,
}

const TET_EDGES: [(usize, usize); 6] = [(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)];

impl EdgeSpringStepper {
    /// Build the stepper's static data from the rest configuration.
    pub fn new(mesh: &TetMesh, dirichlet: &[bool], gravity: Vec3) -> Self {
        let n = mesh.vertices.len();
        let mut edges = Vec::with_capacity(6 * mesh.num_tets());
        let mut centroids = Vec::with_capacity(mesh.num_tets());
        let mut weights = vec![0.0; n];

        for (e, tet) in mesh.tets.iter().enumerate() {
            let vol = mesh.tet_volume(e);
            for &(a, b) in &TET_EDGES {
                let (i, j) = (tet[a], tet[b]);
                let rest = mesh.vertices[j] - mesh.vertices[i];
                let len2 = rest.norm_squared().max(1e-12);
                edges.push(Edge {
                    elem: e,
                    i,
                    j,
                    rest,
                    k_geom: vol / len2,
                    c_geom: vol,
                });
            }
            let c0 = mesh.tet_centroid(e);
            let rest_offsets = [
                mesh.vertices[tet[0]] - c0,
                mesh.vertices[tet[1]] - c0,
                mesh.vertices[tet[2]] - c0,
                mesh.vertices[tet[3]] - c0,
            ];
            let s2 = rest_offsets
                .iter()
                .map(|r| r.norm_squared())
                .sum::<f64>()
                .max(1e-12)
                / 4.0;
            centroids.push(CentroidSpring {
                verts: *tet,
                rest_offsets,
                k_geom: vol / s2,
            });
            for &vi in tet {
                weights[vi] += vol / 4.0;
            }
        }

        let movable = (0..n)
            .map(|i| weights[i] > 0.0 && !dirichlet.get(i).copied().unwrap_or(false))
            .collect();

        Self {
            edges,
            centroids,
            weights,
            movable,
            gravity,
            num_elements: mesh.num_tets(),
        }
    }

    /// Internal forces at the given state.
    fn forces(&self, materials: &DMat, state: &State) -> Vec<Vec3> {
        let mut f = vec![Vec3::zeros(); state.len()];
        for edge in &self.edges {
            let mu = materials[(edge.elem, 0)];
            let damp = materials[(edge.elem, 2)];
            let d = (state.q[edge.j] - state.q[edge.i]) - edge.rest;
            let rel = state.v[edge.j] - state.v[edge.i];
            let fe = d * (edge.k_geom * mu) + rel * (edge.c_geom * damp);
            f[edge.i] += fe;
            f[edge.j] -= fe;
        }
        for (e, spring) in self.centroids.iter().enumerate() {
            let lambda = materials[(e, 1)];
            let kl = spring.k_geom * lambda;
            let c = spring.current_centroid(&state.q);
            for (a, &vi) in spring.verts.iter().enumerate() {
                let d = state.q[vi] - c - spring.rest_offsets[a];
                f[vi] -= d * kl;
            }
        }
        f
    }
}

impl CentroidSpring {
    fn current_centroid(&self, q: &[Vec3]) -> Vec3 {
        (q[self.verts[0]] + q[self.verts[1]] + q[self.verts[2]] + q[self.verts[3]]) / 4.0
    }
}

impl DiffStepper for EdgeSpringStepper {
    fn step(&self, materials: &DMat, density: f64, state: &State, dt: f64) -> State {
        let f = self.forces(materials, state);
        let mut next = state.clone();
        for i in 0..state.len() {
            if !self.movable[i] {
                continue;
            }
            let a = f[i] / (density * self.weights[i]) + self.gravity;
            next.v[i] = state.v[i] + a * dt;
            next.q[i] = state.q[i] + next.v[i] * dt;
        }
        next.time = state.time + dt;
        next
    }

    fn step_vjp(
        &self,
        materials: &DMat,
        density: f64,
        state: &State,
        dt: f64,
        q_out_bar: &[Vec3],
        v_out_bar: &[Vec3],
        material_bar: &mut DMat,
        density_bar: &mut f64,
    ) -> (Vec<Vec3>, Vec<Vec3>) {
        let n = state.len();
        let f = self.forces(materials, state);

        // Integration adjoint: q' = q + dt v', v' = v + dt a.
        let mut q_bar = q_out_bar.to_vec();
        let mut v_bar = vec![Vec3::zeros(); n];
        let mut f_bar = vec![Vec3::zeros(); n];
        for i in 0..n {
            if !self.movable[i] {
                v_bar[i] = v_out_bar[i];
                continue;
            }
            let v_tot = v_out_bar[i] + q_out_bar[i] * dt;
            v_bar[i] = v_tot;
            let a_bar = v_tot * dt;
            let inv_m = 1.0 / (density * self.weights[i]);
            f_bar[i] = a_bar * inv_m;
            // a = f/(rho w) + g  =>  da/drho = -f/(rho² w)
            *density_bar += a_bar.dot(&(f[i] * (-inv_m / density)));
        }

        // Force adjoint, mirroring `forces`.
        for edge in &self.edges {
            let mu = materials[(edge.elem, 0)];
            let damp = materials[(edge.elem, 2)];
            let d = (state.q[edge.j] - state.q[edge.i]) - edge.rest;
            let rel = state.v[edge.j] - state.v[edge.i];
            let fe_bar = f_bar[edge.i] - f_bar[edge.j];
            q_bar[edge.j] += fe_bar * (edge.k_geom * mu);
            q_bar[edge.i] -= fe_bar * (edge.k_geom * mu);
            v_bar[edge.j] += fe_bar * (edge.c_geom * damp);
            v_bar[edge.i] -= fe_bar * (edge.c_geom * damp);
            material_bar[(edge.elem, 0)] += edge.k_geom * fe_bar.dot(&d);
            material_bar[(edge.elem, 2)] += edge.c_geom * fe_bar.dot(&rel);
        }
        for (e, spring) in self.centroids.iter().enumerate() {
            let lambda = materials[(e, 1)];
            let kl = spring.k_geom * lambda;
            let c = spring.current_centroid(&state.q);
            for (a, &vi) in spring.verts.iter().enumerate() {
                let d = state.q[vi] - c - spring.rest_offsets[a];
                // f[vi] -= kl d  =>  d_bar = -kl f_bar[vi]
                let d_bar = f_bar[vi] * (-kl);
                q_bar[vi] += d_bar;
                for &vx in &spring.verts {
                    q_bar[vx] -= d_bar / 4.0;
                }
                material_bar[(e, 1)] += spring.k_geom * (-f_bar[vi]).dot(&d);
            }
        }

        (q_bar, v_bar)
    }

    fn num_vertices(&self) -> usize {
        self.movable.len()
    }

    fn num_elements(&self) -> usize {
        self.num_elements
    }
}
