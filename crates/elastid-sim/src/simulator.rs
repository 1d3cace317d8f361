//! Frame-oriented driver over a [`DiffStepper`] with gradient
//! checkpointing.
//!
//! Forward runs advance whole frames of sub-steps and record only each
//! frame's entry state plus the inputs it ran under. The backward pass
//! replays frames in reverse: each frame is cut into segments no longer
//! than the checkpoint budget, the segment entry states are recomputed,
//! and cotangents are swept through one segment's worth of stored
//! intermediate states at a time. Peak memory is bounded by the segment
//! length instead of the full step count.

use elastid_math::{DMat, Vec3};

use crate::state::State;
use crate::stepper::DiffStepper;
use crate::twist::TwistSchedule;
use crate::{Result, SimError};

/// Split `total_steps` into contiguous segments of at most `max_steps`.
///
/// The segment count is `total / max`, each of `total / segments` steps;
/// any division remainder forms one extra final segment. With
/// checkpointing disabled, or when the total fits the budget, everything
/// is one segment.
pub fn segment_lengths(total_steps: usize, max_steps: usize, enabled: bool) -> Vec<usize> {
    if total_steps == 0 {
        return Vec::new();
    }
    if !enabled || total_steps <= max_steps {
        return vec![total_steps];
    }
    let segments = total_steps / max_steps;
    let base = total_steps / segments;
    let mut lengths = vec![base; segments];
    let remainder = total_steps - base * segments;
    if remainder > 0 {
        lengths.push(remainder);
    }
    lengths
}

/// Step size and checkpointing knobs.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Sub-step size in seconds.
    pub dt: f64,
    /// Sub-steps per frame.
    pub sim_steps: usize,
    pub checkpoint: bool,
    /// Longest segment the backward pass keeps in memory at once.
    pub checkpoint_max_steps: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            dt: 1e-3,
            sim_steps: 1000,
            checkpoint: true,
            checkpoint_max_steps: 20_000,
        }
    }
}

/// Gradients produced by a backward sweep.
#[derive(Debug, Clone)]
pub struct SimGrads {
    /// Per-element material cotangent, elements × 3.
    pub material_bar: DMat,
    pub density_bar: f64,
    /// Cotangent on the positions the run started from.
    pub q0_bar: Vec<Vec3>,
    /// Cotangent on the velocities the run started from.
    pub v0_bar: Vec<Vec3>,
}

#[derive(Debug, Clone)]
struct FrameTrace {
    entry: State,
    steps: usize,
    start_step: usize,
    materials: DMat,
    density: f64,
}

/// Checkpointed differentiable driver.
#[derive(Debug, Clone)]
pub struct Simulator<S: DiffStepper> {
    stepper: S,
    config: SimConfig,
    schedule: Option<TwistSchedule>,
    initial_state: State,
    state: State,
    frames: Vec<FrameTrace>,
    step_cursor: usize,
}

impl<S: DiffStepper> Simulator<S> {
    pub fn new(
        stepper: S,
        config: SimConfig,
        initial_state: State,
        schedule: Option<TwistSchedule>,
    ) -> Result<Self> {
        if initial_state.len() != stepper.num_vertices() {
            return Err(SimError::StateLength {
                got: initial_state.len(),
                expected: stepper.num_vertices(),
            });
        }
        let state = initial_state.clone();
        Ok(Self {
            stepper,
            config,
            schedule,
            initial_state,
            state,
            frames: Vec::new(),
            step_cursor: 0,
        })
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    /// Rewind to the initial state and drop the recorded trace.
    pub fn reset(&mut self) {
        self.state = self.initial_state.clone();
        self.frames.clear();
        self.step_cursor = 0;
    }

    /// Advance one frame of `steps` sub-steps under the given inputs.
    pub fn advance(&mut self, materials: &DMat, density: f64, steps: usize) -> Result<&State> {
        if materials.nrows() != self.stepper.num_elements() {
            return Err(SimError::MaterialRows {
                got: materials.nrows(),
                expected: self.stepper.num_elements(),
            });
        }
        self.frames.push(FrameTrace {
            entry: self.state.clone(),
            steps,
            start_step: self.step_cursor,
            materials: materials.clone(),
            density,
        });
        for _ in 0..steps {
            self.state = self.run_step(materials, density, &self.state, self.step_cursor);
            self.step_cursor += 1;
        }
        Ok(&self.state)
    }

    /// One sub-step: integrate, then overlay the scripted boundary
    /// motion for this global step index.
    fn run_step(&self, materials: &DMat, density: f64, state: &State, global: usize) -> State {
        let mut next = self.stepper.step(materials, density, state, self.config.dt);
        if let Some(schedule) = &self.schedule {
            schedule.apply(global, &mut next.q);
        }
        next
    }

    /// Sweep position cotangents seeded at frame exits back to the run's
    /// inputs.
    ///
    /// `seeds` pairs a frame index with the cotangent on that frame's
    /// final positions. Gradients flow across frame boundaries, so a
    /// seed on a late frame also reaches the materials of earlier ones.
    pub fn backward(&self, seeds: &[(usize, Vec<Vec3>)]) -> Result<SimGrads> {
        let n = self.stepper.num_vertices();
        let mut seed_by_frame: Vec<Option<&[Vec3]>> = vec![None; self.frames.len()];
        for (frame, seed) in seeds {
            if *frame >= self.frames.len() {
                return Err(SimError::UnknownFrame {
                    frame: *frame,
                    frames: self.frames.len(),
                });
            }
            if seed.len() != n {
                return Err(SimError::CotangentLength {
                    got: seed.len(),
                    expected: n,
                });
            }
            seed_by_frame[*frame] = Some(seed.as_slice());
        }

        let mut material_bar = DMat::zeros(self.stepper.num_elements(), 3);
        let mut density_bar = 0.0;
        let mut q_bar = vec![Vec3::zeros(); n];
        let mut v_bar = vec![Vec3::zeros(); n];

        for fi in (0..self.frames.len()).rev() {
            if let Some(seed) = seed_by_frame[fi] {
                for (qb, s) in q_bar.iter_mut().zip(seed) {
                    *qb += s;
                }
            }
            let frame = &self.frames[fi];
            let lengths =
                segment_lengths(frame.steps, self.config.checkpoint_max_steps, self.config.checkpoint);

            // First replay: recover each segment's entry state.
            let mut entries = Vec::with_capacity(lengths.len());
            let mut state = frame.entry.clone();
            let mut global = frame.start_step;
            for &len in &lengths {
                entries.push((state.clone(), global));
                for _ in 0..len {
                    state = self.run_step(&frame.materials, frame.density, &state, global);
                    global += 1;
                }
            }

            // Second replay, one segment at a time in reverse, keeping
            // only that segment's step inputs resident.
            for (si, &len) in lengths.iter().enumerate().rev() {
                let (entry, start) = &entries[si];
                let mut inputs = Vec::with_capacity(len);
                let mut state = entry.clone();
                let mut global = *start;
                for _ in 0..len {
                    inputs.push(state.clone());
                    state = self.run_step(&frame.materials, frame.density, &state, global);
                    global += 1;
                }
                // The scripted delta is a constant add, so its adjoint
                // is the identity and only the stepper needs a VJP.
                for input in inputs.iter().rev() {
                    let (qb, vb) = self.stepper.step_vjp(
                        &frame.materials,
                        frame.density,
                        input,
                        self.config.dt,
                        &q_bar,
                        &v_bar,
                        &mut material_bar,
                        &mut density_bar,
                    );
                    q_bar = qb;
                    v_bar = vb;
                }
            }
        }

        Ok(SimGrads {
            material_bar,
            density_bar,
            q0_bar: q_bar,
            v0_bar: v_bar,
        })
    }
}
