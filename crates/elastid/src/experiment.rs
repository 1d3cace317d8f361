//! Experiment composition: descriptor + config + collaborators → a
//! ready-to-run estimation.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use rand::Rng;
use serde::{Deserialize, Serialize};

use elastid_io::ExperimentDescriptor;
use elastid_loss::{
    DiffRenderer, ImageLoss, ImageLossConfig, Loss, SimMode, TargetSource, TwoModeLoss,
};
use elastid_math::{Quat, Vec3, GRAVITY};
use elastid_mesh::TetMesh;
use elastid_opt::{AdaptiveMomentum, Minimizer, Minimum};
use elastid_param::{Granularity, ParameterModel, PerturbProfile};
use elastid_sim::{EdgeSpringStepper, SimConfig, Simulator, State, TwistConfig, TwistSchedule};

use crate::{Error, Result};

/// The scripted boundary motion of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    /// The handle stays put; the object sags under gravity.
    Bend,
    /// The handle is driven through interpolated rigid keyframes.
    Twist,
}

/// Keyframed end pose for the [`Scenario::Twist`] handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwistSettings {
    pub axis: [f64; 3],
    /// Total rotation in radians.
    pub angle: f64,
    pub translation: [f64; 3],
    pub num_keyframes: usize,
}

/// Everything about a run that is not in the descriptor file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub scenario: Scenario,
    pub granularity: Granularity,
    pub mode: SimMode,
    /// Initial (mu, lambda, damping) triples, one per material for
    /// per-material granularity, a single broadcast triple otherwise.
    pub initial_parameters: Vec<f64>,
    /// [density, mu, lambda, damping] optimizability.
    pub optimizable: [bool; 4],
    pub initial_density: f64,
    pub perturb: PerturbProfile,
    pub num_iters: usize,
    pub lr: f64,
    /// Twist pose; required when `scenario` is `Twist`.
    pub twist: Option<TwistSettings>,
}

impl ExperimentConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }
}

/// One wired-up estimation run.
pub struct Experiment {
    model: Rc<RefCell<ParameterModel>>,
    loss: Box<dyn Loss>,
    minimizer: AdaptiveMomentum,
}

impl Experiment {
    /// Wire a run from its parts. The renderer and target feed are
    /// injected so the composition stays independent of camera and
    /// capture formats.
    pub fn build<R: Rng>(
        descriptor: &ExperimentDescriptor,
        config: &ExperimentConfig,
        mesh: &TetMesh,
        renderer: Box<dyn DiffRenderer>,
        targets: Box<dyn TargetSource>,
        rng: &mut R,
    ) -> Result<Self> {
        let model = Rc::new(RefCell::new(build_model(descriptor, config, mesh, rng)?));
        let loss = build_loss(descriptor, config, mesh, renderer, targets, Rc::clone(&model))?;
        Ok(Self {
            model,
            loss,
            minimizer: AdaptiveMomentum::new(config.num_iters, config.lr),
        })
    }

    /// Blend two wired runs into a single two-mode estimation sharing
    /// the primary's parameter model.
    pub fn two_mode(primary: Experiment, secondary: Experiment, alpha: f64) -> Experiment {
        let minimizer = primary.minimizer;
        let model = primary.model;
        let loss = Box::new(TwoModeLoss::new(primary.loss, secondary.loss, alpha));
        Experiment {
            model,
            loss,
            minimizer,
        }
    }

    pub fn model(&self) -> Rc<RefCell<ParameterModel>> {
        Rc::clone(&self.model)
    }

    pub fn minimizer_mut(&mut self) -> &mut AdaptiveMomentum {
        &mut self.minimizer
    }

    /// Run the minimization and leave the model at the best point.
    pub fn run(&mut self) -> Result<Minimum> {
        let minimum = self.minimizer.minimize(self.loss.as_mut())?;
        self.loss.set_parameters(&minimum.parameters)?;
        Ok(minimum)
    }
}

fn build_model<R: Rng>(
    descriptor: &ExperimentDescriptor,
    config: &ExperimentConfig,
    mesh: &TetMesh,
    rng: &mut R,
) -> Result<ParameterModel> {
    let model = match config.granularity {
        Granularity::PerMaterial => {
            let distribution = mesh.partition_by_boxes(&descriptor.parameter_boxes(), true);
            ParameterModel::per_material(
                &config.initial_parameters,
                &config.optimizable,
                config.perturb,
                config.initial_density,
                distribution,
                rng,
            )?
        }
        Granularity::PerElement => ParameterModel::per_element(
            &config.initial_parameters,
            &config.optimizable,
            config.perturb,
            config.initial_density,
            mesh.num_tets(),
            rng,
        )?,
    };
    Ok(model)
}

fn build_loss(
    descriptor: &ExperimentDescriptor,
    config: &ExperimentConfig,
    mesh: &TetMesh,
    renderer: Box<dyn DiffRenderer>,
    targets: Box<dyn TargetSource>,
    model: Rc<RefCell<ParameterModel>>,
) -> Result<Box<dyn Loss>> {
    let dirichlet = mesh.dirichlet_vertices(&descriptor.dirichlet_boxes(), true);
    let stepper = EdgeSpringStepper::new(mesh, &dirichlet, Vec3::new(0.0, -GRAVITY, 0.0));

    let sim_config = SimConfig {
        dt: descriptor.dt,
        sim_steps: descriptor.sub_steps,
        ..SimConfig::default()
    };
    let schedule = match config.scenario {
        Scenario::Bend => None,
        Scenario::Twist => {
            let settings = config
                .twist
                .as_ref()
                .ok_or_else(|| Error::Config("twist scenario needs twist settings".to_string()))?;
            Some(twist_schedule(descriptor, settings, mesh)?)
        }
    };
    let sim = Simulator::new(
        stepper,
        sim_config,
        State::at_rest(mesh.vertices.clone()),
        schedule,
    )?;

    Ok(Box::new(ImageLoss::new(
        sim,
        renderer,
        targets,
        model,
        mesh.two_ring.clone(),
        ImageLossConfig {
            mode: config.mode,
            ..ImageLossConfig::default()
        },
    )))
}

/// The twist handle is the first Dirichlet box, driven from identity to
/// the configured end pose.
fn twist_schedule(
    descriptor: &ExperimentDescriptor,
    settings: &TwistSettings,
    mesh: &TetMesh,
) -> Result<TwistSchedule> {
    let bbox = descriptor
        .dirichlet_boxes()
        .into_iter()
        .next()
        .ok_or_else(|| Error::Config("twist scenario needs a Dirichlet box".to_string()))?;
    let axis = Vec3::new(settings.axis[0], settings.axis[1], settings.axis[2]);
    let twist_config = TwistConfig::new(
        bbox,
        Quat::identity(),
        Quat::from_axis_angle(&axis, settings.angle),
        Vec3::zeros(),
        Vec3::new(
            settings.translation[0],
            settings.translation[1],
            settings.translation[2],
        ),
        settings.num_keyframes,
    );
    Ok(TwistSchedule::new(
        &twist_config,
        &mesh.vertices,
        descriptor.total_steps(),
    ))
}
