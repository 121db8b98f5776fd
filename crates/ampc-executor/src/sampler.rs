use ampc_control::{neural::Dataset, BoundedPolicy};
use ampc_core::{
    settings::{LoopSettings, SamplerSettings, SamplingMode},
    Bounds, ControlError, State, VarClass,
};
use ampc_simulator::{Estimator, Plant};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::ClosedLoop;

/// Generates training data by labelling states with a reference controller.
#[derive(Clone, Debug)]
pub struct Sampler {
    settings: SamplerSettings,
}

impl Sampler {
    pub fn new(settings: SamplerSettings) -> Result<Self, ControlError> {
        settings.validate()?;
        Ok(Self { settings })
    }

    pub fn settings(&self) -> &SamplerSettings {
        &self.settings
    }

    /// Samples according to the configured mode.
    pub fn sample<P, S, E>(
        &self,
        reference: &mut P,
        simulator: &mut S,
        estimator: &mut E,
        bounds: &Bounds,
    ) -> Result<Dataset, ControlError>
    where
        P: BoundedPolicy,
        S: Plant,
        E: Estimator,
    {
        match self.settings.mode {
            SamplingMode::Random => self.sample_random(reference, bounds),
            SamplingMode::ClosedLoop => {
                self.sample_closed_loop(reference, simulator, estimator, bounds)
            }
        }
    }

    /// Labels states drawn uniformly from the state bounds.
    pub fn sample_random<P: BoundedPolicy>(
        &self,
        reference: &mut P,
        bounds: &Bounds,
    ) -> Result<Dataset, ControlError> {
        let mut rng = StdRng::seed_from_u64(self.settings.seed);
        let mut dataset = Dataset::new();
        for i in 0..self.settings.n_samples {
            let state = draw_state(&mut rng, bounds)?;
            reference.reset();
            let input = reference.evaluate(&state, true)?;
            dataset.push(state, input);
            if (i + 1) % 100 == 0 {
                log::debug!("sampled {}/{}", i + 1, self.settings.n_samples);
            }
        }
        log::info!("sampled {} random states", dataset.len());
        Ok(dataset)
    }

    /// Collects the records of closed-loop rollouts from random initial states.
    ///
    /// A rollout that fails contributes the records it produced before failing.
    pub fn sample_closed_loop<P, S, E>(
        &self,
        reference: &mut P,
        simulator: &mut S,
        estimator: &mut E,
        bounds: &Bounds,
    ) -> Result<Dataset, ControlError>
    where
        P: BoundedPolicy,
        S: Plant,
        E: Estimator,
    {
        let n_samples = self.settings.n_samples;
        let length = self.settings.trajectory_length;
        let n_rollouts = (n_samples + length - 1) / length;
        let mut rng = StdRng::seed_from_u64(self.settings.seed);
        let mut closed_loop = ClosedLoop::new(
            reference,
            simulator,
            estimator,
            LoopSettings {
                n_steps: length,
                clip_to_bounds: true,
            },
        )?;

        let mut dataset = Dataset::new();
        for rollout in 0..n_rollouts {
            let x0 = draw_state(&mut rng, bounds)?;
            let trajectory = match closed_loop.run(&x0) {
                Ok(trajectory) => trajectory,
                Err(err) => {
                    log::warn!(
                        "rollout {} stopped early, keeping {} records: {}",
                        rollout,
                        err.trajectory.len(),
                        err.source
                    );
                    err.trajectory
                }
            };
            dataset.extend(
                trajectory
                    .into_iter()
                    .map(|r| ampc_control::neural::Sample {
                        state: r.state,
                        input: r.input,
                    }),
            );
        }
        dataset.samples.truncate(n_samples);
        log::info!(
            "sampled {} states from {} closed-loop rollouts",
            dataset.len(),
            n_rollouts
        );
        Ok(dataset)
    }
}

/// Uniform draw inside the state bounds.
pub fn draw_state<R: Rng>(rng: &mut R, bounds: &Bounds) -> Result<State, ControlError> {
    let names = bounds.variables().names(VarClass::State);
    let lower = bounds.lower(VarClass::State);
    let upper = bounds.upper(VarClass::State);
    let mut state = State::zeros(names.len());
    for (i, name) in names.iter().enumerate() {
        if !(lower[i].is_finite() && upper[i].is_finite()) {
            return Err(ControlError::UnboundedSampling(format!("state {:?}", name)));
        }
        state[i] = rng.gen_range(lower[i]..=upper[i]);
    }
    Ok(state)
}
