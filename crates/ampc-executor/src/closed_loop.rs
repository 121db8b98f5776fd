use std::time::Instant;

use ampc_control::BoundedPolicy;
use ampc_core::{settings::LoopSettings, ControlError, State, StepRecord, Trajectory};
use ampc_simulator::{Estimator, Plant};
use thiserror::Error;

/// A closed-loop run that stopped early.
///
/// `trajectory` holds the records of every step that completed before `step`.
#[derive(Debug, Error)]
#[error("closed loop failed at step {step}: {source}")]
pub struct RunError {
    pub step: usize,
    #[source]
    pub source: ControlError,
    pub trajectory: Trajectory,
}

/// Drives a policy, a plant and an estimator in lockstep.
///
/// Every iteration evaluates the policy on the current estimate, steps the plant with the
/// resulting input and feeds the observation to the estimator. The policy only ever sees
/// the estimate.
pub struct ClosedLoop<P, S, E> {
    policy: P,
    simulator: S,
    estimator: E,
    settings: LoopSettings,
}

impl<P, S, E> ClosedLoop<P, S, E>
where
    P: BoundedPolicy,
    S: Plant,
    E: Estimator,
{
    pub fn new(
        policy: P,
        simulator: S,
        estimator: E,
        settings: LoopSettings,
    ) -> Result<Self, ControlError> {
        settings.validate()?;
        Ok(Self {
            policy,
            simulator,
            estimator,
            settings,
        })
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub fn policy_mut(&mut self) -> &mut P {
        &mut self.policy
    }

    pub fn simulator(&self) -> &S {
        &self.simulator
    }

    pub fn estimator(&self) -> &E {
        &self.estimator
    }

    pub fn into_parts(self) -> (P, S, E) {
        (self.policy, self.simulator, self.estimator)
    }

    /// Runs `n_steps` iterations from `x0`.
    ///
    /// The policy is reset and both the plant and the estimator are initialized with `x0`
    /// first, so repeated runs from the same state give the same trajectory.
    pub fn run(&mut self, x0: &State) -> Result<Trajectory, RunError> {
        let n_steps = self.settings.n_steps;
        let fail = |step: usize, source: ControlError, trajectory: Trajectory| {
            log::warn!("closed loop failed at step {}: {}", step, source);
            RunError {
                step,
                source,
                trajectory,
            }
        };

        self.policy.reset();
        if let Err(err) = self.simulator.set_initial_state(x0) {
            return Err(fail(0, err, Trajectory::new()));
        }
        if let Err(err) = self.estimator.set_initial_state(x0) {
            return Err(fail(0, err, Trajectory::new()));
        }

        let start = Instant::now();
        let mut trajectory = Trajectory::with_capacity(n_steps);
        let mut state = x0.clone();
        for step in 0..n_steps {
            let input = match self.policy.evaluate(&state, self.settings.clip_to_bounds) {
                Ok(input) => input,
                Err(err) => return Err(fail(step, err, trajectory)),
            };
            let observation = match self.simulator.step(&input) {
                Ok(observation) => observation,
                Err(err) => return Err(fail(step, err, trajectory)),
            };
            let next = match self.estimator.step(&observation) {
                Ok(next) => next,
                Err(err) => return Err(fail(step, err, trajectory)),
            };
            log::debug!(
                "step {}: x = {:?}, u = {:?}",
                step,
                state.as_slice(),
                input.as_slice()
            );

            trajectory.push(StepRecord {
                step,
                state,
                input,
                observation,
            });
            state = next;
        }

        let violations = trajectory.input_violations(self.policy.bounds());
        log::info!(
            "closed loop finished {} steps in {:.1} ms ({} input bound violations)",
            n_steps,
            start.elapsed().as_secs_f64() * 1000.0,
            violations.len()
        );
        Ok(trajectory)
    }
}
