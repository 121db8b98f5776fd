//! Optimization-based receding-horizon controller.

mod scenario;
mod solver;

use std::{sync::Arc, time::Instant};

use ampc_core::{settings::MpcSettings, Bounds, ControlError, Input, State};
use ampc_model::Model;

pub use scenario::*;
pub use solver::*;

use crate::{policy::check_bounds, BoundedPolicy, Objective};

/// Model predictive controller.
///
/// Every call to [`BoundedPolicy::compute`] solves the finite-horizon problem from the
/// given state and returns the first input of the solution. The remaining inputs,
/// shifted by one step, warm start the next solve until [`BoundedPolicy::reset`].
///
/// With uncertain parameters configured, one input sequence is planned against every
/// scenario branch and the costs of the branches are averaged.
pub struct MpcPolicy<M, S = SamplingSolver> {
    model: M,
    scenarios: Scenarios<M>,
    bounds: Arc<Bounds>,
    objective: Objective,
    settings: MpcSettings,
    solver: S,
    warm_start: Option<Vec<Input>>,
    previous_input: Option<Input>,
    last_solution: Option<OcpSolution>,
    last_solve_time_ms: f64,
}

impl<M: Model> MpcPolicy<M, SamplingSolver> {
    pub fn new(model: M, bounds: Arc<Bounds>, settings: MpcSettings) -> Result<Self, ControlError> {
        let solver = SamplingSolver::new(settings.solver.clone())?;
        Self::with_solver(model, bounds, settings, solver)
    }
}

impl<M: Model, S: OcpSolver> MpcPolicy<M, S> {
    pub fn with_solver(
        model: M,
        bounds: Arc<Bounds>,
        settings: MpcSettings,
        solver: S,
    ) -> Result<Self, ControlError> {
        settings.validate()?;
        let (n_states, n_inputs) = model.dimensions();
        check_bounds(&bounds, n_states, n_inputs)?;
        let objective = Objective::new(&settings.objective, &bounds)?;
        let scenarios = Scenarios::new(
            &model,
            &settings.uncertainty,
            settings.n_robust,
            settings.n_horizon,
        )?;
        if scenarios.is_robust() {
            log::info!("robust mpc over {} scenario branches", scenarios.len());
        }
        Ok(Self {
            model,
            scenarios,
            bounds,
            objective,
            settings,
            solver,
            warm_start: None,
            previous_input: None,
            last_solution: None,
            last_solve_time_ms: f64::NAN,
        })
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn scenarios(&self) -> &Scenarios<M> {
        &self.scenarios
    }

    pub fn settings(&self) -> &MpcSettings {
        &self.settings
    }

    pub fn objective(&self) -> &Objective {
        &self.objective
    }

    /// Input sequence of the most recent solve.
    pub fn last_solution(&self) -> Option<&OcpSolution> {
        self.last_solution.as_ref()
    }

    pub fn last_solve_time_ms(&self) -> f64 {
        self.last_solve_time_ms
    }

    /// Predicted states for the most recent solution, starting from `state`.
    pub fn predicted_states(&self, state: &State) -> Option<Vec<State>> {
        let solution = self.last_solution.as_ref()?;
        let previous = self.initial_previous_input().ok()?;
        Some(self.problem(state, &previous).predict(&solution.inputs))
    }

    fn problem<'a>(&'a self, state: &'a State, previous: &'a Input) -> OcpProblem<'a> {
        OcpProblem {
            model: self.scenarios.nominal().unwrap_or(&self.model),
            branches: self.scenarios.branch_models(),
            objective: &self.objective,
            bounds: &self.bounds,
            initial_state: state,
            previous_input: previous,
            n_horizon: self.settings.n_horizon,
            t_step: self.settings.t_step,
            substeps: self.settings.substeps,
        }
    }

    /// Input the first r-term is taken against before anything was applied: zero moved
    /// into the input bounds.
    fn initial_previous_input(&self) -> Result<Input, ControlError> {
        match &self.previous_input {
            Some(u) => Ok(u.clone()),
            None => self.bounds.clamp_input(&Input::zeros(self.model.dimensions().1)),
        }
    }
}

impl<M: Model, S: OcpSolver> BoundedPolicy for MpcPolicy<M, S> {
    fn dimensions(&self) -> (usize, usize) {
        self.model.dimensions()
    }

    fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    fn compute(&mut self, state: &State) -> Result<Input, ControlError> {
        let start = Instant::now();
        let previous = self.initial_previous_input()?;
        let problem = OcpProblem {
            model: self.scenarios.nominal().unwrap_or(&self.model),
            branches: self.scenarios.branch_models(),
            objective: &self.objective,
            bounds: &self.bounds,
            initial_state: state,
            previous_input: &previous,
            n_horizon: self.settings.n_horizon,
            t_step: self.settings.t_step,
            substeps: self.settings.substeps,
        };
        let solution = self.solver.solve(&problem, self.warm_start.as_deref())?;
        self.last_solve_time_ms = start.elapsed().as_secs_f64() * 1000.0;

        let first = solution.inputs.first().cloned().ok_or_else(|| {
            ControlError::Solver("solver returned an empty input sequence".into())
        })?;
        let mut shifted = solution.inputs[1..].to_vec();
        shifted.push(solution.inputs[solution.inputs.len() - 1].clone());
        log::debug!(
            "mpc solved in {:.2} ms, cost {:.6e}, u0 = {:?}",
            self.last_solve_time_ms,
            solution.cost,
            first.as_slice()
        );

        self.warm_start = Some(shifted);
        self.previous_input = Some(first.clone());
        self.last_solution = Some(solution);
        Ok(first)
    }

    fn reset(&mut self) {
        self.warm_start = None;
        self.previous_input = None;
        self.last_solution = None;
    }
}
