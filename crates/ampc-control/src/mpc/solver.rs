use ampc_core::{settings::SolverSettings, Bounds, ControlError, Input, State, VarClass};
use ampc_model::{advance, Model};
use nalgebra::DVector;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::Objective;

/// One finite-horizon optimal control problem, posed from the current state.
pub struct OcpProblem<'a> {
    /// Nominal model, used for prediction and for the cost of a nominal problem.
    pub model: &'a dyn Model,
    /// Stage models of every scenario branch; the last model of a branch holds until the
    /// end of the horizon. Empty for a nominal problem.
    pub branches: Vec<Vec<&'a dyn Model>>,
    pub objective: &'a Objective,
    pub bounds: &'a Bounds,
    pub initial_state: &'a State,
    /// Input applied before the horizon starts, for the first r-term.
    pub previous_input: &'a Input,
    pub n_horizon: usize,
    pub t_step: f64,
    pub substeps: usize,
}

impl OcpProblem<'_> {
    /// Predicted cost of applying `inputs` from the initial state, averaged with equal
    /// weights over the scenario branches.
    ///
    /// Returns infinity when any prediction leaves the finite numbers.
    pub fn cost(&self, inputs: &[Input]) -> f64 {
        if self.branches.is_empty() {
            return self.branch_cost(&[self.model], inputs);
        }
        let total: f64 = self
            .branches
            .iter()
            .map(|models| self.branch_cost(models, inputs))
            .sum();
        total / self.branches.len() as f64
    }

    fn branch_cost(&self, models: &[&dyn Model], inputs: &[Input]) -> f64 {
        let mut state = self.initial_state.clone();
        let mut previous = self.previous_input;
        let mut cost = 0.0;
        for (k, input) in inputs.iter().enumerate() {
            let model = models[k.min(models.len() - 1)];
            cost += self.objective.stage_cost(&state) + self.objective.rate_cost(input, previous);
            state = advance(model, &state, input, self.t_step, self.substeps);
            if state.iter().any(|v| !v.is_finite()) {
                return f64::INFINITY;
            }
            previous = input;
        }
        cost += self.objective.terminal_cost(&state);
        if cost.is_finite() {
            cost
        } else {
            f64::INFINITY
        }
    }

    /// States visited when applying `inputs`, starting with the initial state.
    pub fn predict(&self, inputs: &[Input]) -> Vec<State> {
        let mut states = Vec::with_capacity(inputs.len() + 1);
        states.push(self.initial_state.clone());
        for input in inputs {
            let next = advance(
                self.model,
                &states[states.len() - 1],
                input,
                self.t_step,
                self.substeps,
            );
            states.push(next);
        }
        states
    }
}

#[derive(Clone, Debug)]
pub struct OcpSolution {
    /// Input sequence over the horizon, inside the input bounds.
    pub inputs: Vec<Input>,
    pub cost: f64,
}

/// Numerical method for [`OcpProblem`].
pub trait OcpSolver {
    /// Solves `problem`, starting from `warm_start` when it spans the horizon.
    fn solve(
        &mut self,
        problem: &OcpProblem<'_>,
        warm_start: Option<&[Input]>,
    ) -> Result<OcpSolution, ControlError>;
}

/// Path-integral style sampling solver.
///
/// Each iteration perturbs the current mean input sequence with gaussian noise, clamps
/// the candidates to the input bounds and moves the mean to the softmax-weighted average
/// of the candidates. The random generator is reseeded on every call, so equal problems
/// give equal solutions.
#[derive(Clone, Debug)]
pub struct SamplingSolver {
    settings: SolverSettings,
}

impl SamplingSolver {
    pub fn new(settings: SolverSettings) -> Result<Self, ControlError> {
        settings.validate()?;
        Ok(Self { settings })
    }

    pub fn settings(&self) -> &SolverSettings {
        &self.settings
    }

    fn noise_scale(&self, bounds: &Bounds, reference: &Input) -> DVector<f64> {
        let lower = bounds.lower(VarClass::Input);
        let upper = bounds.upper(VarClass::Input);
        DVector::from_iterator(
            reference.len(),
            reference.iter().enumerate().map(|(i, u)| {
                let range = upper[i] - lower[i];
                if range.is_finite() {
                    self.settings.noise_fraction * range
                } else {
                    self.settings.noise_fraction * u.abs().max(1.0)
                }
            }),
        )
    }
}

impl Default for SamplingSolver {
    fn default() -> Self {
        Self {
            settings: SolverSettings::default(),
        }
    }
}

fn clamp_sequence(bounds: &Bounds, inputs: Vec<Input>) -> Result<Vec<Input>, ControlError> {
    inputs.iter().map(|u| bounds.clamp_input(u)).collect()
}

impl OcpSolver for SamplingSolver {
    fn solve(
        &mut self,
        problem: &OcpProblem<'_>,
        warm_start: Option<&[Input]>,
    ) -> Result<OcpSolution, ControlError> {
        let n_horizon = problem.n_horizon;
        let mut rng = StdRng::seed_from_u64(self.settings.seed);
        let sigma = self.noise_scale(problem.bounds, problem.previous_input);

        let initial = match warm_start {
            Some(inputs) if inputs.len() == n_horizon => inputs.to_vec(),
            _ => vec![problem.previous_input.clone(); n_horizon],
        };
        let mut mean = clamp_sequence(problem.bounds, initial)?;
        let mut best_cost = problem.cost(&mean);
        let mut best = mean.clone();

        for iteration in 0..self.settings.n_iterations {
            let mut candidates = Vec::with_capacity(self.settings.n_samples);
            candidates.push(mean.clone());
            while candidates.len() < self.settings.n_samples {
                let perturbed = mean
                    .iter()
                    .map(|u| {
                        let noise = DVector::from_iterator(
                            u.len(),
                            (0..u.len()).map(|_| rng.sample::<f64, _>(StandardNormal)),
                        );
                        u + sigma.component_mul(&noise)
                    })
                    .collect();
                candidates.push(clamp_sequence(problem.bounds, perturbed)?);
            }

            let costs: Vec<f64> = candidates.iter().map(|c| problem.cost(c)).collect();
            let min_cost = costs.iter().copied().fold(f64::INFINITY, f64::min);
            if !min_cost.is_finite() {
                return Err(ControlError::Solver(format!(
                    "no candidate with finite cost in iteration {}",
                    iteration
                )));
            }
            for (candidate, cost) in candidates.iter().zip(costs.iter()) {
                if *cost < best_cost {
                    best_cost = *cost;
                    best = candidate.clone();
                }
            }

            let weights: Vec<f64> = costs
                .iter()
                .map(|c| {
                    if c.is_finite() {
                        (-(c - min_cost) / self.settings.lambda).exp()
                    } else {
                        0.0
                    }
                })
                .collect();
            let total: f64 = weights.iter().sum();
            mean = (0..n_horizon)
                .map(|k| {
                    candidates
                        .iter()
                        .zip(weights.iter())
                        .fold(Input::zeros(sigma.len()), |acc, (c, w)| acc + &c[k] * *w)
                        / total
                })
                .collect();
            mean = clamp_sequence(problem.bounds, mean)?;

            let mean_cost = problem.cost(&mean);
            if mean_cost < best_cost {
                best_cost = mean_cost;
                best = mean.clone();
            }
            log::trace!(
                "sampling iteration {}: min cost {:.6e}, best {:.6e}",
                iteration,
                min_cost,
                best_cost
            );
        }

        if !best_cost.is_finite() {
            return Err(ControlError::Solver(
                "solver finished without a finite-cost input sequence".into(),
            ));
        }
        Ok(OcpSolution {
            inputs: best,
            cost: best_cost,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ampc_core::{settings::ObjectiveSettings, Variables};
    use ampc_model::{LinearModel, ModelKind};
    use nalgebra::DMatrix;
    use std::collections::BTreeMap;

    fn integrator() -> (LinearModel, Bounds, Objective) {
        let vars = Variables::new(["x"], ["u"]).unwrap();
        let model = LinearModel::new(
            vars.clone(),
            ModelKind::Discrete,
            DMatrix::from_element(1, 1, 1.0),
            DMatrix::from_element(1, 1, 1.0),
        )
        .unwrap();
        let bounds = Bounds::builder(vars).input("u", -1.0, 1.0).build().unwrap();
        let settings = ObjectiveSettings {
            reference: BTreeMap::from([("x".to_string(), 3.0)]),
            stage_weights: BTreeMap::from([("x".to_string(), 1.0)]),
            terminal_weights: BTreeMap::from([("x".to_string(), 1.0)]),
            bound_penalty: 0.0,
            ..Default::default()
        };
        let objective = Objective::new(&settings, &bounds).unwrap();
        (model, bounds, objective)
    }

    fn problem<'a>(
        model: &'a LinearModel,
        bounds: &'a Bounds,
        objective: &'a Objective,
        x0: &'a State,
        u_prev: &'a Input,
    ) -> OcpProblem<'a> {
        OcpProblem {
            model,
            branches: Vec::new(),
            objective,
            bounds,
            initial_state: x0,
            previous_input: u_prev,
            n_horizon: 5,
            t_step: 1.0,
            substeps: 1,
        }
    }

    #[test]
    fn test_moves_toward_reference_within_bounds() {
        let (model, bounds, objective) = integrator();
        let x0 = State::zeros(1);
        let u_prev = Input::zeros(1);
        let problem = problem(&model, &bounds, &objective, &x0, &u_prev);
        let mut solver = SamplingSolver::new(SolverSettings {
            n_samples: 64,
            n_iterations: 10,
            lambda: 1e-2,
            ..Default::default()
        })
        .unwrap();
        let solution = solver.solve(&problem, None).unwrap();
        assert_eq!(solution.inputs.len(), 5);
        assert!(solution.inputs.iter().all(|u| (-1.0..=1.0).contains(&u[0])));
        assert!(solution.inputs[0][0] > 0.0);
        assert!(solution.cost < problem.cost(&vec![Input::zeros(1); 5]));
    }

    #[test]
    fn test_deterministic_for_equal_problems() {
        let (model, bounds, objective) = integrator();
        let x0 = State::from_vec(vec![1.0]);
        let u_prev = Input::zeros(1);
        let problem = problem(&model, &bounds, &objective, &x0, &u_prev);
        let mut solver = SamplingSolver::default();
        let a = solver.solve(&problem, None).unwrap();
        let b = solver.solve(&problem, None).unwrap();
        assert_eq!(a.inputs, b.inputs);
        assert_eq!(a.cost, b.cost);
    }

    #[test]
    fn test_warm_start_of_wrong_length_is_ignored() {
        let (model, bounds, objective) = integrator();
        let x0 = State::zeros(1);
        let u_prev = Input::zeros(1);
        let problem = problem(&model, &bounds, &objective, &x0, &u_prev);
        let mut solver = SamplingSolver::default();
        let short = vec![Input::from_vec(vec![1.0]); 2];
        let cold = solver.solve(&problem, None).unwrap();
        let warm = solver.solve(&problem, Some(&short)).unwrap();
        assert_eq!(cold.inputs, warm.inputs);
    }

    #[test]
    fn test_branch_costs_are_averaged() {
        let (model, bounds, objective) = integrator();
        let vars = model.variables().clone();
        let slow = LinearModel::new(
            vars,
            ModelKind::Discrete,
            DMatrix::from_element(1, 1, 1.0),
            DMatrix::from_element(1, 1, 0.5),
        )
        .unwrap();
        let x0 = State::zeros(1);
        let u_prev = Input::zeros(1);
        let inputs = vec![Input::from_vec(vec![1.0]); 5];

        let nominal = problem(&model, &bounds, &objective, &x0, &u_prev).cost(&inputs);
        let slow_only = problem(&slow, &bounds, &objective, &x0, &u_prev).cost(&inputs);
        assert!(slow_only > nominal);

        let mut robust = problem(&model, &bounds, &objective, &x0, &u_prev);
        robust.branches = vec![vec![&model as &dyn Model], vec![&slow as &dyn Model]];
        assert_eq!(robust.cost(&inputs), (nominal + slow_only) / 2.0);

        // the slow model takes over after the first stage and holds
        robust.branches = vec![vec![&model as &dyn Model, &slow as &dyn Model]];
        // x: 0 -> 1 -> 1.5 -> 2 -> 2.5 -> 3, tracking 3 at every stage and the end
        let expected = [9.0, 4.0, 2.25, 1.0, 0.25].iter().sum::<f64>();
        assert_eq!(robust.cost(&inputs), expected);
    }

    #[test]
    fn test_predict_includes_initial_state() {
        let (model, bounds, objective) = integrator();
        let x0 = State::zeros(1);
        let u_prev = Input::zeros(1);
        let problem = problem(&model, &bounds, &objective, &x0, &u_prev);
        let states = problem.predict(&vec![Input::from_vec(vec![1.0]); 3]);
        assert_eq!(states.len(), 4);
        assert_eq!(states[3][0], 3.0);
    }
}
