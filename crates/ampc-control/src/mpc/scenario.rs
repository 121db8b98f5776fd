use std::collections::BTreeMap;

use ampc_core::ControlError;
use ampc_model::Model;

/// Upper limit on the number of branches of a robust problem.
pub const MAX_BRANCHES: usize = 1024;

/// Every combination of the uncertain parameter values, in the order of a nested loop
/// over the names with the last name varying fastest. The first combination takes the
/// first (nominal) value of every list.
pub fn parameter_combinations(
    uncertainty: &BTreeMap<String, Vec<f64>>,
) -> Vec<BTreeMap<String, f64>> {
    let mut combinations = vec![BTreeMap::new()];
    for (name, values) in uncertainty {
        combinations = combinations
            .into_iter()
            .flat_map(|combination| {
                values.iter().map(move |value| {
                    let mut combination = combination.clone();
                    combination.insert(name.clone(), *value);
                    combination
                })
            })
            .collect();
    }
    combinations
}

/// Scenario models of a robust MPC problem.
///
/// A branch picks one parameter combination per stage for the first `n_robust` stages;
/// its last pick holds until the end of the horizon.
#[derive(Clone, Debug)]
pub struct Scenarios<M> {
    models: Vec<M>,
    branches: Vec<Vec<usize>>,
}

impl<M: Model> Scenarios<M> {
    /// Builds the models for `uncertainty` from `model`. Without uncertainty or with
    /// `n_robust == 0` the problem is nominal and no branches are built.
    pub fn new(
        model: &M,
        uncertainty: &BTreeMap<String, Vec<f64>>,
        n_robust: usize,
        n_horizon: usize,
    ) -> Result<Self, ControlError> {
        if uncertainty.is_empty() {
            return Ok(Self {
                models: Vec::new(),
                branches: Vec::new(),
            });
        }
        let models = parameter_combinations(uncertainty)
            .iter()
            .map(|parameters| model.with_parameters(parameters))
            .collect::<Result<Vec<_>, _>>()?;

        let n_robust = n_robust.min(n_horizon);
        if n_robust == 0 {
            return Ok(Self {
                models,
                branches: Vec::new(),
            });
        }
        let n_branches = u32::try_from(n_robust)
            .ok()
            .and_then(|n| models.len().checked_pow(n));
        if !matches!(n_branches, Some(n) if n <= MAX_BRANCHES) {
            return Err(ControlError::config(format!(
                "{} parameter combinations over {} robust stages exceed {} branches",
                models.len(),
                n_robust,
                MAX_BRANCHES
            )));
        }

        let mut branches = vec![Vec::with_capacity(n_robust)];
        for _ in 0..n_robust {
            branches = branches
                .into_iter()
                .flat_map(|branch| {
                    (0..models.len()).map(move |index| {
                        let mut branch = branch.clone();
                        branch.push(index);
                        branch
                    })
                })
                .collect();
        }
        Ok(Self { models, branches })
    }

    pub fn is_robust(&self) -> bool {
        !self.branches.is_empty()
    }

    /// Number of branches the cost is averaged over, `1` for a nominal problem.
    pub fn len(&self) -> usize {
        self.branches.len().max(1)
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Model with the nominal parameter values, if uncertainty is configured.
    pub fn nominal(&self) -> Option<&M> {
        self.models.first()
    }

    /// Stage models of every branch.
    pub fn branch_models(&self) -> Vec<Vec<&dyn Model>> {
        self.branches
            .iter()
            .map(|branch| branch.iter().map(|&i| &self.models[i] as &dyn Model).collect())
            .collect()
    }
}
