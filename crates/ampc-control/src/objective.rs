use std::collections::BTreeMap;

use ampc_core::{settings::ObjectiveSettings, Bounds, ControlError, Input, State, VarClass, Variables};
use nalgebra::DVector;

/// Numeric form of [`ObjectiveSettings`], laid out along the model's variables.
#[derive(Clone, Debug, PartialEq)]
pub struct Objective {
    reference: DVector<f64>,
    stage_weights: DVector<f64>,
    terminal_weights: DVector<f64>,
    rterm: DVector<f64>,
    input_scaling: DVector<f64>,
    state_lower: DVector<f64>,
    state_upper: DVector<f64>,
    /// `None` leaves the terminal state unconstrained.
    terminal_bounds: Option<(DVector<f64>, DVector<f64>)>,
    bound_penalty: f64,
}

pub(crate) fn by_name(
    vars: &Variables,
    class: VarClass,
    field: &str,
    map: &BTreeMap<String, f64>,
    default: f64,
) -> Result<DVector<f64>, ControlError> {
    let mut values = DVector::from_element(vars.len(class), default);
    for (name, value) in map {
        let index = vars.index_of(class, name).ok_or_else(|| {
            ControlError::config(format!("{}: unknown {} {:?}", field, class, name))
        })?;
        values[index] = *value;
    }
    Ok(values)
}

impl Objective {
    pub fn new(settings: &ObjectiveSettings, bounds: &Bounds) -> Result<Self, ControlError> {
        settings.validate()?;
        let vars = bounds.variables();
        let state_lower = DVector::from_column_slice(bounds.lower(VarClass::State));
        let state_upper = DVector::from_column_slice(bounds.upper(VarClass::State));
        let terminal_bounds = if settings.use_terminal_bounds {
            let mut lower = state_lower.clone();
            let mut upper = state_upper.clone();
            for (name, [lo, hi]) in &settings.terminal_bounds {
                let index = vars.index_of(VarClass::State, name).ok_or_else(|| {
                    ControlError::config(format!("terminal_bounds: unknown state {:?}", name))
                })?;
                lower[index] = *lo;
                upper[index] = *hi;
            }
            Some((lower, upper))
        } else {
            None
        };
        Ok(Self {
            reference: by_name(vars, VarClass::State, "reference", &settings.reference, 0.0)?,
            stage_weights: by_name(
                vars,
                VarClass::State,
                "stage_weights",
                &settings.stage_weights,
                0.0,
            )?,
            terminal_weights: by_name(
                vars,
                VarClass::State,
                "terminal_weights",
                &settings.terminal_weights,
                0.0,
            )?,
            rterm: by_name(vars, VarClass::Input, "rterm", &settings.rterm, 0.0)?,
            input_scaling: by_name(
                vars,
                VarClass::Input,
                "input_scaling",
                &settings.input_scaling,
                1.0,
            )?,
            state_lower,
            state_upper,
            terminal_bounds,
            bound_penalty: settings.bound_penalty,
        })
    }

    /// Lagrange term plus the soft state-bound penalty.
    pub fn stage_cost(&self, state: &State) -> f64 {
        self.tracking(state, &self.stage_weights) + self.bound_cost(state)
    }

    /// Meyer term plus the soft penalty against the terminal bounds.
    pub fn terminal_cost(&self, state: &State) -> f64 {
        let penalty = match &self.terminal_bounds {
            Some((lower, upper)) => self.excess_cost(state, lower, upper),
            None => 0.0,
        };
        self.tracking(state, &self.terminal_weights) + penalty
    }

    /// The r-term for moving from `previous` to `input`.
    pub fn rate_cost(&self, input: &Input, previous: &Input) -> f64 {
        input
            .iter()
            .zip(previous.iter())
            .zip(self.rterm.iter().zip(self.input_scaling.iter()))
            .map(|((u, p), (r, s))| r * ((u - p) / s).powi(2))
            .sum()
    }

    pub fn bound_cost(&self, state: &State) -> f64 {
        self.excess_cost(state, &self.state_lower, &self.state_upper)
    }

    fn excess_cost(&self, state: &State, lower: &DVector<f64>, upper: &DVector<f64>) -> f64 {
        if self.bound_penalty == 0.0 {
            return 0.0;
        }
        let excess: f64 = state
            .iter()
            .zip(lower.iter().zip(upper.iter()))
            .map(|(x, (lo, hi))| {
                if x < lo {
                    (lo - x).powi(2)
                } else if x > hi {
                    (x - hi).powi(2)
                } else {
                    0.0
                }
            })
            .sum();
        self.bound_penalty * excess
    }

    fn tracking(&self, state: &State, weights: &DVector<f64>) -> f64 {
        state
            .iter()
            .zip(self.reference.iter())
            .zip(weights.iter())
            .map(|((x, r), w)| w * (x - r).powi(2))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ampc_model::Cstr;
    use approx::assert_relative_eq;

    fn tracking() -> ObjectiveSettings {
        Cstr::mpc_settings().objective
    }

    fn bounds() -> Bounds {
        let vars = Variables::new(["C_a", "C_b", "T_R", "T_K"], ["F", "Q_dot"]).unwrap();
        Bounds::builder(vars)
            .state("C_b", 0.1, 2.0)
            .state("T_R", 50.0, 140.0)
            .input("F", 5.0, 100.0)
            .input("Q_dot", -8500.0, 0.0)
            .build()
            .unwrap()
    }

    #[test]
    fn test_tracking_cost() {
        let objective = Objective::new(&tracking(), &bounds()).unwrap();
        let x = State::from_vec(vec![0.8, 0.5, 134.14, 130.0]);
        assert_relative_eq!(objective.stage_cost(&x), 0.01, epsilon = 1e-12);
        assert_relative_eq!(objective.terminal_cost(&x), 0.01, epsilon = 1e-12);
    }

    #[test]
    fn test_rate_cost_uses_scaling() {
        let objective = Objective::new(&tracking(), &bounds()).unwrap();
        let cost = objective.rate_cost(
            &Input::from_vec(vec![20.0, -2000.0]),
            &Input::from_vec(vec![10.0, 0.0]),
        );
        // 0.1 * (10/100)^2 + 1e-3 * (2000/2000)^2
        assert_relative_eq!(cost, 0.001 + 0.001, epsilon = 1e-12);
    }

    #[test]
    fn test_bound_penalty() {
        let objective = Objective::new(&tracking(), &bounds()).unwrap();
        let inside = State::from_vec(vec![0.8, 0.6, 134.0, 130.0]);
        let hot = State::from_vec(vec![0.8, 0.6, 142.0, 130.0]);
        assert_eq!(objective.bound_cost(&inside), 0.0);
        assert_relative_eq!(objective.bound_cost(&hot), 1e3 * 4.0);
    }

    #[test]
    fn test_unknown_name_rejected() {
        let mut settings = tracking();
        settings.stage_weights.insert("T_X".into(), 1.0);
        assert!(matches!(
            Objective::new(&settings, &bounds()),
            Err(ControlError::InvalidConfig(_))
        ));

        let mut settings = tracking();
        settings.terminal_bounds.insert("T_X".into(), [0.0, 1.0]);
        assert!(matches!(
            Objective::new(&settings, &bounds()),
            Err(ControlError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_terminal_bounds_only_apply_to_terminal_state() {
        let mut settings = tracking();
        settings.terminal_bounds.insert("C_b".into(), [0.55, 0.65]);
        let objective = Objective::new(&settings, &bounds()).unwrap();
        // C_b on the reference but 0.05 short of the terminal set
        let short = State::from_vec(vec![0.8, 0.5, 134.0, 130.0]);
        assert_relative_eq!(objective.stage_cost(&short), 0.01, epsilon = 1e-12);
        assert_relative_eq!(
            objective.terminal_cost(&short),
            0.01 + 1e3 * 0.05f64.powi(2),
            epsilon = 1e-9
        );

        // states without a terminal entry keep their regular bounds
        let hot = State::from_vec(vec![0.8, 0.6, 142.0, 130.0]);
        assert_relative_eq!(objective.terminal_cost(&hot), 1e3 * 4.0, epsilon = 1e-9);
    }

    #[test]
    fn test_terminal_state_unconstrained_without_terminal_bounds() {
        let settings = ObjectiveSettings {
            use_terminal_bounds: false,
            ..tracking()
        };
        let objective = Objective::new(&settings, &bounds()).unwrap();
        let hot = State::from_vec(vec![0.8, 0.6, 142.0, 130.0]);
        assert_eq!(objective.terminal_cost(&hot), 0.0);
        assert_relative_eq!(objective.stage_cost(&hot), 1e3 * 4.0);
    }
}
