use ampc_core::{Input, State};

use crate::{Model, ModelKind};

/// One classic Runge-Kutta step of length `dt` with the input held constant.
pub fn rk4_step<M: Model + ?Sized>(model: &M, state: &State, input: &Input, dt: f64) -> State {
    let k1 = model.rhs(state, input);
    let k2 = model.rhs(&(state + &k1 * (dt / 2.0)), input);
    let k3 = model.rhs(&(state + &k2 * (dt / 2.0)), input);
    let k4 = model.rhs(&(state + &k3 * dt), input);
    state + (k1 + k2 * 2.0 + k3 * 2.0 + k4) * (dt / 6.0)
}

/// Advances `state` by one step of length `t_step` under a zero-order-hold input.
///
/// Continuous models are integrated with `substeps` RK4 steps; discrete models are
/// evaluated once and `t_step` is ignored.
pub fn advance<M: Model + ?Sized>(
    model: &M,
    state: &State,
    input: &Input,
    t_step: f64,
    substeps: usize,
) -> State {
    match model.kind() {
        ModelKind::Discrete => model.rhs(state, input),
        ModelKind::Continuous => {
            let substeps = substeps.max(1);
            let dt = t_step / substeps as f64;
            let mut x = state.clone();
            for _ in 0..substeps {
                x = rk4_step(model, &x, input, dt);
            }
            x
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ampc_core::Variables;
    use approx::assert_relative_eq;

    struct Exponential {
        vars: Variables,
        kind: ModelKind,
    }

    impl Model for Exponential {
        fn kind(&self) -> ModelKind {
            self.kind
        }

        fn variables(&self) -> &Variables {
            &self.vars
        }

        fn rhs(&self, state: &State, input: &Input) -> State {
            match self.kind {
                ModelKind::Continuous => State::from_vec(vec![-state[0] + input[0]]),
                ModelKind::Discrete => State::from_vec(vec![0.5 * state[0] + input[0]]),
            }
        }
    }

    fn model(kind: ModelKind) -> Exponential {
        Exponential {
            vars: Variables::new(["x"], ["u"]).unwrap(),
            kind,
        }
    }

    #[test]
    fn test_rk4_matches_exact_solution() {
        let m = model(ModelKind::Continuous);
        let x = advance(&m, &State::from_vec(vec![1.0]), &Input::zeros(1), 1.0, 20);
        assert_relative_eq!(x[0], (-1.0f64).exp(), epsilon = 1e-8);
    }

    #[test]
    fn test_constant_input_steady_state() {
        let m = model(ModelKind::Continuous);
        let x = advance(
            &m,
            &State::from_vec(vec![3.0]),
            &Input::from_vec(vec![3.0]),
            0.1,
            1,
        );
        assert_relative_eq!(x[0], 3.0);
    }

    #[test]
    fn test_discrete_model_ignores_step_length() {
        let m = model(ModelKind::Discrete);
        let x = advance(
            &m,
            &State::from_vec(vec![2.0]),
            &Input::from_vec(vec![1.0]),
            123.0,
            7,
        );
        assert_eq!(x[0], 2.0);
    }
}
