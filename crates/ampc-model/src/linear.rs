use ampc_core::{check_state, ControlError, Input, State, Variables};
use nalgebra::DMatrix;

use crate::{check_model_dimensions, Model, ModelKind};

/// A linear model `rhs(x, u) = A x + B u`, either as an ODE or a difference equation.
///
/// When obtained from [`linearize`], `x` and `u` are deviations from the operating point.
#[derive(Clone, Debug, PartialEq)]
pub struct LinearModel {
    variables: Variables,
    kind: ModelKind,
    a: DMatrix<f64>,
    b: DMatrix<f64>,
}

impl LinearModel {
    pub fn new(
        variables: Variables,
        kind: ModelKind,
        a: DMatrix<f64>,
        b: DMatrix<f64>,
    ) -> Result<Self, ControlError> {
        let n_x = variables.n_states();
        let n_u = variables.n_inputs();
        if a.shape() != (n_x, n_x) || b.shape() != (n_x, n_u) {
            return Err(ControlError::Model(format!(
                "expected A {}x{} and B {}x{}, got A {:?} and B {:?}",
                n_x,
                n_x,
                n_x,
                n_u,
                a.shape(),
                b.shape()
            )));
        }
        if a.iter().chain(b.iter()).any(|v| !v.is_finite()) {
            return Err(ControlError::Model("system matrices must be finite".into()));
        }
        Ok(Self {
            variables,
            kind,
            a,
            b,
        })
    }

    pub fn a(&self) -> &DMatrix<f64> {
        &self.a
    }

    pub fn b(&self) -> &DMatrix<f64> {
        &self.b
    }

    /// Zero-order-hold discretization with sampling time `t_sample`.
    ///
    /// Uses the exponential of the augmented matrix `[[A, B], [0, 0]] * t_sample`, whose
    /// upper blocks are the discrete `A_d` and `B_d`.
    pub fn discretize(&self, t_sample: f64) -> Result<LinearModel, ControlError> {
        if self.kind == ModelKind::Discrete {
            return Err(ControlError::Model("model is already discrete".into()));
        }
        if !(t_sample.is_finite() && t_sample > 0.0) {
            return Err(ControlError::config(format!(
                "t_sample must be positive, got {}",
                t_sample
            )));
        }
        log::debug!("discretizing linear model with t_sample = {}", t_sample);

        let (n_x, n_u) = self.b.shape();
        let mut augmented = DMatrix::zeros(n_x + n_u, n_x + n_u);
        augmented.view_mut((0, 0), (n_x, n_x)).copy_from(&self.a);
        augmented.view_mut((0, n_x), (n_x, n_u)).copy_from(&self.b);
        let exp = (augmented * t_sample).exp();

        LinearModel::new(
            self.variables.clone(),
            ModelKind::Discrete,
            exp.view((0, 0), (n_x, n_x)).into_owned(),
            exp.view((0, n_x), (n_x, n_u)).into_owned(),
        )
    }

    /// Steady state reached under a constant input: `x_ss = (I - A)^-1 B u_ss`.
    pub fn steady_state(&self, u_ss: &Input) -> Result<State, ControlError> {
        self.require_discrete()?;
        let n_x = self.a.nrows();
        let inverse = (DMatrix::identity(n_x, n_x) - &self.a)
            .try_inverse()
            .ok_or_else(|| ControlError::Model("I - A is singular".into()))?;
        Ok(inverse * &self.b * u_ss)
    }

    /// Input holding a given state: `u_ss = B^+ (I - A) x_ss`.
    ///
    /// The pseudo-inverse gives the least-squares input when `B` is not square.
    pub fn steady_state_input(&self, x_ss: &State) -> Result<Input, ControlError> {
        self.require_discrete()?;
        let n_x = self.a.nrows();
        let b_pinv = self
            .b
            .clone()
            .pseudo_inverse(1e-12)
            .map_err(|e| ControlError::Model(e.to_string()))?;
        Ok(b_pinv * (DMatrix::identity(n_x, n_x) - &self.a) * x_ss)
    }

    fn require_discrete(&self) -> Result<(), ControlError> {
        if self.kind != ModelKind::Discrete {
            return Err(ControlError::Model(
                "steady states are computed on the discretized model".into(),
            ));
        }
        Ok(())
    }
}

impl Model for LinearModel {
    fn kind(&self) -> ModelKind {
        self.kind
    }

    fn variables(&self) -> &Variables {
        &self.variables
    }

    fn rhs(&self, state: &State, input: &Input) -> State {
        &self.a * state + &self.b * input
    }
}

/// Linearizes `model` around `(x_op, u_op)` by central finite differences.
///
/// The result keeps the model's kind and describes deviations from the operating point.
pub fn linearize<M: Model + ?Sized>(
    model: &M,
    x_op: &State,
    u_op: &Input,
) -> Result<LinearModel, ControlError> {
    check_model_dimensions(model, x_op, u_op)?;
    let (n_x, n_u) = model.dimensions();
    check_state(x_op, n_x)?;

    let mut a = DMatrix::zeros(n_x, n_x);
    for j in 0..n_x {
        let h = step_size(x_op[j]);
        let mut plus = x_op.clone();
        let mut minus = x_op.clone();
        plus[j] += h;
        minus[j] -= h;
        let column = (model.rhs(&plus, u_op) - model.rhs(&minus, u_op)) / (2.0 * h);
        a.set_column(j, &column);
    }

    let mut b = DMatrix::zeros(n_x, n_u);
    for j in 0..n_u {
        let h = step_size(u_op[j]);
        let mut plus = u_op.clone();
        let mut minus = u_op.clone();
        plus[j] += h;
        minus[j] -= h;
        let column = (model.rhs(x_op, &plus) - model.rhs(x_op, &minus)) / (2.0 * h);
        b.set_column(j, &column);
    }

    LinearModel::new(model.variables().clone(), model.kind(), a, b)
}

fn step_size(value: f64) -> f64 {
    1e-6 * value.abs().max(1.0)
}
