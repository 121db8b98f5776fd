use std::{collections::BTreeMap, sync::Arc};

use ampc_core::{
    settings::{LqrMode, LqrSettings},
    Bounds, ControlError, Input, State, VarClass, Variables,
};
use ampc_model::{linearize, LinearModel, Model, ModelKind};
use nalgebra::{DMatrix, DVector};

use crate::{objective::by_name, policy::check_bounds, BoundedPolicy};

fn diagonal(
    vars: &Variables,
    class: VarClass,
    field: &str,
    map: &BTreeMap<String, f64>,
) -> Result<DMatrix<f64>, ControlError> {
    Ok(DMatrix::from_diagonal(&by_name(vars, class, field, map, 0.0)?))
}

/// A vector that names every variable of `class`.
fn complete(
    vars: &Variables,
    class: VarClass,
    field: &str,
    map: &BTreeMap<String, f64>,
) -> Result<DVector<f64>, ControlError> {
    if let Some(missing) = vars.names(class).iter().find(|n| !map.contains_key(*n)) {
        return Err(ControlError::config(format!(
            "{} is missing {} {:?}",
            field, class, missing
        )));
    }
    by_name(vars, class, field, map, 0.0)
}

fn gain_step(
    a: &DMatrix<f64>,
    b: &DMatrix<f64>,
    q: &DMatrix<f64>,
    r: &DMatrix<f64>,
    p: &DMatrix<f64>,
) -> Result<(DMatrix<f64>, DMatrix<f64>), ControlError> {
    let bt_p = b.transpose() * p;
    let inverse = (&bt_p * b + r)
        .try_inverse()
        .ok_or_else(|| ControlError::Solver("B'PB + R is singular".into()))?;
    let k = -(&inverse * &bt_p * a);
    let at_p = a.transpose() * p;
    let next = q + &at_p * a - &at_p * b * &inverse * &bt_p * a;
    Ok((k, next))
}

/// Gain of the finite-horizon problem with terminal weight `p`, for the first step.
pub fn finite_horizon_gain(
    a: &DMatrix<f64>,
    b: &DMatrix<f64>,
    q: &DMatrix<f64>,
    r: &DMatrix<f64>,
    p: &DMatrix<f64>,
    n_horizon: usize,
) -> Result<DMatrix<f64>, ControlError> {
    let mut pi = p.clone();
    let mut k = DMatrix::zeros(b.ncols(), a.ncols());
    for _ in 0..n_horizon {
        let (gain, next) = gain_step(a, b, q, r, &pi)?;
        k = gain;
        pi = next;
    }
    Ok(k)
}

/// Stabilizing solution of the discrete algebraic Riccati equation
/// `P = Q + A'PA - A'PB (R + B'PB)^-1 B'PA`, by the structured doubling algorithm.
pub fn solve_dare(
    a: &DMatrix<f64>,
    b: &DMatrix<f64>,
    q: &DMatrix<f64>,
    r: &DMatrix<f64>,
    max_iterations: usize,
    tolerance: f64,
) -> Result<DMatrix<f64>, ControlError> {
    let n = a.nrows();
    let r_inv = r
        .clone()
        .try_inverse()
        .ok_or_else(|| ControlError::Solver("R must be positive definite".into()))?;

    let mut a_k = a.clone();
    let mut g_k = b * r_inv * b.transpose();
    let mut h_k = q.clone();
    for iteration in 0..max_iterations {
        let w = (DMatrix::identity(n, n) + &g_k * &h_k)
            .try_inverse()
            .ok_or_else(|| ControlError::Solver("I + GH is singular".into()))?;
        let a_w = &a_k * &w;
        let g_next = &g_k + &a_w * &g_k * a_k.transpose();
        let h_next = &h_k + a_k.transpose() * &h_k * &w * &a_k;
        let a_next = &a_w * &a_k;

        let change = (&h_next - &h_k).norm();
        let scale = h_next.norm().max(1.0);
        if !change.is_finite() {
            return Err(ControlError::Solver(format!(
                "riccati iteration diverged after {} iterations",
                iteration
            )));
        }
        a_k = a_next;
        g_k = g_next;
        h_k = h_next;
        if change <= tolerance * scale {
            log::debug!("riccati iteration converged after {} iterations", iteration + 1);
            return Ok(h_k);
        }
    }
    Err(ControlError::Solver(format!(
        "riccati iteration did not converge in {} iterations",
        max_iterations
    )))
}

/// Infinite-horizon gain `K = -(B'PB + R)^-1 B'PA`.
pub fn infinite_horizon_gain(
    a: &DMatrix<f64>,
    b: &DMatrix<f64>,
    q: &DMatrix<f64>,
    r: &DMatrix<f64>,
    max_iterations: usize,
    tolerance: f64,
) -> Result<DMatrix<f64>, ControlError> {
    let p = solve_dare(a, b, q, r, max_iterations, tolerance)?;
    Ok(gain_step(a, b, q, r, &p)?.0)
}

/// Linear-quadratic regulator around an operating point.
///
/// The model is linearized at the operating point and discretized with the sampling
/// time of the settings. In [`LqrMode::SetPointTrack`] the input is
/// `u = K (x - x_ss) + u_ss`. In [`LqrMode::InputRatePenalization`] the gain is computed
/// for the system augmented with the previous input and the policy returns
/// `u = u_prev + K [x - x_ss; u_prev - u_ss]`, where `u_prev` is its previous output.
pub struct LqrPolicy {
    bounds: Arc<Bounds>,
    settings: LqrSettings,
    model: LinearModel,
    x_op: State,
    u_op: Input,
    gain: DMatrix<f64>,
    x_ss: State,
    u_ss: Input,
    previous_input: Option<Input>,
}

impl LqrPolicy {
    /// Linearizes `model` at the operating point of `settings`.
    pub fn new<M: Model + ?Sized>(
        model: &M,
        bounds: Arc<Bounds>,
        settings: LqrSettings,
    ) -> Result<Self, ControlError> {
        settings.validate()?;
        let vars = model.variables();
        let x_op = complete(vars, VarClass::State, "operating_state", &settings.operating_state)?;
        let u_op = complete(vars, VarClass::Input, "operating_input", &settings.operating_input)?;
        let linear = linearize(model, &x_op, &u_op)?;
        Self::from_linear(linear, x_op, u_op, bounds, settings)
    }

    /// Builds the regulator from a model already linearized at `(x_op, u_op)`.
    pub fn from_linear(
        linear: LinearModel,
        x_op: State,
        u_op: Input,
        bounds: Arc<Bounds>,
        settings: LqrSettings,
    ) -> Result<Self, ControlError> {
        settings.validate()?;
        let (n_x, n_u) = linear.dimensions();
        check_bounds(&bounds, n_x, n_u)?;
        ampc_core::check_dimension("operating state", &x_op, n_x)?;
        ampc_core::check_dimension("operating input", &u_op, n_u)?;

        let model = match linear.kind() {
            ModelKind::Continuous => linear.discretize(settings.t_sample)?,
            ModelKind::Discrete => linear,
        };
        let gain = Self::compute_gain(&model, &settings)?;
        log::info!(
            "lqr gain computed ({:?}, horizon {})",
            settings.mode,
            settings.n_horizon
        );
        Ok(Self {
            bounds,
            settings,
            model,
            x_ss: x_op.clone(),
            u_ss: u_op.clone(),
            x_op,
            u_op,
            gain,
            previous_input: None,
        })
    }

    fn compute_gain(model: &LinearModel, settings: &LqrSettings) -> Result<DMatrix<f64>, ControlError> {
        let vars = model.variables();
        let q = diagonal(vars, VarClass::State, "q", &settings.q)?;
        let r = diagonal(vars, VarClass::Input, "r", &settings.r)?;
        let p = if settings.p.is_empty() {
            q.clone()
        } else {
            diagonal(vars, VarClass::State, "p", &settings.p)?
        };

        let (a, b, q, r, p) = match settings.mode {
            LqrMode::SetPointTrack => (model.a().clone(), model.b().clone(), q, r, p),
            LqrMode::InputRatePenalization => {
                let r_delta = diagonal(vars, VarClass::Input, "r_delta", &settings.r_delta)?;
                let (n, m) = model.b().shape();
                let mut a = DMatrix::zeros(n + m, n + m);
                a.view_mut((0, 0), (n, n)).copy_from(model.a());
                a.view_mut((0, n), (n, m)).copy_from(model.b());
                a.view_mut((n, n), (m, m)).fill_with_identity();
                let mut b = DMatrix::zeros(n + m, m);
                b.view_mut((0, 0), (n, m)).copy_from(model.b());
                b.view_mut((n, 0), (m, m)).fill_with_identity();
                (a, b, block_diagonal(&q, &r), r_delta, block_diagonal(&p, &r))
            }
        };

        if settings.n_horizon == 0 {
            infinite_horizon_gain(&a, &b, &q, &r, settings.max_iterations, settings.tolerance)
        } else {
            finite_horizon_gain(&a, &b, &q, &r, &p, settings.n_horizon)
        }
    }

    pub fn gain(&self) -> &DMatrix<f64> {
        &self.gain
    }

    pub fn settings(&self) -> &LqrSettings {
        &self.settings
    }

    /// The discrete model, in deviations from the operating point.
    pub fn linear_model(&self) -> &LinearModel {
        &self.model
    }

    pub fn operating_point(&self) -> (&State, &Input) {
        (&self.x_op, &self.u_op)
    }

    pub fn set_point(&self) -> (&State, &Input) {
        (&self.x_ss, &self.u_ss)
    }

    /// Sets the tracked steady state. A missing half is completed from the linear model;
    /// with neither given, the operating point is used.
    pub fn set_set_point(
        &mut self,
        x_ss: Option<State>,
        u_ss: Option<Input>,
    ) -> Result<(), ControlError> {
        let (n_x, n_u) = self.model.dimensions();
        let (x_ss, u_ss) = match (x_ss, u_ss) {
            (Some(x), Some(u)) => (x, u),
            (Some(x), None) => {
                ampc_core::check_dimension("set point state", &x, n_x)?;
                let du = self.model.steady_state_input(&(&x - &self.x_op))?;
                (x, &self.u_op + du)
            }
            (None, Some(u)) => {
                ampc_core::check_dimension("set point input", &u, n_u)?;
                let dx = self.model.steady_state(&(&u - &self.u_op))?;
                (&self.x_op + dx, u)
            }
            (None, None) => (self.x_op.clone(), self.u_op.clone()),
        };
        ampc_core::check_dimension("set point state", &x_ss, n_x)?;
        ampc_core::check_dimension("set point input", &u_ss, n_u)?;
        if x_ss.iter().chain(u_ss.iter()).any(|v| !v.is_finite()) {
            return Err(ControlError::config("set point must be finite"));
        }
        self.x_ss = x_ss;
        self.u_ss = u_ss;
        Ok(())
    }
}

fn block_diagonal(top: &DMatrix<f64>, bottom: &DMatrix<f64>) -> DMatrix<f64> {
    let (n, m) = (top.nrows(), bottom.nrows());
    let mut out = DMatrix::zeros(n + m, n + m);
    out.view_mut((0, 0), (n, n)).copy_from(top);
    out.view_mut((n, n), (m, m)).copy_from(bottom);
    out
}

impl BoundedPolicy for LqrPolicy {
    fn dimensions(&self) -> (usize, usize) {
        self.model.dimensions()
    }

    fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    fn compute(&mut self, state: &State) -> Result<Input, ControlError> {
        let dx = state - &self.x_ss;
        let input = match self.settings.mode {
            LqrMode::SetPointTrack => &self.gain * dx + &self.u_ss,
            LqrMode::InputRatePenalization => {
                let previous = self
                    .previous_input
                    .clone()
                    .unwrap_or_else(|| self.u_ss.clone());
                let du_prev = &previous - &self.u_ss;
                let z = DVector::from_iterator(
                    dx.len() + du_prev.len(),
                    dx.iter().chain(du_prev.iter()).copied(),
                );
                previous + &self.gain * z
            }
        };
        self.previous_input = Some(input.clone());
        Ok(input)
    }

    fn reset(&mut self) {
        self.previous_input = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ampc_model::{Cstr, CstrSettings};
    use approx::assert_relative_eq;

    fn scalar(value: f64) -> DMatrix<f64> {
        DMatrix::from_element(1, 1, value)
    }

    #[test]
    fn test_scalar_dare() {
        let p = solve_dare(&scalar(1.0), &scalar(1.0), &scalar(1.0), &scalar(1.0), 100, 1e-12)
            .unwrap();
        let golden = (1.0 + 5f64.sqrt()) / 2.0;
        assert_relative_eq!(p[(0, 0)], golden, epsilon = 1e-9);
        let k = infinite_horizon_gain(&scalar(1.0), &scalar(1.0), &scalar(1.0), &scalar(1.0), 100, 1e-12)
            .unwrap();
        assert_relative_eq!(k[(0, 0)], -golden / (1.0 + golden), epsilon = 1e-9);
    }

    #[test]
    fn test_unstable_system_is_stabilized() {
        let k = infinite_horizon_gain(&scalar(1.2), &scalar(1.0), &scalar(1.0), &scalar(0.1), 100, 1e-12)
            .unwrap();
        assert!((1.2 + k[(0, 0)]).abs() < 1.0);
    }

    #[test]
    fn test_finite_horizon_gain() {
        let one_step =
            finite_horizon_gain(&scalar(1.0), &scalar(1.0), &scalar(1.0), &scalar(1.0), &scalar(1.0), 1)
                .unwrap();
        assert_relative_eq!(one_step[(0, 0)], -0.5);
        let long =
            finite_horizon_gain(&scalar(1.0), &scalar(1.0), &scalar(1.0), &scalar(1.0), &scalar(1.0), 50)
                .unwrap();
        let golden = (1.0 + 5f64.sqrt()) / 2.0;
        assert_relative_eq!(long[(0, 0)], -golden / (1.0 + golden), epsilon = 1e-9);
    }

    #[test]
    fn test_singular_input_weight() {
        assert!(matches!(
            solve_dare(&scalar(1.0), &scalar(1.0), &scalar(1.0), &scalar(0.0), 100, 1e-12),
            Err(ControlError::Solver(_))
        ));
    }

    fn cstr_lqr(mode: LqrMode) -> LqrPolicy {
        let cstr_settings = CstrSettings::default();
        let cstr = Cstr::new(&cstr_settings).unwrap();
        let bounds = Arc::new(cstr.bounds(&cstr_settings).unwrap());
        LqrPolicy::new(
            &cstr,
            bounds,
            LqrSettings {
                mode,
                ..Cstr::lqr_settings()
            },
        )
        .unwrap()
    }

    #[test]
    fn test_set_point_returns_steady_input() {
        for mode in [LqrMode::SetPointTrack, LqrMode::InputRatePenalization] {
            let mut lqr = cstr_lqr(mode);
            let (x_ss, u_ss) = (lqr.set_point().0.clone(), lqr.set_point().1.clone());
            let u = lqr.evaluate(&x_ss, false).unwrap();
            assert_relative_eq!(u, u_ss, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_gain_shapes() {
        assert_eq!(cstr_lqr(LqrMode::SetPointTrack).gain().shape(), (2, 4));
        assert_eq!(cstr_lqr(LqrMode::InputRatePenalization).gain().shape(), (2, 6));
    }

    #[test]
    fn test_set_point_from_input() {
        let mut lqr = cstr_lqr(LqrMode::SetPointTrack);
        let (_, u_op) = lqr.operating_point();
        let u_op = u_op.clone();
        lqr.set_set_point(None, Some(u_op.clone())).unwrap();
        let (x_ss, u_ss) = lqr.set_point();
        assert_eq!(u_ss, &u_op);
        assert!(x_ss.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_missing_operating_state() {
        let cstr_settings = CstrSettings::default();
        let cstr = Cstr::new(&cstr_settings).unwrap();
        let bounds = Arc::new(cstr.bounds(&cstr_settings).unwrap());
        let mut settings = Cstr::lqr_settings();
        settings.operating_state.remove("T_K");
        assert!(matches!(
            LqrPolicy::new(&cstr, bounds, settings),
            Err(ControlError::InvalidConfig(_))
        ));
    }
}
