use ampc_core::{check_dimension, check_state, Bounds, ControlError, Input, State};

/// A controller mapping a state estimate to a control input, with optional clipping to
/// the input bounds.
///
/// Implementors provide [`BoundedPolicy::compute`]; callers use
/// [`BoundedPolicy::evaluate`], which validates the state and applies the clamp as a
/// separate post-processing step. The closed loop only ever sees this trait, so the
/// optimization-based and approximate controllers are interchangeable.
pub trait BoundedPolicy {
    /// `(n_states, n_inputs)` the policy was built for.
    fn dimensions(&self) -> (usize, usize);

    /// The bounds table clipping is done against.
    fn bounds(&self) -> &Bounds;

    /// Raw, unclipped input for a validated state.
    fn compute(&mut self, state: &State) -> Result<Input, ControlError>;

    /// Forgets any warm-start information.
    fn reset(&mut self) {}

    fn evaluate(&mut self, state: &State, clip_to_bounds: bool) -> Result<Input, ControlError> {
        let (n_states, n_inputs) = self.dimensions();
        check_state(state, n_states)?;
        let raw = self.compute(state)?;
        check_dimension("policy output", &raw, n_inputs)?;
        if clip_to_bounds {
            self.bounds().clamp_input(&raw)
        } else {
            Ok(raw)
        }
    }
}

impl<P: BoundedPolicy + ?Sized> BoundedPolicy for Box<P> {
    fn dimensions(&self) -> (usize, usize) {
        (**self).dimensions()
    }

    fn bounds(&self) -> &Bounds {
        (**self).bounds()
    }

    fn compute(&mut self, state: &State) -> Result<Input, ControlError> {
        (**self).compute(state)
    }

    fn reset(&mut self) {
        (**self).reset()
    }

    fn evaluate(&mut self, state: &State, clip_to_bounds: bool) -> Result<Input, ControlError> {
        (**self).evaluate(state, clip_to_bounds)
    }
}

impl<P: BoundedPolicy + ?Sized> BoundedPolicy for &mut P {
    fn dimensions(&self) -> (usize, usize) {
        (**self).dimensions()
    }

    fn bounds(&self) -> &Bounds {
        (**self).bounds()
    }

    fn compute(&mut self, state: &State) -> Result<Input, ControlError> {
        (**self).compute(state)
    }

    fn reset(&mut self) {
        (**self).reset()
    }

    fn evaluate(&mut self, state: &State, clip_to_bounds: bool) -> Result<Input, ControlError> {
        (**self).evaluate(state, clip_to_bounds)
    }
}

/// Checks that a bounds table was built for the given dimensions.
pub(crate) fn check_bounds(
    bounds: &Bounds,
    n_states: usize,
    n_inputs: usize,
) -> Result<(), ControlError> {
    let vars = bounds.variables();
    if vars.n_states() != n_states || vars.n_inputs() != n_inputs {
        return Err(ControlError::config(format!(
            "bounds describe {} states and {} inputs, policy has {} and {}",
            vars.n_states(),
            vars.n_inputs(),
            n_states,
            n_inputs
        )));
    }
    Ok(())
}
