use ampc_core::{
    check_dimension, check_state, settings::SimulatorSettings, ControlError, Input, Observation,
    State,
};
use ampc_model::{advance, Model};

/// A plant that keeps its own true state and reports an observation after each step.
pub trait Plant {
    /// Resets the true state. Must be called before the first [`Plant::step`].
    fn set_initial_state(&mut self, state: &State) -> Result<(), ControlError>;

    /// Applies `input` for one step and returns the resulting observation.
    fn step(&mut self, input: &Input) -> Result<Observation, ControlError>;
}

impl<P: Plant + ?Sized> Plant for Box<P> {
    fn set_initial_state(&mut self, state: &State) -> Result<(), ControlError> {
        (**self).set_initial_state(state)
    }

    fn step(&mut self, input: &Input) -> Result<Observation, ControlError> {
        (**self).step(input)
    }
}

impl<P: Plant + ?Sized> Plant for &mut P {
    fn set_initial_state(&mut self, state: &State) -> Result<(), ControlError> {
        (**self).set_initial_state(state)
    }

    fn step(&mut self, input: &Input) -> Result<Observation, ControlError> {
        (**self).step(input)
    }
}

/// Integrates a [`Model`] under zero-order-hold inputs and observes the full state.
pub struct Simulator<M> {
    model: M,
    settings: SimulatorSettings,
    state: Option<State>,
    time: f64,
    n_steps: usize,
}

impl<M: Model> Simulator<M> {
    pub fn new(model: M, settings: SimulatorSettings) -> Result<Self, ControlError> {
        settings.validate()?;
        Ok(Self {
            model,
            settings,
            state: None,
            time: 0.0,
            n_steps: 0,
        })
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn settings(&self) -> &SimulatorSettings {
        &self.settings
    }

    /// The true state, if the simulator was initialized.
    pub fn state(&self) -> Option<&State> {
        self.state.as_ref()
    }

    /// Simulated time since the last initialization.
    pub fn time(&self) -> f64 {
        self.time
    }
}

impl<M: Model> Plant for Simulator<M> {
    fn set_initial_state(&mut self, state: &State) -> Result<(), ControlError> {
        check_state(state, self.model.dimensions().0)?;
        self.state = Some(state.clone());
        self.time = 0.0;
        self.n_steps = 0;
        Ok(())
    }

    fn step(&mut self, input: &Input) -> Result<Observation, ControlError> {
        let state = self.state.as_ref().ok_or_else(|| {
            ControlError::InvalidState("simulator stepped before an initial state was set".into())
        })?;
        check_dimension("simulator input", input, self.model.dimensions().1)?;
        if input.iter().any(|v| !v.is_finite()) {
            return Err(ControlError::InvalidState(format!(
                "non-finite input {:?} applied to the simulator",
                input.as_slice()
            )));
        }

        let next = advance(
            &self.model,
            state,
            input,
            self.settings.t_step,
            self.settings.substeps,
        );
        if next.iter().any(|v| !v.is_finite()) {
            return Err(ControlError::InvalidState(format!(
                "simulation diverged at step {} (t = {})",
                self.n_steps, self.time
            )));
        }

        self.time += self.settings.t_step;
        self.n_steps += 1;
        log::trace!("sim step {} t={:.4} x={:?}", self.n_steps, self.time, next.as_slice());
        self.state = Some(next.clone());
        Ok(next)
    }
}
