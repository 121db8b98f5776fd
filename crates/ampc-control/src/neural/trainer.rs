use ampc_core::{
    settings::{SchedulerSettings, TrainerSettings},
    Bounds, ControlError,
};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use super::{network::slope, ApproxParameters, Dataset, Network, Scaling};

const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const EPS: f64 = 1e-8;

/// Loss and learning rate of every epoch.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub loss: Vec<f64>,
    pub learning_rate: Vec<f64>,
}

impl TrainingHistory {
    pub fn final_loss(&self) -> Option<f64> {
        self.loss.last().copied()
    }

    pub fn epochs(&self) -> usize {
        self.loss.len()
    }
}

/// Multiplies the learning rate by `factor` once the loss stopped improving for more
/// than `patience` epochs.
#[derive(Clone, Debug)]
pub struct PlateauScheduler {
    settings: SchedulerSettings,
    best: f64,
    bad_epochs: usize,
}

impl PlateauScheduler {
    pub fn new(settings: SchedulerSettings) -> Self {
        Self {
            settings,
            best: f64::INFINITY,
            bad_epochs: 0,
        }
    }

    /// Returns the learning rate for the next epoch.
    pub fn step(&mut self, loss: f64, learning_rate: f64) -> f64 {
        if loss < self.best * (1.0 - self.settings.threshold) {
            self.best = loss;
            self.bad_epochs = 0;
            return learning_rate;
        }
        self.bad_epochs += 1;
        if self.bad_epochs <= self.settings.patience {
            return learning_rate;
        }
        self.bad_epochs = 0;
        let reduced = (learning_rate * self.settings.factor).max(self.settings.min_lr);
        if reduced < learning_rate {
            log::warn!(
                "loss plateaued at {:.6e}, reducing learning rate to {:.3e}",
                self.best,
                reduced
            );
        }
        reduced
    }
}

/// First and second moment estimates of one layer.
struct Moments {
    m_w: DMatrix<f64>,
    v_w: DMatrix<f64>,
    m_b: DVector<f64>,
    v_b: DVector<f64>,
}

fn adam_update(
    params: &mut [f64],
    grads: &[f64],
    m: &mut [f64],
    v: &mut [f64],
    learning_rate: f64,
    t: i32,
) {
    let correction1 = 1.0 - BETA1.powi(t);
    let correction2 = 1.0 - BETA2.powi(t);
    for i in 0..params.len() {
        m[i] = BETA1 * m[i] + (1.0 - BETA1) * grads[i];
        v[i] = BETA2 * v[i] + (1.0 - BETA2) * grads[i] * grads[i];
        let m_hat = m[i] / correction1;
        let v_hat = v[i] / correction2;
        params[i] -= learning_rate * m_hat / (v_hat.sqrt() + EPS);
    }
}

/// Full-batch mean-squared-error training with Adam.
#[derive(Clone, Debug)]
pub struct Trainer {
    settings: TrainerSettings,
}

impl Trainer {
    pub fn new(settings: TrainerSettings) -> Result<Self, ControlError> {
        settings.validate()?;
        Ok(Self { settings })
    }

    pub fn settings(&self) -> &TrainerSettings {
        &self.settings
    }

    /// Fits a freshly initialized network to `dataset`, scaled with `bounds`.
    pub fn train(
        &self,
        dataset: &Dataset,
        bounds: &Bounds,
    ) -> Result<(ApproxParameters, TrainingHistory), ControlError> {
        let vars = bounds.variables();
        dataset.validate(vars.n_states(), vars.n_inputs())?;
        let scaling = Scaling::from_bounds(bounds);

        let (states, inputs) = dataset.matrices();
        let x = scale_columns(&states, |c| scaling.state.scale(c));
        let y = scale_columns(&inputs, |c| scaling.input.scale(c));

        let mut network = Network::random(
            vars.n_states(),
            vars.n_inputs(),
            self.settings.hidden_layers,
            self.settings.neurons,
            self.settings.activation,
            self.settings.seed,
        );
        log::info!(
            "training on {} samples: {} hidden layers of {} {:?} neurons, {} epochs",
            dataset.len(),
            self.settings.hidden_layers,
            self.settings.neurons,
            self.settings.activation,
            self.settings.epochs
        );
        let history = self.fit(&mut network, &x, &y)?;
        if let Some(loss) = history.final_loss() {
            log::info!("training finished with loss {:.6e}", loss);
        }

        let parameters = ApproxParameters {
            state_names: vars.state_names().to_vec(),
            input_names: vars.input_names().to_vec(),
            scaling,
            network,
        };
        Ok((parameters, history))
    }

    /// Trains `network` on column-wise, already scaled data.
    pub fn fit(
        &self,
        network: &mut Network,
        x: &DMatrix<f64>,
        y: &DMatrix<f64>,
    ) -> Result<TrainingHistory, ControlError> {
        if x.ncols() != y.ncols() || x.ncols() == 0 {
            return Err(ControlError::config(format!(
                "expected the same non-zero number of inputs and targets, got {} and {}",
                x.ncols(),
                y.ncols()
            )));
        }
        if x.nrows() != network.n_inputs() || y.nrows() != network.n_outputs() {
            return Err(ControlError::DimensionMismatch {
                context: "training data",
                expected: network.n_inputs() + network.n_outputs(),
                actual: x.nrows() + y.nrows(),
            });
        }

        let mut moments: Vec<Moments> = network
            .layers()
            .iter()
            .map(|l| Moments {
                m_w: DMatrix::zeros(l.weights.nrows(), l.weights.ncols()),
                v_w: DMatrix::zeros(l.weights.nrows(), l.weights.ncols()),
                m_b: DVector::zeros(l.bias.len()),
                v_b: DVector::zeros(l.bias.len()),
            })
            .collect();
        let mut scheduler = self.settings.scheduler.clone().map(PlateauScheduler::new);
        let mut learning_rate = self.settings.learning_rate;
        let mut history = TrainingHistory::default();
        let normalizer = (y.nrows() * y.ncols()) as f64;

        for epoch in 0..self.settings.epochs {
            let activations = network.activations(x);
            let output = &activations[activations.len() - 1];
            let error = output - y;
            let loss = error.norm_squared() / normalizer;
            if !loss.is_finite() {
                return Err(ControlError::TrainingDiverged { epoch });
            }
            history.loss.push(loss);
            history.learning_rate.push(learning_rate);

            let mut grad_output = error * (2.0 / normalizer);
            let t = (epoch + 1) as i32;
            for (l, layer) in network.layers_mut().iter_mut().enumerate().rev() {
                let out = &activations[l + 1];
                let grad_z = grad_output.zip_map(out, |g, a| g * slope(layer.activation, a));
                let grad_w = &grad_z * activations[l].transpose();
                let grad_b = grad_z.column_sum();
                grad_output = layer.weights.transpose() * &grad_z;

                let state = &mut moments[l];
                adam_update(
                    layer.weights.as_mut_slice(),
                    grad_w.as_slice(),
                    state.m_w.as_mut_slice(),
                    state.v_w.as_mut_slice(),
                    learning_rate,
                    t,
                );
                adam_update(
                    layer.bias.as_mut_slice(),
                    grad_b.as_slice(),
                    state.m_b.as_mut_slice(),
                    state.v_b.as_mut_slice(),
                    learning_rate,
                    t,
                );
            }

            if let Some(scheduler) = scheduler.as_mut() {
                learning_rate = scheduler.step(loss, learning_rate);
            }
            if epoch % 100 == 0 {
                log::debug!("epoch {}: loss {:.6e}, lr {:.3e}", epoch, loss, learning_rate);
            }
        }
        Ok(history)
    }
}

fn scale_columns(data: &DMatrix<f64>, f: impl Fn(&DVector<f64>) -> DVector<f64>) -> DMatrix<f64> {
    let columns: Vec<DVector<f64>> = data
        .column_iter()
        .map(|c| f(&c.into_owned()))
        .collect();
    DMatrix::from_columns(&columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ampc_core::{settings::Activation, Input, State, VarClass, Variables};

    fn line_data() -> (DMatrix<f64>, DMatrix<f64>) {
        let x: Vec<f64> = (0..40).map(|i| i as f64 / 39.0).collect();
        let y: Vec<f64> = x.iter().map(|v| 0.5 * v + 0.2).collect();
        (
            DMatrix::from_row_slice(1, 40, &x),
            DMatrix::from_row_slice(1, 40, &y),
        )
    }

    #[test]
    fn test_fit_reduces_loss() {
        let (x, y) = line_data();
        let trainer = Trainer::new(TrainerSettings {
            epochs: 300,
            neurons: 8,
            scheduler: None,
            ..Default::default()
        })
        .unwrap();
        let mut network = Network::random(1, 1, 1, 8, Activation::Tanh, 0);
        let history = trainer.fit(&mut network, &x, &y).unwrap();
        assert_eq!(history.epochs(), 300);
        assert!(history.final_loss().unwrap() < history.loss[0] * 0.1);
        assert!(history.learning_rate.iter().all(|lr| *lr == 1e-2));
    }

    #[test]
    fn test_divergence_is_reported() {
        let (x, y) = line_data();
        let trainer = Trainer::new(TrainerSettings {
            epochs: 10,
            learning_rate: 1e300,
            activation: Activation::Linear,
            scheduler: None,
            ..Default::default()
        })
        .unwrap();
        let mut network = Network::random(1, 1, 1, 4, Activation::Linear, 0);
        assert!(matches!(
            trainer.fit(&mut network, &x, &y),
            Err(ControlError::TrainingDiverged { .. })
        ));
    }

    #[test]
    fn test_scheduler_decays_after_patience() {
        let mut scheduler = PlateauScheduler::new(SchedulerSettings {
            factor: 0.5,
            patience: 2,
            threshold: 0.0,
            min_lr: 0.1,
        });
        let mut lr = 1.0;
        lr = scheduler.step(1.0, lr);
        assert_eq!(lr, 1.0);
        for _ in 0..2 {
            lr = scheduler.step(1.0, lr);
            assert_eq!(lr, 1.0);
        }
        lr = scheduler.step(1.0, lr);
        assert_eq!(lr, 0.5);
        for _ in 0..6 {
            lr = scheduler.step(1.0, lr);
        }
        assert_eq!(lr, 0.125);
        for _ in 0..20 {
            lr = scheduler.step(1.0, lr);
        }
        assert_eq!(lr, 0.1);
    }

    #[test]
    fn test_train_from_dataset() {
        let vars = Variables::new(["x"], ["u"]).unwrap();
        let bounds = Bounds::builder(vars)
            .state("x", 0.0, 2.0)
            .input("u", -1.0, 1.0)
            .build()
            .unwrap();
        let mut dataset = Dataset::new();
        for i in 0..20 {
            let x = i as f64 / 10.0;
            dataset.push(State::from_vec(vec![x]), Input::from_vec(vec![1.0 - x]));
        }
        let trainer = Trainer::new(TrainerSettings {
            epochs: 50,
            neurons: 4,
            ..Default::default()
        })
        .unwrap();
        let (parameters, history) = trainer.train(&dataset, &bounds).unwrap();
        assert_eq!(history.epochs(), 50);
        assert_eq!(parameters.state_names, bounds.variables().names(VarClass::State));
        assert_eq!(parameters.scaling.input.offset, vec![-1.0]);
    }
}
