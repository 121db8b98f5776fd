use ampc_core::{check_dimension, ControlError, Input, State};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// A state and the input the reference controller chose for it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub state: State,
    pub input: Input,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub samples: Vec<Sample>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, state: State, input: Input) {
        self.samples.push(Sample { state, input });
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Checks that all samples have the given dimensions and finite entries.
    pub fn validate(&self, n_states: usize, n_inputs: usize) -> Result<(), ControlError> {
        if self.samples.is_empty() {
            return Err(ControlError::config("dataset is empty"));
        }
        for (i, sample) in self.samples.iter().enumerate() {
            check_dimension("sample state", &sample.state, n_states)?;
            check_dimension("sample input", &sample.input, n_inputs)?;
            if sample
                .state
                .iter()
                .chain(sample.input.iter())
                .any(|v| !v.is_finite())
            {
                return Err(ControlError::config(format!("sample {} is not finite", i)));
            }
        }
        Ok(())
    }

    /// States and inputs as column-wise matrices.
    pub(crate) fn matrices(&self) -> (DMatrix<f64>, DMatrix<f64>) {
        let states: Vec<_> = self.samples.iter().map(|s| s.state.clone()).collect();
        let inputs: Vec<_> = self.samples.iter().map(|s| s.input.clone()).collect();
        (DMatrix::from_columns(&states), DMatrix::from_columns(&inputs))
    }
}

impl Extend<Sample> for Dataset {
    fn extend<T: IntoIterator<Item = Sample>>(&mut self, iter: T) {
        self.samples.extend(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        let mut dataset = Dataset::new();
        assert!(dataset.validate(2, 1).is_err());
        dataset.push(State::from_vec(vec![1.0, 2.0]), Input::from_vec(vec![0.5]));
        dataset.validate(2, 1).unwrap();
        dataset.push(State::from_vec(vec![1.0]), Input::from_vec(vec![0.5]));
        assert!(matches!(
            dataset.validate(2, 1),
            Err(ControlError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_matrices_are_column_wise() {
        let mut dataset = Dataset::new();
        dataset.push(State::from_vec(vec![1.0, 2.0]), Input::from_vec(vec![5.0]));
        dataset.push(State::from_vec(vec![3.0, 4.0]), Input::from_vec(vec![6.0]));
        let (x, u) = dataset.matrices();
        assert_eq!(x.shape(), (2, 2));
        assert_eq!(x[(1, 0)], 2.0);
        assert_eq!(u[(0, 1)], 6.0);
    }
}
