use serde::{Deserialize, Serialize};

use crate::{Bounds, BoundsViolation, Input, Observation, State, VarClass};

/// One iteration of a closed-loop run: the estimate the policy saw, the input it
/// produced and what the plant reported back.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: usize,
    pub state: State,
    pub input: Input,
    pub observation: Observation,
}

/// Time-ordered, append-only record of a closed-loop run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    records: Vec<StepRecord>,
}

impl Trajectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, record: StepRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &StepRecord> {
        self.records.iter()
    }

    pub fn last(&self) -> Option<&StepRecord> {
        self.records.last()
    }

    pub fn into_records(self) -> Vec<StepRecord> {
        self.records
    }

    /// Time series of a single state or input component.
    pub fn column(&self, class: VarClass, index: usize) -> Vec<f64> {
        self.records
            .iter()
            .filter_map(|r| match class {
                VarClass::State => r.state.get(index).copied(),
                VarClass::Input => r.input.get(index).copied(),
            })
            .collect()
    }

    /// Inputs that left their configured range, by step. Only possible when the run did
    /// not clip policy outputs.
    pub fn input_violations(&self, bounds: &Bounds) -> Vec<(usize, BoundsViolation)> {
        self.records
            .iter()
            .flat_map(|r| {
                bounds
                    .input_violations(&r.input)
                    .into_iter()
                    .map(move |v| (r.step, v))
            })
            .collect()
    }

    /// Estimated states outside their physical range, by step.
    pub fn state_violations(&self, bounds: &Bounds) -> Vec<(usize, BoundsViolation)> {
        self.records
            .iter()
            .flat_map(|r| {
                bounds
                    .state_violations(&r.state)
                    .into_iter()
                    .map(move |v| (r.step, v))
            })
            .collect()
    }
}

impl IntoIterator for Trajectory {
    type Item = StepRecord;
    type IntoIter = std::vec::IntoIter<StepRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Variables;

    fn record(step: usize, x: f64, u: f64) -> StepRecord {
        StepRecord {
            step,
            state: State::from_vec(vec![x]),
            input: Input::from_vec(vec![u]),
            observation: Observation::from_vec(vec![x + 1.0]),
        }
    }

    #[test]
    fn test_column() {
        let mut traj = Trajectory::new();
        traj.push(record(0, 1.0, 10.0));
        traj.push(record(1, 2.0, 20.0));
        assert_eq!(traj.column(VarClass::State, 0), vec![1.0, 2.0]);
        assert_eq!(traj.column(VarClass::Input, 0), vec![10.0, 20.0]);
        assert!(traj.column(VarClass::Input, 3).is_empty());
    }

    #[test]
    fn test_input_violations() {
        let vars = Variables::new(["x"], ["u"]).unwrap();
        let bounds = Bounds::builder(vars).input("u", 0.0, 15.0).build().unwrap();
        let mut traj = Trajectory::new();
        traj.push(record(0, 1.0, 10.0));
        traj.push(record(1, 2.0, 20.0));
        let violations = traj.input_violations(&bounds);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].0, 1);
        assert_eq!(violations[0].1.value, 20.0);
    }
}
