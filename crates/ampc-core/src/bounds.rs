use std::{collections::BTreeMap, fmt};

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::{check_dimension, ControlError, Input, State, VarClass, Variables};

/// Box bounds for every state and input of a model.
///
/// Built once through [`BoundsBuilder`] and shared read-only afterwards (usually behind
/// an `Arc`), so that every policy clips against the same table. Variables without an
/// explicit entry are unbounded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    variables: Variables,
    state_lower: Vec<f64>,
    state_upper: Vec<f64>,
    input_lower: Vec<f64>,
    input_upper: Vec<f64>,
}

/// A single component found outside its configured range.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundsViolation {
    pub class: VarClass,
    pub name: String,
    pub value: f64,
    pub lower: f64,
    pub upper: f64,
}

impl fmt::Display for BoundsViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} = {} outside [{}, {}]",
            self.class, self.name, self.value, self.lower, self.upper
        )
    }
}

impl Bounds {
    pub fn builder(variables: Variables) -> BoundsBuilder {
        BoundsBuilder::new(variables)
    }

    /// A table without any finite bound.
    pub fn unbounded(variables: Variables) -> Self {
        let n_x = variables.n_states();
        let n_u = variables.n_inputs();
        Self {
            variables,
            state_lower: vec![f64::NEG_INFINITY; n_x],
            state_upper: vec![f64::INFINITY; n_x],
            input_lower: vec![f64::NEG_INFINITY; n_u],
            input_upper: vec![f64::INFINITY; n_u],
        }
    }

    /// Builds the table from `name -> [lower, upper]` maps, as found in settings files.
    pub fn from_maps(
        variables: Variables,
        states: &BTreeMap<String, [f64; 2]>,
        inputs: &BTreeMap<String, [f64; 2]>,
    ) -> Result<Self, ControlError> {
        let mut builder = Self::builder(variables);
        for (name, [lower, upper]) in states {
            builder = builder.state(name, *lower, *upper);
        }
        for (name, [lower, upper]) in inputs {
            builder = builder.input(name, *lower, *upper);
        }
        builder.build()
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    pub fn lower(&self, class: VarClass) -> &[f64] {
        match class {
            VarClass::State => &self.state_lower,
            VarClass::Input => &self.input_lower,
        }
    }

    pub fn upper(&self, class: VarClass) -> &[f64] {
        match class {
            VarClass::State => &self.state_upper,
            VarClass::Input => &self.input_upper,
        }
    }

    /// The `(lower, upper)` pair of a named variable.
    pub fn get(&self, class: VarClass, name: &str) -> Option<(f64, f64)> {
        self.variables
            .index_of(class, name)
            .map(|i| (self.lower(class)[i], self.upper(class)[i]))
    }

    /// Whether every variable of `class` has finite bounds on both sides.
    pub fn is_finite(&self, class: VarClass) -> bool {
        self.lower(class)
            .iter()
            .chain(self.upper(class))
            .all(|v| v.is_finite())
    }

    /// Componentwise clamp of `values` into the bounds of `class`.
    pub fn clamp(&self, class: VarClass, values: &DVector<f64>) -> Result<DVector<f64>, ControlError> {
        let lower = self.lower(class);
        let upper = self.upper(class);
        check_dimension(clamp_context(class), values, lower.len())?;
        Ok(DVector::from_iterator(
            values.len(),
            values
                .iter()
                .zip(lower.iter().zip(upper))
                .map(|(v, (lo, hi))| v.clamp(*lo, *hi)),
        ))
    }

    pub fn clamp_input(&self, input: &Input) -> Result<Input, ControlError> {
        self.clamp(VarClass::Input, input)
    }

    pub fn clamp_state(&self, state: &State) -> Result<State, ControlError> {
        self.clamp(VarClass::State, state)
    }

    pub fn contains(&self, class: VarClass, values: &DVector<f64>) -> bool {
        values.len() == self.lower(class).len() && self.violations(class, values).is_empty()
    }

    /// Every component of `values` that lies outside its range. Components beyond the
    /// table's dimension are ignored.
    pub fn violations(&self, class: VarClass, values: &DVector<f64>) -> Vec<BoundsViolation> {
        let names = self.variables.names(class);
        values
            .iter()
            .zip(names)
            .zip(self.lower(class).iter().zip(self.upper(class)))
            .filter(|((v, _), (lo, hi))| !(**v >= **lo && **v <= **hi))
            .map(|((v, name), (lo, hi))| BoundsViolation {
                class,
                name: name.clone(),
                value: *v,
                lower: *lo,
                upper: *hi,
            })
            .collect()
    }

    pub fn input_violations(&self, input: &Input) -> Vec<BoundsViolation> {
        self.violations(VarClass::Input, input)
    }

    pub fn state_violations(&self, state: &State) -> Vec<BoundsViolation> {
        self.violations(VarClass::State, state)
    }
}

fn clamp_context(class: VarClass) -> &'static str {
    match class {
        VarClass::State => "state clamp",
        VarClass::Input => "input clamp",
    }
}

/// Collects bounds by name and validates them on [`BoundsBuilder::build`].
pub struct BoundsBuilder {
    bounds: Bounds,
    errors: Vec<String>,
}

impl BoundsBuilder {
    fn new(variables: Variables) -> Self {
        Self {
            bounds: Bounds::unbounded(variables),
            errors: Vec::new(),
        }
    }

    pub fn state(self, name: &str, lower: f64, upper: f64) -> Self {
        self.set(VarClass::State, name, lower, upper)
    }

    pub fn input(self, name: &str, lower: f64, upper: f64) -> Self {
        self.set(VarClass::Input, name, lower, upper)
    }

    pub fn set(mut self, class: VarClass, name: &str, lower: f64, upper: f64) -> Self {
        if lower.is_nan() || upper.is_nan() || lower > upper {
            self.errors.push(format!(
                "{} {}: invalid range [{}, {}]",
                class, name, lower, upper
            ));
            return self;
        }
        match self.bounds.variables.index_of(class, name) {
            Some(i) => match class {
                VarClass::State => {
                    self.bounds.state_lower[i] = lower;
                    self.bounds.state_upper[i] = upper;
                }
                VarClass::Input => {
                    self.bounds.input_lower[i] = lower;
                    self.bounds.input_upper[i] = upper;
                }
            },
            None => self.errors.push(format!("unknown {} {:?}", class, name)),
        }
        self
    }

    pub fn build(self) -> Result<Bounds, ControlError> {
        if self.errors.is_empty() {
            Ok(self.bounds)
        } else {
            Err(ControlError::InvalidConfig(self.errors.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cstr_bounds() -> Bounds {
        let vars = Variables::new(["C_a", "C_b", "T_R", "T_K"], ["F", "Q_dot"]).unwrap();
        Bounds::builder(vars)
            .state("C_a", 0.1, 2.0)
            .state("T_R", 50.0, 140.0)
            .input("F", 5.0, 100.0)
            .input("Q_dot", -8500.0, 0.0)
            .build()
            .unwrap()
    }

    #[test]
    fn test_clamp_is_componentwise() {
        let bounds = cstr_bounds();
        let clamped = bounds
            .clamp_input(&Input::from_vec(vec![150.0, -9000.0]))
            .unwrap();
        assert_eq!(clamped, Input::from_vec(vec![100.0, -8500.0]));

        let clamped = bounds
            .clamp_input(&Input::from_vec(vec![1.0, 10.0]))
            .unwrap();
        assert_eq!(clamped, Input::from_vec(vec![5.0, 0.0]));

        let inside = Input::from_vec(vec![20.0, -100.0]);
        assert_eq!(bounds.clamp_input(&inside).unwrap(), inside);
    }

    #[test]
    fn test_clamp_dimension_mismatch() {
        let bounds = cstr_bounds();
        assert!(matches!(
            bounds.clamp_input(&Input::from_vec(vec![1.0])),
            Err(ControlError::DimensionMismatch { expected: 2, .. })
        ));
    }

    #[test]
    fn test_unset_entries_are_unbounded() {
        let bounds = cstr_bounds();
        assert_eq!(
            bounds.get(VarClass::State, "C_b"),
            Some((f64::NEG_INFINITY, f64::INFINITY))
        );
        assert!(!bounds.is_finite(VarClass::State));
        assert!(bounds.is_finite(VarClass::Input));
    }

    #[test]
    fn test_violations() {
        let bounds = cstr_bounds();
        let violations = bounds.input_violations(&Input::from_vec(vec![120.0, -10.0]));
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].name, "F");
        assert_eq!(violations[0].upper, 100.0);

        let nan = bounds.input_violations(&Input::from_vec(vec![f64::NAN, -10.0]));
        assert_eq!(nan.len(), 1);
    }

    #[test]
    fn test_builder_errors() {
        let vars = Variables::new(["x"], ["u"]).unwrap();
        assert!(Bounds::builder(vars.clone())
            .input("v", 0.0, 1.0)
            .build()
            .is_err());
        assert!(Bounds::builder(vars.clone())
            .input("u", 1.0, 0.0)
            .build()
            .is_err());
        assert!(Bounds::builder(vars).state("x", f64::NAN, 0.0).build().is_err());
    }

    #[test]
    fn test_from_maps() {
        let vars = Variables::new(["x"], ["u"]).unwrap();
        let states = BTreeMap::from([("x".to_string(), [-1.0, 1.0])]);
        let inputs = BTreeMap::from([("u".to_string(), [0.0, 2.0])]);
        let bounds = Bounds::from_maps(vars, &states, &inputs).unwrap();
        assert_eq!(bounds.get(VarClass::Input, "u"), Some((0.0, 2.0)));
        assert!(bounds.is_finite(VarClass::State));
    }
}
