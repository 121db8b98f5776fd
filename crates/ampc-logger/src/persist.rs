use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

use ampc_core::{Trajectory, Variables};
use anyhow::{bail, Context, Result};
use serde::{de::DeserializeOwned, Serialize};

/// Writes `value` as pretty JSON, replacing `path` if it exists.
pub fn save_json<T: Serialize>(path: impl AsRef<Path>, value: &T) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).with_context(|| format!("creating {:?}", path))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)
        .with_context(|| format!("writing {:?}", path))?;
    writer.flush()?;
    Ok(())
}

pub fn load_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("opening {:?}", path))?;
    serde_json::from_reader(BufReader::new(file)).with_context(|| format!("parsing {:?}", path))
}

/// Writes one CSV row per step: the step index, the state, the input and the
/// observation. Observation columns are prefixed with `next_`.
pub fn export_csv<W: Write>(
    mut writer: W,
    variables: &Variables,
    trajectory: &Trajectory,
) -> Result<()> {
    let mut header = vec!["step".to_string()];
    header.extend(variables.state_names().iter().cloned());
    header.extend(variables.input_names().iter().cloned());
    header.extend(variables.state_names().iter().map(|n| format!("next_{}", n)));
    writeln!(writer, "{}", header.join(","))?;

    let width = variables.n_states() * 2 + variables.n_inputs();
    for record in trajectory.iter() {
        let values: Vec<String> = record
            .state
            .iter()
            .chain(record.input.iter())
            .chain(record.observation.iter())
            .map(|v| v.to_string())
            .collect();
        if values.len() != width {
            bail!(
                "step {} has {} values, expected {}",
                record.step,
                values.len(),
                width
            );
        }
        writeln!(writer, "{},{}", record.step, values.join(","))?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ampc_core::{State, StepRecord};
    use nalgebra::DVector;
    use tempfile::tempdir;

    fn variables() -> Variables {
        Variables::new(["c_A", "T_R"], ["F"]).unwrap()
    }

    #[test]
    fn test_json_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vars.json");
        save_json(&path, &variables()).unwrap();
        let loaded: Variables = load_json(&path).unwrap();
        assert_eq!(loaded, variables());
    }

    #[test]
    fn test_missing_file_names_path() {
        let dir = tempdir().unwrap();
        let err = load_json::<Variables>(dir.path().join("missing.json")).unwrap_err();
        assert!(format!("{:#}", err).contains("missing.json"));
    }

    #[test]
    fn test_csv_layout() {
        let mut trajectory = Trajectory::new();
        trajectory.push(StepRecord {
            step: 0,
            state: State::from_vec(vec![0.8, 130.0]),
            input: DVector::from_vec(vec![18.5]),
            observation: DVector::from_vec(vec![0.75, 131.5]),
        });
        let mut out = Vec::new();
        export_csv(&mut out, &variables(), &trajectory).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "step,c_A,T_R,F,next_c_A,next_T_R");
        assert_eq!(lines[1], "0,0.8,130,18.5,0.75,131.5");
    }

    #[test]
    fn test_csv_rejects_mismatched_records() {
        let mut trajectory = Trajectory::new();
        trajectory.push(StepRecord {
            step: 0,
            state: State::from_vec(vec![0.8]),
            input: DVector::from_vec(vec![18.5]),
            observation: DVector::from_vec(vec![0.75]),
        });
        assert!(export_csv(Vec::new(), &variables(), &trajectory).is_err());
    }
}
