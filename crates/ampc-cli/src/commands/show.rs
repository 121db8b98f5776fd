use std::{fs::File, io::BufWriter, path::Path};

use ampc_core::{Trajectory, VarClass};
use ampc_logger::{export_csv, TrajectoryLogFile, TrajectoryPlayback};
use anyhow::{Context, Result};

use super::{ensure_new_file, Reactor};
use crate::settings::AppSettings;

pub fn show(
    settings: &AppSettings,
    input: &Path,
    step: Option<usize>,
    csv: Option<&Path>,
) -> Result<()> {
    let log = TrajectoryLogFile::open(input)
        .with_context(|| format!("reading {}", input.display()))?;

    // Logs without a header are read with the configured reactor's variables.
    let bounds = match log.header() {
        Some(header) => header.bounds.clone(),
        None => (*Reactor::new(settings)?.bounds).clone(),
    };
    if let Some(header) = log.header() {
        println!("Policy: {}", header.policy);
    }
    println!("Steps: {}", log.records().len());

    // A run that failed during initialization leaves a header and no steps.
    let trajectory = if log.records().is_empty() {
        if step.is_some() {
            println!("No steps recorded");
        }
        Trajectory::new()
    } else {
        let mut playback = TrajectoryPlayback::from_log(log)?;
        if let Some(step) = step {
            let record = playback.jump_to(step);
            println!("Step {}", record.step);
            let vars = bounds.variables();
            for (name, value) in vars.names(VarClass::State).iter().zip(record.state.iter()) {
                println!("  {:>8} = {}", name, value);
            }
            for (name, value) in vars.names(VarClass::Input).iter().zip(record.input.iter()) {
                println!("  {:>8} = {}", name, value);
            }
        }
        playback.into_trajectory()
    };

    let violations = trajectory.input_violations(&bounds);
    println!("Input bound violations: {}", violations.len());

    if let Some(path) = csv {
        ensure_new_file(path)?;
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        export_csv(BufWriter::new(file), bounds.variables(), &trajectory)?;
        println!("CSV written to {}", path.display());
    }
    Ok(())
}
