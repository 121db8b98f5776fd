use std::path::Path;

use ampc_core::settings::LoopSettings;
use ampc_executor::ClosedLoop;
use ampc_logger::{LogHeader, TrajectoryLogWriter};
use anyhow::Result;

use super::Reactor;
use crate::{cli::PolicyKind, settings::AppSettings};

pub fn run(
    settings: &AppSettings,
    kind: PolicyKind,
    weights: Option<&Path>,
    out: &Path,
    steps: Option<usize>,
    clip_to_bounds: bool,
) -> Result<()> {
    let reactor = Reactor::new(settings)?;
    let policy = reactor.policy(kind, settings, weights)?;
    let bounds = reactor.bounds.clone();
    let loop_settings = LoopSettings {
        n_steps: steps.unwrap_or(settings.closed_loop.n_steps),
        clip_to_bounds,
    };

    let mut writer = TrajectoryLogWriter::open(out)?;
    writer.write_header(&LogHeader {
        policy: kind.name().to_string(),
        bounds: (*bounds).clone(),
        settings: serde_json::to_string(settings)?,
    })?;
    tracing::info!("Saving trajectory to {}", out.display());

    let mut closed_loop =
        ClosedLoop::new(policy, reactor.simulator, reactor.estimator, loop_settings)?;
    let x0 = settings.cstr.initial_state();
    let (trajectory, failure) = match closed_loop.run(&x0) {
        Ok(trajectory) => (trajectory, None),
        Err(mut err) => {
            let trajectory = std::mem::take(&mut err.trajectory);
            (trajectory, Some(err))
        }
    };

    for record in trajectory.iter() {
        writer.write_step(record)?;
    }
    writer.flush()?;

    let violations = trajectory.input_violations(&bounds);
    for (step, violation) in violations.iter().take(5) {
        tracing::warn!("step {}: {}", step, violation);
    }
    println!(
        "Recorded {} steps ({} input bound violations)",
        trajectory.len(),
        violations.len()
    );
    if let Some(last) = trajectory.last() {
        println!("Final state: {:?}", last.observation.as_slice());
    }

    match failure {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}
