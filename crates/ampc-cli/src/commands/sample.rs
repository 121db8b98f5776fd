use std::path::Path;

use ampc_executor::Sampler;
use anyhow::Result;

use super::{ensure_new_file, Reactor};
use crate::{cli::PolicyKind, settings::AppSettings};

pub fn sample(settings: &AppSettings, reference: PolicyKind, out: &Path) -> Result<()> {
    ensure_new_file(out)?;
    let mut reactor = Reactor::new(settings)?;
    let mut policy = reactor.policy(reference, settings, None)?;
    let sampler = Sampler::new(settings.sampler.clone())?;
    let dataset = sampler.sample(
        &mut policy,
        &mut reactor.simulator,
        &mut reactor.estimator,
        &reactor.bounds,
    )?;
    ampc_logger::save_json(out, &dataset)?;
    println!("Saved {} samples to {}", dataset.len(), out.display());
    Ok(())
}
