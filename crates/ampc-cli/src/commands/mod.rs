use std::{path::Path, sync::Arc};

use ampc_control::{
    mpc::MpcPolicy,
    neural::{ApproxParameters, ApproxPolicy},
    BoundedPolicy, LqrPolicy,
};
use ampc_core::Bounds;
use ampc_model::{Cstr, Model};
use ampc_simulator::{Simulator, StateFeedback};
use anyhow::{bail, Context, Result};

use crate::{cli::PolicyKind, settings::AppSettings};

pub mod run;
pub mod sample;
pub mod settings;
pub mod show;
pub mod train;

/// The reactor model, its bounds, a simulator and a full-state estimator.
pub(crate) struct Reactor {
    pub model: Cstr,
    pub bounds: Arc<Bounds>,
    pub simulator: Simulator<Cstr>,
    pub estimator: StateFeedback,
}

impl Reactor {
    pub fn new(settings: &AppSettings) -> Result<Self> {
        let model = Cstr::new(&settings.cstr)?;
        let bounds = Arc::new(model.bounds(&settings.cstr)?);
        let simulator = Simulator::new(model.clone(), settings.simulator.clone())?;
        let estimator = StateFeedback::new(model.variables().n_states());
        Ok(Self {
            model,
            bounds,
            simulator,
            estimator,
        })
    }

    pub fn policy(
        &self,
        kind: PolicyKind,
        settings: &AppSettings,
        weights: Option<&Path>,
    ) -> Result<Box<dyn BoundedPolicy>> {
        let policy: Box<dyn BoundedPolicy> = match kind {
            PolicyKind::Mpc => Box::new(MpcPolicy::new(
                self.model.clone(),
                self.bounds.clone(),
                settings.mpc.clone(),
            )?),
            PolicyKind::Lqr => Box::new(LqrPolicy::new(
                &self.model,
                self.bounds.clone(),
                settings.lqr.clone(),
            )?),
            PolicyKind::Approx => {
                let Some(weights) = weights else {
                    bail!("--policy approx needs --weights");
                };
                let parameters: ApproxParameters = ampc_logger::load_json(weights)?;
                Box::new(
                    ApproxPolicy::new(parameters, self.bounds.clone())
                        .with_context(|| format!("loading {}", weights.display()))?,
                )
            }
        };
        tracing::info!("Using {} policy", kind.name());
        Ok(policy)
    }
}

/// Fails if `path` exists.
pub(crate) fn ensure_new_file(path: &Path) -> Result<()> {
    if path.exists() {
        bail!("Output file already exists: {}", path.display());
    }
    Ok(())
}
