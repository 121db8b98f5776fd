use std::path::Path;

use ampc_control::neural::{Dataset, Trainer};
use anyhow::{Context, Result};

use super::{ensure_new_file, Reactor};
use crate::settings::AppSettings;

pub fn train(
    settings: &AppSettings,
    dataset: &Path,
    out: &Path,
    history_out: Option<&Path>,
) -> Result<()> {
    ensure_new_file(out)?;
    let reactor = Reactor::new(settings)?;
    let data: Dataset = ampc_logger::load_json(dataset)?;
    let trainer = Trainer::new(settings.trainer.clone())?;
    let (parameters, history) = trainer
        .train(&data, &reactor.bounds)
        .with_context(|| format!("training on {}", dataset.display()))?;

    ampc_logger::save_json(out, &parameters)?;
    if let Some(path) = history_out {
        ampc_logger::save_json(path, &history)?;
    }
    match history.final_loss() {
        Some(loss) => println!(
            "Trained {} epochs, final loss {:.3e}, saved to {}",
            history.epochs(),
            loss,
            out.display()
        ),
        None => println!("Saved untrained network to {}", out.display()),
    }
    Ok(())
}
