use std::{path::Path, process::ExitCode, str::FromStr};

use anyhow::{anyhow, Result};
use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, Layer,
};

mod cli;
mod commands;
mod settings;

use cli::Cli;

/// Installs the stdout subscriber and, when requested, a JSON trace file. Records from the
/// `log` facade used by the library crates are forwarded.
fn setup_tracing(log_level: &str, trace_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = tracing::Level::from_str(log_level)
        .map_err(|_| anyhow!("Invalid log level: {}", log_level))?;
    let stdout_layer = fmt::layer()
        .without_time()
        .with_filter(LevelFilter::from_level(level));

    let (file_layer, guard) = match trace_file {
        Some(path) => {
            if path.exists() {
                return Err(anyhow!("Trace file already exists: {}", path.display()));
            }
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| anyhow!("Invalid trace file: {}", path.display()))?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .try_init()?;
    Ok(guard)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _guard = match setup_tracing(&cli.log_level, cli.trace_file.as_deref()) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("Failed to set up logging: {}", err);
            return ExitCode::FAILURE;
        }
    };
    cli.start()
}
