use std::{path::PathBuf, process::ExitCode};

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

use crate::{
    commands::{run::run, sample::sample, settings::print_settings, show::show, train::train},
    settings::AppSettings,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyKind {
    /// Sampling-based receding-horizon controller.
    Mpc,
    /// Linear-quadratic regulator around the operating point.
    Lqr,
    /// Trained network, needs `--weights`.
    Approx,
}

impl PolicyKind {
    pub fn name(self) -> &'static str {
        match self {
            PolicyKind::Mpc => "mpc",
            PolicyKind::Lqr => "lqr",
            PolicyKind::Approx => "approx",
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Run the reactor in closed loop and record the trajectory.
    #[clap(name = "run")]
    Run {
        #[clap(long, default_value = "mpc")]
        policy: PolicyKind,
        /// Network parameters for `--policy approx`.
        #[clap(long)]
        weights: Option<PathBuf>,
        /// Trajectory log to write. `auto` picks a timestamped name in `--log-directory`.
        #[clap(long, default_value = "auto")]
        out: String,
        /// Overrides `closed_loop.n_steps`.
        #[clap(long)]
        steps: Option<usize>,
        #[clap(long, default_value = "false", action)]
        no_clip: bool,
    },

    /// Label states with a reference controller and save them as a dataset.
    #[clap(name = "sample")]
    Sample {
        #[clap(long, default_value = "mpc")]
        reference: PolicyKind,
        #[clap(short, long)]
        out: PathBuf,
    },

    /// Fit a network to a dataset.
    #[clap(name = "train")]
    Train {
        #[clap(short, long)]
        dataset: PathBuf,
        #[clap(short, long)]
        out: PathBuf,
        /// Where to save the loss history.
        #[clap(long)]
        history: Option<PathBuf>,
    },

    /// Summarize a trajectory log.
    #[clap(name = "show")]
    Show {
        #[clap(short, long)]
        input: PathBuf,
        /// Print the record of this step.
        #[clap(long)]
        step: Option<usize>,
        /// Export the trajectory as CSV.
        #[clap(long)]
        csv: Option<PathBuf>,
    },

    /// Print the effective settings as JSON.
    #[clap(name = "settings")]
    Settings {
        /// Print the defaults instead.
        #[clap(long, default_value = "false", action)]
        dump: bool,
    },
}

#[derive(Debug, Parser)]
#[command(name = "ampc")]
pub struct Cli {
    #[clap(subcommand)]
    command: Command,

    #[clap(long, short = 'f')]
    pub settings_file: Option<PathBuf>,

    #[clap(long, default_value = "info")]
    pub log_level: String,

    #[clap(long, default_value = "logs")]
    pub log_directory: PathBuf,

    /// Also write JSON traces to this file.
    #[clap(long)]
    pub trace_file: Option<PathBuf>,
}

impl Cli {
    pub fn start(self) -> ExitCode {
        match self.execute() {
            Ok(()) => ExitCode::SUCCESS,
            Err((what, err)) => {
                eprintln!("Error {}: {:#}", what, err);
                ExitCode::FAILURE
            }
        }
    }

    fn execute(&self) -> Result<(), (&'static str, anyhow::Error)> {
        if let Command::Settings { dump: true } = self.command {
            return print_settings(&AppSettings::default()).map_err(|e| ("printing settings", e));
        }
        let settings = AppSettings::load(self.settings_file.as_deref())
            .map_err(|e| ("loading settings", e))?;

        match &self.command {
            Command::Run {
                policy,
                weights,
                out,
                steps,
                no_clip,
            } => {
                let out = self.log_path(out).map_err(|e| ("preparing log file", e))?;
                run(
                    &settings,
                    *policy,
                    weights.as_deref(),
                    &out,
                    *steps,
                    !*no_clip,
                )
                .map_err(|e| ("running closed loop", e))
            }
            Command::Sample { reference, out } => {
                sample(&settings, *reference, out).map_err(|e| ("sampling", e))
            }
            Command::Train {
                dataset,
                out,
                history,
            } => train(&settings, dataset, out, history.as_deref()).map_err(|e| ("training", e)),
            Command::Show { input, step, csv } => {
                show(&settings, input, *step, csv.as_deref()).map_err(|e| ("showing log", e))
            }
            Command::Settings { dump: false } => {
                print_settings(&settings).map_err(|e| ("printing settings", e))
            }
            Command::Settings { dump: true } => Ok(()),
        }
    }

    /// Resolves `--out` for `run`, creating the log directory for `auto`.
    fn log_path(&self, out: &str) -> Result<PathBuf> {
        if out != "auto" {
            return Ok(PathBuf::from(out));
        }
        std::fs::create_dir_all(&self.log_directory)?;
        let time = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S").to_string();
        Ok(self.log_directory.join(format!("ampc-{time}.ampclog")))
    }
}
