use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

#[derive(Parser, Debug)]
#[command(
    name = "trainctl",
    version,
    about = "CLI training-run simulator with resource governance"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Output machine-readable JSON")]
    pub json: bool,
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Config file (otherwise trainctl.config.json / .trainctl.json in the current directory)"
    )]
    pub config: Option<String>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a training run and stream its progress as NDJSON on stdout
    Run {
        #[arg(long, help = "Identifier for the run (default: run-<epoch-ms>)")]
        run_id: Option<String>,
        #[arg(long, help = "Human-readable run name")]
        name: Option<String>,
        #[arg(long, help = "Number of training steps")]
        steps: Option<u64>,
        #[arg(long, help = "Pause between steps in milliseconds")]
        step_interval_ms: Option<u64>,
        #[arg(short = 'm', long, help = "Maximum run time in minutes")]
        max_run_minutes: Option<f64>,
        #[arg(short = 'p', long, help = "Maximum parallel runs")]
        max_parallel: Option<u32>,
        #[arg(short = 'c', long, help = "Checkpoint interval in minutes")]
        checkpoint_every_minutes: Option<f64>,
        #[arg(
            long,
            help = "Continue a stored run from this checkpoint (requires --run-id)"
        )]
        resume_from: Option<String>,
        #[arg(long, value_enum, help = "GPU probe backend")]
        gpu_probe: Option<GpuProbeKind>,
    },
    /// Show current resource status
    Status,
    /// Write a starter .trainctl.json into the current directory
    Init,
    /// Inspect recorded runs
    Experiments {
        #[command(subcommand)]
        command: ExperimentCommands,
    },
    /// Compare two recorded runs
    Compare { run_a: String, run_b: String },
}

#[derive(Subcommand, Debug)]
pub enum ExperimentCommands {
    List,
    Show { run_id: String },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum GpuProbeKind {
    #[default]
    Auto,
    NvidiaSmi,
    Rocm,
    None,
}
