//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "aicam", version, about = "AI-camera game console")]
pub struct Cli {
    /// Path to config TOML; defaults are used when the file is absent
    #[arg(long, value_name = "FILE", default_value = "etc/aicam.toml")]
    pub config: PathBuf,

    /// Emit JSON lines instead of pretty output
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one or more game rounds against the camera
    Run {
        /// Number of rounds to play
        #[arg(long, default_value_t = 1)]
        rounds: u32,
        /// Serial device path (overrides the config)
        #[arg(long, value_name = "PATH")]
        port: Option<String>,
        /// Use the simulated camera instead of a serial device
        #[arg(long, action = ArgAction::SetTrue)]
        sim: bool,
        /// Fix the simulated camera to a single pose id
        #[arg(long, value_name = "ID")]
        sim_id: Option<u8>,
        /// Seed for round-plan generation (random when absent)
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Show the live debounced signal
    Watch {
        /// Serial device path (overrides the config)
        #[arg(long, value_name = "PATH")]
        port: Option<String>,
        /// Use the simulated camera instead of a serial device
        #[arg(long, action = ArgAction::SetTrue)]
        sim: bool,
        /// How long to watch before exiting
        #[arg(long, default_value_t = 10)]
        seconds: u64,
    },
    /// Quick health check against the simulated camera
    SelfCheck,
}
