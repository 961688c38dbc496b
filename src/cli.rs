use clap::{Parser, Subcommand};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Hybridization rate case study: first step versus first passage time sampling")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Path to config TOML (written with defaults when missing)
    #[arg(long, default_value = "strandrate.toml")]
    pub config: String,

    /// Seed for simulation and resampling (overrides config)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Write a flame profile (HTML) to this file; needs the `flm` feature
    #[arg(long)]
    pub profile: Option<String>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Compare both sampling modes across the concentration ladder
    Plots {
        /// Trajectories per simulation run
        trials: usize,
    },
    /// Relative leak rates of the slowdown sequences
    SlowDownStudy {
        /// Trajectories per simulation run
        trials: usize,
    },
}
