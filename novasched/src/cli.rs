use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "novasched", version, about = "Placement and descheduling engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the engine with a config file
    Start {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Load a Pipeline resource from a YAML file and run its Validate hook
    /// without installing it, printing accept/reject for each step.
    Validate {
        #[arg(short, long)]
        pipeline: PathBuf,
    },
}
