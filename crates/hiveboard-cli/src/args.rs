use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "hiveboard", version, about = "Observability backend for agent fleets")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HiveBoard server
    Serve {
        /// Path to the JSON configuration file
        #[arg(long, default_value = "hiveboard.json")]
        config: PathBuf,

        /// Override the configured listen address
        #[arg(long)]
        listen: Option<String>,
    },

    /// Validate a configuration file and print the resolved settings
    CheckConfig {
        /// Path to the JSON configuration file
        #[arg(long, default_value = "hiveboard.json")]
        config: PathBuf,
    },
}
