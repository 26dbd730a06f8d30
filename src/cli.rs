use clap::{Parser, Subcommand};

/// Gatekeeper — human-approved credential broker
#[derive(Parser)]
#[command(name = "gatekeeper", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the broker server
    Serve {
        /// Port to bind (overrides GATEKEEPER_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },
}
