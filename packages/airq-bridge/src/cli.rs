use clap::{Parser, Subcommand};

/// AirQ Bridge - live CO2 sensor ingestion and query service
#[derive(Parser)]
#[command(name = "airq-bridge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the ingestion loop and HTTP server (default)
    Serve,

    /// Print the last record of the durable log and exit
    LastLog,
}
