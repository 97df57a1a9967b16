use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "streamforged")]
#[command(author, version, about = "Media streaming server with on-the-fly transcoding")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the streaming server
    Start {
        /// Host to bind to (overrides the config file)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides the config file)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Check that the transcoders are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,

    /// Generate a random secret for signing `/ext` URLs
    GenerateSecret,
}
