use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = env!("CARGO_PKG_NAME"))]
#[command(about = env!("CARGO_PKG_DESCRIPTION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the web server (default)
    Serve,
    /// Create missing tables for all registered models
    Sync {
        /// Also add columns missing from existing tables (PostgreSQL only)
        #[arg(long)]
        alter: bool,
    },
    /// Print the resolved configuration with secrets masked
    Config,
    /// Show version information
    Version,
}
