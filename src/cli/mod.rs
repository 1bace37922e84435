//! CLI module for the chain controller
//!
//! - `serve`: HTTP API server
//! - `run`: execute a chain file once and print the structured result

pub mod run;
pub mod serve;

use clap::{Parser, Subcommand};

/// Chain Controller - declarative orchestration of calls across game services
#[derive(Parser)]
#[command(name = "chain-controller")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP API server
    Serve,

    /// Execute an unsaved chain from a JSON file
    Run(run::RunArgs),
}
