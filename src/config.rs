//! Command-line and environment configuration for the `santa-rooms` binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::storage::resolve_data_dir;

pub const DEFAULT_GATEWAY_URL: &str = "ws://127.0.0.1:4000/realtime";

/// Saved gift-exchange rooms for this machine.
///
/// Configuration can be set via CLI arguments or environment variables.
/// CLI arguments take precedence over environment variables.
#[derive(Parser, Debug)]
#[command(name = "santa-rooms", version, about)]
pub struct Cli {
    /// Data directory holding the rooms database [env: SANTA_HOME] [default: ~/.santa-rooms]
    #[arg(long, short = 'd', global = true)]
    pub data_dir: Option<PathBuf>,

    /// Realtime gateway websocket URL [env: SANTA_GATEWAY_URL]
    #[arg(long, short = 'g', global = true)]
    pub gateway_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List administered groups and participant links, most recent first
    Rooms {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Print the stored admin code for a group
    Admin { join_code: String },
    /// Remove everything stored for a group
    Forget { join_code: String },
    /// Follow a group's realtime events until it is deleted or Ctrl-C
    Watch { join_code: String },
}

pub struct Config {
    pub data_dir: PathBuf,
    pub gateway_url: String,
    pub command: Command,
}

impl Config {
    pub fn from_cli_and_env(cli: Cli) -> Self {
        let data_dir = cli.data_dir.unwrap_or_else(resolve_data_dir);

        let gateway_url = cli
            .gateway_url
            .or_else(|| std::env::var("SANTA_GATEWAY_URL").ok())
            .unwrap_or_else(|| DEFAULT_GATEWAY_URL.to_string());

        Self {
            data_dir,
            gateway_url,
            command: cli.command,
        }
    }
}
