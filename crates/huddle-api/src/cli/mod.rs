//! CLI command definitions for the `huddle` binary.

pub mod history;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Real-time chat relay with an event-driven message pipeline.
#[derive(Parser)]
#[command(name = "huddle", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the WebSocket chat server.
    Serve {
        /// Port to listen on (overrides `server.port`).
        #[arg(short, long, env = "HUDDLE_PORT")]
        port: Option<u16>,

        /// Host to bind to (overrides `server.host`).
        #[arg(long, env = "HUDDLE_HOST")]
        host: Option<String>,

        /// Emit logs as JSON lines.
        #[arg(long)]
        log_json: bool,

        /// Export tracing spans through OpenTelemetry (stdout exporter).
        #[arg(long)]
        otel: bool,
    },

    /// Print recent conversation history from the local database.
    History {
        /// Number of most recent messages to show.
        #[arg(short = 'n', long, default_value = "20")]
        limit: u32,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

impl Cli {
    /// Log filter used when `RUST_LOG` is not set.
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 if self.quiet => "error",
            0 => "info",
            1 => "info,huddle=debug,huddle_core=debug,huddle_api=debug",
            _ => "trace",
        }
    }
}
