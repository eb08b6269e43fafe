//! CLI command definitions for the `parley` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod ask;

use clap::{Parser, Subcommand};
use uuid::Uuid;

/// Chat with an LLM under a fixed token budget.
#[derive(Parser)]
#[command(name = "parley", version, about, long_about = None)]
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
    /// Start the HTTP API server.
    Serve {
        /// Port to listen on (defaults to `[server] port`).
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (defaults to `[server] host`).
        #[arg(long)]
        host: Option<String>,
    },

    /// Send one message and print the reply.
    Ask {
        /// The message to send.
        message: String,

        /// Continue an existing chat.
        #[arg(long)]
        chat_id: Option<Uuid>,

        /// User the chat belongs to.
        #[arg(long, default_value = "cli")]
        user_id: String,

        /// Print the reply as it is generated.
        #[arg(long)]
        stream: bool,
    },
}
