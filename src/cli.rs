//! CLI argument parsing for the capsule tool.
//!
//! Each subcommand maps onto one piece of the application: the function
//! handler, the two client enhancement flows, and the public feed.
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "capsule",
    version,
    about = "Memory capsule enhancement function and client tools",
    after_help = "Examples:\n  echo '{\"text\":\"lake day\"}' | capsule function\n  capsule enhance --text \"we went to the lake\"\n  capsule enhance --text \"we went to the lake\" --realtime\n  capsule track --execution-id 66f1c2e0a1b2\n  capsule feed --json",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    /// JSON config file layered over the environment
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Emit debug logs on stderr (RUST_LOG overrides)
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Function(FunctionArgs),
    Enhance(EnhanceArgs),
    Track(TrackArgs),
    Feed(FeedArgs),
}

/// Run the enhancement function once, the way the platform invokes it.
#[derive(Parser, Debug)]
#[command(about = "Run the enhancement function on a JSON request body")]
pub struct FunctionArgs {
    /// Request body; read from stdin when omitted
    #[arg(long, value_name = "JSON")]
    pub body: Option<String>,
}

#[derive(Parser, Debug)]
#[command(about = "Enhance text through the form action or a realtime execution")]
pub struct EnhanceArgs {
    /// Text to enhance
    #[arg(long)]
    pub text: String,

    /// Start an asynchronous execution and follow it over realtime
    #[arg(long)]
    pub realtime: bool,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Follow an already-started execution until it settles")]
pub struct TrackArgs {
    /// Execution id returned by the platform
    #[arg(long, value_name = "ID")]
    pub execution_id: String,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(about = "List the newest public capsules")]
pub struct FeedArgs {
    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}
