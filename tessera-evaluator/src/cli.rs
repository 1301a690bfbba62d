use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Tessera Evaluator
///
/// Evaluates the actions of pre-evaluation blocks, either as an HTTP service or as a one-off
/// local replay.
#[derive(Parser, PartialEq, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    global_args: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

impl Cli {
    pub fn args(&self) -> GlobalArgs {
        self.global_args.clone()
    }

    pub fn command(&self) -> Command {
        self.command.clone()
    }
}

#[derive(Subcommand, Clone, PartialEq, Debug)]
pub enum Command {
    /// Starts the remote evaluation service.
    Serve(ServeArgs),
    /// Evaluates a single block locally and prints the records as JSON.
    Replay(ReplayArgs),
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct GlobalArgs {
    /// Log at debug level unless RUST_LOG says otherwise.
    #[clap(long)]
    pub verbose: bool,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct ServeArgs {
    /// JSON state snapshot the evaluated blocks build on
    #[clap(long, env = "TESSERA_STATES")]
    pub states: Option<PathBuf>,

    /// Evaluator configuration file, evaluates in process when omitted
    #[clap(long, env = "TESSERA_EVALUATOR_CONFIG")]
    pub evaluator_config: Option<PathBuf>,

    /// The server IP
    #[clap(long, default_value = "0.0.0.0")]
    pub server_ip: String,

    /// The server port
    #[clap(long, default_value = "4343")]
    pub server_port: u16,

    /// The server version prefix
    #[clap(long, default_value = "v1")]
    pub server_version_prefix: String,

    /// Port of the Prometheus metrics endpoint
    #[clap(long, default_value = "9898")]
    pub metrics_port: u16,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct ReplayArgs {
    /// JSON serialized pre-evaluation block
    #[clap(long)]
    pub block: PathBuf,

    /// JSON state snapshot the block builds on
    #[clap(long, env = "TESSERA_STATES")]
    pub states: Option<PathBuf>,

    /// Directory of the persistent state cache, no cache is used when omitted
    #[clap(long)]
    pub cache_path: Option<PathBuf>,
}
