use std::{collections::BTreeMap, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tessera_common::{
    action::BlockEvaluator,
    dto::RemoteEvaluationResponse,
    models::{Address, PreEvaluationBlock, Value},
    state::BlockChainStates,
};
use tessera_storage::MemoryBlockChainStates;
use tracing::{info, warn};
use tracing_appender::rolling;

use crate::{
    chain::chain_root,
    rpc::{HttpEvaluationClient, HttpEvaluationClientOptions},
    RemoteActionEvaluator,
};

/// Tessera Client CLI - evaluates blocks on a remote evaluation service
///
/// Records are re-chained locally against the state the block builds on, so the state after
/// any action can be inspected as if the block had been evaluated in process.
#[derive(Parser, Debug, Clone, PartialEq)]
#[clap(version = env!("CARGO_PKG_VERSION"))]
struct CliArgs {
    /// Evaluation service URL. Example: http://localhost:4343
    #[clap(long, default_value = "http://localhost:4343", env = "TESSERA_EVALUATOR_URL")]
    url: String,

    /// API key sent as authorization header. Can be set with TESSERA_AUTH_TOKEN env variable.
    #[clap(short = 'k', long, env = "TESSERA_AUTH_TOKEN")]
    auth_key: Option<String>,

    /// Maximum time in seconds a single evaluation request may take.
    #[clap(long)]
    timeout: Option<u64>,

    /// Logging folder path.
    #[clap(long, default_value = "logs")]
    log_folder: String,

    /// Enable verbose logging.
    #[clap(long)]
    verbose: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
enum Command {
    /// Evaluates a JSON serialized pre-evaluation block and prints the records as JSON.
    Evaluate {
        /// Path of the pre-evaluation block.
        #[clap(long)]
        block: PathBuf,

        /// JSON state snapshot holding the block the evaluated one builds on.
        #[clap(long)]
        states: Option<PathBuf>,

        /// Addresses whose state after the last action is printed.
        #[clap(long = "probe", number_of_values = 1)]
        probes: Vec<Address>,
    },
    /// Queries the health endpoint of the service.
    Health,
}

pub async fn run_cli() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    let (non_blocking, _guard) =
        tracing_appender::non_blocking(rolling::never(&args.log_folder, "dev_logs.log"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(non_blocking)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set up logging subscriber")?;

    info!("Running with version: {}", option_env!("CARGO_PKG_VERSION").unwrap_or("unknown"));
    let client = HttpEvaluationClient::new(
        &args.url,
        HttpEvaluationClientOptions::new()
            .with_auth_key(args.auth_key.clone())
            .with_timeout(args.timeout.map(Duration::from_secs)),
    )
    .context("Failed to create evaluation client")?;

    match args.command {
        Command::Evaluate { block, states, probes } => {
            let block = read_block(&block)?;
            let states = read_states(states.as_ref())?;
            evaluate(client, states, &block, &probes).await
        }
        Command::Health => {
            let health = client
                .health()
                .await
                .context("Health check failed")?;
            println!("{}", serde_json::to_string(&health)?);
            Ok(())
        }
    }
}

fn read_block(path: &PathBuf) -> anyhow::Result<PreEvaluationBlock> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read block from {}", path.display()))?;
    serde_json::from_str(&raw).context("Failed to parse pre-evaluation block")
}

fn read_states(path: Option<&PathBuf>) -> anyhow::Result<Arc<dyn BlockChainStates>> {
    let Some(path) = path else {
        return Ok(Arc::new(MemoryBlockChainStates::new()));
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read states from {}", path.display()))?;
    Ok(Arc::new(MemoryBlockChainStates::from_json(&raw)?))
}

async fn evaluate(
    client: HttpEvaluationClient,
    states: Arc<dyn BlockChainStates>,
    block: &PreEvaluationBlock,
    probes: &[Address],
) -> anyhow::Result<()> {
    let evaluator = RemoteActionEvaluator::new(client, states.clone());
    let evaluations = evaluator.evaluate(block).await?;
    let failed = evaluations
        .iter()
        .filter(|evaluation| evaluation.exception.is_some())
        .count();
    if failed > 0 {
        warn!(failed, "Some transactions were terminated by a failing action");
    }
    info!(evaluations = evaluations.len(), "Block evaluated");
    println!("{}", serde_json::to_string(&RemoteEvaluationResponse::from(&evaluations[..]))?);

    if !probes.is_empty() {
        let values = match evaluations.last() {
            Some(last) => last.output_state.get_states(probes)?,
            None => (chain_root(&states, block).state)(probes)?,
        };
        let probed: BTreeMap<Address, Option<Value>> = probes
            .iter()
            .copied()
            .zip(values)
            .collect();
        println!("{}", serde_json::to_string(&probed)?);
    }
    Ok(())
}

#[cfg(test)]
mod cli_tests {
    use clap::Parser;
    use pretty_assertions::assert_eq;
    use tessera_common::testing::address;

    use super::*;

    #[test]
    fn test_cli_args() {
        let args = CliArgs::parse_from([
            "tessera-client",
            "--url",
            "http://localhost:5000",
            "--timeout",
            "5",
            "--log-folder",
            "test_logs",
            "evaluate",
            "--block",
            "block.json",
            "--probe",
            "0x0101010101010101010101010101010101010101",
            "--probe",
            "0202020202020202020202020202020202020202",
        ]);

        assert_eq!(args.url, "http://localhost:5000");
        assert_eq!(args.timeout, Some(5));
        assert_eq!(args.log_folder, "test_logs");
        assert!(!args.verbose);
        assert_eq!(
            args.command,
            Command::Evaluate {
                block: PathBuf::from("block.json"),
                states: None,
                probes: vec![address(1), address(2)],
            }
        );
    }

    #[test]
    fn test_health_command() {
        let args = CliArgs::parse_from(["tessera-client", "-k", "secret", "health"]);

        assert_eq!(args.auth_key.as_deref(), Some("secret"));
        assert_eq!(args.command, Command::Health);
    }
}
