use std::{path::PathBuf, sync::Arc};

use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use anyhow::Context;
use clap::Parser;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tessera_common::{dto::RemoteEvaluationResponse, state::BlockChainStates};
use tessera_evaluator::{
    cli::{Cli, Command, GlobalArgs, ReplayArgs, ServeArgs},
    config::ActionEvaluatorConfiguration,
    replay::{read_block, replay},
    services::ServicesBuilder,
};
use tessera_storage::{CacheConfig, MemoryBlockChainStates};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    create_tracing_subscriber(&cli.args());
    match cli.command() {
        Command::Serve(args) => serve(args),
        Command::Replay(args) => run_replay(args),
    }
}

fn create_tracing_subscriber(args: &GlobalArgs) {
    let level = if args.verbose { "debug" } else { "info" };
    let format = tracing_subscriber::fmt::format()
        .with_level(true)
        .with_target(false)
        .compact();
    tracing_subscriber::fmt()
        .event_format(format)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn load_states(path: Option<&PathBuf>) -> anyhow::Result<Arc<dyn BlockChainStates>> {
    let Some(path) = path else {
        info!("No state snapshot given, starting from an empty chain");
        return Ok(Arc::new(MemoryBlockChainStates::new()));
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read states from {}", path.display()))?;
    let states = MemoryBlockChainStates::from_json(&raw).context("Failed to load states")?;
    Ok(Arc::new(states))
}

/// Serves the Prometheus metrics on `/metrics`.
fn create_metrics_exporter(port: u16) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;
    let server = HttpServer::new(move || {
        App::new().route(
            "/metrics",
            web::get().to({
                let handle = handle.clone();
                move || metrics_handler(handle.clone())
            }),
        )
    })
    .bind(("0.0.0.0", port))
    .context("Failed to bind metrics server")?
    .run();

    Ok(tokio::spawn(async move {
        if let Err(e) = server.await {
            error!("Metrics server failed: {}", e);
        }
    }))
}

async fn metrics_handler(handle: PrometheusHandle) -> impl Responder {
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4; charset=utf-8")
        .body(handle.render())
}

#[tokio::main]
async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    info!("Starting Tessera evaluator {}", env!("CARGO_PKG_VERSION"));
    let _metrics_task = create_metrics_exporter(args.metrics_port)?;

    let states = load_states(args.states.as_ref())?;
    let config = match &args.evaluator_config {
        Some(path) => ActionEvaluatorConfiguration::from_yaml(path)?,
        None => ActionEvaluatorConfiguration::default(),
    };
    let evaluator = config.build(states)?;

    let (_handle, server_task) = ServicesBuilder::new(evaluator)
        .prefix(&args.server_version_prefix)
        .bind(&args.server_ip)
        .port(args.server_port)
        .run()?;
    server_task
        .await
        .context("Server task panicked")??;
    Ok(())
}

fn run_replay(args: ReplayArgs) -> anyhow::Result<()> {
    let states = load_states(args.states.as_ref())?;
    let block = read_block(&args.block)?;
    let cache = args
        .cache_path
        .map(|path| CacheConfig { path });

    let evaluations = replay(states, &block, cache.as_ref())?;
    let response = RemoteEvaluationResponse::from(&evaluations[..]);
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
