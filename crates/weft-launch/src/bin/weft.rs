//! The weft CLI.
//!
//! Usage:
//!   weft run-dataflow dataflow.toml
//!   weft run-node --dataflow-toml dataflow.toml --node-name tick --redis-url redis://localhost:6379/0
//!   weft draw-dataflow dataflow.toml --svg-path graph.svg

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use weft_launch::cli::{Command, DrawDataflowArgs, RunDataflowArgs, RunNodeArgs, WeftArgs};
use weft_launch::draw;
use weft_launch::manager::NodeManager;
use weft_launch::runner;
use weft_node_sdk::{shutdown, DataflowConfig};

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args: WeftArgs = argh::from_env();
    match args.command {
        Command::RunDataflow(args) => run_dataflow(args).await,
        Command::RunNode(args) => run_node(args).await,
        Command::DrawDataflow(args) => draw_dataflow(args).await,
    }
}

async fn run_dataflow(args: RunDataflowArgs) -> ExitCode {
    init_logging(args.verbose);

    let config = match DataflowConfig::from_file(Path::new(&args.dataflow_toml)) {
        Ok(config) => config,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let (_shutdown_tx, shutdown_rx) = match shutdown::setup_shutdown() {
        Ok(channel) => channel,
        Err(e) => {
            log::error!("failed to install signal handler: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut manager = NodeManager::new(PathBuf::from(&args.dataflow_toml), config);
    if let Err(e) = manager.enter().await {
        log::error!("{e}");
        manager.exit().await;
        return ExitCode::FAILURE;
    }

    let result = manager.wait(shutdown_rx).await;
    manager.exit().await;
    match result {
        Ok(()) => {
            log::info!("dataflow exited cleanly");
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run_node(args: RunNodeArgs) -> ExitCode {
    init_logging(false);

    let (_shutdown_tx, shutdown_rx) = match shutdown::setup_shutdown() {
        Ok(channel) => channel,
        Err(e) => {
            log::error!("failed to install signal handler: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runner::run_node_command(
        Path::new(&args.dataflow_toml),
        &args.node_name,
        &args.redis_url,
        shutdown_rx,
    )
    .await
    {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("error in node '{}': {e}", args.node_name);
            ExitCode::FAILURE
        }
    }
}

async fn draw_dataflow(args: DrawDataflowArgs) -> ExitCode {
    init_logging(false);

    if args.dataflow_toml.is_empty() {
        log::error!("draw-dataflow needs at least one dataflow TOML file");
        return ExitCode::FAILURE;
    }

    let mut configs = Vec::new();
    for path in &args.dataflow_toml {
        match DataflowConfig::from_file(Path::new(path)) {
            Ok(config) => configs.push((path.clone(), config)),
            Err(e) => {
                log::error!("{e}");
                return ExitCode::FAILURE;
            }
        }
    }

    let graph = match draw::mermaid_graph(&configs) {
        Ok(graph) => graph,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    println!("{graph}");

    if let Some(svg_path) = args.svg_path {
        if let Err(e) = draw::render_svg(&graph, Path::new(&svg_path)).await {
            log::error!("failed to render SVG: {e}");
            return ExitCode::FAILURE;
        }
        log::info!("wrote {svg_path}");
    }
    ExitCode::SUCCESS
}
