use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use mti_terminal::Engine;
use mti_terminal::batch;
use mti_terminal::config::TerminalConfig;
use mti_terminal::csv::{read_requests, write_results};
use mti_terminal::engine::Collaborators;
use mti_terminal::gateway::SimulatedGateway;
use mti_terminal::store::{MemoryHistory, MemoryNotifications};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse().unwrap()))
        .with_writer(std::io::stderr)
        .init();

    let mut args = env::args().skip(1);
    let path = args
        .next()
        .expect("usage: mti-terminal <requests.csv> [config.toml]");
    let config_path = args.next().map(PathBuf::from);

    if !path.ends_with(".csv") {
        warn!(path, "input file seems to not be a csv file");
    }

    let config = match TerminalConfig::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let registry = match config.registry() {
        Ok(registry) => registry,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let rows = match read_requests(path.clone()) {
        Ok(rows) => rows,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let engine = Engine::new(
        registry,
        &config,
        Collaborators {
            history: Arc::new(MemoryHistory::new()),
            notifications: Arc::new(MemoryNotifications::new()),
            gateway: Arc::new(SimulatedGateway::new(config.simulator)),
        },
    );

    let (row_sender, row_receiver) = tokio::sync::mpsc::channel(16);

    tokio::task::spawn_blocking(move || {
        for result in rows {
            match result {
                Ok(row) => {
                    if row_sender.blocking_send(row).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("{e}");
                }
            }
        }
    });

    let outcomes = batch::run(&engine, ReceiverStream::new(row_receiver)).await;

    if let Err(e) = write_results(&outcomes, std::io::stdout().lock()) {
        error!("failed to write results: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
