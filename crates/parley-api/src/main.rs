//! Parley entry point.
//!
//! Binary name: `parley`
//!
//! Parses CLI arguments, initializes tracing, loads configuration, wires the
//! database and services, then runs the queue consumer, the REST read API,
//! or both.

mod cli;
mod http;
mod state;

use clap::Parser;
use clap_complete::generate;
use parley_observe::tracing_setup::{TracingOptions, init_tracing, shutdown_tracing};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Shell completions don't need tracing, config, or state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "parley", &mut std::io::stdout());
        return Ok(());
    }

    init_tracing(&TracingOptions {
        default_filter: cli.log_filter().to_string(),
        json: cli.json_logs,
        otel: cli.otel,
    })
    .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = run(cli).await;
    if let Err(e) = &result {
        tracing::error!(error = %e, "Parley exited with an error");
    }

    shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = parley_infra::config::load_config(&cli.config).await?;

    match cli.command {
        Commands::Serve => cli::service::serve(config).await,
        Commands::Consume => cli::service::consume(config).await,
        Commands::Migrate => cli::service::migrate(config).await,
        Commands::Completions { .. } => unreachable!("handled before tracing init"),
    }
}
