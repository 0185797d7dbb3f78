//! Huddle chat relay entry point.
//!
//! Binary name: `huddle`
//!
//! Parses CLI arguments, loads configuration from the data directory, then
//! either serves the WebSocket relay or runs a one-shot command.

mod cli;
mod http;
mod state;

use clap::Parser;
use clap_complete::generate;
use huddle_infra::config::{load_config, validate};
use huddle_infra::filesystem::resolve_data_dir;
use huddle_observe::tracing_setup::{LogFormat, init_tracing, shutdown_tracing};

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Shell completions don't need logging or state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "huddle", &mut std::io::stdout());
        return Ok(());
    }

    let (log_format, otel) = match &cli.command {
        Commands::Serve { log_json, otel, .. } => {
            let format = if *log_json { LogFormat::Json } else { LogFormat::Pretty };
            (format, *otel)
        }
        _ => (LogFormat::Pretty, false),
    };
    init_tracing(cli.log_filter(), log_format, otel)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let data_dir = resolve_data_dir();
    let config = load_config(&data_dir).await;
    validate(&config)?;

    let result = match cli.command {
        Commands::Serve { port, host, .. } => {
            let mut config = config;
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(host) = host {
                config.server.host = host;
            }
            serve(&data_dir, config, cli.quiet).await
        }

        Commands::History { limit } => {
            let (db_pool, repository) = state::open_storage(&data_dir).await?;
            let result = cli::history::show_history(repository.as_ref(), limit, cli.json).await;
            db_pool.close().await;
            result
        }

        Commands::Completions { .. } => Ok(()),
    };

    shutdown_tracing();
    result
}

async fn serve(
    data_dir: &std::path::Path,
    config: huddle_types::config::HuddleConfig,
    quiet: bool,
) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let (state, tasks) = AppState::init(data_dir, config).await?;
    let db_pool = state.db_pool.clone();

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, data_dir = %data_dir.display(), "huddle listening");

    if !quiet {
        println!(
            "  {} Huddle relay listening on {}",
            console::style("⚡").bold(),
            console::style(format!("ws://{addr}/ws?username=<name>")).cyan()
        );
        println!("  {}", console::style("Press Ctrl+C to stop").dim());
    }

    let router = http::router::build_router(state);

    let (stopped_tx, stopped_rx) = tokio::sync::oneshot::channel();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Upgraded WebSocket sessions are not tracked by the HTTP server,
            // so drain the pipeline to them and close them here.
            let _ = stopped_tx.send(tasks.shutdown().await);
        })
        .await?;

    let report = stopped_rx
        .await
        .map_err(|_| anyhow::anyhow!("server exited before shutdown completed"))??;
    tracing::info!(
        dispatched = report.dispatched,
        drained = report.drained,
        "event pipeline stopped"
    );
    db_pool.close().await;

    if !quiet {
        println!("\n  Server stopped.");
    }
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
