use clap::Parser;
use logship::Pipeline;
use logship_core::config::Config;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "logship", about = "Tail an access log and ship it to InfluxDB")]
struct Cli {
    /// TOML config file layered over the built-in defaults.
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Log file to tail (overrides `source.path`).
    #[arg(long)]
    file: Option<PathBuf>,

    /// Address for the /monitor endpoint (overrides `monitor.listen`).
    #[arg(long)]
    listen: Option<String>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long)]
    debug: bool,

    /// Write logs to this file instead of stderr.
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli)?;

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(file) = cli.file {
        config.source.path = file;
    }
    if let Some(listen) = cli.listen {
        config.monitor.listen = listen;
    }

    let pipeline = Pipeline::new(config)?;

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    if let Err(e) = pipeline.run(cancel).await {
        tracing::error!(error = %e, "logship exiting");
        return Err(e.into());
    }
    Ok(())
}

fn init_tracing(cli: &Cli) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_env("RUST_LOG")
        .unwrap_or_else(|_| EnvFilter::new(if cli.debug { "debug" } else { "info" }));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(true)
        .with_line_number(true);

    match &cli.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            builder
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .init();
            tracing::info!(path = %path.display(), "logging to file");
        }
        None => builder.init(),
    }
    Ok(())
}

/// Cancel on Ctrl-C, or on SIGTERM where there is one.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown requested; draining pipeline");
    cancel.cancel();
}
