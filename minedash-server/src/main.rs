use std::sync::Arc;

use clap::Parser;
use minedash_core::{create_backend, AccessTokenProvider, BigQueryClient, MinedashConfig};
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use minedash_server::http::{self, AnalysisContext, AnalysisSettings};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "minedash.toml")]
    config: String,

    /// Print the resolved model endpoint and table, then exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience; Cloud Run uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let config = match MinedashConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));
    fmt().with_env_filter(filter).init();

    let tokens = Arc::new(AccessTokenProvider::from_config(&config.auth)?);
    let generator = create_backend(&config, tokens.clone())?;
    let warehouse = BigQueryClient::from_config(&config, tokens)?;

    if args.check {
        println!("Model backend:  {}", generator.name());
        println!("Model endpoint: {}", config.model_endpoint());
        println!("Vertex base:    {}", config.vertex_base_url());
        println!("Table:          {}", warehouse.table());
        println!("Threshold:      {}°C", config.analysis.threshold_celsius);
        return Ok(());
    }

    let ctx = Arc::new(AnalysisContext {
        generator: Arc::from(generator),
        warehouse: Arc::new(warehouse),
        settings: AnalysisSettings::from_config(&config),
    });

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    http::start_http_server(&config.http, ctx, tx.subscribe()).await
}

/// Ctrl-C locally, SIGTERM on Cloud Run.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await;
    }
}
