use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use coincast_core::{BinanceProvider, MarketDataProvider, SyntheticProvider};
use coincast_runner::{ForecastConfig, ForecastService};
use coincast_server::AppState;

#[derive(Parser)]
#[command(name = "coincast-server", about = "Crypto price forecast API")]
struct Args {
    /// Bind address
    #[arg(long, env = "COINCAST_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Bind port
    #[arg(long, env = "COINCAST_PORT", default_value_t = 8000)]
    port: u16,

    /// Project root holding data/ and mlruns/
    #[arg(long, env = "COINCAST_PROJECT", default_value = ".")]
    project: PathBuf,

    /// Parameters file, relative to the project root unless absolute
    #[arg(long, env = "COINCAST_CONFIG", default_value = "conf/parameters.toml")]
    config: PathBuf,

    /// Serve deterministic synthetic market data instead of calling the exchange
    #[arg(long)]
    synthetic: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config_path = args.project.join(&args.config);
    let config = ForecastConfig::load_or_default(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    // The blocking HTTP client owns its own runtime, so it is built (and later
    // dropped) outside the server's runtime.
    let provider: Arc<dyn MarketDataProvider> = if args.synthetic {
        Arc::new(SyntheticProvider::new())
    } else {
        Arc::new(BinanceProvider::new(
            config.binance.base_url.clone(),
            Duration::from_secs(config.binance.timeout_secs),
        )?)
    };
    let service = Arc::new(ForecastService::new(config, &args.project, provider)?);
    let state = AppState::new(Arc::clone(&service));

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", args.host, args.port))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;
    runtime.block_on(serve(addr, state))?;
    drop(runtime);
    drop(service);
    Ok(())
}

async fn serve(addr: SocketAddr, state: Arc<AppState>) -> Result<()> {
    let app = coincast_server::app(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!("coincast API listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received, gracefully stopping");
}
