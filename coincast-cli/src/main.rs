//! Coincast CLI: pipeline runs, forecasts and registry management.
//!
//! Commands:
//! - `download`: run the ingestion pipeline and persist raw candles
//! - `run`: run a named pipeline (`__default__` runs all four stages)
//! - `forecast`: forecast from the active model, optionally retraining first
//! - `model-info`: show the active model version
//! - `registry list` / `registry promote`: inspect and move registered versions

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use coincast_core::{BinanceProvider, MarketDataProvider, SyntheticProvider};
use coincast_runner::{
    ForecastConfig, ForecastResult, ForecastService, ModelVersionRecord, PipelineName, RunReport,
    Stage,
};

#[derive(Parser)]
#[command(name = "coincast", about = "Coincast CLI: crypto price forecasting pipelines")]
struct Cli {
    /// Project root holding data/ and mlruns/.
    #[arg(long, global = true, env = "COINCAST_PROJECT", default_value = ".")]
    project: PathBuf,

    /// Parameters file, relative to the project root unless absolute.
    #[arg(long, global = true, env = "COINCAST_CONFIG", default_value = "conf/parameters.toml")]
    config: PathBuf,

    /// Offline mode: deterministic synthetic market data, no network access.
    #[arg(long, global = true, default_value_t = false)]
    synthetic: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch candles from the exchange and persist them under data/01_raw.
    Download,
    /// Run a named pipeline.
    Run {
        /// data_ingestion, data_processing, model_training, inference or __default__.
        #[arg(long, default_value = "__default__")]
        pipeline: String,
    },
    /// Forecast from the active model.
    Forecast {
        /// Days ahead. Defaults to `forecast.days_ahead` from the config.
        #[arg(long)]
        days: Option<usize>,

        /// Run the full pipeline first.
        #[arg(long, default_value_t = false)]
        retrain: bool,

        /// Print the forecast as JSON instead of a table.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Show the active model version, its metrics and hyperparameters.
    ModelInfo,
    /// Model registry commands.
    Registry {
        #[command(subcommand)]
        action: RegistryAction,
    },
}

#[derive(Subcommand)]
enum RegistryAction {
    /// List every registered version.
    List,
    /// Move a version to a stage (None, Staging, Production).
    Promote {
        version: u32,
        #[arg(value_parser = parse_stage)]
        stage: Stage,
    },
}

fn parse_stage(s: &str) -> Result<Stage, String> {
    s.parse()
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let service = open_service(&cli)?;

    match cli.command {
        Commands::Download => {
            let report = service.run_pipeline(PipelineName::DataIngestion.as_str())?;
            print_run(&report);
            println!(
                "Raw candles: {}",
                service.data_dir().join("01_raw/candles.parquet").display()
            );
        }
        Commands::Run { pipeline } => {
            let report = service.run_pipeline(&pipeline)?;
            print_run(&report);
        }
        Commands::Forecast {
            days,
            retrain,
            json,
        } => {
            let result = service.generate_forecast(days, retrain)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_forecast(&result);
            }
        }
        Commands::ModelInfo => {
            let info = service.model_info()?;
            match &info.active {
                Some(record) => print_version(record),
                None => println!(
                    "No accepted model for '{}' ({} versions registered)",
                    info.model_name, info.registered_versions
                ),
            }
        }
        Commands::Registry { action } => match action {
            RegistryAction::List => {
                let active = service.registry().active_version()?;
                let versions = service.model_versions()?;
                if versions.is_empty() {
                    println!("No versions registered for '{}'", service.registry().name());
                    return Ok(());
                }
                println!(
                    "{:<8} {:<11} {:<22} {:>10} {:>8} {:>8}",
                    "Version", "Stage", "Trained through", "MAPE %", "R2", "Active"
                );
                println!("{}", "-".repeat(72));
                for r in &versions {
                    println!(
                        "{:<8} {:<11} {:<22} {:>10.2} {:>8.3} {:>8}",
                        r.version,
                        r.stage.to_string(),
                        r.training_end.to_string(),
                        r.metrics.mape,
                        r.metrics.r2,
                        if active == Some(r.version) { "*" } else { "" }
                    );
                }
            }
            RegistryAction::Promote { version, stage } => {
                let record = service.transition_model(version, stage)?;
                println!("v{} is now {}", record.version, record.stage);
                match service.registry().active_version()? {
                    Some(active) => println!("Active version: v{active}"),
                    None => println!("No active version"),
                }
            }
        },
    }

    Ok(())
}

fn open_service(cli: &Cli) -> Result<ForecastService> {
    let config_path = cli.project.join(&cli.config);
    let config = ForecastConfig::load_or_default(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    let provider: Arc<dyn MarketDataProvider> = if cli.synthetic {
        Arc::new(SyntheticProvider::new())
    } else {
        Arc::new(BinanceProvider::new(
            config.binance.base_url.clone(),
            Duration::from_secs(config.binance.timeout_secs),
        )?)
    };
    Ok(ForecastService::new(config, &cli.project, provider)?)
}

fn print_run(report: &RunReport) {
    println!("=== Pipeline: {} ===", report.pipeline);
    println!("Run id:    {}", report.run_id);
    println!("Duration:  {:.2}s", report.duration_secs);
    println!("Nodes:     {}", report.nodes_executed.join(" -> "));
    if let Some(m) = &report.metrics {
        println!();
        println!("MAE:       {:.2}", m.mae);
        println!("MAPE:      {:.2}%", m.mape);
        println!("RMSE:      {:.2}", m.rmse);
        println!("R2:        {:.4}", m.r2);
    }
    if let Some(registration) = &report.registration {
        println!("Gate:      {}", registration.decision.summary());
        if let Some(version) = registration.version() {
            println!("Registered version: v{version}");
        }
    }
    if let Some(forecast) = &report.forecast {
        println!(
            "Forecast:  {} days from v{}",
            forecast.horizon(),
            forecast.model_version
        );
    }
}

fn print_forecast(result: &ForecastResult) {
    let table = &result.table;
    println!(
        "=== {} forecast (model v{}, {:?}) ===",
        table.symbol, table.model_version, result.source
    );
    println!(
        "Last close {} on {}",
        format_price(table.last_training_value),
        table.last_training_date
    );
    println!();
    println!("{:<12} {:>14} {:>14} {:>14}", "Date", "Predicted", "Lower", "Upper");
    println!("{}", "-".repeat(57));
    for p in &table.points {
        println!(
            "{:<12} {:>14} {:>14} {:>14}",
            p.date.to_string(),
            format_price(p.predicted_price),
            format_price(p.lower_bound),
            format_price(p.upper_bound)
        );
    }
    let s = &result.summary;
    if let Some(change) = s.expected_change_end_pct {
        println!();
        let end = s.forecast_end.map(|d| d.to_string()).unwrap_or_default();
        println!("Expected change by {end}: {change:+.2}%");
    }
    if let Some(width) = s.avg_interval_width {
        println!("Average interval width: {}", format_price(width));
    }
}

fn print_version(r: &ModelVersionRecord) {
    println!("=== {} v{} ({}) ===", r.model_type, r.version, r.stage);
    println!("Registered:  {}", r.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!(
        "Training:    {} to {} ({} observations)",
        r.training_start, r.training_end, r.n_train
    );
    println!("Fingerprint: {}", r.training_fingerprint);
    println!(
        "Metrics:     MAE {:.2}  MAPE {:.2}%  RMSE {:.2}  R2 {:.4}",
        r.metrics.mae, r.metrics.mape, r.metrics.rmse, r.metrics.r2
    );
    match serde_json::to_string_pretty(&r.hyperparameters) {
        Ok(json) => println!("Hyperparameters:\n{json}"),
        Err(e) => eprintln!("could not render hyperparameters: {e}"),
    }
}

fn format_price(v: f64) -> String {
    format!("${v:.2}")
}
