//! Hourly Quantile Forecaster
//!
//! Trains a quantile ensemble on an observation dump and forecasts a window.

use anyhow::Context;
use clap::{Parser, Subcommand};
use quantile_forecaster::{
    config::Config,
    features::FeatureTable,
    forecast::Forecast,
    impute::{impute, ImputeMethod},
    series::{pivot_observations, Observation},
    BoundaryTimestamp, QuantileEnsembleTrainer, RecursiveForecaster, TimeSeries,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "quantile-forecaster")]
#[command(about = "Hourly quantile forecasts with gradient-boosted trees")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Train on history before the cutoff and forecast [start, end]
    Forecast {
        /// JSON array of {time, code, value} observations
        #[arg(short, long)]
        input: String,
        /// Series code to forecast
        #[arg(short, long)]
        target: String,
        /// First forecast hour (RFC 3339 or naive local time)
        #[arg(long)]
        start: BoundaryTimestamp,
        /// Last forecast hour, inclusive
        #[arg(long)]
        end: BoundaryTimestamp,
        /// Training cutoff; defaults to the forecast start
        #[arg(long)]
        cutoff: Option<BoundaryTimestamp>,
        /// Write the forecast as JSON instead of printing a table
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Dump the feature table built from a series
    Features {
        #[arg(short, long)]
        input: String,
        #[arg(short, long)]
        target: String,
        #[arg(short, long)]
        output: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Forecast {
            input,
            target,
            start,
            end,
            cutoff,
            output,
        } => run_forecast(&config, &input, &target, start, end, cutoff, output.as_deref()),
        Commands::Features {
            input,
            target,
            output,
        } => dump_features(&config, &input, &target, output.as_deref()),
    }
}

/// Read observations, pivot, and apply the configured imputation
fn load_series(config: &Config, input: &str, target: &str) -> anyhow::Result<TimeSeries> {
    let raw = std::fs::read_to_string(input).with_context(|| format!("reading {input}"))?;
    let observations: Vec<Observation> = serde_json::from_str(&raw)?;
    tracing::info!("Loaded {} observations from {}", observations.len(), input);

    let mut pivoted = pivot_observations(&observations, None)?;
    let series = pivoted
        .remove(target)
        .with_context(|| format!("no observations for code '{target}'"))?;

    match &config.preprocessing.impute {
        Some(name) => {
            let method: ImputeMethod = name.parse()?;
            Ok(impute(&series, method))
        }
        None => {
            if series.missing_count() > 0 {
                tracing::warn!(
                    "Series '{}' has {} missing values and no imputation configured",
                    target,
                    series.missing_count()
                );
            }
            Ok(series)
        }
    }
}

fn run_forecast(
    config: &Config,
    input: &str,
    target: &str,
    start: BoundaryTimestamp,
    end: BoundaryTimestamp,
    cutoff: Option<BoundaryTimestamp>,
    output: Option<&str>,
) -> anyhow::Result<()> {
    let series = load_series(config, input, target)?;
    let trainer = QuantileEnsembleTrainer::from_config(config)?;
    let ensemble = trainer.train(&series, cutoff.unwrap_or(start))?;

    for model in ensemble.models() {
        let selection = model.selection();
        tracing::info!(
            "{}: {:?} validation MAE {:.4} ({} rows)",
            model.level().label(),
            selection.best,
            selection.validation_mae,
            selection.training_rows
        );
    }

    let forecaster = RecursiveForecaster::new(&ensemble, trainer.feature_builder().clone());
    let forecast = forecaster.forecast(&series, start, end)?;

    match output {
        Some(path) => {
            std::fs::write(path, serde_json::to_string_pretty(&forecast)?)?;
            tracing::info!("Wrote {} forecast points to {}", forecast.len(), path);
        }
        None => print_forecast(&forecast),
    }
    Ok(())
}

fn print_forecast(forecast: &Forecast) {
    println!("\nForecast for '{}':\n", forecast.target);
    let header: Vec<String> = forecast
        .levels
        .iter()
        .map(|l| format!("{:>12}", l.label()))
        .collect();
    println!("{:<26}{}", "Timestamp", header.join(""));
    println!("{}", "-".repeat(26 + 12 * forecast.levels.len()));

    for point in &forecast.points {
        let cells: Vec<String> = point
            .values()
            .iter()
            .map(|(_, v)| {
                if v.is_finite() {
                    format!("{:>12.3}", v)
                } else {
                    format!("{:>12}", "-")
                }
            })
            .collect();
        println!("{:<26}{}", point.timestamp.to_rfc3339(), cells.join(""));
    }

    if forecast.unresolved_count() > 0 {
        println!(
            "\n{} of {} hours could not be predicted",
            forecast.unresolved_count(),
            forecast.len()
        );
    }
}

fn dump_features(config: &Config, input: &str, target: &str, output: Option<&str>) -> anyhow::Result<()> {
    let series = load_series(config, input, target)?;
    let trainer = QuantileEnsembleTrainer::from_config(config)?;
    let table: FeatureTable = trainer.feature_builder().build(&series);

    let json = serde_json::to_string_pretty(&table)?;
    match output {
        Some(path) => std::fs::write(path, json)?,
        None => println!("{json}"),
    }
    tracing::info!(
        "{} feature rows for '{}', {} usable for training",
        table.len(),
        target,
        table.valid_count()
    );
    Ok(())
}
