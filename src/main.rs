//! CLI entry point for the drive metrics tool.
//!
//! Provides subcommands for summarizing a month's movement report and for
//! checking a single speed-limit lookup.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use drive_metrics::cache::SpeedLimitCache;
use drive_metrics::config::AggregatorConfig;
use drive_metrics::infra::here::HereSpeedLimitClient;
use drive_metrics::metrics::Aggregator;
use drive_metrics::logging::{self, LogSettings};
use drive_metrics::model::Coordinate;
use drive_metrics::output::{ExportRow, log_summary, write_export};
use drive_metrics::period::{PeriodMode, ReportPeriod};
use drive_metrics::report::load_report;
use drive_metrics::services::speed_limit::{SegmentKey, SpeedLimitLookup};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "drive_metrics")]
#[command(about = "Derive monthly driving-behaviour metrics from a movement report", long_about = None)]
struct Cli {
    /// More log output on stderr (repeatable)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Less log output on stderr (repeatable)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    quiet: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize a movement report for one vehicle-month
    Summarize {
        /// Movement report CSV
        #[arg(value_name = "REPORT")]
        report: String,

        /// Aggregator configuration JSON
        #[arg(short, long)]
        config: Option<String>,

        /// Reporting month (YYYY-MM); derived from the report when omitted
        #[arg(short, long)]
        month: Option<String>,

        /// Stop the period at the last day in the report
        #[arg(long, default_value_t = false)]
        month_to_date: bool,

        /// Resolve missing speed limits through the HERE API
        #[arg(long, default_value_t = false)]
        external_speed_lookup: bool,

        /// Export CSV; the row for this month is added or replaced
        #[arg(short, long, default_value = "drive_summary.csv")]
        output: String,

        /// Also log the full summary as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Look up the speed limit at one position
    SpeedLimit {
        #[arg(allow_hyphen_values = true)]
        latitude: f64,
        #[arg(allow_hyphen_values = true)]
        longitude: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // HERE_API_KEY and LOG_FILE_PATH may come from .env.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let _log_guard = logging::init(&LogSettings::from_flags(cli.verbose, cli.quiet))
        .context("Failed to set up logging")?;

    match cli.command {
        Commands::Summarize {
            report,
            config,
            month,
            month_to_date,
            external_speed_lookup,
            output,
            json,
        } => {
            let mut config = match config {
                Some(path) => AggregatorConfig::load(&path)
                    .with_context(|| format!("Failed to load config '{path}'"))?,
                None => AggregatorConfig::default(),
            };
            if external_speed_lookup {
                config.use_external_speed_lookup = true;
            }
            if month_to_date {
                config.period_mode = PeriodMode::MonthToDate;
            }

            summarize(&report, config, month.as_deref(), &output, json).await?;
        }
        Commands::SpeedLimit {
            latitude,
            longitude,
        } => {
            let client = HereSpeedLimitClient::from_env()?;
            let key = SegmentKey::from_coordinate(Coordinate::new(latitude, longitude));
            match client.lookup(&key).await? {
                Some(limit) => info!(segment = %key, limit, "Speed limit found"),
                None => warn!(segment = %key, "No speed limit known"),
            }
        }
    }

    Ok(())
}

/// Loads the report, aggregates it and stores the export row in `output`.
#[tracing::instrument(skip(config))]
async fn summarize(
    report_path: &str,
    config: AggregatorConfig,
    month: Option<&str>,
    output: &str,
    json: bool,
) -> Result<()> {
    let aggregator = Aggregator::new(config)?;

    let period = month.map(ReportPeriod::parse_month).transpose()?;

    let mut cache = if aggregator.config().use_external_speed_lookup {
        let client = HereSpeedLimitClient::from_env()?;
        SpeedLimitCache::new(Arc::new(client))
    } else {
        SpeedLimitCache::disabled()
    };

    let report = load_report(report_path)
        .with_context(|| format!("Failed to read report '{report_path}'"))?;

    let summary = aggregator.summarize(&report, period, &mut cache).await?;

    for warning in &summary.warnings {
        warn!(%warning, "Partial data");
    }

    log_summary(&summary, json)?;

    write_export(output, &ExportRow::from(&summary))
        .with_context(|| format!("Failed to write export '{output}'"))?;
    info!(output, "Summary written");

    Ok(())
}
