//! Command-line form of the analysis step.
//!
//! Prints one JSON document on stdout: the analysis on success, or
//! `{"error": ...}` with exit status 1 on failure. Logs go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use stock_analyzer::{ChartMode, Engine, EngineConfig, EngineResponse};

/// Analyze a daily price file (CSV or spreadsheet) and print the result as JSON.
#[derive(Debug, Parser)]
#[command(name = "stock-analyze", version, about)]
struct Args {
    /// Price file: .csv, .xlsx, .xlsm, .xls or .ods
    input: PathBuf,

    /// Directory chart images are written to
    #[arg(long, env = "CHART_DIR", default_value = "uploads")]
    chart_dir: PathBuf,

    /// Route prefix reported in `chartPath`
    #[arg(long, env = "CHART_ROUTE", default_value = "uploads")]
    chart_route: String,

    /// `image` writes an SVG file, `inline` returns chart data
    #[arg(long, env = "CHART_MODE", default_value = "image")]
    chart_mode: ChartMode,

    /// Refuse inputs with more data rows than this
    #[arg(long, env = "MAX_ROWS")]
    max_rows: Option<usize>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let engine = Engine::new(&EngineConfig {
        chart_mode: args.chart_mode,
        chart_dir: args.chart_dir,
        chart_route: args.chart_route,
        max_rows: args.max_rows,
    });

    let result = engine.analyze_file(&args.input).map(|report| report.to_output());
    if let Err(e) = &result {
        tracing::error!("Analysis of {} failed: {}", args.input.display(), e);
    }
    let failed = result.is_err();

    match serde_json::to_string(&EngineResponse::from(result)) {
        Ok(doc) => println!("{}", doc),
        Err(e) => {
            eprintln!("Failed to serialize result: {}", e);
            return ExitCode::FAILURE;
        }
    }

    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
