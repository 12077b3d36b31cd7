//! The price analysis pipeline: ingest, validate, moving averages, optional
//! forecast, report. Synchronous and free of shared state; the only side
//! effect is the chart file written by an image renderer.

use std::path::{Path, PathBuf};

use crate::chart::{renderer_for, ChartRenderer};
use crate::errors::Result;
use crate::models::ChartMode;

pub mod forecast;
pub mod indicators;
pub mod ingest;
pub mod report;
pub mod validate;

pub use forecast::ForecastResult;
pub use indicators::MovingAverageSet;
pub use ingest::RawTable;
pub use report::AnalysisReport;
pub use validate::SeriesStats;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub chart_mode: ChartMode,
    pub chart_dir: PathBuf,
    /// Static route the chart directory is served under, e.g. `uploads`.
    pub chart_route: String,
    pub max_rows: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            chart_mode: ChartMode::Image,
            chart_dir: PathBuf::from("uploads"),
            chart_route: "uploads".to_string(),
            max_rows: None,
        }
    }
}

pub struct Engine {
    renderer: Box<dyn ChartRenderer>,
    max_rows: Option<usize>,
}

impl Engine {
    pub fn new(config: &EngineConfig) -> Self {
        Engine {
            renderer: renderer_for(config.chart_mode, &config.chart_dir, &config.chart_route),
            max_rows: config.max_rows,
        }
    }

    pub fn with_renderer(renderer: Box<dyn ChartRenderer>, max_rows: Option<usize>) -> Self {
        Engine { renderer, max_rows }
    }

    pub fn analyze_file(&self, path: &Path) -> Result<AnalysisReport> {
        tracing::info!("Analyzing {}", path.display());
        let table = ingest::read_table(path)?;
        self.analyze_table(&table)
    }

    pub fn analyze_table(&self, table: &RawTable) -> Result<AnalysisReport> {
        let ingested = ingest::ingest(table, self.max_rows)?;
        let stats = validate::validate(&ingested.series)?;
        let averages = MovingAverageSet::compute(&ingested.series)?;
        let forecast = forecast::forecast(&ingested.series)?;

        let report = report::assemble(ingested, stats, averages, forecast, self.renderer.as_ref())?;
        tracing::info!(
            "Analysis completed: {} points, avg {:.4}, predictions: {}",
            report.series.len(),
            report.avg(),
            report.has_predictions()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::{ChartArtifact, InlineChartRenderer};
    use crate::errors::AnalysisError;

    fn inline_engine() -> Engine {
        Engine::with_renderer(Box::new(InlineChartRenderer), None)
    }

    fn csv_table(csv: &str) -> RawTable {
        ingest::read_csv(csv.as_bytes()).unwrap()
    }

    #[test]
    fn two_rows_give_average_and_empty_dma() {
        let report = inline_engine()
            .analyze_table(&csv_table("Date,Avg\n2024-01-01,10\n2024-01-02,20\n"))
            .unwrap();
        let output = report.to_output();

        assert_eq!(output.avg, 15.0);
        assert_eq!(output.dates, vec!["2024-01-01", "2024-01-02"]);
        assert_eq!(output.dma50, vec![None, None]);
        assert_eq!(output.dma200.len(), 2);
        assert!(!output.has_predictions);
        assert!(output.predictions.is_empty());
        assert!(output.chart_data.is_some());
        assert!(output.chart_path.is_none());
    }

    #[test]
    fn missing_columns_produce_no_report() {
        let err = inline_engine()
            .analyze_table(&csv_table("Day,Open\n2024-01-01,10\n"))
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Format(_)));
    }

    #[test]
    fn image_mode_reports_relative_chart_path() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::new(&EngineConfig {
            chart_mode: ChartMode::Image,
            chart_dir: dir.path().to_path_buf(),
            chart_route: "uploads".to_string(),
            max_rows: None,
        });
        let report = engine
            .analyze_table(&csv_table("Date,Close\n2024-01-01,1\n2024-01-02,2\n"))
            .unwrap();

        let ChartArtifact::Image { path, chart_path } = &report.chart else {
            panic!("expected an image artifact");
        };
        assert!(path.starts_with(dir.path()));
        assert_eq!(report.to_output().chart_path.as_deref(), Some(chart_path.as_str()));
    }

    #[test]
    fn forecast_model_is_reported() {
        let mut csv = String::from("Date,Close\n");
        let start = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        for i in 0..60u64 {
            let date = start + chrono::Days::new(i);
            csv.push_str(&format!("{},{}\n", date, 100 + i));
        }
        let output = inline_engine().analyze_table(&csv_table(&csv)).unwrap().to_output();

        assert!(output.has_predictions);
        assert_eq!(output.predictions.len(), 7);
        assert_eq!(output.prediction_dates.len(), 7);
        let model = output.forecast_model.unwrap();
        assert!((model.slope - 1.0).abs() < 1e-9);
        assert!((output.predictions[0] - 160.0).abs() < 1e-6);
    }

    #[test]
    fn overflowing_prices_fail_instead_of_emitting_null() {
        let err = inline_engine()
            .analyze_table(&csv_table("Date,Close\n2024-01-01,1e308\n2024-01-02,1e308\n"))
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Computation(_)));
    }
}
