use crate::chart::{ChartArtifact, ChartInput, ChartRenderer};
use crate::errors::Result;
use crate::models::{AnalysisOutput, PriceSeries};

use super::forecast::ForecastResult;
use super::indicators::MovingAverageSet;
use super::ingest::Ingested;
use super::validate::SeriesStats;

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisReport {
    pub series: PriceSeries,
    pub price_column: String,
    pub moving_averages: MovingAverageSet,
    pub forecast: Option<ForecastResult>,
    pub stats: SeriesStats,
    pub dropped_rows: usize,
    pub chart: ChartArtifact,
}

/// Renders the chart and bundles the pieces. Fails as a whole if rendering fails.
pub fn assemble(
    ingested: Ingested,
    stats: SeriesStats,
    moving_averages: MovingAverageSet,
    forecast: Option<ForecastResult>,
    renderer: &dyn ChartRenderer,
) -> Result<AnalysisReport> {
    let chart = renderer.render(&ChartInput {
        series: &ingested.series,
        price_column: &ingested.price_column,
        averages: &moving_averages,
        forecast: forecast.as_ref(),
    })?;

    Ok(AnalysisReport {
        series: ingested.series,
        price_column: ingested.price_column,
        moving_averages,
        forecast,
        stats,
        dropped_rows: ingested.dropped.len(),
        chart,
    })
}

impl AnalysisReport {
    pub fn avg(&self) -> f64 {
        self.stats.avg
    }

    pub fn has_predictions(&self) -> bool {
        self.forecast.is_some()
    }

    pub fn to_output(&self) -> AnalysisOutput {
        let n = self.series.len();
        let (chart_path, chart_data) = match &self.chart {
            ChartArtifact::Image { chart_path, .. } => (Some(chart_path.clone()), None),
            ChartArtifact::Inline(data) => (None, Some(data.clone())),
        };
        let format = |d: chrono::NaiveDate| d.format("%Y-%m-%d").to_string();

        AnalysisOutput {
            message: "Analysis completed".to_string(),
            price_column: self.price_column.clone(),
            dates: self.series.dates().into_iter().map(format).collect(),
            prices: self.series.prices(),
            avg: self.stats.avg,
            dma50: self.moving_averages.values_or_empty(50, n),
            dma100: self.moving_averages.values_or_empty(100, n),
            dma200: self.moving_averages.values_or_empty(200, n),
            chart_path,
            chart_data,
            has_predictions: self.has_predictions(),
            predictions: self.forecast.as_ref().map(|f| f.prices()).unwrap_or_default(),
            prediction_dates: self
                .forecast
                .as_ref()
                .map(|f| f.dates().into_iter().map(format).collect())
                .unwrap_or_default(),
            forecast_model: self.forecast.as_ref().map(ForecastResult::model),
            dropped_rows: self.dropped_rows,
            non_positive_prices: self.stats.non_positive,
        }
    }
}
