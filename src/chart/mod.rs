use std::path::{Path, PathBuf};

use crate::engine::forecast::ForecastResult;
use crate::engine::indicators::MovingAverageSet;
use crate::errors::Result;
use crate::models::{ChartData, ChartMode, PriceSeries};

pub mod inline;
pub mod svg;

pub use inline::InlineChartRenderer;
pub use svg::SvgChartRenderer;

pub const PRICE_COLOR: &str = "blue";
pub const FORECAST_COLOR: &str = "purple";

pub fn average_color(window: usize) -> &'static str {
    match window {
        50 => "orange",
        100 => "green",
        200 => "red",
        _ => "gray",
    }
}

pub fn average_label(window: usize) -> String {
    format!("{} DMA", window)
}

/// Everything a renderer may draw, borrowed from the report being assembled.
#[derive(Debug, Clone, Copy)]
pub struct ChartInput<'a> {
    pub series: &'a PriceSeries,
    pub price_column: &'a str,
    pub averages: &'a MovingAverageSet,
    pub forecast: Option<&'a ForecastResult>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChartArtifact {
    /// A file written by the renderer. `chart_path` is relative to the static route.
    Image { path: PathBuf, chart_path: String },
    Inline(ChartData),
}

pub trait ChartRenderer: Send + Sync {
    fn render(&self, chart: &ChartInput<'_>) -> Result<ChartArtifact>;
}

pub fn renderer_for(mode: ChartMode, chart_dir: &Path, route: &str) -> Box<dyn ChartRenderer> {
    match mode {
        ChartMode::Image => Box::new(SvgChartRenderer::new(chart_dir, route)),
        ChartMode::Inline => Box::new(InlineChartRenderer),
    }
}
