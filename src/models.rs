use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::{AnalysisError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub price: f64,
}

/// Daily prices, ascending by date, one point per date, never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    points: Vec<PricePoint>,
}

impl PriceSeries {
    /// Sorts by date; for repeated dates the point that came last in the input wins.
    pub fn from_points(mut points: Vec<PricePoint>) -> Result<Self> {
        if points.is_empty() {
            return Err(AnalysisError::EmptyData("series has no points".to_string()));
        }

        // stable sort keeps input order among equal dates
        points.sort_by_key(|p| p.date);

        let mut unique: Vec<PricePoint> = Vec::with_capacity(points.len());
        for point in points {
            match unique.last_mut() {
                Some(last) if last.date == point.date => *last = point,
                _ => unique.push(point),
            }
        }

        Ok(PriceSeries { points: unique })
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn prices(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.price).collect()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.points.iter().map(|p| p.date).collect()
    }

    pub fn last(&self) -> Option<&PricePoint> {
        self.points.last()
    }
}

/// How the chart part of a report is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartMode {
    /// SVG file written to the chart directory.
    Image,
    /// Labeled series returned in the response for client-side plotting.
    Inline,
}

impl FromStr for ChartMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "image" => Ok(ChartMode::Image),
            "inline" => Ok(ChartMode::Inline),
            other => Err(format!("unknown chart mode '{other}', expected 'image' or 'inline'")),
        }
    }
}

impl fmt::Display for ChartMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChartMode::Image => f.write_str("image"),
            ChartMode::Inline => f.write_str("inline"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartDataset {
    pub label: String,
    pub data: Vec<Option<f64>>,
    pub border_color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartData {
    pub labels: Vec<String>,
    pub datasets: Vec<ChartDataset>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastModel {
    pub slope: f64,
    pub intercept: f64,
    pub training_points: usize,
}

/// The document an analysis run emits on success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisOutput {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub price_column: String,
    pub dates: Vec<String>,
    #[serde(default)]
    pub prices: Vec<f64>,
    pub avg: f64,
    pub dma50: Vec<Option<f64>>,
    pub dma100: Vec<Option<f64>>,
    pub dma200: Vec<Option<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_data: Option<ChartData>,
    pub has_predictions: bool,
    #[serde(default)]
    pub predictions: Vec<f64>,
    #[serde(default)]
    pub prediction_dates: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forecast_model: Option<ForecastModel>,
    #[serde(default)]
    pub dropped_rows: usize,
    #[serde(default)]
    pub non_positive_prices: usize,
}

/// Either an error document or an analysis document. A document carrying an
/// `error` field is a failure even if the rest of it looks complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EngineResponse {
    Failure { error: String },
    Success(Box<AnalysisOutput>),
}

impl From<Result<AnalysisOutput>> for EngineResponse {
    fn from(result: Result<AnalysisOutput>) -> Self {
        match result {
            Ok(output) => EngineResponse::Success(Box::new(output)),
            Err(e) => EngineResponse::Failure { error: e.to_string() },
        }
    }
}

/// What `POST /api/upload` returns: the analysis plus a reachable chart URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    #[serde(flatten)]
    pub analysis: AnalysisOutput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_url: Option<String>,
}
