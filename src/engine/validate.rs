use serde::Serialize;

use crate::errors::{AnalysisError, Result};
use crate::models::PriceSeries;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesStats {
    pub avg: f64,
    /// Zero or negative prices. They stay in the series; adjusted data can contain them.
    pub non_positive: usize,
}

pub fn validate(series: &PriceSeries) -> Result<SeriesStats> {
    let points = series.points();
    if points.is_empty() {
        return Err(AnalysisError::EmptyData("series has no points".to_string()));
    }

    if let Some(pair) = points.windows(2).find(|w| w[0].date >= w[1].date) {
        return Err(AnalysisError::Computation(format!(
            "dates are not strictly increasing at {} -> {}",
            pair[0].date, pair[1].date
        )));
    }

    if let Some(bad) = points.iter().find(|p| !p.price.is_finite()) {
        return Err(AnalysisError::Computation(format!(
            "non-finite price on {}",
            bad.date
        )));
    }

    let prices = series.prices();
    let avg = prices.iter().sum::<f64>() / prices.len() as f64;
    if !avg.is_finite() {
        return Err(AnalysisError::Computation(
            "average price overflows f64".to_string(),
        ));
    }
    let non_positive = prices.iter().filter(|&&p| p <= 0.0).count();

    if non_positive > 0 {
        tracing::warn!("{} non-positive prices retained in series", non_positive);
    }

    Ok(SeriesStats { avg, non_positive })
}
