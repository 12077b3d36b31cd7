//! Linear trend extrapolation over the most recent prices.

use chrono::{Datelike, Days, NaiveDate, Weekday};

use crate::errors::{AnalysisError, Result};
use crate::models::{ForecastModel, PriceSeries};

/// Series shorter than this get no forecast.
pub const MIN_FORECAST_POINTS: usize = 30;

/// The fit uses at most this many trailing points.
pub const FIT_WINDOW: usize = 60;

/// Business days predicted past the last observation.
pub const HORIZON: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearFit {
    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastResult {
    pub points: Vec<(NaiveDate, f64)>,
    pub fit: LinearFit,
    pub training_points: usize,
}

impl ForecastResult {
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.points.iter().map(|(d, _)| *d).collect()
    }

    pub fn prices(&self) -> Vec<f64> {
        self.points.iter().map(|(_, p)| *p).collect()
    }

    pub fn model(&self) -> ForecastModel {
        ForecastModel {
            slope: self.fit.slope,
            intercept: self.fit.intercept,
            training_points: self.training_points,
        }
    }
}

/// Ordinary least squares of `ys` against x = `x_start`, `x_start + 1`, ...
pub fn fit_linear(x_start: usize, ys: &[f64]) -> Result<LinearFit> {
    let n = ys.len() as f64;
    let xs = (0..ys.len()).map(|i| (x_start + i) as f64);

    let mean_x = xs.clone().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let (sxy, sxx) = xs.zip(ys).fold((0.0, 0.0), |(sxy, sxx), (x, &y)| {
        let dx = x - mean_x;
        (sxy + dx * (y - mean_y), sxx + dx * dx)
    });

    if ys.is_empty() || sxx == 0.0 {
        return Err(AnalysisError::Computation(format!(
            "regression over {} points is singular",
            ys.len()
        )));
    }

    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;
    if !slope.is_finite() || !intercept.is_finite() {
        return Err(AnalysisError::Computation(
            "regression coefficients are not finite".to_string(),
        ));
    }

    Ok(LinearFit { slope, intercept })
}

pub fn next_business_day(date: NaiveDate) -> Option<NaiveDate> {
    let mut next = date.checked_add_days(Days::new(1))?;
    while matches!(next.weekday(), Weekday::Sat | Weekday::Sun) {
        next = next.checked_add_days(Days::new(1))?;
    }
    Some(next)
}

/// `None` when the series is too short to forecast.
pub fn forecast(series: &PriceSeries) -> Result<Option<ForecastResult>> {
    let n = series.len();
    if n < MIN_FORECAST_POINTS {
        tracing::debug!("Skipping forecast: {} points, need {}", n, MIN_FORECAST_POINTS);
        return Ok(None);
    }

    let prices = series.prices();
    let start = n.saturating_sub(FIT_WINDOW);
    let fit = fit_linear(start, &prices[start..])?;

    let mut date = series
        .last()
        .map(|p| p.date)
        .ok_or_else(|| AnalysisError::EmptyData("series has no points".to_string()))?;

    let mut points = Vec::with_capacity(HORIZON);
    for k in 1..=HORIZON {
        date = next_business_day(date).ok_or_else(|| {
            AnalysisError::Computation(format!("no business day after {}", date))
        })?;
        let predicted = fit.predict((n - 1 + k) as f64);
        if !predicted.is_finite() {
            return Err(AnalysisError::Computation(format!(
                "forecast for {} is not finite",
                date
            )));
        }
        points.push((date, predicted));
    }

    tracing::debug!(
        "Forecast fitted on {} points: slope={:.6}, intercept={:.6}",
        n - start,
        fit.slope,
        fit.intercept
    );

    Ok(Some(ForecastResult {
        points,
        fit,
        training_points: n - start,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PricePoint;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn daily(prices: impl IntoIterator<Item = f64>) -> PriceSeries {
        let start = ymd(2024, 1, 1);
        let points = prices
            .into_iter()
            .enumerate()
            .map(|(i, price)| PricePoint {
                date: start + Days::new(i as u64),
                price,
            })
            .collect();
        PriceSeries::from_points(points).unwrap()
    }

    #[test]
    fn threshold_is_thirty_points() {
        assert!(forecast(&daily((0..29).map(f64::from))).unwrap().is_none());
        assert!(forecast(&daily((0..30).map(f64::from))).unwrap().is_some());
    }

    #[test]
    fn rising_series_extrapolates_its_trend() {
        let series = daily((0..60).map(|i| 100.0 + f64::from(i)));
        let result = forecast(&series).unwrap().unwrap();

        assert!((result.fit.slope - 1.0).abs() < 1e-9);
        assert_eq!(result.points.len(), HORIZON);
        assert_eq!(result.training_points, 60);
        let last = series.last().unwrap().price;
        assert!((result.points[0].1 - (last + 1.0)).abs() < 1e-6);
        assert!((result.points[6].1 - (last + 7.0)).abs() < 1e-6);
    }

    #[test]
    fn fit_uses_global_index_over_trailing_window() {
        // flat history followed by a 60-point ramp
        let series = daily((0..100).map(|i| if i < 40 { 0.0 } else { f64::from(i) }));
        let result = forecast(&series).unwrap().unwrap();

        assert_eq!(result.training_points, FIT_WINDOW);
        assert!((result.fit.slope - 1.0).abs() < 1e-9);
        assert!(result.fit.intercept.abs() < 1e-6);
        assert!((result.points[0].1 - 100.0).abs() < 1e-6);
    }

    #[test]
    fn forecast_dates_skip_weekends() {
        // 2024-01-01 + 29 days = Tuesday 2024-01-30
        let result = forecast(&daily((0..30).map(f64::from))).unwrap().unwrap();
        assert_eq!(
            result.dates(),
            vec![
                ymd(2024, 1, 31),
                ymd(2024, 2, 1),
                ymd(2024, 2, 2),
                ymd(2024, 2, 5),
                ymd(2024, 2, 6),
                ymd(2024, 2, 7),
                ymd(2024, 2, 8),
            ]
        );
    }

    #[test]
    fn negative_predictions_are_not_clipped() {
        let series = daily((0..30).map(|i| 10.0 - f64::from(i)));
        let result = forecast(&series).unwrap().unwrap();
        assert!(result.prices().iter().all(|p| *p < 0.0));
    }

    #[test]
    fn singular_fit_is_an_error() {
        assert!(matches!(fit_linear(0, &[5.0]), Err(AnalysisError::Computation(_))));
        assert!(matches!(fit_linear(0, &[]), Err(AnalysisError::Computation(_))));
    }

    #[test]
    fn overflowing_fit_is_an_error() {
        let err = fit_linear(0, &[f64::MAX, -f64::MAX, f64::MAX]).unwrap_err();
        assert!(matches!(err, AnalysisError::Computation(_)));
    }

    #[test]
    fn friday_rolls_to_monday() {
        assert_eq!(next_business_day(ymd(2024, 1, 5)), Some(ymd(2024, 1, 8)));
        assert_eq!(next_business_day(ymd(2024, 1, 6)), Some(ymd(2024, 1, 8)));
        assert_eq!(next_business_day(ymd(2024, 1, 8)), Some(ymd(2024, 1, 9)));
    }
}
