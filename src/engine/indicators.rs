//! Simple moving averages over the daily price series.
//!
//! Each window is computed in one pass over a running mean. The mean is built
//! incrementally while the window fills, then shifted by
//! `(entering - leaving) / window`, so a window of identical prices averages
//! to exactly that price.

use crate::errors::{AnalysisError, Result};
use crate::models::PriceSeries;

/// Lookback windows reported as `dma50`, `dma100` and `dma200`.
pub const DMA_WINDOWS: [usize; 3] = [50, 100, 200];

/// SMA of `prices` over `window`. The first `window - 1` entries are `None`.
pub fn simple_moving_average(prices: &[f64], window: usize) -> Vec<Option<f64>> {
    let n = prices.len();
    let mut result = vec![None; n];
    if window == 0 || n < window {
        return result;
    }

    let mut mean = 0.0;
    for (k, &price) in prices[..window].iter().enumerate() {
        mean += (price - mean) / (k + 1) as f64;
    }
    result[window - 1] = Some(mean);

    let w = window as f64;
    for i in window..n {
        mean += (prices[i] - prices[i - window]) / w;
        result[i] = Some(mean);
    }

    result
}

#[derive(Debug, Clone, PartialEq)]
pub struct MovingAverage {
    pub window: usize,
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MovingAverageSet {
    averages: Vec<MovingAverage>,
}

impl MovingAverageSet {
    /// Averages for every window in [`DMA_WINDOWS`]. Fails if a value
    /// overflows, which only happens for prices near `f64::MAX`.
    pub fn compute(series: &PriceSeries) -> Result<Self> {
        let prices = series.prices();
        let mut averages = Vec::with_capacity(DMA_WINDOWS.len());

        for window in DMA_WINDOWS {
            let values = simple_moving_average(&prices, window);
            if let Some(i) = values.iter().position(|v| v.is_some_and(|v| !v.is_finite())) {
                return Err(AnalysisError::Computation(format!(
                    "{}-day moving average is not finite at {}",
                    window,
                    series.points()[i].date
                )));
            }
            averages.push(MovingAverage { window, values });
        }

        Ok(MovingAverageSet { averages })
    }

    pub fn get(&self, window: usize) -> Option<&[Option<f64>]> {
        self.averages
            .iter()
            .find(|ma| ma.window == window)
            .map(|ma| ma.values.as_slice())
    }

    /// Values for `window`, or all-`None` of length `len` if that window was not computed.
    pub fn values_or_empty(&self, window: usize, len: usize) -> Vec<Option<f64>> {
        self.get(window)
            .map(<[Option<f64>]>::to_vec)
            .unwrap_or_else(|| vec![None; len])
    }

    pub fn iter(&self) -> impl Iterator<Item = &MovingAverage> {
        self.averages.iter()
    }
}
