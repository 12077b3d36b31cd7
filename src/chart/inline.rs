use super::{average_color, average_label, ChartArtifact, ChartInput, ChartRenderer, FORECAST_COLOR, PRICE_COLOR};
use crate::errors::Result;
use crate::models::{ChartData, ChartDataset};

/// Returns labeled series for a client-side chart instead of writing a file.
///
/// Labels cover the observed dates followed by the forecast dates; each
/// historical dataset is padded with `null` over the forecast range. The
/// forecast line starts at the last observed price so it joins the price line.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineChartRenderer;

impl ChartRenderer for InlineChartRenderer {
    fn render(&self, chart: &ChartInput<'_>) -> Result<ChartArtifact> {
        Ok(ChartArtifact::Inline(chart_data(chart)))
    }
}

pub fn chart_data(chart: &ChartInput<'_>) -> ChartData {
    let n = chart.series.len();
    let horizon = chart.forecast.map_or(0, |f| f.points.len());
    let padding = std::iter::repeat(None).take(horizon);

    let mut labels: Vec<String> = chart
        .series
        .dates()
        .iter()
        .map(|d| d.format("%Y-%m-%d").to_string())
        .collect();

    let mut datasets = vec![ChartDataset {
        label: format!("{} Price", chart.price_column),
        data: chart
            .series
            .prices()
            .into_iter()
            .map(Some)
            .chain(padding.clone())
            .collect(),
        border_color: PRICE_COLOR.to_string(),
    }];

    for average in chart.averages.iter() {
        datasets.push(ChartDataset {
            label: average_label(average.window),
            data: average.values.iter().copied().chain(padding.clone()).collect(),
            border_color: average_color(average.window).to_string(),
        });
    }

    if let Some(forecast) = chart.forecast {
        labels.extend(forecast.dates().iter().map(|d| d.format("%Y-%m-%d").to_string()));

        let mut data = vec![None; n.saturating_sub(1)];
        data.push(chart.series.last().map(|p| p.price));
        data.extend(forecast.prices().into_iter().map(Some));

        datasets.push(ChartDataset {
            label: "Predicted Price".to_string(),
            data,
            border_color: FORECAST_COLOR.to_string(),
        });
    }

    ChartData { labels, datasets }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::forecast::forecast;
    use crate::engine::indicators::MovingAverageSet;
    use crate::models::{PricePoint, PriceSeries};
    use chrono::{Days, NaiveDate};

    fn daily(count: u64) -> PriceSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let points = (0..count)
            .map(|i| PricePoint {
                date: start + Days::new(i),
                price: 100.0 + i as f64,
            })
            .collect();
        PriceSeries::from_points(points).unwrap()
    }

    #[test]
    fn short_series_has_price_and_average_lines_only() {
        let series = daily(2);
        let averages = MovingAverageSet::compute(&series).unwrap();
        let data = chart_data(&ChartInput {
            series: &series,
            price_column: "Avg",
            averages: &averages,
            forecast: None,
        });

        assert_eq!(data.labels, vec!["2024-01-01", "2024-01-02"]);
        assert_eq!(data.datasets.len(), 4);
        assert_eq!(data.datasets[0].label, "Avg Price");
        assert_eq!(data.datasets[1].label, "50 DMA");
        assert_eq!(data.datasets[1].data, vec![None, None]);
    }

    #[test]
    fn forecast_extends_labels_and_joins_the_price_line() {
        let series = daily(40);
        let averages = MovingAverageSet::compute(&series).unwrap();
        let prediction = forecast(&series).unwrap().unwrap();
        let data = chart_data(&ChartInput {
            series: &series,
            price_column: "Close",
            averages: &averages,
            forecast: Some(&prediction),
        });

        assert_eq!(data.labels.len(), 47);
        assert!(data.datasets.iter().all(|d| d.data.len() == 47));

        let predicted = data.datasets.last().unwrap();
        assert_eq!(predicted.label, "Predicted Price");
        assert_eq!(predicted.data[38], None);
        assert_eq!(predicted.data[39], Some(139.0));
        assert!(predicted.data[40].is_some());
        assert_eq!(data.datasets[0].data[40], None);
    }
}
