//! Server-side chart rendering to SVG files.

use std::fmt::{self, Write};
use std::fs;
use std::path::PathBuf;

use chrono::{Datelike, NaiveDate};
use uuid::Uuid;

use super::{average_color, average_label, ChartArtifact, ChartInput, ChartRenderer, FORECAST_COLOR, PRICE_COLOR};
use crate::errors::{AnalysisError, Result};

const WIDTH: f64 = 960.0;
const PANEL_HEIGHT: f64 = 480.0;
const MARGIN_LEFT: f64 = 80.0;
const MARGIN_RIGHT: f64 = 24.0;
const MARGIN_TOP: f64 = 48.0;
const MARGIN_BOTTOM: f64 = 48.0;
const Y_TICKS: usize = 5;

/// Actual prices shown next to the forecast in the second panel.
const CONTEXT_POINTS: usize = 10;

/// Writes each chart to `<output_dir>/chart-<uuid>.svg` so concurrent
/// analyses never overwrite each other's file.
#[derive(Debug, Clone)]
pub struct SvgChartRenderer {
    output_dir: PathBuf,
    route: String,
}

impl SvgChartRenderer {
    pub fn new(output_dir: impl Into<PathBuf>, route: &str) -> Self {
        SvgChartRenderer {
            output_dir: output_dir.into(),
            route: route.trim_matches('/').to_string(),
        }
    }
}

impl ChartRenderer for SvgChartRenderer {
    fn render(&self, chart: &ChartInput<'_>) -> Result<ChartArtifact> {
        let svg = render_svg(chart)
            .map_err(|_| AnalysisError::Computation("failed to format chart".to_string()))?;

        fs::create_dir_all(&self.output_dir).map_err(|source| AnalysisError::ArtifactWrite {
            path: self.output_dir.clone(),
            source,
        })?;

        let file_name = format!("chart-{}.svg", Uuid::new_v4());
        let path = self.output_dir.join(&file_name);
        fs::write(&path, svg).map_err(|source| AnalysisError::ArtifactWrite {
            path: path.clone(),
            source,
        })?;

        tracing::debug!("Chart written to {}", path.display());

        let chart_path = if self.route.is_empty() {
            file_name
        } else {
            format!("{}/{}", self.route, file_name)
        };
        Ok(ChartArtifact::Image { path, chart_path })
    }
}

struct Line {
    label: String,
    color: &'static str,
    points: Vec<(f64, f64)>,
    dashed: bool,
}

struct Panel {
    title: String,
    y_label: String,
    lines: Vec<Line>,
}

fn day_number(date: NaiveDate) -> f64 {
    f64::from(date.num_days_from_ce())
}

fn date_label(x: f64) -> String {
    NaiveDate::from_num_days_from_ce_opt(x.round() as i32)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

pub fn render_svg(chart: &ChartInput<'_>) -> std::result::Result<String, fmt::Error> {
    let points = chart.series.points();
    let xs: Vec<f64> = points.iter().map(|p| day_number(p.date)).collect();

    let mut history = vec![Line {
        label: format!("{} Price", chart.price_column),
        color: PRICE_COLOR,
        points: xs.iter().zip(points).map(|(&x, p)| (x, p.price)).collect(),
        dashed: false,
    }];
    for average in chart.averages.iter() {
        history.push(Line {
            label: average_label(average.window),
            color: average_color(average.window),
            points: xs
                .iter()
                .zip(&average.values)
                .filter_map(|(&x, v)| v.map(|v| (x, v)))
                .collect(),
            dashed: false,
        });
    }

    let mut panels = vec![Panel {
        title: "Stock Price Analysis with Moving Averages".to_string(),
        y_label: format!("{} Price", chart.price_column),
        lines: history,
    }];

    if let Some(forecast) = chart.forecast {
        let context = &points[points.len().saturating_sub(CONTEXT_POINTS)..];
        let predicted: Vec<(f64, f64)> = forecast
            .points
            .iter()
            .map(|(d, p)| (day_number(*d), *p))
            .collect();

        let mut lines = vec![
            Line {
                label: "Recent Actual Price".to_string(),
                color: PRICE_COLOR,
                points: context.iter().map(|p| (day_number(p.date), p.price)).collect(),
                dashed: false,
            },
            Line {
                label: "Predicted Price".to_string(),
                color: FORECAST_COLOR,
                points: predicted.clone(),
                dashed: false,
            },
        ];
        if let (Some(last), Some(first)) = (points.last(), predicted.first()) {
            lines.push(Line {
                label: String::new(),
                color: "gray",
                points: vec![(day_number(last.date), last.price), *first],
                dashed: true,
            });
        }

        panels.push(Panel {
            title: format!("{}-Day Price Prediction (Linear Trend)", forecast.points.len()),
            y_label: format!("Predicted {} Price", chart.price_column),
            lines,
        });
    }

    let height = PANEL_HEIGHT * panels.len() as f64;
    let mut out = String::new();
    writeln!(
        out,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{WIDTH}" height="{height}" viewBox="0 0 {WIDTH} {height}" font-family="sans-serif" font-size="12">"#
    )?;
    writeln!(out, r#"<rect width="100%" height="100%" fill="white"/>"#)?;
    for (i, panel) in panels.iter().enumerate() {
        draw_panel(&mut out, panel, PANEL_HEIGHT * i as f64)?;
    }
    writeln!(out, "</svg>")?;
    Ok(out)
}

fn bounds(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !lo.is_finite() || !hi.is_finite() {
        (0.0, 1.0)
    } else if lo == hi {
        (lo - 1.0, hi + 1.0)
    } else {
        (lo, hi)
    }
}

fn draw_panel(out: &mut String, panel: &Panel, top: f64) -> fmt::Result {
    let left = MARGIN_LEFT;
    let right = WIDTH - MARGIN_RIGHT;
    let plot_top = top + MARGIN_TOP;
    let plot_bottom = top + PANEL_HEIGHT - MARGIN_BOTTOM;

    let all = || panel.lines.iter().flat_map(|l| l.points.iter().copied());
    let (x_min, x_max) = bounds(all().map(|(x, _)| x));
    let (y_lo, y_hi) = bounds(all().map(|(_, y)| y));
    let pad = (y_hi - y_lo) * 0.05;
    let (y_min, y_max) = (y_lo - pad, y_hi + pad);

    let sx = |x: f64| left + (x - x_min) / (x_max - x_min) * (right - left);
    let sy = |y: f64| plot_bottom - (y - y_min) / (y_max - y_min) * (plot_bottom - plot_top);

    writeln!(
        out,
        r#"<text x="{}" y="{}" text-anchor="middle" font-size="16">{}</text>"#,
        WIDTH / 2.0,
        top + 28.0,
        panel.title
    )?;

    for i in 0..=Y_TICKS {
        let value = y_min + (y_max - y_min) * i as f64 / Y_TICKS as f64;
        let y = sy(value);
        writeln!(
            out,
            r##"<line x1="{left}" y1="{y:.1}" x2="{right}" y2="{y:.1}" stroke="#ddd"/>"##
        )?;
        writeln!(
            out,
            r#"<text x="{:.1}" y="{:.1}" text-anchor="end">{:.2}</text>"#,
            left - 6.0,
            y + 4.0,
            value
        )?;
    }

    for x in [x_min, (x_min + x_max) / 2.0, x_max] {
        writeln!(
            out,
            r#"<text x="{:.1}" y="{:.1}" text-anchor="middle">{}</text>"#,
            sx(x),
            plot_bottom + 18.0,
            date_label(x)
        )?;
    }
    writeln!(
        out,
        r#"<text x="{:.1}" y="{:.1}" text-anchor="middle">Date</text>"#,
        (left + right) / 2.0,
        plot_bottom + 38.0
    )?;
    writeln!(
        out,
        r#"<text x="18" y="{:.1}" text-anchor="middle" transform="rotate(-90 18 {:.1})">{}</text>"#,
        (plot_top + plot_bottom) / 2.0,
        (plot_top + plot_bottom) / 2.0,
        panel.y_label
    )?;
    writeln!(
        out,
        r#"<rect x="{left}" y="{plot_top}" width="{}" height="{}" fill="none" stroke="black"/>"#,
        right - left,
        plot_bottom - plot_top
    )?;

    for line in panel.lines.iter().filter(|l| !l.points.is_empty()) {
        let coords = line
            .points
            .iter()
            .map(|&(x, y)| format!("{:.1},{:.1}", sx(x), sy(y)))
            .collect::<Vec<_>>()
            .join(" ");
        let dash = if line.dashed { r#" stroke-dasharray="3 3""# } else { "" };
        writeln!(
            out,
            r#"<polyline fill="none" stroke="{}" stroke-width="1.5"{} points="{}"/>"#,
            line.color, dash, coords
        )?;
    }

    let legend: Vec<&Line> = panel.lines.iter().filter(|l| !l.label.is_empty()).collect();
    for (i, line) in legend.iter().enumerate() {
        let y = plot_top + 16.0 + 16.0 * i as f64;
        writeln!(
            out,
            r#"<line x1="{:.1}" y1="{y:.1}" x2="{:.1}" y2="{y:.1}" stroke="{}" stroke-width="2"/>"#,
            left + 10.0,
            left + 30.0,
            line.color
        )?;
        writeln!(
            out,
            r#"<text x="{:.1}" y="{:.1}">{}</text>"#,
            left + 36.0,
            y + 4.0,
            line.label
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::forecast::forecast;
    use crate::engine::indicators::MovingAverageSet;
    use crate::models::{PricePoint, PriceSeries};
    use chrono::Days;

    fn daily(count: u64) -> PriceSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let points = (0..count)
            .map(|i| PricePoint {
                date: start + Days::new(i),
                price: 50.0 + (i % 7) as f64,
            })
            .collect();
        PriceSeries::from_points(points).unwrap()
    }

    #[test]
    fn single_panel_without_forecast() {
        let series = daily(10);
        let averages = MovingAverageSet::compute(&series).unwrap();
        let svg = render_svg(&ChartInput {
            series: &series,
            price_column: "Avg",
            averages: &averages,
            forecast: None,
        })
        .unwrap();

        assert!(svg.starts_with("<svg"));
        assert!(svg.contains(r#"height="480""#));
        assert!(svg.contains("Avg Price"));
        assert!(!svg.contains("Predicted"));
    }

    #[test]
    fn second_panel_with_forecast() {
        let series = daily(40);
        let averages = MovingAverageSet::compute(&series).unwrap();
        let prediction = forecast(&series).unwrap().unwrap();
        let svg = render_svg(&ChartInput {
            series: &series,
            price_column: "Close",
            averages: &averages,
            forecast: Some(&prediction),
        })
        .unwrap();

        assert!(svg.contains(r#"height="960""#));
        assert!(svg.contains("7-Day Price Prediction"));
        assert!(svg.contains("stroke-dasharray"));
    }

    #[test]
    fn each_render_gets_its_own_file() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = SvgChartRenderer::new(dir.path().join("charts"), "/uploads/");
        let series = daily(3);
        let averages = MovingAverageSet::compute(&series).unwrap();
        let input = ChartInput {
            series: &series,
            price_column: "Avg",
            averages: &averages,
            forecast: None,
        };

        let first = renderer.render(&input).unwrap();
        let second = renderer.render(&input).unwrap();

        match (first, second) {
            (
                ChartArtifact::Image { path: a, chart_path: rel_a },
                ChartArtifact::Image { path: b, .. },
            ) => {
                assert_ne!(a, b);
                assert!(a.exists() && b.exists());
                assert!(rel_a.starts_with("uploads/chart-"));
                assert!(rel_a.ends_with(".svg"));
            }
            other => panic!("expected image artifacts, got {other:?}"),
        }
    }

    #[test]
    fn single_point_series_still_renders() {
        let series = daily(1);
        let averages = MovingAverageSet::compute(&series).unwrap();
        let svg = render_svg(&ChartInput {
            series: &series,
            price_column: "Avg",
            averages: &averages,
            forecast: None,
        })
        .unwrap();
        assert!(!svg.contains("NaN"));
    }
}
