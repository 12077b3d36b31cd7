//! Reading uploaded price files into a [`PriceSeries`].
//!
//! CSV and spreadsheet inputs are first flattened into a [`RawTable`] of
//! strings so both go through the same column detection and cell parsing.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use chrono::{DateTime, Days, NaiveDate, NaiveDateTime};
use csv::{ReaderBuilder, Trim};
use regex::Regex;

use crate::errors::{AnalysisError, Result};
use crate::models::{PricePoint, PriceSeries};

const DATE_COLUMN: &str = "Date";

/// Price columns in order of preference.
const PRICE_COLUMNS: [&str; 3] = ["Avg", "Close", "Price"];

const DATE_FORMATS: [&str; 6] = [
    "%Y-%m-%d", "%m/%d/%Y", "%d/%m/%Y", "%Y/%m/%d", "%d-%m-%Y", "%m-%d-%Y",
];

const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug)]
pub struct Ingested {
    pub series: PriceSeries,
    pub price_column: String,
    /// Row-level errors for every row that was skipped.
    pub dropped: Vec<AnalysisError>,
}

/// Reads a CSV or spreadsheet file, picking the reader by extension.
pub fn read_table(path: &Path) -> Result<RawTable> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "csv" => read_csv(File::open(path)?),
        "xlsx" | "xlsm" | "xls" | "ods" => read_workbook(path),
        "" => Err(AnalysisError::UnsupportedFormat("(no extension)".to_string())),
        other => Err(AnalysisError::UnsupportedFormat(other.to_string())),
    }
}

pub fn read_csv<R: Read>(input: R) -> Result<RawTable> {
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .trim(Trim::All)
        .from_reader(input);

    let headers = reader
        .byte_headers()?
        .iter()
        .map(|h| String::from_utf8_lossy(h).trim_start_matches('\u{feff}').trim().to_string())
        .collect();

    // lossy: invalid UTF-8 only spoils its own cell
    let mut rows = Vec::new();
    for record in reader.byte_records() {
        let record = record?;
        rows.push(
            record
                .iter()
                .map(|field| String::from_utf8_lossy(field).into_owned())
                .collect(),
        );
    }

    Ok(RawTable { headers, rows })
}

/// First worksheet only; the first row is the header.
fn read_workbook(path: &Path) -> Result<RawTable> {
    let mut workbook = open_workbook_auto(path)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| AnalysisError::EmptyData("workbook has no worksheets".to_string()))??;

    let mut rows = range.rows();
    let headers = match rows.next() {
        Some(header) => header.iter().map(|c| cell_text(c).trim().to_string()).collect(),
        None => return Err(AnalysisError::EmptyData("worksheet is empty".to_string())),
    };
    let rows = rows.map(|row| row.iter().map(cell_text).collect()).collect();

    Ok(RawTable { headers, rows })
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::String(s) | Data::DateTimeIso(s) => s.clone(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::DateTime(dt) => excel_serial_to_date(dt.as_f64())
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
        _ => String::new(),
    }
}

/// Spreadsheet serial dates count days from 1899-12-30.
fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    NaiveDate::from_ymd_opt(1899, 12, 30)?.checked_add_days(Days::new(serial.floor() as u64))
}

/// Finds the first candidate header present in `headers`, case-insensitively.
fn find_column(headers: &[String], candidates: &[&'static str]) -> Option<(usize, &'static str)> {
    candidates.iter().find_map(|candidate| {
        headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(candidate))
            .map(|idx| (idx, *candidate))
    })
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }

    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(value, f).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|f| NaiveDateTime::parse_from_str(value, f).ok())
                .map(|dt| dt.date())
        })
        .or_else(|| DateTime::parse_from_rfc3339(value).ok().map(|dt| dt.date_naive()))
}

/// Picks one format for the whole date column: the first entry of
/// `DATE_FORMATS` that reads every cell any format can read. Cells nothing
/// can read are left for the row loop to drop. `None` means no single format
/// fits and each cell is parsed on its own.
fn column_date_format<'a>(cells: impl Iterator<Item = &'a str>) -> Option<&'static str> {
    let readable: Vec<&str> = cells
        .map(str::trim)
        .filter(|cell| parse_date(cell).is_some())
        .collect();
    if readable.is_empty() {
        return None;
    }

    DATE_FORMATS.iter().copied().find(|format| {
        readable
            .iter()
            .all(|cell| NaiveDate::parse_from_str(cell, format).is_ok())
    })
}

/// Strips thousands separators, currency signs and whitespace before parsing.
struct PriceParser {
    noise: Regex,
}

impl PriceParser {
    fn new() -> Result<Self> {
        Ok(PriceParser {
            noise: Regex::new(r"[\s,$]")?,
        })
    }

    fn parse(&self, raw: &str) -> Option<f64> {
        let cleaned = self.noise.replace_all(raw, "");
        let value: f64 = cleaned.parse().ok()?;
        value.is_finite().then_some(value)
    }
}

/// Turns a raw table into a price series, dropping rows whose date or price
/// cannot be parsed.
pub fn ingest(table: &RawTable, max_rows: Option<usize>) -> Result<Ingested> {
    let date_col = find_column(&table.headers, &[DATE_COLUMN]);
    let price_col = find_column(&table.headers, &PRICE_COLUMNS);

    let (date_idx, (price_idx, price_column)) = match (date_col, price_col) {
        (Some((date_idx, _)), Some(price)) => (date_idx, price),
        (None, None) => {
            return Err(AnalysisError::Format(
                "Missing 'Date' column and price column. Need 'Date' and either 'Avg' or 'Close'"
                    .to_string(),
            ))
        }
        (None, Some(_)) => return Err(AnalysisError::Format("Missing 'Date' column".to_string())),
        (Some(_), None) => {
            return Err(AnalysisError::Format(
                "Missing price column. Need either 'Avg' or 'Close' column".to_string(),
            ))
        }
    };

    if let Some(limit) = max_rows {
        if table.rows.len() > limit {
            return Err(AnalysisError::InputTooLarge {
                rows: table.rows.len(),
                limit,
            });
        }
    }

    let date_format = column_date_format(
        table
            .rows
            .iter()
            .filter_map(|row| row.get(date_idx))
            .map(String::as_str),
    );
    match date_format {
        Some(format) => tracing::debug!("Date column format: {}", format),
        None => tracing::debug!("Date column has mixed formats, parsing per cell"),
    }

    let prices = PriceParser::new()?;
    let mut points = Vec::with_capacity(table.rows.len());
    let mut dropped = Vec::new();

    for (i, row) in table.rows.iter().enumerate() {
        // header is row 1
        let row_number = i + 2;
        let date_cell = row.get(date_idx).map(String::as_str).unwrap_or("");
        let price_cell = row.get(price_idx).map(String::as_str).unwrap_or("");

        if date_cell.trim().is_empty() && price_cell.trim().is_empty() {
            continue;
        }

        let date = match date_format {
            Some(format) => NaiveDate::parse_from_str(date_cell.trim(), format).ok(),
            None => parse_date(date_cell),
        };
        let Some(date) = date else {
            let err = AnalysisError::DateParse {
                row: row_number,
                value: date_cell.to_string(),
            };
            tracing::debug!("Dropping row: {}", err);
            dropped.push(err);
            continue;
        };

        let Some(price) = prices.parse(price_cell) else {
            let err = AnalysisError::NumberParse {
                row: row_number,
                value: price_cell.to_string(),
            };
            tracing::debug!("Dropping row: {}", err);
            dropped.push(err);
            continue;
        };

        points.push(PricePoint { date, price });
    }

    if points.is_empty() {
        let detail = match dropped.first() {
            Some(first) => format!("all {} rows were dropped (first: {})", dropped.len(), first),
            None => "file has no data rows".to_string(),
        };
        return Err(AnalysisError::EmptyData(detail));
    }

    if !dropped.is_empty() {
        tracing::info!("Dropped {} unparseable rows", dropped.len());
    }

    Ok(Ingested {
        series: PriceSeries::from_points(points)?,
        price_column: price_column.to_string(),
        dropped,
    })
}
