//! Coercion of raw spreadsheet cells into percentages and registration dates.
//!
//! Source sheets mix `85`, `0.85`, `"85%"` and `"85,5"` for the same quantity.
//! Everything funnels into a float on the 0–100 scale; bad cells become 0.0
//! instead of failing the row.

use crate::models::RawValue;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use regex::Regex;
use std::sync::LazyLock;

static NON_NUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^0-9.\-]").expect("static pattern"));

/// Output layout of `fecha_registro`
const REGISTRATION_FORMAT: &str = "%Y-%m-%d 00:00:00";

const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y"];

/// Every `DATE_FORMATS` layout followed by a time; `%.f` also accepts no fraction
const DATETIME_FORMATS: [&str; 15] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M",
    "%Y/%m/%dT%H:%M:%S%.f",
    "%d/%m/%Y %H:%M:%S%.f",
    "%d/%m/%Y %H:%M",
    "%d/%m/%YT%H:%M:%S%.f",
    "%d-%m-%Y %H:%M:%S%.f",
    "%d-%m-%Y %H:%M",
    "%d-%m-%YT%H:%M:%S%.f",
    "%d.%m.%Y %H:%M:%S%.f",
    "%d.%m.%Y %H:%M",
    "%d.%m.%YT%H:%M:%S%.f",
];

/// Convert a raw score cell to a percentage in `[0, 100]`.
///
/// Values in `(0, 1]` are read as fractions, so `1` means 100%.
pub fn to_percentage(value: &RawValue) -> f64 {
    let number = match value {
        RawValue::Int(n) => *n as f64,
        RawValue::Float(x) => *x,
        RawValue::Text(s) => match parse_numeric_text(s) {
            Some(x) => x,
            None => return 0.0,
        },
        RawValue::Empty | RawValue::Bool(_) | RawValue::DateTime(_) => return 0.0,
    };

    if !number.is_finite() {
        return 0.0;
    }
    scale_fraction(number).clamp(0.0, 100.0)
}

fn scale_fraction(value: f64) -> f64 {
    if value > 0.0 && value <= 1.0 {
        value * 100.0
    } else {
        value
    }
}

fn parse_numeric_text(text: &str) -> Option<f64> {
    let cleaned = text.trim().replace('%', "").replace(' ', "").replace(',', ".");
    let cleaned = NON_NUMERIC.replace_all(&cleaned, "");

    match cleaned.as_ref() {
        "" | "-" | "." => None,
        digits => digits.parse::<f64>().ok(),
    }
}

/// Normalize the exam date cell to `YYYY-MM-DD 00:00:00`, or an empty string
/// when the cell is blank or not a recognizable date.
pub fn normalize_exam_date(value: &RawValue) -> String {
    exam_date(value)
        .map(|date| date.format(REGISTRATION_FORMAT).to_string())
        .unwrap_or_default()
}

fn exam_date(value: &RawValue) -> Option<NaiveDate> {
    match value {
        RawValue::DateTime(dt) => Some(dt.date()),
        RawValue::Int(n) => from_excel_serial(*n as f64),
        RawValue::Float(x) => from_excel_serial(*x),
        RawValue::Text(s) => parse_date_text(s.trim()),
        RawValue::Empty | RawValue::Bool(_) => None,
    }
}

/// Excel serial day numbers count from 1899-12-30.
fn from_excel_serial(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(Duration::try_days(serial.trunc() as i64)?)
}

fn parse_date_text(text: &str) -> Option<NaiveDate> {
    if text.is_empty() {
        return None;
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|dt| dt.date())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        })
}
