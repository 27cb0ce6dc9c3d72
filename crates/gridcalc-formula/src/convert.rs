//! Coercion between value kinds
//!
//! Strings are only read as numbers where a caller asks for it; nothing here
//! coerces implicitly.

use crate::value::FormulaValue;
use chrono::NaiveDate;
use gridcalc_core::CellError;
use lazy_regex::regex_is_match;

/// True for decimal or scientific notation with an optional sign and a
/// trailing `%`
///
/// "inf", "NaN" and hex forms are rejected even though `f64::from_str`
/// accepts some of them.
pub fn is_numeric_string(text: &str) -> bool {
    regex_is_match!(
        r"^\s*[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?\s*%?\s*$",
        text
    )
}

/// Parse a numeric string; `50%` reads as `0.5`
pub fn try_parse_numeric(text: &str) -> Option<f64> {
    if !is_numeric_string(text) {
        return None;
    }
    let trimmed = text.trim();
    match trimmed.strip_suffix('%') {
        Some(number) => number.trim().parse::<f64>().ok().map(|n| n / 100.0),
        None => trimmed.parse::<f64>().ok(),
    }
}

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d", "%d-%b-%Y"];

/// Parse a date string into an Excel serial number (1900 date system)
pub fn try_parse_date_string(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
        .map(date_to_serial)
}

/// Excel serial number of a date in the 1900 date system
///
/// Serial 1 is 1900-01-01 and Excel's phantom 1900-02-29 is kept, so dates
/// from March 1900 on match Excel.
pub fn date_to_serial(date: NaiveDate) -> f64 {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30).unwrap_or_default();
    let days = date.signed_duration_since(epoch).num_days();
    if days < 61 {
        (days - 1) as f64
    } else {
        days as f64
    }
}

/// Read a value as a number without any text parsing
///
/// Booleans count only when `allow_bool` is set; blanks are 0.
pub fn get_value_double(value: &FormulaValue<'_>, allow_bool: bool) -> Option<f64> {
    match value {
        FormulaValue::Number(n) => Some(*n),
        FormulaValue::Boolean(b) if allow_bool => Some(if *b { 1.0 } else { 0.0 }),
        FormulaValue::Empty => Some(0.0),
        _ => None,
    }
}

/// Arithmetic coercion of a scalar operand
///
/// Numbers, booleans, blanks and numeric or date strings convert; other
/// strings are `#VALUE!`; errors propagate unchanged.
pub fn to_number(value: &FormulaValue<'_>) -> Result<f64, CellError> {
    match value {
        FormulaValue::Number(n) => Ok(*n),
        FormulaValue::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
        FormulaValue::Empty => Ok(0.0),
        FormulaValue::String(s) => try_parse_numeric(s)
            .or_else(|| try_parse_date_string(s))
            .ok_or(CellError::Value),
        FormulaValue::Error(e) => Err(*e),
        FormulaValue::Range(_) | FormulaValue::Array(_) => Err(CellError::Value),
    }
}

/// Logical coercion of a scalar operand
pub fn to_bool(value: &FormulaValue<'_>) -> Result<bool, CellError> {
    match value {
        FormulaValue::Boolean(b) => Ok(*b),
        FormulaValue::Number(n) => Ok(*n != 0.0),
        FormulaValue::Empty => Ok(false),
        FormulaValue::String(s) if s.eq_ignore_ascii_case("TRUE") => Ok(true),
        FormulaValue::String(s) if s.eq_ignore_ascii_case("FALSE") => Ok(false),
        FormulaValue::Error(e) => Err(*e),
        _ => Err(CellError::Value),
    }
}

/// Text coercion of a scalar operand; errors propagate
pub fn to_text(value: &FormulaValue<'_>) -> Result<String, CellError> {
    match value {
        FormulaValue::Error(e) => Err(*e),
        other => Ok(other.as_text()),
    }
}

/// Render a number the way a General-formatted cell shows it
///
/// Values are cut to 15 significant digits first, so binary noise such as
/// `0.30000000000000004` prints as `0.3`.
pub fn format_number(n: f64) -> String {
    if n == 0.0 {
        return "0".to_string();
    }
    let cleaned: f64 = format!("{:.14e}", n).parse().unwrap_or(n);
    let magnitude = cleaned.abs();
    if magnitude >= 1e15 || magnitude < 1e-9 {
        let text = format!("{:E}", cleaned);
        match text.split_once('E') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{}E+{}", mantissa, exp),
            _ => text,
        }
    } else {
        format!("{}", cleaned)
    }
}
