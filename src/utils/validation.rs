//! Validation utilities for raw statement rows

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use std::str::FromStr;

use crate::types::*;

// Two-digit years first: `%Y` also accepts "24" and would yield year 0024
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%y", "%m/%d/%Y", "%d-%b-%y", "%d-%b-%Y"];

/// Parse a statement date in any of the supported layouts
pub fn parse_statement_date(value: &str) -> Result<NaiveDate, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("date is empty".to_string());
    }

    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
        .ok_or_else(|| "unrecognized date format".to_string())
}

/// Parse a signed statement amount
///
/// Accepts a currency symbol, thousands separators, an explicit sign, and
/// accounting-style parentheses for negatives, e.g. `($1,250.00)`.
pub fn parse_statement_amount(value: &str) -> Result<BigDecimal, String> {
    let mut text = value.trim().to_string();
    if text.is_empty() {
        return Err("amount is empty".to_string());
    }

    let mut negative = false;
    if text.starts_with('(') && text.ends_with(')') {
        negative = true;
        text = text[1..text.len() - 1].trim().to_string();
    }

    if let Some(rest) = text.strip_prefix('-') {
        negative = !negative;
        text = rest.trim_start().to_string();
    } else if let Some(rest) = text.strip_prefix('+') {
        text = rest.trim_start().to_string();
    }

    let cleaned: String = text.chars().filter(|c| *c != '$' && *c != ',').collect();
    if cleaned.is_empty() || !cleaned.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return Err("not a numeric amount".to_string());
    }

    let amount = BigDecimal::from_str(&cleaned).map_err(|e| e.to_string())?;
    Ok(if negative { -amount } else { amount })
}

/// Validate that a transaction description is usable
pub fn validate_description(description: &str) -> Result<String, String> {
    let trimmed = description.trim();
    if trimmed.is_empty() {
        return Err("description is empty".to_string());
    }

    if trimmed.len() > 500 {
        return Err("description exceeds 500 characters".to_string());
    }

    Ok(trimmed.to_string())
}

/// Validate a raw row, returning its parsed date, description, and amount
pub fn validate_row(
    index: usize,
    row: &RawTransactionRow,
) -> Result<(NaiveDate, String, BigDecimal), IngestionRowError> {
    let reject = |field: &str, value: &str, reason: String| IngestionRowError {
        row: index,
        field: field.to_string(),
        value: value.to_string(),
        reason,
    };

    let date = parse_statement_date(&row.date).map_err(|r| reject("date", &row.date, r))?;
    let amount =
        parse_statement_amount(&row.amount).map_err(|r| reject("amount", &row.amount, r))?;
    let description = validate_description(&row.description)
        .map_err(|r| reject("description", &row.description, r))?;

    Ok((date, description, amount))
}
