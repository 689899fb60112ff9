//! Tokenizer for line-oriented text payloads.
//!
//! Each non-blank line is one of `key: value[unit]`, `key=value[unit]` or
//! `key,value[,unit]`. The first delimiter present (in that order) wins and
//! lines with none are skipped. Output feeds [`crate::parser::parse_value`].

use std::collections::BTreeMap;

use serde_json::{json, Value};
use tracing::debug;

use crate::parser::split_unit_suffix;

// ---

/// Split a text payload into `field name -> raw value`.
///
/// Values carrying a known unit suffix become `{value, unit}` objects; an
/// explicit CSV unit column takes precedence over a stripped suffix.
pub fn tokenize(payload: &str) -> BTreeMap<String, Value> {
    // ---
    let mut fields = BTreeMap::new();

    for (line_no, line) in payload.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((key, raw)) = tokenize_line(line) else {
            debug!("Skipping unrecognized line {}: {:?}", line_no + 1, line);
            continue;
        };

        if fields.insert(key.clone(), raw).is_some() {
            debug!("Field '{}' repeated on line {}, keeping last value", key, line_no + 1);
        }
    }

    fields
}

fn tokenize_line(line: &str) -> Option<(String, Value)> {
    // ---
    if let Some((key, value)) = line.split_once(':') {
        return key_value(key, value);
    }

    if let Some((key, value)) = line.split_once('=') {
        return key_value(key, value);
    }

    if line.contains(',') {
        return csv_row(line);
    }

    None
}

fn key_value(key: &str, value: &str) -> Option<(String, Value)> {
    // ---
    let key = key.trim();
    let value = value.trim();
    if key.is_empty() || value.is_empty() {
        return None;
    }

    Some((key.to_string(), with_unit(value, None)))
}

fn csv_row(line: &str) -> Option<(String, Value)> {
    // ---
    let mut columns = line.split(',').map(str::trim);
    let key = columns.next().filter(|k| !k.is_empty())?;
    let value = columns.next().filter(|v| !v.is_empty())?;
    let unit = columns.next().filter(|u| !u.is_empty());

    // Header row such as `name,value,unit`.
    if value.eq_ignore_ascii_case("value") {
        return None;
    }

    Some((key.to_string(), with_unit(value, unit)))
}

fn with_unit(value: &str, explicit_unit: Option<&str>) -> Value {
    // ---
    match (split_unit_suffix(value), explicit_unit) {
        (Some((number, _)), Some(unit)) => json!({ "value": number, "unit": unit }),
        (Some((number, suffix)), None) => json!({ "value": number, "unit": suffix }),
        (None, Some(unit)) => json!({ "value": value, "unit": unit }),
        (None, None) => Value::String(value.to_string()),
    }
}
