//! Value parser: turns one raw measurement into a [`TypedValue`].
//!
//! Parsing is fail-soft. Anything that cannot be read as a number or a
//! boolean degrades to text; only `null`, or a `{value, unit, label}` object
//! whose `value` is `null`, yields "no value".

use serde_json::Value;

use crate::models::{Scalar, TypedValue};

// ---

/// Known unit suffixes. Compound units precede their tails so `mg/L` wins
/// over `L`.
pub const UNIT_SUFFIXES: &[&str] = &[
    "µS/cm", "uS/cm", "mS/cm", "L/min", "m³/h", "mg/L", "g/m³", "%RH", "kPa", "hPa", "lux", "NTU",
    "ppm", "ppb", "bar", "psi", "m/s", "rpm", "°C", "°F", "mV", "mA", "kW", "dB", "pH", "%", "V",
    "A", "W", "L", "K",
];

/// Nested `{value: {value: ...}}` objects deeper than this are kept as text.
const MAX_DEPTH: usize = 8;

/// Parse an arbitrary JSON value into a typed value.
pub fn parse_value(raw: &Value) -> TypedValue {
    // ---
    parse_at_depth(raw, 0)
}

fn parse_at_depth(raw: &Value, depth: usize) -> TypedValue {
    // ---
    match raw {
        Value::Null => TypedValue::default(),
        Value::Bool(b) => TypedValue {
            value: Some(Scalar::Boolean(*b)),
            ..TypedValue::default()
        },
        Value::Number(n) => match n.as_f64() {
            Some(v) if v.is_finite() => TypedValue {
                value: Some(Scalar::Numeric(v)),
                ..TypedValue::default()
            },
            _ => text(n.to_string()),
        },
        Value::String(s) => parse_str(s),
        Value::Object(map) if map.contains_key("value") && depth < MAX_DEPTH => {
            let mut parsed = map
                .get("value")
                .map(|inner| parse_at_depth(inner, depth + 1))
                .unwrap_or_default();

            // Explicit metadata beats a unit recovered from a suffix.
            if let Some(unit) = non_empty_str(map.get("unit")) {
                parsed.unit = Some(unit);
            }
            if let Some(label) = non_empty_str(map.get("label")) {
                parsed.label = Some(label);
            }
            parsed
        }
        other => {
            tracing::debug!("Keeping unstructured value as text: {}", other);
            text(other.to_string())
        }
    }
}

/// Classify a string: numeric (optionally with a known unit suffix), then
/// boolean, else text.
pub fn parse_str(raw: &str) -> TypedValue {
    // ---
    let trimmed = raw.trim();

    if let Some(v) = parse_number(trimmed) {
        return TypedValue {
            value: Some(Scalar::Numeric(v)),
            ..TypedValue::default()
        };
    }

    if let Some((number, unit)) = split_unit_suffix(trimmed) {
        return TypedValue {
            value: Some(Scalar::Numeric(number)),
            unit: Some(unit.to_string()),
            label: None,
        };
    }

    if let Some(b) = parse_bool(trimmed) {
        return TypedValue {
            value: Some(Scalar::Boolean(b)),
            ..TypedValue::default()
        };
    }

    text(trimmed.to_string())
}

/// Split `"25.3°C"` into `(25.3, "°C")`. Returns `None` unless the remainder
/// is a finite number.
pub fn split_unit_suffix(token: &str) -> Option<(f64, &'static str)> {
    // ---
    UNIT_SUFFIXES.iter().find_map(|unit| {
        token
            .strip_suffix(unit)
            .and_then(|number| parse_number(number.trim_end()))
            .map(|v| (v, *unit))
    })
}

/// Finite IEEE-754 double; `NaN`/`inf` spellings are not numbers here.
pub fn parse_number(token: &str) -> Option<f64> {
    // ---
    if token.is_empty() {
        return None;
    }
    token.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_bool(token: &str) -> Option<bool> {
    // ---
    if token.eq_ignore_ascii_case("true") {
        Some(true)
    } else if token.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn text(s: String) -> TypedValue {
    TypedValue {
        value: Some(Scalar::Text(s)),
        ..TypedValue::default()
    }
}
