//! Reading normalizer: fans one multi-field input into one
//! [`NormalizedReading`] per field.
//!
//! Partial success: a field that cannot be classified is dropped and
//! reported, never allowed to fail its siblings.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::measurement::{canonical_key, MeasurementType};
use crate::models::{NormalizedReading, RawMeasurementInput, TextMeasurementInput};
use crate::parser::parse_value;
use crate::tokenizer::tokenize;

// ---

/// Readings produced from one input plus the raw keys that were dropped.
#[derive(Debug, Clone, Default)]
pub struct Normalized {
    pub readings: Vec<NormalizedReading>,
    pub dropped_fields: Vec<String>,
}

/// Normalize using the current time for `created_at` (and for
/// `reading_time` when the input has none).
pub fn normalize(
    tenant_id: Uuid,
    input: &RawMeasurementInput,
    schema: Option<&MeasurementType>,
) -> Normalized {
    normalize_at(tenant_id, input, schema, Utc::now())
}

/// Same as [`normalize`] with an explicit clock.
///
/// When several keys land on the same field (say `ph` and `ph_value`),
/// one reading is kept: a key spelled exactly as the field name wins over
/// one that only canonicalizes to it, which wins over an alias. Equal
/// spellings fall back to key order. The others are dropped with a
/// warning, after any fields dropped for a blank name or missing value.
pub fn normalize_at(
    tenant_id: Uuid,
    input: &RawMeasurementInput,
    schema: Option<&MeasurementType>,
    now: DateTime<Utc>,
) -> Normalized {
    // ---
    let reading_time = input.reading_time.unwrap_or(now);
    let identity = &input.identity;

    let mut out = Normalized::default();
    let mut candidates = Vec::new();
    let mut winners: HashMap<String, (usize, u8)> = HashMap::new();

    for (raw_key, raw_value) in &input.fields {
        let canonical = canonical_key(raw_key);
        if canonical.is_empty() {
            debug!("Dropping field with blank name");
            out.dropped_fields.push(raw_key.clone());
            continue;
        }

        let declared = schema.and_then(|s| s.resolve(&canonical));
        let field_name = declared.map_or(canonical.clone(), |f| f.name.clone());

        let typed = parse_value(raw_value);
        if typed.value.is_none() {
            debug!("Dropping field '{}': no value", raw_key);
            out.dropped_fields.push(raw_key.clone());
            continue;
        }

        let rank = if *raw_key == field_name {
            2
        } else if canonical == field_name {
            1
        } else {
            0
        };
        let index = candidates.len();
        winners
            .entry(field_name.clone())
            .and_modify(|best| {
                if rank > best.1 {
                    *best = (index, rank);
                }
            })
            .or_insert((index, rank));
        candidates.push((raw_key, field_name, declared, typed));
    }

    for (index, (raw_key, field_name, declared, typed)) in candidates.into_iter().enumerate() {
        if winners.get(&field_name).map(|best| best.0) != Some(index) {
            warn!(
                "Dropping field '{}': '{}' already supplied in this batch",
                raw_key, field_name
            );
            out.dropped_fields.push(raw_key.clone());
            continue;
        }
        let Some(value) = typed.value else {
            continue;
        };

        let measurement_label = typed
            .label
            .or_else(|| declared.map(|f| f.label.clone()))
            .unwrap_or_else(|| humanize(&field_name));
        let measurement_unit = typed.unit.or_else(|| declared.and_then(|f| f.unit.clone()));

        out.readings.push(NormalizedReading {
            id: Uuid::new_v4(),
            tenant_id,
            asset_sensor_id: identity.asset_sensor_id,
            sensor_type_id: identity.sensor_type_id,
            mac_address: identity.mac_address.clone(),
            location_id: identity.location_id,
            location_name: identity.location_name.clone(),
            measurement_type: field_name,
            measurement_label,
            measurement_unit,
            value,
            data_source: input.data_source,
            original_field_name: raw_key.clone(),
            reading_time,
            created_at: now,
        });
    }

    out
}

impl RawMeasurementInput {
    /// Tokenize a text payload into a measurement input.
    pub fn from_text(input: &TextMeasurementInput) -> Self {
        // ---
        RawMeasurementInput {
            identity: input.identity.clone(),
            reading_time: input.reading_time,
            data_source: input.data_source,
            fields: tokenize(&input.payload),
        }
    }
}

/// `flow_rate` -> `Flow Rate`.
fn humanize(field_name: &str) -> String {
    // ---
    field_name
        .split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
