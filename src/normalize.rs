// src/normalize.rs

use crate::fields::{DocumentDetails, Field, FieldValue};
use tracing::{info, warn};

/// Below this many cartons a heavy shipment is suspicious.
const SUSPICIOUS_CARTONS_BELOW: f64 = 50.0;
/// Gross weight (kg) above which a small carton count is suspicious.
const SUSPICIOUS_WEIGHT_ABOVE: f64 = 500.0;

/// Comparison key for a raw value.
///
/// Anything that reads as a number is coerced to `f64` first, so `16`, `16.0`
/// and `"16.00"` share the key `"16"`. Other strings compare by trimmed text,
/// and blank text is treated as null.
pub fn normalize(raw: Option<&FieldValue>) -> Option<String> {
    let raw = raw?;
    match raw.as_f64() {
        // -0.0 would print as "-0"
        Some(n) if n == 0.0 => Some("0".to_string()),
        Some(n) => Some(format!("{n}")),
        None => match raw {
            FieldValue::Text(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            FieldValue::Text(_) => None,
            FieldValue::Number(_) => None,
        },
    }
}

/// Run once on every freshly extracted document before it is compared.
///
/// A handful of cartons on a shipment heavier than 500 kg almost always means
/// the assortment quantity was read instead of the carton count, so the carton
/// value is dropped. Values outside a field's range are kept but flagged.
pub fn sanitize(mut details: DocumentDetails) -> DocumentDetails {
    let cartons = details
        .value(Field::Cartons)
        .and_then(FieldValue::as_f64)
        .unwrap_or(0.0);
    let weight = details
        .value(Field::GrossWeight)
        .and_then(FieldValue::as_f64)
        .unwrap_or(0.0);

    if cartons > 0.0 && cartons < SUSPICIOUS_CARTONS_BELOW && weight > SUSPICIOUS_WEIGHT_ABOVE {
        warn!(
            cartons,
            gross_weight = weight,
            "Carton count suspicious for weight, discarding"
        );
        if let Some(v) = details.get_mut(Field::Cartons) {
            v.value = None;
            v.needs_user_input = true;
        }
    }

    for field in Field::ALL {
        let Some(v) = details.get_mut(field) else {
            continue;
        };
        match v.value.as_ref() {
            None => v.needs_user_input = true,
            Some(raw) => {
                if let Some(n) = raw.as_f64() {
                    if !field.in_range(n) {
                        info!(field = %field, value = n, "Value outside plausible range");
                        v.needs_user_input = true;
                    }
                }
            }
        }
    }

    details
}
