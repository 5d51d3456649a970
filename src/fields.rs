// src/fields.rs

use serde::{Deserialize, Serialize};
use std::fmt;

/// The shipment fields every document is checked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Cartons,
    GrossWeight,
    Cbm,
}

impl Field {
    /// Comparison and report order.
    pub const ALL: [Field; 3] = [Field::Cartons, Field::GrossWeight, Field::Cbm];

    pub fn key(self) -> &'static str {
        match self {
            Field::Cartons => "cartons",
            Field::GrossWeight => "gross_weight",
            Field::Cbm => "cbm",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Field::Cartons => "Cartons (CTN)",
            Field::GrossWeight => "Gross Weight (KGS)",
            Field::Cbm => "Volume (CBM)",
        }
    }

    /// Inclusive plausible range for a numeric value of this field.
    pub fn range(self) -> (f64, f64) {
        match self {
            Field::Cartons => (1.0, 100_000.0),
            Field::GrossWeight => (0.01, 1_000_000.0),
            Field::Cbm => (0.001, 10_000.0),
        }
    }

    pub fn in_range(self, v: f64) -> bool {
        let (min, max) = self.range();
        v >= min && v <= max
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A raw extracted value. Oracles return numbers, confirmed values coming back
/// from a reviewer may be strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    /// Numeric reading of the value. Strings are accepted when they parse after
    /// trimming and dropping thousands separators ("1,704" -> 1704).
    pub fn as_f64(&self) -> Option<f64> {
        let n = match self {
            FieldValue::Number(n) => *n,
            FieldValue::Text(s) => s.trim().replace(',', "").parse::<f64>().ok()?,
        };
        n.is_finite().then_some(n)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(n) => write!(f, "{n}"),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Number(n)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

/// Which extraction strategy produced a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    #[serde(alias = "gemini_vision")]
    Ai,
    Regex,
}

fn default_confidence() -> f64 {
    1.0
}

/// One field as reported by an oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedValue {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub value: Option<FieldValue>,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub needs_user_input: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
}

impl ExtractedValue {
    pub fn new(field: Field, value: Option<FieldValue>, confidence: f64, source: Source) -> Self {
        Self {
            label: field.label().to_string(),
            needs_user_input: value.is_none(),
            value,
            confidence: confidence.clamp(0.0, 1.0),
            source: Some(source),
        }
    }
}

/// Token accounting reported by the AI backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionMeta {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

/// Everything extracted from one document. A field that is absent and a field
/// whose value is null mean the same thing to the comparison.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<ExtractionMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cartons: Option<ExtractedValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gross_weight: Option<ExtractedValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cbm: Option<ExtractedValue>,
}

impl DocumentDetails {
    pub fn get(&self, field: Field) -> Option<&ExtractedValue> {
        match field {
            Field::Cartons => self.cartons.as_ref(),
            Field::GrossWeight => self.gross_weight.as_ref(),
            Field::Cbm => self.cbm.as_ref(),
        }
    }

    pub fn get_mut(&mut self, field: Field) -> Option<&mut ExtractedValue> {
        match field {
            Field::Cartons => self.cartons.as_mut(),
            Field::GrossWeight => self.gross_weight.as_mut(),
            Field::Cbm => self.cbm.as_mut(),
        }
    }

    pub fn set(&mut self, field: Field, value: ExtractedValue) {
        let slot = match field {
            Field::Cartons => &mut self.cartons,
            Field::GrossWeight => &mut self.gross_weight,
            Field::Cbm => &mut self.cbm,
        };
        *slot = Some(value);
    }

    /// The raw value of a field, `None` when missing or null.
    pub fn value(&self, field: Field) -> Option<&FieldValue> {
        self.get(field).and_then(|v| v.value.as_ref())
    }

    /// How many fields carry a value (out of all fields).
    pub fn coverage(&self) -> (usize, usize) {
        let filled = Field::ALL
            .iter()
            .filter(|&&f| self.value(f).is_some())
            .count();
        (filled, Field::ALL.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_text_parses() {
        assert_eq!(FieldValue::from("1,704").as_f64(), Some(1704.0));
        assert_eq!(FieldValue::from(" 16.00 ").as_f64(), Some(16.0));
        assert_eq!(FieldValue::from("n/a").as_f64(), None);
        assert_eq!(FieldValue::from("inf").as_f64(), None);
    }

    #[test]
    fn test_details_from_vision_payload() {
        let json = r#"{
            "meta": {"model": "gemini-2.0-flash", "duration_ms": 812, "usage": {}},
            "cartons": {"label": "Cartons (CTN)", "value": 2195, "confidence": 1.0,
                        "needs_user_input": false, "source": "gemini_vision"},
            "gross_weight": {"value": null},
            "unrelated": {"value": 3}
        }"#;
        let details: DocumentDetails = serde_json::from_str(json).unwrap();

        assert_eq!(details.value(Field::Cartons), Some(&FieldValue::Number(2195.0)));
        assert_eq!(details.cartons.as_ref().unwrap().source, Some(Source::Ai));
        assert_eq!(details.value(Field::GrossWeight), None);
        assert!(details.cbm.is_none());
        assert_eq!(details.coverage(), (1, 3));
    }

    #[test]
    fn test_boolean_value_is_rejected() {
        let json = r#"{"cartons": {"value": true}}"#;
        assert!(serde_json::from_str::<DocumentDetails>(json).is_err());
    }

    #[test]
    fn test_new_value_flags_missing() {
        let v = ExtractedValue::new(Field::Cbm, None, 0.4, Source::Regex);
        assert!(v.needs_user_input);
        assert_eq!(v.label, "Volume (CBM)");
    }
}
