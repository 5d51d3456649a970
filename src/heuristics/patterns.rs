use crate::fields::Field;
use regex::Regex;

// Matched against upper-cased text. Each pattern captures one number.

const CARTON_PATTERNS: &[(&str, f64)] = &[
    (r"TOTAL:\s*PACKED\s+IN:\s*([\d,]+)\s*CARTONS?", 1.0),
    (r"([\d,]+)\s+CARTON\s*\(\s*S\s*\)", 1.0),
    (r#"GRAND\s+TOTAL\s+CARTON\s+Q['"]?TY[:\s]*([\d,]+)"#, 1.0),
    (r"TYPES?\s+OF\s+PACKAGE[:\s]*([\d,]+)", 0.95),
    (r"\(CTN\)[:\s]*([\d,]+(?:\.\d+)?)", 0.95),
    (r"TOTAL[:\s]*([\d,]+)\s*(?:CTNS?|CARTONS?)", 0.9),
    (r"CTNS?[:\s]+([\d,]+(?:\.\d+)?)", 0.9),
    (r"([\d,]+)\s+CTNS?\b", 0.85),
    (r"NUMBER\s+OF\s+CARTONS?[:\s]*([\d,]+)", 0.85),
    // bare "TOTAL: 1704" summary rows
    (r"TOTAL[:\s]+([\d,]+)\b", 0.85),
];

const WEIGHT_PATTERNS: &[(&str, f64)] = &[
    (r"GROSS\s+WEIGHT[^\d\n]{0,20}([\d,]*\d(?:\.\d+)?)\s*KGS?", 1.0),
    (r"G\.\s*W\.?[^\d\n]{0,10}([\d,]*\d(?:\.\d+)?)\s*KGS?", 0.95),
    (r"GROSS\s+WEIGHT[^\d\n]{0,20}([\d,]*\d(?:\.\d+)?)", 0.9),
    (r"TOTAL\s+G\.?\s*W\.?[^\d\n]{0,10}([\d,]*\d(?:\.\d+)?)", 0.9),
    (r"([\d,]*\d(?:\.\d+)?)\s*KGS\b", 0.8),
];

const VOLUME_PATTERNS: &[(&str, f64)] = &[
    (r"TOTAL\s+(?:CBM|VOLUME|MEASUREMENT)[^\d\n]{0,20}([\d,]*\d(?:\.\d+)?)", 1.0),
    (r"([\d,]*\d(?:\.\d+)?)\s*(?:CBM|M3)\b", 0.95),
    (r"CBM[:\s]+([\d,]*\d(?:\.\d+)?)", 0.9),
    (r"(?:MEASUREMENT|VOLUME)[^\d\n]{0,20}([\d,]*\d(?:\.\d+)?)", 0.85),
];

struct FieldPattern {
    regex: Regex,
    confidence: f64,
}

/// Compiled pattern tables for every field.
pub struct FieldPatterns {
    cartons: Vec<FieldPattern>,
    gross_weight: Vec<FieldPattern>,
    cbm: Vec<FieldPattern>,
}

fn compile(table: &[(&str, f64)]) -> Result<Vec<FieldPattern>, regex::Error> {
    table
        .iter()
        .map(|&(pattern, confidence)| {
            Ok(FieldPattern {
                regex: Regex::new(pattern)?,
                confidence,
            })
        })
        .collect()
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.replace(',', "").parse::<f64>().ok().filter(|n| n.is_finite())
}

impl FieldPatterns {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            cartons: compile(CARTON_PATTERNS)?,
            gross_weight: compile(WEIGHT_PATTERNS)?,
            cbm: compile(VOLUME_PATTERNS)?,
        })
    }

    fn table(&self, field: Field) -> &[FieldPattern] {
        match field {
            Field::Cartons => &self.cartons,
            Field::GrossWeight => &self.gross_weight,
            Field::Cbm => &self.cbm,
        }
    }

    /// Best in-range value for `field` and its confidence. `upper` must already
    /// be upper-cased. On equal confidence the earlier pattern wins.
    pub fn best_match(&self, field: Field, upper: &str) -> Option<(f64, f64)> {
        let mut best: Option<(f64, f64)> = None;

        for pattern in self.table(field) {
            if best.is_some_and(|(_, conf)| conf >= pattern.confidence) {
                continue;
            }
            let hit = pattern
                .regex
                .captures_iter(upper)
                .filter_map(|c| parse_number(&c[1]))
                .find(|&n| field.in_range(n));
            if let Some(n) = hit {
                best = Some((n, pattern.confidence));
            }
        }

        best
    }
}
