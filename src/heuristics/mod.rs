// src/heuristics/mod.rs

mod patterns;

use crate::classify::{DocumentRole, RoleSet};
use crate::fields::{DocumentDetails, ExtractedValue, ExtractionMeta, Field, FieldValue, Source};
use crate::oracle::{Oracle, OracleError};
use crate::pdf_extract::{PdfContent, PdfDocument, extract_text_from_pdf};
use async_trait::async_trait;
use patterns::FieldPatterns;
use regex::Regex;
use std::time::Instant;
use tracing::{debug, info};

/// Below this a regex hit is reported but flagged for review.
const TRUSTED_CONFIDENCE: f64 = 0.9;

const HEADING: &str = r"BILL\s+OF\s+LADING|(?:COMMERCIAL\s+)?INVOICE|PACKING\s+LIST";

/// Regex extraction over the PDF text layer.
pub struct RegexOracle {
    patterns: FieldPatterns,
    /// Heading finders, strictest first.
    headings: Vec<Regex>,
}

impl RegexOracle {
    pub fn new() -> Result<Self, OracleError> {
        let headings = vec![
            Regex::new(&format!(r"(?m)^[ \t]*({HEADING})[ \t]*:?[ \t]*$"))?,
            Regex::new(&format!(r"(?m)^[ \t]*({HEADING})\b"))?,
        ];
        Ok(Self {
            patterns: FieldPatterns::new()?,
            headings,
        })
    }

    /// Extract every field from raw document text.
    pub fn extract_text(&self, text: &str) -> DocumentDetails {
        self.extract_upper(&text.to_uppercase())
    }

    fn extract_upper(&self, upper: &str) -> DocumentDetails {
        let mut details = DocumentDetails::default();
        for field in Field::ALL {
            let value = match self.patterns.best_match(field, upper) {
                Some((n, confidence)) => {
                    let mut v = ExtractedValue::new(
                        field,
                        Some(FieldValue::Number(n)),
                        confidence,
                        Source::Regex,
                    );
                    v.needs_user_input = confidence < TRUSTED_CONFIDENCE;
                    v
                }
                None => ExtractedValue::new(field, None, 0.0, Source::Regex),
            };
            details.set(field, value);
        }
        details
    }

    /// Cut merged text at the first heading of each document kind. Text before
    /// the first heading belongs to no document.
    fn split_sections<'t>(&self, upper: &'t str) -> Option<RoleSet<Option<&'t str>>> {
        for heading in &self.headings {
            let mut starts: Vec<(usize, DocumentRole)> = Vec::new();
            for caps in heading.captures_iter(upper) {
                let Some(m) = caps.get(1) else { continue };
                let role = heading_role(m.as_str());
                if !starts.iter().any(|&(_, r)| r == role) {
                    starts.push((m.start(), role));
                }
            }
            if starts.is_empty() {
                continue;
            }

            starts.sort_by_key(|&(pos, _)| pos);
            let mut sections = RoleSet::default();
            for (i, &(start, role)) in starts.iter().enumerate() {
                let end = starts.get(i + 1).map_or(upper.len(), |&(pos, _)| pos);
                *sections.get_mut(role) = Some(&upper[start..end]);
            }
            return Some(sections);
        }
        None
    }
}

fn heading_role(heading: &str) -> DocumentRole {
    if heading.starts_with("BILL") {
        DocumentRole::DocA
    } else if heading.contains("INVOICE") {
        DocumentRole::DocB
    } else {
        DocumentRole::DocC
    }
}

/// Pull the text layer off the PDF without blocking the runtime.
async fn read_text(doc: &PdfDocument) -> Result<String, OracleError> {
    let bytes = doc.bytes.clone();
    let content = tokio::task::spawn_blocking(move || extract_text_from_pdf(&bytes))
        .await
        .map_err(|e| OracleError::Pdf(format!("text extraction task failed: {e}")))?;

    match content {
        PdfContent::Text(text) => Ok(text),
        PdfContent::ScannedImage => Err(OracleError::ScannedDocument),
        PdfContent::Error(e) => Err(OracleError::Pdf(e)),
    }
}

#[async_trait]
impl Oracle for RegexOracle {
    fn name(&self) -> &'static str {
        "heuristics"
    }

    async fn extract(&self, doc: &PdfDocument) -> Result<DocumentDetails, OracleError> {
        let start = Instant::now();
        let text = read_text(doc).await?;

        let mut details = self.extract_text(&text);
        details.meta = Some(ExtractionMeta {
            model: None,
            duration_ms: start.elapsed().as_millis() as u64,
            usage: None,
        });

        let (filled, total) = details.coverage();
        info!(document = %doc.name, filled, total, "Heuristic extraction result");
        Ok(details)
    }

    async fn extract_combined(
        &self,
        doc: &PdfDocument,
    ) -> Result<RoleSet<Option<DocumentDetails>>, OracleError> {
        let text = read_text(doc).await?;
        let upper = text.to_uppercase();
        let sections = self
            .split_sections(&upper)
            .ok_or(OracleError::NoSections)?;

        Ok(sections.map(|role, section| {
            section.map(|s| {
                debug!(role = %role, chars = s.len(), "Section found");
                self.extract_upper(s)
            })
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf_extract::fixtures;

    const MERGED: &str = "\
Shipper copy
BILL OF LADING
Number of packages: 2,195 CTNS
Gross weight 14,250.5 KGS
Measurement 61.2 CBM

Commercial Invoice
Invoice No: 7781
Total: 2,195 CTNS
G.W. 14,250.5 KGS

PACKING LIST
Grand total carton q'ty: 2195
Gross weight: 14,250.50 KGS
Total CBM: 61.20
";

    #[test]
    fn test_extract_text() {
        let oracle = RegexOracle::new().unwrap();
        let d = oracle.extract_text("Total: packed in: 1,704 cartons\nGross weight: 9,800 kgs\n12.5 CBM");

        assert_eq!(d.value(Field::Cartons), Some(&FieldValue::Number(1704.0)));
        assert_eq!(d.value(Field::GrossWeight), Some(&FieldValue::Number(9800.0)));
        assert_eq!(d.value(Field::Cbm), Some(&FieldValue::Number(12.5)));
        assert_eq!(d.cartons.as_ref().unwrap().source, Some(Source::Regex));
        assert!(!d.cbm.as_ref().unwrap().needs_user_input);
    }

    #[test]
    fn test_low_confidence_flagged() {
        let oracle = RegexOracle::new().unwrap();
        let d = oracle.extract_text("TOTAL: 1704\n");
        let cartons = d.cartons.unwrap();
        assert_eq!(cartons.confidence, 0.85);
        assert!(cartons.needs_user_input);
        assert!(d.gross_weight.unwrap().value.is_none());
    }

    #[test]
    fn test_split_sections() {
        let oracle = RegexOracle::new().unwrap();
        let upper = MERGED.to_uppercase();
        let sections = oracle.split_sections(&upper).unwrap();

        assert!(sections.doc_a.unwrap().starts_with("BILL OF LADING"));
        assert!(sections.doc_b.unwrap().starts_with("COMMERCIAL INVOICE"));
        assert!(!sections.doc_b.unwrap().contains("PACKING"));
        assert!(sections.doc_c.unwrap().starts_with("PACKING LIST"));

        let split = sections.map(|_, s| s.map(|s| oracle.extract_upper(s)));
        for (_, d) in split.iter() {
            let d = d.as_ref().unwrap();
            assert_eq!(d.value(Field::Cartons), Some(&FieldValue::Number(2195.0)));
            assert_eq!(d.value(Field::GrossWeight), Some(&FieldValue::Number(14250.5)));
        }
        assert_eq!(split.doc_c.unwrap().value(Field::Cbm), Some(&FieldValue::Number(61.2)));
    }

    #[test]
    fn test_split_falls_back_to_line_start() {
        let oracle = RegexOracle::new().unwrap();
        let upper = "INVOICE NO 12 TOTAL 40 CTNS\nPACKING LIST NO 12 TOTAL 40 CTNS".to_string();
        let sections = oracle.split_sections(&upper).unwrap();
        assert!(sections.doc_a.is_none());
        assert!(sections.doc_b.is_some());
        assert!(sections.doc_c.is_some());

        assert!(oracle.split_sections("NOTHING HERE").is_none());
    }

    #[tokio::test]
    async fn test_extract_from_text_pdf() {
        let oracle = RegexOracle::new().unwrap();
        let bytes = fixtures::text_pdf(&[
            "Total: packed in: 1,704 cartons",
            "Gross weight: 9,800 kgs",
            "Total CBM: 12.5",
        ]);
        let details = oracle.extract(&PdfDocument::new("PL 1704.pdf", bytes)).await.unwrap();

        assert_eq!(details.value(Field::Cartons), Some(&FieldValue::Number(1704.0)));
        assert_eq!(details.value(Field::GrossWeight), Some(&FieldValue::Number(9800.0)));
        let meta = details.meta.unwrap();
        assert!(meta.model.is_none());
        assert!(meta.usage.is_none());
    }

    #[tokio::test]
    async fn test_scanned_pdf_is_extraction_failure() {
        let oracle = RegexOracle::new().unwrap();
        let doc = PdfDocument::new("BL scan.pdf", fixtures::image_only_pdf());
        let err = oracle.extract(&doc).await.unwrap_err();
        assert!(matches!(err, OracleError::ScannedDocument));
    }

    #[tokio::test]
    async fn test_extract_rejects_non_pdf() {
        let oracle = RegexOracle::new().unwrap();
        let doc = PdfDocument::new("INV.pdf", b"not a pdf".to_vec());
        let err = oracle.extract(&doc).await.unwrap_err();
        assert!(matches!(err, OracleError::Pdf(_)));
    }
}
