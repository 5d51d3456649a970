// src/oracle.rs

use crate::classify::RoleSet;
use crate::config::{OracleBackend, OracleSection};
use crate::fields::DocumentDetails;
use crate::heuristics::RegexOracle;
use crate::llm_extract::VisionOracle;
use crate::pdf_extract::PdfDocument;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("{0} env var required for the gemini backend")]
    MissingApiKey(String),
    #[error("no models configured for the gemini backend")]
    NoModels,
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("Google Gemini API quota exceeded, wait a few minutes")]
    QuotaExceeded,
    #[error("all models failed, last error: {0}")]
    AllModelsFailed(String),
    #[error("could not parse model response: {0}")]
    Parse(String),
    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("{0}")]
    Pdf(String),
    #[error("PDF is scanned / image-only, no text layer to read")]
    ScannedDocument,
    #[error("no document sections found")]
    NoSections,
}

/// A field-extraction backend.
///
/// `extract` reads one document. `extract_combined` reads a single PDF that
/// holds all three documents and returns one result per slot.
#[async_trait]
pub trait Oracle: Send + Sync {
    fn name(&self) -> &'static str;

    async fn extract(&self, doc: &PdfDocument) -> Result<DocumentDetails, OracleError>;

    async fn extract_combined(
        &self,
        doc: &PdfDocument,
    ) -> Result<RoleSet<Option<DocumentDetails>>, OracleError>;
}

/// Build the configured backend. Called once at start-up, the result is
/// shared by every worker.
pub fn build_oracle(cfg: &OracleSection) -> Result<Arc<dyn Oracle>, OracleError> {
    let oracle: Arc<dyn Oracle> = match cfg.backend {
        OracleBackend::Gemini => Arc::new(VisionOracle::from_config(&cfg.gemini)?),
        OracleBackend::Heuristics => Arc::new(RegexOracle::new()?),
    };
    info!(backend = oracle.name(), "Oracle ready");
    Ok(oracle)
}

/// Canned answers keyed by document name, for tests.
#[cfg(test)]
pub mod fake {
    use super::*;
    use crate::fields::{ExtractedValue, Field, FieldValue, Source};
    use std::collections::HashMap;

    pub fn details(cartons: Option<f64>, weight: Option<f64>, cbm: Option<f64>) -> DocumentDetails {
        let mut d = DocumentDetails::default();
        for (field, value) in [
            (Field::Cartons, cartons),
            (Field::GrossWeight, weight),
            (Field::Cbm, cbm),
        ] {
            d.set(
                field,
                ExtractedValue::new(field, value.map(FieldValue::from), 1.0, Source::Ai),
            );
        }
        d
    }

    #[derive(Default)]
    pub struct FakeOracle {
        pub docs: HashMap<String, DocumentDetails>,
        /// Looked up before `docs`, for inputs that share a name.
        pub contents: HashMap<Vec<u8>, DocumentDetails>,
        pub combined: Option<RoleSet<Option<DocumentDetails>>>,
    }

    impl FakeOracle {
        pub fn with(mut self, name: &str, details: DocumentDetails) -> Self {
            self.docs.insert(name.to_string(), details);
            self
        }

        pub fn with_content(mut self, bytes: &[u8], details: DocumentDetails) -> Self {
            self.contents.insert(bytes.to_vec(), details);
            self
        }
    }

    #[async_trait]
    impl Oracle for FakeOracle {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn extract(&self, doc: &PdfDocument) -> Result<DocumentDetails, OracleError> {
            self.contents
                .get(&doc.bytes)
                .or_else(|| self.docs.get(&doc.name))
                .cloned()
                .ok_or_else(|| OracleError::Parse(format!("no answer for {}", doc.name)))
        }

        async fn extract_combined(
            &self,
            _doc: &PdfDocument,
        ) -> Result<RoleSet<Option<DocumentDetails>>, OracleError> {
            self.combined.clone().ok_or(OracleError::NoSections)
        }
    }
}
