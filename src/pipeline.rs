// src/pipeline.rs

use crate::classify::{DocumentRole, RoleSet, assign_slots};
use crate::config::BatchSection;
use crate::fields::DocumentDetails;
use crate::normalize::sanitize;
use crate::oracle::{Oracle, OracleError};
use crate::pdf_extract::PdfDocument;
use crate::reconcile::{Reconciliation, compare_roles};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// A cross-check needs at least this many documents.
pub const MIN_DOCUMENTS: usize = 2;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Found only {found} PDFs (need at least {MIN_DOCUMENTS})")]
    InsufficientDocuments { found: usize },
    #[error(transparent)]
    Oracle(#[from] OracleError),
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Documents of one item extracted at the same time.
    pub doc_workers: usize,
    pub api_delay: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            doc_workers: 3,
            api_delay: Duration::ZERO,
        }
    }
}

impl From<&BatchSection> for PipelineOptions {
    fn from(cfg: &BatchSection) -> Self {
        Self {
            doc_workers: cfg.doc_workers,
            api_delay: Duration::from_millis(cfg.api_delay_ms),
        }
    }
}

/// What was read from one document slot.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentReport {
    pub filename: String,
    pub details: DocumentDetails,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemOutcome {
    pub documents: RoleSet<Option<DocumentReport>>,
    pub results: Reconciliation,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unused: Vec<String>,
}

impl ItemOutcome {
    /// Extraction failures first, then every field that did not match.
    pub fn notes(&self) -> Vec<String> {
        let mut notes: Vec<String> = self
            .documents
            .iter()
            .filter_map(|(role, doc)| {
                let error = doc.as_ref()?.error.as_ref()?;
                Some(format!("[{} error: {error}]", role.key()))
            })
            .collect();
        notes.extend(self.results.issues());
        notes
    }

    fn reconcile(documents: RoleSet<Option<DocumentReport>>, unused: Vec<String>) -> Self {
        let details = documents
            .clone()
            .map(|_, doc| doc.map(|d| d.details));
        let results = compare_roles(&details);
        info!(all_match = results.all_match, "Reconciled");
        Self {
            documents,
            results,
            unused,
        }
    }
}

fn report(filename: String, extracted: Result<DocumentDetails, String>) -> DocumentReport {
    match extracted {
        Ok(details) => DocumentReport {
            filename,
            details: sanitize(details),
            error: None,
        },
        Err(error) => {
            warn!(document = %filename, error = %error, "Extraction failed");
            DocumentReport {
                filename,
                details: DocumentDetails::default(),
                error: Some(error),
            }
        }
    }
}

/// Classify a set of PDFs, extract the assigned ones and cross-check them.
///
/// A document whose extraction fails keeps its slot with an error and no
/// values, so the remaining documents are still compared.
pub async fn check_documents(
    oracle: Arc<dyn Oracle>,
    docs: Vec<PdfDocument>,
    opts: &PipelineOptions,
) -> Result<ItemOutcome, PipelineError> {
    if docs.len() < MIN_DOCUMENTS {
        return Err(PipelineError::InsufficientDocuments { found: docs.len() });
    }

    let names: Vec<String> = docs.iter().map(|d| d.name.clone()).collect();
    let (slots, unused) = assign_slots(&names);
    info!(
        assigned = slots.iter().filter(|(_, i)| i.is_some()).count(),
        unused = unused.len(),
        "Classified documents"
    );

    let mut pool: Vec<Option<PdfDocument>> = docs.into_iter().map(Some).collect();
    let semaphore = Arc::new(Semaphore::new(opts.doc_workers.max(1)));
    let mut handles: Vec<(DocumentRole, String, JoinHandle<Result<DocumentDetails, OracleError>>)> =
        Vec::new();

    for (role, &slot) in slots.iter() {
        let Some(doc) = slot.and_then(|i| pool[i].take()) else {
            continue;
        };
        let name = doc.name.clone();

        let oracle = Arc::clone(&oracle);
        let semaphore = Arc::clone(&semaphore);
        let delay = opts.api_delay;
        let handle = tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            info!(role = role.title(), document = %doc.name, backend = oracle.name(), "Extracting");
            let result = oracle.extract(&doc).await;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            result
        });
        handles.push((role, name, handle));
    }

    let mut documents: RoleSet<Option<DocumentReport>> = RoleSet::default();
    for (role, filename, handle) in handles {
        let extracted = match handle.await {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(e) => Err(format!("extraction task failed: {e}")),
        };
        *documents.get_mut(role) = Some(report(filename, extracted));
    }

    let unused = unused.into_iter().map(|i| names[i].clone()).collect();
    Ok(ItemOutcome::reconcile(documents, unused))
}

/// Cross-check the documents merged into a single PDF.
pub async fn check_combined(
    oracle: Arc<dyn Oracle>,
    doc: &PdfDocument,
) -> Result<ItemOutcome, PipelineError> {
    info!(document = %doc.name, backend = oracle.name(), "Extracting combined PDF");
    let sections = oracle.extract_combined(doc).await?;

    let documents = sections.map(|_, details| details.map(|d| report(doc.name.clone(), Ok(d))));
    Ok(ItemOutcome::reconcile(documents, Vec::new()))
}
