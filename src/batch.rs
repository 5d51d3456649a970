// src/batch.rs

use crate::archive::{is_pdf, read_pdfs};
use crate::config::BatchSection;
use crate::oracle::Oracle;
use crate::pdf_extract::PdfDocument;
use crate::pipeline::{ItemOutcome, PipelineError, PipelineOptions, check_combined, check_documents};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::sync::Semaphore;
use tracing::{Instrument, error, info, info_span, warn};

/// How the documents of one item arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    /// A zip holding one PDF per document.
    Archive,
    /// One PDF with every document merged in.
    Combined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Match,
    Mismatch,
    Skipped,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchItem {
    pub source: String,
    pub kind: ItemKind,
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    #[serde(flatten)]
    pub outcome: Option<ItemOutcome>,
}

impl BatchItem {
    fn failed(source: String, kind: ItemKind, status: ItemStatus, note: String) -> Self {
        Self {
            source,
            kind,
            status,
            notes: vec![note],
            outcome: None,
        }
    }

    fn checked(source: String, kind: ItemKind, outcome: ItemOutcome) -> Self {
        let status = if outcome.results.all_match {
            ItemStatus::Match
        } else {
            ItemStatus::Mismatch
        };
        Self {
            source,
            kind,
            status,
            notes: outcome.notes(),
            outcome: Some(outcome),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub matched: usize,
    pub mismatched: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl BatchSummary {
    fn tally(items: &[BatchItem]) -> Self {
        let mut summary = Self {
            total: items.len(),
            ..Self::default()
        };
        for item in items {
            match item.status {
                ItemStatus::Match => summary.matched += 1,
                ItemStatus::Mismatch => summary.mismatched += 1,
                ItemStatus::Skipped => summary.skipped += 1,
                ItemStatus::Error => summary.errors += 1,
            }
        }
        summary
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub generated_at: String,
    pub backend: String,
    pub summary: BatchSummary,
    pub items: Vec<BatchItem>,
}

/// Zip archives and standalone PDFs directly inside `dir`, sorted by name,
/// at most `limit` of them. Hidden files are ignored.
pub fn collect_inputs(dir: &Path, limit: usize) -> std::io::Result<Vec<(PathBuf, ItemKind)>> {
    let mut inputs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        let kind = if name.to_lowercase().ends_with(".zip") {
            ItemKind::Archive
        } else if is_pdf(&name) {
            ItemKind::Combined
        } else {
            continue;
        };
        inputs.push((path, kind));
    }

    inputs.sort_by(|a, b| a.0.file_name().cmp(&b.0.file_name()));
    inputs.truncate(limit);
    Ok(inputs)
}

async fn process_item(
    oracle: Arc<dyn Oracle>,
    path: PathBuf,
    kind: ItemKind,
    opts: PipelineOptions,
) -> BatchItem {
    let source = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let checked = match kind {
        ItemKind::Archive => {
            let read = tokio::task::spawn_blocking(move || read_pdfs(&path)).await;
            let pdfs = match read {
                Ok(Ok(pdfs)) => pdfs,
                Ok(Err(e)) => {
                    return BatchItem::failed(source, kind, ItemStatus::Error, format!("Bad archive: {e}"));
                }
                Err(e) => {
                    return BatchItem::failed(source, kind, ItemStatus::Error, format!("Archive task failed: {e}"));
                }
            };
            info!(pdfs = pdfs.len(), "Archive opened");
            check_documents(oracle, pdfs, &opts).await
        }
        ItemKind::Combined => match tokio::fs::read(&path).await {
            Ok(bytes) => check_combined(oracle, &PdfDocument::new(source.clone(), bytes)).await,
            Err(e) => {
                return BatchItem::failed(source, kind, ItemStatus::Error, format!("Read failed: {e}"));
            }
        },
    };

    match checked {
        Ok(outcome) => BatchItem::checked(source, kind, outcome),
        Err(e @ PipelineError::InsufficientDocuments { .. }) => {
            warn!(error = %e, "Skipping item");
            BatchItem::failed(source, kind, ItemStatus::Skipped, e.to_string())
        }
        Err(e) => {
            error!(error = %e, "Item failed");
            BatchItem::failed(source, kind, ItemStatus::Error, e.to_string())
        }
    }
}

/// Check every input in the batch folder, a few items at a time.
///
/// A missing input folder is created and yields an empty report. Items keep
/// their input order in the report regardless of finishing order.
pub async fn run_batch(
    oracle: Arc<dyn Oracle>,
    cfg: &BatchSection,
) -> Result<BatchReport, Box<dyn std::error::Error>> {
    let inputs = if cfg.input_dir.exists() {
        collect_inputs(&cfg.input_dir, cfg.limit)?
    } else {
        fs::create_dir_all(&cfg.input_dir)?;
        warn!(dir = %cfg.input_dir.display(), "Input folder created, put ZIP or PDF files in it");
        Vec::new()
    };
    info!(items = inputs.len(), backend = oracle.name(), "Starting batch");

    let opts = PipelineOptions::from(cfg);
    let semaphore = Arc::new(Semaphore::new(cfg.item_workers.max(1)));
    let mut handles = Vec::with_capacity(inputs.len());

    for (path, kind) in inputs {
        let span = info_span!("item", source = %path.display());
        let oracle = Arc::clone(&oracle);
        let semaphore = Arc::clone(&semaphore);
        let opts = opts.clone();
        let source = path.display().to_string();
        let handle = tokio::spawn(
            async move {
                let _permit = semaphore.acquire_owned().await;
                process_item(oracle, path, kind, opts).await
            }
            .instrument(span),
        );
        handles.push((source, kind, handle));
    }

    let mut items = Vec::with_capacity(handles.len());
    for (source, kind, handle) in handles {
        let item = match handle.await {
            Ok(item) => item,
            Err(e) => BatchItem::failed(source, kind, ItemStatus::Error, format!("Item task failed: {e}")),
        };
        info!(source = %item.source, status = ?item.status, "Item done");
        items.push(item);
    }

    let summary = BatchSummary::tally(&items);
    info!(
        total = summary.total,
        matched = summary.matched,
        mismatched = summary.mismatched,
        skipped = summary.skipped,
        errors = summary.errors,
        "Batch finished"
    );

    Ok(BatchReport {
        generated_at: OffsetDateTime::now_utc().format(&Rfc3339)?,
        backend: oracle.name().to_string(),
        summary,
        items,
    })
}

pub fn write_report(report: &BatchReport, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(report)?)?;
    info!(path = %path.display(), "Report written");
    Ok(())
}
