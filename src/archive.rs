// src/archive.rs

use crate::pdf_extract::PdfDocument;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;
use zip::ZipArchive;
use zip::result::ZipResult;

/// Dot-files and macOS resource forks ride along in many uploaded archives.
fn is_hidden(entry: &str) -> bool {
    entry
        .split(['/', '\\'])
        .any(|part| part.starts_with('.') || part == "__MACOSX")
}

pub fn is_pdf(name: &str) -> bool {
    name.to_lowercase().ends_with(".pdf")
}

/// Largest up-front buffer for one entry. The declared size comes from the
/// archive header and is not trusted beyond this.
const MAX_PREALLOC: u64 = 16 * 1024 * 1024;

fn initial_capacity(declared: u64) -> usize {
    declared.min(MAX_PREALLOC) as usize
}

/// Read every PDF in a zip archive into memory, in archive order.
pub fn read_pdfs(path: &Path) -> ZipResult<Vec<PdfDocument>> {
    let mut archive = ZipArchive::new(File::open(path)?)?;
    let mut pdfs = Vec::new();

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let name = entry.name().to_string();
        if entry.is_dir() || is_hidden(&name) || !is_pdf(&name) {
            debug!(entry = %name, "Skipping archive entry");
            continue;
        }

        let mut bytes = Vec::with_capacity(initial_capacity(entry.size()));
        entry.read_to_end(&mut bytes)?;
        pdfs.push(PdfDocument::new(name, bytes));
    }

    Ok(pdfs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, entries: &[&str]) {
        let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
        let options = SimpleFileOptions::default();
        for name in entries {
            if name.ends_with('/') {
                zip.add_directory(*name, options).unwrap();
            } else {
                zip.start_file(*name, options).unwrap();
                zip.write_all(format!("%PDF {name}").as_bytes()).unwrap();
            }
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_only_visible_pdfs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("order.zip");
        write_zip(
            &path,
            &[
                "INV 7781.pdf",
                "__MACOSX/._INV 7781.pdf",
                ".hidden.pdf",
                "docs/",
                "docs/PL 7781.PDF",
                "notes.txt",
            ],
        );

        let pdfs = read_pdfs(&path).unwrap();
        let names: Vec<&str> = pdfs.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["INV 7781.pdf", "docs/PL 7781.PDF"]);
        assert_eq!(pdfs[0].bytes, b"%PDF INV 7781.pdf");
    }

    #[test]
    fn test_not_a_zip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.zip");
        std::fs::write(&path, b"garbage").unwrap();
        assert!(read_pdfs(&path).is_err());
    }

    #[test]
    fn test_declared_size_capped() {
        assert_eq!(initial_capacity(2048), 2048);
        assert_eq!(initial_capacity(u64::MAX), MAX_PREALLOC as usize);
    }

    #[test]
    fn test_hidden_detection() {
        assert!(is_hidden("a/.DS_Store"));
        assert!(is_hidden("__MACOSX/x.pdf"));
        assert!(!is_hidden("docs/BL.pdf"));
    }
}
