//! Document discovery and cheap structural validation.
//!
//! Listing stays at the client-interface level so it works for any share
//! backend, not just mounted ones.

use super::{RemoteFile, ShareClient};
use crate::error::{RedateError, Result};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Window scanned for the `%%EOF` marker at the end of a PDF
const EOF_SCAN_WINDOW: usize = 128;

/// True when the file name carries a `.pdf` extension (any case)
pub fn is_pdf_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

/// List the PDF files under `dir`, optionally descending into
/// subdirectories. Results are sorted by path so listings are stable
/// across runs.
pub async fn find_documents(
    client: &dyn ShareClient,
    dir: &Path,
    recursive: bool,
) -> Result<Vec<RemoteFile>> {
    let mut documents = Vec::new();
    let mut pending: Vec<PathBuf> = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        for entry in client.list_dir(&current).await? {
            if entry.stat.is_dir {
                if recursive {
                    pending.push(entry.path);
                }
                continue;
            }

            if is_pdf_path(&entry.path) {
                documents.push(RemoteFile {
                    path: entry.path,
                    size: entry.stat.size,
                    times: entry.stat.times,
                });
            }
        }
    }

    documents.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(documents)
}

/// Structural PDF check: the header must be present; a missing `%%EOF`
/// trailer is only worth a warning (plenty of real-world scanners emit
/// PDFs without one).
pub async fn validate_pdf(client: &dyn ShareClient, path: &Path) -> Result<()> {
    let bytes = client.read(path).await?;

    if !bytes.starts_with(b"%PDF-") {
        return Err(RedateError::InvalidDocument(format!(
            "{}: missing PDF header",
            path.display()
        )));
    }

    let tail_start = bytes.len().saturating_sub(EOF_SCAN_WINDOW);
    let tail = &bytes[tail_start..];
    if !tail.windows(5).any(|window| window == b"%%EOF") {
        warn!("PDF missing EOF marker: {}", path.display());
    }

    Ok(())
}
