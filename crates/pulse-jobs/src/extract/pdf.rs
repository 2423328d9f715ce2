//! PDF text extraction using `pdftotext` (poppler-utils).

use std::io::Write;
use std::time::Duration;

use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::debug;

use pulse_core::defaults::{EXTRACTION_CMD_TIMEOUT_SECS, PDF_DEFAULT_TITLE, PDF_TITLE_MAX_CHARS};
use pulse_core::{Error, Result};

use super::CrawledItem;

/// True when the body starts with the `%PDF` magic bytes.
pub fn has_pdf_magic(data: &[u8]) -> bool {
    data.len() >= 4 && &data[..4] == b"%PDF"
}

/// First trimmed non-empty line shorter than the title limit.
pub fn pdf_title(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && l.chars().count() < PDF_TITLE_MAX_CHARS)
        .unwrap_or(PDF_DEFAULT_TITLE)
        .to_string()
}

/// Run a command with a timeout, returning stdout as a string. The child
/// is killed when the timeout drops it.
async fn run_cmd_with_timeout(cmd: &mut Command, timeout_secs: u64) -> Result<String> {
    cmd.kill_on_drop(true);
    let output = tokio::time::timeout(Duration::from_secs(timeout_secs), cmd.output())
        .await
        .map_err(|_| {
            Error::Internal(format!(
                "External command timed out after {}s",
                timeout_secs
            ))
        })?
        .map_err(|e| Error::Internal(format!("Failed to execute command: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Internal(format!(
            "Command failed (exit {}): {}",
            output.status,
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Extract a PDF document into a single item.
///
/// The bytes are written to a temp file because `pdftotext` reads from a
/// path. Fails when the tool is missing, times out, or yields no text.
pub async fn extract_pdf(data: &[u8], url: &str) -> Result<CrawledItem> {
    if !has_pdf_magic(data) {
        return Err(Error::InvalidInput(format!(
            "{} is not a valid PDF (missing %PDF header)",
            url
        )));
    }

    let mut tmpfile = NamedTempFile::new()
        .map_err(|e| Error::Internal(format!("Failed to create temp file: {}", e)))?;
    tmpfile
        .write_all(data)
        .map_err(|e| Error::Internal(format!("Failed to write temp file: {}", e)))?;
    let tmp_path = tmpfile.path().to_string_lossy().to_string();

    let text = run_cmd_with_timeout(
        Command::new("pdftotext")
            .arg("-layout")
            .arg("-enc")
            .arg("UTF-8")
            .arg(&tmp_path)
            .arg("-"),
        EXTRACTION_CMD_TIMEOUT_SECS,
    )
    .await?;

    let content = text.trim();
    if content.is_empty() {
        return Err(Error::InvalidInput(format!(
            "No text content found in PDF {}",
            url
        )));
    }

    debug!(
        subsystem = "jobs",
        component = "crawl",
        op = "extract_pdf",
        url,
        chars = content.len(),
        "PDF text extracted"
    );

    let title = pdf_title(content);
    Ok(CrawledItem::new(url, content).with_title(Some(title)))
}
