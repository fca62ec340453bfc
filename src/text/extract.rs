use std::path::{Path, PathBuf};

use super::chunker::normalize_whitespace;

#[derive(thiserror::Error, Debug)]
pub enum ExtractionError {
    #[error("I/O error reading document: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to read EPUB: {0}")]
    Epub(String),
    #[error("Unsupported document format: {} (enable the `epub` feature for .epub files)", .0.display())]
    UnsupportedFormat(PathBuf),
    #[error("Start offset must be between 0 and 100 percent, got {0}")]
    InvalidOffset(f64),
    #[error("No text found in {}", .0.display())]
    Empty(PathBuf),
}

/// Extract the narratable text of a document as one whitespace-normalized string.
///
/// `.epub` files are read in spine order with markup stripped; anything else is
/// read as UTF-8 text. When `start_offset_percent > 0` the leading share of
/// characters is dropped.
pub fn extract_text(path: &Path, start_offset_percent: f64) -> Result<String, ExtractionError> {
    validate_offset(start_offset_percent)?;

    let is_epub = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("epub"));

    let raw = if is_epub {
        read_epub(path)?
    } else {
        std::fs::read_to_string(path)?
    };

    let text = normalize_whitespace(&raw);
    log::info!("Extracted {} characters from {}", text.chars().count(), path.display());

    let text = apply_start_offset(&text, start_offset_percent)?;
    if text.is_empty() {
        return Err(ExtractionError::Empty(path.to_path_buf()));
    }
    Ok(text)
}

/// Drop the first `floor(len * percent / 100)` characters of `text`.
pub fn apply_start_offset(text: &str, percent: f64) -> Result<String, ExtractionError> {
    validate_offset(percent)?;
    if percent == 0.0 {
        return Ok(text.to_string());
    }

    let total = text.chars().count();
    let skip = (total as f64 * percent / 100.0).floor() as usize;
    let start = text
        .char_indices()
        .nth(skip)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len());

    log::info!("Starting from {percent}% ({skip} characters skipped)");
    Ok(text[start..].to_string())
}

fn validate_offset(percent: f64) -> Result<(), ExtractionError> {
    if !(0.0..=100.0).contains(&percent) {
        return Err(ExtractionError::InvalidOffset(percent));
    }
    Ok(())
}

#[cfg(feature = "epub")]
fn read_epub(path: &Path) -> Result<String, ExtractionError> {
    use html2text::render::text_renderer::TrivialDecorator;

    let mut doc =
        epub::doc::EpubDoc::new(path).map_err(|e| ExtractionError::Epub(e.to_string()))?;

    let mut sections = Vec::new();
    loop {
        if let Some((content, _mime)) = doc.get_current_str() {
            let plain =
                html2text::from_read_with_decorator(content.as_bytes(), 10_000, TrivialDecorator::new());
            let plain = normalize_whitespace(&plain);
            if !plain.is_empty() {
                sections.push(plain);
            }
        }
        if !doc.go_next() {
            break;
        }
    }

    log::debug!("Read {} text sections from {}", sections.len(), path.display());
    Ok(sections.join(" "))
}

#[cfg(not(feature = "epub"))]
fn read_epub(path: &Path) -> Result<String, ExtractionError> {
    Err(ExtractionError::UnsupportedFormat(path.to_path_buf()))
}
