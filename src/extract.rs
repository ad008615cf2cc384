//! Content extraction routed by file category.
//!
//! Text-like files (plain text, Markdown, DOCX, PDF) are reduced to a UTF-8
//! string for chunking; image-like files (PNG, JPEG) are passed through as
//! raw bytes for whole-image embedding. Unreadable files surface as
//! [`IndexError::TransientFile`], parse failures as
//! [`IndexError::UnsupportedContent`]; both skip the file, never the batch.

use std::io::Read;
use std::path::Path;

use crate::error::IndexError;

/// Coarse routing category for a file, derived from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Text,
    Image,
}

/// Classify a path by extension. `None` means the file is not indexable.
pub fn classify(path: &Path) -> Option<FileKind> {
    match extension_of(path).as_deref() {
        Some(".txt") | Some(".md") | Some(".docx") | Some(".pdf") => Some(FileKind::Text),
        Some(".png") | Some(".jpg") | Some(".jpeg") => Some(FileKind::Image),
        _ => None,
    }
}

/// Lowercased extension with a leading dot, e.g. `Some(".txt")`.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
}

/// Extract the text content of a text-like file.
pub fn extract_text(path: &Path) -> Result<String, IndexError> {
    match extension_of(path).as_deref() {
        Some(".txt") | Some(".md") => read_lossy(path),
        Some(".docx") => {
            let bytes = read_bytes(path)?;
            extract_docx(&bytes).map_err(|e| IndexError::unsupported(path, e))
        }
        Some(".pdf") => {
            let bytes = read_bytes(path)?;
            pdf_extract::extract_text_from_mem(&bytes)
                .map_err(|e| IndexError::unsupported(path, e))
        }
        other => Err(IndexError::unsupported(
            path,
            format!("unsupported extension: {}", other.unwrap_or("(none)")),
        )),
    }
}

/// Read a file as raw bytes (image payloads go straight to the embedder).
pub fn read_bytes(path: &Path) -> Result<Vec<u8>, IndexError> {
    std::fs::read(path).map_err(|e| IndexError::transient(path, e))
}

/// Read a file as text, tolerating non-UTF-8 content via lossy decoding.
fn read_lossy(path: &Path) -> Result<String, IndexError> {
    let bytes = read_bytes(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Pull the `w:t` text runs out of `word/document.xml` inside the DOCX zip.
fn extract_docx(bytes: &[u8]) -> Result<String, String> {
    let mut archive =
        zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| e.to_string())?;
    let mut doc_xml = Vec::new();
    archive
        .by_name("word/document.xml")
        .map_err(|_| "word/document.xml not found".to_string())?
        .read_to_end(&mut doc_xml)
        .map_err(|e| e.to_string())?;

    use quick_xml::events::Event;

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(doc_xml.as_slice());
    let mut buf = Vec::new();
    let mut in_paragraph = false;
    let mut in_text_run = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"p" => in_paragraph = true,
                b"t" => in_text_run = true,
                _ => {}
            },
            // Only text inside w:t runs is document content.
            Ok(Event::Text(t)) if in_text_run => {
                out.push_str(t.unescape().unwrap_or_default().as_ref());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text_run = false,
                // Paragraph boundaries become newlines, matching visual layout.
                b"p" if in_paragraph => {
                    out.push('\n');
                    in_paragraph = false;
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.to_string()),
            _ => {}
        }
        buf.clear();
    }

    Ok(out.trim_end().to_string())
}
