//! Plain-text extraction for uploaded resumes.

use crate::error::NexusError;
use quick_xml::Reader;
use quick_xml::events::Event;
use std::io::{Cursor, Read};
use tracing::{debug, info};

pub const PDF_MIME: &str = "application/pdf";
pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

const DOCX_BODY: &str = "word/document.xml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Docx,
}

impl DocumentKind {
    /// Parameters such as `; charset=...` are ignored.
    pub fn from_mime(mime: &str) -> Result<Self, NexusError> {
        let essence = mime.split(';').next().unwrap_or_default().trim();
        if essence.eq_ignore_ascii_case(PDF_MIME) {
            Ok(DocumentKind::Pdf)
        } else if essence.eq_ignore_ascii_case(DOCX_MIME) {
            Ok(DocumentKind::Docx)
        } else {
            Err(NexusError::UnsupportedFileType(mime.to_string()))
        }
    }

    pub fn extract(self, bytes: &[u8]) -> Result<String, NexusError> {
        match self {
            DocumentKind::Pdf => extract_pdf(bytes),
            DocumentKind::Docx => extract_docx(bytes),
        }
    }
}

/// Extract text from `bytes` according to the declared MIME type.
pub fn extract(bytes: &[u8], mime: &str) -> Result<String, NexusError> {
    DocumentKind::from_mime(mime)?.extract(bytes)
}

/// [`DocumentKind::extract`] on the blocking pool; parsing is CPU-bound.
pub async fn extract_blocking(bytes: Vec<u8>, kind: DocumentKind) -> Result<String, NexusError> {
    info!(kind = ?kind, size = bytes.len(), "extracting document text");
    tokio::task::spawn_blocking(move || kind.extract(&bytes)).await?
}

/// Pages in document order; a page without extractable text adds nothing.
fn extract_pdf(bytes: &[u8]) -> Result<String, NexusError> {
    let doc = lopdf::Document::load_mem(bytes)
        .map_err(|e| NexusError::Extraction(format!("unreadable PDF: {e}")))?;

    let text = doc
        .get_pages()
        .into_keys()
        .map(|page| {
            doc.extract_text(&[page]).unwrap_or_else(|e| {
                debug!(page, error = %e, "no extractable text on page");
                String::new()
            })
        })
        .collect();
    Ok(text)
}

/// Paragraphs of `word/document.xml` joined by newlines.
fn extract_docx(bytes: &[u8]) -> Result<String, NexusError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| NexusError::Extraction(format!("unreadable DOCX container: {e}")))?;
    let mut xml = String::new();
    archive
        .by_name(DOCX_BODY)
        .map_err(|e| NexusError::Extraction(format!("missing {DOCX_BODY}: {e}")))?
        .read_to_string(&mut xml)
        .map_err(|e| NexusError::Extraction(format!("corrupt {DOCX_BODY}: {e}")))?;

    paragraphs_from_xml(&xml).map(|paragraphs| paragraphs.join("\n"))
}

fn paragraphs_from_xml(xml: &str) -> Result<Vec<String>, NexusError> {
    let mut reader = Reader::from_str(xml);
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| NexusError::Extraction(format!("malformed document XML: {e}")))?;
        match event {
            Event::Start(e) => match e.name().as_ref() {
                b"w:p" => current.clear(),
                b"w:t" => in_text = true,
                _ => {}
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"w:p" => paragraphs.push(String::new()),
                b"w:tab" => current.push('\t'),
                b"w:br" | b"w:cr" => current.push('\n'),
                _ => {}
            },
            Event::Text(t) if in_text => {
                let text = t
                    .unescape()
                    .map_err(|e| NexusError::Extraction(format!("bad text run: {e}")))?;
                current.push_str(&text);
            }
            Event::End(e) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:p" => paragraphs.push(std::mem::take(&mut current)),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(paragraphs)
}
