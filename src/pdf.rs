use lopdf::Document;
use std::path::Path;

/// Extract the text of every page of a PDF, concatenated in document order
/// with no separator between pages.
///
/// Parse failures (corrupt file, unsupported encoding) propagate to the
/// caller; the playback view treats them as non-fatal and renders without a
/// transcript.
pub fn extract_pdf_text(path: &Path) -> Result<String, Box<dyn std::error::Error>> {
    let doc = Document::load(path)?;
    let mut text = String::new();
    for page_number in doc.get_pages().keys() {
        text.push_str(&doc.extract_text(&[*page_number])?);
    }
    Ok(text)
}
