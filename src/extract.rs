//! Format-specific text extraction (PDF, DOCX, plain text).
//!
//! Takes the raw bytes of an upload plus its [`DocumentFormat`] and returns
//! plain UTF-8 text. Extraction never panics: parser panics inside
//! `pdf-extract` are caught and reported as [`ExtractError::ExtractionFailure`].
//!
//! All functions here are synchronous and CPU-bound; the ingestion
//! pipeline calls them from `tokio::task::spawn_blocking`.

use std::io::Read;

use docqa_core::error::ExtractError;
use docqa_core::models::DocumentFormat;
use quick_xml::events::Event;

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

const DOCX_BODY: &str = "word/document.xml";

/// Extract text from `bytes` declared as `format`.
///
/// Fails with [`ExtractError::EmptyExtraction`] when the result is blank
/// after trimming.
pub fn extract_text(bytes: &[u8], format: DocumentFormat) -> Result<String, ExtractError> {
    let text = match format {
        DocumentFormat::Pdf => extract_pdf(bytes)?,
        DocumentFormat::Docx => extract_docx(bytes)?,
        DocumentFormat::Txt => extract_txt(bytes),
    };
    if text.trim().is_empty() {
        return Err(ExtractError::EmptyExtraction);
    }
    Ok(text)
}

/// Detect the format from `filename` and extract.
pub fn extract_file(filename: &str, bytes: &[u8]) -> Result<String, ExtractError> {
    let format = DocumentFormat::from_filename(filename)?;
    extract_text(bytes, format)
}

fn failure(format: DocumentFormat, message: impl Into<String>) -> ExtractError {
    ExtractError::ExtractionFailure {
        format,
        message: message.into(),
    }
}

fn extract_txt(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    text.strip_prefix('\u{feff}').unwrap_or(&text).to_string()
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    match std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes)) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(failure(DocumentFormat::Pdf, e.to_string())),
        Err(_) => Err(failure(DocumentFormat::Pdf, "parser panicked on malformed input")),
    }
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| failure(DocumentFormat::Docx, e.to_string()))?;
    let entry = archive
        .by_name(DOCX_BODY)
        .map_err(|_| failure(DocumentFormat::Docx, format!("{} not found", DOCX_BODY)))?;

    let mut xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut xml)
        .map_err(|e| failure(DocumentFormat::Docx, e.to_string()))?;
    if xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(failure(
            DocumentFormat::Docx,
            format!("{} exceeds size limit ({} bytes)", DOCX_BODY, MAX_XML_ENTRY_BYTES),
        ));
    }
    docx_body_text(&xml)
}

/// Walk WordprocessingML and collect run text.
///
/// `w:t` contributes its text, `w:tab` inside a run a tab, `w:br`/`w:cr` a
/// newline, and every paragraph end a newline. Whitespace inside `w:t` is
/// kept as written.
fn docx_body_text(xml: &[u8]) -> Result<String, ExtractError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_run = false;
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"r" => in_run = true,
                b"t" if in_run => in_text = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" if in_run => out.push('\t'),
                b"br" | b"cr" if in_run => out.push('\n'),
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Text(te)) if in_text => {
                let text = te
                    .unescape()
                    .map_err(|e| failure(DocumentFormat::Docx, e.to_string()))?;
                out.push_str(&text);
            }
            Ok(Event::CData(cd)) if in_text => {
                out.push_str(&String::from_utf8_lossy(&cd.into_inner()));
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"r" => in_run = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(failure(DocumentFormat::Docx, e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn docx_with_body(body: &str) -> Vec<u8> {
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}</w:body></w:document>"#,
            body
        );
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut cursor);
            let options = zip::write::SimpleFileOptions::default();
            zip.start_file("word/document.xml", options).unwrap();
            zip.write_all(xml.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_txt_is_decoded_and_bom_stripped() {
        let text = extract_text("\u{feff}Hello policy".as_bytes(), DocumentFormat::Txt).unwrap();
        assert_eq!(text, "Hello policy");
    }

    #[test]
    fn test_txt_invalid_utf8_is_lossy() {
        let text = extract_text(b"abc\xffdef", DocumentFormat::Txt).unwrap();
        assert_eq!(text, "abc\u{fffd}def");
    }

    #[test]
    fn test_empty_txt_is_empty_extraction() {
        assert_eq!(
            extract_text(b"", DocumentFormat::Txt).unwrap_err(),
            ExtractError::EmptyExtraction
        );
        assert_eq!(
            extract_text(b" \n\t ", DocumentFormat::Txt).unwrap_err(),
            ExtractError::EmptyExtraction
        );
    }

    #[test]
    fn test_invalid_pdf_is_extraction_failure() {
        let err = extract_text(b"not a pdf", DocumentFormat::Pdf).unwrap_err();
        assert!(matches!(
            err,
            ExtractError::ExtractionFailure {
                format: DocumentFormat::Pdf,
                ..
            }
        ));
    }

    #[test]
    fn test_invalid_zip_is_extraction_failure() {
        let err = extract_text(b"not a zip", DocumentFormat::Docx).unwrap_err();
        assert!(matches!(
            err,
            ExtractError::ExtractionFailure {
                format: DocumentFormat::Docx,
                ..
            }
        ));
    }

    #[test]
    fn test_docx_paragraphs_tabs_and_breaks() {
        let body = concat!(
            r#"<w:p><w:pPr><w:tabs><w:tab w:val="left" w:pos="720"/></w:tabs></w:pPr>"#,
            r#"<w:r><w:t>Waiting</w:t><w:tab/><w:t xml:space="preserve">period </w:t></w:r>"#,
            r#"<w:r><w:t>&amp; exclusions</w:t></w:r></w:p>"#,
            r#"<w:p><w:r><w:t>Line one</w:t><w:br/><w:t>Line two</w:t></w:r></w:p>"#,
        );
        let text = extract_text(&docx_with_body(body), DocumentFormat::Docx).unwrap();
        assert_eq!(text, "Waiting\tperiod & exclusions\nLine one\nLine two\n");
    }

    #[test]
    fn test_docx_without_text_is_empty_extraction() {
        let bytes = docx_with_body("<w:p/><w:p></w:p>");
        assert_eq!(
            extract_text(&bytes, DocumentFormat::Docx).unwrap_err(),
            ExtractError::EmptyExtraction
        );
    }

    #[test]
    fn test_docx_missing_body_part() {
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut cursor);
            zip.start_file("other.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(b"<x/>").unwrap();
            zip.finish().unwrap();
        }
        let err = extract_text(&cursor.into_inner(), DocumentFormat::Docx).unwrap_err();
        assert!(err.to_string().contains("word/document.xml not found"));
    }

    #[test]
    fn test_extract_file_rejects_unknown_extension() {
        assert_eq!(
            extract_file("setup.exe", b"MZ").unwrap_err(),
            ExtractError::UnsupportedFormat(".exe".to_string())
        );
    }
}
