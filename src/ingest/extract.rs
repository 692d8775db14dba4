//! Plain-text extraction from uploaded files.
//!
//! txt/md bodies are decoded directly, docx bodies come out of the zip
//! container, and pdf extraction shells out to poppler with an OCR fallback
//! for image-only documents.

use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use crate::errors::ApiError;
use crate::ingest::fetcher::decode_entities;

pub fn plain_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Extracts paragraph text from `word/document.xml` inside a docx container.
pub fn docx_text(bytes: &[u8]) -> Result<String, ApiError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ApiError::UnsupportedFormat(format!("not a docx container: {e}")))?;

    let mut file = archive
        .by_name("word/document.xml")
        .map_err(|e| ApiError::UnsupportedFormat(format!("docx has no document body: {e}")))?;

    let mut xml = String::new();
    file.read_to_string(&mut xml).map_err(ApiError::internal)?;

    // Paragraph ends become newlines before the markup is dropped.
    let xml = xml.replace("</w:p>", "\n");
    Ok(decode_entities(&strip_xml(&xml)))
}

fn strip_xml(xml: &str) -> String {
    let mut out = String::new();
    let mut in_tag = false;
    for c in xml.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

/// Extracts pdf text via `pdftotext`; when that yields nothing, falls back
/// to OCR (`pdftoppm` + `tesseract`). Returns an empty string, not an
/// error, when OCR also finds nothing.
pub async fn pdf_text(path: &Path) -> Result<String, ApiError> {
    let pdftotext = which::which("pdftotext").ok();

    let direct = match &pdftotext {
        Some(bin) => {
            run_capture(bin, &[path.as_os_str().to_owned(), "-".into()])
                .await
                .unwrap_or_else(|e| {
                    tracing::debug!("pdftotext failed, trying ocr: {e}");
                    String::new()
                })
        }
        None => String::new(),
    };
    if !direct.trim().is_empty() {
        return Ok(direct);
    }

    let ocr_tools = which::which("pdftoppm")
        .ok()
        .zip(which::which("tesseract").ok());
    let Some((pdftoppm, tesseract)) = ocr_tools else {
        if pdftotext.is_none() {
            return Err(ApiError::UnsupportedFormat(
                "pdf ingestion requires pdftotext or pdftoppm+tesseract on PATH".to_string(),
            ));
        }
        return Ok(String::new());
    };

    tracing::info!("no text layer in {}, running ocr", path.display());
    let dir = tempfile::tempdir().map_err(ApiError::internal)?;
    let prefix = dir.path().join("page");
    run_capture(
        &pdftoppm,
        &[
            "-r".into(),
            "200".into(),
            "-png".into(),
            path.as_os_str().to_owned(),
            prefix.as_os_str().to_owned(),
        ],
    )
    .await?;

    let mut pages: Vec<PathBuf> = std::fs::read_dir(dir.path())
        .map_err(ApiError::internal)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("png"))
        .collect();
    pages.sort();

    let mut text = String::new();
    for page in pages {
        let page_text = run_capture(
            &tesseract,
            &[page.as_os_str().to_owned(), "stdout".into()],
        )
        .await?;
        text.push_str(&page_text);
        text.push('\n');
    }

    Ok(text)
}

async fn run_capture(
    bin: &Path,
    args: &[std::ffi::OsString],
) -> Result<String, ApiError> {
    let output = tokio::process::Command::new(bin)
        .args(args)
        .output()
        .await
        .map_err(ApiError::internal)?;

    if !output.status.success() {
        return Err(ApiError::Internal(format!(
            "{} exited with {}",
            bin.display(),
            output.status
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn docx_fixture(body_xml: &str) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file(
                "word/document.xml",
                zip::write::SimpleFileOptions::default(),
            )
            .unwrap();
        writer.write_all(body_xml.as_bytes()).unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn plain_text_is_lossy_utf8() {
        assert_eq!(plain_text(b"hello"), "hello");
        assert!(plain_text(&[0xff, 0xfe, b'h', b'i']).contains("hi"));
    }

    #[test]
    fn docx_paragraphs_become_lines() {
        let bytes = docx_fixture(
            "<w:document><w:body>\
             <w:p><w:r><w:t>First paragraph.</w:t></w:r></w:p>\
             <w:p><w:r><w:t>Second &amp; last.</w:t></w:r></w:p>\
             </w:body></w:document>",
        );

        let text = docx_text(&bytes).unwrap();
        let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        assert_eq!(lines, vec!["First paragraph.", "Second & last."]);
    }

    #[test]
    fn garbage_bytes_are_not_a_docx() {
        let err = docx_text(b"definitely not a zip").unwrap_err();
        assert!(matches!(err, ApiError::UnsupportedFormat(_)));
    }

    #[test]
    fn zip_without_document_xml_is_rejected() {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("other.txt", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"hi").unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let err = docx_text(&bytes).unwrap_err();
        assert!(matches!(err, ApiError::UnsupportedFormat(_)));
    }
}
