//! Document ingestion: normalization and chunking.
//!
//! A raw source (uploaded bytes or a URL) becomes a normalized [`Document`]
//! exactly once, here; every later layer reads the already-clean title and
//! origin instead of re-sanitizing them.

pub mod chunker;
mod extract;
mod fetcher;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use fetcher::PageFetcher;

use crate::errors::ApiError;

const ALLOWED_EXTENSIONS: [&str; 4] = ["txt", "md", "docx", "pdf"];

/// A normalized source document. Immutable; consumed once by the chunker
/// and never persisted itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub title: String,
    pub origin: String,
    pub body: String,
}

/// File family resolved once from the extension at the ingestion entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    Text,
    Docx,
    Pdf,
}

impl FileKind {
    fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "txt" | "md" => Some(FileKind::Text),
            "docx" => Some(FileKind::Docx),
            "pdf" => Some(FileKind::Pdf),
            _ => None,
        }
    }
}

/// Display title: trimmed, with a known file extension stripped.
pub fn normalize_title(raw: &str) -> String {
    let trimmed = raw.trim();
    let stem = Path::new(trimmed)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(trimmed);

    // Only strip suffixes that are actually ingestable extensions;
    // "v1.2-notes" keeps its dot.
    let ext = Path::new(trimmed)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());
    match ext.as_deref() {
        Some(ext) if ALLOWED_EXTENSIONS.contains(&ext) => stem.to_string(),
        _ => trimmed.to_string(),
    }
}

/// Case-insensitive matching key for a display title.
pub fn title_key(title: &str) -> String {
    normalize_title(title).to_lowercase()
}

pub struct DocumentNormalizer {
    fetcher: PageFetcher,
    upload_dir: PathBuf,
}

impl DocumentNormalizer {
    pub fn new(upload_dir: PathBuf, timeout_secs: u64) -> Result<Self, ApiError> {
        Ok(Self {
            fetcher: PageFetcher::new(timeout_secs)?,
            upload_dir,
        })
    }

    /// Normalizes an uploaded file. The byte spool for external tools is a
    /// temp file that is removed on every exit path.
    pub async fn normalize_file(
        &self,
        filename: &str,
        bytes: &[u8],
        explicit_title: Option<&str>,
    ) -> Result<Document, ApiError> {
        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        let kind = FileKind::from_extension(&ext).ok_or_else(|| {
            ApiError::UnsupportedFormat(format!(
                "extension '{ext}' not allowed (expected one of {})",
                ALLOWED_EXTENSIONS.join(", ")
            ))
        })?;

        let body = match kind {
            FileKind::Text => extract::plain_text(bytes),
            FileKind::Docx => extract::docx_text(bytes)?,
            FileKind::Pdf => {
                let spool = tempfile::Builder::new()
                    .suffix(".pdf")
                    .tempfile_in(&self.upload_dir)
                    .map_err(ApiError::internal)?;
                std::fs::write(spool.path(), bytes).map_err(ApiError::internal)?;
                // `spool` drops (and unlinks) whether extraction succeeds or
                // fails.
                extract::pdf_text(spool.path()).await?
            }
        };

        if body.trim().is_empty() {
            return Err(ApiError::EmptyDocument);
        }

        let title = match explicit_title.map(str::trim).filter(|t| !t.is_empty()) {
            Some(title) => normalize_title(title),
            None => normalize_title(filename),
        };

        Ok(Document {
            title,
            origin: filename.trim().to_string(),
            body,
        })
    }

    /// Fetches and normalizes a web page.
    pub async fn normalize_url(
        &self,
        explicit_title: Option<&str>,
        url: &str,
    ) -> Result<Document, ApiError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(ApiError::BadRequest("url is required".to_string()));
        }

        let page = self.fetcher.fetch(url).await?;

        let title = explicit_title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(normalize_title)
            .or_else(|| page.heading.clone())
            .or_else(|| url_title_fallback(url))
            .ok_or_else(|| ApiError::BadRequest("cannot derive a title for this url".to_string()))?;

        Ok(Document {
            title,
            origin: url.to_string(),
            body: page.text,
        })
    }
}

/// Last non-empty path segment of the URL.
fn url_title_fallback(url: &str) -> Option<String> {
    let without_scheme = url.split("://").nth(1).unwrap_or(url);
    let path = without_scheme
        .split(['?', '#'])
        .next()
        .unwrap_or(without_scheme);

    let segments: Vec<&str> = path
        .split('/')
        .skip(1) // host
        .filter(|segment| !segment.is_empty())
        .collect();
    segments.last().map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn normalizer(dir: &Path) -> DocumentNormalizer {
        DocumentNormalizer::new(dir.to_path_buf(), 5).unwrap()
    }

    #[tokio::test]
    async fn txt_upload_uses_file_stem_as_title() {
        let dir = tempfile::tempdir().unwrap();
        let doc = normalizer(dir.path())
            .normalize_file("Quarterly Report.txt", b"some body text", None)
            .await
            .unwrap();

        assert_eq!(doc.title, "Quarterly Report");
        assert_eq!(doc.origin, "Quarterly Report.txt");
        assert_eq!(doc.body, "some body text");
    }

    #[tokio::test]
    async fn explicit_title_wins_over_filename() {
        let dir = tempfile::tempdir().unwrap();
        let doc = normalizer(dir.path())
            .normalize_file("raw-dump.txt", b"body", Some("Clean Title"))
            .await
            .unwrap();
        assert_eq!(doc.title, "Clean Title");
    }

    #[tokio::test]
    async fn unknown_extension_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let err = normalizer(dir.path())
            .normalize_file("archive.tar.gz", b"bytes", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::UnsupportedFormat(_)));
    }

    #[tokio::test]
    async fn empty_file_is_an_empty_document_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = normalizer(dir.path())
            .normalize_file("blank.txt", b"   \n  ", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::EmptyDocument));
    }

    #[tokio::test]
    async fn docx_upload_extracts_paragraphs() {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        writer
            .start_file(
                "word/document.xml",
                zip::write::SimpleFileOptions::default(),
            )
            .unwrap();
        writer
            .write_all(b"<w:document><w:body><w:p><w:r><w:t>Docx body here.</w:t></w:r></w:p></w:body></w:document>")
            .unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let dir = tempfile::tempdir().unwrap();
        let doc = normalizer(dir.path())
            .normalize_file("notes.docx", &bytes, None)
            .await
            .unwrap();
        assert_eq!(doc.title, "notes");
        assert!(doc.body.contains("Docx body here."));
    }

    #[test]
    fn title_normalization_strips_known_extensions_only() {
        assert_eq!(normalize_title("  Report.pdf "), "Report");
        assert_eq!(normalize_title("Report.PDF"), "Report");
        assert_eq!(normalize_title("v1.2-notes"), "v1.2-notes");
        assert_eq!(normalize_title("plain"), "plain");
    }

    #[test]
    fn title_keys_are_case_insensitive() {
        assert_eq!(title_key("Doc1.txt"), title_key("doc1"));
        assert_eq!(title_key("DOC1"), "doc1");
    }

    #[test]
    fn url_fallback_is_last_path_segment() {
        assert_eq!(
            url_title_fallback("https://example.com/news/some-article?q=1"),
            Some("some-article".to_string())
        );
        assert_eq!(url_title_fallback("https://example.com/"), None);
    }
}
