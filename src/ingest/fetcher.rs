//! Web page fetching and content extraction.
//!
//! Fixed content-selection policy: prefer `<article>`, then `<main>`, then
//! `<body>`. Script and style blocks are dropped, tags stripped, whitespace
//! collapsed.

use std::time::Duration;

use reqwest::Client;

use crate::errors::ApiError;

pub struct FetchedPage {
    pub text: String,
    /// First `<h1>` content, used as a title fallback.
    pub heading: Option<String>,
}

pub struct PageFetcher {
    client: Client,
}

impl PageFetcher {
    pub fn new(timeout_secs: u64) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(ApiError::internal)?;
        Ok(Self { client })
    }

    pub async fn fetch(&self, url: &str) -> Result<FetchedPage, ApiError> {
        let res = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ApiError::FetchError(format!("request to {url} failed: {e}")))?;

        if !res.status().is_success() {
            return Err(ApiError::FetchError(format!(
                "{url} returned {}",
                res.status()
            )));
        }

        let html = res
            .text()
            .await
            .map_err(|e| ApiError::FetchError(e.to_string()))?;

        let content = select_content(&html);
        let text = strip_tags(content);
        if text.trim().is_empty() {
            return Err(ApiError::FetchError(format!(
                "no content area matched at {url}"
            )));
        }

        Ok(FetchedPage {
            text,
            heading: extract_heading(&html),
        })
    }
}

/// Narrows the page to its main content container.
pub(crate) fn select_content(html: &str) -> &str {
    for tag in ["article", "main", "body"] {
        if let Some(inner) = element_inner(html, tag) {
            return inner;
        }
    }
    html
}

/// Returns the inner slice of the first `<tag ...>...</tag>` element.
fn element_inner<'a>(html: &'a str, tag: &str) -> Option<&'a str> {
    let lower = html.to_lowercase();
    // Case folding can shift byte offsets for some scripts; fall back to a
    // case-sensitive scan when it does.
    let lower = if lower.len() == html.len() {
        lower
    } else {
        html.to_string()
    };
    let open = format!("<{tag}");
    let close = format!("</{tag}>");

    let open_at = lower.find(&open)?;
    let inner_start = open_at + lower[open_at..].find('>')? + 1;
    let inner_end = inner_start + lower[inner_start..].find(&close)?;
    Some(&html[inner_start..inner_end])
}

/// Strips markup, skipping script and style blocks entirely.
pub(crate) fn strip_tags(html: &str) -> String {
    let chars: Vec<char> = html.chars().collect();
    let lower: Vec<char> = html.to_lowercase().chars().collect();

    let mut result = String::new();
    let mut in_tag = false;
    let mut skip_until: Option<&'static str> = None;

    let mut i = 0;
    while i < chars.len() {
        if let Some(close) = skip_until {
            if starts_with_at(&lower, i, close) {
                i += close.len();
                skip_until = None;
            } else {
                i += 1;
            }
            continue;
        }

        if starts_with_at(&lower, i, "<script") {
            skip_until = Some("</script>");
            i += 7;
            continue;
        }
        if starts_with_at(&lower, i, "<style") {
            skip_until = Some("</style>");
            i += 6;
            continue;
        }

        let c = chars[i];
        if c == '<' {
            in_tag = true;
            // Block-level tag boundaries become line breaks so words from
            // adjacent elements do not run together.
            result.push('\n');
        } else if c == '>' {
            in_tag = false;
        } else if !in_tag {
            result.push(c);
        }
        i += 1;
    }

    let lines: Vec<String> = decode_entities(&result)
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .map(|l| l.to_string())
        .collect();

    lines.join("\n")
}

fn starts_with_at(chars: &[char], at: usize, needle: &str) -> bool {
    let needle: Vec<char> = needle.chars().collect();
    chars.len() >= at + needle.len() && chars[at..at + needle.len()] == needle[..]
}

pub(crate) fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Pulls the first `<h1>` text out of the full page.
pub(crate) fn extract_heading(html: &str) -> Option<String> {
    let inner = element_inner(html, "h1")?;
    let heading = strip_tags(inner).replace('\n', " ").trim().to_string();
    if heading.is_empty() {
        None
    } else {
        Some(heading)
    }
}
