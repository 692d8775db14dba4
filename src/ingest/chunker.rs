//! Overlapping text splitter.
//!
//! Greedy recursive policy: paragraph boundaries first, then sentence
//! boundaries, then raw character windows, keeping chunks close to the
//! configured size without cutting mid-word where avoidable.

use std::sync::OnceLock;

use regex::Regex;

fn sentence_boundary() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.!?][\x22')\]]?\s+").expect("valid sentence regex"))
}

/// Splits `body` into ordered chunks of roughly `chunk_size` characters,
/// consecutive chunks sharing roughly `overlap` characters at the boundary.
///
/// A body no longer than `chunk_size` yields exactly one chunk (the trimmed
/// body); an empty body yields no chunks and the caller decides whether that
/// is an error.
pub fn split(body: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let body = body.trim();
    if body.is_empty() {
        return Vec::new();
    }

    let chunk_size = chunk_size.max(1);
    let overlap = overlap.min(chunk_size.saturating_sub(1));

    if body.chars().count() <= chunk_size {
        return vec![body.to_string()];
    }

    // Segments are each small enough that one always fits next to the
    // carried-over overlap tail.
    let segment_limit = (chunk_size - overlap).max(1);
    let segments = segment(body, segment_limit);

    let mut chunks = Vec::new();
    let mut buf = String::new();
    let mut buf_chars = 0usize;

    for seg in segments {
        let seg_chars = seg.text.chars().count();

        if buf_chars > 0 && buf_chars + 1 + seg_chars > chunk_size {
            let tail = overlap_tail(&buf, overlap);
            push_chunk(&mut chunks, &mut buf);
            buf = tail;
            buf_chars = buf.chars().count();
        }

        if buf_chars > 0 {
            buf.push_str(if seg.starts_paragraph { "\n\n" } else { " " });
            buf_chars += 1;
        }
        buf.push_str(&seg.text);
        buf_chars += seg_chars;
    }

    push_chunk(&mut chunks, &mut buf);
    chunks
}

struct Segment {
    text: String,
    starts_paragraph: bool,
}

/// Breaks the body into segments no longer than `limit` characters,
/// preferring paragraph then sentence boundaries.
fn segment(body: &str, limit: usize) -> Vec<Segment> {
    let mut segments = Vec::new();

    for paragraph in body.split("\n\n") {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }

        let mut first_in_paragraph = true;
        if paragraph.chars().count() <= limit {
            segments.push(Segment {
                text: paragraph.to_string(),
                starts_paragraph: true,
            });
            continue;
        }

        for sentence in split_sentences(paragraph) {
            if sentence.chars().count() <= limit {
                segments.push(Segment {
                    text: sentence.to_string(),
                    starts_paragraph: first_in_paragraph,
                });
                first_in_paragraph = false;
                continue;
            }

            for window in char_windows(sentence, limit) {
                segments.push(Segment {
                    text: window,
                    starts_paragraph: first_in_paragraph,
                });
                first_in_paragraph = false;
            }
        }
    }

    segments
}

fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    for m in sentence_boundary().find_iter(text) {
        // Keep the terminating punctuation, drop the trailing whitespace.
        let end = m.start() + 1;
        let piece = text[start..end].trim();
        if !piece.is_empty() {
            out.push(piece);
        }
        start = m.end();
    }
    let rest = text[start..].trim();
    if !rest.is_empty() {
        out.push(rest);
    }
    out
}

fn char_windows(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(size.max(1))
        .map(|w| w.iter().collect::<String>().trim().to_string())
        .filter(|w| !w.is_empty())
        .collect()
}

fn overlap_tail(buf: &str, overlap: usize) -> String {
    if overlap == 0 {
        return String::new();
    }
    let chars: Vec<char> = buf.chars().collect();
    let start = chars.len().saturating_sub(overlap);
    chars[start..].iter().collect::<String>().trim_start().to_string()
}

fn push_chunk(chunks: &mut Vec<String>, buf: &mut String) {
    let chunk = std::mem::take(buf).trim().to_string();
    if !chunk.is_empty() {
        chunks.push(chunk);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_body_is_one_chunk() {
        let chunks = split("  a short note  ", 1000, 100);
        assert_eq!(chunks, vec!["a short note".to_string()]);
    }

    #[test]
    fn empty_body_yields_no_chunks() {
        assert!(split("", 1000, 100).is_empty());
        assert!(split("   \n\n  ", 1000, 100).is_empty());
    }

    #[test]
    fn long_unbroken_body_yields_three_chunks() {
        // 2500 characters with the default 1000/100 policy.
        let body: String = std::iter::repeat("0123456789").take(250).collect();
        let chunks = split(&body, 1000, 100);
        assert_eq!(chunks.len(), 3);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 1001, "chunk too large: {}", chunk.len());
        }
    }

    #[test]
    fn consecutive_chunks_share_overlap() {
        let body: String = std::iter::repeat("abcdefghij").take(300).collect();
        let chunks = split(&body, 1000, 100);
        assert!(chunks.len() >= 2);

        for pair in chunks.windows(2) {
            let prev: Vec<char> = pair[0].chars().collect();
            let tail: String = prev[prev.len() - 100..].iter().collect();
            assert!(
                pair[1].starts_with(&tail),
                "overlap not carried into the next chunk"
            );
        }
    }

    #[test]
    fn prefers_paragraph_boundaries() {
        let para = "word ".repeat(60).trim().to_string(); // ~300 chars
        let body = format!("{para}\n\n{para}\n\n{para}");
        let chunks = split(&body, 400, 50);

        // Every chunk should start at a word, not mid-word.
        for chunk in &chunks {
            assert!(chunk.starts_with("word"));
        }
        assert!(chunks.len() >= 2);
    }

    #[test]
    fn sentences_stay_whole_when_they_fit() {
        let body = "First sentence here. Second sentence follows. Third one too. "
            .repeat(10);
        let chunks = split(&body, 120, 20);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 121);
        }
    }
}
