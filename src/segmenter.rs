//! Turns a biography into speakable text.
//!
//! Segments are coarse: a lead (title, intro and first paragraph) so audio can
//! start quickly, then everything else. Chunks are the per-engine pieces a
//! segment is cut into.

use crate::document::BiographyDocument;

/// Chunk bound for the local engine. Larger utterances get truncated by some engines.
pub const LOCAL_CHUNK_LIMIT: usize = 220;

/// Chunk bound for the remote engine. Keeps the request count (and cost) low.
pub const REMOTE_CHUNK_LIMIT: usize = 1200;

/// A punctuation break must lie past this fraction of the window to be used.
const PUNCTUATION_THRESHOLD_PERCENT: usize = 45;

const SENTENCE_BREAKS: &[&str] = &[". ", "! ", "? ", "; ", ": "];

/// Build the playback segments for a document.
///
/// Segment 0 joins title, intro and the first paragraph with `". "`; segment 1
/// joins the remaining paragraphs with a space. Empty segments are dropped.
pub fn build_speech_segments(document: &BiographyDocument) -> Vec<String> {
    let paragraphs: Vec<&str> = document.paragraphs().collect();

    let lead = [
        document.title.trim(),
        document.intro.trim(),
        paragraphs.first().copied().unwrap_or_default(),
    ]
    .into_iter()
    .filter(|part| !part.is_empty())
    .collect::<Vec<_>>()
    .join(". ");

    let remainder = paragraphs.get(1..).unwrap_or_default().join(" ");

    [lead, remainder.trim().to_string()]
        .into_iter()
        .filter(|segment| !segment.is_empty())
        .collect()
}

/// Collapse every whitespace run to a single space and trim the ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split text into chunks of at most `max_len` characters.
///
/// Within each window the last sentence or clause break (`. `, `! `, `? `, `; `,
/// `: `) is preferred when it lies past 45% of the window, then the last space,
/// then a hard split at `max_len`.
pub fn split_into_chunks(text: &str, max_len: usize) -> Vec<String> {
    let normalized = normalize_whitespace(text);
    if normalized.is_empty() {
        return Vec::new();
    }

    let max_len = max_len.max(1);
    let threshold = max_len * PUNCTUATION_THRESHOLD_PERCENT / 100;
    let mut chunks = Vec::new();
    let mut remaining = normalized.as_str();

    while remaining.chars().count() > max_len {
        let window_end = byte_offset(remaining, max_len);
        let window = &remaining[..window_end];

        let punctuation = SENTENCE_BREAKS
            .iter()
            .filter_map(|brk| window.rfind(brk))
            .max();
        let space = window.rfind(' ');

        let split = match (punctuation, space) {
            (Some(p), _) if window[..p].chars().count() > threshold => p + 1,
            (_, Some(s)) if s > 0 => s,
            _ => window_end,
        };

        chunks.push(remaining[..split].trim().to_string());
        remaining = remaining[split..].trim();
    }

    if !remaining.is_empty() {
        chunks.push(remaining.to_string());
    }

    chunks
}

/// Chunk every segment and flatten, keeping order.
pub fn chunk_segments<S: AsRef<str>>(segments: &[S], max_len: usize) -> Vec<String> {
    segments
        .iter()
        .flat_map(|segment| split_into_chunks(segment.as_ref(), max_len))
        .collect()
}

/// Byte offset of the `n`th character, or the string length.
fn byte_offset(text: &str, n: usize) -> usize {
    text.char_indices()
        .nth(n)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len())
}
