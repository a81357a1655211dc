//! Paragraph-boundary text chunker.
//!
//! Splits document text into [`ContentChunk`]s that respect a configurable
//! character budget. Splitting occurs only on paragraph boundaries (`\n\n`):
//! a single paragraph longer than the budget becomes one oversized chunk
//! rather than being cut mid-paragraph.
//!
//! Each chunk receives a deterministic content ID derived from its document
//! ID and index, plus a SHA-256 hash of its text for staleness detection.

use sha2::{Digest, Sha256};

use crate::models::{ContentChunk, Metadata};

/// Split text into chunks on paragraph boundaries, respecting `max_chars`.
///
/// Paragraphs are greedily accumulated; the buffer is flushed when
/// appending the next paragraph would exceed the budget and the buffer is
/// non-empty. Chunk indices are contiguous starting at 0, and every chunk
/// inherits `metadata` with its own `chunk_index` added.
///
/// Joining the returned chunk texts with blank lines reproduces the
/// document's paragraph sequence (modulo per-chunk trimming).
pub fn chunk_document(
    doc_id: &str,
    source_path: &str,
    text: &str,
    metadata: &Metadata,
    max_chars: usize,
) -> Vec<ContentChunk> {
    let mut chunks = Vec::new();
    let mut current_buf = String::new();
    let mut chunk_index: i64 = 0;

    for para in text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        let would_be = if current_buf.is_empty() {
            trimmed.len()
        } else {
            current_buf.len() + 2 + trimmed.len() // +2 for \n\n separator
        };

        if would_be > max_chars && !current_buf.is_empty() {
            chunks.push(make_chunk(
                doc_id,
                source_path,
                chunk_index,
                &current_buf,
                metadata,
            ));
            chunk_index += 1;
            current_buf.clear();
        }

        if !current_buf.is_empty() {
            current_buf.push_str("\n\n");
        }
        current_buf.push_str(trimmed);
    }

    // Flush remaining
    if !current_buf.is_empty() {
        chunks.push(make_chunk(
            doc_id,
            source_path,
            chunk_index,
            &current_buf,
            metadata,
        ));
    }

    chunks
}

fn make_chunk(
    doc_id: &str,
    source_path: &str,
    index: i64,
    text: &str,
    metadata: &Metadata,
) -> ContentChunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    let mut meta = metadata.clone();
    meta.insert("chunk_index".to_string(), serde_json::json!(index));

    ContentChunk {
        content_id: format!("{}_{}", doc_id, index),
        source_path: source_path.to_string(),
        text: text.to_string(),
        metadata: meta,
        chunk_index: index,
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str, max_chars: usize) -> Vec<ContentChunk> {
        chunk_document("doc1", "docs/doc1.md", text, &Metadata::new(), max_chars)
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk("Hello, world!", 1000);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!(chunks[0].content_id, "doc1_0");
    }

    #[test]
    fn test_empty_text_yields_no_chunks() {
        assert!(chunk("", 1000).is_empty());
        assert!(chunk("\n\n  \n\n", 1000).is_empty());
    }

    #[test]
    fn test_multiple_paragraphs_under_limit() {
        let text = "First paragraph.\n\nSecond paragraph.\n\nThird paragraph.";
        let chunks = chunk(text, 1000);
        assert_eq!(chunks.len(), 1);
        assert_eq!(
            chunks[0].text,
            "First paragraph.\n\nSecond paragraph.\n\nThird paragraph."
        );
    }

    #[test]
    fn test_reconstruction_preserves_paragraph_sequence() {
        let text = "Alpha one.\n\nBeta two two.\n\nGamma three three three.\n\nDelta.";
        let chunks = chunk(text, 25);
        assert!(chunks.len() > 1);
        let rejoined = chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        assert_eq!(rejoined, text);
        for c in &chunks {
            assert!(!c.text.trim().is_empty());
        }
    }

    #[test]
    fn test_oversized_paragraph_never_split() {
        let long_para = "x".repeat(3000);
        let text = format!("Short intro.\n\n{}\n\nShort outro.", long_para);
        let chunks = chunk(&text, 1000);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1].text, long_para);
    }

    #[test]
    fn test_indices_contiguous_and_ids_deterministic() {
        let text = (0..30)
            .map(|i| format!("Paragraph number {} with some padding text.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let first = chunk(&text, 80);
        let second = chunk(&text, 80);
        assert_eq!(first.len(), second.len());
        for (i, (a, b)) in first.iter().zip(second.iter()).enumerate() {
            assert_eq!(a.chunk_index, i as i64);
            assert_eq!(a.content_id, format!("doc1_{}", i));
            assert_eq!(a.content_id, b.content_id);
            assert_eq!(a.hash, b.hash);
        }
    }

    #[test]
    fn test_metadata_inherited_with_chunk_index() {
        let mut meta = Metadata::new();
        meta.insert("type".to_string(), serde_json::json!("section"));
        let chunks = chunk_document("doc1", "docs/doc1.md", "One.\n\nTwo.", &meta, 4);
        assert_eq!(chunks.len(), 2);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.metadata["type"], serde_json::json!("section"));
            assert_eq!(c.metadata["chunk_index"], serde_json::json!(i));
        }
    }

    #[test]
    fn test_non_final_chunks_fill_budget() {
        // Every flush happens only because the next paragraph would not fit,
        // so adding that paragraph to any non-final chunk must exceed budget.
        let text = (0..10)
            .map(|i| format!("Para {} abcdefghij.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let max = 50;
        let chunks = chunk(&text, max);
        for window in chunks.windows(2) {
            let next_first_para = window[1].text.split("\n\n").next().unwrap();
            assert!(window[0].text.len() + 2 + next_first_para.len() > max);
        }
    }
}
