//! Text chunking for the re-chunking retrieval strategy.

/// Safety cap so a pathological size/overlap pair cannot spin forever.
const MAX_CHUNKS_PER_TEXT: usize = 10_000;

/// Split text into overlapping character windows, preferring to cut at a
/// sentence boundary near the end of each window.
pub fn split_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let chars: Vec<char> = text.chars().collect();
    let total_chars = chars.len();

    let mut chunks = Vec::new();
    if total_chars == 0 {
        return chunks;
    }

    let step = chunk_size.saturating_sub(chunk_overlap).max(1);
    let mut start = 0;

    while start < total_chars && chunks.len() < MAX_CHUNKS_PER_TEXT {
        let end = (start + chunk_size).min(total_chars);
        let window: String = chars[start..end].iter().collect();

        let piece = if end < total_chars {
            cut_at_sentence_boundary(&window)
        } else {
            window
        };

        let trimmed = piece.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }

        start += step;
    }

    chunks
}

/// Split a batch of documents, keeping chunk order stable across documents.
pub fn split_documents(texts: &[String], chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    texts
        .iter()
        .flat_map(|text| split_text(text, chunk_size, chunk_overlap))
        .collect()
}

fn cut_at_sentence_boundary(window: &str) -> String {
    let endings = [". ", "! ", "? ", ".\n", "!\n", "?\n"];

    // Only look in the last fifth of the window; cutting earlier would lose
    // too much content per chunk.
    let search_start = (window.len() * 80) / 100;
    if !window.is_char_boundary(search_start) {
        return window.to_string();
    }
    let tail = &window[search_start..];

    for ending in endings.iter() {
        if let Some(pos) = tail.rfind(ending) {
            let cut = search_start + pos + ending.len();
            return window[..cut].to_string();
        }
    }

    window.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(split_text("", 100, 20).is_empty());
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = split_text("Just one sentence.", 100, 20);
        assert_eq!(chunks, vec!["Just one sentence."]);
    }

    #[test]
    fn long_text_produces_overlapping_windows() {
        let text = "This is a test sentence. ".repeat(40);
        let chunks = split_text(&text, 100, 20);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 100);
        }
        // Overlap: consecutive chunks share content.
        assert!(text.contains(chunks[0].as_str()));
    }

    #[test]
    fn overlap_larger_than_size_still_advances() {
        let text = "abcdef ".repeat(50);
        let chunks = split_text(&text, 10, 50);
        assert!(chunks.len() > 1);
        assert!(chunks.len() < MAX_CHUNKS_PER_TEXT);
    }

    #[test]
    fn batch_split_preserves_document_order() {
        let docs = vec!["First doc.".to_string(), "Second doc.".to_string()];
        let chunks = split_documents(&docs, 100, 0);
        assert_eq!(chunks, vec!["First doc.", "Second doc."]);
    }
}
