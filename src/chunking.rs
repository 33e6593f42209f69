//! Word-window chunking of note text.
//!
//! Clinical notes are split on whitespace and windowed into bounded-length,
//! overlapping segments suitable for embedding. The window is deliberately
//! simple: retrieval quality for short clinical notes is dominated by the
//! embedding model, not by boundary placement.

/// Split `text` into overlapping chunks of at most `max_words` words.
///
/// Texts of `max_words` words or fewer come back as a single chunk containing
/// the original text unchanged. Longer texts are windowed with the window
/// advancing by `max_words - overlap` words per step; `overlap` is clamped to
/// `max_words - 1` so the window always advances.
///
/// Pure and deterministic for identical inputs.
pub fn chunk_note_text(text: &str, max_words: usize, overlap: usize) -> Vec<String> {
    let max_words = max_words.max(1);
    let overlap = overlap.min(max_words - 1);

    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        return vec![text.to_string()];
    }

    let step = max_words - overlap;
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < words.len() {
        let end = (start + max_words).min(words.len());
        chunks.push(words[start..end].join(" "));
        start += step;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(count: usize) -> String {
        (0..count)
            .map(|index| format!("w{index}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn short_text_returned_unchanged() {
        let text = "fever and cough for three days";
        assert_eq!(chunk_note_text(text, 200, 50), vec![text.to_string()]);
    }

    #[test]
    fn six_hundred_words_yield_four_windows() {
        let text = words(600);
        let chunks = chunk_note_text(&text, 200, 50);
        assert_eq!(chunks.len(), 4);

        // Window starts at 0, 150, 300, 450.
        assert!(chunks[0].starts_with("w0 "));
        assert!(chunks[1].starts_with("w150 "));
        assert!(chunks[2].starts_with("w300 "));
        assert!(chunks[3].starts_with("w450 "));

        for chunk in &chunks[..3] {
            assert_eq!(chunk.split_whitespace().count(), 200);
        }
        // The trailing window is shorter than the budget.
        assert_eq!(chunks[3].split_whitespace().count(), 150);
    }

    #[test]
    fn overlap_clamped_below_window() {
        // overlap == max_words would never advance; the clamp forces progress.
        let text = words(10);
        let chunks = chunk_note_text(&text, 4, 4);
        assert!(chunks.len() >= 3);
        let reassembled: Vec<&str> = chunks
            .iter()
            .flat_map(|chunk| chunk.split_whitespace())
            .collect();
        assert!(reassembled.contains(&"w9"));
    }

    #[test]
    fn deterministic_for_identical_input() {
        let text = words(321);
        assert_eq!(
            chunk_note_text(&text, 100, 25),
            chunk_note_text(&text, 100, 25)
        );
    }
}
