//! Provider-agnostic prompt rendering.
//!
//! The instruction block demands a single JSON object and enumerates the
//! contract keys with their word budgets; retrieval hits are serialized as
//! delimiter-separated snippet blocks. No provider-specific formatting leaks
//! in here.

use crate::retrieval::RetrievalHit;

/// Word budgets enforced on generated output.
#[derive(Debug, Clone, Copy)]
pub struct BrevityLimits {
    /// Maximum words in `one_line`.
    pub one_line_words: usize,
    /// Maximum words per bullet.
    pub bullet_words: usize,
}

impl Default for BrevityLimits {
    fn default() -> Self {
        Self {
            one_line_words: 12,
            bullet_words: 20,
        }
    }
}

/// Render the instruction block for a set of retrieval hits and an optional
/// question.
pub fn build_prompt(
    hits: &[RetrievalHit],
    question: Option<&str>,
    limits: BrevityLimits,
) -> String {
    let snippet_blocks: Vec<String> = hits
        .iter()
        .map(|hit| {
            let snippet = hit.chunk.text.trim().replace('\n', " ");
            format!(
                "NOTE_ID={} DATE={} SCORE={:.4}\n{snippet}\n",
                hit.chunk.note_id, hit.chunk.note_date, hit.score
            )
        })
        .collect();
    let snippets_block = snippet_blocks.join("\n---\n");

    let question_line = question
        .map(|q| format!("Question: {q}\n\n"))
        .unwrap_or_default();

    format!(
        "Return ONLY one JSON object. No prose, no code fences.\n\
         Keys: one_line (<={one_line} words), bullets (2-4 short items, each <={bullet} words), \
         sources (array of {{note_id:int, score:float}}).\n\n\
         {question_line}SNIPPETS:\n{snippets_block}\n\nProduce the JSON now.",
        one_line = limits.one_line_words,
        bullet = limits.bullet_words,
    )
}
