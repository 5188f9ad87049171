//! Prose sentence-packing fallback: greedy sentence packing up to the
//! token budget with a small overlap between consecutive chunks.

use super::ChunkBudget;

/// Split `text` into sentences on `.`/`!`/`?` followed by whitespace (or
/// end of string), keeping the terminator attached to its sentence. This
/// is deliberately simple — a full sentence boundary detector is out of
/// scope; it needs only to avoid splitting mid-word.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        current.push(ch);
        if matches!(ch, '.' | '!' | '?') {
            let next_is_boundary = chars.peek().is_none_or(|c| c.is_whitespace());
            if next_is_boundary {
                sentences.push(current.trim().to_string());
                current.clear();
            }
        }
    }
    if !current.trim().is_empty() {
        sentences.push(current.trim().to_string());
    }
    sentences.into_iter().filter(|s| !s.is_empty()).collect()
}

/// Greedily pack sentences into chunks no larger than `budget.max_chunk_tokens`,
/// carrying `budget.overlap_sentences` trailing sentences of a chunk
/// forward into the start of the next one.
#[must_use]
pub fn split(text: &str, budget: ChunkBudget) -> Vec<String> {
    let sentences = split_sentences(text);
    if sentences.is_empty() {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_tokens = 0usize;

    let mut i = 0;
    while i < sentences.len() {
        let sentence = &sentences[i];
        let sentence_tokens = super::estimate_tokens(sentence);

        if current_tokens + sentence_tokens > budget.max_chunk_tokens && !current.is_empty() {
            chunks.push(current.join(" "));
            let overlap_start = current.len().saturating_sub(budget.overlap_sentences);
            current = current[overlap_start..].to_vec();
            current_tokens = current.iter().map(|s| super::estimate_tokens(s)).sum();
        }

        current.push(sentence.clone());
        current_tokens += sentence_tokens;
        i += 1;
    }
    if !current.is_empty() {
        chunks.push(current.join(" "));
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_sentence_terminators() {
        let sentences = split_sentences("One. Two! Three?");
        assert_eq!(sentences, vec!["One.", "Two!", "Three?"]);
    }

    #[test]
    fn respects_max_chunk_tokens() {
        let budget = ChunkBudget {
            min_chunk_tokens: 1,
            max_chunk_tokens: 10,
            overlap_sentences: 1,
        };
        let text = "This is sentence number one. This is sentence number two. This is sentence number three.";
        let chunks = split(text, budget);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            // allow slight overshoot from the last sentence added to an
            // otherwise-empty chunk, but never by more than one sentence.
            assert!(super::super::estimate_tokens(chunk) <= 40);
        }
    }

    #[test]
    fn overlap_carries_last_sentence_forward() {
        let budget = ChunkBudget {
            min_chunk_tokens: 1,
            max_chunk_tokens: 8,
            overlap_sentences: 1,
        };
        let text = "Alpha sentence here. Beta sentence here. Gamma sentence here.";
        let chunks = split(text, budget);
        assert!(chunks.len() >= 2);
        assert!(chunks[1].starts_with("Alpha") || chunks[1].contains("Beta"));
    }
}
