use std::num::NonZeroUsize;

use serde::Serialize;

/// A sentence-aligned slice of the source text with a stable ordinal index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    index: usize,
    text: String,
    length: usize,
}

impl Chunk {
    /// Build a chunk; `length` is derived from the character count of `text`.
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        let text = text.into();
        let length = text.chars().count();
        Self {
            index,
            text,
            length,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Length in characters (not bytes).
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

/// A chunk that exceeds the size limit because it holds a single sentence
/// longer than the limit. The sentence is kept intact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkingAnomaly {
    pub chunk_index: usize,
    pub length: usize,
    pub max_size: usize,
}

/// Ordered chunks plus the oversized-sentence anomalies found while building them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkPlan {
    pub chunks: Vec<Chunk>,
    pub anomalies: Vec<ChunkingAnomaly>,
}

impl ChunkPlan {
    fn close(&mut self, text: String, length: usize, max_size: usize) {
        let index = self.chunks.len();
        if length > max_size {
            log::warn!(
                "chunk {index} holds a single sentence of {length} chars (limit {max_size}); keeping it intact"
            );
            self.anomalies.push(ChunkingAnomaly {
                chunk_index: index,
                length,
                max_size,
            });
        }
        self.chunks.push(Chunk {
            index,
            text,
            length,
        });
    }
}

/// Split `text` into ordered chunks of at most `max_size` characters,
/// breaking only at sentence boundaries.
///
/// Whitespace is normalized first, so re-joining the chunk texts with single
/// spaces reproduces the normalized input exactly. A sentence longer than
/// `max_size` becomes its own chunk and is reported in
/// [`ChunkPlan::anomalies`].
pub fn chunk_text(text: &str, max_size: NonZeroUsize) -> ChunkPlan {
    let max_size = max_size.get();
    let normalized = normalize_whitespace(text);

    let mut plan = ChunkPlan::default();
    let mut buffer = String::new();
    let mut buffer_len = 0usize;

    for sentence in split_sentences(&normalized) {
        let sentence_len = sentence.chars().count();

        if buffer_len > 0 && buffer_len + 1 + sentence_len > max_size {
            plan.close(std::mem::take(&mut buffer), buffer_len, max_size);
            buffer_len = 0;
        }

        if buffer_len > 0 {
            buffer.push(' ');
            buffer_len += 1;
        }
        buffer.push_str(sentence);
        buffer_len += sentence_len;
    }

    if buffer_len > 0 {
        plan.close(buffer, buffer_len, max_size);
    }

    log::debug!(
        "chunked {} chars into {} chunks (limit {max_size})",
        normalized.chars().count(),
        plan.chunks.len()
    );
    plan
}

/// Collapse every whitespace run to a single space and trim both ends.
pub fn normalize_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for word in text.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}

/// Split normalized text into sentences.
///
/// A boundary is sentence-ending punctuation, optionally followed by closing
/// quotes or brackets, followed by whitespace. The punctuation stays with the
/// sentence it ends.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0usize;
    let mut chars = text.char_indices().peekable();

    while let Some((_, ch)) = chars.next() {
        if !is_sentence_end(ch) {
            continue;
        }

        let mut end = None;
        while let Some(&(idx, next)) = chars.peek() {
            if is_closing_mark(next) {
                chars.next();
                continue;
            }
            if next.is_whitespace() {
                end = Some(idx);
            }
            break;
        }

        if let Some(end) = end {
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = end;
        }
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

fn is_sentence_end(ch: char) -> bool {
    matches!(ch, '.' | '!' | '?' | '…')
}

fn is_closing_mark(ch: char) -> bool {
    matches!(ch, '"' | '\'' | ')' | ']' | '\u{201d}' | '\u{2019}' | '»')
}

#[cfg(test)]
mod tests {
    use super::{chunk_text, normalize_whitespace, split_sentences};
    use std::num::NonZeroUsize;

    fn limit(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    fn rejoin(text: &str, max: usize) -> String {
        chunk_text(text, limit(max))
            .chunks
            .iter()
            .map(|c| c.text().to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn splits_sentences_keeping_punctuation() {
        assert_eq!(
            split_sentences("Hello there. How are you? Fine! Bye"),
            vec!["Hello there.", "How are you?", "Fine!", "Bye"]
        );
    }

    #[test]
    fn closing_quotes_stay_with_their_sentence() {
        assert_eq!(
            split_sentences("He said \"stop.\" Then he left."),
            vec!["He said \"stop.\"", "Then he left."]
        );
    }

    #[test]
    fn ellipsis_and_decimals_inside_a_sentence_do_not_split() {
        assert_eq!(
            split_sentences("Wait...what? Version 2.0 shipped."),
            vec!["Wait...what?", "Version 2.0 shipped."]
        );
    }

    #[test]
    fn three_short_sentences_fit_one_chunk() {
        let plan = chunk_text("One. Two! Three?", limit(100));
        assert_eq!(plan.chunks.len(), 1);
        assert_eq!(plan.chunks[0].text(), "One. Two! Three?");
        assert_eq!(plan.chunks[0].index(), 0);
        assert!(plan.anomalies.is_empty());
    }

    #[test]
    fn five_thousand_chars_split_into_two_chunks() {
        let sentence = format!("{}.", "a".repeat(98));
        let text = vec![sentence.as_str(); 50].join(" ");
        assert_eq!(text.chars().count(), 4999);

        let plan = chunk_text(&text, limit(2500));
        assert_eq!(plan.chunks.len(), 2);
        for chunk in &plan.chunks {
            assert!(chunk.len() <= 2500, "chunk {} too long", chunk.index());
        }
        assert_eq!(rejoin(&text, 2500), text);
    }

    #[test]
    fn empty_and_whitespace_input_yield_no_chunks() {
        assert!(chunk_text("", limit(10)).chunks.is_empty());
        assert!(chunk_text(" \n\t  ", limit(10)).chunks.is_empty());
    }

    #[test]
    fn oversized_sentence_is_kept_whole_and_reported() {
        let long = format!("{}.", "x".repeat(40));
        let text = format!("Short one. {long} Tail.");
        let plan = chunk_text(&text, limit(20));

        let texts: Vec<&str> = plan.chunks.iter().map(|c| c.text()).collect();
        assert_eq!(texts, vec!["Short one.", long.as_str(), "Tail."]);
        assert_eq!(plan.anomalies.len(), 1);
        assert_eq!(plan.anomalies[0].chunk_index, 1);
        assert_eq!(plan.anomalies[0].length, 41);
        assert_eq!(plan.anomalies[0].max_size, 20);
    }

    #[test]
    fn every_chunk_respects_limit_unless_single_sentence() {
        let text = "Alpha beta gamma. Delta epsilon. Zeta eta theta iota kappa lambda mu. \
                    Nu. Xi omicron pi rho. Sigma tau upsilon phi chi psi omega.";
        for max in [5, 12, 20, 33, 60, 500] {
            let plan = chunk_text(text, limit(max));
            for chunk in &plan.chunks {
                if chunk.len() > max {
                    assert!(plan.anomalies.iter().any(|a| a.chunk_index == chunk.index()));
                    assert_eq!(split_sentences(chunk.text()).len(), 1);
                }
            }
            assert_eq!(rejoin(text, max), normalize_whitespace(text));
        }
    }

    #[test]
    fn indices_are_contiguous_and_ordered() {
        let text = "A b. C d. E f. G h. I j.";
        let plan = chunk_text(text, limit(5));
        let indices: Vec<usize> = plan.chunks.iter().map(|c| c.index()).collect();
        assert_eq!(indices, (0..plan.chunks.len()).collect::<Vec<_>>());
        assert_eq!(plan.chunks.len(), 5);
    }

    #[test]
    fn rejoin_normalizes_whitespace_only() {
        let text = "  First   line.\n\nSecond\tline!   Third?  ";
        assert_eq!(rejoin(text, 12), "First line. Second line! Third?");
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        let first = "Ước gì bố tớ cũng được như.";
        let chars = first.chars().count();
        assert!(chars < first.len());

        let text = format!("{first} Xin chào.");
        let plan = chunk_text(&text, limit(chars));
        assert_eq!(plan.chunks[0].text(), first);
        assert_eq!(plan.chunks[0].len(), chars);
        assert_eq!(plan.chunks.len(), 2);
        assert!(plan.anomalies.is_empty());
    }
}
