//! Sentence chunking for streaming synthesis
//!
//! Model deltas arrive a few characters at a time. The chunker buffers them
//! and releases whole sentences, or clauses once the buffer is long enough,
//! so every increment sent to synthesis ends on a word boundary.

/// Minimum buffered length before splitting on clause punctuation
const CLAUSE_MIN_LEN: usize = 20;

/// Accumulates text deltas into speakable increments
#[derive(Debug, Default)]
pub struct SentenceChunker {
    buffer: String,
}

impl SentenceChunker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a delta and return every increment that is now complete
    pub fn push(&mut self, delta: &str) -> Vec<String> {
        self.buffer.push_str(delta);

        let mut ready = Vec::new();
        while let Some(pos) = find_clause_boundary(&self.buffer) {
            let rest = self.buffer.split_off(pos + 1);
            let chunk = std::mem::replace(&mut self.buffer, rest);
            let chunk = chunk.trim();
            if !chunk.is_empty() {
                ready.push(chunk.to_string());
            }
        }
        ready
    }

    /// Release whatever is left at the end of the reply
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        let rest = rest.trim();
        (!rest.is_empty()).then(|| rest.to_string())
    }
}

/// Byte index of the first sentence end followed by whitespace
///
/// A trailing `.` with nothing after it is not a boundary yet; the next delta
/// may turn it into a decimal point or an abbreviation.
fn find_sentence_boundary(text: &str) -> Option<usize> {
    for (i, c) in text.char_indices() {
        if c == '\n' {
            return Some(i);
        }
        if matches!(c, '.' | '!' | '?') {
            let rest = &text[i + c.len_utf8()..];
            if rest.starts_with(' ') || rest.starts_with('\n') {
                return Some(i);
            }
        }
    }
    None
}

/// Byte index of the last byte of a sentence or clause boundary
///
/// Callers split with `text[..=pos]`, so the index always lands on the final
/// byte of the (possibly multi-byte) punctuation character.
fn find_clause_boundary(text: &str) -> Option<usize> {
    if let Some(pos) = find_sentence_boundary(text) {
        return Some(pos);
    }

    if text.chars().count() < CLAUSE_MIN_LEN {
        return None;
    }

    // Last clause mark, so the chunk is as long as possible
    let mut last_clause = None;
    for (i, c) in text.char_indices() {
        if matches!(c, ',' | ';' | ':' | '\u{2014}' | '\u{2013}') {
            let rest = &text[i + c.len_utf8()..];
            if rest.starts_with(' ') {
                last_clause = Some(i + c.len_utf8() - 1);
            }
        }
    }
    last_clause
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn releases_complete_sentences() {
        let mut chunker = SentenceChunker::new();
        assert!(chunker.push("Good evening").is_empty());
        assert!(chunker.push(", sir.").is_empty());
        assert_eq!(chunker.push(" It is"), vec!["Good evening, sir."]);
        assert!(chunker.push(" raining").is_empty());
        assert_eq!(chunker.finish().as_deref(), Some("It is raining"));
        assert_eq!(chunker.finish(), None);
    }

    #[test]
    fn keeps_decimals_together() {
        let mut chunker = SentenceChunker::new();
        assert!(chunker.push("It is 3.").is_empty());
        assert!(chunker.push("5 degrees").is_empty());
        assert_eq!(chunker.finish().as_deref(), Some("It is 3.5 degrees"));
    }

    #[test]
    fn splits_several_sentences_in_one_delta() {
        let mut chunker = SentenceChunker::new();
        let chunks = chunker.push("One. Two! Three? Four");
        assert_eq!(chunks, vec!["One.", "Two!", "Three?"]);
        assert_eq!(chunker.finish().as_deref(), Some("Four"));
    }

    #[test]
    fn newline_is_a_boundary() {
        let mut chunker = SentenceChunker::new();
        assert_eq!(chunker.push("First line\nsecond"), vec!["First line"]);
    }

    #[test]
    fn clause_split_needs_enough_text() {
        let mut chunker = SentenceChunker::new();
        assert!(chunker.push("Yes, sir").is_empty());

        let mut chunker = SentenceChunker::new();
        let chunks = chunker.push("The forecast for tomorrow, however, looks");
        assert_eq!(chunks, vec!["The forecast for tomorrow, however,"]);
        assert_eq!(chunker.finish().as_deref(), Some("looks"));
    }

    #[test]
    fn multibyte_dash_splits_on_char_boundary() {
        let mut chunker = SentenceChunker::new();
        let chunks = chunker.push("A rather long opening remark \u{2014} then more");
        assert_eq!(chunks, vec!["A rather long opening remark \u{2014}"]);
        assert_eq!(chunker.finish().as_deref(), Some("then more"));
    }

    #[test]
    fn whitespace_only_is_dropped() {
        let mut chunker = SentenceChunker::new();
        assert!(chunker.push("\n\n").is_empty());
        assert_eq!(chunker.finish(), None);
    }
}
