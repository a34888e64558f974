/// Sentinel inserted between the head and tail windows of a middle-truncated
/// document, so the model can tell a truncation occurred rather than reading
/// the tail as a direct continuation of the head.
pub const TRUNCATION_MARKER: &str = "\n/* ... truncated for length ... */\n";

/// Tokenizer wraps the BPE encoding used to estimate how many tokens a
/// string of source costs, so batching (C5) and per-file truncation (C6)
/// agree with what the LLM endpoint will actually charge for.
pub struct Tokenizer {
    bpe: tiktoken_rs::CoreBPE,
}

impl Tokenizer {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            bpe: tiktoken_rs::cl100k_base()?,
        })
    }

    pub fn count(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }

    /// If `text` tokenizes to more than `max_tokens`, returns a
    /// middle-truncated copy that preserves a head and tail window and
    /// inserts [`TRUNCATION_MARKER`] between them. Otherwise returns `text`
    /// unchanged.
    pub fn truncate_middle(&self, text: &str, max_tokens: usize) -> std::borrow::Cow<'_, str> {
        let tokens = self.bpe.encode_ordinary(text);
        if tokens.len() <= max_tokens {
            return std::borrow::Cow::Borrowed(text);
        }

        let marker_tokens = self.bpe.encode_ordinary(TRUNCATION_MARKER).len();
        let budget = max_tokens.saturating_sub(marker_tokens);
        let head_budget = budget / 2;
        let tail_budget = budget - head_budget;

        let head = self.bpe.decode(tokens[..head_budget].to_vec()).unwrap_or_default();
        let tail = self
            .bpe
            .decode(tokens[tokens.len() - tail_budget..].to_vec())
            .unwrap_or_default();

        std::borrow::Cow::Owned(format!("{head}{TRUNCATION_MARKER}{tail}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_returned_unchanged() {
        let tok = Tokenizer::new().unwrap();
        let text = "fn main() {}";
        assert_eq!(tok.truncate_middle(text, 1000), std::borrow::Cow::Borrowed(text));
    }

    #[test]
    fn long_text_is_middle_truncated_with_marker() {
        let tok = Tokenizer::new().unwrap();
        let text = "word ".repeat(2000);
        let truncated = tok.truncate_middle(&text, 50);
        assert!(truncated.contains(TRUNCATION_MARKER));
        assert!(tok.count(&truncated) <= 60); // some slack for marker overhead
    }

    #[test]
    fn token_count_is_nonzero_for_nonempty_text() {
        let tok = Tokenizer::new().unwrap();
        assert!(tok.count("hello world") > 0);
        assert_eq!(tok.count(""), 0);
    }
}
