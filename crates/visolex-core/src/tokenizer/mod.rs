//! # Subword Tokenizer Capability
//!
//! The detector and normalizer only need four things from a tokenizer:
//! encoding, id/token conversion, detokenization, and knowing which tokens
//! are reserved. [`SubwordTokenizer`] captures exactly that.

pub mod hf;
pub mod piece;

pub use hf::HfSubwordTokenizer;
pub use piece::PieceTokenizer;

use crate::error::Result;

/// Marks a token that starts a new whitespace-delimited word.
pub const WORD_BOUNDARY: char = '\u{2581}';

pub const MASK_TOKEN: &str = "<mask>";
pub const BOS_TOKEN: &str = "<s>";
pub const EOS_TOKEN: &str = "</s>";
pub const PAD_TOKEN: &str = "<pad>";
pub const UNK_TOKEN: &str = "<unk>";
/// Placeholder the normalizer predicts for a deleted token.
pub const NULL_STR: &str = "<space>";

/// Tokens that never contribute characters to the output text.
pub const SPECIAL_TOKENS: &[&str] =
    &[NULL_STR, MASK_TOKEN, BOS_TOKEN, EOS_TOKEN, UNK_TOKEN, PAD_TOKEN];

/// Tokenizer collaborator used for inference and span alignment.
pub trait SubwordTokenizer: Send + Sync {
    /// Encodes a sentence into token ids, including framing special tokens.
    fn encode(&self, text: &str) -> Result<Vec<u32>>;

    /// Maps ids back to token strings. Unknown ids become [`UNK_TOKEN`].
    fn convert_ids_to_tokens(&self, ids: &[u32]) -> Vec<String>;

    /// Renders a token list as text, the way the vocabulary's decoder does.
    fn convert_tokens_to_string(&self, tokens: &[String]) -> Result<String>;

    /// Looks up the id of a token string.
    fn token_to_id(&self, token: &str) -> Option<u32>;

    /// Whether `token` belongs to the reserved boundary/padding/mask set.
    fn is_special(&self, token: &str) -> bool {
        SPECIAL_TOKENS.contains(&token)
    }
}

/// SentencePiece-style detokenization: join, turn boundary markers into spaces, trim.
#[must_use]
pub fn sentencepiece_detokenize(tokens: &[String]) -> String {
    tokens
        .concat()
        .replace(WORD_BOUNDARY, " ")
        .trim()
        .to_string()
}

/// Removes special tokens, returning the kept tokens and their original positions.
pub fn strip_special_tokens<T>(tokenizer: &T, tokens: &[String]) -> (Vec<String>, Vec<usize>)
where
    T: SubwordTokenizer + ?Sized,
{
    tokens
        .iter()
        .enumerate()
        .filter(|(_, token)| !tokenizer.is_special(token))
        .map(|(i, token)| (token.clone(), i))
        .unzip()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn detokenize_joins_words() {
        let toks = tokens(&["▁sao", "▁lỗi", "▁j"]);
        assert_eq!(sentencepiece_detokenize(&toks), "sao lỗi j");
        assert_eq!(sentencepiece_detokenize(&tokens(&["▁j"])), "j");
        assert_eq!(sentencepiece_detokenize(&tokens(&["▁"])), "");
    }

    #[test]
    fn detokenize_keeps_subword_continuations() {
        let toks = tokens(&["▁ch", "ệu", "▁dzô"]);
        assert_eq!(sentencepiece_detokenize(&toks), "chệu dzô");
    }

    #[test]
    fn strip_special_tracks_indices() {
        let tokenizer = PieceTokenizer::new();
        let toks = tokens(&["<s>", "▁sao", "<pad>", "▁j", "</s>"]);
        let (kept, indices) = strip_special_tokens(&tokenizer, &toks);
        assert_eq!(kept, tokens(&["▁sao", "▁j"]));
        assert_eq!(indices, vec![1, 3]);
    }

    #[test]
    fn strip_special_all_special() {
        let tokenizer = PieceTokenizer::new();
        let toks = tokens(&["<s>", "</s>"]);
        let (kept, indices) = strip_special_tokens(&tokenizer, &toks);
        assert!(kept.is_empty());
        assert!(indices.is_empty());
    }
}
