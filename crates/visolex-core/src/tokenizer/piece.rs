//! Word-level piece tokenizer with a growing vocabulary.
//!
//! Every whitespace-delimited word becomes a single `▁word` piece, framed by
//! `<s>` and `</s>`. Ids are assigned in first-seen order, so two tokenizers
//! fed the same words in the same order agree on every id.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use super::{
    BOS_TOKEN, EOS_TOKEN, MASK_TOKEN, NULL_STR, PAD_TOKEN, SubwordTokenizer, UNK_TOKEN,
    WORD_BOUNDARY, sentencepiece_detokenize,
};
use crate::error::{Result, VisolexError};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Vocab {
    pieces: Vec<String>,
    #[serde(skip)]
    ids: HashMap<String, u32>,
}

impl Vocab {
    fn insert(&mut self, piece: &str) -> u32 {
        if let Some(&id) = self.ids.get(piece) {
            return id;
        }
        let id = self.pieces.len() as u32;
        self.pieces.push(piece.to_string());
        self.ids.insert(piece.to_string(), id);
        id
    }

    fn reindex(&mut self) {
        self.ids = self
            .pieces
            .iter()
            .enumerate()
            .map(|(i, piece)| (piece.clone(), i as u32))
            .collect();
    }
}

/// Whitespace tokenizer whose vocabulary grows as new words are encoded.
#[derive(Debug)]
pub struct PieceTokenizer {
    vocab: RwLock<Vocab>,
}

impl PieceTokenizer {
    /// Creates a tokenizer holding only the special tokens.
    ///
    /// Special ids follow the RoBERTa layout: `<s>`=0, `<pad>`=1, `</s>`=2, `<unk>`=3.
    pub fn new() -> Self {
        let mut vocab = Vocab::default();
        for special in [BOS_TOKEN, PAD_TOKEN, EOS_TOKEN, UNK_TOKEN, MASK_TOKEN, NULL_STR] {
            vocab.insert(special);
        }
        Self {
            vocab: RwLock::new(vocab),
        }
    }

    /// Creates a tokenizer and registers every word of `words` in order.
    pub fn with_words<'a>(words: impl IntoIterator<Item = &'a str>) -> Self {
        let tokenizer = Self::new();
        {
            let mut vocab = tokenizer.vocab.write().unwrap_or_else(PoisonError::into_inner);
            for word in words {
                vocab.insert(&Self::piece(word));
            }
        }
        tokenizer
    }

    /// Restores a vocabulary saved with [`PieceTokenizer::to_json`].
    pub fn from_json(json: &str) -> Result<Self> {
        let mut vocab: Vocab = serde_json::from_str(json)?;
        if vocab.pieces.first().map(String::as_str) != Some(BOS_TOKEN) {
            return Err(VisolexError::Tokenizer(
                "vocabulary does not start with the special tokens".into(),
            ));
        }
        vocab.reindex();
        Ok(Self {
            vocab: RwLock::new(vocab),
        })
    }

    pub fn to_json(&self) -> Result<String> {
        let vocab = self.vocab.read().unwrap_or_else(PoisonError::into_inner);
        Ok(serde_json::to_string(&*vocab)?)
    }

    /// Registers a raw piece (boundary marker included, if any) and returns its id.
    pub fn insert_piece(&self, piece: &str) -> u32 {
        self.vocab
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(piece)
    }

    /// Number of pieces, special tokens included.
    pub fn vocab_size(&self) -> usize {
        self.vocab
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .pieces
            .len()
    }

    fn piece(word: &str) -> String {
        format!("{WORD_BOUNDARY}{word}")
    }
}

impl Default for PieceTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl SubwordTokenizer for PieceTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let mut vocab = self.vocab.write().unwrap_or_else(PoisonError::into_inner);
        let mut ids = vec![vocab.insert(BOS_TOKEN)];
        ids.extend(text.split_whitespace().map(|word| vocab.insert(&Self::piece(word))));
        ids.push(vocab.insert(EOS_TOKEN));
        Ok(ids)
    }

    fn convert_ids_to_tokens(&self, ids: &[u32]) -> Vec<String> {
        let vocab = self.vocab.read().unwrap_or_else(PoisonError::into_inner);
        ids.iter()
            .map(|&id| {
                vocab
                    .pieces
                    .get(id as usize)
                    .cloned()
                    .unwrap_or_else(|| UNK_TOKEN.to_string())
            })
            .collect()
    }

    fn convert_tokens_to_string(&self, tokens: &[String]) -> Result<String> {
        Ok(sentencepiece_detokenize(tokens))
    }

    fn token_to_id(&self, token: &str) -> Option<u32> {
        self.vocab
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .ids
            .get(token)
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_frames_and_assigns_ids() {
        let tokenizer = PieceTokenizer::new();
        let ids = tokenizer.encode("sao lỗi j").unwrap();
        assert_eq!(ids.len(), 5);
        assert_eq!(ids[0], 0);
        assert_eq!(ids[4], 2);

        let tokens = tokenizer.convert_ids_to_tokens(&ids);
        assert_eq!(tokens, vec!["<s>", "▁sao", "▁lỗi", "▁j", "</s>"]);

        // Same word, same id.
        let again = tokenizer.encode("j").unwrap();
        assert_eq!(again[1], ids[3]);
    }

    #[test]
    fn unknown_id_maps_to_unk() {
        let tokenizer = PieceTokenizer::new();
        assert_eq!(tokenizer.convert_ids_to_tokens(&[9999]), vec![UNK_TOKEN]);
    }

    #[test]
    fn vocabulary_json_roundtrip() {
        let tokenizer = PieceTokenizer::with_words(["khó", "chệu"]);
        let json = tokenizer.to_json().unwrap();
        let restored = PieceTokenizer::from_json(&json).unwrap();
        assert_eq!(restored.vocab_size(), tokenizer.vocab_size());
        assert_eq!(restored.token_to_id("▁chệu"), tokenizer.token_to_id("▁chệu"));
    }

    #[test]
    fn inserted_pieces_keep_their_marker() {
        let tokenizer = PieceTokenizer::new();
        let id = tokenizer.insert_piece("ệu");
        assert_eq!(tokenizer.insert_piece("ệu"), id);
        assert_eq!(tokenizer.convert_ids_to_tokens(&[id]), vec!["ệu"]);
    }

    #[test]
    fn specials_are_special() {
        let tokenizer = PieceTokenizer::new();
        assert!(tokenizer.is_special("<s>"));
        assert!(tokenizer.is_special("<space>"));
        assert!(!tokenizer.is_special("▁sao"));
    }
}
