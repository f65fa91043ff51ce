//! Hugging Face `tokenizers` backend.

use std::path::Path;

use tokenizers::{Decoder, Tokenizer as HfTokenizer};
use tracing::debug;

use super::{SubwordTokenizer, UNK_TOKEN, sentencepiece_detokenize};
use crate::error::{Result, VisolexError};

/// Wraps a pretrained `tokenizer.json` (e.g. ViSoBERT, PhoBERT, BARTpho).
pub struct HfSubwordTokenizer {
    inner: HfTokenizer,
}

impl HfSubwordTokenizer {
    /// Loads a tokenizer from a `tokenizer.json` file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(VisolexError::Tokenizer(format!(
                "tokenizer not found at {}",
                path.display()
            )));
        }
        let inner =
            HfTokenizer::from_file(path).map_err(|e| VisolexError::Tokenizer(e.to_string()))?;
        debug!(path = %path.display(), "loaded tokenizer");
        Ok(Self { inner })
    }

    pub fn from_tokenizer(inner: HfTokenizer) -> Self {
        Self { inner }
    }
}

impl SubwordTokenizer for HfSubwordTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .inner
            .encode(text, true)
            .map_err(|e| VisolexError::Tokenizer(format!("tokenize error: {e}")))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn convert_ids_to_tokens(&self, ids: &[u32]) -> Vec<String> {
        ids.iter()
            .map(|&id| {
                self.inner
                    .id_to_token(id)
                    .unwrap_or_else(|| UNK_TOKEN.to_string())
            })
            .collect()
    }

    fn convert_tokens_to_string(&self, tokens: &[String]) -> Result<String> {
        match self.inner.get_decoder() {
            Some(decoder) => decoder
                .decode(tokens.to_vec())
                .map(|text| text.trim().to_string())
                .map_err(|e| VisolexError::Tokenizer(format!("decode error: {e}"))),
            None => Ok(sentencepiece_detokenize(tokens)),
        }
    }

    fn token_to_id(&self, token: &str) -> Option<u32> {
        self.inner.token_to_id(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_tokenizer_file_is_an_error() {
        let err = HfSubwordTokenizer::from_file("/nonexistent/tokenizer.json")
            .err()
            .unwrap();
        assert!(err.to_string().contains("tokenizer not found"));
    }
}
