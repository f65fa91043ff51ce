//! # Span Alignment
//!
//! Reconstructs character offsets of NSW tokens in the original sentence from
//! subword-level model output. Subword vocabularies do not preserve character
//! alignment, so offsets are recovered by walking the tokens left to right
//! with a running cursor:
//!
//! 1. A token carrying the word-boundary marker `▁` (other than the first
//!    token) advances the cursor by one for the space the marker stands for.
//! 2. A flagged token with non-empty rendering becomes a span starting at the
//!    cursor.
//! 3. The cursor jumps to the rendered length of the prefix `tokens[..=i]`,
//!    plus one if the token rendered to nothing.
//!
//! The walk assumes single spaces between words. Sentences with leading,
//! trailing or repeated whitespace are aligned against their
//! [`CollapsedText`] and the spans mapped back onto the original.
//!
//! All offsets count characters, not bytes.

use crate::error::{Result, VisolexError};
use crate::tokenizer::{SubwordTokenizer, WORD_BOUNDARY};
use crate::types::NswSpan;

#[derive(Debug, Default)]
struct Cursor {
    end_index: usize,
    spans: Vec<NswSpan>,
}

/// Converts special-token-free subword tokens and their NSW flags into spans.
///
/// `tokens` and `is_nsw` must run parallel. Spans come out in ascending,
/// non-overlapping order; adjacent spans are not merged here.
pub fn align_spans<T>(tokenizer: &T, tokens: &[String], is_nsw: &[u8]) -> Result<Vec<NswSpan>>
where
    T: SubwordTokenizer + ?Sized,
{
    if tokens.len() != is_nsw.len() {
        return Err(VisolexError::Inference(format!(
            "{} tokens but {} nsw flags",
            tokens.len(),
            is_nsw.len()
        )));
    }

    let cursor = tokens.iter().zip(is_nsw).enumerate().try_fold(
        Cursor::default(),
        |mut cursor, (i, (token, &flag))| -> Result<Cursor> {
            if i > 0 && token.starts_with(WORD_BOUNDARY) {
                cursor.end_index += 1;
            }

            let current_text = tokenizer.convert_tokens_to_string(std::slice::from_ref(token))?;
            let current_len = current_text.chars().count();
            let full_len = tokenizer
                .convert_tokens_to_string(&tokens[..=i])?
                .chars()
                .count();

            if flag == 1 && current_len > 0 {
                let start = cursor.end_index;
                cursor
                    .spans
                    .push(NswSpan::new(i, start, start + current_len, current_text));
            }

            cursor.end_index = if current_len > 0 {
                full_len
            } else {
                full_len + 1
            };
            Ok(cursor)
        },
    )?;

    Ok(cursor.spans)
}

/// A sentence with surrounding whitespace trimmed and inner runs collapsed to
/// one space, remembering where each kept character came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollapsedText {
    text: String,
    origins: Vec<usize>,
}

impl CollapsedText {
    #[must_use]
    pub fn new(original: &str) -> Self {
        let mut text = String::with_capacity(original.len());
        let mut origins = Vec::new();
        let mut pending_space = None;
        for (i, c) in original.chars().enumerate() {
            if c.is_whitespace() {
                if !origins.is_empty() && pending_space.is_none() {
                    pending_space = Some(i);
                }
                continue;
            }
            if let Some(space) = pending_space.take() {
                text.push(' ');
                origins.push(space);
            }
            text.push(c);
            origins.push(i);
        }
        Self { text, origins }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Moves spans aligned against the collapsed text onto the original.
    ///
    /// Spans reaching past the collapsed text are returned unchanged and left
    /// for [`verify_spans`] to reject.
    #[must_use]
    pub fn restore_spans(&self, spans: Vec<NswSpan>) -> Vec<NswSpan> {
        spans
            .into_iter()
            .map(|mut span| {
                if span.start_index < span.end_index && span.end_index <= self.origins.len() {
                    span.start_index = self.origins[span.start_index];
                    span.end_index = self.origins[span.end_index - 1] + 1;
                }
                span
            })
            .collect()
    }
}

/// Merges runs of spans where one ends exactly where the next starts.
///
/// The merged span keeps the `index` of its first member.
#[must_use]
pub fn concatenate_nsw_spans(spans: Vec<NswSpan>) -> Vec<NswSpan> {
    let mut merged: Vec<NswSpan> = Vec::with_capacity(spans.len());
    for span in spans {
        match merged.last_mut() {
            Some(current) if current.touches(&span) => {
                current.nsw.push_str(&span.nsw);
                current.end_index = span.end_index;
            }
            _ => merged.push(span),
        }
    }
    merged
}

/// Returns the substring between two character offsets, if both are in bounds.
#[must_use]
pub fn char_slice(text: &str, start: usize, end: usize) -> Option<&str> {
    if start > end {
        return None;
    }
    let mut boundaries = text
        .char_indices()
        .map(|(byte, _)| byte)
        .chain(std::iter::once(text.len()));
    let start_byte = boundaries.nth(start)?;
    let end_byte = if end == start {
        start_byte
    } else {
        boundaries.nth(end - start - 1)?
    };
    Some(&text[start_byte..end_byte])
}

/// Checks every span against the sentence it was aligned to.
///
/// Fails with [`VisolexError::Alignment`] on an out-of-bounds, empty,
/// overlapping or out-of-order span, or one whose text differs from the
/// input at its offsets.
pub fn verify_spans(text: &str, spans: &[NswSpan]) -> Result<()> {
    let mut previous_end = 0;
    for span in spans {
        if span.start_index >= span.end_index {
            return Err(VisolexError::alignment(
                text,
                format!("empty span {}..{}", span.start_index, span.end_index),
            ));
        }
        if span.start_index < previous_end {
            return Err(VisolexError::alignment(
                text,
                format!(
                    "span {}..{} overlaps or precedes the previous span ending at {}",
                    span.start_index, span.end_index, previous_end
                ),
            ));
        }
        let Some(actual) = char_slice(text, span.start_index, span.end_index) else {
            return Err(VisolexError::alignment(
                text,
                format!(
                    "span {}..{} exceeds {} characters",
                    span.start_index,
                    span.end_index,
                    text.chars().count()
                ),
            ));
        };
        if actual != span.nsw {
            return Err(VisolexError::alignment(
                text,
                format!(
                    "span {}..{} reads {:?} but the model produced {:?}",
                    span.start_index, span.end_index, actual, span.nsw
                ),
            ));
        }
        previous_end = span.end_index;
    }
    Ok(())
}
