//! # Text Cleanup
//!
//! Regex-based preprocessing applied before a sentence reaches the model, and
//! spacing cleanup applied to the normalized output.

use regex::Regex;

use crate::accents::normalize_tone_marks;
use crate::error::Result;

/// Cleans up normalizer output before it is returned to the caller.
pub trait PostProcessor: Send + Sync {
    fn process(&self, text: &str) -> String;
}

/// Collapses whitespace and re-attaches punctuation to its word.
pub struct SpacingCleanup {
    re_spaces: Regex,
    re_before_closing: Regex,
    re_after_opening: Regex,
}

impl SpacingCleanup {
    /// Constructs the cleanup with pre-compiled patterns.
    ///
    /// # Errors
    ///
    /// Returns `VisolexError::Regex` if a pattern fails to compile
    /// (should never happen with the static patterns defined here).
    pub fn new() -> Result<Self> {
        Ok(Self {
            re_spaces: Regex::new(r"\s+")?,
            re_before_closing: Regex::new(r"\s+([,.!?:;)\]}…])")?,
            re_after_opening: Regex::new(r"([(\[{])\s+")?,
        })
    }
}

impl PostProcessor for SpacingCleanup {
    fn process(&self, text: &str) -> String {
        let text = self.re_spaces.replace_all(text, " ");
        let text = self.re_before_closing.replace_all(&text, "$1");
        let text = self.re_after_opening.replace_all(&text, "$1");
        text.trim().to_string()
    }
}

/// Leaves the text unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl PostProcessor for Identity {
    fn process(&self, text: &str) -> String {
        text.to_string()
    }
}

/// Left-edge punctuation split off the start of a word.
const LEFT_EDGE: &[char] = &['"', '\'', '(', '[', '{'];
/// Right-edge punctuation split off the end of a word.
const RIGHT_EDGE: &[char] = &['.', ',', '!', '?', ';', ':', '"', '\'', ')', ']', '}'];

/// Rule-based preprocessing of raw social-media text.
///
/// Moves tone marks to their standard vowel, separates emoji from words,
/// splits punctuation glued to word edges and normalizes whitespace, so that
/// every word reaches the tokenizer as its own whitespace-delimited unit.
/// URLs, emails and numbers are kept whole.
pub struct BasicNormalizer {
    re_emoji: Regex,
    re_protected: Regex,
    re_edge_left: Regex,
    re_edge_right: Regex,
}

impl BasicNormalizer {
    /// # Errors
    ///
    /// Returns `VisolexError::Regex` if a pattern fails to compile.
    pub fn new() -> Result<Self> {
        Ok(Self {
            re_emoji: Regex::new(
                r"[\x{1F300}-\x{1FAFF}\x{2600}-\x{27BF}\x{1F1E6}-\x{1F1FF}\x{2B50}\x{2764}]",
            )?,
            re_protected: Regex::new(concat!(
                r"^(?:",
                r#"(?:https?://|www\.)\S*[^\s.,!?;:"']"#,
                r"|[\w.+-]+@[\w-]+(?:\.[\w-]+)+",
                r"|\d+(?:[.,:/]\d+)*\b",
                r")",
            ))?,
            re_edge_left: Regex::new(r#"(^|\s)(["'(\[{]+)(\S)"#)?,
            re_edge_right: Regex::new(r#"([^\s.,!?;:"')\]}])([.,!?;:"')\]}]+)(\s|$)"#)?,
        })
    }

    /// Preprocesses one sentence.
    ///
    /// # Examples
    /// ```
    /// use visolex_core::text::BasicNormalizer;
    ///
    /// let normalizer = BasicNormalizer::new().unwrap();
    /// assert_eq!(normalizer.preprocess("Đẹp wá😍😍", true), "đẹp wá 😍 😍");
    /// assert_eq!(
    ///     normalizer.preprocess("hoà nha, xem https://x.vn!", false),
    ///     "hòa nha , xem https://x.vn !"
    /// );
    /// ```
    pub fn preprocess(&self, text: &str, lowercase: bool) -> String {
        let text = if lowercase {
            text.to_lowercase()
        } else {
            text.to_string()
        };
        let text = normalize_tone_marks(&text);
        let text = self.re_emoji.replace_all(&text, " $0 ");
        let mut words = Vec::new();
        for token in text.split_whitespace() {
            self.split_edges(token, &mut words);
        }
        words.join(" ")
    }

    fn split_edges(&self, token: &str, words: &mut Vec<String>) {
        let body = token.trim_start_matches(LEFT_EDGE);
        if let Some(protected) = self.re_protected.find(body) {
            let tail = &body[protected.end()..];
            if tail.chars().all(|c| RIGHT_EDGE.contains(&c)) {
                let lead = &token[..token.len() - body.len()];
                words.extend(
                    [lead, protected.as_str(), tail]
                        .into_iter()
                        .filter(|part| !part.is_empty())
                        .map(str::to_string),
                );
                return;
            }
        }

        let token = self.re_edge_left.replace_all(token, "$1$2 $3");
        let token = self.re_edge_right.replace_all(&token, "$1 $2$3");
        words.push(token.into_owned());
    }
}
