//! Text analysis hooks: field extraction, tokenization, term processing.
//!
//! The analysis pipeline follows a simple flow:
//!
//! ```text
//! Document → extract_field → tokenize → process_term → indexed terms
//! ```
//!
//! Each stage is a host-replaceable function. The defaults split on Unicode
//! whitespace and punctuation and lowercase every term; hosts plug in
//! stemming, stopword removal, or synonym expansion by supplying their own
//! [`TermProcessor`] (a term may expand to several, or be dropped entirely).

use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::data::{DataValue, Document};

/// Matches runs of characters that separate words: newlines, Unicode
/// separators, and punctuation.
static SPACE_OR_PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\n\r\p{Z}\p{P}]+").unwrap());

/// Extracts the raw value of a named field from a document.
///
/// Called with the document and the field name; `None` skips the field.
pub type FieldExtractor = Arc<dyn Fn(&Document, &str) -> Option<DataValue> + Send + Sync>;

/// Splits field text into tokens.
///
/// Called with the text and the field name (`None` when tokenizing a query).
pub type Tokenizer = Arc<dyn Fn(&str, Option<&str>) -> Vec<String> + Send + Sync>;

/// Transforms a single token into zero or more index terms.
pub type TermProcessor = Arc<dyn Fn(&str, Option<&str>) -> Processed + Send + Sync>;

/// Receives diagnostics from the engine: a level, a message, and an optional
/// machine-readable code (e.g. `version_conflict`).
pub type Logger = Arc<dyn Fn(LogLevel, &str, Option<&str>) + Send + Sync>;

/// Outcome of processing one token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Processed {
    /// Index a single term for this token.
    One(String),
    /// Index several terms for this token (e.g. synonym expansion).
    Many(Vec<String>),
    /// Drop this token.
    Skip,
}

impl From<String> for Processed {
    fn from(term: String) -> Self {
        Processed::One(term)
    }
}

impl From<&str> for Processed {
    fn from(term: &str) -> Self {
        Processed::One(term.to_string())
    }
}

impl From<Vec<String>> for Processed {
    fn from(terms: Vec<String>) -> Self {
        Processed::Many(terms)
    }
}

impl From<Option<String>> for Processed {
    fn from(term: Option<String>) -> Self {
        match term {
            Some(t) => Processed::One(t),
            None => Processed::Skip,
        }
    }
}

/// Severity level for logger messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Verbose diagnostics.
    Debug,
    /// Informational messages.
    Info,
    /// Recoverable anomalies.
    Warn,
    /// Errors that were reported rather than raised.
    Error,
}

/// Run text through the tokenizer and term processor.
///
/// Returns the raw token count (the field-length denominator counts tokens
/// before `process_term` filtering) and the surviving index terms.
pub(crate) fn run_pipeline(
    tokenize: &Tokenizer,
    process_term: &TermProcessor,
    text: &str,
    field: Option<&str>,
) -> (usize, Vec<String>) {
    let tokens = tokenize(text, field);
    let token_count = tokens.len();
    let mut terms = Vec::with_capacity(token_count);
    for token in &tokens {
        match process_term(token, field) {
            Processed::One(term) => terms.push(term),
            Processed::Many(expanded) => terms.extend(expanded),
            Processed::Skip => {}
        }
    }
    (token_count, terms)
}

/// Default field extractor: direct lookup in the document's field map.
pub fn default_extract_field() -> FieldExtractor {
    Arc::new(|doc: &Document, field: &str| doc.get(field).cloned())
}

/// Default tokenizer: splits on Unicode separators and punctuation.
pub fn default_tokenize() -> Tokenizer {
    Arc::new(|text: &str, _field: Option<&str>| {
        SPACE_OR_PUNCTUATION
            .split(text)
            .filter(|t| !t.is_empty())
            .map(|t| t.to_string())
            .collect()
    })
}

/// Default term processor: lowercases the token.
pub fn default_process_term() -> TermProcessor {
    Arc::new(|term: &str, _field: Option<&str>| Processed::One(term.to_lowercase()))
}

/// Default logger: routes messages to the matching `tracing` macro.
pub fn default_logger() -> Logger {
    Arc::new(|level: LogLevel, message: &str, code: Option<&str>| match level {
        LogLevel::Debug => tracing::debug!(code, "{message}"),
        LogLevel::Info => tracing::info!(code, "{message}"),
        LogLevel::Warn => tracing::warn!(code, "{message}"),
        LogLevel::Error => tracing::error!(code, "{message}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tokenize_splits_on_space_and_punctuation() {
        let tokenize = default_tokenize();
        assert_eq!(
            tokenize("Call me Ishmael.", Some("text")),
            vec!["Call", "me", "Ishmael"]
        );
        assert_eq!(
            tokenize("Zen and the Art of Motorcycle", None),
            vec!["Zen", "and", "the", "Art", "of", "Motorcycle"]
        );
        assert_eq!(tokenize("well-being, really", None), vec!["well", "being", "really"]);
    }

    #[test]
    fn test_default_tokenize_empty_input() {
        let tokenize = default_tokenize();
        assert!(tokenize("", None).is_empty());
        assert!(tokenize("  ...  ", None).is_empty());
    }

    #[test]
    fn test_default_process_term_lowercases() {
        let process = default_process_term();
        assert_eq!(process("Ishmael", None), Processed::One("ishmael".into()));
    }

    #[test]
    fn test_default_extract_field() {
        let extract = default_extract_field();
        let doc = Document::new().with_text("title", "Neuromancer");
        assert_eq!(
            extract(&doc, "title").unwrap().as_text(),
            Some("Neuromancer")
        );
        assert!(extract(&doc, "missing").is_none());
    }
}
