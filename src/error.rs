//! Error types for the slimsearch crate.

use thiserror::Error;

use crate::data::DocumentId;

/// Result type alias using [`SlimSearchError`].
pub type Result<T> = std::result::Result<T, SlimSearchError>;

/// Errors raised by index construction, ingestion, search, and
/// serialization.
///
/// Recoverable conditions (a document that changed between indexing and
/// removal) are reported through the logger hook instead and never surface
/// here.
#[derive(Debug, Error)]
pub enum SlimSearchError {
    /// The document does not carry the configured id field.
    #[error("SlimSearch: document does not have ID field '{field}'")]
    MissingId {
        /// Name of the configured id field.
        field: String,
    },

    /// `add` was called with an external id that is already indexed.
    #[error("SlimSearch: duplicate ID {id}")]
    DuplicateId {
        /// The conflicting external id.
        id: DocumentId,
    },

    /// `remove` or `discard` named an external id that is not in the index.
    #[error("SlimSearch: document with ID {id} is not in the index")]
    UnknownId {
        /// The unknown external id.
        id: DocumentId,
    },

    /// A search option or boost referenced a field that was never declared.
    #[error("SlimSearch: unknown field '{field}'")]
    MissingField {
        /// The undeclared field name.
        field: String,
    },

    /// A serialized index was produced by an unsupported format version.
    #[error("SlimSearch: cannot deserialize an index created with incompatible version {version}")]
    IncompatibleVersion {
        /// The version found in the serialized payload.
        version: u64,
    },

    /// Invalid construction options.
    #[error("SlimSearch: invalid option: {message}")]
    InvalidOption {
        /// Description of the offending option.
        message: String,
    },

    /// JSON (de)serialization failure.
    #[error("SlimSearch: serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SlimSearchError {
    /// Create a [`SlimSearchError::MissingId`] error.
    pub fn missing_id(field: impl Into<String>) -> Self {
        SlimSearchError::MissingId {
            field: field.into(),
        }
    }

    /// Create a [`SlimSearchError::DuplicateId`] error.
    pub fn duplicate_id(id: DocumentId) -> Self {
        SlimSearchError::DuplicateId { id }
    }

    /// Create a [`SlimSearchError::UnknownId`] error.
    pub fn unknown_id(id: DocumentId) -> Self {
        SlimSearchError::UnknownId { id }
    }

    /// Create a [`SlimSearchError::MissingField`] error.
    pub fn missing_field(field: impl Into<String>) -> Self {
        SlimSearchError::MissingField {
            field: field.into(),
        }
    }

    /// Create a [`SlimSearchError::InvalidOption`] error.
    pub fn invalid_option(message: impl Into<String>) -> Self {
        SlimSearchError::InvalidOption {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_carry_prefix() {
        let errors: Vec<SlimSearchError> = vec![
            SlimSearchError::missing_id("id"),
            SlimSearchError::duplicate_id(DocumentId::from(1)),
            SlimSearchError::unknown_id(DocumentId::from("doc-9")),
            SlimSearchError::missing_field("body"),
            SlimSearchError::IncompatibleVersion { version: 7 },
            SlimSearchError::invalid_option("fields must not be empty"),
        ];
        for err in errors {
            assert!(
                err.to_string().starts_with("SlimSearch: "),
                "missing prefix: {err}"
            );
        }
    }

    #[test]
    fn test_duplicate_id_message() {
        let err = SlimSearchError::duplicate_id(DocumentId::from(42));
        assert_eq!(err.to_string(), "SlimSearch: duplicate ID 42");
    }
}
