//! # SlimSearch
//!
//! An in-memory full-text search engine with BM25+ ranking.
//!
//! ## Features
//!
//! - Pure Rust implementation, no external services
//! - Exact, prefix, and fuzzy (edit-distance bounded) term matching over a
//!   single radix-tree dictionary
//! - Boolean query composition (AND / OR / AND_NOT) with nested option
//!   overrides
//! - Host-configurable analysis pipeline (field extraction, tokenization,
//!   term processing)
//! - Soft deletes with background, cooperatively-batched vacuuming
//! - Auto-suggestions and JSON serialization of the index state
//!
//! ## Quick start
//!
//! ```
//! use slimsearch::{Document, IndexOptions, SearchIndex, SearchOptions};
//!
//! let index = SearchIndex::new(
//!     IndexOptions::builder()
//!         .fields(["title", "text"])
//!         .build()
//!         .unwrap(),
//! )
//! .unwrap();
//!
//! index
//!     .add(
//!         &Document::new()
//!             .with_field("id", 2)
//!             .with_text("title", "Zen and the Art of Motorcycle Maintenance")
//!             .with_text("text", "I can see by my watch"),
//!     )
//!     .unwrap();
//!
//! // Exact search.
//! let hits = index.search("zen motorcycle").unwrap();
//! assert_eq!(hits[0].id, 2.into());
//!
//! // Prefix search.
//! let hits = index
//!     .search_with("moto", &SearchOptions::new().prefix(true))
//!     .unwrap();
//! assert_eq!(hits.len(), 1);
//! ```

mod analysis;
mod data;
mod dictionary;
mod engine;
mod error;
mod options;
mod query;
mod search;
mod serialization;
mod store;
mod suggest;
mod vacuum;

// Re-exports for the public API
pub use analysis::{LogLevel, Processed};
pub use data::{DataValue, Document, DocumentId};
pub use dictionary::RadixMap;
pub use engine::SearchIndex;
pub use error::{Result, SlimSearchError};
pub use options::{
    AutoVacuumOptions, Bm25Params, FuzzyMode, IndexOptions, IndexOptionsBuilder, PrefixMode,
    SearchOptions, VacuumOptions, Weights,
};
pub use query::{Combinator, Query, QueryCombination};
pub use search::SearchResult;
pub use suggest::Suggestion;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
