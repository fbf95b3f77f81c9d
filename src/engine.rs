//! The public search engine.
//!
//! [`SearchIndex`] is the façade over the whole crate: it owns the inverted
//! index behind a read-write lock, runs the ingest pipeline, executes
//! queries, and coordinates vacuum scheduling. All mutations and searches
//! complete synchronously; vacuuming is the only suspension point and runs
//! in the background.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::analysis::{LogLevel, run_pipeline};
use crate::data::{Document, DocumentId};
use crate::error::{Result, SlimSearchError};
use crate::options::{IndexOptions, SearchOptions, VacuumConditions, VacuumOptions};
use crate::query::Query;
use crate::search::{QueryExecutor, SearchResult};
use crate::serialization;
use crate::store::IndexStore;
use crate::suggest::{Suggestion, group_suggestions};
use crate::vacuum::VacuumScheduler;

/// Number of documents ingested between yield points in the async ingestion
/// and loading paths.
const ASYNC_CHUNK_SIZE: usize = 10;

/// An in-memory full-text search index with BM25+ ranking.
///
/// # Example
///
/// ```
/// use slimsearch::{Document, IndexOptions, SearchIndex, SearchOptions};
///
/// let index = SearchIndex::new(
///     IndexOptions::builder()
///         .fields(["title", "text"])
///         .store_fields(["title"])
///         .build()
///         .unwrap(),
/// )
/// .unwrap();
///
/// index
///     .add(
///         &Document::new()
///             .with_field("id", 1)
///             .with_text("title", "Moby Dick")
///             .with_text("text", "Call me Ishmael"),
///     )
///     .unwrap();
///
/// let results = index.search("ishmael").unwrap();
/// assert_eq!(results.len(), 1);
///
/// let fuzzy = index
///     .search_with("ismael", &SearchOptions::new().fuzzy(0.2))
///     .unwrap();
/// assert_eq!(fuzzy.len(), 1);
/// ```
pub struct SearchIndex {
    options: Arc<IndexOptions>,
    store: Arc<RwLock<IndexStore>>,
    vacuum: Arc<VacuumScheduler>,
}

impl std::fmt::Debug for SearchIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let store = self.store.read();
        f.debug_struct("SearchIndex")
            .field("fields", &self.options.fields)
            .field("document_count", &store.document_count)
            .field("term_count", &store.index.len())
            .field("dirt_count", &store.dirt_count)
            .finish()
    }
}

impl SearchIndex {
    /// Create a new index from the given options.
    ///
    /// Fails with `InvalidOption` when the options are malformed (no
    /// indexed fields, duplicate field names, negative BM25 parameters).
    pub fn new(options: IndexOptions) -> Result<Self> {
        options.validate()?;
        let store = IndexStore::new(options.fields.clone());
        Ok(SearchIndex {
            options: Arc::new(options),
            store: Arc::new(RwLock::new(store)),
            vacuum: Arc::new(VacuumScheduler::default()),
        })
    }

    // ------------------------------------------------------------------
    // Ingestion
    // ------------------------------------------------------------------

    /// Index a document.
    ///
    /// Fails with `MissingId` when the document lacks the id field and with
    /// `DuplicateId` when its external id is already indexed; the index is
    /// unchanged on failure.
    pub fn add(&self, document: &Document) -> Result<()> {
        let external_id = self.extract_id(document)?;
        let mut store = self.store.write();
        let short_id = store.allocate_short_id(external_id)?;
        self.index_fields(&mut store, short_id, document);
        let projection = self.stored_projection(document);
        store.store_document(short_id, projection);
        Ok(())
    }

    /// Index several documents, stopping at the first failure.
    pub fn add_all(&self, documents: &[Document]) -> Result<()> {
        for document in documents {
            self.add(document)?;
        }
        Ok(())
    }

    /// Index several documents, yielding to the runtime between chunks so
    /// other tasks stay responsive during bulk loads.
    pub async fn add_all_async(&self, documents: &[Document]) -> Result<()> {
        for chunk in documents.chunks(ASYNC_CHUNK_SIZE) {
            for document in chunk {
                self.add(document)?;
            }
            tokio::task::yield_now().await;
        }
        Ok(())
    }

    /// Remove a document, synchronously deleting its postings.
    ///
    /// The document body is re-analyzed to derive the postings to subtract.
    /// If the document changed since it was indexed, the mismatching terms
    /// are reported through the logger with code `version_conflict` and
    /// removal continues.
    pub fn remove(&self, document: &Document) -> Result<()> {
        let external_id = self.extract_id(document)?;
        let mut store = self.store.write();
        let Some(short_id) = store.short_id_of(&external_id) else {
            return Err(SlimSearchError::unknown_id(external_id));
        };

        for (field_id, field_name) in self.options.fields.iter().enumerate() {
            let Some(value) = (self.options.extract_field)(document, field_name) else {
                continue;
            };
            let Some(text) = value.to_index_text() else {
                continue;
            };
            let (_, terms) = run_pipeline(
                &self.options.tokenize,
                &self.options.process_term,
                &text,
                Some(field_name),
            );
            for term in &terms {
                if !store.remove_posting(short_id, field_id as u16, term) {
                    (self.options.logger)(
                        LogLevel::Warn,
                        &format!(
                            "SlimSearch: document with ID {external_id} has changed before \
                             removal: term \"{term}\" was not present in field \
                             \"{field_name}\". Removing a document after it has changed can \
                             corrupt the index!"
                        ),
                        Some("version_conflict"),
                    );
                }
            }
        }
        store.drop_document(short_id);
        Ok(())
    }

    /// Remove several documents, stopping at the first failure.
    pub fn remove_all(&self, documents: &[Document]) -> Result<()> {
        for document in documents {
            self.remove(document)?;
        }
        Ok(())
    }

    /// Discard a document by external id.
    ///
    /// The id maps and stored fields are cleared immediately; the postings
    /// are left in place and cleaned up lazily by vacuum. When auto-vacuum
    /// is enabled and both dirt thresholds are met, a vacuum is scheduled.
    pub fn discard(&self, id: impl Into<DocumentId>) -> Result<()> {
        self.discard_id(id.into())?;
        self.maybe_auto_vacuum();
        Ok(())
    }

    /// Discard several documents by external id, evaluating the auto-vacuum
    /// trigger once at the end instead of per call.
    pub fn discard_all<I>(&self, ids: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Into<DocumentId>,
    {
        let result = ids.into_iter().try_for_each(|id| self.discard_id(id.into()));
        self.maybe_auto_vacuum();
        result
    }

    /// Replace a document: discard its current version, then index the new
    /// one under the same external id.
    pub fn replace(&self, document: &Document) -> Result<()> {
        let external_id = self.extract_id(document)?;
        self.discard_id(external_id)?;
        self.add(document)?;
        self.maybe_auto_vacuum();
        Ok(())
    }

    fn discard_id(&self, external_id: DocumentId) -> Result<()> {
        let mut store = self.store.write();
        let Some(short_id) = store.short_id_of(&external_id) else {
            return Err(SlimSearchError::unknown_id(external_id));
        };
        store.tombstone(short_id);
        Ok(())
    }

    fn maybe_auto_vacuum(&self) {
        let Some(auto_vacuum) = &self.options.auto_vacuum else {
            return;
        };
        let (dirt_count, dirt_factor) = {
            let store = self.store.read();
            (store.dirt_count, store.dirt_factor())
        };
        if dirt_count >= auto_vacuum.min_dirt_count && dirt_factor >= auto_vacuum.min_dirt_factor
        {
            let (options, conditions) = auto_vacuum.split();
            self.vacuum.request(&self.store, options, conditions);
        }
    }

    fn extract_id(&self, document: &Document) -> Result<DocumentId> {
        let id_field = &self.options.id_field;
        let Some(value) = (self.options.extract_field)(document, id_field) else {
            return Err(SlimSearchError::missing_id(id_field));
        };
        DocumentId::from_value(&value).ok_or_else(|| SlimSearchError::missing_id(id_field))
    }

    fn index_fields(&self, store: &mut IndexStore, short_id: u32, document: &Document) {
        for (field_id, field_name) in self.options.fields.iter().enumerate() {
            let field_id = field_id as u16;
            let text = (self.options.extract_field)(document, field_name)
                .and_then(|value| value.to_index_text());
            let length = match text {
                Some(text) => {
                    let (token_count, terms) = run_pipeline(
                        &self.options.tokenize,
                        &self.options.process_term,
                        &text,
                        Some(field_name),
                    );
                    for term in &terms {
                        store.add_posting(short_id, field_id, term);
                    }
                    token_count as u32
                }
                None => 0,
            };
            store.set_field_length(short_id, field_id, length);
        }
    }

    fn stored_projection(&self, document: &Document) -> Document {
        let mut projection = Document::new();
        for field_name in &self.options.store_fields {
            if let Some(value) = (self.options.extract_field)(document, field_name) {
                projection.fields.insert(field_name.clone(), value);
            }
        }
        projection
    }

    // ------------------------------------------------------------------
    // Search
    // ------------------------------------------------------------------

    /// Search with the index's default options.
    ///
    /// See [`SearchIndex::search_with`].
    pub fn search(&self, query: impl Into<Query>) -> Result<Vec<SearchResult>> {
        self.search_with(query, &SearchOptions::default())
    }

    /// Search with option overrides on top of the index defaults.
    ///
    /// The query is either free text (tokenized and processed with the same
    /// pipeline as indexing), the wildcard, or a nested combination. Results
    /// are ordered by descending score.
    pub fn search_with(
        &self,
        query: impl Into<Query>,
        options: &SearchOptions,
    ) -> Result<Vec<SearchResult>> {
        let store = self.store.read();
        let executor = QueryExecutor {
            store: &store,
            options: &self.options,
        };
        executor.search(&query.into(), options)
    }

    /// Suggest completions of a query, with the index's default
    /// auto-suggest options (prefix and fuzzy matching enabled).
    pub fn auto_suggest(&self, query: &str) -> Result<Vec<Suggestion>> {
        self.auto_suggest_with(query, &SearchOptions::default())
    }

    /// Suggest completions of a query with option overrides.
    ///
    /// Runs a prefix+fuzzy search and groups the results by the phrase
    /// their matched terms expand to, summing scores within a group.
    pub fn auto_suggest_with(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<Suggestion>> {
        let overlaid = self.options.auto_suggest_options.overlaid(options);
        let store = self.store.read();
        let executor = QueryExecutor {
            store: &store,
            options: &self.options,
        };
        let phrases = executor.suggestion_phrases(query, &overlaid)?;
        Ok(group_suggestions(phrases))
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    /// Whether a document with this external id is currently indexed.
    pub fn has(&self, id: impl Into<DocumentId>) -> bool {
        self.store.read().short_id_of(&id.into()).is_some()
    }

    /// The stored-field projection of a document, or `None` when the id is
    /// unknown or nothing was stored for it.
    pub fn get_stored_fields(&self, id: impl Into<DocumentId>) -> Option<Document> {
        let store = self.store.read();
        let short_id = store.short_id_of(&id.into())?;
        store.stored_fields.get(&short_id).cloned()
    }

    /// Number of live documents.
    pub fn document_count(&self) -> usize {
        self.store.read().document_count as usize
    }

    /// Number of terms in the dictionary.
    pub fn term_count(&self) -> usize {
        self.store.read().index.len()
    }

    /// Number of discarded documents whose postings await vacuum.
    pub fn dirt_count(&self) -> usize {
        self.store.read().dirt_count as usize
    }

    /// Fraction of the index occupied by tombstoned postings.
    pub fn dirt_factor(&self) -> f64 {
        self.store.read().dirt_factor()
    }

    // ------------------------------------------------------------------
    // Vacuum
    // ------------------------------------------------------------------

    /// Vacuum the index with default pass options, resolving when all
    /// scheduled vacuum work has completed.
    pub async fn vacuum(&self) {
        self.vacuum_with(VacuumOptions::default()).await;
    }

    /// Vacuum the index with explicit pass options.
    ///
    /// If a vacuum is already running, the request is queued behind it
    /// (coalescing with any previously queued request); this method resolves
    /// once the scheduler is fully drained.
    pub async fn vacuum_with(&self, options: VacuumOptions) {
        self.vacuum
            .request(&self.store, options, VacuumConditions::always());
        self.vacuum.wait_until_drained().await;
    }

    /// Whether a vacuum is currently running or queued.
    pub fn is_vacuuming(&self) -> bool {
        self.vacuum.is_running()
    }

    // ------------------------------------------------------------------
    // Serialization
    // ------------------------------------------------------------------

    /// Serialize the index state to a version-2 JSON string.
    pub fn to_json(&self) -> Result<String> {
        serialization::to_json(&self.store.read())
    }

    /// Load an index from a JSON dump produced by [`SearchIndex::to_json`].
    ///
    /// The options must declare the same analysis hooks used when the dump
    /// was produced for search results to be equivalent. Fails with
    /// `IncompatibleVersion` for unsupported dump versions; version-1 dumps
    /// are upgraded on the fly.
    pub fn load_json(json: &str, options: IndexOptions) -> Result<Self> {
        options.validate()?;
        let store = serialization::into_store(serialization::parse(json)?)?;
        Ok(SearchIndex {
            options: Arc::new(options),
            store: Arc::new(RwLock::new(store)),
            vacuum: Arc::new(VacuumScheduler::default()),
        })
    }

    /// Load an index from a JSON dump, yielding to the runtime while the
    /// posting structure is rebuilt.
    pub async fn load_json_async(json: &str, options: IndexOptions) -> Result<Self> {
        options.validate()?;
        let (mut store, entries, is_v1) = serialization::parse(json)?.into_parts();
        for (position, (term, fields)) in entries.into_iter().enumerate() {
            let postings = serialization::decode_postings(fields, is_v1)?;
            if !postings.is_empty() {
                store.index.insert(&term, postings);
            }
            if position % 1000 == 999 {
                tokio::task::yield_now().await;
            }
        }
        Ok(SearchIndex {
            options: Arc::new(options),
            store: Arc::new(RwLock::new(store)),
            vacuum: Arc::new(VacuumScheduler::default()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataValue;

    fn index() -> SearchIndex {
        SearchIndex::new(
            IndexOptions::builder()
                .fields(["title", "text"])
                .store_fields(["title"])
                .build()
                .unwrap(),
        )
        .unwrap()
    }

    fn doc(id: i64, title: &str, text: &str) -> Document {
        Document::new()
            .with_field("id", id)
            .with_text("title", title)
            .with_text("text", text)
    }

    #[test]
    fn test_add_and_has() {
        let index = index();
        index.add(&doc(1, "Moby Dick", "Call me Ishmael")).unwrap();
        assert!(index.has(1));
        assert!(!index.has(2));
        assert_eq!(index.document_count(), 1);
        assert!(index.term_count() > 0);
    }

    #[test]
    fn test_add_missing_id() {
        let index = index();
        let err = index
            .add(&Document::new().with_text("title", "No id"))
            .unwrap_err();
        assert!(matches!(err, SlimSearchError::MissingId { .. }));
        assert_eq!(index.document_count(), 0);
        assert_eq!(index.term_count(), 0);
    }

    #[test]
    fn test_add_duplicate_id() {
        let index = index();
        index.add(&doc(1, "First", "one")).unwrap();
        let err = index.add(&doc(1, "Second", "two")).unwrap_err();
        assert!(matches!(err, SlimSearchError::DuplicateId { .. }));
        assert_eq!(index.document_count(), 1);
        // The failed add left no postings behind.
        assert!(index.search("second").unwrap().is_empty());
    }

    #[test]
    fn test_remove_unknown_id() {
        let index = index();
        let err = index.remove(&doc(1, "a", "b")).unwrap_err();
        assert!(matches!(err, SlimSearchError::UnknownId { .. }));
    }

    #[test]
    fn test_remove_cleans_exclusive_terms() {
        let index = index();
        let d1 = doc(1, "Moby Dick", "Call me Ishmael");
        let d2 = doc(2, "Moby Dick II", "The whale returns");
        index.add(&d1).unwrap();
        index.add(&d2).unwrap();

        index.remove(&d1).unwrap();
        assert!(index.search("ishmael").unwrap().is_empty());
        // Terms shared with the surviving document remain.
        assert_eq!(index.search("moby").unwrap().len(), 1);
        assert_eq!(index.document_count(), 1);
    }

    #[test]
    fn test_remove_changed_document_warns() {
        use std::sync::Mutex;
        use std::sync::atomic::{AtomicUsize, Ordering};

        static WARNINGS: AtomicUsize = AtomicUsize::new(0);
        static LAST_CODE: Mutex<Option<String>> = Mutex::new(None);

        let index = SearchIndex::new(
            IndexOptions::builder()
                .fields(["title", "text"])
                .logger(|level, _message, code| {
                    if level == LogLevel::Warn {
                        WARNINGS.fetch_add(1, Ordering::SeqCst);
                        *LAST_CODE.lock().unwrap() = code.map(str::to_string);
                    }
                })
                .build()
                .unwrap(),
        )
        .unwrap();

        index.add(&doc(1, "Original", "old words")).unwrap();
        index.remove(&doc(1, "Mutated", "new words")).unwrap();

        assert!(WARNINGS.load(Ordering::SeqCst) > 0);
        assert_eq!(
            LAST_CODE.lock().unwrap().as_deref(),
            Some("version_conflict")
        );
        // The document is gone despite the mismatch.
        assert_eq!(index.document_count(), 0);
        assert!(!index.has(1));
    }

    #[test]
    fn test_replace() {
        let index = index();
        index.add(&doc(1, "Moby Dick", "Call me Ishmael")).unwrap();
        index.replace(&doc(1, "Moby-Dick", "Whale")).unwrap();

        assert_eq!(index.document_count(), 1);
        let results = index.search("whale").unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, DocumentId::from(1));
        assert!(index.search("ishmael").unwrap().is_empty());
    }

    #[test]
    fn test_get_stored_fields() {
        let index = index();
        index.add(&doc(1, "Moby Dick", "Call me Ishmael")).unwrap();
        let stored = index.get_stored_fields(1).unwrap();
        assert_eq!(stored.get("title").unwrap().as_text(), Some("Moby Dick"));
        // Only the configured projection is kept.
        assert!(stored.get("text").is_none());
        assert!(index.get_stored_fields(9).is_none());
    }

    #[test]
    fn test_string_ids() {
        let index = index();
        index
            .add(
                &Document::new()
                    .with_field("id", "doc-a")
                    .with_text("title", "Neuromancer"),
            )
            .unwrap();
        assert!(index.has("doc-a"));
        let results = index.search("neuromancer").unwrap();
        assert_eq!(results[0].id, DocumentId::from("doc-a"));
    }

    #[test]
    fn test_list_fields_are_indexed() {
        let index = SearchIndex::new(
            IndexOptions::builder().fields(["tags"]).build().unwrap(),
        )
        .unwrap();
        index
            .add(&Document::new().with_field("id", 1).with_field(
                "tags",
                DataValue::List(vec!["rust".into(), "search".into()]),
            ))
            .unwrap();
        assert_eq!(index.search("rust").unwrap().len(), 1);
        assert_eq!(index.search("search").unwrap().len(), 1);
    }

    #[test]
    fn test_custom_process_term_expansion() {
        use crate::analysis::Processed;

        let index = SearchIndex::new(
            IndexOptions::builder()
                .fields(["title"])
                .process_term(|term, _| {
                    let lower = term.to_lowercase();
                    if lower == "the" {
                        Processed::Skip
                    } else if lower == "ny" {
                        Processed::Many(vec!["ny".to_string(), "new".to_string(), "york".to_string()])
                    } else {
                        Processed::One(lower)
                    }
                })
                .build()
                .unwrap(),
        )
        .unwrap();

        index
            .add(&Document::new().with_field("id", 1).with_text("title", "The NY subway"))
            .unwrap();
        assert!(index.search("the").unwrap().is_empty());
        assert_eq!(index.search("york").unwrap().len(), 1);
        assert_eq!(index.search("subway").unwrap().len(), 1);
    }
}
