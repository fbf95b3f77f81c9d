//! Inverted-index storage.
//!
//! [`IndexStore`] owns the data model of the engine: the term dictionary
//! with its postings, the bidirectional external-id ↔ short-id maps, the
//! per-document field-length table with its running averages, the stored
//! fields projection, and the dirt accounting driving vacuum scheduling.
//!
//! Every method mutates the store atomically with respect to a single call;
//! coordination across calls (locking, the ingest pipeline, vacuum
//! scheduling) lives in the engine layer.

use ahash::AHashMap;

use crate::data::{Document, DocumentId};
use crate::dictionary::RadixMap;
use crate::error::{Result, SlimSearchError};

/// Term frequencies per document: short-id → occurrence count.
pub(crate) type DocPostings = AHashMap<u32, u32>;

/// Postings of one term: field-id → document postings.
pub(crate) type FieldPostings = AHashMap<u16, DocPostings>;

/// The inverted index and its side tables.
#[derive(Debug)]
pub(crate) struct IndexStore {
    /// term → (field-id → (short-id → frequency)).
    pub(crate) index: RadixMap<FieldPostings>,
    /// short-id → external id, for live documents only.
    pub(crate) document_ids: AHashMap<u32, DocumentId>,
    /// external id → short-id, for live documents only.
    pub(crate) id_to_short: AHashMap<DocumentId, u32>,
    /// Declared field names, in declaration order (index = field-id).
    pub(crate) field_names: Vec<String>,
    /// Token count per field for each live document.
    pub(crate) field_length: AHashMap<u32, Vec<u32>>,
    /// Running mean of `field_length` across live documents, per field.
    pub(crate) avg_field_length: Vec<f64>,
    /// short-id → stored-field projection.
    pub(crate) stored_fields: AHashMap<u32, Document>,
    /// Next short-id to allocate; only ever grows.
    pub(crate) next_id: u32,
    /// Number of live documents.
    pub(crate) document_count: u32,
    /// Number of tombstoned documents whose postings await vacuum.
    pub(crate) dirt_count: u32,
}

impl IndexStore {
    pub(crate) fn new(field_names: Vec<String>) -> Self {
        let num_fields = field_names.len();
        IndexStore {
            index: RadixMap::new(),
            document_ids: AHashMap::new(),
            id_to_short: AHashMap::new(),
            field_names,
            field_length: AHashMap::new(),
            avg_field_length: vec![0.0; num_fields],
            stored_fields: AHashMap::new(),
            next_id: 0,
            document_count: 0,
            dirt_count: 0,
        }
    }

    /// Field-id for a declared field name.
    pub(crate) fn field_id(&self, name: &str) -> Option<u16> {
        self.field_names
            .iter()
            .position(|f| f == name)
            .map(|i| i as u16)
    }

    /// Fraction of the index occupied by tombstoned postings.
    pub(crate) fn dirt_factor(&self) -> f64 {
        self.dirt_count as f64 / (1.0 + self.document_count as f64 + self.dirt_count as f64)
    }

    /// Whether a short-id belongs to a live (non-tombstoned) document.
    pub(crate) fn is_live(&self, short_id: u32) -> bool {
        self.document_ids.contains_key(&short_id)
    }

    /// External id of a live short-id.
    pub(crate) fn external_id_of(&self, short_id: u32) -> Option<&DocumentId> {
        self.document_ids.get(&short_id)
    }

    /// Short-id of a live external id.
    pub(crate) fn short_id_of(&self, external_id: &DocumentId) -> Option<u32> {
        self.id_to_short.get(external_id).copied()
    }

    /// Install both id maps for a new document and extend the field-length
    /// table with a zero-filled row.
    ///
    /// Fails with `DuplicateId` when the external id is already mapped.
    pub(crate) fn allocate_short_id(&mut self, external_id: DocumentId) -> Result<u32> {
        if self.id_to_short.contains_key(&external_id) {
            return Err(SlimSearchError::duplicate_id(external_id));
        }
        let short_id = self.next_id;
        self.next_id += 1;
        self.id_to_short.insert(external_id.clone(), short_id);
        self.document_ids.insert(short_id, external_id);
        self.field_length
            .insert(short_id, vec![0; self.field_names.len()]);
        self.document_count += 1;
        Ok(short_id)
    }

    /// Record one occurrence of `term` in `field_id` of `short_id`.
    pub(crate) fn add_posting(&mut self, short_id: u32, field_id: u16, term: &str) {
        let postings = self.index.get_or_insert_with(term, FieldPostings::new);
        *postings
            .entry(field_id)
            .or_default()
            .entry(short_id)
            .or_insert(0) += 1;
    }

    /// Remove one occurrence of `term` in `field_id` of `short_id`,
    /// pruning empty posting layers up to the term itself.
    ///
    /// Returns `false` when the term or the (term, field, document) tuple is
    /// absent, so the caller can report a `version_conflict` warning.
    pub(crate) fn remove_posting(&mut self, short_id: u32, field_id: u16, term: &str) -> bool {
        let Some(postings) = self.index.get_mut(term) else {
            return false;
        };
        let Some(docs) = postings.get_mut(&field_id) else {
            return false;
        };
        let Some(freq) = docs.get_mut(&short_id) else {
            return false;
        };
        if *freq > 1 {
            *freq -= 1;
        } else {
            docs.remove(&short_id);
            if docs.is_empty() {
                postings.remove(&field_id);
            }
            if postings.is_empty() {
                self.index.remove(term);
            }
        }
        true
    }

    /// Set the token count of one field of a live document and fold it into
    /// the running average.
    pub(crate) fn set_field_length(&mut self, short_id: u32, field_id: u16, length: u32) {
        if let Some(row) = self.field_length.get_mut(&short_id) {
            row[field_id as usize] = length;
        }
        // The document is already counted, so the mean over n documents
        // moves by (length - avg) / n.
        let count = self.document_count as f64;
        if count > 0.0 {
            let avg = self.avg_field_length[field_id as usize];
            self.avg_field_length[field_id as usize] = avg + (length as f64 - avg) / count;
        }
    }

    /// Remove a document's contribution to one field average. Must run while
    /// `document_count` still includes the document.
    fn remove_field_length(&mut self, field_id: usize, length: u32) {
        let count = self.document_count as f64;
        if count <= 1.0 {
            self.avg_field_length[field_id] = 0.0;
        } else {
            let avg = self.avg_field_length[field_id];
            self.avg_field_length[field_id] = (avg * count - length as f64) / (count - 1.0);
        }
    }

    /// Drop a document's id maps, stored fields, and field lengths.
    ///
    /// Postings are untouched; callers either removed them synchronously
    /// (`remove`) or leave them for vacuum (`tombstone`).
    fn release_short_id(&mut self, short_id: u32) {
        if let Some(external_id) = self.document_ids.remove(&short_id) {
            self.id_to_short.remove(&external_id);
        }
        self.stored_fields.remove(&short_id);
        if let Some(row) = self.field_length.remove(&short_id) {
            for (field_id, length) in row.iter().enumerate() {
                self.remove_field_length(field_id, *length);
            }
        }
        self.document_count = self.document_count.saturating_sub(1);
    }

    /// Remove a document synchronously (no dirt increment). The caller is
    /// responsible for having removed its postings.
    pub(crate) fn drop_document(&mut self, short_id: u32) {
        self.release_short_id(short_id);
    }

    /// Tombstone a document: clear its id maps and length row immediately,
    /// leave its postings in place for vacuum, and count it as dirt.
    pub(crate) fn tombstone(&mut self, short_id: u32) {
        self.release_short_id(short_id);
        self.dirt_count += 1;
    }

    /// Keep the stored-field projection for a document.
    pub(crate) fn store_document(&mut self, short_id: u32, projection: Document) {
        if !projection.is_empty() {
            self.stored_fields.insert(short_id, projection);
        }
    }

    /// Snapshot of all dictionary terms, in lexicographic order.
    pub(crate) fn term_list(&self) -> Vec<String> {
        self.index.iter().map(|(term, _)| term).collect()
    }

    /// One vacuum step: drop tombstoned short-ids from a term's postings,
    /// pruning empty layers and the term itself when nothing remains.
    pub(crate) fn sweep_term(&mut self, term: &str) {
        let IndexStore {
            index,
            document_ids,
            ..
        } = self;
        let Some(postings) = index.get_mut(term) else {
            return;
        };
        postings.retain(|_, docs| {
            docs.retain(|short_id, _| document_ids.contains_key(short_id));
            !docs.is_empty()
        });
        if postings.is_empty() {
            index.remove(term);
        }
    }

    /// Complete a vacuum pass: reset the dirt counter and recompute the
    /// field-length averages from scratch to absorb incremental drift.
    pub(crate) fn finish_vacuum(&mut self) {
        self.dirt_count = 0;
        let num_fields = self.field_names.len();
        let mut totals = vec![0.0; num_fields];
        for row in self.field_length.values() {
            for (field_id, length) in row.iter().enumerate() {
                totals[field_id] += *length as f64;
            }
        }
        let count = self.document_count as f64;
        for field_id in 0..num_fields {
            self.avg_field_length[field_id] = if count > 0.0 {
                totals[field_id] / count
            } else {
                0.0
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> IndexStore {
        IndexStore::new(vec!["title".to_string(), "text".to_string()])
    }

    #[test]
    fn test_allocate_short_ids_are_monotonic() {
        let mut s = store();
        let a = s.allocate_short_id(DocumentId::from(1)).unwrap();
        let b = s.allocate_short_id(DocumentId::from(2)).unwrap();
        assert_eq!((a, b), (0, 1));
        assert_eq!(s.document_count, 2);
        assert_eq!(s.field_length.get(&a), Some(&vec![0, 0]));
    }

    #[test]
    fn test_allocate_duplicate_id_fails() {
        let mut s = store();
        s.allocate_short_id(DocumentId::from(1)).unwrap();
        let err = s.allocate_short_id(DocumentId::from(1)).unwrap_err();
        assert!(matches!(err, SlimSearchError::DuplicateId { .. }));
        // No partial mutation.
        assert_eq!(s.document_count, 1);
        assert_eq!(s.next_id, 1);
    }

    #[test]
    fn test_short_ids_not_reused_after_release() {
        let mut s = store();
        let a = s.allocate_short_id(DocumentId::from(1)).unwrap();
        s.drop_document(a);
        let b = s.allocate_short_id(DocumentId::from(1)).unwrap();
        assert!(b > a);
    }

    #[test]
    fn test_posting_lifecycle() {
        let mut s = store();
        let short = s.allocate_short_id(DocumentId::from(1)).unwrap();
        s.add_posting(short, 0, "whale");
        s.add_posting(short, 0, "whale");
        s.add_posting(short, 1, "whale");

        let postings = s.index.get("whale").unwrap();
        assert_eq!(postings[&0][&short], 2);
        assert_eq!(postings[&1][&short], 1);

        // First removal decrements, second deletes the field entry.
        assert!(s.remove_posting(short, 0, "whale"));
        assert_eq!(s.index.get("whale").unwrap()[&0][&short], 1);
        assert!(s.remove_posting(short, 0, "whale"));
        assert!(!s.index.get("whale").unwrap().contains_key(&0));

        // Removing the last posting removes the term itself.
        assert!(s.remove_posting(short, 1, "whale"));
        assert!(s.index.get("whale").is_none());
    }

    #[test]
    fn test_remove_posting_reports_missing_tuples() {
        let mut s = store();
        let short = s.allocate_short_id(DocumentId::from(1)).unwrap();
        assert!(!s.remove_posting(short, 0, "ghost"));
        s.add_posting(short, 0, "whale");
        assert!(!s.remove_posting(short, 1, "whale"));
        assert!(!s.remove_posting(99, 0, "whale"));
    }

    #[test]
    fn test_average_field_length_incremental() {
        let mut s = store();
        let a = s.allocate_short_id(DocumentId::from(1)).unwrap();
        s.set_field_length(a, 0, 2);
        assert_eq!(s.avg_field_length[0], 2.0);

        let b = s.allocate_short_id(DocumentId::from(2)).unwrap();
        s.set_field_length(b, 0, 6);
        assert_eq!(s.avg_field_length[0], 4.0);

        let c = s.allocate_short_id(DocumentId::from(3)).unwrap();
        s.set_field_length(c, 0, 7);
        assert_eq!(s.avg_field_length[0], 5.0);

        // Removing one restores the mean over the remaining documents.
        s.drop_document(b);
        assert!((s.avg_field_length[0] - 4.5).abs() < 1e-9);

        s.drop_document(a);
        s.drop_document(c);
        assert_eq!(s.avg_field_length[0], 0.0);
    }

    #[test]
    fn test_tombstone_accounting() {
        let mut s = store();
        let a = s.allocate_short_id(DocumentId::from(1)).unwrap();
        s.add_posting(a, 0, "whale");
        s.set_field_length(a, 0, 1);
        s.store_document(a, Document::new().with_text("title", "x"));

        s.tombstone(a);
        assert_eq!(s.document_count, 0);
        assert_eq!(s.dirt_count, 1);
        assert!(!s.is_live(a));
        assert!(s.field_length.get(&a).is_none());
        assert!(s.stored_fields.get(&a).is_none());
        // Postings survive until vacuum.
        assert!(s.index.get("whale").is_some());
        assert!((s.dirt_factor() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_sweep_and_finish_vacuum() {
        let mut s = store();
        let a = s.allocate_short_id(DocumentId::from(1)).unwrap();
        let b = s.allocate_short_id(DocumentId::from(2)).unwrap();
        s.add_posting(a, 0, "shared");
        s.add_posting(b, 0, "shared");
        s.add_posting(a, 0, "exclusive");
        s.set_field_length(a, 0, 2);
        s.set_field_length(b, 0, 1);

        s.tombstone(a);
        s.sweep_term("shared");
        s.sweep_term("exclusive");

        // The shared term keeps the live posting; the exclusive one is gone.
        assert_eq!(s.index.get("shared").unwrap()[&0].len(), 1);
        assert!(s.index.get("exclusive").is_none());

        s.finish_vacuum();
        assert_eq!(s.dirt_count, 0);
        assert_eq!(s.avg_field_length[0], 1.0);
    }
}
