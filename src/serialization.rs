//! JSON serialization of the index state.
//!
//! The dump is a single JSON record (format version 2) holding the id maps,
//! field tables, stored fields, dirt counter, and the inverted index as an
//! ordered list of `[term, postings]` pairs. Version-1 dumps, which nested
//! each posting map inside a `ds` field, are accepted through a
//! compatibility path that rebuilds the postings and resets the dirt
//! counter (its value is unknown in that format).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::data::{Document, DocumentId};
use crate::dictionary::RadixMap;
use crate::error::{Result, SlimSearchError};
use crate::store::{FieldPostings, IndexStore};

/// Current dump format version.
pub(crate) const SERIALIZATION_VERSION: u64 = 2;

/// The on-wire shape of a serialized index.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SerializedIndex {
    pub(crate) document_count: u32,
    pub(crate) next_id: u32,
    pub(crate) document_ids: BTreeMap<u32, DocumentId>,
    pub(crate) field_ids: BTreeMap<String, u16>,
    pub(crate) field_length: BTreeMap<u32, Vec<u32>>,
    pub(crate) average_field_length: Vec<f64>,
    pub(crate) stored_fields: BTreeMap<u32, Document>,
    #[serde(default)]
    pub(crate) dirt_count: u32,
    pub(crate) version: u64,
    /// Ordered `[term, {fieldId: postings}]` pairs. Postings are kept as raw
    /// JSON values so that both format versions share one shape.
    pub(crate) index: Vec<(String, BTreeMap<u16, Value>)>,
}

#[derive(Debug, Deserialize)]
struct VersionProbe {
    #[serde(default)]
    version: u64,
}

/// Serialize a store to a version-2 JSON string.
pub(crate) fn to_json(store: &IndexStore) -> Result<String> {
    let mut index = Vec::with_capacity(store.index.len());
    for (term, postings) in store.index.iter() {
        let mut fields: BTreeMap<u16, Value> = BTreeMap::new();
        for (&field_id, docs) in postings {
            let ordered: BTreeMap<u32, u32> = docs.iter().map(|(&d, &f)| (d, f)).collect();
            fields.insert(field_id, serde_json::to_value(ordered)?);
        }
        index.push((term, fields));
    }

    let serialized = SerializedIndex {
        document_count: store.document_count,
        next_id: store.next_id,
        document_ids: store
            .document_ids
            .iter()
            .map(|(&short_id, external_id)| (short_id, external_id.clone()))
            .collect(),
        field_ids: store
            .field_names
            .iter()
            .enumerate()
            .map(|(field_id, name)| (name.clone(), field_id as u16))
            .collect(),
        field_length: store
            .field_length
            .iter()
            .map(|(&short_id, row)| (short_id, row.clone()))
            .collect(),
        average_field_length: store.avg_field_length.clone(),
        stored_fields: store
            .stored_fields
            .iter()
            .map(|(&short_id, doc)| (short_id, doc.clone()))
            .collect(),
        dirt_count: store.dirt_count,
        version: SERIALIZATION_VERSION,
        index,
    };
    Ok(serde_json::to_string(&serialized)?)
}

/// Parse a JSON dump, checking the format version before anything else.
pub(crate) fn parse(json: &str) -> Result<SerializedIndex> {
    let probe: VersionProbe = serde_json::from_str(json)?;
    if probe.version != 1 && probe.version != SERIALIZATION_VERSION {
        return Err(SlimSearchError::IncompatibleVersion {
            version: probe.version,
        });
    }
    Ok(serde_json::from_str(json)?)
}

impl SerializedIndex {
    /// Rebuild everything except the inverted index, returning the store
    /// shell and the raw index entries left to insert.
    pub(crate) fn into_parts(self) -> (IndexStore, Vec<(String, BTreeMap<u16, Value>)>, bool) {
        let is_v1 = self.version == 1;
        let mut field_names: Vec<(String, u16)> = self.field_ids.into_iter().collect();
        field_names.sort_by_key(|(_, field_id)| *field_id);
        let field_names: Vec<String> = field_names.into_iter().map(|(name, _)| name).collect();

        let mut store = IndexStore::new(field_names);
        store.document_count = self.document_count;
        store.next_id = self.next_id;
        // The dirt counter is unknown in version-1 dumps.
        store.dirt_count = if is_v1 { 0 } else { self.dirt_count };
        store.avg_field_length = self.average_field_length;
        for (short_id, external_id) in self.document_ids {
            store.id_to_short.insert(external_id.clone(), short_id);
            store.document_ids.insert(short_id, external_id);
        }
        for (short_id, row) in self.field_length {
            store.field_length.insert(short_id, row);
        }
        for (short_id, doc) in self.stored_fields {
            store.stored_fields.insert(short_id, doc);
        }
        (store, self.index, is_v1)
    }
}

/// Decode one serialized posting entry into the in-memory form.
pub(crate) fn decode_postings(
    fields: BTreeMap<u16, Value>,
    is_v1: bool,
) -> Result<FieldPostings> {
    let mut postings = FieldPostings::new();
    for (field_id, value) in fields {
        // Version 1 nested the posting map inside a `ds` field.
        let value = if is_v1 {
            match value {
                Value::Object(mut entry) => entry.remove("ds").unwrap_or(Value::Null),
                other => other,
            }
        } else {
            value
        };
        if value.is_null() {
            continue;
        }
        let docs: crate::store::DocPostings = serde_json::from_value(value)?;
        if !docs.is_empty() {
            postings.insert(field_id, docs);
        }
    }
    Ok(postings)
}

/// Rebuild a full store from a parsed dump (synchronous path).
pub(crate) fn into_store(serialized: SerializedIndex) -> Result<IndexStore> {
    let (mut store, entries, is_v1) = serialized.into_parts();
    let mut index = RadixMap::new();
    for (term, fields) in entries {
        let postings = decode_postings(fields, is_v1)?;
        if !postings.is_empty() {
            index.insert(&term, postings);
        }
    }
    store.index = index;
    Ok(store)
}
