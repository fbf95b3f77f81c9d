//! Query execution and BM25+ scoring.
//!
//! A query is executed in three stages. Each query term is first expanded
//! into candidate dictionary terms via exact, prefix, and fuzzy lookup in
//! the radix tree, keeping the best-weighted candidate per dictionary term.
//! Candidates are then scored with BM25+ against the inverted index,
//! producing one score map per query term. Finally the per-term maps are
//! merged with the effective combinator (OR/AND/AND_NOT), document boosts
//! and filters are applied, and results are ordered by descending score.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use ahash::AHashMap;
use ahash::AHashSet;

use crate::analysis::run_pipeline;
use crate::data::{Document, DocumentId};
use crate::error::{Result, SlimSearchError};
use crate::options::{
    DEFAULT_MAX_FUZZY, FuzzyMode, IndexOptions, PrefixMode, SearchOptions, Weights,
};
use crate::query::{Combinator, Query};
use crate::store::IndexStore;

/// Lower bound on the inverse document frequency, keeping scores positive
/// even for terms present in most documents.
const MIN_IDF: f64 = 1e-10;

/// Damping applied per unit of candidate distance (prefix length surplus or
/// fuzzy edit distance).
const DISTANCE_DAMPING: f64 = 0.333;

/// A single search hit.
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// External id of the matched document.
    pub id: DocumentId,
    /// Relevance score (non-negative, finite).
    pub score: f64,
    /// Matched dictionary terms, in lexicographic order.
    pub terms: Vec<String>,
    /// Query terms that produced at least one match for this document.
    pub query_terms: Vec<String>,
    /// Matched dictionary term → sorted names of the fields it appeared in.
    pub match_info: BTreeMap<String, Vec<String>>,
    /// Stored-field projection of the document (empty if none configured).
    pub stored: Document,
}

/// Accumulated per-document state while a query executes.
#[derive(Debug, Clone, Default)]
struct RawScore {
    score: f64,
    query_terms: Vec<String>,
    match_info: BTreeMap<String, Vec<String>>,
    /// Query-term position → best-scoring expansion at that position, used
    /// to assemble auto-suggestion phrases.
    expansions: BTreeMap<usize, (String, f64)>,
}

type RawResults = AHashMap<u32, RawScore>;

/// One candidate dictionary term produced by expanding a query term.
#[derive(Debug, Clone, PartialEq)]
struct Candidate {
    term: String,
    weight: f64,
    distance: usize,
}

impl Candidate {
    /// Per-candidate score used when the same dictionary term is reached by
    /// several strategies; the best one is kept.
    fn strength(&self) -> f64 {
        self.weight / (1.0 + DISTANCE_DAMPING * self.distance as f64)
    }
}

/// Executes queries against a store snapshot.
pub(crate) struct QueryExecutor<'a> {
    pub(crate) store: &'a IndexStore,
    pub(crate) options: &'a IndexOptions,
}

impl<'a> QueryExecutor<'a> {
    /// Execute a query with the given option overrides on top of the index
    /// defaults, returning ordered results.
    pub(crate) fn search(
        &self,
        query: &Query,
        overrides: &SearchOptions,
    ) -> Result<Vec<SearchResult>> {
        let effective = self.options.search_options.overlaid(overrides);
        effective.validate()?;
        self.validate_fields(&effective)?;
        let raw = self.execute(query, &effective)?;
        Ok(self
            .finalize(raw, &effective)
            .into_iter()
            .map(|(_, result)| result)
            .collect())
    }

    /// Check that every field referenced by the options was declared.
    fn validate_fields(&self, options: &SearchOptions) -> Result<()> {
        if let Some(fields) = &options.fields {
            for field in fields {
                if self.store.field_id(field).is_none() {
                    return Err(SlimSearchError::missing_field(field));
                }
            }
        }
        if let Some(boost) = &options.boost {
            for field in boost.keys() {
                if self.store.field_id(field).is_none() {
                    return Err(SlimSearchError::missing_field(field));
                }
            }
        }
        Ok(())
    }

    fn execute(&self, query: &Query, effective: &SearchOptions) -> Result<RawResults> {
        match query {
            Query::Wildcard => Ok(self.execute_wildcard()),
            Query::Text(text) => {
                let (_, terms) = run_pipeline(
                    &self.options.tokenize,
                    &self.options.process_term,
                    text,
                    None,
                );
                let per_term: Vec<RawResults> = terms
                    .iter()
                    .enumerate()
                    .map(|(position, term)| self.execute_term(term, position, &terms, effective))
                    .collect();
                Ok(combine(per_term, combinator_of(effective)))
            }
            Query::Combination(node) => {
                let local = effective.overlaid(&node.options);
                self.validate_fields(&local)?;
                let per_child: Result<Vec<RawResults>> = node
                    .queries
                    .iter()
                    .map(|child| self.execute(child, &local))
                    .collect();
                Ok(combine(per_child?, combinator_of(&local)))
            }
        }
    }

    /// Wildcard: one entry per live document, scored 1 before boosting.
    fn execute_wildcard(&self) -> RawResults {
        self.store
            .document_ids
            .keys()
            .map(|&short_id| {
                (
                    short_id,
                    RawScore {
                        score: 1.0,
                        ..RawScore::default()
                    },
                )
            })
            .collect()
    }

    /// Expand one query term and score its candidates.
    fn execute_term(
        &self,
        term: &str,
        position: usize,
        terms: &[String],
        options: &SearchOptions,
    ) -> RawResults {
        let weights = options.weights.unwrap_or_default();
        let candidates = self.expand_term(term, position, terms, options, &weights);

        let term_boost = options
            .boost_term
            .as_ref()
            .map(|boost| boost(term, position, terms))
            .unwrap_or(1.0);

        let mut results = RawResults::new();
        for candidate in candidates.values() {
            self.score_candidate(candidate, term, position, term_boost, options, &mut results);
        }
        results
    }

    /// Produce the candidate set for a query term, deduplicated by
    /// dictionary term with the strongest strategy winning.
    fn expand_term(
        &self,
        term: &str,
        position: usize,
        terms: &[String],
        options: &SearchOptions,
        weights: &Weights,
    ) -> BTreeMap<String, Candidate> {
        let mut candidates: BTreeMap<String, Candidate> = BTreeMap::new();
        let mut offer = |candidate: Candidate| match candidates.get(&candidate.term) {
            Some(existing) if existing.strength() >= candidate.strength() => {}
            _ => {
                candidates.insert(candidate.term.clone(), candidate);
            }
        };

        if self.store.index.contains_key(term) {
            offer(Candidate {
                term: term.to_string(),
                weight: 1.0,
                distance: 0,
            });
        }

        let prefix_enabled = match options.prefix.as_ref().unwrap_or(&PrefixMode::Off) {
            PrefixMode::Off => false,
            PrefixMode::On => true,
            PrefixMode::When(predicate) => predicate(term, position, terms),
        };
        if prefix_enabled {
            let term_chars = term.chars().count();
            for (key, _) in self.store.index.iter_prefix(term) {
                if key == term {
                    continue;
                }
                let distance = key.chars().count() - term_chars;
                offer(Candidate {
                    term: key,
                    weight: weights.prefix,
                    distance,
                });
            }
        }

        let fuzzy_factor = match options.fuzzy.as_ref().unwrap_or(&FuzzyMode::Off) {
            FuzzyMode::Off => 0.0,
            FuzzyMode::Factor(factor) => *factor,
            FuzzyMode::When(predicate) => predicate(term, position, terms),
        };
        if fuzzy_factor > 0.0 {
            let max_fuzzy = options.max_fuzzy.unwrap_or(DEFAULT_MAX_FUZZY);
            let max_distance = max_edit_distance(fuzzy_factor, term.chars().count(), max_fuzzy);
            if max_distance > 0 {
                for (key, _, distance) in self.store.index.fuzzy(term, max_distance) {
                    if distance == 0 {
                        continue;
                    }
                    offer(Candidate {
                        term: key,
                        weight: weights.fuzzy,
                        distance,
                    });
                }
            }
        }

        candidates
    }

    /// Score one candidate term against every matching posting, folding the
    /// contributions into the per-document results.
    fn score_candidate(
        &self,
        candidate: &Candidate,
        source_term: &str,
        position: usize,
        term_boost: f64,
        options: &SearchOptions,
        results: &mut RawResults,
    ) {
        let Some(postings) = self.store.index.get(&candidate.term) else {
            return;
        };
        let bm25 = options.bm25.unwrap_or_default();
        let edit_weight = 1.0 / (1.0 + DISTANCE_DAMPING * candidate.distance as f64);

        // Distinct documents containing the term, across all fields.
        let mut matching: AHashSet<u32> = AHashSet::new();
        for docs in postings.values() {
            matching.extend(docs.keys());
        }
        let doc_freq = matching.len() as f64;
        let total_docs = self.store.document_count as f64;
        let idf = (((total_docs - doc_freq + 0.5) / (doc_freq + 0.5)).ln()).max(MIN_IDF);

        let declared = &self.store.field_names;
        let search_fields: Vec<&String> = match &options.fields {
            Some(fields) => declared.iter().filter(|f| fields.contains(*f)).collect(),
            None => declared.iter().collect(),
        };

        for field_name in search_fields {
            let Some(field_id) = self.store.field_id(field_name) else {
                continue;
            };
            let Some(docs) = postings.get(&field_id) else {
                continue;
            };
            let field_boost = options
                .boost
                .as_ref()
                .and_then(|boost| boost.get(field_name))
                .copied()
                .unwrap_or(1.0);
            let avg_length = self.store.avg_field_length[field_id as usize];

            for (&short_id, &term_freq) in docs {
                if !self.store.is_live(short_id) {
                    continue;
                }
                let field_length = self
                    .store
                    .field_length
                    .get(&short_id)
                    .map(|row| row[field_id as usize])
                    .unwrap_or(0);
                let length_ratio = if avg_length > 0.0 {
                    field_length as f64 / avg_length
                } else {
                    1.0
                };
                let tf = term_freq as f64;
                let tf_norm = tf * (bm25.k + 1.0)
                    / (bm25.k + tf * (1.0 - bm25.b + bm25.b * length_ratio))
                    + bm25.d;
                let contribution =
                    idf * tf_norm * field_boost * candidate.weight * edit_weight * term_boost;

                let entry = results.entry(short_id).or_default();
                entry.score += contribution;
                if !entry.query_terms.iter().any(|t| t == source_term) {
                    entry.query_terms.push(source_term.to_string());
                }
                let fields = entry.match_info.entry(candidate.term.clone()).or_default();
                if !fields.iter().any(|f| f == field_name) {
                    fields.push(field_name.clone());
                }
                match entry.expansions.get(&position) {
                    Some((_, best)) if *best >= contribution => {}
                    _ => {
                        entry
                            .expansions
                            .insert(position, (candidate.term.clone(), contribution));
                    }
                }
            }
        }
    }

    /// Convert raw results into ordered [`SearchResult`]s: document boost,
    /// recall scaling, filtering, and the final sort.
    fn finalize(&self, raw: RawResults, options: &SearchOptions) -> Vec<(u32, SearchResult)> {
        let mut scored: Vec<(u32, SearchResult)> = Vec::with_capacity(raw.len());
        for (short_id, mut entry) in raw {
            let Some(external_id) = self.store.external_id_of(short_id) else {
                continue;
            };
            let stored = self.store.stored_fields.get(&short_id);

            let mut score = entry.score;
            if let Some(boost_document) = &options.boost_document {
                let best_term = entry
                    .expansions
                    .values()
                    .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
                    .map(|(term, _)| term.as_str())
                    .unwrap_or("");
                let factor = boost_document(external_id, best_term, stored);
                if factor <= 0.0 {
                    continue;
                }
                score *= factor;
            }
            // Reward results matching more of the query's distinct terms.
            score *= entry.query_terms.len().max(1) as f64;

            for fields in entry.match_info.values_mut() {
                fields.sort_unstable();
            }
            let result = SearchResult {
                id: external_id.clone(),
                score,
                terms: entry.match_info.keys().cloned().collect(),
                query_terms: entry.query_terms,
                match_info: entry.match_info,
                stored: stored.cloned().unwrap_or_default(),
            };
            if let Some(filter) = &options.filter
                && !filter(&result)
            {
                continue;
            }
            scored.push((short_id, result));
        }
        scored.sort_by(|a, b| {
            b.1.score
                .partial_cmp(&a.1.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored
    }

    /// Per-result suggestion phrases for the auto-suggest layer: the winning
    /// expansion at each query-term position joined by spaces, paired with
    /// the result's final score.
    pub(crate) fn suggestion_phrases(
        &self,
        query: &str,
        overrides: &SearchOptions,
    ) -> Result<Vec<(String, f64)>> {
        let effective = self.options.search_options.overlaid(overrides);
        effective.validate()?;
        self.validate_fields(&effective)?;
        let raw = self.execute(&Query::Text(query.to_string()), &effective)?;

        let mut phrase_of: AHashMap<u32, String> = AHashMap::with_capacity(raw.len());
        for (&short_id, entry) in &raw {
            if entry.expansions.is_empty() {
                continue;
            }
            let parts: Vec<&str> = entry
                .expansions
                .values()
                .map(|(term, _)| term.as_str())
                .collect();
            phrase_of.insert(short_id, parts.join(" "));
        }

        let results = self.finalize(raw, &effective);
        Ok(results
            .into_iter()
            .filter_map(|(short_id, result)| {
                phrase_of
                    .remove(&short_id)
                    .map(|phrase| (phrase, result.score))
            })
            .collect())
    }
}

/// Effective combinator of a (possibly partial) option set.
fn combinator_of(options: &SearchOptions) -> Combinator {
    options.combine_with.unwrap_or(Combinator::Or)
}

/// Maximum edit distance for a fuzzy factor: a fraction of the term length
/// when below 1, an absolute distance otherwise, capped by `max_fuzzy`.
fn max_edit_distance(factor: f64, term_length: usize, max_fuzzy: usize) -> usize {
    let distance = if factor < 1.0 {
        (factor * term_length as f64).round() as usize
    } else {
        factor.floor() as usize
    };
    distance.min(max_fuzzy)
}

/// Merge per-operand result maps.
fn combine(maps: Vec<RawResults>, combinator: Combinator) -> RawResults {
    let mut iter = maps.into_iter();
    let Some(mut acc) = iter.next() else {
        return RawResults::new();
    };
    match combinator {
        Combinator::Or => {
            for map in iter {
                for (short_id, entry) in map {
                    merge_into(acc.entry(short_id).or_default(), entry);
                }
            }
        }
        Combinator::And => {
            for map in iter {
                acc.retain(|short_id, _| map.contains_key(short_id));
                for (short_id, entry) in map {
                    if let Some(existing) = acc.get_mut(&short_id) {
                        merge_into(existing, entry);
                    }
                }
            }
        }
        Combinator::AndNot => {
            for map in iter {
                for short_id in map.keys() {
                    acc.remove(short_id);
                }
            }
        }
    }
    acc
}

fn merge_into(target: &mut RawScore, source: RawScore) {
    target.score += source.score;
    for term in source.query_terms {
        if !target.query_terms.contains(&term) {
            target.query_terms.push(term);
        }
    }
    for (derived, fields) in source.match_info {
        let entry = target.match_info.entry(derived).or_default();
        for field in fields {
            if !entry.contains(&field) {
                entry.push(field);
            }
        }
    }
    for (position, (term, score)) in source.expansions {
        match target.expansions.get(&position) {
            Some((_, best)) if *best >= score => {}
            _ => {
                target.expansions.insert(position, (term, score));
            }
        }
    }
}
