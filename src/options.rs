//! Construction and search options.
//!
//! [`IndexOptions`] configures a [`SearchIndex`](crate::engine::SearchIndex)
//! at construction time: the indexed fields, the stored-field projection,
//! the analysis hooks, auto-vacuum thresholds, and the default search and
//! auto-suggest options. [`SearchOptions`] is an overlay: every setting is
//! optional, and unset settings inherit from the enclosing query or the
//! index defaults, so nested query combinations can override options
//! locally.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::analysis::{
    FieldExtractor, Logger, TermProcessor, Tokenizer, default_extract_field, default_logger,
    default_process_term, default_tokenize,
};
use crate::error::{Result, SlimSearchError};
use crate::query::Combinator;
use crate::search::SearchResult;

/// Default weight applied to prefix-expanded candidates.
pub const DEFAULT_PREFIX_WEIGHT: f64 = 0.375;

/// Default weight applied to fuzzy-expanded candidates.
pub const DEFAULT_FUZZY_WEIGHT: f64 = 0.45;

/// Default cap on fuzzy edit distance.
pub const DEFAULT_MAX_FUZZY: usize = 6;

/// Predicate deciding whether a query term is prefix-expanded.
///
/// Receives the term, its position, and the full term list.
pub type PrefixPredicate = Arc<dyn Fn(&str, usize, &[String]) -> bool + Send + Sync>;

/// Function yielding the fuzziness factor for a query term (0 disables).
pub type FuzzyPredicate = Arc<dyn Fn(&str, usize, &[String]) -> f64 + Send + Sync>;

/// Post-combination result filter.
pub type SearchFilter = Arc<dyn Fn(&SearchResult) -> bool + Send + Sync>;

/// Per-document score multiplier; a non-positive result drops the document.
///
/// Receives the external id, the matched dictionary term (empty for
/// wildcard queries), and the stored fields if any.
pub type DocumentBooster = Arc<
    dyn Fn(&crate::data::DocumentId, &str, Option<&crate::data::Document>) -> f64 + Send + Sync,
>;

/// Per-query-term score multiplier.
///
/// Receives the term, its position, and the full term list.
pub type TermBooster = Arc<dyn Fn(&str, usize, &[String]) -> f64 + Send + Sync>;

/// BM25+ ranking parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bm25Params {
    /// Term-frequency saturation point.
    pub k: f64,
    /// Field-length normalization strength (0 = none, 1 = full).
    pub b: f64,
    /// Lower bound added to the normalized term frequency, preventing long
    /// documents from scoring zero.
    pub d: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Bm25Params {
            k: 1.2,
            b: 0.7,
            d: 0.5,
        }
    }
}

impl Bm25Params {
    fn validate(&self) -> Result<()> {
        if self.k < 0.0 || self.b < 0.0 || self.d < 0.0 {
            return Err(SlimSearchError::invalid_option(format!(
                "BM25 parameters must be non-negative (k={}, b={}, d={})",
                self.k, self.b, self.d
            )));
        }
        Ok(())
    }
}

/// Relative weights of the match strategies (exact matches weigh 1).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    /// Weight of prefix-expanded candidates.
    pub prefix: f64,
    /// Weight of fuzzy-expanded candidates.
    pub fuzzy: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Weights {
            prefix: DEFAULT_PREFIX_WEIGHT,
            fuzzy: DEFAULT_FUZZY_WEIGHT,
        }
    }
}

/// Whether and how query terms are prefix-expanded.
#[derive(Clone, Default)]
pub enum PrefixMode {
    /// No prefix expansion.
    #[default]
    Off,
    /// Expand every query term.
    On,
    /// Expand terms for which the predicate returns `true`.
    When(PrefixPredicate),
}

impl From<bool> for PrefixMode {
    fn from(enabled: bool) -> Self {
        if enabled { PrefixMode::On } else { PrefixMode::Off }
    }
}

impl fmt::Debug for PrefixMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrefixMode::Off => write!(f, "Off"),
            PrefixMode::On => write!(f, "On"),
            PrefixMode::When(_) => write!(f, "When(..)"),
        }
    }
}

/// Whether and how far query terms are fuzzy-expanded.
///
/// A factor below 1 is a fraction of the term length (rounded); a factor of
/// 1 or more is an absolute edit distance (truncated). Either is capped by
/// `max_fuzzy`.
#[derive(Clone, Default)]
pub enum FuzzyMode {
    /// No fuzzy expansion.
    #[default]
    Off,
    /// Fuzziness factor applied to every query term.
    Factor(f64),
    /// Per-term fuzziness factor (0 disables that term).
    When(FuzzyPredicate),
}

impl From<bool> for FuzzyMode {
    fn from(enabled: bool) -> Self {
        if enabled {
            FuzzyMode::Factor(0.2)
        } else {
            FuzzyMode::Off
        }
    }
}

impl From<f64> for FuzzyMode {
    fn from(factor: f64) -> Self {
        if factor > 0.0 {
            FuzzyMode::Factor(factor)
        } else {
            FuzzyMode::Off
        }
    }
}

impl fmt::Debug for FuzzyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FuzzyMode::Off => write!(f, "Off"),
            FuzzyMode::Factor(factor) => write!(f, "Factor({factor})"),
            FuzzyMode::When(_) => write!(f, "When(..)"),
        }
    }
}

/// Search-time options.
///
/// Every field is optional: an unset field inherits from the enclosing
/// query combination, and ultimately from the index's default
/// `search_options`. Built fluently:
///
/// ```
/// use slimsearch::{Combinator, SearchOptions};
///
/// let options = SearchOptions::new()
///     .prefix(true)
///     .fuzzy(0.2)
///     .combine_with(Combinator::And)
///     .boost("title", 2.0);
/// ```
#[derive(Clone, Default)]
pub struct SearchOptions {
    /// Subset of declared fields to search.
    pub fields: Option<Vec<String>>,
    /// How per-term (and per-subquery) results are combined.
    pub combine_with: Option<Combinator>,
    /// Prefix expansion mode.
    pub prefix: Option<PrefixMode>,
    /// Fuzzy expansion mode.
    pub fuzzy: Option<FuzzyMode>,
    /// Cap on fuzzy edit distance.
    pub max_fuzzy: Option<usize>,
    /// Strategy weights.
    pub weights: Option<Weights>,
    /// Per-field score multipliers.
    pub boost: Option<HashMap<String, f64>>,
    /// BM25+ parameters.
    pub bm25: Option<Bm25Params>,
    /// Post-combination result filter.
    pub filter: Option<SearchFilter>,
    /// Per-document score multiplier.
    pub boost_document: Option<DocumentBooster>,
    /// Per-query-term score multiplier.
    pub boost_term: Option<TermBooster>,
}

impl SearchOptions {
    /// Create an empty option overlay (inherits everything).
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict the search to a subset of the declared fields.
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Set the combinator used to merge per-term and per-subquery results.
    pub fn combine_with(mut self, combinator: Combinator) -> Self {
        self.combine_with = Some(combinator);
        self
    }

    /// Set the prefix expansion mode (`true`, `false`, or a [`PrefixMode`]).
    pub fn prefix(mut self, mode: impl Into<PrefixMode>) -> Self {
        self.prefix = Some(mode.into());
        self
    }

    /// Prefix-expand only terms for which the predicate returns `true`.
    pub fn prefix_when(
        mut self,
        predicate: impl Fn(&str, usize, &[String]) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.prefix = Some(PrefixMode::When(Arc::new(predicate)));
        self
    }

    /// Set the fuzzy expansion mode (`true`, a factor, or a [`FuzzyMode`]).
    pub fn fuzzy(mut self, mode: impl Into<FuzzyMode>) -> Self {
        self.fuzzy = Some(mode.into());
        self
    }

    /// Derive the fuzziness factor per term (return 0 to disable a term).
    pub fn fuzzy_when(
        mut self,
        predicate: impl Fn(&str, usize, &[String]) -> f64 + Send + Sync + 'static,
    ) -> Self {
        self.fuzzy = Some(FuzzyMode::When(Arc::new(predicate)));
        self
    }

    /// Cap the fuzzy edit distance.
    pub fn max_fuzzy(mut self, max_fuzzy: usize) -> Self {
        self.max_fuzzy = Some(max_fuzzy);
        self
    }

    /// Set the strategy weights.
    pub fn weights(mut self, weights: Weights) -> Self {
        self.weights = Some(weights);
        self
    }

    /// Multiply scores of matches in `field` by `factor`.
    pub fn boost(mut self, field: impl Into<String>, factor: f64) -> Self {
        self.boost
            .get_or_insert_with(HashMap::new)
            .insert(field.into(), factor);
        self
    }

    /// Set the BM25+ parameters.
    pub fn bm25(mut self, params: Bm25Params) -> Self {
        self.bm25 = Some(params);
        self
    }

    /// Keep only results for which the predicate returns `true`.
    pub fn filter(
        mut self,
        predicate: impl Fn(&SearchResult) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.filter = Some(Arc::new(predicate));
        self
    }

    /// Multiply each result's score by a per-document factor; a non-positive
    /// factor drops the document.
    pub fn boost_document(
        mut self,
        booster: impl Fn(&crate::data::DocumentId, &str, Option<&crate::data::Document>) -> f64
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.boost_document = Some(Arc::new(booster));
        self
    }

    /// Multiply each query term's contribution by a per-term factor.
    pub fn boost_term(
        mut self,
        booster: impl Fn(&str, usize, &[String]) -> f64 + Send + Sync + 'static,
    ) -> Self {
        self.boost_term = Some(Arc::new(booster));
        self
    }

    /// Overlay `over` on top of `self`: set fields of `over` win.
    pub(crate) fn overlaid(&self, over: &SearchOptions) -> SearchOptions {
        SearchOptions {
            fields: over.fields.clone().or_else(|| self.fields.clone()),
            combine_with: over.combine_with.or(self.combine_with),
            prefix: over.prefix.clone().or_else(|| self.prefix.clone()),
            fuzzy: over.fuzzy.clone().or_else(|| self.fuzzy.clone()),
            max_fuzzy: over.max_fuzzy.or(self.max_fuzzy),
            weights: over.weights.or(self.weights),
            boost: over.boost.clone().or_else(|| self.boost.clone()),
            bm25: over.bm25.or(self.bm25),
            filter: over.filter.clone().or_else(|| self.filter.clone()),
            boost_document: over
                .boost_document
                .clone()
                .or_else(|| self.boost_document.clone()),
            boost_term: over.boost_term.clone().or_else(|| self.boost_term.clone()),
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if let Some(bm25) = &self.bm25 {
            bm25.validate()?;
        }
        Ok(())
    }
}

impl fmt::Debug for SearchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchOptions")
            .field("fields", &self.fields)
            .field("combine_with", &self.combine_with)
            .field("prefix", &self.prefix)
            .field("fuzzy", &self.fuzzy)
            .field("max_fuzzy", &self.max_fuzzy)
            .field("weights", &self.weights)
            .field("boost", &self.boost)
            .field("bm25", &self.bm25)
            .finish()
    }
}

/// Options for a single vacuum pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VacuumOptions {
    /// Terms swept per write-lock acquisition.
    pub batch_size: usize,
    /// Pause between batches.
    pub batch_wait: Duration,
}

impl Default for VacuumOptions {
    fn default() -> Self {
        VacuumOptions {
            batch_size: 1000,
            batch_wait: Duration::from_millis(10),
        }
    }
}

/// Thresholds a vacuum request must meet before a pass starts.
///
/// A pass is skipped when `dirt_count < min_dirt_count` **or**
/// `dirt_factor < min_dirt_factor`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VacuumConditions {
    /// Minimum number of tombstoned documents.
    pub min_dirt_count: u32,
    /// Minimum dirt factor (`dirt / (1 + docs + dirt)`).
    pub min_dirt_factor: f64,
}

impl VacuumConditions {
    /// Conditions that always hold (used by explicit vacuum requests).
    pub(crate) fn always() -> Self {
        VacuumConditions {
            min_dirt_count: 0,
            min_dirt_factor: 0.0,
        }
    }

    /// Fold another request into this one, keeping the most permissive
    /// threshold on each axis.
    pub(crate) fn fold_min(&mut self, other: &VacuumConditions) {
        self.min_dirt_count = self.min_dirt_count.min(other.min_dirt_count);
        self.min_dirt_factor = self.min_dirt_factor.min(other.min_dirt_factor);
    }
}

/// Automatic vacuum configuration, evaluated on every `discard`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutoVacuumOptions {
    /// Terms swept per write-lock acquisition.
    pub batch_size: usize,
    /// Pause between batches.
    pub batch_wait: Duration,
    /// Minimum number of tombstoned documents before a pass is triggered.
    pub min_dirt_count: u32,
    /// Minimum dirt factor before a pass is triggered.
    pub min_dirt_factor: f64,
}

impl Default for AutoVacuumOptions {
    fn default() -> Self {
        AutoVacuumOptions {
            batch_size: 1000,
            batch_wait: Duration::from_millis(10),
            min_dirt_count: 20,
            min_dirt_factor: 0.1,
        }
    }
}

impl AutoVacuumOptions {
    pub(crate) fn split(&self) -> (VacuumOptions, VacuumConditions) {
        (
            VacuumOptions {
                batch_size: self.batch_size,
                batch_wait: self.batch_wait,
            },
            VacuumConditions {
                min_dirt_count: self.min_dirt_count,
                min_dirt_factor: self.min_dirt_factor,
            },
        )
    }
}

/// Configuration for a search index, created via [`IndexOptions::builder`].
#[derive(Clone)]
pub struct IndexOptions {
    /// Names of the indexed fields, in declaration order.
    pub fields: Vec<String>,
    /// Names of the fields returned alongside search hits.
    pub store_fields: Vec<String>,
    /// Name of the field holding the external document id.
    pub id_field: String,
    /// Field extraction hook.
    pub extract_field: FieldExtractor,
    /// Tokenization hook.
    pub tokenize: Tokenizer,
    /// Term processing hook.
    pub process_term: TermProcessor,
    /// Diagnostics hook.
    pub logger: Logger,
    /// Automatic vacuum configuration; `None` disables auto-vacuum.
    pub auto_vacuum: Option<AutoVacuumOptions>,
    /// Default options applied to every search.
    pub search_options: SearchOptions,
    /// Default options applied to every auto-suggestion (overlaid on
    /// `search_options`; prefix and fuzzy matching default to enabled).
    pub auto_suggest_options: SearchOptions,
}

impl IndexOptions {
    /// Start building index options for the given indexed fields.
    pub fn builder() -> IndexOptionsBuilder {
        IndexOptionsBuilder::default()
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.fields.is_empty() {
            return Err(SlimSearchError::invalid_option(
                "at least one indexed field is required",
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for field in &self.fields {
            if !seen.insert(field.as_str()) {
                return Err(SlimSearchError::invalid_option(format!(
                    "field '{field}' declared more than once"
                )));
            }
        }
        self.search_options.validate()?;
        self.auto_suggest_options.validate()?;
        Ok(())
    }
}

impl fmt::Debug for IndexOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexOptions")
            .field("fields", &self.fields)
            .field("store_fields", &self.store_fields)
            .field("id_field", &self.id_field)
            .field("auto_vacuum", &self.auto_vacuum)
            .field("search_options", &self.search_options)
            .field("auto_suggest_options", &self.auto_suggest_options)
            .finish()
    }
}

/// Builder for [`IndexOptions`].
pub struct IndexOptionsBuilder {
    fields: Vec<String>,
    store_fields: Vec<String>,
    id_field: String,
    extract_field: FieldExtractor,
    tokenize: Tokenizer,
    process_term: TermProcessor,
    logger: Logger,
    auto_vacuum: Option<AutoVacuumOptions>,
    search_options: SearchOptions,
    auto_suggest_options: Option<SearchOptions>,
}

impl Default for IndexOptionsBuilder {
    fn default() -> Self {
        IndexOptionsBuilder {
            fields: Vec::new(),
            store_fields: Vec::new(),
            id_field: "id".to_string(),
            extract_field: default_extract_field(),
            tokenize: default_tokenize(),
            process_term: default_process_term(),
            logger: default_logger(),
            auto_vacuum: Some(AutoVacuumOptions::default()),
            search_options: SearchOptions::default(),
            auto_suggest_options: None,
        }
    }
}

impl IndexOptionsBuilder {
    /// Declare the indexed fields, in order.
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Declare the fields returned alongside search hits.
    pub fn store_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.store_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Name the field holding the external document id (default `"id"`).
    pub fn id_field(mut self, field: impl Into<String>) -> Self {
        self.id_field = field.into();
        self
    }

    /// Replace the field extraction hook.
    pub fn extract_field(
        mut self,
        extract: impl Fn(&crate::data::Document, &str) -> Option<crate::data::DataValue>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.extract_field = Arc::new(extract);
        self
    }

    /// Replace the tokenizer.
    pub fn tokenize(
        mut self,
        tokenize: impl Fn(&str, Option<&str>) -> Vec<String> + Send + Sync + 'static,
    ) -> Self {
        self.tokenize = Arc::new(tokenize);
        self
    }

    /// Replace the term processor.
    pub fn process_term(
        mut self,
        process: impl Fn(&str, Option<&str>) -> crate::analysis::Processed + Send + Sync + 'static,
    ) -> Self {
        self.process_term = Arc::new(process);
        self
    }

    /// Replace the logger hook.
    pub fn logger(
        mut self,
        logger: impl Fn(crate::analysis::LogLevel, &str, Option<&str>) + Send + Sync + 'static,
    ) -> Self {
        self.logger = Arc::new(logger);
        self
    }

    /// Configure automatic vacuuming; `None` disables it.
    pub fn auto_vacuum(mut self, options: Option<AutoVacuumOptions>) -> Self {
        self.auto_vacuum = options;
        self
    }

    /// Set default search options.
    pub fn search_options(mut self, options: SearchOptions) -> Self {
        self.search_options = options;
        self
    }

    /// Set default auto-suggest options.
    pub fn auto_suggest_options(mut self, options: SearchOptions) -> Self {
        self.auto_suggest_options = Some(options);
        self
    }

    /// Validate and build the options.
    pub fn build(self) -> Result<IndexOptions> {
        // Auto-suggestions default to prefix and fuzzy matching unless the
        // caller overrode them.
        let auto_suggest_options = self.auto_suggest_options.unwrap_or_else(|| {
            SearchOptions::new().prefix(true).fuzzy(true)
        });
        let options = IndexOptions {
            fields: self.fields,
            store_fields: self.store_fields,
            id_field: self.id_field,
            extract_field: self.extract_field,
            tokenize: self.tokenize,
            process_term: self.process_term,
            logger: self.logger,
            auto_vacuum: self.auto_vacuum,
            search_options: self.search_options,
            auto_suggest_options,
        };
        options.validate()?;
        Ok(options)
    }
}
