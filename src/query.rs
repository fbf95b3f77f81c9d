//! Query expressions.
//!
//! A [`Query`] is a small tagged sum: free text, the wildcard matching every
//! live document, or a combination of subqueries merged with a
//! [`Combinator`]. Combinations nest arbitrarily and may override any
//! [`SearchOptions`](crate::options::SearchOptions) locally; unset options
//! inherit from the enclosing query.

use serde::{Deserialize, Serialize};

use crate::options::SearchOptions;

/// How per-term and per-subquery result sets are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Combinator {
    /// Union of the operands; scores are added.
    Or,
    /// Intersection of the operands; scores are added.
    And,
    /// Documents of the first operand absent from all others; scores are
    /// carried from the first operand.
    AndNot,
}

/// A search query expression.
#[derive(Debug, Clone, Default)]
pub enum Query {
    /// Free text, tokenized and processed with the indexing pipeline.
    Text(String),
    /// Matches every live document.
    #[default]
    Wildcard,
    /// A combination of subqueries.
    Combination(QueryCombination),
}

/// A combination node: subqueries plus local option overrides.
///
/// The node's `combine_with` (in its options) merges its children; any other
/// option set here applies to the children unless they override it again.
#[derive(Debug, Clone, Default)]
pub struct QueryCombination {
    /// The subqueries to combine.
    pub queries: Vec<Query>,
    /// Option overrides for this subtree.
    pub options: SearchOptions,
}

impl Query {
    /// Combine subqueries with the given combinator.
    pub fn combination(combinator: Combinator, queries: Vec<Query>) -> Self {
        Query::Combination(QueryCombination {
            queries,
            options: SearchOptions::new().combine_with(combinator),
        })
    }

    /// Combine subqueries with explicit option overrides.
    pub fn combination_with(queries: Vec<Query>, options: SearchOptions) -> Self {
        Query::Combination(QueryCombination { queries, options })
    }
}

impl From<&str> for Query {
    fn from(text: &str) -> Self {
        Query::Text(text.to_string())
    }
}

impl From<String> for Query {
    fn from(text: String) -> Self {
        Query::Text(text)
    }
}

impl From<QueryCombination> for Query {
    fn from(combination: QueryCombination) -> Self {
        Query::Combination(combination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_from_str() {
        let query: Query = "zen archery".into();
        assert!(matches!(query, Query::Text(t) if t == "zen archery"));
    }

    #[test]
    fn test_combination_builder() {
        let query = Query::combination(Combinator::AndNot, vec!["zen".into(), "archery".into()]);
        let Query::Combination(node) = query else {
            panic!("expected combination");
        };
        assert_eq!(node.queries.len(), 2);
        assert_eq!(node.options.combine_with, Some(Combinator::AndNot));
    }
}
