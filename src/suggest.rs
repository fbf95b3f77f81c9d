//! Auto-suggestion support.
//!
//! Suggestions are produced by running a prefix+fuzzy search over the query
//! and regrouping the results by the phrase their matched terms expand to:
//! for each result, the winning expansion at every query-term position is
//! concatenated into a candidate phrase, scores of results sharing a phrase
//! are summed, and phrases are returned best-first.

use std::collections::HashMap;

/// A suggested completion of a search query.
#[derive(Debug, Clone, PartialEq)]
pub struct Suggestion {
    /// The suggested phrase.
    pub suggestion: String,
    /// The phrase split into terms.
    pub terms: Vec<String>,
    /// Combined score of the results that produced this phrase.
    pub score: f64,
}

/// Group per-result phrases into ranked suggestions.
pub(crate) fn group_suggestions(phrases: Vec<(String, f64)>) -> Vec<Suggestion> {
    let mut grouped: HashMap<String, f64> = HashMap::new();
    for (phrase, score) in phrases {
        *grouped.entry(phrase).or_insert(0.0) += score;
    }
    let mut suggestions: Vec<Suggestion> = grouped
        .into_iter()
        .map(|(suggestion, score)| Suggestion {
            terms: suggestion.split(' ').map(str::to_string).collect(),
            suggestion,
            score,
        })
        .collect();
    suggestions.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.suggestion.cmp(&b.suggestion))
    });
    suggestions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grouping_sums_scores() {
        let suggestions = group_suggestions(vec![
            ("zen motorcycle".to_string(), 1.0),
            ("zen archery".to_string(), 0.8),
            ("zen motorcycle".to_string(), 0.5),
        ]);
        assert_eq!(suggestions.len(), 2);
        assert_eq!(suggestions[0].suggestion, "zen motorcycle");
        assert!((suggestions[0].score - 1.5).abs() < 1e-9);
        assert_eq!(suggestions[0].terms, vec!["zen", "motorcycle"]);
        assert_eq!(suggestions[1].suggestion, "zen archery");
    }

    #[test]
    fn test_empty_input() {
        assert!(group_suggestions(Vec::new()).is_empty());
    }

    #[test]
    fn test_equal_scores_order_alphabetically() {
        let suggestions =
            group_suggestions(vec![("b".to_string(), 1.0), ("a".to_string(), 1.0)]);
        assert_eq!(suggestions[0].suggestion, "a");
        assert_eq!(suggestions[1].suggestion, "b");
    }
}
