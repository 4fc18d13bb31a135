//! Matching a requested sort order against an index field sequence.
//!
//! Given a desired ordering of attributes (with directions) and an
//! ordered index, the match records per position how well the index
//! serves it, whether the index covers the request at all and whether
//! the scan must run in reverse. A request that only matches a prefix
//! of itself still counts as covered; the remainder is sorted after the
//! scan.

use std::sync::Arc;

use crate::catalog::{Collection, Index};

/// How one position of a sort request relates to the index field at the
/// same position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchQuality {
    /// Attribute matches, index order serves the requested direction.
    Forward,
    /// Attribute matches, the reverse index order serves the requested
    /// direction.
    Reverse,
    /// The index ran out of fields before the request did.
    IndexExhausted,
    /// The request ran out of attributes before the index did.
    AttributesExhausted,
    /// Attribute mismatch, or a direction conflicting with an earlier
    /// position.
    NoMatch,
}

/// Result of matching one index against a sort request.
#[derive(Debug, Clone)]
pub struct IndexMatch {
    /// The matched index.
    pub index: Arc<Index>,
    /// Per-position verdicts, one entry per position of the longer of
    /// the two sequences.
    pub qualities: Vec<MatchQuality>,
    /// Whether the index serves the full request (prefix matches count).
    pub covers: bool,
    /// Whether the scan must run against the index order.
    pub requires_reverse: bool,
}

impl IndexMatch {
    /// Number of positions where index and request agree on the
    /// attribute.
    #[must_use]
    pub fn matched_positions(&self) -> usize {
        self.qualities
            .iter()
            .filter(|q| matches!(q, MatchQuality::Forward | MatchQuality::Reverse))
            .count()
    }
}

/// Matches an index against a sort request given as
/// `(attribute, ascending)` pairs.
///
/// The scan direction is pinned by the first matching position; a later
/// position that would need the opposite direction is a mismatch, since
/// one scan can only run one way.
#[must_use]
pub fn compare_index(index: &Arc<Index>, request: &[(String, bool)]) -> IndexMatch {
    let fields = index.fields();
    let positions = fields.len().max(request.len());
    let mut qualities = Vec::with_capacity(positions);
    // None until the first matched position fixes the direction:
    // Some(true) = forward scan, Some(false) = reverse scan.
    let mut direction: Option<bool> = None;
    let mut covers = true;

    for i in 0..positions {
        let quality = match (fields.get(i), request.get(i)) {
            (None, Some(_)) => MatchQuality::IndexExhausted,
            (Some(_), None) => MatchQuality::AttributesExhausted,
            (Some(field), Some((attribute, ascending))) => {
                if field != attribute {
                    MatchQuality::NoMatch
                } else {
                    // Ascending request on this field wants a forward
                    // scan, descending wants reverse.
                    let wanted = *ascending;
                    match direction {
                        None => {
                            direction = Some(wanted);
                            if wanted {
                                MatchQuality::Forward
                            } else {
                                MatchQuality::Reverse
                            }
                        }
                        Some(fixed) if fixed == wanted => {
                            if wanted {
                                MatchQuality::Forward
                            } else {
                                MatchQuality::Reverse
                            }
                        }
                        Some(_) => MatchQuality::NoMatch,
                    }
                }
            }
            (None, None) => unreachable!("loop bounded by the longer sequence"),
        };
        if quality == MatchQuality::NoMatch {
            covers = false;
        }
        qualities.push(quality);
    }

    let requires_reverse = covers && direction == Some(false);
    IndexMatch { index: Arc::clone(index), qualities, covers, requires_reverse }
}

/// All ordered indexes of a collection that cover the request with at
/// least one matched position, in catalog order.
#[must_use]
pub fn matching_indexes(
    collection: &Collection,
    request: &[(String, bool)],
) -> Vec<IndexMatch> {
    collection
        .indexes()
        .iter()
        .filter(|index| index.supports_ordered_scan())
        .map(|index| compare_index(index, request))
        .filter(|m| m.covers && m.matched_positions() > 0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::IndexKind;

    fn skiplist(fields: &[&str]) -> Arc<Index> {
        Arc::new(Index::new(
            "idx",
            IndexKind::Skiplist,
            fields.iter().map(|f| (*f).to_string()).collect(),
            false,
        ))
    }

    fn asc(attrs: &[&str]) -> Vec<(String, bool)> {
        attrs.iter().map(|a| ((*a).to_string(), true)).collect()
    }

    #[test]
    fn longer_request_than_index_still_covers() {
        let index = skiplist(&["a", "b"]);
        let matched = compare_index(&index, &asc(&["a", "b", "c"]));

        assert_eq!(
            matched.qualities,
            vec![
                MatchQuality::Forward,
                MatchQuality::Forward,
                MatchQuality::IndexExhausted
            ]
        );
        assert!(matched.covers);
        assert!(!matched.requires_reverse);
        assert_eq!(matched.matched_positions(), 2);
    }

    #[test]
    fn longer_index_than_request_covers() {
        let index = skiplist(&["a", "b", "c"]);
        let matched = compare_index(&index, &asc(&["a"]));

        assert_eq!(
            matched.qualities,
            vec![
                MatchQuality::Forward,
                MatchQuality::AttributesExhausted,
                MatchQuality::AttributesExhausted
            ]
        );
        assert!(matched.covers);
    }

    #[test]
    fn descending_request_needs_reverse_scan() {
        let index = skiplist(&["a", "b"]);
        let request =
            vec![("a".to_string(), false), ("b".to_string(), false)];
        let matched = compare_index(&index, &request);

        assert_eq!(
            matched.qualities,
            vec![MatchQuality::Reverse, MatchQuality::Reverse]
        );
        assert!(matched.covers);
        assert!(matched.requires_reverse);
    }

    #[test]
    fn mixed_directions_break_the_match() {
        let index = skiplist(&["a", "b"]);
        let request = vec![("a".to_string(), true), ("b".to_string(), false)];
        let matched = compare_index(&index, &request);

        assert_eq!(
            matched.qualities,
            vec![MatchQuality::Forward, MatchQuality::NoMatch]
        );
        assert!(!matched.covers);
        assert!(!matched.requires_reverse);
    }

    #[test]
    fn attribute_mismatch_breaks_the_match() {
        let index = skiplist(&["a", "x"]);
        let matched = compare_index(&index, &asc(&["a", "b"]));

        assert!(!matched.covers);
        assert_eq!(matched.qualities[1], MatchQuality::NoMatch);
    }

    #[test]
    fn only_ordered_indexes_are_considered() {
        let collection = Collection::new("users", 100)
            .with_index(Index::new(
                "hash_a",
                IndexKind::Hash,
                vec!["a".to_string()],
                false,
            ))
            .with_index(Index::new(
                "skip_a",
                IndexKind::Skiplist,
                vec!["a".to_string()],
                false,
            ))
            .with_index(Index::new(
                "skip_x",
                IndexKind::Skiplist,
                vec!["x".to_string()],
                false,
            ));

        let matches = matching_indexes(&collection, &asc(&["a"]));
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].index.id(), "skip_a");
    }
}
