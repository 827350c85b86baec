//! Candidate ordering
//!
//! Priority modes only change the order in which candidate books are planned.
//! With limited capacity the books planned first claim the free slots.

use biblioshift_core::{AuthorId, BookId, BookMeta};
use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};

use crate::config::PriorityMode;

/// Sort key: (bucket, secondary, book id)
///
/// Buckets:
/// - 0: `author_first` and the author is promoted; newer first
/// - 1: `year_desc`; newer first
/// - 2: everything else, by id
pub type SortKey = (u8, Reverse<i32>, BookId);

/// Compute the sort key of one book
///
/// Books without metadata fall into the last bucket.
pub fn sort_key(
    id: BookId,
    meta: Option<&BookMeta>,
    mode: PriorityMode,
    authors: &BTreeSet<AuthorId>,
) -> SortKey {
    match (mode, meta) {
        (PriorityMode::AuthorFirst, Some(m)) if authors.contains(&m.author_id) => {
            (0, Reverse(m.year), id)
        }
        (PriorityMode::YearDesc, Some(m)) => (1, Reverse(m.year), id),
        _ => (2, Reverse(0), id),
    }
}

/// Reorder candidate ids for a priority mode
pub fn order_candidates(
    mut ids: Vec<BookId>,
    metas: &[BookMeta],
    mode: PriorityMode,
    authors: &BTreeSet<AuthorId>,
) -> Vec<BookId> {
    let by_id: HashMap<BookId, &BookMeta> = metas.iter().map(|m| (m.id, m)).collect();
    ids.sort_by_cached_key(|id| sort_key(*id, by_id.get(id).copied(), mode, authors));
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(id: BookId, year: i32, author_id: AuthorId) -> BookMeta {
        BookMeta {
            id,
            year,
            author_id,
        }
    }

    fn authors(ids: &[AuthorId]) -> BTreeSet<AuthorId> {
        ids.iter().copied().collect()
    }

    #[test]
    fn test_year_desc_newest_first() {
        let metas = [meta(1, 1990, 1), meta(2, 2020, 1), meta(3, 2005, 2)];
        let ordered = order_candidates(vec![1, 2, 3], &metas, PriorityMode::YearDesc, &authors(&[]));
        assert_eq!(ordered, vec![2, 3, 1]);
    }

    #[test]
    fn test_year_ties_broken_by_id() {
        let metas = [meta(9, 2000, 1), meta(4, 2000, 1), meta(6, 2000, 1)];
        let ordered = order_candidates(vec![9, 4, 6], &metas, PriorityMode::YearDesc, &authors(&[]));
        assert_eq!(ordered, vec![4, 6, 9]);
    }

    #[test]
    fn test_author_first_promotes_authors() {
        let metas = [
            meta(1, 2020, 2),
            meta(2, 2000, 1),
            meta(3, 2010, 1),
            meta(4, 1980, 3),
        ];
        let ordered =
            order_candidates(vec![1, 2, 3, 4], &metas, PriorityMode::AuthorFirst, &authors(&[1]));

        // promoted books newest first, the rest by id regardless of year
        assert_eq!(ordered, vec![3, 2, 1, 4]);
    }

    #[test]
    fn test_author_first_without_authors_is_id_order() {
        let metas = [meta(3, 2020, 1), meta(1, 1990, 1), meta(2, 2000, 1)];
        let ordered = order_candidates(vec![3, 1, 2], &metas, PriorityMode::AuthorFirst, &authors(&[]));
        assert_eq!(ordered, vec![1, 2, 3]);
    }

    #[test]
    fn test_missing_metadata_sorts_last() {
        let metas = [meta(5, 1900, 1)];
        let ordered = order_candidates(vec![2, 5], &metas, PriorityMode::YearDesc, &authors(&[]));
        assert_eq!(ordered, vec![5, 2]);
    }

    #[test]
    fn test_none_keeps_id_order() {
        let metas = [meta(2, 2020, 1), meta(1, 1990, 1)];
        let ordered = order_candidates(vec![2, 1], &metas, PriorityMode::None, &authors(&[1]));
        assert_eq!(ordered, vec![1, 2]);
    }

    #[test]
    fn test_sort_key_buckets() {
        let promoted = authors(&[7]);
        let m = meta(1, 2001, 7);
        assert_eq!(sort_key(1, Some(&m), PriorityMode::AuthorFirst, &promoted).0, 0);
        assert_eq!(sort_key(1, Some(&m), PriorityMode::YearDesc, &promoted).0, 1);
        assert_eq!(sort_key(1, None, PriorityMode::AuthorFirst, &promoted).0, 2);
    }
}
