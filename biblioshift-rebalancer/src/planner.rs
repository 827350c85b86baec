//! Move Planner
//!
//! Turns the holdings of one under-covered book into single-copy moves.
//! Greedy per book:
//! - donors are libraries with more than one copy, largest surplus first
//! - recipients are libraries without the book, in ascending id order
//! - a donor never drops below one copy
//!
//! In capacity-aware mode a [`CapacityLedger`] tracks free space per library
//! across the whole run, so earlier books consume capacity seen by later ones.

use biblioshift_core::{BookId, HoldingRow, LibraryId, LibraryUsage, Move, UNIT_MOVE};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, trace};

/// Planned moves for a whole run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Plan {
    /// Moves in planning order
    pub moves: Vec<Move>,
    /// Candidate books examined
    pub books_considered: usize,
}

impl Plan {
    pub fn total_moves(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    /// Add the moves planned for one book
    pub fn record_book(&mut self, moves: Vec<Move>) {
        self.books_considered += 1;
        self.moves.extend(moves);
    }

    /// Books that received at least one move
    pub fn books_moved(&self) -> BTreeSet<BookId> {
        self.moves.iter().map(|m| m.book_id).collect()
    }

    /// Summary of the plan
    pub fn summary(&self) -> String {
        let sources: HashSet<_> = self.moves.iter().map(|m| m.from_library_id).collect();
        let targets: HashSet<_> = self.moves.iter().map(|m| m.to_library_id).collect();
        format!(
            "{} books considered, {} moves, {} donor libraries, {} recipient libraries",
            self.books_considered,
            self.moves.len(),
            sources.len(),
            targets.len()
        )
    }
}

/// Free capacity per library for one planning run
///
/// Seeded from `capacity - used` and decremented as moves are planned.
/// Libraries missing from the ledger have no capacity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapacityLedger {
    free: BTreeMap<LibraryId, i64>,
}

impl CapacityLedger {
    pub fn from_usage(usage: impl IntoIterator<Item = LibraryUsage>) -> Self {
        Self {
            free: usage.into_iter().map(|u| (u.id, u.free_capacity())).collect(),
        }
    }

    /// Remaining capacity of a library
    pub fn free(&self, library_id: LibraryId) -> i64 {
        self.free.get(&library_id).copied().unwrap_or(0)
    }

    pub fn has_room(&self, library_id: LibraryId, quantity: i64) -> bool {
        self.free(library_id) >= quantity
    }

    /// Take `quantity` from a library's free capacity if it fits
    pub fn try_reserve(&mut self, library_id: LibraryId, quantity: i64) -> bool {
        match self.free.get_mut(&library_id) {
            Some(free) if *free >= quantity => {
                *free -= quantity;
                true
            }
            _ => false,
        }
    }

    /// Libraries known to the ledger, ascending
    pub fn library_ids(&self) -> impl Iterator<Item = LibraryId> + '_ {
        self.free.keys().copied()
    }
}

/// Per-book move builder
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanBuilder {
    capacity_aware: bool,
}

impl PlanBuilder {
    pub fn new(capacity_aware: bool) -> Self {
        Self { capacity_aware }
    }

    pub fn capacity_aware(&self) -> bool {
        self.capacity_aware
    }

    /// Plan moves for one book
    ///
    /// `holdings` are the book's rows, `library_ids` every library in the
    /// catalog and `library_count` its size. `ledger` must be present in
    /// capacity-aware mode and is updated for every planned move.
    pub fn plan_book(
        &self,
        book_id: BookId,
        holdings: &[HoldingRow],
        library_ids: &[LibraryId],
        library_count: usize,
        mut ledger: Option<&mut CapacityLedger>,
    ) -> Vec<Move> {
        let total: i64 = holdings.iter().map(|h| h.quantity).sum();
        if total <= 0 {
            return Vec::new();
        }

        let target = (library_count as i64).min(total).max(0) as usize;
        let has: HashSet<LibraryId> = holdings
            .iter()
            .filter(|h| h.quantity > 0)
            .map(|h| h.library_id)
            .collect();
        let mut covered = has.len();
        if covered >= target {
            return Vec::new();
        }

        let mut donors: Vec<HoldingRow> = holdings.iter().filter(|h| h.quantity > 1).copied().collect();
        donors.sort_by(|a, b| {
            b.quantity
                .cmp(&a.quantity)
                .then(a.library_id.cmp(&b.library_id))
        });

        let mut recipients: Vec<LibraryId> = library_ids
            .iter()
            .copied()
            .filter(|id| !has.contains(id))
            .collect();
        recipients.sort_unstable();
        recipients.dedup();

        if self.capacity_aware {
            match ledger.as_deref() {
                Some(ledger) => recipients.retain(|id| ledger.has_room(*id, UNIT_MOVE)),
                None => recipients.clear(),
            }
        }

        let mut moves = Vec::new();
        let mut next = 0;

        for donor in &donors {
            let mut spare = donor.spare();

            while spare > 0 && covered < target && next < recipients.len() {
                let to = recipients[next];
                next += 1;

                if self.capacity_aware {
                    let reserved = ledger
                        .as_deref_mut()
                        .map(|l| l.try_reserve(to, UNIT_MOVE))
                        .unwrap_or(false);
                    if !reserved {
                        trace!(book_id, library_id = to, "Recipient out of capacity");
                        continue;
                    }
                }

                moves.push(Move::unit(book_id, donor.library_id, to));
                spare -= UNIT_MOVE;
                covered += 1;
            }

            if covered >= target || next >= recipients.len() {
                break;
            }
        }

        debug!(
            book_id,
            total,
            target,
            covered,
            moves = moves.len(),
            "Book planned"
        );

        moves
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(rows: &[(LibraryId, i64)]) -> Vec<HoldingRow> {
        rows.iter().map(|&(l, q)| HoldingRow::new(l, q)).collect()
    }

    fn usage(entries: &[(LibraryId, i64, i64)]) -> CapacityLedger {
        CapacityLedger::from_usage(entries.iter().map(|&(id, capacity, used)| LibraryUsage {
            id,
            capacity,
            used,
        }))
    }

    #[test]
    fn test_moves_spread_to_missing_libraries() {
        let builder = PlanBuilder::new(false);
        let moves = builder.plan_book(7, &rows(&[(1, 3)]), &[1, 2, 3], 3, None);

        assert_eq!(moves, vec![Move::unit(7, 1, 2), Move::unit(7, 1, 3)]);
    }

    #[test]
    fn test_target_limited_by_total_copies() {
        let builder = PlanBuilder::new(false);
        let moves = builder.plan_book(1, &rows(&[(1, 2)]), &[1, 2, 3, 4], 4, None);

        // two copies can cover at most two libraries
        assert_eq!(moves, vec![Move::unit(1, 1, 2)]);
    }

    #[test]
    fn test_single_copy_is_never_moved() {
        let builder = PlanBuilder::new(false);
        let moves = builder.plan_book(1, &rows(&[(1, 1)]), &[1, 2, 3], 3, None);
        assert!(moves.is_empty());
    }

    #[test]
    fn test_spread_singles_need_nothing() {
        let builder = PlanBuilder::new(false);
        let moves = builder.plan_book(1, &rows(&[(1, 1), (2, 1), (3, 1)]), &[1, 2, 3, 4], 4, None);
        assert!(moves.is_empty());
    }

    #[test]
    fn test_largest_donor_first_ties_by_id() {
        let builder = PlanBuilder::new(false);
        let holdings = rows(&[(3, 2), (1, 2), (2, 4)]);
        let moves = builder.plan_book(5, &holdings, &[1, 2, 3, 4, 5, 6], 6, None);

        // library 2 has the largest surplus and fills every gap
        assert_eq!(
            moves,
            vec![
                Move::unit(5, 2, 4),
                Move::unit(5, 2, 5),
                Move::unit(5, 2, 6),
            ]
        );
    }

    #[test]
    fn test_donor_tie_broken_by_library_id() {
        let builder = PlanBuilder::new(false);
        let holdings = rows(&[(3, 2), (1, 2)]);
        let moves = builder.plan_book(5, &holdings, &[1, 2, 3, 4], 4, None);

        assert_eq!(moves, vec![Move::unit(5, 1, 2), Move::unit(5, 3, 4)]);
    }

    #[test]
    fn test_zero_rows_are_recipients() {
        let builder = PlanBuilder::new(false);
        let holdings = rows(&[(1, 3), (2, 0)]);
        let moves = builder.plan_book(9, &holdings, &[1, 2], 2, None);
        assert_eq!(moves, vec![Move::unit(9, 1, 2)]);
    }

    #[test]
    fn test_no_stock_yields_nothing() {
        let builder = PlanBuilder::new(false);
        let moves = builder.plan_book(9, &rows(&[(1, 0)]), &[1, 2], 2, None);
        assert!(moves.is_empty());
        assert!(builder.plan_book(9, &[], &[1, 2], 2, None).is_empty());
    }

    #[test]
    fn test_capacity_skips_full_recipients() {
        let builder = PlanBuilder::new(true);
        let mut ledger = usage(&[(1, 10, 5), (2, 5, 5), (3, 5, 0)]);
        let moves = builder.plan_book(4, &rows(&[(1, 5)]), &[1, 2, 3], 3, Some(&mut ledger));

        assert_eq!(moves, vec![Move::unit(4, 1, 3)]);
        assert_eq!(ledger.free(3), 4);
        assert_eq!(ledger.free(2), 0);
    }

    #[test]
    fn test_capacity_consumed_across_books() {
        // library 2 has room for one copy; first book wins it
        let builder = PlanBuilder::new(true);
        let mut ledger = usage(&[(1, 10, 4), (2, 1, 0)]);
        let libs = [1, 2];

        let first = builder.plan_book(1, &rows(&[(1, 2)]), &libs, 2, Some(&mut ledger));
        let second = builder.plan_book(2, &rows(&[(1, 2)]), &libs, 2, Some(&mut ledger));

        assert_eq!(first, vec![Move::unit(1, 1, 2)]);
        assert!(second.is_empty());
        assert_eq!(ledger.free(2), 0);
    }

    #[test]
    fn test_over_capacity_library_never_receives() {
        let builder = PlanBuilder::new(true);
        let mut ledger = usage(&[(1, 2, 6), (2, 1, 3)]);
        let moves = builder.plan_book(1, &rows(&[(1, 6)]), &[1, 2], 2, Some(&mut ledger));
        assert!(moves.is_empty());
    }

    #[test]
    fn test_capacity_mode_without_ledger_plans_nothing() {
        let builder = PlanBuilder::new(true);
        let moves = builder.plan_book(1, &rows(&[(1, 3)]), &[1, 2], 2, None);
        assert!(moves.is_empty());
    }

    #[test]
    fn test_ledger_reserve() {
        let mut ledger = usage(&[(1, 2, 1)]);
        assert!(ledger.has_room(1, 1));
        assert!(ledger.try_reserve(1, 1));
        assert!(!ledger.try_reserve(1, 1));
        assert!(!ledger.try_reserve(2, 1));
        assert_eq!(ledger.library_ids().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_plan_summary() {
        let mut plan = Plan::default();
        plan.record_book(vec![Move::unit(1, 1, 2), Move::unit(1, 1, 3)]);
        plan.record_book(Vec::new());

        assert_eq!(plan.books_considered, 2);
        assert_eq!(plan.total_moves(), 2);
        assert_eq!(plan.books_moved().len(), 1);
        assert!(plan.summary().contains("2 moves"));
    }
}
