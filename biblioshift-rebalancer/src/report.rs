//! Human-readable report rendering

use biblioshift_core::BookId;
use std::collections::HashMap;
use std::fmt::Write;

use crate::rebalance::RebalanceReport;

/// Default number of moves listed
pub const DEFAULT_PREVIEW_LIMIT: usize = 50;

/// Book ids whose titles the preview needs
pub fn preview_book_ids(report: &RebalanceReport, limit: usize) -> Vec<BookId> {
    let mut ids: Vec<BookId> = report.moves.iter().take(limit).map(|m| m.book_id).collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// Render a report as text
///
/// Moves whose book has no known title fall back to the book id.
pub fn render(report: &RebalanceReport, titles: &HashMap<BookId, String>, limit: usize) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "Rebalance plan");
    let _ = writeln!(out, "Books considered: {}", report.books_considered);
    let _ = writeln!(out, "Moves proposed: {}", report.total_moves);
    let _ = writeln!(out);

    if report.total_moves == 0 {
        let _ = writeln!(
            out,
            "Every book is already spread as widely as its copies allow; no moves needed."
        );
    } else {
        for (i, m) in report.moves.iter().take(limit).enumerate() {
            let title = titles
                .get(&m.book_id)
                .cloned()
                .unwrap_or_else(|| format!("book #{}", m.book_id));
            let _ = writeln!(
                out,
                "{:>3}. '{}': {} -> {} (x{})",
                i + 1,
                title,
                m.from_library_id,
                m.to_library_id,
                m.quantity
            );
        }
        if report.total_moves > limit {
            let _ = writeln!(out, "... and {} more moves", report.total_moves - limit);
        }
    }

    let _ = writeln!(out);
    if report.applied {
        let _ = writeln!(out, "Changes applied.");
    } else {
        let _ = writeln!(out, "DRY RUN: nothing was changed. Run with --apply to write.");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use biblioshift_core::Move;

    fn report(moves: Vec<Move>, applied: bool) -> RebalanceReport {
        RebalanceReport {
            books_considered: 4,
            total_moves: moves.len(),
            moves,
            applied,
        }
    }

    #[test]
    fn test_render_lists_moves_with_titles() {
        let report = report(vec![Move::unit(1, 1, 2), Move::unit(2, 3, 1)], false);
        let titles = HashMap::from([(1, "Dune".to_string())]);
        let text = render(&report, &titles, DEFAULT_PREVIEW_LIMIT);

        assert!(text.contains("Books considered: 4"));
        assert!(text.contains("Moves proposed: 2"));
        assert!(text.contains("  1. 'Dune': 1 -> 2 (x1)"));
        assert!(text.contains("  2. 'book #2': 3 -> 1 (x1)"));
        assert!(text.contains("DRY RUN"));
    }

    #[test]
    fn test_render_truncates_preview() {
        let moves: Vec<Move> = (1..=5).map(|b| Move::unit(b, 1, 2)).collect();
        let text = render(&report(moves, true), &HashMap::new(), 3);

        assert!(text.contains("  3. "));
        assert!(!text.contains("  4. "));
        assert!(text.contains("... and 2 more moves"));
        assert!(text.contains("Changes applied."));
    }

    #[test]
    fn test_render_empty_plan() {
        let text = render(&report(Vec::new(), false), &HashMap::new(), 10);
        assert!(text.contains("no moves needed"));
    }

    #[test]
    fn test_preview_book_ids_deduplicated() {
        let report = report(
            vec![Move::unit(3, 1, 2), Move::unit(3, 1, 4), Move::unit(1, 2, 3)],
            false,
        );
        assert_eq!(preview_book_ids(&report, 2), vec![3]);
        assert_eq!(preview_book_ids(&report, 10), vec![1, 3]);
    }
}
