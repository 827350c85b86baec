//! Catalog and holding types
//!
//! Authors, books and libraries are reference data for the rebalancer.
//! Holdings are the only records it mutates.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::UNIT_MOVE;

pub type AuthorId = i64;
pub type BookId = i64;
pub type LibraryId = i64;

/// Book author
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: AuthorId,
    pub full_name: String,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
}

/// A catalogued title, owned by one author
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub id: BookId,
    pub title: String,
    pub year: i32,
    pub author_id: AuthorId,
}

impl fmt::Display for Book {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.title, self.year)
    }
}

/// A library with a bounded number of copies (all books combined)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Library {
    pub id: LibraryId,
    pub name: String,
    pub capacity: i64,
}

/// Copies of one book held by one library
///
/// A zero quantity is a valid record and counts as "not covered",
/// exactly like an absent row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holding {
    pub library_id: LibraryId,
    pub book_id: BookId,
    pub quantity: i64,
}

impl Holding {
    /// Whether this holding gives its library coverage of the book
    pub fn covers(&self) -> bool {
        self.quantity > 0
    }
}

/// One holding of a known book, as loaded for planning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoldingRow {
    pub library_id: LibraryId,
    pub quantity: i64,
}

impl HoldingRow {
    pub fn new(library_id: LibraryId, quantity: i64) -> Self {
        Self {
            library_id,
            quantity,
        }
    }

    /// Copies this library can give away while keeping one
    pub fn spare(&self) -> i64 {
        (self.quantity - 1).max(0)
    }
}

/// Book attributes used to order candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookMeta {
    pub id: BookId,
    pub year: i32,
    pub author_id: AuthorId,
}

/// Capacity and current usage of a library
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LibraryUsage {
    pub id: LibraryId,
    pub capacity: i64,
    pub used: i64,
}

impl LibraryUsage {
    /// Remaining room; negative when the library is already over capacity
    pub fn free_capacity(&self) -> i64 {
        self.capacity - self.used
    }
}

/// Transfer of copies of one book from one library to another
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Move {
    pub book_id: BookId,
    pub from_library_id: LibraryId,
    pub to_library_id: LibraryId,
    pub quantity: i64,
}

impl Move {
    /// A single-copy move
    pub fn unit(book_id: BookId, from_library_id: LibraryId, to_library_id: LibraryId) -> Self {
        Self {
            book_id,
            from_library_id,
            to_library_id,
            quantity: UNIT_MOVE,
        }
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "book {}: {} -> {} (x{})",
            self.book_id, self.from_library_id, self.to_library_id, self.quantity
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_holding_row_spare_keeps_one_copy() {
        assert_eq!(HoldingRow::new(1, 5).spare(), 4);
        assert_eq!(HoldingRow::new(1, 1).spare(), 0);
        assert_eq!(HoldingRow::new(1, 0).spare(), 0);
    }

    #[test]
    fn test_free_capacity_can_be_negative() {
        let usage = LibraryUsage {
            id: 1,
            capacity: 3,
            used: 5,
        };
        assert_eq!(usage.free_capacity(), -2);
    }

    #[test]
    fn test_zero_quantity_holding_does_not_cover() {
        let holding = Holding {
            library_id: 1,
            book_id: 7,
            quantity: 0,
        };
        assert!(!holding.covers());
    }

    #[test]
    fn test_move_serializes_with_field_names() {
        let json = serde_json::to_value(Move::unit(7, 1, 2)).unwrap();
        assert_eq!(json["book_id"], 7);
        assert_eq!(json["from_library_id"], 1);
        assert_eq!(json["to_library_id"], 2);
        assert_eq!(json["quantity"], 1);
    }

    #[test]
    fn test_author_birth_date_is_optional() {
        let author: Author =
            serde_json::from_str(r#"{"id": 1, "full_name": "Ann Example"}"#).unwrap();
        assert_eq!(author.birth_date, None);
    }
}
