//! Catalog seeding
//!
//! Loads authors, books and libraries from a JSON dataset and optionally
//! generates starting holdings.
//!
//! Dataset format:
//! ```json
//! {
//!   "authors":   [{"id": 1, "full_name": "Ann Example", "birth_date": "1970-01-31"}],
//!   "books":     [{"id": 1, "title": "First", "year": 2001, "author_id": 1}],
//!   "libraries": [{"id": 1, "name": "Central", "capacity": 500}]
//! }
//! ```

use biblioshift_core::{Author, Book, BookId, Holding, Library, LibraryId};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, instrument, warn};

use crate::error::{InventoryError, Result};
use crate::store::{CatalogStore, ImportSummary};

/// Extra copies per book in the random scenario, besides the base copy
pub const DEFAULT_RANDOM_COPIES: usize = 2;

/// Reference data loaded from a dataset file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub authors: Vec<Author>,
    #[serde(default)]
    pub books: Vec<Book>,
    #[serde(default)]
    pub libraries: Vec<Library>,
}

impl Catalog {
    /// Read and validate a dataset file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(InventoryError::NotFound(format!(
                "dataset file {}",
                path.display()
            )));
        }
        let text = std::fs::read_to_string(path)?;
        let catalog: Catalog = serde_json::from_str(&text)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Reject values the schema would refuse
    pub fn validate(&self) -> Result<()> {
        if let Some(lib) = self.libraries.iter().find(|l| l.capacity < 0) {
            return Err(InventoryError::Invalid(format!(
                "library {} has negative capacity {}",
                lib.id, lib.capacity
            )));
        }

        let authors: HashSet<_> = self.authors.iter().map(|a| a.id).collect();
        if let Some(book) = self.books.iter().find(|b| !authors.contains(&b.author_id)) {
            return Err(InventoryError::Invalid(format!(
                "book {} references unknown author {}",
                book.id, book.author_id
            )));
        }
        Ok(())
    }
}

/// How starting holdings are generated after an import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HoldingsScenario {
    /// Leave holdings empty
    #[default]
    None,
    /// One copy of every book in the lowest-id library
    AllToFirst,
    /// One copy in a random library plus up to `extra_copies` more in others
    Random { extra_copies: usize },
}

impl FromStr for HoldingsScenario {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(Self::None),
            "all_to_first" => Ok(Self::AllToFirst),
            "random" => Ok(Self::Random {
                extra_copies: DEFAULT_RANDOM_COPIES,
            }),
            other => Err(InventoryError::Invalid(format!(
                "unknown holdings scenario '{other}' (expected none, all_to_first or random)"
            ))),
        }
    }
}

/// Generate starting holdings for a scenario
///
/// `libraries` and `books` are expected in ascending id order.
pub fn generate_holdings<R: Rng + ?Sized>(
    scenario: HoldingsScenario,
    libraries: &[LibraryId],
    books: &[BookId],
    rng: &mut R,
) -> Result<Vec<Holding>> {
    match scenario {
        HoldingsScenario::None => Ok(Vec::new()),

        HoldingsScenario::AllToFirst => {
            let first = libraries.iter().min().copied().ok_or_else(|| {
                InventoryError::NotFound("no libraries for the all_to_first scenario".to_string())
            })?;
            Ok(books
                .iter()
                .map(|&book_id| Holding {
                    library_id: first,
                    book_id,
                    quantity: 1,
                })
                .collect())
        }

        HoldingsScenario::Random { extra_copies } => {
            if libraries.is_empty() {
                return Err(InventoryError::NotFound(
                    "no libraries for the random scenario".to_string(),
                ));
            }

            let mut holdings = Vec::new();
            for &book_id in books {
                let base = *libraries
                    .choose(rng)
                    .ok_or_else(|| InventoryError::Invalid("empty library set".to_string()))?;
                holdings.push(Holding {
                    library_id: base,
                    book_id,
                    quantity: 1,
                });

                let extra = rng.gen_range(0..=extra_copies).min(libraries.len());
                for &library_id in libraries.choose_multiple(rng, extra) {
                    if library_id == base {
                        continue;
                    }
                    holdings.push(Holding {
                        library_id,
                        book_id,
                        quantity: 1,
                    });
                }
            }
            Ok(holdings)
        }
    }
}

/// Seeding options
#[derive(Debug, Clone, Copy, Default)]
pub struct SeedOptions {
    /// Delete all catalog data and holdings first
    pub flush: bool,
    pub scenario: HoldingsScenario,
}

/// What a seeding run did
#[derive(Debug, Clone, Copy, Default)]
pub struct SeedReport {
    pub imported: ImportSummary,
    /// Holding rows inserted by the scenario
    pub holdings: u64,
}

/// Import a catalog and generate starting holdings
#[instrument(skip(store, catalog, rng))]
pub async fn seed<S, R>(
    store: &S,
    catalog: &Catalog,
    options: SeedOptions,
    rng: &mut R,
) -> Result<SeedReport>
where
    S: CatalogStore + ?Sized,
    R: Rng + Send + ?Sized,
{
    let imported = store.import_catalog(catalog, options.flush).await?;
    info!(summary = %imported.summary(), "Catalog loaded");

    if options.scenario == HoldingsScenario::None {
        warn!("No starting holdings generated (scenario: none)");
        return Ok(SeedReport {
            imported,
            holdings: 0,
        });
    }

    let libraries: Vec<LibraryId> = store.libraries().await?.iter().map(|l| l.id).collect();
    let books = store.book_ids().await?;
    let holdings = generate_holdings(options.scenario, &libraries, &books, rng)?;
    let inserted = store.insert_holdings(&holdings).await?;

    info!(
        scenario = ?options.scenario,
        generated = holdings.len(),
        inserted,
        "Starting holdings created"
    );

    Ok(SeedReport {
        imported,
        holdings: inserted,
    })
}
