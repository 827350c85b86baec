//! PostgreSQL inventory store
//!
//! Catalog reads, coverage aggregates and the locked batch update, using SQLx.

use async_trait::async_trait;
use biblioshift_core::{
    Book, BookId, BookMeta, DeltaBatch, Holding, HoldingKey, HoldingRow, Library, LibraryId,
    LibraryUsage,
};
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::error::{InventoryError, Result};
use crate::models::*;
use crate::seed::Catalog;
use crate::store::{CatalogStore, ImportSummary, InventoryStore};

/// Database configuration
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    /// How long `apply_deltas` waits for row locks before giving up
    pub lock_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/biblioshift".to_string(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(300),
            lock_timeout: Duration::from_secs(5),
        }
    }
}

/// Books whose coverage is below the library count and that have copies at all
const UNDER_COVERED_BOOKS: &str = r#"
    SELECT book_id
    FROM holdings
    GROUP BY book_id
    HAVING COUNT(*) FILTER (WHERE quantity > 0) < $1
       AND SUM(quantity) > 0
    ORDER BY book_id
"#;

/// PostgreSQL database client
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
    lock_timeout: Duration,
}

impl Database {
    /// Create a new database connection pool
    pub async fn new(config: DbConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(config.idle_timeout)
            .connect(&config.url)
            .await?;

        info!("Connected to PostgreSQL database");
        Ok(Self {
            pool,
            lock_timeout: config.lock_timeout,
        })
    }

    /// Run migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations complete");
        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl InventoryStore for Database {
    async fn library_count(&self) -> Result<usize> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM libraries")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn library_ids(&self) -> Result<Vec<LibraryId>> {
        let ids = sqlx::query_scalar::<_, i64>("SELECT id FROM libraries ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    fn under_covered_books(&self, library_count: usize) -> BoxStream<'_, Result<BookId>> {
        sqlx::query_scalar::<_, i64>(UNDER_COVERED_BOOKS)
            .bind(library_count as i64)
            .fetch(&self.pool)
            .map_err(InventoryError::from)
            .boxed()
    }

    async fn book_holdings(&self, book_id: BookId) -> Result<Vec<HoldingRow>> {
        let rows = sqlx::query_as::<_, HoldingRecord>(
            "SELECT library_id, quantity FROM holdings WHERE book_id = $1 ORDER BY library_id",
        )
        .bind(book_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(HoldingRow::from).collect())
    }

    #[instrument(skip(self))]
    async fn library_usage(&self) -> Result<Vec<LibraryUsage>> {
        let rows = sqlx::query_as::<_, LibraryUsageRecord>(
            r#"
            SELECT l.id, l.capacity, COALESCE(SUM(h.quantity), 0)::BIGINT AS used
            FROM libraries l
            LEFT JOIN holdings h ON h.library_id = l.id
            GROUP BY l.id, l.capacity
            ORDER BY l.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(LibraryUsage::from).collect())
    }

    async fn book_meta(&self, ids: &[BookId]) -> Result<Vec<BookMeta>> {
        let rows = sqlx::query_as::<_, BookMetaRecord>(
            "SELECT id, year, author_id FROM books WHERE id = ANY($1) ORDER BY id",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(BookMeta::from).collect())
    }

    #[instrument(skip(self, batch), fields(rows = batch.touched_keys().len()))]
    async fn apply_deltas(&self, batch: &DeltaBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let keys = batch.touched_keys();
        let (library_ids, book_ids): (Vec<i64>, Vec<i64>) =
            keys.iter().map(|k| (k.library_id, k.book_id)).unzip();

        let mut tx = self.pool.begin().await?;

        // SET LOCAL takes no bind parameters; the value is an integer
        sqlx::query(&format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_timeout.as_millis()
        ))
        .execute(&mut *tx)
        .await?;

        // Lock the whole batch up front, in key order
        let locked = sqlx::query_as::<_, LockedHolding>(
            r#"
            SELECT h.library_id, h.book_id, h.quantity
            FROM holdings h
            JOIN UNNEST($1::BIGINT[], $2::BIGINT[]) AS k(library_id, book_id)
              ON h.library_id = k.library_id AND h.book_id = k.book_id
            ORDER BY h.library_id, h.book_id
            FOR UPDATE OF h
            "#,
        )
        .bind(&library_ids)
        .bind(&book_ids)
        .fetch_all(&mut *tx)
        .await
        .map_err(InventoryError::from_apply)?;

        let existing: HashMap<HoldingKey, i64> = locked
            .iter()
            .map(|r| (HoldingKey::new(r.library_id, r.book_id), r.quantity))
            .collect();

        debug!(locked = existing.len(), "Locked holding rows");

        for (key, quantity) in batch.decrements() {
            let current = existing.get(&key).copied().ok_or_else(|| {
                InventoryError::Conflict(format!(
                    "holding (library {}, book {}) does not exist",
                    key.library_id, key.book_id
                ))
            })?;
            if current + batch.net(&key) < 0 {
                return Err(InventoryError::Conflict(format!(
                    "holding (library {}, book {}) has {} copies, cannot remove {}",
                    key.library_id, key.book_id, current, quantity
                )));
            }
        }

        for (key, quantity) in batch.increments() {
            sqlx::query(
                r#"
                INSERT INTO holdings (library_id, book_id, quantity)
                VALUES ($1, $2, $3)
                ON CONFLICT (library_id, book_id)
                DO UPDATE SET quantity = holdings.quantity + EXCLUDED.quantity
                "#,
            )
            .bind(key.library_id)
            .bind(key.book_id)
            .bind(quantity)
            .execute(&mut *tx)
            .await
            .map_err(InventoryError::from_apply)?;
        }

        for (key, quantity) in batch.decrements() {
            let result = sqlx::query(
                "UPDATE holdings SET quantity = quantity - $3 WHERE library_id = $1 AND book_id = $2",
            )
            .bind(key.library_id)
            .bind(key.book_id)
            .bind(quantity)
            .execute(&mut *tx)
            .await
            .map_err(InventoryError::from_apply)?;

            if result.rows_affected() != 1 {
                return Err(InventoryError::Conflict(format!(
                    "holding (library {}, book {}) vanished during apply",
                    key.library_id, key.book_id
                )));
            }
        }

        tx.commit().await.map_err(InventoryError::from_apply)?;

        info!(
            rows = keys.len(),
            copies = batch.total_quantity(),
            "Applied holding deltas"
        );
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for Database {
    #[instrument(skip(self, catalog))]
    async fn import_catalog(&self, catalog: &Catalog, flush: bool) -> Result<ImportSummary> {
        let mut summary = ImportSummary::default();
        let mut tx = self.pool.begin().await?;

        if flush {
            for table in ["holdings", "books", "authors", "libraries"] {
                sqlx::query(&format!("DELETE FROM {table}"))
                    .execute(&mut *tx)
                    .await?;
            }
            info!("Flushed catalog tables");
        }

        for author in &catalog.authors {
            let result = sqlx::query(
                "INSERT INTO authors (id, full_name, birth_date) VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
            )
            .bind(author.id)
            .bind(&author.full_name)
            .bind(author.birth_date)
            .execute(&mut *tx)
            .await?;
            summary.authors += result.rows_affected();
        }

        for book in &catalog.books {
            let result = sqlx::query(
                "INSERT INTO books (id, title, year, author_id) VALUES ($1, $2, $3, $4) ON CONFLICT DO NOTHING",
            )
            .bind(book.id)
            .bind(&book.title)
            .bind(book.year)
            .bind(book.author_id)
            .execute(&mut *tx)
            .await?;
            summary.books += result.rows_affected();
        }

        for library in &catalog.libraries {
            let result = sqlx::query(
                "INSERT INTO libraries (id, name, capacity) VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
            )
            .bind(library.id)
            .bind(&library.name)
            .bind(library.capacity)
            .execute(&mut *tx)
            .await?;
            summary.libraries += result.rows_affected();
        }

        tx.commit().await?;
        info!(summary = %summary.summary(), "Catalog imported");
        Ok(summary)
    }

    async fn insert_holdings(&self, holdings: &[Holding]) -> Result<u64> {
        if let Some(bad) = holdings.iter().find(|h| h.quantity < 0) {
            return Err(InventoryError::Invalid(format!(
                "negative quantity {} for library {}, book {}",
                bad.quantity, bad.library_id, bad.book_id
            )));
        }

        let mut inserted = 0;
        let mut tx = self.pool.begin().await?;
        for holding in holdings {
            let result = sqlx::query(
                r#"
                INSERT INTO holdings (library_id, book_id, quantity)
                VALUES ($1, $2, $3)
                ON CONFLICT (library_id, book_id) DO NOTHING
                "#,
            )
            .bind(holding.library_id)
            .bind(holding.book_id)
            .bind(holding.quantity)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }
        tx.commit().await?;

        debug!(inserted, requested = holdings.len(), "Inserted holdings");
        Ok(inserted)
    }

    async fn libraries(&self) -> Result<Vec<Library>> {
        let rows = sqlx::query_as::<_, LibraryRecord>(
            "SELECT id, name, capacity FROM libraries ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Library::from).collect())
    }

    async fn library(&self, id: LibraryId) -> Result<Option<Library>> {
        let row = sqlx::query_as::<_, LibraryRecord>(
            "SELECT id, name, capacity FROM libraries WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Library::from))
    }

    async fn book_ids(&self) -> Result<Vec<BookId>> {
        let ids = sqlx::query_scalar::<_, i64>("SELECT id FROM books ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn books(&self, ids: &[BookId]) -> Result<Vec<Book>> {
        let rows = sqlx::query_as::<_, BookRecord>(
            "SELECT id, title, year, author_id FROM books WHERE id = ANY($1) ORDER BY id",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Book::from).collect())
    }

    #[instrument(skip(self, book_ids), fields(books = book_ids.len()))]
    async fn add_copies(
        &self,
        library_id: LibraryId,
        book_ids: &[BookId],
        copies: i64,
    ) -> Result<u64> {
        if copies < 0 {
            return Err(InventoryError::Invalid(format!(
                "cannot add {copies} copies"
            )));
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO holdings (library_id, book_id, quantity)
            SELECT $1, b, 0 FROM UNNEST($2::BIGINT[]) AS b
            ON CONFLICT (library_id, book_id) DO NOTHING
            "#,
        )
        .bind(library_id)
        .bind(book_ids)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query(
            "UPDATE holdings SET quantity = quantity + $3 WHERE library_id = $1 AND book_id = ANY($2)",
        )
        .bind(library_id)
        .bind(book_ids)
        .bind(copies)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }
}
