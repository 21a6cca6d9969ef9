//! SQLite storage implementation

use std::os::raw::c_int;
use std::path::Path;
use std::time::Duration;

use rusqlite::{
    ffi, params, Connection, ErrorCode, OptionalExtension, Row, Transaction, TransactionBehavior,
};
use serde::Serialize;

use super::integrity::{self, IntegrityReport};
use super::schema;
use crate::config::CatalogConfig;
use crate::month::BidMonth;
use crate::price::{NewPriceMeta, PriceHistoryMode, PriceMeta, PriceWrite};
use crate::product::{DeletePolicy, DeletedProduct, NewProduct, Product};
use crate::quote::{NewQuote, Quote};
use crate::{Error, Result};

const PRODUCT_COLUMNS: &str = "id, name, normalized_name, created_at";
const QUOTE_COLUMNS: &str = "id, product_id, source, created_at";
const PRICE_COLUMNS: &str = "id, product_id, bid_month, company, price, price_type, created_at";

/// Score of an exact `normalized_name` hit in [`CatalogStore::match_products`]
pub const EXACT_MATCH_SCORE: u8 = 100;
pub const DEFAULT_MATCH_THRESHOLD: u8 = 90;
pub const DEFAULT_MATCH_LIMIT: usize = 3;

/// A product scored against a normalized name, 0-100
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductMatch {
    pub product: Product,
    pub score: u8,
}

/// SQLite-backed storage for the price catalog
///
/// Owns a single connection. Writers in other threads or processes open
/// their own store on the same file; the unique constraint on
/// `normalized_name` keeps product creation race-free between them.
pub struct CatalogStore {
    conn: Connection,
    price_history: PriceHistoryMode,
    delete_policy: DeletePolicy,
}

impl CatalogStore {
    /// Open a database file (creates if doesn't exist) with default settings
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, &CatalogConfig::default())
    }

    /// Open a database file with explicit settings
    pub fn open_with(path: &Path, config: &CatalogConfig) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self::with_connection(conn, config)?;
        let mode: String = store
            .conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;

        tracing::info!(
            "Opened price catalog {} (journal: {}, history: {}, delete: {})",
            path.display(),
            mode,
            store.price_history,
            store.delete_policy
        );
        Ok(store)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::open_in_memory_with(&CatalogConfig::default())
    }

    pub fn open_in_memory_with(config: &CatalogConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, config)
    }

    fn with_connection(conn: Connection, config: &CatalogConfig) -> Result<Self> {
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let store = Self {
            conn,
            price_history: config.price_history,
            delete_policy: config.delete_policy,
        };
        store.ensure_schema()?;
        Ok(store)
    }

    /// Create every table and index that is missing. Safe to call repeatedly.
    pub fn ensure_schema(&self) -> Result<()> {
        for stmt in schema::all_schema_statements(self.price_history) {
            self.conn.execute(stmt, [])?;
        }
        tracing::debug!("Schema ensured ({} history)", self.price_history);
        Ok(())
    }

    pub fn price_history(&self) -> PriceHistoryMode {
        self.price_history
    }

    pub fn delete_policy(&self) -> DeletePolicy {
        self.delete_policy
    }

    // ========== Product Operations ==========

    /// Insert a product. Fails with [`Error::DuplicateProduct`] when the
    /// normalized name is taken; look the existing row up instead of retrying.
    pub fn create_product(&self, new: &NewProduct) -> Result<Product> {
        new.validate()?;
        let sql = format!(
            "INSERT INTO products (name, normalized_name) VALUES (?1, ?2) \
             RETURNING {PRODUCT_COLUMNS}"
        );

        let product = self
            .conn
            .query_row(&sql, params![new.name, new.normalized_name], row_to_product)
            .map_err(|e| {
                if is_unique_violation(&e) {
                    tracing::warn!("Product '{}' already exists", new.normalized_name);
                    Error::DuplicateProduct(new.normalized_name.clone())
                } else {
                    e.into()
                }
            })?;

        tracing::debug!("Created product {} ({})", product.id, product.normalized_name);
        Ok(product)
    }

    /// Get a product by id
    pub fn get_product(&self, id: i64) -> Result<Option<Product>> {
        fetch_product(&self.conn, id)
    }

    /// Get a product by its natural key
    pub fn find_product_by_normalized_name(
        &self,
        normalized_name: &str,
    ) -> Result<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE normalized_name = ?1");
        self.conn
            .query_row(&sql, [normalized_name], row_to_product)
            .optional()
            .map_err(Into::into)
    }

    /// Resolve a display name to its product, creating it on first sight.
    ///
    /// Concurrent callers with the same name end up with the same row: a
    /// lost insert race surfaces as a uniqueness violation and falls back
    /// to the lookup.
    pub fn get_or_create_product(&self, name: &str) -> Result<Product> {
        let new = NewProduct::from_name(name);
        new.validate()?;

        if let Some(existing) = self.find_product_by_normalized_name(&new.normalized_name)? {
            return Ok(existing);
        }

        match self.create_product(&new) {
            Err(Error::DuplicateProduct(key)) => self
                .find_product_by_normalized_name(&key)?
                .ok_or(Error::DuplicateProduct(key)),
            other => other,
        }
    }

    /// Find products whose display name contains `pattern`, ordered by name.
    /// `%` and `_` in `pattern` match literally.
    pub fn search_products(&self, pattern: &str, limit: usize) -> Result<Vec<Product>> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE name LIKE ?1 ESCAPE '\\' \
             ORDER BY name, id LIMIT ?2"
        );
        let mut stmt = self.conn.prepare(&sql)?;

        let like = format!("%{}%", escape_like(pattern));
        let products = stmt
            .query_map(params![like, limit as i64], row_to_product)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(products)
    }

    /// Resolve a normalized name to its closest products.
    ///
    /// An exact `normalized_name` hit is returned alone with score
    /// [`EXACT_MATCH_SCORE`]. Otherwise every product is scored by edit
    /// similarity (0-100) and those at or above `threshold` come back best
    /// first, at most `limit` of them. Ties keep id order. An empty name
    /// matches nothing.
    pub fn match_products(
        &self,
        normalized: &str,
        threshold: u8,
        limit: usize,
    ) -> Result<Vec<ProductMatch>> {
        if normalized.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(product) = self.find_product_by_normalized_name(normalized)? {
            return Ok(vec![ProductMatch { product, score: EXACT_MATCH_SCORE }]);
        }

        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products ORDER BY id");
        let mut stmt = self.conn.prepare(&sql)?;
        let products = stmt
            .query_map([], row_to_product)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut matches: Vec<ProductMatch> = products
            .into_iter()
            .filter_map(|product| {
                let key = if product.normalized_name.is_empty() {
                    product.name.as_str()
                } else {
                    product.normalized_name.as_str()
                };
                let score = similarity(normalized, key);
                (score >= threshold).then_some(ProductMatch { product, score })
            })
            .collect();
        matches.sort_by(|a, b| b.score.cmp(&a.score));
        matches.truncate(limit);

        tracing::debug!("Matched '{}' to {} product(s)", normalized, matches.len());
        Ok(matches)
    }

    /// Delete a product according to the configured [`DeletePolicy`]
    pub fn delete_product(&self, id: i64) -> Result<DeletedProduct> {
        let policy = self.delete_policy;

        let deleted = self.atomic(|conn| {
            if fetch_product(conn, id)?.is_none() {
                return Err(Error::ProductNotFound(id));
            }

            let quotes = count_children(conn, "quotes", id)?;
            let prices = count_children(conn, "price_meta", id)?;

            match policy {
                DeletePolicy::Restrict if quotes + prices > 0 => {
                    return Err(Error::ProductInUse { id, quotes, prices });
                }
                DeletePolicy::Restrict => {}
                DeletePolicy::Cascade => {
                    conn.execute("DELETE FROM price_meta WHERE product_id = ?1", [id])?;
                    conn.execute("DELETE FROM quotes WHERE product_id = ?1", [id])?;
                }
            }

            conn.execute("DELETE FROM products WHERE id = ?1", [id])?;
            Ok(DeletedProduct { quotes, prices })
        })?;

        tracing::debug!(
            "Deleted product {} with {} quote(s) and {} price row(s)",
            id,
            deleted.quotes,
            deleted.prices
        );
        Ok(deleted)
    }

    pub fn count_products(&self) -> Result<usize> {
        count_rows(&self.conn, "products")
    }

    // ========== Quote Operations ==========

    /// Record a quote. Fails with [`Error::DanglingReference`] for an unknown product.
    pub fn create_quote(&self, new: &NewQuote) -> Result<Quote> {
        let sql = format!(
            "INSERT INTO quotes (product_id, source) VALUES (?1, ?2) RETURNING {QUOTE_COLUMNS}"
        );

        let quote = self
            .conn
            .query_row(&sql, params![new.product_id, new.source], row_to_quote)
            .map_err(|e| child_insert_error(e, "quotes", new.product_id))?;

        tracing::debug!("Recorded quote {} for product {}", quote.id, quote.product_id);
        Ok(quote)
    }

    pub fn get_quote(&self, id: i64) -> Result<Option<Quote>> {
        let sql = format!("SELECT {QUOTE_COLUMNS} FROM quotes WHERE id = ?1");
        self.conn
            .query_row(&sql, [id], row_to_quote)
            .optional()
            .map_err(Into::into)
    }

    /// All quotes for a product, oldest first
    pub fn quotes_for_product(&self, product_id: i64) -> Result<Vec<Quote>> {
        let sql = format!("SELECT {QUOTE_COLUMNS} FROM quotes WHERE product_id = ?1 ORDER BY id");
        let mut stmt = self.conn.prepare(&sql)?;

        let quotes = stmt
            .query_map([product_id], row_to_quote)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(quotes)
    }

    pub fn count_quotes(&self) -> Result<usize> {
        count_rows(&self.conn, "quotes")
    }

    // ========== Price Operations ==========

    /// Record a price observation under the configured [`PriceHistoryMode`].
    ///
    /// In `append` mode every call inserts. In the unique modes the lookup
    /// of an existing tuple and the write happen in one immediate
    /// transaction. A write that fails, including reading the row back,
    /// leaves the table unchanged.
    pub fn create_price_meta(&self, new: &NewPriceMeta) -> Result<PriceWrite> {
        new.validate()?;

        let written = match self.price_history {
            PriceHistoryMode::Append => {
                PriceWrite::Inserted(self.atomic(|conn| insert_price(conn, new))?)
            }
            mode => self.atomic(|conn| match find_observation(conn, new)? {
                Some(existing) if mode == PriceHistoryMode::KeepFirst => {
                    tracing::warn!(
                        "Keeping price {} for product {} / {} / {}",
                        existing.id,
                        new.product_id,
                        new.bid_month,
                        new.company
                    );
                    Ok(PriceWrite::Skipped(existing))
                }
                Some(existing) => Ok(PriceWrite::Updated(update_price(conn, existing.id, new)?)),
                None => Ok(PriceWrite::Inserted(insert_price(conn, new)?)),
            })?,
        };

        tracing::debug!(
            "Price {} for product {} ({}, {}): {}",
            written.record().id,
            new.product_id,
            new.bid_month,
            new.company,
            match &written {
                PriceWrite::Inserted(_) => "inserted",
                PriceWrite::Updated(_) => "updated",
                PriceWrite::Skipped(_) => "skipped",
            }
        );
        Ok(written)
    }

    pub fn get_price_meta(&self, id: i64) -> Result<Option<PriceMeta>> {
        let sql = format!("SELECT {PRICE_COLUMNS} FROM price_meta WHERE id = ?1");
        self.conn
            .query_row(&sql, [id], row_to_price)
            .optional()
            .map_err(Into::into)
    }

    /// All price rows for a product, by month then insertion order
    pub fn prices_for_product(&self, product_id: i64) -> Result<Vec<PriceMeta>> {
        let sql = format!(
            "SELECT {PRICE_COLUMNS} FROM price_meta WHERE product_id = ?1 ORDER BY bid_month, id"
        );
        let mut stmt = self.conn.prepare(&sql)?;

        let prices = stmt
            .query_map([product_id], row_to_price)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(prices)
    }

    /// All price rows for one bid month
    pub fn prices_for_month(&self, bid_month: BidMonth) -> Result<Vec<PriceMeta>> {
        let sql = format!(
            "SELECT {PRICE_COLUMNS} FROM price_meta WHERE bid_month = ?1 \
             ORDER BY product_id, company, id"
        );
        let mut stmt = self.conn.prepare(&sql)?;

        let prices = stmt
            .query_map([bid_month], row_to_price)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(prices)
    }

    /// Most recent known price from `company`: latest month, then latest row.
    /// Rows without a price are ignored.
    pub fn latest_price(&self, product_id: i64, company: &str) -> Result<Option<PriceMeta>> {
        let sql = format!(
            "SELECT {PRICE_COLUMNS} FROM price_meta \
             WHERE product_id = ?1 AND company = ?2 AND price IS NOT NULL \
             ORDER BY bid_month DESC, id DESC LIMIT 1"
        );
        self.conn
            .query_row(&sql, params![product_id, company], row_to_price)
            .optional()
            .map_err(Into::into)
    }

    pub fn count_price_meta(&self) -> Result<usize> {
        count_rows(&self.conn, "price_meta")
    }

    // ========== Bulk Operations ==========

    /// Run several operations atomically.
    ///
    /// Commits when `f` returns `Ok`; any error rolls every write back.
    /// Nested calls run in a savepoint, so an inner error undoes only the
    /// inner writes and the outer closure decides what happens next.
    pub fn transaction<T>(&self, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        self.atomic(|_| f(self))
    }

    /// Run `f` as one unit: an immediate transaction on its own, or a
    /// savepoint when a caller's transaction is already open.
    fn atomic<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        if self.conn.is_autocommit() {
            let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
            let out = f(&*tx)?;
            tx.commit()?;
            return Ok(out);
        }

        self.conn.execute_batch("SAVEPOINT pricebook_atomic")?;
        match f(&self.conn) {
            Ok(out) => {
                self.conn.execute_batch("RELEASE pricebook_atomic")?;
                Ok(out)
            }
            Err(e) => {
                self.conn
                    .execute_batch("ROLLBACK TO pricebook_atomic; RELEASE pricebook_atomic")?;
                Err(e)
            }
        }
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats> {
        Ok(DbStats {
            products: self.count_products()?,
            quotes: self.count_quotes()?,
            price_rows: self.count_price_meta()?,
        })
    }

    /// Scan for rows that break the catalog invariants.
    ///
    /// A store opened by this crate cannot create them, but database files
    /// written by other tools without foreign keys may contain them.
    pub fn check_integrity(&self) -> Result<IntegrityReport> {
        let report = integrity::scan(&self.conn)?;
        if !report.is_clean() {
            tracing::warn!("Integrity check found {} problem(s)", report.problem_count());
        }
        Ok(report)
    }
}

// ========== Row Helpers ==========

fn fetch_product(conn: &Connection, id: i64) -> Result<Option<Product>> {
    let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1");
    conn.query_row(&sql, [id], row_to_product)
        .optional()
        .map_err(Into::into)
}

fn insert_price(conn: &Connection, new: &NewPriceMeta) -> Result<PriceMeta> {
    let sql = format!(
        "INSERT INTO price_meta (product_id, bid_month, company, price, price_type) \
         VALUES (?1, ?2, ?3, ?4, ?5) RETURNING {PRICE_COLUMNS}"
    );
    conn.query_row(
        &sql,
        params![new.product_id, new.bid_month, new.company, new.price, new.price_type],
        row_to_price,
    )
    .map_err(|e| child_insert_error(e, "price_meta", new.product_id))
}

fn update_price(conn: &Connection, id: i64, new: &NewPriceMeta) -> Result<PriceMeta> {
    let sql = format!(
        "UPDATE price_meta SET price = ?1, price_type = ?2, created_at = CURRENT_TIMESTAMP \
         WHERE id = ?3 RETURNING {PRICE_COLUMNS}"
    );
    conn.query_row(&sql, params![new.price, new.price_type, id], row_to_price)
        .map_err(Into::into)
}

/// The stored row for the observation tuple, if any. A NULL `price_type`
/// and an empty one are the same tuple, matching the unique index.
fn find_observation(conn: &Connection, new: &NewPriceMeta) -> Result<Option<PriceMeta>> {
    let sql = format!(
        "SELECT {PRICE_COLUMNS} FROM price_meta \
         WHERE product_id = ?1 AND bid_month = ?2 AND company = ?3 \
         AND COALESCE(price_type, '') = COALESCE(?4, '') \
         ORDER BY id LIMIT 1"
    );
    conn.query_row(
        &sql,
        params![new.product_id, new.bid_month, new.company, new.price_type],
        row_to_price,
    )
    .optional()
    .map_err(Into::into)
}

fn count_rows(conn: &Connection, table: &str) -> Result<usize> {
    let sql = format!("SELECT COUNT(*) FROM {table}");
    let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
    Ok(count as usize)
}

fn count_children(conn: &Connection, table: &str, product_id: i64) -> Result<usize> {
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {table} WHERE product_id = ?1"),
        [product_id],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

fn row_to_product(row: &Row) -> rusqlite::Result<Product> {
    Ok(Product {
        id: row.get(0)?,
        name: row.get(1)?,
        normalized_name: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn row_to_quote(row: &Row) -> rusqlite::Result<Quote> {
    Ok(Quote {
        id: row.get(0)?,
        product_id: row.get(1)?,
        source: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn row_to_price(row: &Row) -> rusqlite::Result<PriceMeta> {
    Ok(PriceMeta {
        id: row.get(0)?,
        product_id: row.get(1)?,
        bid_month: row.get(2)?,
        company: row.get(3)?,
        price: row.get(4)?,
        price_type: row.get(5)?,
        created_at: row.get(6)?,
    })
}

/// Escape `LIKE` wildcards so `pattern` matches literally under `ESCAPE '\'`
fn escape_like(pattern: &str) -> String {
    let mut escaped = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Edit similarity of two keys on a 0-100 scale, rounded down
fn similarity(a: &str, b: &str) -> u8 {
    (strsim::normalized_levenshtein(a, b) * 100.0) as u8
}

// ========== Constraint Classification ==========

fn constraint_code(err: &rusqlite::Error) -> Option<c_int> {
    match err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
            Some(e.extended_code)
        }
        _ => None,
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        constraint_code(err),
        Some(ffi::SQLITE_CONSTRAINT_UNIQUE) | Some(ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
    )
}

fn is_foreign_key_violation(err: &rusqlite::Error) -> bool {
    constraint_code(err) == Some(ffi::SQLITE_CONSTRAINT_FOREIGNKEY)
}

fn child_insert_error(err: rusqlite::Error, table: &'static str, product_id: i64) -> Error {
    if is_foreign_key_violation(&err) {
        tracing::warn!("Rejected {} row for missing product {}", table, product_id);
        Error::DanglingReference { table, product_id }
    } else {
        err.into()
    }
}

/// Database statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DbStats {
    pub products: usize,
    pub quotes: usize,
    pub price_rows: usize,
}

impl std::fmt::Display for DbStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Catalog Statistics:")?;
        writeln!(f, "  Products: {}", self.products)?;
        writeln!(f, "  Quotes: {}", self.quotes)?;
        writeln!(f, "  Price rows: {}", self.price_rows)
    }
}
