//! # Pricebook - Product price catalog storage
//!
//! Persistent storage behind a price-aggregation tool.
//!
//! Pricebook provides:
//! - A three-table SQLite schema: `products`, `quotes`, `price_meta`
//! - Typed records with a validated `YYYY-MM` bid month
//! - A store that enforces product uniqueness and referential integrity
//! - Explicit policies for price history and product deletion

pub mod config;
pub mod month;
pub mod normalize;
pub mod price;
pub mod product;
pub mod quote;
pub mod storage;

// Re-exports for convenient access
pub use config::CatalogConfig;
pub use month::BidMonth;
pub use normalize::normalize_name;
pub use price::{NewPriceMeta, PriceHistoryMode, PriceMeta, PriceWrite};
pub use product::{DeletePolicy, DeletedProduct, NewProduct, Product};
pub use quote::{NewQuote, Quote};
pub use storage::{CatalogStore, DbStats, IntegrityReport, ProductMatch};

/// Result type alias for Pricebook operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Pricebook operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Duplicate product: normalized name '{0}' already exists")]
    DuplicateProduct(String),

    #[error("Dangling reference: {table}.product_id = {product_id} does not match any product")]
    DanglingReference { table: &'static str, product_id: i64 },

    #[error("Product {id} is still referenced by {quotes} quote(s) and {prices} price row(s)")]
    ProductInUse { id: i64, quotes: usize, prices: usize },

    #[error("Product not found: {0}")]
    ProductNotFound(i64),

    #[error("Invalid bid month: {0}")]
    InvalidBidMonth(String),

    #[error("Invalid price: {0}")]
    InvalidPrice(f64),

    #[error("Required field is empty: {0}")]
    EmptyField(&'static str),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

/// Constraint class an [`Error`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    /// A second product with an existing `normalized_name`
    Uniqueness,
    /// A child row pointing at a missing product, or a product still owning children
    ReferentialIntegrity,
    /// Input that does not have the shape the column requires
    Format,
}

impl Error {
    /// Classify this error, or `None` for plain storage/lookup failures.
    pub fn violation(&self) -> Option<Violation> {
        match self {
            Error::DuplicateProduct(_) => Some(Violation::Uniqueness),
            Error::DanglingReference { .. } | Error::ProductInUse { .. } => {
                Some(Violation::ReferentialIntegrity)
            }
            Error::InvalidBidMonth(_) | Error::InvalidPrice(_) | Error::EmptyField(_) => {
                Some(Violation::Format)
            }
            Error::ProductNotFound(_) | Error::Storage(_) => None,
        }
    }
}
