//! Storage Layer - SQLite-backed persistence
//!
//! System of record is SQLite with tables:
//! - products(id, name, normalized_name, created_at)
//! - quotes(id, product_id -> products.id, source, created_at)
//! - price_meta(id, product_id -> products.id, bid_month, company, price, price_type, created_at)

pub mod integrity;
pub mod schema;
pub mod sqlite;

pub use integrity::{DuplicateGroup, IntegrityReport};
pub use sqlite::{CatalogStore, DbStats, ProductMatch};
