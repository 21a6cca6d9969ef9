//! Database schema definitions

use crate::price::PriceHistoryMode;

/// SQL to create the products table
pub const CREATE_PRODUCTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS products (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    normalized_name TEXT NOT NULL UNIQUE,
    created_at TEXT DEFAULT CURRENT_TIMESTAMP
)
"#;

/// SQL to create the quotes table
pub const CREATE_QUOTES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS quotes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    product_id INTEGER NOT NULL,
    source TEXT,
    created_at TEXT DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY(product_id) REFERENCES products(id)
)
"#;

/// SQL to create the price_meta table
/// `bid_month` holds `YYYY-MM`; the format is checked before insert, not here
pub const CREATE_PRICE_META_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS price_meta (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    product_id INTEGER NOT NULL,
    bid_month TEXT NOT NULL,
    company TEXT NOT NULL,
    price REAL,
    price_type TEXT,
    created_at TEXT DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY(product_id) REFERENCES products(id)
)
"#;

/// SQL to create indexes
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_quotes_product ON quotes(product_id)",
    "CREATE INDEX IF NOT EXISTS idx_price_meta_product_month ON price_meta(product_id, bid_month)",
    "CREATE INDEX IF NOT EXISTS idx_price_meta_company ON price_meta(company)",
];

/// Unique observation index, present only when price history is collapsed
pub const CREATE_OBSERVATION_INDEX: &str =
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_price_meta_observation \
     ON price_meta(product_id, bid_month, company, COALESCE(price_type, ''))";

pub const DROP_OBSERVATION_INDEX: &str = "DROP INDEX IF EXISTS idx_price_meta_observation";

/// All schema creation statements for the given price history mode
pub fn all_schema_statements(mode: PriceHistoryMode) -> Vec<&'static str> {
    let mut stmts = vec![
        CREATE_PRODUCTS_TABLE,
        CREATE_QUOTES_TABLE,
        CREATE_PRICE_META_TABLE,
    ];
    stmts.extend(CREATE_INDEXES.iter().copied());
    stmts.push(if mode.is_unique() {
        CREATE_OBSERVATION_INDEX
    } else {
        DROP_OBSERVATION_INDEX
    });
    stmts
}
