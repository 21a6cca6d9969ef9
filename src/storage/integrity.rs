//! Integrity scan
//!
//! Finds rows that violate the catalog invariants. Connections opened by
//! [`CatalogStore`](super::CatalogStore) enforce them on write; this is for
//! files that older tools populated with foreign keys off or before the
//! `normalized_name` constraint existed.

use rusqlite::Connection;
use serde::Serialize;
use std::fmt;

use crate::month::BidMonth;
use crate::Result;

/// Products sharing one `normalized_name`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    pub normalized_name: String,
    pub ids: Vec<i64>,
}

/// A `price_meta` row whose `bid_month` is not `YYYY-MM`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MalformedMonth {
    pub id: i64,
    pub bid_month: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub duplicate_products: Vec<DuplicateGroup>,
    /// Quote ids whose product does not exist
    pub orphan_quotes: Vec<i64>,
    /// Price row ids whose product does not exist
    pub orphan_prices: Vec<i64>,
    pub malformed_months: Vec<MalformedMonth>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.problem_count() == 0
    }

    pub fn problem_count(&self) -> usize {
        self.duplicate_products.len()
            + self.orphan_quotes.len()
            + self.orphan_prices.len()
            + self.malformed_months.len()
    }
}

impl fmt::Display for IntegrityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_clean() {
            return writeln!(f, "Integrity: clean");
        }
        writeln!(f, "Integrity: {} problem(s)", self.problem_count())?;
        for group in &self.duplicate_products {
            writeln!(f, "  Duplicate product '{}': ids {:?}", group.normalized_name, group.ids)?;
        }
        if !self.orphan_quotes.is_empty() {
            writeln!(f, "  Orphan quotes: {:?}", self.orphan_quotes)?;
        }
        if !self.orphan_prices.is_empty() {
            writeln!(f, "  Orphan price rows: {:?}", self.orphan_prices)?;
        }
        for bad in &self.malformed_months {
            writeln!(
                f,
                "  Price row {}: bid_month {:?}",
                bad.id,
                bad.bid_month.as_deref().unwrap_or("NULL")
            )?;
        }
        Ok(())
    }
}

pub(crate) fn scan(conn: &Connection) -> Result<IntegrityReport> {
    Ok(IntegrityReport {
        duplicate_products: duplicate_products(conn)?,
        orphan_quotes: orphan_ids(conn, "quotes")?,
        orphan_prices: orphan_ids(conn, "price_meta")?,
        malformed_months: malformed_months(conn)?,
    })
}

fn duplicate_products(conn: &Connection) -> Result<Vec<DuplicateGroup>> {
    let mut stmt = conn.prepare(
        "SELECT normalized_name, id FROM products WHERE normalized_name IN (
             SELECT normalized_name FROM products GROUP BY normalized_name HAVING COUNT(*) > 1
         ) ORDER BY normalized_name, id",
    )?;

    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut groups: Vec<DuplicateGroup> = Vec::new();
    for (normalized_name, id) in rows {
        match groups.last_mut() {
            Some(group) if group.normalized_name == normalized_name => group.ids.push(id),
            _ => groups.push(DuplicateGroup {
                normalized_name,
                ids: vec![id],
            }),
        }
    }
    Ok(groups)
}

fn orphan_ids(conn: &Connection, table: &str) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT c.id FROM {table} c LEFT JOIN products p ON p.id = c.product_id \
         WHERE p.id IS NULL ORDER BY c.id"
    ))?;

    let ids = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()?;
    Ok(ids)
}

fn malformed_months(conn: &Connection) -> Result<Vec<MalformedMonth>> {
    let mut stmt = conn.prepare("SELECT id, bid_month FROM price_meta ORDER BY id")?;

    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, Option<String>>(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(rows
        .into_iter()
        .filter(|(_, month)| {
            month
                .as_deref()
                .is_none_or(|m| m.parse::<BidMonth>().is_err())
        })
        .map(|(id, bid_month)| MalformedMonth { id, bid_month })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::price::PriceHistoryMode;
    use crate::storage::schema;

    /// A connection with the catalog tables but foreign keys left off,
    /// the way other tools write the file.
    fn legacy_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        for stmt in schema::all_schema_statements(PriceHistoryMode::Append) {
            conn.execute(stmt, []).unwrap();
        }
        conn
    }

    #[test]
    fn test_clean_catalog() {
        let conn = legacy_conn();
        conn.execute("INSERT INTO products (name, normalized_name) VALUES ('Rod', 'rod')", [])
            .unwrap();
        conn.execute("INSERT INTO quotes (product_id) VALUES (1)", []).unwrap();
        conn.execute(
            "INSERT INTO price_meta (product_id, bid_month, company) VALUES (1, '2024-03', 'Acme')",
            [],
        )
        .unwrap();

        let report = scan(&conn).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.to_string(), "Integrity: clean\n");
    }

    #[test]
    fn test_finds_orphans_and_bad_months() {
        let conn = legacy_conn();
        conn.execute("INSERT INTO products (name, normalized_name) VALUES ('Rod', 'rod')", [])
            .unwrap();
        conn.execute("INSERT INTO quotes (product_id) VALUES (1)", []).unwrap();
        conn.execute("INSERT INTO quotes (product_id) VALUES (42)", []).unwrap();
        conn.execute(
            "INSERT INTO price_meta (product_id, bid_month, company) VALUES (1, '2024/3', 'Acme')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO price_meta (product_id, bid_month, company) VALUES (9, '2024-03', 'Acme')",
            [],
        )
        .unwrap();

        let report = scan(&conn).unwrap();
        assert_eq!(report.orphan_quotes, [2]);
        assert_eq!(report.orphan_prices, [2]);
        assert_eq!(
            report.malformed_months,
            [MalformedMonth { id: 1, bid_month: Some("2024/3".to_string()) }]
        );
        assert_eq!(report.problem_count(), 3);
        assert!(report.to_string().contains("Orphan quotes: [2]"));
    }

    #[test]
    fn test_finds_duplicate_products_in_unconstrained_table() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE products (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 name TEXT,
                 normalized_name TEXT,
                 created_at TEXT
             );
             INSERT INTO products (name, normalized_name)
             VALUES ('Rod', 'rod'), ('ROD', 'rod'), ('Wire', 'wire');",
        )
        .unwrap();
        for stmt in schema::all_schema_statements(PriceHistoryMode::Append) {
            conn.execute(stmt, []).unwrap();
        }

        let report = scan(&conn).unwrap();
        assert_eq!(
            report.duplicate_products,
            [DuplicateGroup { normalized_name: "rod".to_string(), ids: vec![1, 2] }]
        );
    }
}
