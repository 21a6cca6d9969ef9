//! Quote records - one row per observed quotation event

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A quotation event for a product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub id: i64,
    pub product_id: i64,
    /// Free-text provenance, e.g. the sheet or feed the quote came from
    pub source: Option<String>,
    pub created_at: NaiveDateTime,
}

/// Input for recording a quote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewQuote {
    pub product_id: i64,
    pub source: Option<String>,
}

impl NewQuote {
    pub fn new(product_id: i64) -> Self {
        Self {
            product_id,
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}
