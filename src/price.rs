//! Price observations - priced bid entries per product, month and company
//!
//! The schema does not make `(product_id, bid_month, company, price_type)`
//! unique. Whether repeated observations of one tuple accumulate or
//! collapse is chosen with [`PriceHistoryMode`].

use crate::month::BidMonth;
use crate::{Error, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Label ingestion uses when a sheet does not say which price a column holds
pub const DEFAULT_PRICE_TYPE: &str = "winning bid (default)";

/// A stored price observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceMeta {
    pub id: i64,
    pub product_id: i64,
    pub bid_month: BidMonth,
    /// Bidding or quoting company
    pub company: String,
    /// `None` when the price was not reported
    pub price: Option<f64>,
    /// Which of several figures for the same tuple this is
    pub price_type: Option<String>,
    pub created_at: NaiveDateTime,
}

/// Input for recording a price observation
#[derive(Debug, Clone, PartialEq)]
pub struct NewPriceMeta {
    pub product_id: i64,
    pub bid_month: BidMonth,
    pub company: String,
    pub price: Option<f64>,
    pub price_type: Option<String>,
}

impl NewPriceMeta {
    pub fn new(product_id: i64, bid_month: BidMonth, company: impl Into<String>) -> Self {
        Self {
            product_id,
            bid_month,
            company: company.into(),
            price: None,
            price_type: None,
        }
    }

    /// Like [`NewPriceMeta::new`], parsing a strict `YYYY-MM` month
    pub fn parse(product_id: i64, bid_month: &str, company: impl Into<String>) -> Result<Self> {
        Ok(Self::new(product_id, bid_month.parse()?, company))
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_price_type(mut self, price_type: impl Into<String>) -> Self {
        self.price_type = Some(price_type.into());
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.company.trim().is_empty() {
            return Err(Error::EmptyField("company"));
        }
        // SQLite stores NaN as NULL, which would not read back as written
        if let Some(price) = self.price {
            if price.is_nan() {
                return Err(Error::InvalidPrice(price));
            }
        }
        Ok(())
    }
}

/// How repeated observations of one `(product, month, company, price_type)` tuple are stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceHistoryMode {
    /// Every observation is inserted; history accumulates
    #[default]
    Append,
    /// The first observation wins; later ones are skipped
    KeepFirst,
    /// The newest observation overwrites the stored one
    KeepLatest,
}

impl PriceHistoryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceHistoryMode::Append => "append",
            PriceHistoryMode::KeepFirst => "keep_first",
            PriceHistoryMode::KeepLatest => "keep_latest",
        }
    }

    /// Whether the tuple is enforced unique
    pub fn is_unique(&self) -> bool {
        !matches!(self, PriceHistoryMode::Append)
    }

    pub fn all() -> &'static [PriceHistoryMode] {
        &[
            PriceHistoryMode::Append,
            PriceHistoryMode::KeepFirst,
            PriceHistoryMode::KeepLatest,
        ]
    }
}

impl FromStr for PriceHistoryMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "append" => Ok(PriceHistoryMode::Append),
            "keep_first" | "skip" => Ok(PriceHistoryMode::KeepFirst),
            "keep_latest" | "overwrite" => Ok(PriceHistoryMode::KeepLatest),
            _ => Err(format!("Unknown price history mode: {}", s)),
        }
    }
}

impl fmt::Display for PriceHistoryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of writing a price observation
#[derive(Debug, Clone, PartialEq)]
pub enum PriceWrite {
    /// A new row was inserted
    Inserted(PriceMeta),
    /// An existing row for the tuple was overwritten
    Updated(PriceMeta),
    /// An existing row for the tuple was kept; nothing was written
    Skipped(PriceMeta),
}

impl PriceWrite {
    /// The row now stored for the observation
    pub fn record(&self) -> &PriceMeta {
        match self {
            PriceWrite::Inserted(p) | PriceWrite::Updated(p) | PriceWrite::Skipped(p) => p,
        }
    }

    pub fn into_record(self) -> PriceMeta {
        match self {
            PriceWrite::Inserted(p) | PriceWrite::Updated(p) | PriceWrite::Skipped(p) => p,
        }
    }

    pub fn was_written(&self) -> bool {
        !matches!(self, PriceWrite::Skipped(_))
    }
}
