//! Bid month - the pricing period of a price observation
//!
//! Stored as `YYYY-MM` text. Parsing happens at the boundary so a
//! malformed month never reaches the `price_meta` table.

use crate::{Error, Result};
use chrono::{Datelike, NaiveDate, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Full-date spellings accepted by [`BidMonth::parse_loose`].
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d", "%Y年%m月%d日"];

/// Year-month spellings, each paired with the suffix that turns it into a full date.
const MONTH_FORMATS: &[(&str, &str)] = &[
    ("%Y-%m-%d", "-01"),
    ("%Y/%m/%d", "/01"),
    ("%Y.%m.%d", ".01"),
    ("%Y年%m月%d日", "01日"),
];

/// A validated `YYYY-MM` pricing period.
///
/// Ordering is chronological, which matches the lexical order of the
/// stored text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BidMonth {
    year: u16,
    month: u8,
}

impl BidMonth {
    /// Create a bid month, rejecting years outside 1..=9999 and months outside 1..=12
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=9999).contains(&year) || !(1..=12).contains(&month) {
            return Err(Error::InvalidBidMonth(format!("{year:04}-{month:02}")));
        }
        Ok(Self {
            year: year as u16,
            month: month as u8,
        })
    }

    /// The month containing `date`. Dates outside years 1..=9999 are rejected.
    pub fn from_date(date: NaiveDate) -> Result<Self> {
        Self::new(date.year(), date.month())
    }

    /// The current UTC month
    pub fn current() -> Self {
        let today = Utc::now().date_naive();
        // the clock never reports a year outside 1..=9999
        Self {
            year: today.year().clamp(1, 9999) as u16,
            month: today.month() as u8,
        }
    }

    pub fn year(&self) -> i32 {
        self.year as i32
    }

    pub fn month(&self) -> u32 {
        self.month as u32
    }

    /// Parse the date spellings that show up in quote sheets.
    ///
    /// Accepts full dates (`2024-03-15`, `2024/03/15`, `2024.03.15`,
    /// `2024年03月15日`), year-months (`2024-03`, `2024/3`, `2024.03`,
    /// `2024年3月`) and compact `202403`. A trailing time component
    /// (`2024-03-15 00:00:00`) is ignored.
    pub fn parse_loose(raw: &str) -> Result<Self> {
        let s = raw.split_whitespace().next().unwrap_or("");
        if s.is_empty() {
            return Err(Error::InvalidBidMonth(raw.to_string()));
        }

        if s.len() == 6 && s.bytes().all(|b| b.is_ascii_digit()) {
            let year: i32 = s[..4].parse().map_err(|_| Error::InvalidBidMonth(raw.to_string()))?;
            let month: u32 = s[4..].parse().map_err(|_| Error::InvalidBidMonth(raw.to_string()))?;
            return Self::new(year, month);
        }

        for fmt in DATE_FORMATS {
            if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
                return Self::from_date(date);
            }
        }

        for (fmt, day) in MONTH_FORMATS {
            if let Ok(date) = NaiveDate::parse_from_str(&format!("{s}{day}"), fmt) {
                return Self::from_date(date);
            }
        }

        Err(Error::InvalidBidMonth(raw.to_string()))
    }
}

impl fmt::Display for BidMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Strict `YYYY-MM` parsing, the form stored in `price_meta.bid_month`.
impl FromStr for BidMonth {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = s.as_bytes();
        let well_formed = bytes.len() == 7
            && bytes[4] == b'-'
            && bytes[..4].iter().all(u8::is_ascii_digit)
            && bytes[5..].iter().all(u8::is_ascii_digit);
        if !well_formed {
            return Err(Error::InvalidBidMonth(s.to_string()));
        }

        let year: i32 = s[..4].parse().map_err(|_| Error::InvalidBidMonth(s.to_string()))?;
        let month: u32 = s[5..].parse().map_err(|_| Error::InvalidBidMonth(s.to_string()))?;
        Self::new(year, month)
    }
}

impl TryFrom<String> for BidMonth {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<BidMonth> for String {
    fn from(month: BidMonth) -> Self {
        month.to_string()
    }
}

impl ToSql for BidMonth {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

impl FromSql for BidMonth {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        text.parse()
            .map_err(|_| FromSqlError::Other(format!("malformed bid_month '{text}'").into()))
    }
}
