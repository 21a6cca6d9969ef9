//! Product records - the hub of the catalog
//!
//! A product is identified externally by its `normalized_name`; the
//! integer `id` is a surrogate that only has meaning inside one database.

use crate::normalize::normalize_name;
use crate::{Error, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A distinct item in the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Surrogate key, generated by the database
    pub id: i64,
    /// Display name as first observed
    pub name: String,
    /// Deduplication key, unique across the catalog
    pub normalized_name: String,
    /// Insert time (UTC), assigned by the database
    pub created_at: NaiveDateTime,
}

/// Input for creating a product
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProduct {
    pub name: String,
    pub normalized_name: String,
}

impl NewProduct {
    /// Create with an explicit deduplication key
    pub fn new(name: impl Into<String>, normalized_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            normalized_name: normalized_name.into(),
        }
    }

    /// Create with the key derived by [`normalize_name`]
    pub fn from_name(name: impl Into<String>) -> Self {
        let name = name.into();
        let normalized_name = normalize_name(&name);
        Self { name, normalized_name }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::EmptyField("name"));
        }
        if self.normalized_name.trim().is_empty() {
            return Err(Error::EmptyField("normalized_name"));
        }
        Ok(())
    }
}

/// What happens to a product's quotes and price rows when it is deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletePolicy {
    /// Refuse to delete a product that still owns rows
    #[default]
    Restrict,
    /// Delete the owned quotes and price rows together with the product
    Cascade,
}

impl DeletePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeletePolicy::Restrict => "restrict",
            DeletePolicy::Cascade => "cascade",
        }
    }

    pub fn all() -> &'static [DeletePolicy] {
        &[DeletePolicy::Restrict, DeletePolicy::Cascade]
    }
}

impl FromStr for DeletePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "restrict" => Ok(DeletePolicy::Restrict),
            "cascade" => Ok(DeletePolicy::Cascade),
            _ => Err(format!("Unknown delete policy: {}", s)),
        }
    }
}

impl fmt::Display for DeletePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rows removed by a successful product delete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DeletedProduct {
    pub quotes: usize,
    pub prices: usize,
}
