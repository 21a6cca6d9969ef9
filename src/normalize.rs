//! Product name normalization
//!
//! Derives the `normalized_name` deduplication key from a display name.
//! Two names that differ only in case, spacing, punctuation, bracketed
//! qualifiers or packaging units map to the same key.

use regex::Regex;
use std::sync::OnceLock;

static BRACKETED: OnceLock<Regex> = OnceLock::new();
static UNITS: OnceLock<Regex> = OnceLock::new();
static PUNCTUATION: OnceLock<Regex> = OnceLock::new();
static WHITESPACE: OnceLock<Regex> = OnceLock::new();

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("normalization pattern is a valid literal"))
}

/// Normalize a product display name into its deduplication key.
///
/// Steps, in order:
/// 1. trim and lowercase
/// 2. drop parenthesised qualifiers, ASCII `()` or full-width `（）`
/// 3. drop standalone packaging units: `kg`, `g`, `斤`, `箱`, `袋`, `包`,
///    `克`, `千克`, `公斤`, `kg.`
/// 4. replace punctuation with spaces, keeping unmatched ASCII `(` and `)`
/// 5. collapse runs of whitespace
///
/// ```
/// use pricebook::normalize_name;
///
/// assert_eq!(normalize_name("Steel Rod (galvanized)  5 KG"), "steel rod 5");
/// ```
pub fn normalize_name(raw: &str) -> String {
    let s = raw.trim().to_lowercase();
    let s = regex(&BRACKETED, r"[\(（].*?[\)）]").replace_all(&s, "");
    let s = regex(&UNITS, r"\b(?:kg|g|斤|箱|袋|包|克|千克|公斤|kg\.)\b").replace_all(&s, "");
    let s = regex(&PUNCTUATION, r"[^\w\s()]").replace_all(&s, " ");
    let s = regex(&WHITESPACE, r"\s+").replace_all(&s, " ");
    s.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_and_spacing() {
        assert_eq!(normalize_name("  Steel   ROD 10mm "), "steel rod 10mm");
    }

    #[test]
    fn test_keeps_underscores() {
        assert_eq!(normalize_name("steel_rod_10mm"), "steel_rod_10mm");
    }

    #[test]
    fn test_drops_bracketed_qualifiers() {
        assert_eq!(normalize_name("Copper Wire (2.5mm²)"), "copper wire");
        assert_eq!(normalize_name("大米（东北）"), "大米");
    }

    #[test]
    fn test_drops_units() {
        assert_eq!(normalize_name("Flour 25 kg"), "flour 25");
        assert_eq!(normalize_name("大米（东北）10 斤"), "大米10");
        // glued to a number the unit is part of the word
        assert_eq!(normalize_name("Flour 25kg"), "flour 25kg");
        assert_eq!(normalize_name("Flour 25 kg."), "flour 25");
    }

    #[test]
    fn test_punctuation() {
        assert_eq!(normalize_name("Acme-Widget, Large!"), "acme widget large");
    }

    #[test]
    fn test_keeps_unmatched_parentheses() {
        assert_eq!(normalize_name("Steel Rod (10mm"), "steel rod (10mm");
        assert_eq!(normalize_name("Rod 10mm)"), "rod 10mm)");
        assert_eq!(normalize_name("大米（东北"), "大米 东北");
    }

    #[test]
    fn test_equivalent_spellings_share_key() {
        let a = normalize_name("Bolt M8 (zinc)");
        let b = normalize_name("bolt  m8");
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty() {
        assert_eq!(normalize_name(""), "");
        assert_eq!(normalize_name("  (only a note) "), "");
    }
}
