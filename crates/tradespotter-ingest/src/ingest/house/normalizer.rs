//! Field normalization into canonical entity shapes.
//!
//! Raw index rows and extracted trade lines carry fields exactly as
//! filed: compound state+district codes, single-letter filing types,
//! half a dozen date spellings, and free-text amount brackets. This
//! module maps them onto the typed model, skipping records that fail
//! validation rather than aborting the batch.
//!
//! Everything that feeds the trade content hash is canonicalized here,
//! so the same filed trade always hashes identically no matter which
//! extraction strategy produced it.

use chrono::{Datelike, NaiveDate};
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use tradespotter_common::types::{trade_row_hash, Chamber, FilingType, TradeSide};

use super::SOURCE;
use crate::error::{IngestError, Result};
use crate::models::{BulkFilingRow, NewPolitician, NewTrade, NormalizedFiling, RawTrade};

/// Date formats accepted for filing and transaction dates. Anything
/// else stores null rather than guessing.
const DATE_FORMATS: &[&str] = &["%m/%d/%Y", "%m/%d/%y", "%Y-%m-%d", "%m-%d-%Y"];

/// Standard disclosure amount brackets with their dollar bounds.
///
/// The open-ended top bracket has no upper bound; its lower bound is
/// one dollar above the printed threshold.
const AMOUNT_BRACKETS: &[(&str, i64, Option<i64>)] = &[
    ("$1,001\u{2013}$15,000", 1_001, Some(15_000)),
    ("$15,001\u{2013}$50,000", 15_001, Some(50_000)),
    ("$50,001\u{2013}$100,000", 50_001, Some(100_000)),
    ("$100,001\u{2013}$250,000", 100_001, Some(250_000)),
    ("$250,001\u{2013}$500,000", 250_001, Some(500_000)),
    ("$500,001\u{2013}$1,000,000", 500_001, Some(1_000_000)),
    ("$1,000,001\u{2013}$5,000,000", 1_000_001, Some(5_000_000)),
    ("$5,000,001\u{2013}$25,000,000", 5_000_001, Some(25_000_000)),
    ("$25,000,001\u{2013}$50,000,000", 25_000_001, Some(50_000_000)),
    ("Over $50,000,000", 50_000_001, None),
];

/// Maps raw filing and trade fields to canonical entity shapes.
#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer;

impl Normalizer {
    pub fn new() -> Self {
        Self
    }

    /// Normalize one bulk index row into a filing ready for upsert.
    ///
    /// Unknown filing type codes and blank names are validation errors;
    /// the caller skips the row and keeps going. An unparseable filing
    /// date is stored as null, not rejected.
    pub fn normalize_row(&self, row: &BulkFilingRow, archive_year: i32) -> Result<NormalizedFiling> {
        let first_name = row.first_name.trim();
        let last_name = row.last_name.trim();
        if first_name.is_empty() || last_name.is_empty() {
            return Err(IngestError::Validation(format!(
                "blank name for document {:?}",
                row.document_id
            )));
        }
        let full_name = format!("{first_name} {last_name}");

        let code = row.filing_type_code.trim();
        let filing_type = FilingType::from_code(code).ok_or_else(|| {
            IngestError::Validation(format!(
                "unknown filing type code {code:?} for document {:?}",
                row.document_id
            ))
        })?;

        let (state, district) = split_state_district(&row.state_district);
        let filed_date = self.parse_date(&row.filing_date);

        let mut raw_metadata = serde_json::to_value(row)?;
        if let Some(map) = raw_metadata.as_object_mut() {
            map.insert("archive_year".to_string(), json!(archive_year));
        }

        Ok(NormalizedFiling {
            politician: NewPolitician {
                full_name,
                first_name: first_name.to_string(),
                last_name: last_name.to_string(),
                chamber: Chamber::House,
                state,
                district,
                party: None,
                external_ids: json!({}),
            },
            source: SOURCE.to_string(),
            document_id: row.document_id.trim().to_string(),
            filing_type,
            filed_date,
            raw_metadata,
        })
    }

    /// Normalize one extracted trade line into an insertable trade.
    ///
    /// The asset description is the only required field. Everything
    /// feeding the content hash goes through canonicalization first, so
    /// the hash is stable across extraction strategies and re-runs.
    pub fn normalize_trade(
        &self,
        raw: &RawTrade,
        disclosure_id: Uuid,
        politician_id: Uuid,
        document_id: &str,
    ) -> Result<NewTrade> {
        let asset_name = self.normalize_asset(&raw.asset).ok_or_else(|| {
            IngestError::Validation(format!(
                "trade without asset description in document {document_id:?}"
            ))
        })?;

        let ticker = raw.ticker.as_deref().and_then(|t| self.normalize_ticker(t));
        let side = raw
            .transaction_type
            .as_deref()
            .and_then(|t| self.normalize_side(t));
        let transaction_date = raw
            .transaction_date
            .as_deref()
            .and_then(|d| self.parse_date(d));
        let published_date = raw
            .notification_date
            .as_deref()
            .and_then(|d| self.parse_date(d));
        let (amount_range, amount_min, amount_max) = raw
            .amount
            .as_deref()
            .map(|a| self.normalize_amount(a))
            .unwrap_or((None, None, None));
        let notes = raw
            .notes
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(String::from);

        let row_hash = trade_row_hash(
            SOURCE,
            document_id,
            &asset_name,
            ticker.as_deref(),
            side,
            transaction_date,
            amount_range.as_deref(),
        );

        Ok(NewTrade {
            disclosure_id,
            politician_id,
            transaction_date,
            published_date,
            ticker,
            asset_name,
            side,
            amount_range,
            amount_min,
            amount_max,
            notes,
            row_hash,
        })
    }

    /// Parse a date string against the accepted formats, else `None`.
    ///
    /// Results outside 1900..=2100 are rejected so that a two-digit
    /// year cannot satisfy `%Y` as an ancient date before the `%y`
    /// format gets its turn.
    pub fn parse_date(&self, raw: &str) -> Option<NaiveDate> {
        let cleaned = raw.trim();
        if cleaned.is_empty() {
            return None;
        }
        for format in DATE_FORMATS {
            if let Ok(date) = NaiveDate::parse_from_str(cleaned, format) {
                if (1900..=2100).contains(&date.year()) {
                    return Some(date);
                }
            }
        }
        warn!(date = cleaned, "unparseable date stored as null");
        None
    }

    /// Map a filed transaction type onto buy/sell, else `None`.
    ///
    /// Partial markers like "S (partial)" count as their base type;
    /// exchanges and anything unrecognized carry no side.
    pub fn normalize_side(&self, raw: &str) -> Option<TradeSide> {
        let mut cleaned = raw.trim().to_uppercase();
        if let Some(idx) = cleaned.find('(') {
            cleaned.truncate(idx);
        }
        match cleaned.trim() {
            "P" | "PURCHASE" | "BUY" | "BOUGHT" => Some(TradeSide::Buy),
            "S" | "SALE" | "SELL" | "SOLD" => Some(TradeSide::Sell),
            _ => None,
        }
    }

    /// Uppercase a ticker, drop punctuation, reject anything that is
    /// not one to five letters.
    pub fn normalize_ticker(&self, raw: &str) -> Option<String> {
        let cleaned: String = raw
            .trim()
            .chars()
            .map(|c| c.to_ascii_uppercase())
            .filter(|c| c.is_ascii_uppercase())
            .collect();
        if cleaned.is_empty() || cleaned.len() > 5 {
            return None;
        }
        Some(cleaned)
    }

    /// Trim and collapse whitespace; descriptions shorter than two
    /// characters are noise.
    fn normalize_asset(&self, raw: &str) -> Option<String> {
        let cleaned = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        if cleaned.len() < 2 {
            return None;
        }
        Some(cleaned)
    }

    /// Canonicalize an amount bracket and extract its dollar bounds.
    ///
    /// Filed brackets that numerically match a standard bracket take
    /// its canonical spelling. Nonstandard ranges are reformatted from
    /// their numbers; text with no numbers at all passes through
    /// unchanged with null bounds.
    pub fn normalize_amount(&self, raw: &str) -> (Option<String>, Option<i64>, Option<i64>) {
        let cleaned = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        if cleaned.is_empty() {
            return (None, None, None);
        }

        let has_over = cleaned.to_lowercase().contains("over");
        let numbers = extract_numbers(&cleaned);

        for (label, min, max) in AMOUNT_BRACKETS {
            match max {
                None => {
                    if has_over && numbers.len() == 1 && numbers[0] + 1 == *min {
                        return (Some((*label).to_string()), Some(*min), *max);
                    }
                }
                Some(max_value) => {
                    if !has_over
                        && numbers.len() == 2
                        && numbers[0] == *min
                        && numbers[1] == *max_value
                    {
                        return (Some((*label).to_string()), Some(*min), *max);
                    }
                }
            }
        }

        match numbers.as_slice() {
            [low, high] if !has_over => (
                Some(format!(
                    "{}\u{2013}{}",
                    format_dollars(*low),
                    format_dollars(*high)
                )),
                Some(*low),
                Some(*high),
            ),
            [threshold] if has_over => (
                Some(format!("Over {}", format_dollars(*threshold))),
                Some(*threshold),
                None,
            ),
            [exact] => (
                Some(format_dollars(*exact)),
                Some(*exact),
                Some(*exact),
            ),
            _ => (Some(cleaned), None, None),
        }
    }
}

/// Split a compound code like "MI04" into state and district.
///
/// A bare state code yields no district. Anything that does not start
/// with two letters yields neither; the raw value survives only in the
/// filing's raw metadata.
fn split_state_district(raw: &str) -> (Option<String>, Option<String>) {
    let cleaned = raw.trim();
    if cleaned.len() < 2 {
        return (None, None);
    }
    let state: String = cleaned.chars().take(2).collect();
    if !state.chars().all(|c| c.is_ascii_alphabetic()) {
        return (None, None);
    }
    let district = cleaned[2..].trim();
    (
        Some(state.to_ascii_uppercase()),
        (!district.is_empty()).then(|| district.to_string()),
    )
}

/// Collect comma-grouped digit runs as integers, in order.
fn extract_numbers(text: &str) -> Vec<i64> {
    let mut numbers = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        if c.is_ascii_digit() {
            current.push(c);
        } else if c != ',' && !current.is_empty() {
            if let Ok(value) = current.parse() {
                numbers.push(value);
            }
            current.clear();
        }
    }
    if let Ok(value) = current.parse() {
        numbers.push(value);
    }
    numbers
}

/// Format whole dollars with comma grouping, e.g. 15000 -> "$15,000".
fn format_dollars(value: i64) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    format!("${grouped}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn index_row() -> BulkFilingRow {
        BulkFilingRow {
            prefix: String::new(),
            last_name: "Aaron".to_string(),
            first_name: "Richard".to_string(),
            suffix: "D".to_string(),
            filing_type_code: "P".to_string(),
            state_district: "MI04".to_string(),
            year: "2025".to_string(),
            filing_date: "3/24/2025".to_string(),
            document_id: "40003749".to_string(),
        }
    }

    #[test]
    fn normalizes_index_row_to_canonical_filing() {
        let filing = Normalizer::new().normalize_row(&index_row(), 2025).unwrap();

        assert_eq!(filing.politician.full_name, "Richard Aaron");
        assert_eq!(filing.politician.first_name, "Richard");
        assert_eq!(filing.politician.last_name, "Aaron");
        assert_eq!(filing.politician.chamber, Chamber::House);
        assert_eq!(filing.politician.state.as_deref(), Some("MI"));
        assert_eq!(filing.politician.district.as_deref(), Some("04"));
        assert_eq!(filing.source, "house_clerk");
        assert_eq!(filing.document_id, "40003749");
        assert_eq!(filing.filing_type, FilingType::PeriodicTransaction);
        assert_eq!(
            filing.filed_date,
            Some(NaiveDate::from_ymd_opt(2025, 3, 24).unwrap())
        );
        assert_eq!(filing.raw_metadata["archive_year"], json!(2025));
        assert_eq!(filing.raw_metadata["suffix"], json!("D"));
    }

    #[test]
    fn unknown_filing_type_code_is_validation_error() {
        let mut row = index_row();
        row.filing_type_code = "Z".to_string();
        let err = Normalizer::new().normalize_row(&row, 2025).unwrap_err();
        assert!(matches!(err, IngestError::Validation(_)));
    }

    #[test]
    fn blank_name_is_validation_error() {
        let mut row = index_row();
        row.first_name = "   ".to_string();
        let err = Normalizer::new().normalize_row(&row, 2025).unwrap_err();
        assert!(matches!(err, IngestError::Validation(_)));
    }

    #[test]
    fn splits_compound_state_district_codes() {
        assert_eq!(
            split_state_district("MI04"),
            (Some("MI".to_string()), Some("04".to_string()))
        );
        assert_eq!(split_state_district("ak00"), (
            Some("AK".to_string()),
            Some("00".to_string())
        ));
        assert_eq!(split_state_district("TX"), (Some("TX".to_string()), None));
        assert_eq!(split_state_district("1234"), (None, None));
        assert_eq!(split_state_district(""), (None, None));
    }

    #[test]
    fn parses_all_accepted_date_formats() {
        let normalizer = Normalizer::new();
        let expected = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(normalizer.parse_date("01/15/2024"), Some(expected));
        assert_eq!(normalizer.parse_date("1/15/24"), Some(expected));
        assert_eq!(normalizer.parse_date("2024-01-15"), Some(expected));
        assert_eq!(normalizer.parse_date("01-15-2024"), Some(expected));
        assert_eq!(normalizer.parse_date("January 15, 2024"), None);
        assert_eq!(normalizer.parse_date(""), None);
    }

    #[test]
    fn maps_transaction_types_to_sides() {
        let normalizer = Normalizer::new();
        assert_eq!(normalizer.normalize_side("P"), Some(TradeSide::Buy));
        assert_eq!(normalizer.normalize_side("purchase"), Some(TradeSide::Buy));
        assert_eq!(normalizer.normalize_side("S"), Some(TradeSide::Sell));
        assert_eq!(normalizer.normalize_side("S (partial)"), Some(TradeSide::Sell));
        assert_eq!(normalizer.normalize_side("sold"), Some(TradeSide::Sell));
        assert_eq!(normalizer.normalize_side("E"), None);
        assert_eq!(normalizer.normalize_side("exchange"), None);
        assert_eq!(normalizer.normalize_side(""), None);
    }

    #[test]
    fn cleans_and_validates_tickers() {
        let normalizer = Normalizer::new();
        assert_eq!(normalizer.normalize_ticker("aapl").as_deref(), Some("AAPL"));
        assert_eq!(normalizer.normalize_ticker(" BRK.B ").as_deref(), Some("BRKB"));
        assert_eq!(normalizer.normalize_ticker("TOOLONG"), None);
        assert_eq!(normalizer.normalize_ticker("123"), None);
        assert_eq!(normalizer.normalize_ticker(""), None);
    }

    #[test]
    fn standard_amount_brackets_take_canonical_spelling() {
        let normalizer = Normalizer::new();
        assert_eq!(
            normalizer.normalize_amount("$1,001 - $15,000"),
            (
                Some("$1,001\u{2013}$15,000".to_string()),
                Some(1_001),
                Some(15_000)
            )
        );
        assert_eq!(
            normalizer.normalize_amount("$1,001\u{2013}$15,000"),
            (
                Some("$1,001\u{2013}$15,000".to_string()),
                Some(1_001),
                Some(15_000)
            )
        );
        assert_eq!(
            normalizer.normalize_amount("Over $50,000,000"),
            (Some("Over $50,000,000".to_string()), Some(50_000_001), None)
        );
    }

    #[test]
    fn nonstandard_amounts_are_reformatted_from_their_numbers() {
        let normalizer = Normalizer::new();
        assert_eq!(
            normalizer.normalize_amount("$500 to $1,200"),
            (Some("$500\u{2013}$1,200".to_string()), Some(500), Some(1_200))
        );
        assert_eq!(
            normalizer.normalize_amount("over $2,000,000"),
            (Some("Over $2,000,000".to_string()), Some(2_000_000), None)
        );
        assert_eq!(
            normalizer.normalize_amount("$15,000"),
            (Some("$15,000".to_string()), Some(15_000), Some(15_000))
        );
        assert_eq!(
            normalizer.normalize_amount("undisclosed"),
            (Some("undisclosed".to_string()), None, None)
        );
        assert_eq!(normalizer.normalize_amount("  "), (None, None, None));
    }

    #[test]
    fn normalized_trade_hash_matches_published_fixture() {
        let raw = RawTrade {
            asset: "Apple Inc.".to_string(),
            ticker: Some("AAPL".to_string()),
            transaction_type: Some("P".to_string()),
            transaction_date: Some("01/15/2024".to_string()),
            notification_date: None,
            amount: Some("$1,001 - $15,000".to_string()),
            notes: None,
        };
        let trade = Normalizer::new()
            .normalize_trade(&raw, Uuid::nil(), Uuid::nil(), "40003749")
            .unwrap();

        assert_eq!(trade.asset_name, "Apple Inc.");
        assert_eq!(trade.side, Some(TradeSide::Buy));
        assert_eq!(trade.amount_range.as_deref(), Some("$1,001\u{2013}$15,000"));
        assert_eq!(trade.amount_min, Some(1_001));
        assert_eq!(trade.amount_max, Some(15_000));
        assert_eq!(
            trade.row_hash,
            "f0ac0fda7ea721575b921f4ef579322ab0610b66e4a590e4f558365e404b45b5"
        );
    }

    #[test]
    fn sparse_trade_hashes_with_empty_substitutions() {
        let raw = RawTrade {
            asset: "Apple Inc.".to_string(),
            ..RawTrade::default()
        };
        let trade = Normalizer::new()
            .normalize_trade(&raw, Uuid::nil(), Uuid::nil(), "40003749")
            .unwrap();

        assert_eq!(
            trade.row_hash,
            "8705c0d6a2bb8fb78cbe7ddd4c5fe7fbae76e535613d8da6ab869403d5cd1be9"
        );
    }

    #[test]
    fn trade_without_asset_is_validation_error() {
        let raw = RawTrade {
            asset: " ".to_string(),
            ..RawTrade::default()
        };
        let err = Normalizer::new()
            .normalize_trade(&raw, Uuid::nil(), Uuid::nil(), "40003749")
            .unwrap_err();
        assert!(matches!(err, IngestError::Validation(_)));
    }
}
