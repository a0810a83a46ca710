//! Entity shapes for the three-table filing data model
//!
//! `Politician` owns `Disclosure` rows, a `Disclosure` owns `Trade` rows,
//! and a trade also carries a denormalized politician reference for query
//! performance. Stages exchange these plain records; nothing in the
//! pipeline shares mutable state.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use tradespotter_common::types::{Chamber, FilingType, TradeSide};
use uuid::Uuid;

// ============================================================================
// Stored Rows
// ============================================================================

/// A member of Congress (or candidate) as stored in the datastore.
///
/// At most one row exists per (full_name, state, district) tuple. Identity
/// fields are merged preferring existing data; filing-specific fields such
/// as document ids never live here.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Politician {
    /// Unique identifier
    pub id: Uuid,

    /// Canonical "First Last" display name
    pub full_name: String,

    pub first_name: String,

    pub last_name: String,

    /// "house" or "senate"
    pub chamber: String,

    /// Two-letter state code, when known
    pub state: Option<String>,

    /// Zero-padded district number, null for senators and unknowns
    pub district: Option<String>,

    /// Single-letter party code from the filing index, when present
    pub party: Option<String>,

    /// Open key/value bag of upstream identifiers
    pub external_ids: Value,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// One filing event for a politician.
///
/// Unique per (politician_id, source, document_id); re-ingesting an
/// archive bumps `updated_at` instead of creating a second row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Disclosure {
    pub id: Uuid,

    pub politician_id: Uuid,

    /// Origin tag, e.g. "house_clerk"
    pub source: String,

    /// Upstream filing identifier
    pub document_id: String,

    /// Canonical filing type label, see [`FilingType::as_str`]
    pub filing_type: String,

    pub filed_date: Option<NaiveDate>,

    /// Opaque capture of the original index record
    pub raw_metadata: Value,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// One transaction line extracted from a disclosure document.
///
/// `row_hash` is globally unique and the sole deduplication key;
/// re-parsing the same filing never inserts a second copy.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Trade {
    pub id: Uuid,

    pub disclosure_id: Uuid,

    /// Denormalized owner reference for direct trade queries
    pub politician_id: Uuid,

    pub transaction_date: Option<NaiveDate>,

    /// Date the trade was disclosed/published, when reported
    pub published_date: Option<NaiveDate>,

    pub ticker: Option<String>,

    pub asset_name: String,

    /// "buy", "sell", or null when the filing did not say
    pub side: Option<String>,

    /// Free-text amount bracket as filed, e.g. "$1,001\u{2013}$15,000"
    pub amount_range: Option<String>,

    /// Lower bound in whole dollars, when the bracket parses
    pub amount_min: Option<i64>,

    pub amount_max: Option<i64>,

    pub notes: Option<String>,

    /// Deterministic content hash, see
    /// [`tradespotter_common::types::trade_row_hash`]
    pub row_hash: String,

    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Insert Shapes
// ============================================================================

/// Politician fields as produced by the normalizer, before persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPolitician {
    pub full_name: String,
    pub first_name: String,
    pub last_name: String,
    pub chamber: Chamber,
    pub state: Option<String>,
    pub district: Option<String>,
    pub party: Option<String>,
    pub external_ids: Value,
}

/// Disclosure fields ready for insertion under a resolved politician.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDisclosure {
    pub politician_id: Uuid,
    pub source: String,
    pub document_id: String,
    pub filing_type: FilingType,
    pub filed_date: Option<NaiveDate>,
    pub raw_metadata: Value,
}

/// Trade fields ready for insertion, hash already computed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTrade {
    pub disclosure_id: Uuid,
    pub politician_id: Uuid,
    pub transaction_date: Option<NaiveDate>,
    pub published_date: Option<NaiveDate>,
    pub ticker: Option<String>,
    pub asset_name: String,
    pub side: Option<TradeSide>,
    pub amount_range: Option<String>,
    pub amount_min: Option<i64>,
    pub amount_max: Option<i64>,
    pub notes: Option<String>,
    pub row_hash: String,
}

// ============================================================================
// Parser Output
// ============================================================================

/// One raw row from the bulk index, fields exactly as filed.
///
/// Column order in the tab-delimited index: prefix, last name, first name,
/// suffix, filing type code, state+district compound, year, filing date,
/// document id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkFilingRow {
    pub prefix: String,
    pub last_name: String,
    pub first_name: String,
    pub suffix: String,
    pub filing_type_code: String,
    pub state_district: String,
    pub year: String,
    pub filing_date: String,
    pub document_id: String,
}

/// One untyped trade line extracted from a filing document.
///
/// Every field is optional except the asset description; the extraction
/// strategies only promise "asset plus a date-shaped token".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTrade {
    pub asset: String,
    pub ticker: Option<String>,
    /// Transaction type as filed, e.g. "P", "S", "S (partial)"
    pub transaction_type: Option<String>,
    pub transaction_date: Option<String>,
    /// Notification/publication date as filed
    pub notification_date: Option<String>,
    /// Amount bracket as filed
    pub amount: Option<String>,
    pub notes: Option<String>,
}

// ============================================================================
// Normalizer Output
// ============================================================================

/// A bulk index row normalized into canonical entity shapes.
///
/// The disclosure half still lacks its politician reference; the upserter
/// resolves the politician first and fills it in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedFiling {
    pub politician: NewPolitician,
    pub source: String,
    pub document_id: String,
    pub filing_type: FilingType,
    pub filed_date: Option<NaiveDate>,
    pub raw_metadata: Value,
}

// ============================================================================
// Upsert Results
// ============================================================================

/// Result of an idempotent insert.
///
/// Duplicates are successful no-ops, not errors; both variants carry the
/// id of the surviving row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted(Uuid),
    Duplicate(Uuid),
}

impl UpsertOutcome {
    /// Id of the row that now represents the record, new or pre-existing.
    pub fn id(&self) -> Uuid {
        match self {
            UpsertOutcome::Inserted(id) | UpsertOutcome::Duplicate(id) => *id,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, UpsertOutcome::Duplicate(_))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_outcome_id() {
        let id = Uuid::new_v4();
        assert_eq!(UpsertOutcome::Inserted(id).id(), id);
        assert_eq!(UpsertOutcome::Duplicate(id).id(), id);
        assert!(UpsertOutcome::Duplicate(id).is_duplicate());
        assert!(!UpsertOutcome::Inserted(id).is_duplicate());
    }
}
