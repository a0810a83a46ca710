//! Common types used across TradeSpotter

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::checksum::sha256_hex;
use crate::error::CommonError;

// ============================================================================
// Filing Domain
// ============================================================================

/// Congressional chamber a politician serves in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chamber {
    House,
    Senate,
}

impl Chamber {
    pub fn as_str(self) -> &'static str {
        match self {
            Chamber::House => "house",
            Chamber::Senate => "senate",
        }
    }
}

impl std::fmt::Display for Chamber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Chamber {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "house" => Ok(Chamber::House),
            "senate" => Ok(Chamber::Senate),
            _ => Err(CommonError::Parse(format!("Invalid chamber: {s}"))),
        }
    }
}

/// Kind of financial disclosure filing.
///
/// The House Clerk's bulk index encodes these as single-letter codes.
/// Unknown codes are rejected at normalization time rather than stored.
///
/// # Examples
///
/// ```rust
/// use tradespotter_common::types::FilingType;
///
/// let ft = FilingType::from_code("P").unwrap();
/// assert_eq!(ft, FilingType::PeriodicTransaction);
/// assert_eq!(ft.as_str(), "periodic_transaction");
/// assert_eq!(ft.description(), "Periodic Transaction Report");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilingType {
    /// Code `P`, the filings that contain individual trades
    PeriodicTransaction,
    /// Code `A`
    Amendment,
    /// Code `C`
    Candidate,
    /// Code `D`, the annual financial disclosure
    Disclosure,
    /// Code `O`, new officer or employee report
    Officer,
    /// Code `X`, filing deadline extension request
    Extension,
    /// Code `W`
    Withdrawal,
}

impl FilingType {
    /// Map a single-letter code from the bulk index to a filing type.
    ///
    /// Leading/trailing whitespace and case are ignored. Returns `None`
    /// for unknown codes so callers can skip the record with a reason.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "P" => Some(FilingType::PeriodicTransaction),
            "A" => Some(FilingType::Amendment),
            "C" => Some(FilingType::Candidate),
            "D" => Some(FilingType::Disclosure),
            "O" => Some(FilingType::Officer),
            "X" => Some(FilingType::Extension),
            "W" => Some(FilingType::Withdrawal),
            _ => None,
        }
    }

    /// Upstream single-letter code.
    pub fn code(self) -> char {
        match self {
            FilingType::PeriodicTransaction => 'P',
            FilingType::Amendment => 'A',
            FilingType::Candidate => 'C',
            FilingType::Disclosure => 'D',
            FilingType::Officer => 'O',
            FilingType::Extension => 'X',
            FilingType::Withdrawal => 'W',
        }
    }

    /// Canonical label stored in the datastore.
    pub fn as_str(self) -> &'static str {
        match self {
            FilingType::PeriodicTransaction => "periodic_transaction",
            FilingType::Amendment => "amendment",
            FilingType::Candidate => "candidate",
            FilingType::Disclosure => "disclosure",
            FilingType::Officer => "officer",
            FilingType::Extension => "extension",
            FilingType::Withdrawal => "withdrawal",
        }
    }

    /// Human-readable description for reports and logs.
    pub fn description(self) -> &'static str {
        match self {
            FilingType::PeriodicTransaction => "Periodic Transaction Report",
            FilingType::Amendment => "Amendment",
            FilingType::Candidate => "Candidate",
            FilingType::Disclosure => "Disclosure",
            FilingType::Officer => "Officer",
            FilingType::Extension => "Extension",
            FilingType::Withdrawal => "Withdrawal",
        }
    }
}

impl std::fmt::Display for FilingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for FilingType {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "periodic_transaction" => Ok(FilingType::PeriodicTransaction),
            "amendment" => Ok(FilingType::Amendment),
            "candidate" => Ok(FilingType::Candidate),
            "disclosure" => Ok(FilingType::Disclosure),
            "officer" => Ok(FilingType::Officer),
            "extension" => Ok(FilingType::Extension),
            "withdrawal" => Ok(FilingType::Withdrawal),
            _ => Err(CommonError::InvalidFilingType(s.to_string())),
        }
    }
}

/// Direction of a reported transaction.
///
/// Trades with an unrecognized transaction type keep a null side rather
/// than failing the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    /// Takes `self` by value so the method path works as an
    /// `Option::map` mapping function.
    pub fn as_str(self) -> &'static str {
        match self {
            TradeSide::Buy => "buy",
            TradeSide::Sell => "sell",
        }
    }
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TradeSide {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "buy" => Ok(TradeSide::Buy),
            "sell" => Ok(TradeSide::Sell),
            _ => Err(CommonError::Parse(format!("Invalid trade side: {s}"))),
        }
    }
}

// ============================================================================
// Trade Deduplication
// ============================================================================

/// Compute the deduplication hash for a trade row.
///
/// SHA-256 over the pipe-joined canonical fields
/// `source|document_id|asset|ticker|side|transaction_date|amount_range`,
/// where an absent field contributes an empty string and the date is
/// rendered as ISO `YYYY-MM-DD`. The lowercase hex digest is the sole
/// uniqueness key on trades, so the field order and joining rules must
/// never change without a full backfill of stored hashes.
///
/// # Examples
///
/// ```rust
/// use tradespotter_common::types::{trade_row_hash, TradeSide};
/// use chrono::NaiveDate;
///
/// let hash = trade_row_hash(
///     "house_clerk",
///     "40003749",
///     "Apple Inc.",
///     Some("AAPL"),
///     Some(TradeSide::Buy),
///     NaiveDate::from_ymd_opt(2024, 1, 15),
///     Some("$1,001\u{2013}$15,000"),
/// );
/// assert_eq!(hash.len(), 64);
/// ```
pub fn trade_row_hash(
    source: &str,
    document_id: &str,
    asset: &str,
    ticker: Option<&str>,
    side: Option<TradeSide>,
    transaction_date: Option<NaiveDate>,
    amount_range: Option<&str>,
) -> String {
    let date = transaction_date
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default();

    let joined = [
        source,
        document_id,
        asset,
        ticker.unwrap_or(""),
        side.map(TradeSide::as_str).unwrap_or(""),
        date.as_str(),
        amount_range.unwrap_or(""),
    ]
    .join("|");

    sha256_hex(joined.as_bytes())
}
