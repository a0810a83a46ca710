//! Multi-strategy trade extraction from filing document text.
//!
//! Individual PTR documents arrive in wildly inconsistent layouts, so no
//! single parser covers them. Extraction runs an ordered chain of
//! independent strategies, each implementing the same contract: look at
//! the document text, return the trades you can see, and say `Empty`
//! rather than erroring when the text simply is not shaped for you. The
//! driver stops at the first strategy that yields a plausible non-empty
//! result.
//!
//! A record counts as plausible when it carries at least an asset
//! description and a transaction-date-shaped token. Anything thinner is
//! noise from page furniture and gets dropped before it can reach the
//! normalizer.

use std::collections::HashSet;

use regex::Regex;
use tracing::debug;

use crate::error::Result;
use crate::models::RawTrade;

/// Outcome of one strategy's pass over a document.
///
/// `Empty` means the text is not shaped for this strategy and the next
/// one should run. `Failed` means the text looked right but no usable
/// records survived; the driver logs the reason and also moves on.
#[derive(Debug)]
pub enum Extraction {
    /// At least one plausible trade record.
    Success(Vec<RawTrade>),
    /// Nothing in the text matched this strategy's shape.
    Empty,
    /// The shape matched but no record survived validation.
    Failed(String),
}

/// One independent extraction approach over raw document text.
pub trait ExtractionStrategy {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Attempt extraction. Must not error on malformed input.
    fn extract(&self, text: &str) -> Extraction;
}

/// Shape tests shared by all strategies.
///
/// Compiled once per strategy so the per-line loops never rebuild
/// patterns.
#[derive(Debug, Clone)]
struct FieldClassifier {
    date_shape: Regex,
    amount_shape: Regex,
}

/// Exact transaction type codes and words as they appear in filings.
const TRANSACTION_TYPES: &[&str] = &[
    "P", "S", "E", "PURCHASE", "SALE", "BUY", "SELL", "EXCHANGE",
];

/// Substrings that mark a longer cell as a transaction indicator.
const TRANSACTION_WORDS: &[&str] = &["PURCHASE", "SALE", "BUY", "SELL", "SOLD", "BOUGHT"];

impl FieldClassifier {
    fn new() -> Result<Self> {
        Ok(Self {
            date_shape: Regex::new(
                r"\d{1,2}/\d{1,2}/\d{4}|\d{4}-\d{1,2}-\d{1,2}|\d{1,2}-\d{1,2}-\d{4}",
            )?,
            amount_shape: Regex::new(
                r"\$[\d,]+\s*[-\u{2013}]\s*\$?[\d,]+|(?i:over)\s+\$[\d,]+|\$[\d,]+\s*\+|\$[\d,]+",
            )?,
        })
    }

    fn is_date_like(&self, text: &str) -> bool {
        self.date_shape.is_match(text)
    }

    fn is_amount_like(&self, text: &str) -> bool {
        self.amount_shape.is_match(text)
    }

    fn is_transaction_type(&self, text: &str) -> bool {
        let upper = text.trim().to_uppercase();
        TRANSACTION_TYPES.contains(&upper.as_str())
    }

    fn contains_transaction_word(&self, text: &str) -> bool {
        let upper = text.to_uppercase();
        TRANSACTION_WORDS.iter().any(|word| upper.contains(word))
    }

    fn looks_like_ticker(&self, text: &str) -> bool {
        let trimmed = text.trim();
        !trimmed.is_empty()
            && trimmed.len() <= 5
            && trimmed.chars().all(|c| c.is_ascii_uppercase())
    }

    /// Assign row cells to trade fields by shape rather than position.
    ///
    /// First date-shaped cell is the transaction date, second the
    /// notification date. The longest unclassified cell becomes the
    /// asset description. Returns `None` when no asset cell remains.
    fn classify_row(&self, cells: &[&str]) -> Option<RawTrade> {
        let mut transaction_type = None;
        let mut transaction_date = None;
        let mut notification_date = None;
        let mut amount = None;
        let mut ticker = None;
        let mut leftovers: Vec<&str> = Vec::new();

        for cell in cells {
            let cell = cell.trim();
            if cell.is_empty() {
                continue;
            }
            if transaction_type.is_none()
                && (self.is_transaction_type(cell) || self.contains_transaction_word(cell))
            {
                transaction_type = Some(cell.to_string());
            } else if self.is_date_like(cell) {
                if transaction_date.is_none() {
                    transaction_date = Some(cell.to_string());
                } else if notification_date.is_none() {
                    notification_date = Some(cell.to_string());
                }
            } else if amount.is_none() && self.is_amount_like(cell) {
                amount = Some(cell.to_string());
            } else if ticker.is_none() && self.looks_like_ticker(cell) {
                ticker = Some(cell.to_string());
            } else {
                leftovers.push(cell);
            }
        }

        let asset = leftovers.iter().max_by_key(|cell| cell.len())?;
        Some(RawTrade {
            asset: (*asset).to_string(),
            ticker,
            transaction_type,
            transaction_date,
            notification_date,
            amount,
            notes: None,
        })
    }

    fn is_plausible(&self, trade: &RawTrade) -> bool {
        !trade.asset.trim().is_empty()
            && trade
                .transaction_date
                .as_deref()
                .is_some_and(|date| self.is_date_like(date))
    }

    /// Filter candidates down to plausible, deduplicated records.
    fn finish(&self, candidates: Vec<RawTrade>) -> Extraction {
        if candidates.is_empty() {
            return Extraction::Empty;
        }
        let total = candidates.len();
        let plausible: Vec<RawTrade> = candidates
            .into_iter()
            .filter(|trade| self.is_plausible(trade))
            .collect();
        if plausible.is_empty() {
            return Extraction::Failed(format!(
                "{total} candidate rows, none with an asset and a dated transaction"
            ));
        }
        Extraction::Success(dedup_records(plausible))
    }
}

/// Drop records that repeat an earlier one field for field.
///
/// Repeated header/footer blocks on multi-page documents produce exact
/// duplicates; the content hash would reject them downstream anyway,
/// but dropping them here keeps the counts honest.
fn dedup_records(records: Vec<RawTrade>) -> Vec<RawTrade> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|trade| {
            let key = format!(
                "{}|{}|{}|{}|{}",
                trade.asset,
                trade.ticker.as_deref().unwrap_or(""),
                trade.transaction_type.as_deref().unwrap_or(""),
                trade.transaction_date.as_deref().unwrap_or(""),
                trade.amount.as_deref().unwrap_or("")
            );
            seen.insert(key)
        })
        .collect()
}

// ============================================================================
// Strategy 1: structured table
// ============================================================================

/// Cells that mark a line as a table header.
const HEADER_INDICATORS: &[&str] = &[
    "transaction",
    "asset",
    "ticker",
    "symbol",
    "date",
    "amount",
    "purchase",
    "sale",
    "security",
    "description",
    "value",
];

/// Role a header cell assigns to its column.
#[derive(Debug, Clone, Copy, PartialEq)]
enum ColumnRole {
    Asset,
    Ticker,
    Type,
    Date,
    Amount,
}

/// Extracts from documents that render trades as a headed table.
///
/// Finds a header line whose cells name the columns, derives each
/// column's role from its header text, then maps every following row
/// through those roles. Documents without a recognizable header fall
/// through to the next strategy.
pub struct TableExtraction {
    classifier: FieldClassifier,
    cell_splitter: Regex,
}

impl TableExtraction {
    pub fn new() -> Result<Self> {
        Ok(Self {
            classifier: FieldClassifier::new()?,
            cell_splitter: Regex::new(r"\t|\s{2,}")?,
        })
    }

    fn split_cells<'a>(&self, line: &'a str) -> Vec<&'a str> {
        self.cell_splitter
            .split(line)
            .map(str::trim)
            .filter(|cell| !cell.is_empty())
            .collect()
    }

    fn is_header_line(&self, cells: &[&str]) -> bool {
        let indicator_cells = cells
            .iter()
            .filter(|cell| {
                let lower = cell.to_lowercase();
                HEADER_INDICATORS.iter().any(|word| lower.contains(word))
            })
            .count();
        indicator_cells >= 2
    }

    /// Order matters: "Transaction Date" must map to Date, not Type.
    fn role_for_header(&self, cell: &str) -> Option<ColumnRole> {
        let lower = cell.to_lowercase();
        if lower.contains("date") {
            Some(ColumnRole::Date)
        } else if lower.contains("amount") || lower.contains("value") {
            Some(ColumnRole::Amount)
        } else if lower.contains("ticker") || lower.contains("symbol") {
            Some(ColumnRole::Ticker)
        } else if lower.contains("asset")
            || lower.contains("security")
            || lower.contains("description")
        {
            Some(ColumnRole::Asset)
        } else if lower.contains("type")
            || lower.contains("transaction")
            || lower.contains("purchase")
            || lower.contains("sale")
        {
            Some(ColumnRole::Type)
        } else {
            None
        }
    }

    fn map_row(&self, roles: &[Option<ColumnRole>], cells: &[&str]) -> Option<RawTrade> {
        let mut trade = RawTrade::default();
        let mut saw_date = false;
        for (role, cell) in roles.iter().zip(cells) {
            let cell = cell.trim();
            if cell.is_empty() {
                continue;
            }
            match role {
                Some(ColumnRole::Asset) => trade.asset = cell.to_string(),
                Some(ColumnRole::Ticker) => trade.ticker = Some(cell.to_string()),
                Some(ColumnRole::Type) => trade.transaction_type = Some(cell.to_string()),
                Some(ColumnRole::Date) => {
                    if saw_date {
                        trade.notification_date = Some(cell.to_string());
                    } else {
                        trade.transaction_date = Some(cell.to_string());
                        saw_date = true;
                    }
                }
                Some(ColumnRole::Amount) => trade.amount = Some(cell.to_string()),
                None => {}
            }
        }
        if trade.asset.is_empty() {
            return None;
        }
        Some(trade)
    }
}

impl ExtractionStrategy for TableExtraction {
    fn name(&self) -> &'static str {
        "structured-table"
    }

    fn extract(&self, text: &str) -> Extraction {
        // Empty until a header line fixes the column roles.
        let mut roles: Vec<Option<ColumnRole>> = Vec::new();
        let mut candidates = Vec::new();

        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let cells = self.split_cells(line);
            if roles.is_empty() {
                if self.is_header_line(&cells) {
                    roles = cells
                        .iter()
                        .map(|cell| self.role_for_header(cell))
                        .collect();
                }
                continue;
            }
            // Page furniture between rows splits into one cell and is
            // skipped rather than ending the table.
            if cells.len() < 2 {
                continue;
            }
            if let Some(trade) = self.map_row(&roles, &cells) {
                candidates.push(trade);
            }
        }

        if roles.is_empty() {
            return Extraction::Empty;
        }
        self.classifier.finish(candidates)
    }
}

// ============================================================================
// Strategy 2: line patterns
// ============================================================================

/// Capture-group order of a line pattern.
#[derive(Debug, Clone, Copy)]
enum CaptureLayout {
    TypeTickerAsset,
    TypeAssetTicker,
    AssetTickerType,
}

/// Extracts from documents where each trade collapses to one line.
///
/// Tries a fixed set of field orderings observed in real filings; the
/// date and amount anchors at the end of each pattern keep the greedy
/// asset group from swallowing the rest of the line.
pub struct LinePatternExtraction {
    classifier: FieldClassifier,
    patterns: Vec<(Regex, CaptureLayout)>,
}

impl LinePatternExtraction {
    pub fn new() -> Result<Self> {
        const DATE: &str = r"\d{1,2}/\d{1,2}/\d{4}";
        const AMOUNT: &str = r"\$[\d,]+\s*[-\u{2013}]\s*\$[\d,]+";
        let patterns = vec![
            (
                Regex::new(&format!(
                    r"(?m)^\s*((?i:Purchase|Sale)|[PS])\s+([A-Z]{{1,5}})\s+(.+?)\s+({DATE})\s+({AMOUNT})"
                ))?,
                CaptureLayout::TypeTickerAsset,
            ),
            (
                Regex::new(&format!(
                    r"(?m)^\s*([PS])\s+(.+?)\s+([A-Z]{{1,5}})\s+({DATE})\s+({AMOUNT})"
                ))?,
                CaptureLayout::TypeAssetTicker,
            ),
            (
                Regex::new(&format!(
                    r"(?m)^\s*(.+?)\s+([A-Z]{{1,5}})\s+((?i:Purchase|Sale)|[PS])\s+({DATE})\s+({AMOUNT})"
                ))?,
                CaptureLayout::AssetTickerType,
            ),
        ];
        Ok(Self {
            classifier: FieldClassifier::new()?,
            patterns,
        })
    }

    fn trade_from_captures(
        &self,
        layout: CaptureLayout,
        caps: &regex::Captures<'_>,
    ) -> Option<RawTrade> {
        let group = |i: usize| caps.get(i).map(|m| m.as_str().trim().to_string());
        let (asset, ticker, transaction_type) = match layout {
            CaptureLayout::TypeTickerAsset => (group(3)?, group(2), group(1)),
            CaptureLayout::TypeAssetTicker => (group(2)?, group(3), group(1)),
            CaptureLayout::AssetTickerType => (group(1)?, group(2), group(3)),
        };
        Some(RawTrade {
            asset,
            ticker,
            transaction_type,
            transaction_date: group(4),
            notification_date: None,
            amount: group(5),
            notes: None,
        })
    }
}

impl ExtractionStrategy for LinePatternExtraction {
    fn name(&self) -> &'static str {
        "line-pattern"
    }

    fn extract(&self, text: &str) -> Extraction {
        let mut candidates = Vec::new();
        for (pattern, layout) in &self.patterns {
            for caps in pattern.captures_iter(text) {
                if let Some(trade) = self.trade_from_captures(*layout, &caps) {
                    candidates.push(trade);
                }
            }
        }
        self.classifier.finish(candidates)
    }
}

// ============================================================================
// Strategy 3: text heuristic
// ============================================================================

/// Last-resort extraction for free-form text.
///
/// Keeps any line that carries a transaction word plus a date or amount
/// shape, splits it on runs of whitespace (falling back to pipes), and
/// classifies the pieces by shape.
pub struct HeuristicExtraction {
    classifier: FieldClassifier,
    field_splitter: Regex,
}

impl HeuristicExtraction {
    pub fn new() -> Result<Self> {
        Ok(Self {
            classifier: FieldClassifier::new()?,
            field_splitter: Regex::new(r"\t|\s{2,}")?,
        })
    }

    fn line_has_trade_shape(&self, line: &str) -> bool {
        let upper = line.to_uppercase();
        let has_transaction = TRANSACTION_TYPES
            .iter()
            .any(|word| upper.split_whitespace().any(|token| token == *word))
            || self.classifier.contains_transaction_word(line);
        has_transaction
            && (self.classifier.is_amount_like(line) || self.classifier.is_date_like(line))
    }

    fn parse_line(&self, line: &str) -> Option<RawTrade> {
        let mut fields: Vec<&str> = self
            .field_splitter
            .split(line)
            .map(str::trim)
            .filter(|field| !field.is_empty())
            .collect();
        if fields.len() < 3 {
            fields = line
                .split('|')
                .map(str::trim)
                .filter(|field| !field.is_empty())
                .collect();
        }
        if fields.len() < 3 {
            return None;
        }
        self.classifier.classify_row(&fields)
    }
}

impl ExtractionStrategy for HeuristicExtraction {
    fn name(&self) -> &'static str {
        "text-heuristic"
    }

    fn extract(&self, text: &str) -> Extraction {
        let candidates: Vec<RawTrade> = text
            .lines()
            .filter(|line| self.line_has_trade_shape(line))
            .filter_map(|line| self.parse_line(line))
            .collect();
        self.classifier.finish(candidates)
    }
}

// ============================================================================
// Driver
// ============================================================================

/// Strategy chain in priority order.
pub fn default_strategies() -> Result<Vec<Box<dyn ExtractionStrategy>>> {
    Ok(vec![
        Box::new(TableExtraction::new()?),
        Box::new(LinePatternExtraction::new()?),
        Box::new(HeuristicExtraction::new()?),
    ])
}

/// Run the strategy chain, returning the first plausible non-empty result.
///
/// `Empty` and `Failed` both fall through to the next strategy; a
/// document that exhausts the chain comes back `Empty`, which is a
/// legitimate outcome for filings that amend or withdraw rather than
/// report trades.
pub fn extract_trades(text: &str) -> Result<Extraction> {
    for strategy in default_strategies()? {
        match strategy.extract(text) {
            Extraction::Success(records) => {
                debug!(
                    strategy = strategy.name(),
                    records = records.len(),
                    "extraction strategy matched"
                );
                return Ok(Extraction::Success(records));
            }
            Extraction::Empty => {}
            Extraction::Failed(reason) => {
                debug!(
                    strategy = strategy.name(),
                    %reason,
                    "extraction strategy failed, trying next"
                );
            }
        }
    }
    Ok(Extraction::Empty)
}
