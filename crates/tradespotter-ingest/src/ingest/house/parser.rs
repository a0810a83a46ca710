//! Bulk index parsing
//!
//! The yearly archive carries one tab-delimited text file listing every
//! filing: prefix, last, first, suffix, filing type code, state+district
//! compound, year, filing date, document id. Rows that cannot be mapped
//! are recorded and skipped; a bad row never aborts the batch.

use tracing::{debug, info, warn};

use crate::models::BulkFilingRow;

/// Columns in the Clerk's index file, in order.
const INDEX_COLUMNS: usize = 9;

/// Result of parsing one index file
#[derive(Debug, Clone, Default)]
pub struct ParsedIndex {
    pub rows: Vec<BulkFilingRow>,
    pub skipped: Vec<SkippedRow>,
}

/// A row that could not be mapped, with its reason
#[derive(Debug, Clone)]
pub struct SkippedRow {
    /// 1-based line number in the index file
    pub line: usize,
    pub reason: String,
}

/// Parser for the tab-delimited bulk filing index
#[derive(Debug, Default)]
pub struct BulkIndexParser;

impl BulkIndexParser {
    pub fn new() -> Self {
        Self
    }

    /// Map index text to raw filing rows.
    ///
    /// The header line is detected by its first column label and
    /// tolerated missing. Rows short on columns or missing last name,
    /// first name, or document id are skipped with a reason.
    pub fn parse(&self, index_text: &str) -> ParsedIndex {
        let mut parsed = ParsedIndex::default();

        for (idx, line) in index_text.lines().enumerate() {
            let line_no = idx + 1;

            if line.trim().is_empty() {
                continue;
            }

            if idx == 0 && is_header(line) {
                continue;
            }

            match parse_row(line) {
                Ok(row) => parsed.rows.push(row),
                Err(reason) => {
                    warn!(line = line_no, reason = %reason, "Skipping index row");
                    parsed.skipped.push(SkippedRow {
                        line: line_no,
                        reason,
                    });
                }
            }
        }

        info!(
            rows = parsed.rows.len(),
            skipped = parsed.skipped.len(),
            "Index parsing completed"
        );

        parsed
    }
}

fn parse_row(line: &str) -> Result<BulkFilingRow, String> {
    let fields: Vec<String> = line.split('\t').map(clean_field).collect();

    if fields.len() < INDEX_COLUMNS {
        return Err(format!(
            "expected {INDEX_COLUMNS} columns, found {}",
            fields.len()
        ));
    }

    if fields.len() > INDEX_COLUMNS {
        debug!(
            columns = fields.len(),
            "Index row has extra columns, ignoring the surplus"
        );
    }

    let row = BulkFilingRow {
        prefix: fields[0].clone(),
        last_name: fields[1].clone(),
        first_name: fields[2].clone(),
        suffix: fields[3].clone(),
        filing_type_code: fields[4].clone(),
        state_district: fields[5].clone(),
        year: fields[6].clone(),
        filing_date: fields[7].clone(),
        document_id: fields[8].clone(),
    };

    if row.last_name.is_empty() || row.first_name.is_empty() || row.document_id.is_empty() {
        return Err("missing required fields (last name, first name, document id)".to_string());
    }

    Ok(row)
}

/// Collapse whitespace runs and strip decode artifacts from one field.
fn clean_field(field: &str) -> String {
    field
        .replace(['\u{0}', '\u{fffd}'], "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// The header starts with the `Prefix` column label, possibly behind a
/// byte order mark.
fn is_header(line: &str) -> bool {
    line.trim_start_matches('\u{feff}')
        .split('\t')
        .next()
        .is_some_and(|first| first.trim().eq_ignore_ascii_case("Prefix"))
}
