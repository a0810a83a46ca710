//! Idempotent persistence for the three-entity filing model
//!
//! Politician rows are merged preferring existing data, disclosures are
//! unique per (politician, source, document), and trades dedupe on their
//! content hash. Every operation is safe to replay; duplicates come back
//! as [`UpsertOutcome::Duplicate`], never as errors. Uniqueness is
//! enforced by database constraints plus insert-on-conflict, so
//! concurrent workers touching the same politician cannot produce
//! duplicate identity rows.

use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::error::{IngestError, Result};
use crate::models::{NewDisclosure, NewPolitician, NewTrade, NormalizedFiling, UpsertOutcome};

/// Hash prefix length used when sampling duplicate groups in reports.
const SAMPLE_HASH_LEN: usize = 12;

/// Maximum duplicate hashes listed in a cleanup report.
const SAMPLE_HASH_COUNT: usize = 10;

/// Persistence handler for politicians, disclosures, and trades
pub struct Upserter {
    pool: PgPool,
}

/// Outcome of persisting one normalized filing
#[derive(Debug, Clone, Copy)]
pub struct FilingOutcome {
    pub politician: UpsertOutcome,
    pub disclosure: UpsertOutcome,
}

/// Ids needed to attach trades to an already-ingested disclosure
#[derive(Debug, Clone, Copy, FromRow)]
pub struct DisclosureRef {
    pub disclosure_id: Uuid,
    pub politician_id: Uuid,
}

/// One group of trades sharing a content hash
#[derive(Debug, Clone, FromRow)]
pub struct DuplicateGroup {
    pub row_hash: String,
    pub count: i64,
    /// Ids ordered by creation time, earliest first
    pub trade_ids: Vec<Uuid>,
}

/// Result of a duplicate-trade cleanup pass
#[derive(Debug, Clone, Serialize)]
pub struct CleanupReport {
    /// Redundant rows found beyond the earliest of each group
    pub duplicates_found: usize,
    /// Rows actually deleted (zero on a dry run)
    pub duplicates_removed: usize,
    pub dry_run: bool,
    /// Truncated hashes of the first few affected groups
    pub sample_hashes: Vec<String>,
}

/// Row counts and consistency measures across the three tables
#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    pub total_politicians: i64,
    pub total_disclosures: i64,
    pub total_trades: i64,
    pub orphaned_trades: i64,
    pub blank_asset_trades: i64,
    pub duplicate_hash_groups: i64,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.orphaned_trades == 0 && self.blank_asset_trades == 0 && self.duplicate_hash_groups == 0
    }
}

impl Upserter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a pool from configuration.
    ///
    /// An unreachable datastore at startup is a configuration failure,
    /// the fatal error class.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(&config.url)
            .await
            .map_err(|e| IngestError::Configuration(format!("cannot reach datastore: {e}")))?;

        info!(
            max_connections = config.max_connections,
            "Database pool initialized"
        );

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Round-trip connectivity probe for health checks.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }

    /// Insert a politician or merge into the existing row.
    ///
    /// Lookup is by (full_name, state) with a fuzzy district match: a null
    /// district on either side still hits, so a later filing can fill in a
    /// missing district without spawning a second identity. Existing
    /// non-blank fields are never overwritten.
    pub async fn upsert_politician(&self, politician: &NewPolitician) -> Result<UpsertOutcome> {
        let existing = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id FROM politicians
            WHERE full_name = $1
              AND state IS NOT DISTINCT FROM $2
              AND (district = $3 OR district IS NULL OR $3 IS NULL)
            ORDER BY created_at
            LIMIT 1
            "#,
        )
        .bind(&politician.full_name)
        .bind(&politician.state)
        .bind(&politician.district)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(id) = existing {
            let merged = sqlx::query_scalar::<_, Uuid>(
                r#"
                UPDATE politicians SET
                    first_name = COALESCE(NULLIF(first_name, ''), $2),
                    last_name = COALESCE(NULLIF(last_name, ''), $3),
                    district = COALESCE(district, $4),
                    party = COALESCE(party, $5),
                    external_ids = external_ids || $6,
                    updated_at = NOW()
                WHERE id = $1
                RETURNING id
                "#,
            )
            .bind(id)
            .bind(&politician.first_name)
            .bind(&politician.last_name)
            .bind(&politician.district)
            .bind(&politician.party)
            .bind(&politician.external_ids)
            .fetch_one(&self.pool)
            .await?;

            debug!(politician = %politician.full_name, id = %merged, "Politician merged");
            return Ok(UpsertOutcome::Duplicate(merged));
        }

        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO politicians
                (full_name, first_name, last_name, chamber, state, district, party, external_ids)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (full_name, state, district) DO UPDATE SET
                first_name = COALESCE(NULLIF(politicians.first_name, ''), EXCLUDED.first_name),
                last_name = COALESCE(NULLIF(politicians.last_name, ''), EXCLUDED.last_name),
                party = COALESCE(politicians.party, EXCLUDED.party),
                external_ids = politicians.external_ids || EXCLUDED.external_ids,
                updated_at = NOW()
            RETURNING id
            "#,
        )
        .bind(&politician.full_name)
        .bind(&politician.first_name)
        .bind(&politician.last_name)
        .bind(politician.chamber.as_str())
        .bind(&politician.state)
        .bind(&politician.district)
        .bind(&politician.party)
        .bind(&politician.external_ids)
        .fetch_one(&self.pool)
        .await?;

        debug!(politician = %politician.full_name, id = %id, "Politician inserted");
        Ok(UpsertOutcome::Inserted(id))
    }

    /// Insert a disclosure unless (politician, source, document) exists.
    ///
    /// Re-ingesting an archive bumps `updated_at` on the existing row and
    /// reports a duplicate skip.
    pub async fn insert_disclosure(&self, disclosure: &NewDisclosure) -> Result<UpsertOutcome> {
        let inserted = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO disclosures
                (politician_id, source, document_id, filing_type, filed_date, raw_metadata)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (politician_id, source, document_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(disclosure.politician_id)
        .bind(&disclosure.source)
        .bind(&disclosure.document_id)
        .bind(disclosure.filing_type.as_str())
        .bind(disclosure.filed_date)
        .bind(&disclosure.raw_metadata)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(id) = inserted {
            return Ok(UpsertOutcome::Inserted(id));
        }

        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE disclosures SET updated_at = NOW()
            WHERE politician_id = $1 AND source = $2 AND document_id = $3
            RETURNING id
            "#,
        )
        .bind(disclosure.politician_id)
        .bind(&disclosure.source)
        .bind(&disclosure.document_id)
        .fetch_one(&self.pool)
        .await?;

        debug!(
            document_id = %disclosure.document_id,
            "Disclosure already present, skipped"
        );
        Ok(UpsertOutcome::Duplicate(id))
    }

    /// Insert a trade; a content-hash collision is a successful no-op.
    pub async fn insert_trade(&self, trade: &NewTrade) -> Result<UpsertOutcome> {
        let inserted = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO trades
                (disclosure_id, politician_id, transaction_date, published_date,
                 ticker, asset_name, side, amount_range, amount_min, amount_max,
                 notes, row_hash)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (row_hash) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(trade.disclosure_id)
        .bind(trade.politician_id)
        .bind(trade.transaction_date)
        .bind(trade.published_date)
        .bind(&trade.ticker)
        .bind(&trade.asset_name)
        .bind(trade.side.map(|s| s.as_str()))
        .bind(&trade.amount_range)
        .bind(trade.amount_min)
        .bind(trade.amount_max)
        .bind(&trade.notes)
        .bind(&trade.row_hash)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(id) = inserted {
            return Ok(UpsertOutcome::Inserted(id));
        }

        let id = sqlx::query_scalar::<_, Uuid>("SELECT id FROM trades WHERE row_hash = $1")
            .bind(&trade.row_hash)
            .fetch_one(&self.pool)
            .await?;

        debug!(row_hash = %trade.row_hash, "Trade already present, skipped");
        Ok(UpsertOutcome::Duplicate(id))
    }

    /// Persist one normalized filing: politician first, then disclosure.
    ///
    /// No surrounding transaction; a crash between the two statements
    /// leaves state the next run completes idempotently.
    pub async fn upsert_filing(&self, filing: &NormalizedFiling) -> Result<FilingOutcome> {
        let politician = self.upsert_politician(&filing.politician).await?;

        let disclosure = self
            .insert_disclosure(&NewDisclosure {
                politician_id: politician.id(),
                source: filing.source.clone(),
                document_id: filing.document_id.clone(),
                filing_type: filing.filing_type,
                filed_date: filing.filed_date,
                raw_metadata: filing.raw_metadata.clone(),
            })
            .await?;

        Ok(FilingOutcome {
            politician,
            disclosure,
        })
    }

    /// Look up an ingested disclosure by its natural key.
    ///
    /// Trade extraction runs against documents whose index rows were
    /// already upserted; a miss here means bulk ingestion has not seen
    /// the document yet.
    pub async fn find_disclosure(
        &self,
        source: &str,
        document_id: &str,
    ) -> Result<Option<DisclosureRef>> {
        let found = sqlx::query_as::<_, DisclosureRef>(
            "SELECT id AS disclosure_id, politician_id FROM disclosures \
             WHERE source = $1 AND document_id = $2",
        )
        .bind(source)
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(found)
    }

    /// Find trades that share a content hash.
    ///
    /// The unique constraint prevents new collisions; this surfaces rows
    /// that predate it or were loaded around it.
    pub async fn find_duplicate_trades(&self) -> Result<Vec<DuplicateGroup>> {
        let groups = sqlx::query_as::<_, DuplicateGroup>(
            r#"
            SELECT row_hash,
                   COUNT(*) AS count,
                   ARRAY_AGG(id ORDER BY created_at) AS trade_ids
            FROM trades
            GROUP BY row_hash
            HAVING COUNT(*) > 1
            ORDER BY count DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(groups)
    }

    /// Delete all but the earliest-created trade in each duplicate group.
    ///
    /// With `dry_run` the report lists what would be removed without
    /// touching any row.
    pub async fn cleanup_duplicate_trades(&self, dry_run: bool) -> Result<CleanupReport> {
        let groups = self.find_duplicate_trades().await?;

        let mut removable: Vec<Uuid> = Vec::new();
        for group in &groups {
            removable.extend(group.trade_ids.iter().skip(1));
        }

        let sample_hashes: Vec<String> = groups
            .iter()
            .take(SAMPLE_HASH_COUNT)
            .map(|g| g.row_hash.chars().take(SAMPLE_HASH_LEN).collect())
            .collect();

        if dry_run {
            info!(
                groups = groups.len(),
                redundant_rows = removable.len(),
                "Dry run, no trades deleted"
            );
            return Ok(CleanupReport {
                duplicates_found: removable.len(),
                duplicates_removed: 0,
                dry_run: true,
                sample_hashes,
            });
        }

        let mut removed = 0usize;
        if !removable.is_empty() {
            let result = sqlx::query("DELETE FROM trades WHERE id = ANY($1)")
                .bind(&removable)
                .execute(&self.pool)
                .await?;
            removed = result.rows_affected() as usize;

            warn!(
                groups = groups.len(),
                removed, "Removed duplicate trade rows"
            );
        }

        Ok(CleanupReport {
            duplicates_found: removable.len(),
            duplicates_removed: removed,
            dry_run: false,
            sample_hashes,
        })
    }

    /// Count rows and cross-table inconsistencies.
    pub async fn validate_integrity(&self) -> Result<IntegrityReport> {
        let total_politicians =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM politicians")
                .fetch_one(&self.pool)
                .await?;

        let total_disclosures =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM disclosures")
                .fetch_one(&self.pool)
                .await?;

        let total_trades = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM trades")
            .fetch_one(&self.pool)
            .await?;

        let orphaned_trades = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM trades t
            LEFT JOIN disclosures d ON t.disclosure_id = d.id
            WHERE d.id IS NULL
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let blank_asset_trades =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM trades WHERE asset_name = ''")
                .fetch_one(&self.pool)
                .await?;

        let duplicate_hash_groups = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM (
                SELECT row_hash FROM trades GROUP BY row_hash HAVING COUNT(*) > 1
            ) g
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(IntegrityReport {
            total_politicians,
            total_disclosures,
            total_trades,
            orphaned_trades,
            blank_asset_trades,
            duplicate_hash_groups,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_integrity_report_is_clean() {
        let clean = IntegrityReport {
            total_politicians: 10,
            total_disclosures: 25,
            total_trades: 100,
            orphaned_trades: 0,
            blank_asset_trades: 0,
            duplicate_hash_groups: 0,
        };
        assert!(clean.is_clean());

        let dirty = IntegrityReport {
            duplicate_hash_groups: 2,
            ..clean
        };
        assert!(!dirty.is_clean());
    }
}
