//! Database operations for PostgreSQL
//!
//! This module owns the connection pool and the trial repository. The pool
//! is created only after migrations have succeeded and is closed during
//! shutdown, after the background scheduler has stopped.

pub mod migrations;

pub use migrations::{apply as apply_migrations, Migration, MigrationError, MigrationReport};

use anyhow::{Context, Result};
use deadpool_postgres::{
    Config as PoolConfig, ManagerConfig, Pool, PoolConfig as PoolSizeConfig, RecyclingMethod,
    Runtime,
};
use serde::Serialize;
use tokio_postgres::types::ToSql;
use tokio_postgres::{NoTls, Row};

use crate::config::DatabaseConfig;
use crate::models::{ClinicalTrial, ReviewStatus, TrialFilter, TrialUpsert};

/// Database pool wrapper
#[derive(Clone)]
pub struct Database {
    pool: Pool,
}

impl Database {
    /// Create a connection pool for the configured database.
    ///
    /// Pool creation is lazy; no connection is established until first use.
    pub fn connect(config: &DatabaseConfig) -> Result<Self> {
        let mut cfg = PoolConfig::new();
        cfg.url = Some(config.url.clone());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        cfg.pool = Some(PoolSizeConfig::new(config.pool_size));

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .context("Failed to create PostgreSQL connection pool")?;

        Ok(Self { pool })
    }

    /// Verify the database is reachable
    pub async fn ping(&self) -> Result<()> {
        let client = self.pool.get().await.context("Failed to get connection")?;
        client
            .simple_query("SELECT 1")
            .await
            .context("Database ping failed")?;
        Ok(())
    }

    /// Access the underlying pool
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Close the pool, rejecting further checkouts
    pub fn close(&self) {
        self.pool.close();
    }
}

// ============================================================================
// Trial Repository
// ============================================================================

/// Outcome of a single upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// One page of a trial listing
#[derive(Debug, Clone, Serialize)]
pub struct TrialPage {
    pub items: Vec<ClinicalTrial>,
    pub total: i64,
}

const TRIAL_COLUMNS: &str = "id, nct_id, title, official_summary, custom_summary, status, \
     overall_status, conditions, phase, start_date, first_seen_at, last_updated";

/// Repository for clinical trial records
#[derive(Clone)]
pub struct TrialStore {
    pool: Pool,
}

impl TrialStore {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }

    /// Insert a trial or refresh its registry fields.
    ///
    /// Review fields (`status`, `custom_summary`) are never touched by the
    /// upsert, so re-ingesting a reviewed trial preserves its review state.
    pub async fn upsert(&self, trial: &TrialUpsert) -> Result<UpsertOutcome> {
        let client = self.pool.get().await.context("Failed to get connection")?;

        let row = client
            .query_one(
                "INSERT INTO clinical_trials
                    (nct_id, title, official_summary, overall_status, conditions, phase, start_date)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)
                 ON CONFLICT (nct_id) DO UPDATE SET
                    title = EXCLUDED.title,
                    official_summary = EXCLUDED.official_summary,
                    overall_status = EXCLUDED.overall_status,
                    conditions = EXCLUDED.conditions,
                    phase = EXCLUDED.phase,
                    start_date = EXCLUDED.start_date,
                    last_updated = now()
                 RETURNING (xmax = 0) AS inserted",
                &[
                    &trial.nct_id,
                    &trial.title,
                    &trial.official_summary,
                    &trial.overall_status,
                    &trial.conditions,
                    &trial.phase,
                    &trial.start_date,
                ],
            )
            .await
            .context("Failed to upsert trial")?;

        let inserted: bool = row.get("inserted");
        Ok(if inserted {
            UpsertOutcome::Inserted
        } else {
            UpsertOutcome::Updated
        })
    }

    /// List trials matching the filter, newest first
    pub async fn list(&self, filter: &TrialFilter) -> Result<TrialPage> {
        let filter = filter.clone().normalized();
        let client = self.pool.get().await.context("Failed to get connection")?;

        let status_value = filter.status.map(|s| s.as_str().to_string());
        let search_pattern = filter.search.as_ref().map(|s| format!("%{s}%"));

        let mut where_sql = String::new();
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();

        if let Some(ref status) = status_value {
            params.push(status);
            where_sql.push_str(&format!(" AND status = ${}", params.len()));
        }

        if let Some(ref pattern) = search_pattern {
            params.push(pattern);
            let n = params.len();
            where_sql.push_str(&format!(
                " AND (title ILIKE ${n} OR conditions ILIKE ${n})"
            ));
        }

        let count_sql = format!("SELECT COUNT(*) FROM clinical_trials WHERE TRUE{where_sql}");
        let total: i64 = client
            .query_one(&count_sql, &params)
            .await
            .context("Failed to count trials")?
            .get(0);

        params.push(&filter.limit);
        params.push(&filter.offset);
        let list_sql = format!(
            "SELECT {TRIAL_COLUMNS} FROM clinical_trials WHERE TRUE{where_sql}
             ORDER BY last_updated DESC, id DESC
             LIMIT ${} OFFSET ${}",
            params.len() - 1,
            params.len()
        );

        let rows = client
            .query(&list_sql, &params)
            .await
            .context("Failed to list trials")?;

        let items = rows.iter().map(row_to_trial).collect();
        Ok(TrialPage { items, total })
    }

    /// Fetch a single trial by registry identifier
    pub async fn get(&self, nct_id: &str) -> Result<Option<ClinicalTrial>> {
        let client = self.pool.get().await.context("Failed to get connection")?;

        let row = client
            .query_opt(
                &format!("SELECT {TRIAL_COLUMNS} FROM clinical_trials WHERE nct_id = $1"),
                &[&nct_id],
            )
            .await
            .context("Failed to fetch trial")?;

        Ok(row.as_ref().map(row_to_trial))
    }

    /// Update the review state of a trial.
    ///
    /// A `None` custom summary leaves the stored summary unchanged.
    /// Returns the updated record, or `None` if the trial is unknown.
    pub async fn update_review(
        &self,
        nct_id: &str,
        status: ReviewStatus,
        custom_summary: Option<&str>,
    ) -> Result<Option<ClinicalTrial>> {
        let client = self.pool.get().await.context("Failed to get connection")?;

        let row = client
            .query_opt(
                &format!(
                    "UPDATE clinical_trials SET
                        status = $2,
                        custom_summary = COALESCE($3, custom_summary),
                        last_updated = now()
                     WHERE nct_id = $1
                     RETURNING {TRIAL_COLUMNS}"
                ),
                &[&nct_id, &status.as_str(), &custom_summary],
            )
            .await
            .context("Failed to update trial review")?;

        Ok(row.as_ref().map(row_to_trial))
    }

    /// Count trials grouped by review status
    pub async fn counts_by_status(&self) -> Result<Vec<(ReviewStatus, i64)>> {
        let client = self.pool.get().await.context("Failed to get connection")?;

        let rows = client
            .query(
                "SELECT status, COUNT(*) FROM clinical_trials GROUP BY status",
                &[],
            )
            .await
            .context("Failed to count trials by status")?;

        Ok(rows
            .iter()
            .map(|row| {
                let status: String = row.get(0);
                let count: i64 = row.get(1);
                (ReviewStatus::parse(&status).unwrap_or_default(), count)
            })
            .collect())
    }
}

/// Map a database row to a trial record
fn row_to_trial(row: &Row) -> ClinicalTrial {
    let status: String = row.get("status");

    ClinicalTrial {
        id: row.get("id"),
        nct_id: row.get("nct_id"),
        title: row.get("title"),
        official_summary: row.get("official_summary"),
        custom_summary: row.get("custom_summary"),
        status: ReviewStatus::parse(&status).unwrap_or_default(),
        overall_status: row.get("overall_status"),
        conditions: row.get("conditions"),
        phase: row.get("phase"),
        start_date: row.get("start_date"),
        first_seen_at: row.get("first_seen_at"),
        last_updated: row.get("last_updated"),
    }
}
