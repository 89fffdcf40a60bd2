//! Schema migration runner
//!
//! Applies the embedded, ordered migration steps under `migrations/` to the
//! configured database before the service accepts traffic. Applied versions
//! are recorded in a `schema_migrations` table, so re-running against a
//! current schema is a no-op. Each step executes inside its own
//! transaction; a failing step leaves previously applied steps committed
//! and the failing one rolled back.

use thiserror::Error;
use tokio_postgres::NoTls;

/// A single ordered migration step
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: i32,
    pub name: &'static str,
    pub sql: &'static str,
}

/// All known migrations, in application order
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_clinical_trials",
        sql: include_str!("../../migrations/0001_create_clinical_trials.sql"),
    },
    Migration {
        version: 2,
        name: "add_trial_indexes",
        sql: include_str!("../../migrations/0002_add_trial_indexes.sql"),
    },
];

/// Migration errors, fatal at startup
#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("database url must not be empty")]
    EmptyDatabaseUrl,

    #[error("failed to connect to database: {0}")]
    Connect(#[source] tokio_postgres::Error),

    #[error("failed to prepare schema_migrations table: {0}")]
    Setup(#[source] tokio_postgres::Error),

    #[error("migration {version} ({name}) failed: {source}")]
    Step {
        version: i32,
        name: &'static str,
        #[source]
        source: tokio_postgres::Error,
    },
}

/// Outcome of a migration run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationReport {
    /// Number of steps applied by this run
    pub applied: usize,

    /// Schema version after the run
    pub current_version: i32,
}

impl MigrationReport {
    /// True when the schema was already current
    pub fn was_noop(&self) -> bool {
        self.applied == 0
    }
}

/// Apply all pending migrations to the database at `database_url`.
///
/// Idempotent: running against a schema that is already at the latest
/// version applies nothing and reports a no-op. Any failure is fatal to
/// startup; the caller must not open the listener or arm the scheduler.
pub async fn apply(database_url: &str) -> Result<MigrationReport, MigrationError> {
    if database_url.trim().is_empty() {
        return Err(MigrationError::EmptyDatabaseUrl);
    }

    let (mut client, connection) = tokio_postgres::connect(database_url, NoTls)
        .await
        .map_err(MigrationError::Connect)?;

    // Drive the connection until the migration client is dropped
    let driver = tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::debug!(error = %e, "migration connection closed");
        }
    });

    client
        .batch_execute(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
        )
        .await
        .map_err(MigrationError::Setup)?;

    let row = client
        .query_one(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            &[],
        )
        .await
        .map_err(MigrationError::Setup)?;
    let mut current_version: i32 = row.get(0);

    let mut applied = 0;
    for migration in MIGRATIONS {
        if migration.version <= current_version {
            continue;
        }

        tracing::info!(
            version = migration.version,
            name = migration.name,
            "Applying migration"
        );

        let tx = client.transaction().await.map_err(|e| MigrationError::Step {
            version: migration.version,
            name: migration.name,
            source: e,
        })?;

        tx.batch_execute(migration.sql)
            .await
            .map_err(|e| MigrationError::Step {
                version: migration.version,
                name: migration.name,
                source: e,
            })?;

        tx.execute(
            "INSERT INTO schema_migrations (version, name) VALUES ($1, $2)",
            &[&migration.version, &migration.name],
        )
        .await
        .map_err(|e| MigrationError::Step {
            version: migration.version,
            name: migration.name,
            source: e,
        })?;

        tx.commit().await.map_err(|e| MigrationError::Step {
            version: migration.version,
            name: migration.name,
            source: e,
        })?;

        current_version = migration.version;
        applied += 1;
    }

    drop(client);
    let _ = driver.await;

    if applied == 0 {
        tracing::info!(version = current_version, "Schema already current");
    } else {
        tracing::info!(
            applied = applied,
            version = current_version,
            "Migrations applied"
        );
    }

    Ok(MigrationReport {
        applied,
        current_version,
    })
}
