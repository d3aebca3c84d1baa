//! Migration execution - apply a plan inside one transaction.
//!
//! The whole plan runs in a single transaction scope: `BEGIN`, an advisory
//! lock serializing DDL across processes, every step in plan order, then
//! `COMMIT`. The first failing step rolls everything back, so no partial
//! schema change is ever observable. Cancelling the future mid-run has the
//! same effect: the `COMMIT` is never sent and the server discards the
//! transaction when the connection is next used or closed.
//!
//! Re-running after a rollback is idempotent by construction: the actual
//! schema is unchanged, so re-diffing reproduces the identical plan.

use crate::conn::Connection;
use crate::error::{Error, Result};
use crate::plan::MigrationPlan;

/// Advisory lock key under which all regrade executors serialize. The value
/// spells "REGRADE" in ASCII.
const MIGRATION_LOCK_KEY: i64 = 0x52_45_47_52_41_44_45;

/// Options for plan execution.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecuteOptions {
    /// Apply the destructive bucket too. Off by default; a plan with
    /// destructive steps is refused outright when this is unset.
    pub allow_destructive: bool,
}

/// What [`apply`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecuteReport {
    /// Total steps applied.
    pub applied: usize,
    /// How many of them came from the destructive bucket.
    pub destructive_applied: usize,
}

/// Apply an ordered migration plan.
///
/// Fails with [`Error::DestructiveRefused`] before touching the database if
/// the plan has destructive steps and `allow_destructive` is unset. Any
/// failing step produces [`Error::MigrationFailed`] after a rollback.
pub async fn apply<C: Connection>(
    conn: &C,
    plan: &MigrationPlan,
    options: ExecuteOptions,
) -> Result<ExecuteReport> {
    if !plan.destructive.is_empty() && !options.allow_destructive {
        return Err(Error::DestructiveRefused {
            steps: plan.destructive.len(),
        });
    }
    if plan.is_empty() {
        return Ok(ExecuteReport::default());
    }

    conn.execute("BEGIN", &[]).await?;
    match apply_steps(conn, plan).await {
        Ok(report) => {
            conn.execute("COMMIT", &[]).await?;
            tracing::info!(
                applied = report.applied,
                destructive = report.destructive_applied,
                "migration committed"
            );
            Ok(report)
        }
        Err(err) => {
            if let Err(rollback_err) = conn.execute("ROLLBACK", &[]).await {
                tracing::warn!(error = %rollback_err, "rollback failed after migration error");
            }
            Err(err)
        }
    }
}

async fn apply_steps<C: Connection>(conn: &C, plan: &MigrationPlan) -> Result<ExecuteReport> {
    // Serialize schema changes across processes for the duration of the
    // transaction; the lock releases automatically on commit or rollback.
    conn.query("SELECT pg_advisory_xact_lock($1)", &[&MIGRATION_LOCK_KEY])
        .await?;

    let mut report = ExecuteReport::default();
    for (step_index, step) in plan.steps().enumerate() {
        let sql = step.to_sql();
        tracing::info!(step = step_index, change = %step, "applying");
        conn.execute(&sql, &[])
            .await
            .map_err(|source| Error::MigrationFailed {
                step: step_index,
                sql: sql.clone(),
                source,
            })?;
        report.applied += 1;
        if step_index >= plan.safe.len() {
            report.destructive_applied += 1;
        }
    }
    Ok(report)
}
