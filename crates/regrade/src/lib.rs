//! Schema diff and migration engine for Postgres.
//!
//! regrade compares a declared schema against the live database catalog and
//! produces a safe, ordered DDL plan, then applies it in a single
//! transaction. The pipeline is:
//!
//! 1. **introspect** - read the actual schema out of `pg_catalog`
//! 2. **diff** - compare desired vs actual, producing migration steps
//! 3. **plan** - order the steps; quarantine the destructive ones
//! 4. **execute** - apply everything transactionally, all-or-nothing
//!
//! # Example
//!
//! ```ignore
//! use regrade::{Column, PgType, Schema, Table};
//!
//! let desired = Schema::builder()
//!     .table(
//!         Table::builder("user")
//!             .column(Column::new("id", PgType::BigInt).identity())
//!             .column(Column::new("email", PgType::Text))
//!             .primary_key(["id"])
//!             .unique(["email"])
//!             .build()?,
//!     )
//!     .build()?;
//!
//! let report = regrade::migrate(&client, &desired, &MigrateOptions::default()).await?;
//! ```
//!
//! Destructive steps (dropped tables or columns, narrowing type changes)
//! never run unless the caller opts in; without the opt-in a plan containing
//! any is refused before the transaction starts. Renames are only recognized
//! through explicit [`RenameHints`] - regrade does not guess.

mod conn;
mod ddl;
mod diff;
mod error;
mod execute;
mod introspect;
mod plan;

pub use conn::{Connection, ConnectionExt, TracedConn, TracedObject, TracedPool};
pub use ddl::quote_ident;
pub use diff::{MigrationStep, RenameHints, diff_schemas, diff_schemas_with_hints};
pub use error::{Error, Result};
pub use execute::{ExecuteOptions, ExecuteReport, apply};
pub use introspect::{IntrospectOptions, introspect, introspect_with, normalize_type};
pub use plan::MigrationPlan;

// Re-export the descriptor types so applications only need one crate.
pub use regrade_db_schema::{
    Column, Constraint, ForeignKey, Index, PgType, ReferentialAction, Schema, SchemaBuilder,
    SchemaError, Table, TableBuilder,
};

/// Options for the full [`migrate`] pipeline.
#[derive(Debug, Clone, Default)]
pub struct MigrateOptions {
    /// Apply destructive steps too. See [`ExecuteOptions::allow_destructive`].
    pub allow_destructive: bool,
    /// Explicit rename hints; without them renames diff as drop + create.
    pub rename_hints: RenameHints,
}

/// Plan the changes needed to bring the database to `desired`, without
/// applying anything.
pub async fn plan_migration<C: Connection>(
    conn: &C,
    desired: &Schema,
    options: &MigrateOptions,
) -> Result<MigrationPlan> {
    let actual = introspect(conn).await?;
    let steps = diff_schemas_with_hints(desired, &actual, &options.rename_hints);
    plan::plan(steps, &actual)
}

/// Run the whole pipeline: introspect, diff, plan, execute.
///
/// One logical migration per invocation; the descriptors built along the way
/// are discarded afterwards, and the next invocation re-introspects from
/// scratch.
pub async fn migrate<C: Connection>(
    conn: &C,
    desired: &Schema,
    options: &MigrateOptions,
) -> Result<ExecuteReport> {
    let migration_plan = plan_migration(conn, desired, options).await?;
    apply(
        conn,
        &migration_plan,
        ExecuteOptions {
            allow_destructive: options.allow_destructive,
        },
    )
    .await
}

/// Order previously diffed steps into an executable plan.
///
/// `actual` must be the schema the steps were diffed against.
pub fn plan_steps(steps: Vec<MigrationStep>, actual: &Schema) -> Result<MigrationPlan> {
    plan::plan(steps, actual)
}
