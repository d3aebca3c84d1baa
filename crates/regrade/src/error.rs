use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Descriptor construction or lookup failure (duplicate names, dangling
    /// references, missing table).
    #[error(transparent)]
    Schema(#[from] regrade_db_schema::SchemaError),

    /// The catalog could not be read, or kept changing while it was being
    /// read. Retryable by the caller.
    #[error("catalog read failed: {message}")]
    Connectivity {
        message: String,
        #[source]
        source: Option<tokio_postgres::Error>,
    },

    /// The catalog contains a column type the schema descriptor cannot model.
    #[error("unsupported type '{raw}' for column '{table}.{column}'")]
    UnsupportedType {
        table: String,
        column: String,
        raw: String,
    },

    /// Foreign key relationships between new tables cannot be linearized.
    #[error("cyclic foreign key dependencies between tables: {tables:?}")]
    CyclicDependency { tables: Vec<String> },

    /// The plan contains destructive steps and the caller did not opt in.
    /// Nothing was executed.
    #[error("plan contains {steps} destructive step(s); set allow_destructive to apply them")]
    DestructiveRefused { steps: usize },

    /// A migration step failed. The transaction was rolled back; the schema
    /// is unchanged.
    #[error("migration failed at step {step} ({sql}): {source}")]
    MigrationFailed {
        step: usize,
        sql: String,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),
}

/// Result type for regrade operations.
pub type Result<T> = std::result::Result<T, Error>;
