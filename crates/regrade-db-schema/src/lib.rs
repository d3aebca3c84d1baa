//! Schema descriptor types for regrade.
//!
//! This crate contains the in-memory representation of a database schema:
//! tables, columns, semantic column types, constraints and indexes. Both the
//! desired schema (built from the application's model definitions) and the
//! actual schema (read from the live catalog by the introspector) are
//! expressed with these types, so the diff engine only ever compares values
//! of the same shape.
//!
//! Descriptors are immutable once built. The builders validate the structural
//! invariants up front: no duplicate table names within a schema, no
//! duplicate column names within a table, and no constraint or index that
//! references a column or table which does not exist.

use indexmap::IndexMap;
use std::fmt;
use thiserror::Error;

/// Errors raised while building or querying schema descriptors.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("table '{table}' not found in schema")]
    NotFound { table: String },

    #[error("duplicate table '{0}' in schema")]
    DuplicateTable(String),

    #[error("duplicate column '{column}' in table '{table}'")]
    DuplicateColumn { table: String, column: String },

    #[error("{context} on '{table}' references unknown column '{column}'")]
    UnknownColumn {
        table: String,
        column: String,
        context: &'static str,
    },

    #[error("foreign key on '{table}' references unknown table '{references}'")]
    UnknownTable { table: String, references: String },
}

/// Semantic column types.
///
/// Catalog synonyms normalize to one variant (`int4` and `integer` are both
/// [`PgType::Integer`]), so structurally identical columns compare equal no
/// matter how the catalog spells them. Length and precision parameters are
/// part of the type where postgres has them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PgType {
    /// SMALLINT (2 bytes)
    SmallInt,
    /// INTEGER (4 bytes)
    Integer,
    /// BIGINT (8 bytes)
    BigInt,
    /// REAL (4 bytes floating point)
    Real,
    /// DOUBLE PRECISION (8 bytes floating point)
    DoublePrecision,
    /// NUMERIC, optionally constrained to (precision, scale)
    Numeric {
        precision: Option<u32>,
        scale: Option<u32>,
    },
    /// BOOLEAN
    Boolean,
    /// TEXT (unlimited length)
    Text,
    /// VARCHAR, optionally length-limited
    VarChar(Option<u32>),
    /// CHAR, blank-padded to the given length (postgres defaults to 1)
    Char(Option<u32>),
    /// BYTEA (binary)
    Bytea,
    /// TIMESTAMPTZ
    Timestamptz,
    /// TIMESTAMP (without time zone)
    Timestamp,
    /// DATE
    Date,
    /// TIME
    Time,
    /// UUID
    Uuid,
    /// JSONB
    Jsonb,
}

impl PgType {
    /// Whether converting a column of this type to `target` can never lose
    /// or reinterpret data.
    ///
    /// Only conversions that stay within one type family and do not shrink
    /// capacity qualify. Everything else, including lossless-looking
    /// cross-family conversions, is treated as a narrowing change by the
    /// diff engine: the intent behind a cross-family change cannot be read
    /// off the descriptors, so it is never auto-classified as safe.
    pub fn widens_to(&self, target: &PgType) -> bool {
        use PgType::*;

        if self == target {
            return true;
        }

        // Integer widths.
        let int_rank = |ty: &PgType| match ty {
            SmallInt => Some(0u8),
            Integer => Some(1),
            BigInt => Some(2),
            _ => None,
        };
        if let (Some(a), Some(b)) = (int_rank(self), int_rank(target)) {
            return b >= a;
        }

        // Float widths.
        if matches!((self, target), (Real, DoublePrecision)) {
            return true;
        }

        // Numeric: integer digits (precision - scale) and scale must both be
        // non-decreasing. An unconstrained target holds anything.
        if let (
            Numeric {
                precision: p1,
                scale: s1,
            },
            Numeric {
                precision: p2,
                scale: s2,
            },
        ) = (self, target)
        {
            return match (p1, p2) {
                (_, None) => true,
                (None, Some(_)) => false,
                (Some(p1), Some(p2)) => {
                    let s1 = s1.unwrap_or(0);
                    let s2 = s2.unwrap_or(0);
                    s2 >= s1 && p2.saturating_sub(s2) >= p1.saturating_sub(s1)
                }
            };
        }

        // Character capacity: None means unlimited. CHAR may move to VARCHAR
        // or TEXT of at least the same capacity; the reverse direction would
        // blank-pad existing values, so it never widens.
        let char_cap = |ty: &PgType| match ty {
            Char(n) => Some(n.unwrap_or(1)),
            VarChar(n) => Some(n.unwrap_or(u32::MAX)),
            Text => Some(u32::MAX),
            _ => None,
        };
        if let (Some(a), Some(b)) = (char_cap(self), char_cap(target)) {
            if matches!(target, Char(_)) {
                return matches!(self, Char(_)) && b >= a;
            }
            return b >= a;
        }

        false
    }
}

impl fmt::Display for PgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PgType::SmallInt => write!(f, "SMALLINT"),
            PgType::Integer => write!(f, "INTEGER"),
            PgType::BigInt => write!(f, "BIGINT"),
            PgType::Real => write!(f, "REAL"),
            PgType::DoublePrecision => write!(f, "DOUBLE PRECISION"),
            PgType::Numeric {
                precision: Some(p),
                scale: Some(s),
            } => write!(f, "NUMERIC({}, {})", p, s),
            PgType::Numeric {
                precision: Some(p),
                scale: None,
            } => write!(f, "NUMERIC({})", p),
            PgType::Numeric { .. } => write!(f, "NUMERIC"),
            PgType::Boolean => write!(f, "BOOLEAN"),
            PgType::Text => write!(f, "TEXT"),
            PgType::VarChar(Some(n)) => write!(f, "VARCHAR({})", n),
            PgType::VarChar(None) => write!(f, "VARCHAR"),
            PgType::Char(Some(n)) => write!(f, "CHAR({})", n),
            PgType::Char(None) => write!(f, "CHAR"),
            PgType::Bytea => write!(f, "BYTEA"),
            PgType::Timestamptz => write!(f, "TIMESTAMPTZ"),
            PgType::Timestamp => write!(f, "TIMESTAMP"),
            PgType::Date => write!(f, "DATE"),
            PgType::Time => write!(f, "TIME"),
            PgType::Uuid => write!(f, "UUID"),
            PgType::Jsonb => write!(f, "JSONB"),
        }
    }
}

/// A database column definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Column name
    pub name: String,
    /// Semantic type
    pub pg_type: PgType,
    /// Whether the column allows NULL
    pub nullable: bool,
    /// Default value expression (if any)
    pub default: Option<String>,
    /// Whether values are generated by the database (identity / serial)
    pub identity: bool,
}

impl Column {
    /// A NOT NULL column with no default.
    pub fn new(name: impl Into<String>, pg_type: PgType) -> Self {
        Self {
            name: name.into(),
            pg_type,
            nullable: false,
            default: None,
            identity: false,
        }
    }

    /// Allow NULL.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Set a default value expression, e.g. `now()`.
    pub fn default_expr(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }

    /// Mark as identity (database-generated values).
    pub fn identity(mut self) -> Self {
        self.identity = true;
        self
    }
}

/// Referential action for foreign keys (ON DELETE / ON UPDATE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReferentialAction {
    #[default]
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl ReferentialAction {
    /// Returns the SQL clause body for this action.
    pub fn to_sql(&self) -> &'static str {
        match self {
            ReferentialAction::NoAction => "NO ACTION",
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::SetDefault => "SET DEFAULT",
        }
    }
}

/// A foreign key constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ForeignKey {
    /// Constraint name, if known. Autogenerated names are ignored when
    /// comparing foreign keys structurally.
    pub name: Option<String>,
    /// Column(s) in this table
    pub columns: Vec<String>,
    /// Referenced table
    pub references_table: String,
    /// Referenced column(s)
    pub references_columns: Vec<String>,
    /// ON DELETE action
    pub on_delete: ReferentialAction,
    /// ON UPDATE action
    pub on_update: ReferentialAction,
}

impl ForeignKey {
    pub fn new<C, R>(columns: C, references_table: impl Into<String>, references_columns: R) -> Self
    where
        C: IntoIterator,
        C::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        Self {
            name: None,
            columns: columns.into_iter().map(Into::into).collect(),
            references_table: references_table.into(),
            references_columns: references_columns.into_iter().map(Into::into).collect(),
            on_delete: ReferentialAction::NoAction,
            on_update: ReferentialAction::NoAction,
        }
    }

    pub fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = action;
        self
    }

    pub fn on_update(mut self, action: ReferentialAction) -> Self {
        self.on_update = action;
        self
    }
}

/// A table constraint.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    PrimaryKey {
        name: Option<String>,
        columns: Vec<String>,
    },
    Unique {
        name: Option<String>,
        columns: Vec<String>,
    },
    ForeignKey(ForeignKey),
    Check {
        name: Option<String>,
        expr: String,
    },
}

impl Constraint {
    /// The constraint name, if one was declared or read from the catalog.
    pub fn name(&self) -> Option<&str> {
        match self {
            Constraint::PrimaryKey { name, .. }
            | Constraint::Unique { name, .. }
            | Constraint::Check { name, .. } => name.as_deref(),
            Constraint::ForeignKey(fk) => fk.name.as_deref(),
        }
    }

    /// The columns covered by this constraint (empty for checks).
    pub fn columns(&self) -> &[String] {
        match self {
            Constraint::PrimaryKey { columns, .. } | Constraint::Unique { columns, .. } => columns,
            Constraint::ForeignKey(fk) => &fk.columns,
            Constraint::Check { .. } => &[],
        }
    }

    /// Structural identity key, ignoring the constraint name.
    ///
    /// Autogenerated names differ between a declared schema and the catalog,
    /// so two constraints are "the same" iff their kind, covered columns and
    /// parameters match.
    pub fn structural_key(&self) -> String {
        match self {
            Constraint::PrimaryKey { columns, .. } => format!("pk:{}", columns.join(",")),
            Constraint::Unique { columns, .. } => format!("uq:{}", columns.join(",")),
            Constraint::ForeignKey(fk) => format!(
                "fk:{}->{}({}) d={} u={}",
                fk.columns.join(","),
                fk.references_table,
                fk.references_columns.join(","),
                fk.on_delete.to_sql(),
                fk.on_update.to_sql(),
            ),
            Constraint::Check { expr, .. } => format!("ck:{}", normalize_check_expr(expr)),
        }
    }

    /// Whether this table references `table` through a foreign key.
    pub fn references(&self, table: &str) -> bool {
        matches!(self, Constraint::ForeignKey(fk) if fk.references_table == table)
    }
}

/// Normalize a CHECK expression for structural comparison.
///
/// The catalog stores a canonicalized form of the expression (extra parens,
/// collapsed whitespace), so comparison strips balanced outer parens and
/// collapses runs of whitespace. Postgres may still rewrite an expression
/// beyond that; the resulting drop/add pair is idempotent.
pub fn normalize_check_expr(expr: &str) -> String {
    let mut s: String = expr.split_whitespace().collect::<Vec<_>>().join(" ");
    loop {
        let t = s.trim();
        if t.len() >= 2 && t.starts_with('(') && t.ends_with(')') {
            // Only strip if the parens are actually balanced around the whole
            // expression, not "(a) AND (b)".
            let inner = &t[1..t.len() - 1];
            let mut depth = 0i32;
            let mut balanced = true;
            for ch in inner.chars() {
                match ch {
                    '(' => depth += 1,
                    ')' => {
                        depth -= 1;
                        if depth < 0 {
                            balanced = false;
                            break;
                        }
                    }
                    _ => {}
                }
            }
            if balanced && depth == 0 {
                s = inner.trim().to_string();
                continue;
            }
        }
        break;
    }
    s
}

/// A database index.
#[derive(Debug, Clone, PartialEq)]
pub struct Index {
    /// Index name
    pub name: String,
    /// Covered columns, in index order
    pub columns: Vec<String>,
    /// Whether this is a unique index
    pub unique: bool,
    /// Optional predicate for partial indexes
    pub where_clause: Option<String>,
}

impl Index {
    pub fn new<C>(name: impl Into<String>, columns: C) -> Self
    where
        C: IntoIterator,
        C::Item: Into<String>,
    {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            unique: false,
            where_clause: None,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn partial(mut self, where_clause: impl Into<String>) -> Self {
        self.where_clause = Some(where_clause.into());
        self
    }

    /// Structural identity key, ignoring the index name.
    ///
    /// Column order matters for an index, so the key preserves it.
    pub fn structural_key(&self) -> String {
        format!(
            "{}:{}:{}",
            if self.unique { "U" } else { "" },
            self.columns.join(","),
            self.where_clause
                .as_deref()
                .map(normalize_check_expr)
                .unwrap_or_default(),
        )
    }
}

/// A database table definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    /// Table name
    pub name: String,
    /// Columns, in declaration order
    pub columns: Vec<Column>,
    /// Constraints (primary key, unique, foreign key, check)
    pub constraints: Vec<Constraint>,
    /// Indexes
    pub indexes: Vec<Index>,
}

impl Table {
    pub fn builder(name: impl Into<String>) -> TableBuilder {
        TableBuilder {
            table: Table {
                name: name.into(),
                columns: Vec::new(),
                constraints: Vec::new(),
                indexes: Vec::new(),
            },
        }
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// The primary key columns, if a primary key is declared.
    pub fn primary_key(&self) -> Option<&[String]> {
        self.constraints.iter().find_map(|c| match c {
            Constraint::PrimaryKey { columns, .. } => Some(columns.as_slice()),
            _ => None,
        })
    }

    /// Iterate over the foreign keys of this table.
    pub fn foreign_keys(&self) -> impl Iterator<Item = &ForeignKey> {
        self.constraints.iter().filter_map(|c| match c {
            Constraint::ForeignKey(fk) => Some(fk),
            _ => None,
        })
    }
}

/// Builder for [`Table`], validating structural invariants on `build`.
pub struct TableBuilder {
    table: Table,
}

impl TableBuilder {
    pub fn column(mut self, column: Column) -> Self {
        self.table.columns.push(column);
        self
    }

    pub fn primary_key<C>(mut self, columns: C) -> Self
    where
        C: IntoIterator,
        C::Item: Into<String>,
    {
        self.table.constraints.push(Constraint::PrimaryKey {
            name: None,
            columns: columns.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn unique<C>(mut self, columns: C) -> Self
    where
        C: IntoIterator,
        C::Item: Into<String>,
    {
        self.table.constraints.push(Constraint::Unique {
            name: None,
            columns: columns.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn foreign_key(mut self, fk: ForeignKey) -> Self {
        self.table.constraints.push(Constraint::ForeignKey(fk));
        self
    }

    pub fn check(mut self, expr: impl Into<String>) -> Self {
        self.table.constraints.push(Constraint::Check {
            name: None,
            expr: expr.into(),
        });
        self
    }

    pub fn index(mut self, index: Index) -> Self {
        self.table.indexes.push(index);
        self
    }

    /// Validate and freeze the table.
    ///
    /// Fails if a column name repeats, or if a constraint or index covers a
    /// column the table does not have.
    pub fn build(self) -> Result<Table, SchemaError> {
        let table = self.table;

        let mut seen = std::collections::HashSet::new();
        for col in &table.columns {
            if !seen.insert(col.name.as_str()) {
                return Err(SchemaError::DuplicateColumn {
                    table: table.name.clone(),
                    column: col.name.clone(),
                });
            }
        }

        let check_cols = |cols: &[String], context: &'static str| {
            for col in cols {
                if table.column(col).is_none() {
                    return Err(SchemaError::UnknownColumn {
                        table: table.name.clone(),
                        column: col.clone(),
                        context,
                    });
                }
            }
            Ok(())
        };
        for constraint in &table.constraints {
            match constraint {
                Constraint::PrimaryKey { columns, .. } => check_cols(columns, "primary key")?,
                Constraint::Unique { columns, .. } => check_cols(columns, "unique constraint")?,
                Constraint::ForeignKey(fk) => check_cols(&fk.columns, "foreign key")?,
                Constraint::Check { .. } => {}
            }
        }
        for index in &table.indexes {
            check_cols(&index.columns, "index")?;
        }

        Ok(table)
    }
}

/// A complete database schema.
///
/// Immutable once built; constructed either by [`Schema::builder`] (desired
/// state) or directly by the introspector (actual state).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    /// Tables in the schema, indexed by name
    pub tables: IndexMap<String, Table>,
}

impl Schema {
    /// Create a new empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> SchemaBuilder {
        SchemaBuilder { tables: Vec::new() }
    }

    /// Get a table by name.
    pub fn get_table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    /// Get a table by name, failing if it is absent.
    pub fn table(&self, name: &str) -> Result<&Table, SchemaError> {
        self.tables.get(name).ok_or_else(|| SchemaError::NotFound {
            table: name.to_string(),
        })
    }

    /// Iterate over all tables in declaration order.
    pub fn iter_tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }
}

/// Builder for [`Schema`], validating cross-table invariants on `build`.
pub struct SchemaBuilder {
    tables: Vec<Table>,
}

impl SchemaBuilder {
    pub fn table(mut self, table: Table) -> Self {
        self.tables.push(table);
        self
    }

    /// Validate and freeze the schema.
    ///
    /// Fails if a table name repeats, or if a foreign key references a table
    /// or column that does not exist in this schema.
    pub fn build(self) -> Result<Schema, SchemaError> {
        let mut tables: IndexMap<String, Table> = IndexMap::with_capacity(self.tables.len());
        for table in self.tables {
            if tables.contains_key(&table.name) {
                return Err(SchemaError::DuplicateTable(table.name));
            }
            tables.insert(table.name.clone(), table);
        }

        for table in tables.values() {
            for fk in table.foreign_keys() {
                let Some(target) = tables.get(&fk.references_table) else {
                    return Err(SchemaError::UnknownTable {
                        table: table.name.clone(),
                        references: fk.references_table.clone(),
                    });
                };
                for col in &fk.references_columns {
                    if target.column(col).is_none() {
                        return Err(SchemaError::UnknownColumn {
                            table: target.name.clone(),
                            column: col.clone(),
                            context: "foreign key",
                        });
                    }
                }
            }
        }

        Ok(Schema { tables })
    }
}

#[cfg(test)]
mod tests;
