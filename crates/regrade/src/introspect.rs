//! Catalog introspection - read the live schema out of `pg_catalog`.
//!
//! Produces a [`Schema`] descriptor of the same shape the desired-state
//! builder produces, so the diff engine compares like with like. Type names
//! reported by the catalog are normalized through a lookup table into the
//! semantic [`PgType`] enum; `int4`, `integer` and a serial's underlying
//! type all land on the same variant.
//!
//! Results are never cached: the catalog is shared mutable state across
//! processes, so every operation re-reads it. A fingerprint of the catalog
//! is taken before and after the read; if it changed mid-read, the whole
//! introspection retries.

use crate::conn::Connection;
use crate::error::{Error, Result};
use indexmap::IndexMap;
use regrade_db_schema::{
    Column, Constraint, ForeignKey, Index, PgType, ReferentialAction, Schema, Table,
};

/// Options for introspection.
#[derive(Debug, Clone)]
pub struct IntrospectOptions {
    /// How many times to retry when the catalog changes mid-read.
    pub max_attempts: u32,
}

impl Default for IntrospectOptions {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

/// Read the current schema of the `public` namespace.
pub async fn introspect<C: Connection>(conn: &C) -> Result<Schema> {
    introspect_with(conn, &IntrospectOptions::default()).await
}

/// Like [`introspect`], with explicit options.
pub async fn introspect_with<C: Connection>(
    conn: &C,
    options: &IntrospectOptions,
) -> Result<Schema> {
    let attempts = options.max_attempts.max(1);
    for attempt in 1..=attempts {
        let before = fingerprint(conn).await?;
        let schema = read_catalog(conn).await?;
        let after = fingerprint(conn).await?;
        if before == after {
            return Ok(schema);
        }
        tracing::debug!(attempt, "catalog changed during introspection, retrying");
    }
    Err(Error::Connectivity {
        message: format!(
            "catalog kept changing during introspection ({} attempts)",
            attempts
        ),
        source: None,
    })
}

fn connectivity(context: &'static str) -> impl FnOnce(tokio_postgres::Error) -> Error {
    move |source| Error::Connectivity {
        message: context.to_string(),
        source: Some(source),
    }
}

const TABLES_SQL: &str = "\
SELECT c.relname::text
FROM pg_catalog.pg_class c
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
WHERE n.nspname = 'public' AND c.relkind = 'r'
ORDER BY c.relname";

const COLUMNS_SQL: &str = "\
SELECT c.relname::text,
       a.attname::text,
       pg_catalog.format_type(a.atttypid, a.atttypmod),
       a.attnotnull,
       pg_catalog.pg_get_expr(d.adbin, d.adrelid),
       a.attidentity::text IN ('a', 'd')
FROM pg_catalog.pg_attribute a
JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
LEFT JOIN pg_catalog.pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
WHERE n.nspname = 'public' AND c.relkind = 'r' AND a.attnum > 0 AND NOT a.attisdropped
ORDER BY c.relname, a.attnum";

const CONSTRAINTS_SQL: &str = "\
SELECT rel.relname::text,
       con.conname::text,
       con.contype::text,
       (SELECT array_agg(att.attname::text ORDER BY k.ord)
          FROM unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord)
          JOIN pg_catalog.pg_attribute att
            ON att.attrelid = con.conrelid AND att.attnum = k.attnum),
       frel.relname::text,
       (SELECT array_agg(att.attname::text ORDER BY k.ord)
          FROM unnest(con.confkey) WITH ORDINALITY AS k(attnum, ord)
          JOIN pg_catalog.pg_attribute att
            ON att.attrelid = con.confrelid AND att.attnum = k.attnum),
       con.confdeltype::text,
       con.confupdtype::text,
       pg_catalog.pg_get_constraintdef(con.oid)
FROM pg_catalog.pg_constraint con
JOIN pg_catalog.pg_class rel ON rel.oid = con.conrelid
JOIN pg_catalog.pg_namespace n ON n.oid = rel.relnamespace
LEFT JOIN pg_catalog.pg_class frel ON frel.oid = con.confrelid
WHERE n.nspname = 'public' AND con.contype IN ('p', 'f', 'u', 'c')
ORDER BY rel.relname, con.conname";

const INDEXES_SQL: &str = "\
SELECT rel.relname::text,
       icls.relname::text,
       ix.indisunique,
       pg_catalog.pg_get_expr(ix.indpred, ix.indrelid),
       (SELECT array_agg(att.attname::text ORDER BY k.ord)
          FROM unnest(ix.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord)
          JOIN pg_catalog.pg_attribute att
            ON att.attrelid = ix.indrelid AND att.attnum = k.attnum
         WHERE k.attnum > 0)
FROM pg_catalog.pg_index ix
JOIN pg_catalog.pg_class icls ON icls.oid = ix.indexrelid
JOIN pg_catalog.pg_class rel ON rel.oid = ix.indrelid
JOIN pg_catalog.pg_namespace n ON n.oid = rel.relnamespace
WHERE n.nspname = 'public' AND rel.relkind = 'r'
  AND NOT ix.indisprimary
  AND NOT EXISTS (SELECT 1 FROM pg_catalog.pg_constraint con
                   WHERE con.conindid = ix.indexrelid)
ORDER BY rel.relname, icls.relname";

/// One ordered text projection over everything introspection reads. Hashing
/// it before and after the catalog queries detects concurrent DDL.
const FINGERPRINT_SQL: &str = "\
SELECT line FROM (
  SELECT c.relname::text || '.' || a.attname::text || ' ' ||
         pg_catalog.format_type(a.atttypid, a.atttypmod) || ' ' ||
         a.attnotnull::text || ' ' ||
         coalesce(pg_catalog.pg_get_expr(d.adbin, d.adrelid), '-') AS line
  FROM pg_catalog.pg_attribute a
  JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
  JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
  LEFT JOIN pg_catalog.pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
  WHERE n.nspname = 'public' AND c.relkind = 'r' AND a.attnum > 0 AND NOT a.attisdropped
  UNION ALL
  SELECT rel.relname::text || ' ' || con.conname::text || ' ' ||
         pg_catalog.pg_get_constraintdef(con.oid)
  FROM pg_catalog.pg_constraint con
  JOIN pg_catalog.pg_class rel ON rel.oid = con.conrelid
  JOIN pg_catalog.pg_namespace n ON n.oid = rel.relnamespace
  WHERE n.nspname = 'public'
  UNION ALL
  SELECT indexname::text || ' ' || indexdef
  FROM pg_catalog.pg_indexes
  WHERE schemaname = 'public'
) AS t ORDER BY line";

async fn fingerprint<C: Connection>(conn: &C) -> Result<blake3::Hash> {
    let rows = conn
        .query(FINGERPRINT_SQL, &[])
        .await
        .map_err(connectivity("reading catalog fingerprint"))?;
    let mut hasher = blake3::Hasher::new();
    for row in &rows {
        hasher.update(row.get::<_, String>(0).as_bytes());
        hasher.update(b"\n");
    }
    Ok(hasher.finalize())
}

async fn read_catalog<C: Connection>(conn: &C) -> Result<Schema> {
    let mut tables: IndexMap<String, Table> = IndexMap::new();

    let rows = conn
        .query(TABLES_SQL, &[])
        .await
        .map_err(connectivity("listing tables"))?;
    for row in &rows {
        let name: String = row.get(0);
        tables.insert(
            name.clone(),
            Table {
                name,
                columns: Vec::new(),
                constraints: Vec::new(),
                indexes: Vec::new(),
            },
        );
    }

    let rows = conn
        .query(COLUMNS_SQL, &[])
        .await
        .map_err(connectivity("listing columns"))?;
    for row in &rows {
        let table: String = row.get(0);
        let name: String = row.get(1);
        let raw_type: String = row.get(2);
        let not_null: bool = row.get(3);
        let default: Option<String> = row.get(4);
        let identity: bool = row.get(5);

        let Some(pg_type) = normalize_type(&raw_type) else {
            return Err(Error::UnsupportedType {
                table,
                column: name,
                raw: raw_type,
            });
        };

        // Serial columns are an integer plus a nextval() default; fold both
        // spellings of "the database generates this" into the identity flag.
        let is_serial = default
            .as_deref()
            .is_some_and(|d| d.to_lowercase().starts_with("nextval("));

        if let Some(entry) = tables.get_mut(&table) {
            entry.columns.push(Column {
                name,
                pg_type,
                nullable: !not_null,
                default: if is_serial { None } else { default },
                identity: identity || is_serial,
            });
        }
    }

    let rows = conn
        .query(CONSTRAINTS_SQL, &[])
        .await
        .map_err(connectivity("listing constraints"))?;
    for row in &rows {
        let table: String = row.get(0);
        let name: String = row.get(1);
        let contype: String = row.get(2);
        let columns: Option<Vec<String>> = row.get(3);
        let columns = columns.unwrap_or_default();

        let constraint = match contype.as_str() {
            "p" => Constraint::PrimaryKey {
                name: Some(name),
                columns,
            },
            "u" => Constraint::Unique {
                name: Some(name),
                columns,
            },
            "f" => {
                let references_table: Option<String> = row.get(4);
                let references_columns: Option<Vec<String>> = row.get(5);
                let on_delete: String = row.get(6);
                let on_update: String = row.get(7);
                Constraint::ForeignKey(ForeignKey {
                    name: Some(name),
                    columns,
                    references_table: references_table.unwrap_or_default(),
                    references_columns: references_columns.unwrap_or_default(),
                    on_delete: referential_action(&on_delete),
                    on_update: referential_action(&on_update),
                })
            }
            "c" => {
                let def: String = row.get(8);
                Constraint::Check {
                    name: Some(name),
                    expr: check_expr_from_def(&def),
                }
            }
            _ => continue,
        };

        if let Some(entry) = tables.get_mut(&table) {
            entry.constraints.push(constraint);
        }
    }

    let rows = conn
        .query(INDEXES_SQL, &[])
        .await
        .map_err(connectivity("listing indexes"))?;
    for row in &rows {
        let table: String = row.get(0);
        let name: String = row.get(1);
        let unique: bool = row.get(2);
        let predicate: Option<String> = row.get(3);
        let columns: Option<Vec<String>> = row.get(4);

        // Expression indexes have no plain column list; they are outside the
        // descriptor model and are left alone rather than diffed away.
        let Some(columns) = columns else { continue };

        if let Some(entry) = tables.get_mut(&table) {
            entry.indexes.push(Index {
                name,
                columns,
                unique,
                where_clause: predicate,
            });
        }
    }

    Ok(Schema { tables })
}

fn referential_action(code: &str) -> ReferentialAction {
    match code {
        "r" => ReferentialAction::Restrict,
        "c" => ReferentialAction::Cascade,
        "n" => ReferentialAction::SetNull,
        "d" => ReferentialAction::SetDefault,
        _ => ReferentialAction::NoAction,
    }
}

/// `pg_get_constraintdef` renders checks as `CHECK ((expr))`; peel the
/// keyword and keep the parenthesized body for structural comparison.
fn check_expr_from_def(def: &str) -> String {
    def.trim()
        .strip_prefix("CHECK")
        .map(|rest| rest.trim().to_string())
        .unwrap_or_else(|| def.trim().to_string())
}

/// What a raw catalog type name maps to, before parameters are applied.
#[derive(Clone, Copy)]
enum TypeTemplate {
    SmallInt,
    Integer,
    BigInt,
    Real,
    DoublePrecision,
    Numeric,
    Boolean,
    Text,
    VarChar,
    Char,
    Bytea,
    Timestamptz,
    Timestamp,
    Date,
    Time,
    Uuid,
    Jsonb,
}

/// Raw type name -> semantic type, including the catalog's synonyms.
/// Deliberately a flat table rather than anything cleverer; extending it is
/// a one-line change.
static TYPE_MAP: &[(&str, TypeTemplate)] = &[
    ("smallint", TypeTemplate::SmallInt),
    ("int2", TypeTemplate::SmallInt),
    ("integer", TypeTemplate::Integer),
    ("int", TypeTemplate::Integer),
    ("int4", TypeTemplate::Integer),
    ("bigint", TypeTemplate::BigInt),
    ("int8", TypeTemplate::BigInt),
    ("real", TypeTemplate::Real),
    ("float4", TypeTemplate::Real),
    ("double precision", TypeTemplate::DoublePrecision),
    ("float8", TypeTemplate::DoublePrecision),
    ("numeric", TypeTemplate::Numeric),
    ("decimal", TypeTemplate::Numeric),
    ("boolean", TypeTemplate::Boolean),
    ("bool", TypeTemplate::Boolean),
    ("text", TypeTemplate::Text),
    ("character varying", TypeTemplate::VarChar),
    ("varchar", TypeTemplate::VarChar),
    ("character", TypeTemplate::Char),
    ("char", TypeTemplate::Char),
    ("bpchar", TypeTemplate::Char),
    ("bytea", TypeTemplate::Bytea),
    ("timestamp with time zone", TypeTemplate::Timestamptz),
    ("timestamptz", TypeTemplate::Timestamptz),
    ("timestamp without time zone", TypeTemplate::Timestamp),
    ("timestamp", TypeTemplate::Timestamp),
    ("date", TypeTemplate::Date),
    ("time without time zone", TypeTemplate::Time),
    ("time", TypeTemplate::Time),
    ("uuid", TypeTemplate::Uuid),
    ("jsonb", TypeTemplate::Jsonb),
];

/// Split `numeric(10,2)` or `timestamp(6) with time zone` into the base name
/// and its numeric parameters.
fn split_type(raw: &str) -> (String, Vec<u32>) {
    let Some(open) = raw.find('(') else {
        return (raw.trim().to_string(), Vec::new());
    };
    let Some(close_offset) = raw[open..].find(')') else {
        return (raw.trim().to_string(), Vec::new());
    };
    let close = open + close_offset;

    let params = raw[open + 1..close]
        .split(',')
        .filter_map(|p| p.trim().parse().ok())
        .collect();
    let base = format!("{} {}", raw[..open].trim(), raw[close + 1..].trim());
    (base.trim().to_string(), params)
}

/// Normalize a catalog-reported type name to a semantic type.
///
/// Returns `None` for types outside the descriptor model (the caller wraps
/// this into `UnsupportedType` with table/column context).
pub fn normalize_type(raw: &str) -> Option<PgType> {
    let (base, params) = split_type(raw);
    let template = TYPE_MAP
        .iter()
        .find(|(name, _)| base.eq_ignore_ascii_case(name))
        .map(|(_, template)| *template)?;

    Some(match template {
        TypeTemplate::SmallInt => PgType::SmallInt,
        TypeTemplate::Integer => PgType::Integer,
        TypeTemplate::BigInt => PgType::BigInt,
        TypeTemplate::Real => PgType::Real,
        TypeTemplate::DoublePrecision => PgType::DoublePrecision,
        TypeTemplate::Numeric => PgType::Numeric {
            precision: params.first().copied(),
            scale: params.get(1).copied(),
        },
        TypeTemplate::Boolean => PgType::Boolean,
        TypeTemplate::Text => PgType::Text,
        TypeTemplate::VarChar => PgType::VarChar(params.first().copied()),
        TypeTemplate::Char => PgType::Char(params.first().copied()),
        TypeTemplate::Bytea => PgType::Bytea,
        TypeTemplate::Timestamptz => PgType::Timestamptz,
        TypeTemplate::Timestamp => PgType::Timestamp,
        TypeTemplate::Date => PgType::Date,
        TypeTemplate::Time => PgType::Time,
        TypeTemplate::Uuid => PgType::Uuid,
        TypeTemplate::Jsonb => PgType::Jsonb,
    })
}
