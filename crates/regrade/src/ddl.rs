//! DDL generation for schema objects.
//!
//! All identifiers are quoted. Constraint names follow the postgres defaults
//! (`users_pkey`, `posts_slug_key`, `comments_post_id_fkey`) so that a schema
//! created by regrade introspects back with the names regrade would generate.

use regrade_db_schema::{
    Column, Constraint, Index, ReferentialAction, Table, normalize_check_expr,
};

/// Quote a SQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn primary_key_name(table: &str) -> String {
    format!("{}_pkey", table)
}

pub fn unique_constraint_name(table: &str, columns: &[String]) -> String {
    format!("{}_{}_key", table, columns.join("_"))
}

pub fn foreign_key_name(table: &str, columns: &[String]) -> String {
    format!("{}_{}_fkey", table, columns.join("_"))
}

/// Check constraints have no covered columns to name them after, so the name
/// carries a short content hash of the normalized expression instead.
pub fn check_constraint_name(table: &str, expr: &str) -> String {
    let hash = blake3::hash(normalize_check_expr(expr).as_bytes());
    let hex = hash.to_hex();
    format!("{}_{}_check", table, &hex.as_str()[..8])
}

/// The declared constraint name, or the generated default.
pub fn constraint_name(table: &str, constraint: &Constraint) -> String {
    if let Some(name) = constraint.name() {
        return name.to_string();
    }
    match constraint {
        Constraint::PrimaryKey { .. } => primary_key_name(table),
        Constraint::Unique { columns, .. } => unique_constraint_name(table, columns),
        Constraint::ForeignKey(fk) => foreign_key_name(table, &fk.columns),
        Constraint::Check { expr, .. } => check_constraint_name(table, expr),
    }
}

fn quoted_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Render a column definition for CREATE TABLE / ADD COLUMN.
///
/// `inline_pk` marks the single-column primary key case, where PRIMARY KEY is
/// attached to the column and NOT NULL is implied.
pub fn column_def_sql(col: &Column, inline_pk: bool) -> String {
    let mut def = format!("{} {}", quote_ident(&col.name), col.pg_type);
    if inline_pk {
        def.push_str(" PRIMARY KEY");
    } else if !col.nullable {
        def.push_str(" NOT NULL");
    }
    if col.identity {
        def.push_str(" GENERATED BY DEFAULT AS IDENTITY");
    }
    if let Some(default) = &col.default {
        def.push_str(&format!(" DEFAULT {}", default));
    }
    def
}

/// Generate CREATE TABLE SQL.
///
/// Foreign keys are not included; they are added as separate steps so that
/// tables can always be created before the constraints that tie them
/// together, including in the cyclic case.
pub fn create_table_sql(table: &Table) -> String {
    let pk_columns = table.primary_key().unwrap_or(&[]);
    let inline_pk = pk_columns.len() == 1;

    let mut parts: Vec<String> = table
        .columns
        .iter()
        .map(|col| {
            let is_pk = inline_pk && pk_columns[0] == col.name;
            format!("    {}", column_def_sql(col, is_pk))
        })
        .collect();

    if pk_columns.len() > 1 {
        parts.push(format!("    PRIMARY KEY ({})", quoted_list(pk_columns)));
    }

    for constraint in &table.constraints {
        match constraint {
            Constraint::Unique { columns, .. } => {
                parts.push(format!(
                    "    CONSTRAINT {} UNIQUE ({})",
                    quote_ident(&constraint_name(&table.name, constraint)),
                    quoted_list(columns)
                ));
            }
            Constraint::Check { expr, .. } => {
                parts.push(format!(
                    "    CONSTRAINT {} CHECK ({})",
                    quote_ident(&constraint_name(&table.name, constraint)),
                    expr
                ));
            }
            Constraint::PrimaryKey { .. } | Constraint::ForeignKey(_) => {}
        }
    }

    format!(
        "CREATE TABLE {} (\n{}\n);",
        quote_ident(&table.name),
        parts.join(",\n")
    )
}

/// Generate CREATE INDEX SQL, with a WHERE clause for partial indexes.
pub fn create_index_sql(table: &str, idx: &Index) -> String {
    let unique = if idx.unique { "UNIQUE " } else { "" };
    let where_clause = idx
        .where_clause
        .as_ref()
        .map(|w| format!(" WHERE {}", w))
        .unwrap_or_default();
    format!(
        "CREATE {}INDEX {} ON {} ({}){};",
        unique,
        quote_ident(&idx.name),
        quote_ident(table),
        quoted_list(&idx.columns),
        where_clause
    )
}

/// Generate ALTER TABLE ... ADD CONSTRAINT SQL.
pub fn add_constraint_sql(table: &str, constraint: &Constraint) -> String {
    let name = quote_ident(&constraint_name(table, constraint));
    let table = quote_ident(table);
    match constraint {
        Constraint::PrimaryKey { columns, .. } => format!(
            "ALTER TABLE {} ADD CONSTRAINT {} PRIMARY KEY ({});",
            table,
            name,
            quoted_list(columns)
        ),
        Constraint::Unique { columns, .. } => format!(
            "ALTER TABLE {} ADD CONSTRAINT {} UNIQUE ({});",
            table,
            name,
            quoted_list(columns)
        ),
        Constraint::ForeignKey(fk) => {
            let mut sql = format!(
                "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
                table,
                name,
                quoted_list(&fk.columns),
                quote_ident(&fk.references_table),
                quoted_list(&fk.references_columns)
            );
            if fk.on_delete != ReferentialAction::NoAction {
                sql.push_str(&format!(" ON DELETE {}", fk.on_delete.to_sql()));
            }
            if fk.on_update != ReferentialAction::NoAction {
                sql.push_str(&format!(" ON UPDATE {}", fk.on_update.to_sql()));
            }
            sql.push(';');
            sql
        }
        Constraint::Check { expr, .. } => format!(
            "ALTER TABLE {} ADD CONSTRAINT {} CHECK ({});",
            table, name, expr
        ),
    }
}

/// Generate ALTER TABLE ... DROP CONSTRAINT SQL.
pub fn drop_constraint_sql(table: &str, name: &str) -> String {
    format!(
        "ALTER TABLE {} DROP CONSTRAINT {};",
        quote_ident(table),
        quote_ident(name)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use regrade_db_schema::{ForeignKey, PgType};

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("users"), "\"users\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_create_table_single_pk() {
        let table = Table::builder("users")
            .column(Column::new("id", PgType::BigInt).identity())
            .column(Column::new("email", PgType::Text))
            .column(Column::new("bio", PgType::Text).nullable())
            .unique(["email"])
            .primary_key(["id"])
            .build()
            .unwrap();

        insta::assert_snapshot!(create_table_sql(&table), @r#"
        CREATE TABLE "users" (
            "id" BIGINT PRIMARY KEY GENERATED BY DEFAULT AS IDENTITY,
            "email" TEXT NOT NULL,
            "bio" TEXT,
            CONSTRAINT "users_email_key" UNIQUE ("email")
        );
        "#);
    }

    #[test]
    fn test_create_table_composite_pk() {
        let table = Table::builder("post_like")
            .column(Column::new("user_id", PgType::BigInt))
            .column(Column::new("post_id", PgType::BigInt))
            .column(Column::new("created_at", PgType::Timestamptz).default_expr("now()"))
            .primary_key(["user_id", "post_id"])
            .build()
            .unwrap();

        insta::assert_snapshot!(create_table_sql(&table), @r#"
        CREATE TABLE "post_like" (
            "user_id" BIGINT NOT NULL,
            "post_id" BIGINT NOT NULL,
            "created_at" TIMESTAMPTZ NOT NULL DEFAULT now(),
            PRIMARY KEY ("user_id", "post_id")
        );
        "#);
    }

    #[test]
    fn test_add_foreign_key_with_actions() {
        let fk = Constraint::ForeignKey(
            ForeignKey::new(["author_id"], "users", ["id"])
                .on_delete(ReferentialAction::Cascade),
        );
        assert_eq!(
            add_constraint_sql("posts", &fk),
            "ALTER TABLE \"posts\" ADD CONSTRAINT \"posts_author_id_fkey\" \
             FOREIGN KEY (\"author_id\") REFERENCES \"users\" (\"id\") ON DELETE CASCADE;"
        );
    }

    #[test]
    fn test_partial_index_sql() {
        let idx = Index::new("idx_users_email", ["email"])
            .unique()
            .partial("deleted_at IS NULL");
        assert_eq!(
            create_index_sql("users", &idx),
            "CREATE UNIQUE INDEX \"idx_users_email\" ON \"users\" (\"email\") WHERE deleted_at IS NULL;"
        );
    }

    #[test]
    fn test_check_constraint_name_is_stable() {
        let a = check_constraint_name("users", "(age >= 0)");
        let b = check_constraint_name("users", "age   >= 0");
        assert_eq!(a, b);
        assert!(a.starts_with("users_") && a.ends_with("_check"));
    }
}
