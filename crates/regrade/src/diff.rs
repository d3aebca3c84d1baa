//! Schema diffing - compare a declared schema against the database schema.
//!
//! [`diff_schemas`] compares two [`Schema`] descriptors and produces the list
//! of [`MigrationStep`]s needed to transform the actual schema into the
//! desired one. The list is semantically complete but unordered; the planner
//! is responsible for sequencing it safely.
//!
//! ## Rename handling
//!
//! Renames are never guessed. A dropped-and-added table pair only becomes a
//! `RenameTable` step when the caller names it in [`RenameHints`]; a hinted
//! pair is then diffed column-by-column under the new name. Without a hint,
//! what looks like a rename diffs to DropTable (destructive, quarantined by
//! the planner) plus CreateTable.

use crate::ddl;
use regrade_db_schema::{Column, Constraint, Index, PgType, Schema, Table};
use std::collections::HashSet;

/// A single schema change.
///
/// Each step carries enough of the descriptors it was diffed from to emit
/// its DDL standalone.
#[derive(Debug, Clone, PartialEq)]
pub enum MigrationStep {
    /// Create a table with its columns, primary key, unique and check
    /// constraints. Foreign keys and indexes are separate steps.
    CreateTable(Table),
    /// Drop an existing table.
    DropTable(String),
    /// Rename a table (only ever produced from an explicit hint).
    RenameTable { from: String, to: String },
    /// Add a column to an existing table.
    AddColumn { table: String, column: Column },
    /// Drop a column.
    DropColumn { table: String, column: String },
    /// Change a column's type.
    AlterColumnType {
        table: String,
        column: String,
        from: PgType,
        to: PgType,
    },
    /// Change a column's nullability.
    AlterColumnNullable {
        table: String,
        column: String,
        nullable: bool,
    },
    /// Change a column's default expression.
    AlterColumnDefault {
        table: String,
        column: String,
        default: Option<String>,
    },
    /// Attach or detach identity generation.
    AlterColumnIdentity {
        table: String,
        column: String,
        identity: bool,
    },
    /// Add a constraint.
    AddConstraint {
        table: String,
        constraint: Constraint,
    },
    /// Drop a constraint. Carries the full descriptor so the operation is
    /// reversible and the name derivable.
    DropConstraint {
        table: String,
        constraint: Constraint,
    },
    /// Create an index.
    CreateIndex { table: String, index: Index },
    /// Drop an index.
    DropIndex { name: String },
}

impl MigrationStep {
    /// Whether this step can discard existing data.
    ///
    /// Type changes count as destructive unless they strictly widen; an
    /// ambiguous change is never assumed safe.
    pub fn is_destructive(&self) -> bool {
        match self {
            MigrationStep::DropTable(_) | MigrationStep::DropColumn { .. } => true,
            MigrationStep::AlterColumnType { from, to, .. } => !from.widens_to(to),
            _ => false,
        }
    }

    /// Generate the SQL statement for this step.
    pub fn to_sql(&self) -> String {
        match self {
            MigrationStep::CreateTable(table) => ddl::create_table_sql(table),
            MigrationStep::DropTable(name) => format!("DROP TABLE {};", ddl::quote_ident(name)),
            MigrationStep::RenameTable { from, to } => format!(
                "ALTER TABLE {} RENAME TO {};",
                ddl::quote_ident(from),
                ddl::quote_ident(to)
            ),
            MigrationStep::AddColumn { table, column } => format!(
                "ALTER TABLE {} ADD COLUMN {};",
                ddl::quote_ident(table),
                ddl::column_def_sql(column, false)
            ),
            MigrationStep::DropColumn { table, column } => format!(
                "ALTER TABLE {} DROP COLUMN {};",
                ddl::quote_ident(table),
                ddl::quote_ident(column)
            ),
            MigrationStep::AlterColumnType {
                table, column, to, ..
            } => format!(
                "ALTER TABLE {} ALTER COLUMN {} TYPE {} USING {}::{};",
                ddl::quote_ident(table),
                ddl::quote_ident(column),
                to,
                ddl::quote_ident(column),
                to
            ),
            MigrationStep::AlterColumnNullable {
                table,
                column,
                nullable,
            } => {
                if *nullable {
                    format!(
                        "ALTER TABLE {} ALTER COLUMN {} DROP NOT NULL;",
                        ddl::quote_ident(table),
                        ddl::quote_ident(column)
                    )
                } else {
                    format!(
                        "ALTER TABLE {} ALTER COLUMN {} SET NOT NULL;",
                        ddl::quote_ident(table),
                        ddl::quote_ident(column)
                    )
                }
            }
            MigrationStep::AlterColumnDefault {
                table,
                column,
                default,
            } => {
                if let Some(default) = default {
                    format!(
                        "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT {};",
                        ddl::quote_ident(table),
                        ddl::quote_ident(column),
                        default
                    )
                } else {
                    format!(
                        "ALTER TABLE {} ALTER COLUMN {} DROP DEFAULT;",
                        ddl::quote_ident(table),
                        ddl::quote_ident(column)
                    )
                }
            }
            MigrationStep::AlterColumnIdentity {
                table,
                column,
                identity,
            } => {
                if *identity {
                    format!(
                        "ALTER TABLE {} ALTER COLUMN {} ADD GENERATED BY DEFAULT AS IDENTITY;",
                        ddl::quote_ident(table),
                        ddl::quote_ident(column)
                    )
                } else {
                    format!(
                        "ALTER TABLE {} ALTER COLUMN {} DROP IDENTITY IF EXISTS;",
                        ddl::quote_ident(table),
                        ddl::quote_ident(column)
                    )
                }
            }
            MigrationStep::AddConstraint { table, constraint } => {
                ddl::add_constraint_sql(table, constraint)
            }
            MigrationStep::DropConstraint { table, constraint } => {
                ddl::drop_constraint_sql(table, &ddl::constraint_name(table, constraint))
            }
            MigrationStep::CreateIndex { table, index } => ddl::create_index_sql(table, index),
            MigrationStep::DropIndex { name } => {
                format!("DROP INDEX {};", ddl::quote_ident(name))
            }
        }
    }
}

impl std::fmt::Display for MigrationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationStep::CreateTable(t) => write!(f, "+ table {}", t.name),
            MigrationStep::DropTable(name) => write!(f, "- table {}", name),
            MigrationStep::RenameTable { from, to } => write!(f, "~ rename {} -> {}", from, to),
            MigrationStep::AddColumn { table, column } => {
                let nullable = if column.nullable { " (nullable)" } else { "" };
                write!(f, "+ {}.{}: {}{}", table, column.name, column.pg_type, nullable)
            }
            MigrationStep::DropColumn { table, column } => write!(f, "- {}.{}", table, column),
            MigrationStep::AlterColumnType {
                table,
                column,
                from,
                to,
            } => write!(f, "~ {}.{}: {} -> {}", table, column, from, to),
            MigrationStep::AlterColumnNullable {
                table,
                column,
                nullable,
            } => {
                let to = if *nullable { "nullable" } else { "not null" };
                write!(f, "~ {}.{}: -> {}", table, column, to)
            }
            MigrationStep::AlterColumnDefault {
                table,
                column,
                default,
            } => write!(
                f,
                "~ {}.{} default: -> {}",
                table,
                column,
                default.as_deref().unwrap_or("(none)")
            ),
            MigrationStep::AlterColumnIdentity {
                table,
                column,
                identity,
            } => write!(
                f,
                "~ {}.{} identity: -> {}",
                table,
                column,
                if *identity { "on" } else { "off" }
            ),
            MigrationStep::AddConstraint { table, constraint } => {
                write!(f, "+ {}: {}", table, describe_constraint(constraint))
            }
            MigrationStep::DropConstraint { table, constraint } => {
                write!(f, "- {}: {}", table, describe_constraint(constraint))
            }
            MigrationStep::CreateIndex { table, index } => {
                let unique = if index.unique { "UNIQUE " } else { "" };
                write!(
                    f,
                    "+ {}INDEX {} on {} ({})",
                    unique,
                    index.name,
                    table,
                    index.columns.join(", ")
                )
            }
            MigrationStep::DropIndex { name } => write!(f, "- INDEX {}", name),
        }
    }
}

fn describe_constraint(constraint: &Constraint) -> String {
    match constraint {
        Constraint::PrimaryKey { columns, .. } => {
            format!("PRIMARY KEY ({})", columns.join(", "))
        }
        Constraint::Unique { columns, .. } => format!("UNIQUE ({})", columns.join(", ")),
        Constraint::ForeignKey(fk) => format!(
            "FOREIGN KEY ({}) -> {}({})",
            fk.columns.join(", "),
            fk.references_table,
            fk.references_columns.join(", ")
        ),
        Constraint::Check { expr, .. } => format!("CHECK ({})", expr),
    }
}

/// Explicit rename hints supplied by the caller.
///
/// A hint only takes effect when the old name exists in the actual schema,
/// the new name exists in the desired schema, and neither exists on the
/// other side; anything else falls through to the normal add/drop path.
#[derive(Debug, Clone, Default)]
pub struct RenameHints {
    tables: Vec<(String, String)>,
}

impl RenameHints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare that the table `from` in the database is the table `to` in
    /// the desired schema.
    pub fn table(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.tables.push((from.into(), to.into()));
        self
    }

    fn applicable(&self, desired: &Schema, actual: &Schema) -> Vec<(String, String)> {
        self.tables
            .iter()
            .filter(|(from, to)| {
                actual.get_table(from).is_some()
                    && desired.get_table(to).is_some()
                    && actual.get_table(to).is_none()
                    && desired.get_table(from).is_none()
            })
            .cloned()
            .collect()
    }
}

/// Compare the desired schema against the actual (database) schema.
///
/// Returns the steps needed to transform `actual` into `desired`, in
/// deterministic but unplanned order.
pub fn diff_schemas(desired: &Schema, actual: &Schema) -> Vec<MigrationStep> {
    diff_schemas_with_hints(desired, actual, &RenameHints::default())
}

/// Like [`diff_schemas`], applying explicit rename hints first.
pub fn diff_schemas_with_hints(
    desired: &Schema,
    actual: &Schema,
    hints: &RenameHints,
) -> Vec<MigrationStep> {
    let mut steps = Vec::new();

    let renames = hints.applicable(desired, actual);
    let renamed_from: HashSet<&str> = renames.iter().map(|(from, _)| from.as_str()).collect();
    let renamed_to: HashSet<&str> = renames.iter().map(|(_, to)| to.as_str()).collect();

    for (from, to) in &renames {
        steps.push(MigrationStep::RenameTable {
            from: from.clone(),
            to: to.clone(),
        });
        // The rename runs first, so the content diff is under the new name.
        let desired_table = &desired.tables[to.as_str()];
        let actual_table = &actual.tables[from.as_str()];
        diff_table(desired_table, actual_table, &mut steps);
    }

    for table in desired.iter_tables() {
        if renamed_to.contains(table.name.as_str()) {
            continue;
        }
        match actual.get_table(&table.name) {
            None => push_create_table(table, &mut steps),
            Some(actual_table) => diff_table(table, actual_table, &mut steps),
        }
    }

    for table in actual.iter_tables() {
        if desired.get_table(&table.name).is_none() && !renamed_from.contains(table.name.as_str())
        {
            steps.push(MigrationStep::DropTable(table.name.clone()));
        }
    }

    steps
}

/// A new table becomes CreateTable plus separate steps for its foreign keys
/// and indexes, so the planner can sequence them after every table exists.
fn push_create_table(table: &Table, steps: &mut Vec<MigrationStep>) {
    steps.push(MigrationStep::CreateTable(table.clone()));
    for constraint in &table.constraints {
        if matches!(constraint, Constraint::ForeignKey(_)) {
            steps.push(MigrationStep::AddConstraint {
                table: table.name.clone(),
                constraint: constraint.clone(),
            });
        }
    }
    for index in &table.indexes {
        steps.push(MigrationStep::CreateIndex {
            table: table.name.clone(),
            index: index.clone(),
        });
    }
}

/// Diff two tables assumed to represent the same relation.
///
/// Steps are emitted under the desired table's name (relevant when the pair
/// comes from a rename hint).
fn diff_table(desired: &Table, actual: &Table, steps: &mut Vec<MigrationStep>) {
    let table = &desired.name;

    diff_columns(table, &desired.columns, &actual.columns, steps);
    diff_constraints(table, &desired.constraints, &actual.constraints, steps);
    diff_indexes(table, &desired.indexes, &actual.indexes, steps);
}

fn diff_columns(table: &str, desired: &[Column], actual: &[Column], steps: &mut Vec<MigrationStep>) {
    let desired_names: HashSet<&str> = desired.iter().map(|c| c.name.as_str()).collect();
    let actual_names: HashSet<&str> = actual.iter().map(|c| c.name.as_str()).collect();

    for col in desired {
        if !actual_names.contains(col.name.as_str()) {
            steps.push(MigrationStep::AddColumn {
                table: table.to_string(),
                column: col.clone(),
            });
        }
    }

    for col in actual {
        if !desired_names.contains(col.name.as_str()) {
            steps.push(MigrationStep::DropColumn {
                table: table.to_string(),
                column: col.name.clone(),
            });
        }
    }

    for desired_col in desired {
        let Some(actual_col) = actual.iter().find(|c| c.name == desired_col.name) else {
            continue;
        };

        if desired_col.pg_type != actual_col.pg_type {
            steps.push(MigrationStep::AlterColumnType {
                table: table.to_string(),
                column: desired_col.name.clone(),
                from: actual_col.pg_type.clone(),
                to: desired_col.pg_type.clone(),
            });
        }

        if desired_col.nullable != actual_col.nullable {
            steps.push(MigrationStep::AlterColumnNullable {
                table: table.to_string(),
                column: desired_col.name.clone(),
                nullable: desired_col.nullable,
            });
        }

        if desired_col.default != actual_col.default {
            steps.push(MigrationStep::AlterColumnDefault {
                table: table.to_string(),
                column: desired_col.name.clone(),
                default: desired_col.default.clone(),
            });
        }

        if desired_col.identity != actual_col.identity {
            steps.push(MigrationStep::AlterColumnIdentity {
                table: table.to_string(),
                column: desired_col.name.clone(),
                identity: desired_col.identity,
            });
        }
    }
}

/// Constraints compare by structure, not by name: autogenerated names differ
/// between a declared schema and the catalog. A changed constraint (same
/// columns, different parameters) shows up as a drop/add pair.
fn diff_constraints(
    table: &str,
    desired: &[Constraint],
    actual: &[Constraint],
    steps: &mut Vec<MigrationStep>,
) {
    let desired_keys: HashSet<String> = desired.iter().map(|c| c.structural_key()).collect();
    let actual_keys: HashSet<String> = actual.iter().map(|c| c.structural_key()).collect();

    for constraint in actual {
        if !desired_keys.contains(&constraint.structural_key()) {
            steps.push(MigrationStep::DropConstraint {
                table: table.to_string(),
                constraint: constraint.clone(),
            });
        }
    }

    for constraint in desired {
        if !actual_keys.contains(&constraint.structural_key()) {
            steps.push(MigrationStep::AddConstraint {
                table: table.to_string(),
                constraint: constraint.clone(),
            });
        }
    }
}

fn diff_indexes(table: &str, desired: &[Index], actual: &[Index], steps: &mut Vec<MigrationStep>) {
    let desired_keys: HashSet<String> = desired.iter().map(|i| i.structural_key()).collect();
    let actual_keys: HashSet<String> = actual.iter().map(|i| i.structural_key()).collect();

    for index in actual {
        if !desired_keys.contains(&index.structural_key()) {
            steps.push(MigrationStep::DropIndex {
                name: index.name.clone(),
            });
        }
    }

    for index in desired {
        if !actual_keys.contains(&index.structural_key()) {
            steps.push(MigrationStep::CreateIndex {
                table: table.to_string(),
                index: index.clone(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regrade_db_schema::ForeignKey;

    fn users() -> Table {
        Table::builder("users")
            .column(Column::new("id", PgType::Integer))
            .column(Column::new("name", PgType::Text))
            .primary_key(["id"])
            .build()
            .unwrap()
    }

    fn schema_of(tables: impl IntoIterator<Item = Table>) -> Schema {
        let mut builder = Schema::builder();
        for table in tables {
            builder = builder.table(table);
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_diff_empty_schemas() {
        let steps = diff_schemas(&Schema::new(), &Schema::new());
        assert!(steps.is_empty());
    }

    #[test]
    fn test_diff_schema_against_itself_is_empty() {
        let schema = schema_of([users()]);
        assert!(diff_schemas(&schema, &schema).is_empty());
    }

    #[test]
    fn test_create_table_scenario() {
        // Desired: users(id integer pk, name text not null); actual: empty.
        let desired = schema_of([users()]);
        let steps = diff_schemas(&desired, &Schema::new());

        assert_eq!(steps.len(), 1);
        let MigrationStep::CreateTable(table) = &steps[0] else {
            panic!("expected CreateTable, got {:?}", steps[0]);
        };
        assert_eq!(table.name, "users");
        assert_eq!(table.columns.len(), 2);
        assert_eq!(table.primary_key(), Some(&["id".to_string()][..]));
    }

    #[test]
    fn test_drop_column_scenario() {
        // Desired drops users.age; actual still has it.
        let desired = schema_of([users()]);
        let actual = schema_of([Table::builder("users")
            .column(Column::new("id", PgType::Integer))
            .column(Column::new("name", PgType::Text))
            .column(Column::new("age", PgType::Integer).nullable())
            .primary_key(["id"])
            .build()
            .unwrap()]);

        let steps = diff_schemas(&desired, &actual);
        assert_eq!(steps.len(), 1);
        assert!(matches!(
            &steps[0],
            MigrationStep::DropColumn { table, column } if table == "users" && column == "age"
        ));
        assert!(steps[0].is_destructive());
    }

    #[test]
    fn test_new_table_emits_separate_fk_and_index_steps() {
        let posts = Table::builder("posts")
            .column(Column::new("id", PgType::BigInt))
            .column(Column::new("author_id", PgType::Integer))
            .primary_key(["id"])
            .foreign_key(ForeignKey::new(["author_id"], "users", ["id"]))
            .index(Index::new("idx_posts_author_id", ["author_id"]))
            .build()
            .unwrap();
        let desired = schema_of([users(), posts]);

        let steps = diff_schemas(&desired, &Schema::new());
        let kinds: Vec<&str> = steps
            .iter()
            .map(|s| match s {
                MigrationStep::CreateTable(t) => {
                    if t.name == "users" {
                        "create users"
                    } else {
                        "create posts"
                    }
                }
                MigrationStep::AddConstraint { .. } => "add fk",
                MigrationStep::CreateIndex { .. } => "add index",
                other => panic!("unexpected step {:?}", other),
            })
            .collect();
        assert_eq!(kinds, ["create users", "create posts", "add fk", "add index"]);
    }

    #[test]
    fn test_drop_table() {
        let actual = schema_of([users()]);
        let steps = diff_schemas(&Schema::new(), &actual);
        assert_eq!(steps.len(), 1);
        assert!(matches!(&steps[0], MigrationStep::DropTable(name) if name == "users"));
        assert!(steps[0].is_destructive());
    }

    #[test]
    fn test_add_column() {
        let desired = schema_of([Table::builder("users")
            .column(Column::new("id", PgType::Integer))
            .column(Column::new("name", PgType::Text))
            .column(Column::new("email", PgType::Text))
            .primary_key(["id"])
            .build()
            .unwrap()]);
        let actual = schema_of([users()]);

        let steps = diff_schemas(&desired, &actual);
        assert_eq!(steps.len(), 1);
        assert!(matches!(
            &steps[0],
            MigrationStep::AddColumn { column, .. } if column.name == "email"
        ));
        assert!(!steps[0].is_destructive());
    }

    #[test]
    fn test_widening_alter_is_safe_narrowing_is_not() {
        let with_type = |ty: PgType| {
            schema_of([Table::builder("users")
                .column(Column::new("age", ty))
                .build()
                .unwrap()])
        };

        let widen = diff_schemas(&with_type(PgType::BigInt), &with_type(PgType::Integer));
        assert_eq!(widen.len(), 1);
        assert!(!widen[0].is_destructive());

        let narrow = diff_schemas(&with_type(PgType::Integer), &with_type(PgType::BigInt));
        assert_eq!(narrow.len(), 1);
        assert!(narrow[0].is_destructive());

        // Cross-family is ambiguous, so destructive.
        let cross = diff_schemas(&with_type(PgType::Text), &with_type(PgType::Integer));
        assert_eq!(cross.len(), 1);
        assert!(cross[0].is_destructive());
    }

    #[test]
    fn test_nullability_and_default_changes() {
        let desired = schema_of([Table::builder("users")
            .column(Column::new("bio", PgType::Text).nullable())
            .column(Column::new("created_at", PgType::Timestamptz).default_expr("now()"))
            .build()
            .unwrap()]);
        let actual = schema_of([Table::builder("users")
            .column(Column::new("bio", PgType::Text))
            .column(Column::new("created_at", PgType::Timestamptz))
            .build()
            .unwrap()]);

        let steps = diff_schemas(&desired, &actual);
        assert_eq!(steps.len(), 2);
        assert!(steps.iter().any(|s| matches!(
            s,
            MigrationStep::AlterColumnNullable { column, nullable: true, .. } if column == "bio"
        )));
        assert!(steps.iter().any(|s| matches!(
            s,
            MigrationStep::AlterColumnDefault { column, default: Some(d), .. }
                if column == "created_at" && d == "now()"
        )));
    }

    #[test]
    fn test_constraint_names_do_not_matter() {
        let desired = schema_of([Table::builder("users")
            .column(Column::new("id", PgType::Integer))
            .column(Column::new("email", PgType::Text))
            .unique(["email"])
            .build()
            .unwrap()]);
        // Same structure, catalog-assigned names.
        let actual = schema_of([Table {
            name: "users".into(),
            columns: vec![
                Column::new("id", PgType::Integer),
                Column::new("email", PgType::Text),
            ],
            constraints: vec![Constraint::Unique {
                name: Some("users_email_key_1830".into()),
                columns: vec!["email".into()],
            }],
            indexes: vec![],
        }]);

        assert!(diff_schemas(&desired, &actual).is_empty());
    }

    #[test]
    fn test_changed_fk_action_becomes_drop_then_add() {
        let fk = |action| {
            schema_of([
                users(),
                Table::builder("posts")
                    .column(Column::new("id", PgType::BigInt))
                    .column(Column::new("author_id", PgType::Integer))
                    .foreign_key(ForeignKey::new(["author_id"], "users", ["id"]).on_delete(action))
                    .build()
                    .unwrap(),
            ])
        };

        let steps = diff_schemas(
            &fk(regrade_db_schema::ReferentialAction::Cascade),
            &fk(regrade_db_schema::ReferentialAction::NoAction),
        );
        assert_eq!(steps.len(), 2);
        assert!(matches!(&steps[0], MigrationStep::DropConstraint { .. }));
        assert!(matches!(&steps[1], MigrationStep::AddConstraint { .. }));
    }

    #[test]
    fn test_unhinted_rename_is_drop_plus_create() {
        let desired = schema_of([Table::builder("user")
            .column(Column::new("id", PgType::Integer))
            .build()
            .unwrap()]);
        let actual = schema_of([Table::builder("users")
            .column(Column::new("id", PgType::Integer))
            .build()
            .unwrap()]);

        let steps = diff_schemas(&desired, &actual);
        assert_eq!(steps.len(), 2);
        assert!(steps.iter().any(|s| matches!(s, MigrationStep::CreateTable(t) if t.name == "user")));
        assert!(steps.iter().any(|s| matches!(s, MigrationStep::DropTable(n) if n == "users")));
    }

    #[test]
    fn test_hinted_rename() {
        let desired = schema_of([Table::builder("user")
            .column(Column::new("id", PgType::Integer))
            .column(Column::new("email", PgType::Text))
            .build()
            .unwrap()]);
        let actual = schema_of([Table::builder("users")
            .column(Column::new("id", PgType::Integer))
            .build()
            .unwrap()]);

        let hints = RenameHints::new().table("users", "user");
        let steps = diff_schemas_with_hints(&desired, &actual, &hints);

        assert_eq!(steps.len(), 2);
        assert!(matches!(
            &steps[0],
            MigrationStep::RenameTable { from, to } if from == "users" && to == "user"
        ));
        // Content diff runs under the new name.
        assert!(matches!(
            &steps[1],
            MigrationStep::AddColumn { table, column } if table == "user" && column.name == "email"
        ));
    }

    #[test]
    fn test_inapplicable_hint_is_ignored() {
        let desired = schema_of([users()]);
        let actual = schema_of([users()]);
        let hints = RenameHints::new().table("ghosts", "users");
        assert!(diff_schemas_with_hints(&desired, &actual, &hints).is_empty());
    }

    #[test]
    fn test_index_compared_by_structure() {
        let desired = schema_of([Table::builder("users")
            .column(Column::new("email", PgType::Text))
            .index(Index::new("users_email_idx", ["email"]))
            .build()
            .unwrap()]);
        let actual = schema_of([Table::builder("users")
            .column(Column::new("email", PgType::Text))
            .index(Index::new("some_old_name", ["email"]))
            .build()
            .unwrap()]);

        assert!(diff_schemas(&desired, &actual).is_empty());

        // But a uniqueness change is a real difference.
        let unique_desired = schema_of([Table::builder("users")
            .column(Column::new("email", PgType::Text))
            .index(Index::new("users_email_idx", ["email"]).unique())
            .build()
            .unwrap()]);
        let steps = diff_schemas(&unique_desired, &actual);
        assert_eq!(steps.len(), 2);
        assert!(matches!(&steps[0], MigrationStep::DropIndex { name } if name == "some_old_name"));
        assert!(matches!(&steps[1], MigrationStep::CreateIndex { .. }));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn arb_pg_type() -> impl Strategy<Value = PgType> {
            prop_oneof![
                Just(PgType::SmallInt),
                Just(PgType::Integer),
                Just(PgType::BigInt),
                Just(PgType::Boolean),
                Just(PgType::Text),
                (1u32..255).prop_map(|n| PgType::VarChar(Some(n))),
                Just(PgType::Timestamptz),
                Just(PgType::Uuid),
                Just(PgType::Jsonb),
            ]
        }

        fn arb_table(name: String) -> impl Strategy<Value = Table> {
            proptest::collection::btree_map("[a-z][a-z_]{0,6}", arb_pg_type(), 1..6).prop_map(
                move |cols| {
                    let mut builder = Table::builder(name.clone());
                    for (col, ty) in cols {
                        builder = builder.column(Column::new(col, ty));
                    }
                    builder.build().unwrap()
                },
            )
        }

        fn arb_schema() -> impl Strategy<Value = Schema> {
            proptest::collection::btree_set("[a-z][a-z_]{0,6}", 0..5)
                .prop_flat_map(|names| {
                    names
                        .into_iter()
                        .map(arb_table)
                        .collect::<Vec<_>>()
                })
                .prop_map(|tables| {
                    let mut builder = Schema::builder();
                    for table in tables {
                        builder = builder.table(table);
                    }
                    builder.build().unwrap()
                })
        }

        proptest! {
            #[test]
            fn diff_against_self_is_always_empty(schema in arb_schema()) {
                prop_assert!(diff_schemas(&schema, &schema).is_empty());
            }

            #[test]
            fn diff_against_empty_only_creates(schema in arb_schema()) {
                let steps = diff_schemas(&schema, &Schema::new());
                prop_assert!(steps.iter().all(|s| !s.is_destructive()));
                let creates = steps
                    .iter()
                    .filter(|s| matches!(s, MigrationStep::CreateTable(_)))
                    .count();
                prop_assert_eq!(creates, schema.tables.len());
            }
        }
    }
}
