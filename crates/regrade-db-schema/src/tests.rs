use super::*;

#[test]
fn test_duplicate_column_rejected() {
    let result = Table::builder("users")
        .column(Column::new("id", PgType::BigInt))
        .column(Column::new("id", PgType::Text))
        .build();
    assert!(matches!(
        result,
        Err(SchemaError::DuplicateColumn { table, column }) if table == "users" && column == "id"
    ));
}

#[test]
fn test_duplicate_table_rejected() {
    let users = || {
        Table::builder("users")
            .column(Column::new("id", PgType::BigInt))
            .build()
            .unwrap()
    };
    let result = Schema::builder().table(users()).table(users()).build();
    assert!(matches!(result, Err(SchemaError::DuplicateTable(name)) if name == "users"));
}

#[test]
fn test_constraint_column_must_exist() {
    let result = Table::builder("users")
        .column(Column::new("id", PgType::BigInt))
        .primary_key(["uuid"])
        .build();
    assert!(matches!(
        result,
        Err(SchemaError::UnknownColumn { column, .. }) if column == "uuid"
    ));
}

#[test]
fn test_foreign_key_target_must_exist() {
    let posts = Table::builder("posts")
        .column(Column::new("id", PgType::BigInt))
        .column(Column::new("author_id", PgType::BigInt))
        .foreign_key(ForeignKey::new(["author_id"], "users", ["id"]))
        .build()
        .unwrap();
    let result = Schema::builder().table(posts).build();
    assert!(matches!(
        result,
        Err(SchemaError::UnknownTable { references, .. }) if references == "users"
    ));
}

#[test]
fn test_table_lookup() {
    let schema = Schema::builder()
        .table(
            Table::builder("users")
                .column(Column::new("id", PgType::BigInt))
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();

    assert!(schema.table("users").is_ok());
    assert!(matches!(
        schema.table("ghosts"),
        Err(SchemaError::NotFound { table }) if table == "ghosts"
    ));
}

#[test]
fn test_integer_widening() {
    use PgType::*;
    assert!(SmallInt.widens_to(&Integer));
    assert!(SmallInt.widens_to(&BigInt));
    assert!(Integer.widens_to(&BigInt));
    assert!(!BigInt.widens_to(&Integer));
    assert!(!Integer.widens_to(&SmallInt));
    // Same type is trivially safe.
    assert!(Integer.widens_to(&Integer));
}

#[test]
fn test_float_widening() {
    use PgType::*;
    assert!(Real.widens_to(&DoublePrecision));
    assert!(!DoublePrecision.widens_to(&Real));
}

#[test]
fn test_character_widening() {
    use PgType::*;
    assert!(VarChar(Some(10)).widens_to(&VarChar(Some(80))));
    assert!(VarChar(Some(10)).widens_to(&VarChar(None)));
    assert!(VarChar(Some(10)).widens_to(&Text));
    assert!(Char(Some(2)).widens_to(&VarChar(Some(2))));
    assert!(Char(Some(2)).widens_to(&Text));
    assert!(!VarChar(Some(80)).widens_to(&VarChar(Some(10))));
    assert!(!Text.widens_to(&VarChar(Some(80))));
    // VARCHAR -> CHAR would blank-pad existing values.
    assert!(!VarChar(Some(2)).widens_to(&Char(Some(2))));
    // Unlimited VARCHAR and TEXT hold the same values.
    assert!(Text.widens_to(&VarChar(None)));
    assert!(VarChar(None).widens_to(&Text));
}

#[test]
fn test_numeric_widening() {
    use PgType::*;
    let n = |p, s| Numeric {
        precision: p,
        scale: s,
    };
    assert!(n(Some(10), Some(2)).widens_to(&n(Some(12), Some(2))));
    assert!(n(Some(10), Some(2)).widens_to(&n(Some(12), Some(4))));
    assert!(n(Some(10), Some(2)).widens_to(&n(None, None)));
    // Scale up without precision up shrinks the integer digits.
    assert!(!n(Some(10), Some(2)).widens_to(&n(Some(10), Some(4))));
    assert!(!n(None, None).widens_to(&n(Some(30), Some(10))));
}

#[test]
fn test_cross_family_never_widens() {
    use PgType::*;
    assert!(!Integer.widens_to(&Numeric {
        precision: None,
        scale: None
    }));
    assert!(!Integer.widens_to(&Text));
    assert!(!Timestamp.widens_to(&Timestamptz));
    assert!(!Date.widens_to(&Timestamp));
    assert!(!Uuid.widens_to(&Text));
}

#[test]
fn test_constraint_structural_key_ignores_name() {
    let a = Constraint::Unique {
        name: Some("users_email_key".into()),
        columns: vec!["email".into()],
    };
    let b = Constraint::Unique {
        name: None,
        columns: vec!["email".into()],
    };
    assert_eq!(a.structural_key(), b.structural_key());
}

#[test]
fn test_foreign_key_structural_key_includes_actions() {
    let base = ForeignKey::new(["author_id"], "users", ["id"]);
    let cascade = ForeignKey::new(["author_id"], "users", ["id"])
        .on_delete(ReferentialAction::Cascade);
    assert_ne!(
        Constraint::ForeignKey(base).structural_key(),
        Constraint::ForeignKey(cascade).structural_key()
    );
}

#[test]
fn test_normalize_check_expr() {
    assert_eq!(normalize_check_expr("(age >= 0)"), "age >= 0");
    assert_eq!(normalize_check_expr("((age >= 0))"), "age >= 0");
    assert_eq!(normalize_check_expr("age   >=\n0"), "age >= 0");
    // "(a) AND (b)" must keep its parens.
    assert_eq!(
        normalize_check_expr("(age >= 0) AND (age < 200)"),
        "(age >= 0) AND (age < 200)"
    );
}

#[test]
fn test_index_structural_key_keeps_column_order() {
    let ab = Index::new("idx_a", ["a", "b"]);
    let ba = Index::new("idx_b", ["b", "a"]);
    assert_ne!(ab.structural_key(), ba.structural_key());

    let named_differently = Index::new("something_else", ["a", "b"]);
    assert_eq!(ab.structural_key(), named_differently.structural_key());
}

#[test]
fn test_index_structural_key_includes_predicate() {
    let full = Index::new("idx", ["email"]).unique();
    let partial = Index::new("idx", ["email"]).unique().partial("deleted_at IS NULL");
    assert_ne!(full.structural_key(), partial.structural_key());
}
