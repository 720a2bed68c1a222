mod common;

use small_reldb::{Column, ColumnKind, DbError, Value};

#[test]
fn duplicate_primary_key_is_rejected_and_leaves_prior_rows_intact() {
    let db = common::setup("duplicate_key");

    db.create_table(
        "employees",
        vec![
            Column::new("id", ColumnKind::Int32).primary_key(),
            Column::new("name", ColumnKind::Str),
            Column::new("salary", ColumnKind::Int32),
        ],
    )
    .unwrap();

    db.insert(
        "employees",
        vec![Value::Int32(1), Value::Str("Alice".into()), Value::Int32(50000)],
        None,
    )
    .unwrap();
    db.insert(
        "employees",
        vec![Value::Int32(2), Value::Str("Bob".into()), Value::Int32(60000)],
        None,
    )
    .unwrap();

    let result = db.insert(
        "employees",
        vec![Value::Int32(1), Value::Str("Eve".into()), Value::Int32(70000)],
        None,
    );
    assert!(matches!(result, Err(DbError::DuplicateKey(_))));

    let rows = db.select("employees", None).unwrap();
    assert_eq!(rows.len(), 2);
}
