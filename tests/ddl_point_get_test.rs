mod common;

use small_reldb::{Column, ColumnKind, Value};

/// DDL followed by a point get on the primary key.
#[test]
fn ddl_then_point_get_by_primary_key() {
    let db = common::setup("ddl_point_get");

    db.create_table(
        "employees",
        vec![
            Column::new("id", ColumnKind::Int32).primary_key(),
            Column::new("name", ColumnKind::Str).with_max_len(50),
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

    let pred = small_reldb::executor::Predicate::new("id", small_reldb::executor::Op::Eq, Value::Int32(2));
    let rows = db.select_with_predicate("employees", &pred, None).unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get(0), &Value::Int32(2));
    assert_eq!(rows[0].get(1), &Value::Str("Bob".into()));
    assert_eq!(rows[0].get(2), &Value::Int32(60000));
}
