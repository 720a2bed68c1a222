mod common;

use small_reldb::{Column, ColumnKind, Value};

#[test]
fn abort_restores_the_state_from_before_begin() {
    let db = common::setup("rollback");

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

    let before = db.select("employees", None).unwrap();

    let txn = db.begin();
    db.insert(
        "employees",
        vec![Value::Int32(5), Value::Str("x".into()), Value::Int32(1)],
        Some(txn),
    )
    .unwrap();
    db.insert(
        "employees",
        vec![Value::Int32(6), Value::Str("y".into()), Value::Int32(2)],
        Some(txn),
    )
    .unwrap();
    db.abort(txn).unwrap();

    let after = db.select("employees", None).unwrap();
    assert_eq!(after.len(), before.len());
    assert_eq!(after, before);
}
