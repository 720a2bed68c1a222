mod common;

use small_reldb::executor::JoinKind;
use small_reldb::{Column, ColumnKind, Value};

/// Equi-join with an unmatched right row under LEFT semantics.
#[test]
fn left_join_emits_one_row_per_left_tuple_with_unmatched_right_side_padded() {
    let db = common::setup("equi_join");

    db.create_table(
        "dept",
        vec![
            Column::new("id", ColumnKind::Int32).primary_key(),
            Column::new("name", ColumnKind::Str),
        ],
    )
    .unwrap();
    db.create_table(
        "emp",
        vec![
            Column::new("id", ColumnKind::Int32).primary_key(),
            Column::new("dept_id", ColumnKind::Int32),
        ],
    )
    .unwrap();

    for (id, name) in [(1, "IT"), (2, "HR"), (3, "OPS")] {
        db.insert("dept", vec![Value::Int32(id), Value::Str(name.into())], None)
            .unwrap();
    }
    for (id, dept_id) in [(10, 1), (11, 2), (12, 2)] {
        db.insert("emp", vec![Value::Int32(id), Value::Int32(dept_id)], None)
            .unwrap();
    }

    let joined = db.join("emp", "dept", "dept_id", "id", JoinKind::Left, None).unwrap();

    assert_eq!(joined.len(), 3);
    for row in &joined {
        assert_eq!(row.arity(), 4);
        assert_ne!(row.get(3), &Value::Str("OPS".into()));
    }
}
