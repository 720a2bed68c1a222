mod common;

use std::collections::HashMap;

use small_reldb::executor::{Aggregate, Op};
use small_reldb::{Column, ColumnKind, Value};

#[test]
fn group_by_dept_avg_salary_with_having() {
    let db = common::setup("group_having");

    db.create_table(
        "employees",
        vec![
            Column::new("id", ColumnKind::Int32).primary_key(),
            Column::new("dept", ColumnKind::Str),
            Column::new("salary", ColumnKind::Int32),
        ],
    )
    .unwrap();

    let rows = [
        (1, "IT", 50),
        (2, "IT", 70),
        (3, "HR", 40),
        (4, "HR", 80),
        (5, "HR", 90),
    ];
    for (id, dept, salary) in rows {
        db.insert(
            "employees",
            vec![Value::Int32(id), Value::Str(dept.into()), Value::Int32(salary)],
            None,
        )
        .unwrap();
    }

    let grouped = db
        .group_query(
            "employees",
            "dept",
            &Aggregate::Avg("salary".into()),
            None,
            Some((Op::Gt, Value::Int32(50))),
            None,
        )
        .unwrap();

    assert_eq!(grouped.len(), 2);
    let as_map: HashMap<_, _> = grouped.into_iter().collect();
    assert_eq!(as_map["HR"].as_f64(), Some(70.0));
    assert_eq!(as_map["IT"].as_f64(), Some(60.0));
}
