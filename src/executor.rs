use std::cmp::Ordering;
use std::collections::HashMap;

use crate::error::DbError;
use crate::schema::Schema;
use crate::tuple::Tuple;
use crate::types::DbResult;
use crate::value::Value;

/// Comparison operators a predicate may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Gt,
    Lt,
    Ge,
    Le,
    Ne,
}

/// `column op value`.
#[derive(Debug, Clone)]
pub struct Predicate {
    pub column: String,
    pub op: Op,
    pub value: Value,
}

impl Predicate {
    pub fn new(column: &str, op: Op, value: Value) -> Self {
        Self {
            column: column.to_string(),
            op,
            value,
        }
    }

    /// Numeric comparison if both sides parse as numbers, else
    /// lexicographic string comparison; this is just `Value::compare`,
    /// which already implements that rule.
    pub fn matches(&self, tuple: &Tuple, schema: &Schema) -> DbResult<bool> {
        let idx = schema.column_index(&self.column).ok_or_else(|| {
            DbError::schema_violation(format!("no such column '{}'", self.column))
        })?;
        let cell = tuple.get(idx);
        let ordering = cell.compare(&self.value);
        Ok(match self.op {
            Op::Eq => ordering == Ordering::Equal,
            Op::Ne => ordering != Ordering::Equal,
            Op::Gt => ordering == Ordering::Greater,
            Op::Lt => ordering == Ordering::Less,
            Op::Ge => ordering != Ordering::Less,
            Op::Le => ordering != Ordering::Greater,
        })
    }

    /// Only an `=` predicate on the primary-key column can use the
    /// B+-tree index path; everything else falls back to a full scan.
    pub fn is_primary_key_equality(&self, schema: &Schema) -> bool {
        self.op == Op::Eq && schema.primary_key_index() == schema.column_index(&self.column)
    }
}

pub fn filter(tuples: &[Tuple], schema: &Schema, predicate: &Predicate) -> DbResult<Vec<Tuple>> {
    let mut out = Vec::new();
    for tuple in tuples {
        if predicate.matches(tuple, schema)? {
            out.push(tuple.clone());
        }
    }
    Ok(out)
}

/// One of the five supported aggregate functions, over a single
/// numeric column (`Count` ignores its column argument).
#[derive(Debug, Clone)]
pub enum Aggregate {
    Count,
    Sum(String),
    Avg(String),
    Min(String),
    Max(String),
}

impl Aggregate {
    /// Apply to a group of tuples. SUM/AVG fail with `SchemaViolation`
    /// if any value in the column is non-numeric; AVG, MIN, and MAX on
    /// an empty group also fail with `SchemaViolation` rather than
    /// returning a default, since there is no meaningful average or
    /// extremum of nothing.
    pub fn apply(&self, tuples: &[Tuple], schema: &Schema) -> DbResult<Value> {
        match self {
            Aggregate::Count => Ok(Value::Int32(tuples.len() as i32)),
            Aggregate::Sum(col) => {
                let values = numeric_column(tuples, schema, col)?;
                Ok(Value::Float32(values.iter().sum::<f64>() as f32))
            }
            Aggregate::Avg(col) => {
                let values = numeric_column(tuples, schema, col)?;
                if values.is_empty() {
                    return Err(DbError::schema_violation(
                        "AVG over an empty group is undefined",
                    ));
                }
                let avg = values.iter().sum::<f64>() / values.len() as f64;
                Ok(Value::Float32(avg as f32))
            }
            Aggregate::Min(col) => {
                let values = numeric_column(tuples, schema, col)?;
                values
                    .into_iter()
                    .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.min(v))))
                    .map(|v| Value::Float32(v as f32))
                    .ok_or_else(|| DbError::schema_violation("MIN over an empty group is undefined"))
            }
            Aggregate::Max(col) => {
                let values = numeric_column(tuples, schema, col)?;
                values
                    .into_iter()
                    .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))))
                    .map(|v| Value::Float32(v as f32))
                    .ok_or_else(|| DbError::schema_violation("MAX over an empty group is undefined"))
            }
        }
    }
}

fn numeric_column(tuples: &[Tuple], schema: &Schema, column: &str) -> DbResult<Vec<f64>> {
    let idx = schema
        .column_index(column)
        .ok_or_else(|| DbError::schema_violation(format!("no such column '{}'", column)))?;
    tuples
        .iter()
        .map(|t| {
            t.get(idx)
                .as_f64()
                .ok_or_else(|| DbError::schema_violation(format!("'{}' is not numeric", column)))
        })
        .collect()
}

/// Apply an optional filter, group by `group_col`'s textual form,
/// compute `agg` per group, drop groups failing `having`, and emit
/// one `(group_key, agg_value)` row per surviving group sorted by
/// group key for determinism.
pub fn group_by(
    tuples: &[Tuple],
    schema: &Schema,
    group_col: &str,
    agg: &Aggregate,
    where_pred: Option<&Predicate>,
    having: Option<(Op, Value)>,
) -> DbResult<Vec<(String, Value)>> {
    let filtered = match where_pred {
        Some(p) => filter(tuples, schema, p)?,
        None => tuples.to_vec(),
    };

    let group_idx = schema
        .column_index(group_col)
        .ok_or_else(|| DbError::schema_violation(format!("no such column '{}'", group_col)))?;

    let mut groups: HashMap<String, Vec<Tuple>> = HashMap::new();
    for tuple in filtered {
        let key = tuple.get(group_idx).to_text();
        groups.entry(key).or_default().push(tuple);
    }

    let mut keys: Vec<&String> = groups.keys().collect();
    keys.sort();

    let mut out = Vec::new();
    for key in keys {
        let members = &groups[key];
        let value = agg.apply(members, schema)?;

        if let Some((op, threshold)) = &having {
            let ordering = value.compare(threshold);
            let keep = match op {
                Op::Eq => ordering == Ordering::Equal,
                Op::Ne => ordering != Ordering::Equal,
                Op::Gt => ordering == Ordering::Greater,
                Op::Lt => ordering == Ordering::Less,
                Op::Ge => ordering != Ordering::Less,
                Op::Le => ordering != Ordering::Greater,
            };
            if !keep {
                continue;
            }
        }

        out.push((key.clone(), value));
    }
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDir {
    Asc,
    Desc,
}

/// Stable sort by `column`; numeric if parseable, string otherwise.
pub fn order_by(tuples: &mut [Tuple], schema: &Schema, column: &str, dir: SortDir) -> DbResult<()> {
    let idx = schema
        .column_index(column)
        .ok_or_else(|| DbError::schema_violation(format!("no such column '{}'", column)))?;

    tuples.sort_by(|a, b| {
        let ordering = a.get(idx).compare(b.get(idx));
        match dir {
            SortDir::Asc => ordering,
            SortDir::Desc => ordering.reverse(),
        }
    });
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
}

/// Hash join with the right side as the probe build. Output column
/// order is `L.columns` then `R.columns`; unmatched rows in an outer
/// join are padded with `Value::Null`.
pub fn equi_join(
    left: &[Tuple],
    left_schema: &Schema,
    right: &[Tuple],
    right_schema: &Schema,
    l_col: &str,
    r_col: &str,
    kind: JoinKind,
) -> DbResult<Vec<Tuple>> {
    let l_idx = left_schema
        .column_index(l_col)
        .ok_or_else(|| DbError::schema_violation(format!("no such column '{}'", l_col)))?;
    let r_idx = right_schema
        .column_index(r_col)
        .ok_or_else(|| DbError::schema_violation(format!("no such column '{}'", r_col)))?;

    let mut build: HashMap<String, Vec<&Tuple>> = HashMap::new();
    for r in right {
        build.entry(r.get(r_idx).to_text()).or_default().push(r);
    }

    let right_nulls = || vec![Value::Null; right_schema.arity()];
    let left_nulls = || vec![Value::Null; left_schema.arity()];

    let mut out = Vec::new();
    let mut matched_right: std::collections::HashSet<String> = std::collections::HashSet::new();

    for l in left {
        let key = l.get(l_idx).to_text();
        match build.get(&key) {
            Some(matches) => {
                for r in matches {
                    matched_right.insert(key.clone());
                    out.push(join_row(l, r));
                }
            }
            None => {
                if kind == JoinKind::Left {
                    out.push(Tuple::new(
                        l.values
                            .iter()
                            .cloned()
                            .chain(right_nulls())
                            .collect(),
                    ));
                }
            }
        }
    }

    if kind == JoinKind::Right {
        for r in right {
            let key = r.get(r_idx).to_text();
            if !matched_right.contains(&key) {
                out.push(Tuple::new(
                    left_nulls().into_iter().chain(r.values.iter().cloned()).collect(),
                ));
            }
        }
    }

    Ok(out)
}

fn join_row(l: &Tuple, r: &Tuple) -> Tuple {
    Tuple::new(l.values.iter().cloned().chain(r.values.iter().cloned()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, ColumnKind};

    fn employees_schema() -> Schema {
        Schema::new(
            "employees",
            vec![
                Column::new("id", ColumnKind::Int32).primary_key(),
                Column::new("dept", ColumnKind::Str),
                Column::new("salary", ColumnKind::Int32),
            ],
            "employees.dat".into(),
        )
    }

    fn employees_rows() -> Vec<Tuple> {
        vec![
            Tuple::new(vec![Value::Int32(1), Value::Str("IT".into()), Value::Int32(50)]),
            Tuple::new(vec![Value::Int32(2), Value::Str("IT".into()), Value::Int32(70)]),
            Tuple::new(vec![Value::Int32(3), Value::Str("HR".into()), Value::Int32(40)]),
            Tuple::new(vec![Value::Int32(4), Value::Str("HR".into()), Value::Int32(80)]),
            Tuple::new(vec![Value::Int32(5), Value::Str("HR".into()), Value::Int32(90)]),
        ]
    }

    #[test]
    fn predicate_filters_by_primary_key_equality() {
        let schema = employees_schema();
        let rows = employees_rows();
        let pred = Predicate::new("id", Op::Eq, Value::Int32(2));
        assert!(pred.is_primary_key_equality(&schema));

        let found = filter(&rows, &schema, &pred).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].get(1), &Value::Str("IT".into()));
    }

    #[test]
    fn group_by_avg_with_having() {
        let schema = employees_schema();
        let rows = employees_rows();
        let result = group_by(
            &rows,
            &schema,
            "dept",
            &Aggregate::Avg("salary".into()),
            None,
            Some((Op::Gt, Value::Int32(50))),
        )
        .unwrap();

        assert_eq!(result.len(), 2);
        let as_map: HashMap<_, _> = result.into_iter().collect();
        assert_eq!(as_map["HR"].as_f64(), Some(70.0));
        assert_eq!(as_map["IT"].as_f64(), Some(60.0));
    }

    #[test]
    fn avg_over_empty_group_is_schema_violation() {
        let schema = employees_schema();
        assert!(Aggregate::Avg("salary".into()).apply(&[], &schema).is_err());
    }

    #[test]
    fn count_over_empty_input_is_zero() {
        let schema = employees_schema();
        assert_eq!(Aggregate::Count.apply(&[], &schema).unwrap(), Value::Int32(0));
    }

    #[test]
    fn left_join_pads_unmatched_right_side() {
        let dept_schema = Schema::new(
            "dept",
            vec![
                Column::new("id", ColumnKind::Int32).primary_key(),
                Column::new("name", ColumnKind::Str),
            ],
            "dept.dat".into(),
        );
        let emp_schema = Schema::new(
            "emp",
            vec![
                Column::new("id", ColumnKind::Int32).primary_key(),
                Column::new("dept_id", ColumnKind::Int32),
            ],
            "emp.dat".into(),
        );

        let depts = vec![
            Tuple::new(vec![Value::Int32(1), Value::Str("IT".into())]),
            Tuple::new(vec![Value::Int32(2), Value::Str("HR".into())]),
            Tuple::new(vec![Value::Int32(3), Value::Str("OPS".into())]),
        ];
        let emps = vec![
            Tuple::new(vec![Value::Int32(10), Value::Int32(1)]),
            Tuple::new(vec![Value::Int32(11), Value::Int32(2)]),
            Tuple::new(vec![Value::Int32(12), Value::Int32(2)]),
        ];

        let joined = equi_join(&emps, &emp_schema, &depts, &dept_schema, "dept_id", "id", JoinKind::Left)
            .unwrap();

        assert_eq!(joined.len(), 3);
        assert!(joined.iter().all(|t| t.arity() == 4));
        assert!(joined
            .iter()
            .all(|t| t.get(3) != &Value::Str("OPS".into())));
    }

    #[test]
    fn order_by_is_numeric_when_parseable() {
        let schema = employees_schema();
        let mut rows = employees_rows();
        order_by(&mut rows, &schema, "salary", SortDir::Desc).unwrap();
        assert_eq!(rows[0].get(2), &Value::Int32(90));
        assert_eq!(rows[4].get(2), &Value::Int32(40));
    }
}
