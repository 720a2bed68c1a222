use std::cmp::Ordering;
use std::fmt;

use crate::error::DbError;
use crate::schema::ColumnKind;

/// A single kind-tagged runtime value. Carries its kind so the
/// executor can compare values without re-consulting the schema.
#[derive(Debug, Clone)]
pub enum Value {
    Int32(i32),
    Float32(f32),
    Str(String),
    Bool(bool),
    /// Produced by the executor's outer-join padding and by reading a
    /// nullable column's unset cell back from the heap. Stored on disk
    /// via a dedicated length sentinel (see `record.rs`), not as text.
    Null,
}

impl Value {
    /// Panics if called on `Null`, since a NULL carries no declared
    /// kind. Callers that accept a `Value` from outside this module
    /// (e.g. `Database::insert`) must check `is_null()` first.
    pub fn kind(&self) -> ColumnKind {
        match self {
            Value::Int32(_) => ColumnKind::Int32,
            Value::Float32(_) => ColumnKind::Float32,
            Value::Str(_) => ColumnKind::Str,
            Value::Bool(_) => ColumnKind::Bool,
            Value::Null => panic!("NULL has no column kind"),
        }
    }

    /// Non-NULL values are stored in the heap as their textual form:
    /// every kind round-trips through `to_text`/`from_text` regardless
    /// of whether it is numeric.
    pub fn to_text(&self) -> String {
        match self {
            Value::Int32(v) => v.to_string(),
            Value::Float32(v) => v.to_string(),
            Value::Str(v) => v.clone(),
            Value::Bool(v) => v.to_string(),
            Value::Null => "NULL".to_string(),
        }
    }

    pub fn from_text(kind: ColumnKind, text: &str) -> Result<Self, DbError> {
        match kind {
            ColumnKind::Int32 => text
                .parse::<i32>()
                .map(Value::Int32)
                .map_err(|_| DbError::schema_violation(format!("'{}' is not a valid INT32", text))),
            ColumnKind::Float32 => text
                .parse::<f32>()
                .map(Value::Float32)
                .map_err(|_| DbError::schema_violation(format!("'{}' is not a valid FLOAT32", text))),
            ColumnKind::Str => Ok(Value::Str(text.to_string())),
            ColumnKind::Bool => text
                .parse::<bool>()
                .map(Value::Bool)
                .map_err(|_| DbError::schema_violation(format!("'{}' is not a valid BOOL", text))),
        }
    }

    /// Parse this value's text as a number, if it parses as one,
    /// regardless of its declared kind. Backs the executor's "numeric
    /// comparison if both sides parse as numbers, else lexicographic"
    /// rule.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int32(v) => Some(*v as f64),
            Value::Float32(v) => Some(*v as f64),
            Value::Bool(_) => None,
            Value::Str(s) => s.parse::<f64>().ok(),
            Value::Null => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Compare two values the way the executor's predicate evaluation
    /// does: numeric comparison if both parse as numbers, otherwise
    /// lexicographic string comparison. NULL compares equal only to
    /// NULL.
    pub fn compare(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
                _ => self.to_text().cmp(&other.to_text()),
            },
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_text())
    }
}
