use std::{error, fmt, io};

/// The single error type returned by every subsystem in this crate.
/// Typed variants let callers distinguish e.g. a duplicate-key
/// violation from a lock timeout without parsing a message.
#[derive(Debug)]
pub enum DbError {
    /// Missing database, table, column, key, or page.
    NotFound(String),

    /// Primary-key violation on insert.
    DuplicateKey(String),

    /// Arity mismatch, type mismatch, null in a not-null column, or a
    /// failing foreign-key reference.
    SchemaViolation(String),

    /// Inconsistent record prefix, truncated file, or any other
    /// on-disk inconsistency.
    CorruptData(String),

    /// Filesystem fault.
    IoError(String),

    /// A transaction was aborted after its wait-for graph revisited
    /// itself.
    Deadlock(String),

    /// Lock acquisition exhausted its retry budget.
    LockTimeout(String),

    /// Operation attempted on a transaction that is not ACTIVE.
    InvalidTxnState(String),

    /// Passed through unchanged from the external SQL tokenizer; this
    /// crate never constructs it.
    SyntaxError(String),
}

impl DbError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        DbError::NotFound(msg.into())
    }

    pub fn duplicate_key(msg: impl Into<String>) -> Self {
        DbError::DuplicateKey(msg.into())
    }

    pub fn schema_violation(msg: impl Into<String>) -> Self {
        DbError::SchemaViolation(msg.into())
    }

    pub fn corrupt_data(msg: impl Into<String>) -> Self {
        DbError::CorruptData(msg.into())
    }

    pub fn invalid_txn_state(msg: impl Into<String>) -> Self {
        DbError::InvalidTxnState(msg.into())
    }

    /// The error kind, as a stable tag. Useful for a caller that wants
    /// to print "kind: message" without matching on every variant.
    pub fn kind(&self) -> &'static str {
        match self {
            DbError::NotFound(_) => "NotFound",
            DbError::DuplicateKey(_) => "DuplicateKey",
            DbError::SchemaViolation(_) => "SchemaViolation",
            DbError::CorruptData(_) => "CorruptData",
            DbError::IoError(_) => "IoError",
            DbError::Deadlock(_) => "Deadlock",
            DbError::LockTimeout(_) => "LockTimeout",
            DbError::InvalidTxnState(_) => "InvalidTxnState",
            DbError::SyntaxError(_) => "SyntaxError",
        }
    }

    /// Whether this error leaves the transaction ABORTED rather than
    /// ACTIVE when it surfaces to the caller.
    pub fn aborts_transaction(&self) -> bool {
        matches!(self, DbError::Deadlock(_) | DbError::LockTimeout(_))
    }
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let (kind, msg) = match self {
            DbError::NotFound(m) => ("NotFound", m),
            DbError::DuplicateKey(m) => ("DuplicateKey", m),
            DbError::SchemaViolation(m) => ("SchemaViolation", m),
            DbError::CorruptData(m) => ("CorruptData", m),
            DbError::IoError(m) => ("IoError", m),
            DbError::Deadlock(m) => ("Deadlock", m),
            DbError::LockTimeout(m) => ("LockTimeout", m),
            DbError::InvalidTxnState(m) => ("InvalidTxnState", m),
            DbError::SyntaxError(m) => ("SyntaxError", m),
        };
        write!(f, "{}: {}", kind, msg)
    }
}

impl error::Error for DbError {}

impl From<io::Error> for DbError {
    fn from(e: io::Error) -> Self {
        DbError::IoError(e.to_string())
    }
}
