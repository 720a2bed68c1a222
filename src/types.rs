use std::sync::{Arc, RwLock};

use crate::error::DbError;

/// A shared, interior-mutable handle: `Arc<RwLock<T>>`. Cloning a
/// `Pod<T>` hands out another reference to the same underlying value.
pub type Pod<T> = Arc<RwLock<T>>;

pub type DbResult<T> = Result<T, DbError>;
