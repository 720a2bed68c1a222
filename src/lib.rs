//! A small single-node relational database core: page-file heap
//! storage, a persisted B+-tree index, a predicate/join/group-by
//! executor and a two-phase-locking transaction manager. See
//! `Database` for the crate's single entry point.

pub mod btree;
pub mod catalog;
pub mod config;
pub mod database;
pub mod error;
pub mod executor;
pub mod heap;
pub mod lock_manager;
pub mod page_buffer;
pub mod record;
pub mod schema;
pub mod transaction;
pub mod tuple;
pub mod tx_log;
pub mod types;
pub mod utils;
pub mod value;
pub mod wait_for_graph;

pub use config::DbConfig;
pub use database::Database;
pub use error::DbError;
pub use schema::{Column, ColumnKind, Schema};
pub use tuple::Tuple;
pub use types::DbResult;
pub use value::Value;
