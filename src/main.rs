use log::info;

use small_reldb::utils::init_log;
use small_reldb::{Column, ColumnKind, Database, DbConfig, Value};

/// Small end-to-end demonstration of the facade: create a table,
/// insert a few rows inside an explicit transaction, and read them
/// back. No SQL parsing or network listener here — this binary exists
/// to exercise the crate directly, not to serve clients.
fn main() {
    init_log();

    let config = DbConfig::default();
    let db = Database::open(config, "default_db").expect("failed to initialize database");

    db.create_table(
        "employees",
        vec![
            Column::new("id", ColumnKind::Int32).primary_key(),
            Column::new("name", ColumnKind::Str),
            Column::new("salary", ColumnKind::Int32),
        ],
    )
    .expect("create_table failed");

    let txn = db.begin();
    db.insert(
        "employees",
        vec![Value::Int32(1), Value::Str("Alice".into()), Value::Int32(5000)],
        Some(txn),
    )
    .expect("insert failed");
    db.insert(
        "employees",
        vec![Value::Int32(2), Value::Str("Bob".into()), Value::Int32(6000)],
        Some(txn),
    )
    .expect("insert failed");
    db.commit(txn).expect("commit failed");

    let rows = db.select("employees", None).expect("select failed");
    for row in &rows {
        info!("employees row: {}", row);
    }
}
