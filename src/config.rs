use std::path::PathBuf;

/// Process-wide tunables passed to `Database::open`. Default page
/// size, FANOUT, and lock retry budget are made overridable so tests
/// can use tiny FANOUT values to force splits cheaply against
/// disposable per-test scratch databases.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Root directory under which `<db>/catalog.dat`,
    /// `<db>/<table>.dat` and `<db>/<table>_<col>.idx` live.
    pub data_root: PathBuf,

    /// Fixed page size in bytes.
    pub page_size: usize,

    /// Maximum children per B+-tree node.
    pub fanout: usize,

    /// Lock acquisition retry budget.
    pub lock_retry_attempts: u32,
    pub lock_retry_interval_ms: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("data"),
            page_size: 4096,
            fanout: 4,
            lock_retry_attempts: 10,
            lock_retry_interval_ms: 100,
        }
    }
}

impl DbConfig {
    pub fn db_dir(&self, db_name: &str) -> PathBuf {
        self.data_root.join(db_name)
    }

    pub fn catalog_path(&self, db_name: &str) -> PathBuf {
        self.db_dir(db_name).join("catalog.dat")
    }

    pub fn heap_path(&self, db_name: &str, table: &str) -> PathBuf {
        self.db_dir(db_name).join(format!("{}.dat", table))
    }

    pub fn index_path(&self, db_name: &str, table: &str, column: &str) -> PathBuf {
        self.db_dir(db_name)
            .join(format!("{}_{}.idx", table, column))
    }

    pub fn tx_log_path(&self) -> PathBuf {
        self.data_root.join("transactions.log")
    }
}
