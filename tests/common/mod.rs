use small_reldb::utils::init_log;
use small_reldb::{Database, DbConfig};

/// Open a fresh `Database` against a disposable temp directory with a
/// small FANOUT, so scenario tests that want to force a split can do
/// so cheaply.
pub fn setup(db_name: &str) -> Database {
    init_log();

    let dir = std::env::temp_dir().join(format!(
        "small-reldb-scenario-{}-{}-{}",
        db_name,
        std::process::id(),
        rand::random::<u64>()
    ));

    let config = DbConfig {
        data_root: dir,
        page_size: 4096,
        fanout: 4,
        lock_retry_attempts: 10,
        lock_retry_interval_ms: 50,
    };

    Database::open(config, db_name).expect("failed to open database")
}
