use std::io::Write;
use std::sync::Once;

use env_logger::Builder;

static INIT: Once = Once::new();

/// Initialize the process-wide logger. Safe to call more than once
/// (subsequent calls are no-ops).
pub fn init_log() {
    INIT.call_once(|| {
        Builder::from_default_env()
            .format_timestamp_millis()
            .format(|buf, record| {
                writeln!(
                    buf,
                    "[{} - {}] [{}:{}] {}",
                    record.level(),
                    record.target(),
                    record.file().unwrap_or("?"),
                    record.line().unwrap_or(0),
                    record.args()
                )
            })
            .is_test(cfg!(test))
            .try_init()
            .ok();
    });
}
