use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::DbResult;

/// Append-only, one-operation-per-line text log at
/// `./data/transactions.log`. This is a human-readable audit trail,
/// not a recovery log — crash recovery (ARIES-style redo) is out of
/// scope; nothing ever reads this file back. Cloning shares the same
/// path; every `append` reopens the file, so clones never race on a
/// shared handle.
#[derive(Debug, Clone)]
pub struct TxLog {
    path: std::path::PathBuf,
}

impl TxLog {
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        Ok(Self {
            path: path.as_ref().to_path_buf(),
        })
    }

    pub fn append(&self, line: &str) -> DbResult<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        writeln!(file, "[{}] {}", timestamp, line)?;
        file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_writes_one_line_per_call() {
        let dir = std::env::temp_dir().join(format!(
            "small-reldb-txlog-test-{}-{}",
            std::process::id(),
            rand::random::<u64>()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let log = TxLog::open(dir.join("transactions.log")).unwrap();

        log.append("BEGIN 1").unwrap();
        log.append("COMMIT 1").unwrap();

        let contents = std::fs::read_to_string(dir.join("transactions.log")).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.lines().next().unwrap().ends_with("BEGIN 1"));
    }
}
