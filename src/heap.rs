use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::debug;

use crate::record;
use crate::schema::Schema;
use crate::tuple::Tuple;
use crate::types::DbResult;

/// One physical record, as returned by a heap scan: its absolute byte
/// offset (the offset of its `total_size` prefix) plus the tuple
/// itself.
pub struct HeapEntry {
    pub offset: u64,
    pub tuple: Tuple,
}

/// An append-style record file: a sequence of records concatenated
/// without per-record headers other than the codec's `total_size`
/// prefix. Records do not cross the trailing page boundary — the
/// writer pads to the next page when the remaining free space is
/// smaller than the record.
pub struct HeapFile {
    path: PathBuf,
    page_size: usize,
}

impl HeapFile {
    pub fn create<P: AsRef<Path>>(path: P, page_size: usize) -> DbResult<Self> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path.as_ref())?;
        Ok(Self {
            path: path.as_ref().to_path_buf(),
            page_size,
        })
    }

    fn open_append(&self) -> DbResult<File> {
        Ok(OpenOptions::new().read(true).append(true).open(&self.path)?)
    }

    fn open_read(&self) -> DbResult<File> {
        Ok(OpenOptions::new().read(true).open(&self.path)?)
    }

    /// Append the record, returning the absolute byte offset of its
    /// `total_size` prefix.
    pub fn insert(&self, tuple: &Tuple) -> DbResult<u64> {
        let record_bytes = record::serialize(tuple);
        let mut file = self.open_append()?;

        let current_len = file.metadata()?.len();
        let offset_in_page = current_len % self.page_size as u64;
        let remaining = self.page_size as u64 - offset_in_page;

        let mut write_offset = current_len;
        if remaining < record_bytes.len() as u64 {
            // Pad to the next page boundary; the zero bytes read back
            // as a zero-length total_size prefix, which scan treats
            // as padding.
            let padding = vec![0u8; remaining as usize];
            file.write_all(&padding)?;
            write_offset = current_len + remaining;
        }

        file.write_all(&record_bytes)?;
        file.flush()?;
        file.sync_data()?;

        debug!(
            "heap insert: {:?} offset={} bytes={}",
            self.path,
            write_offset,
            record_bytes.len()
        );
        Ok(write_offset)
    }

    /// Walk the file in physical order, stopping at end-of-file or a
    /// zero-length prefix.
    pub fn scan(&self, schema: &Schema) -> DbResult<Vec<HeapEntry>> {
        let mut file = self.open_read()?;
        let file_len = file.metadata()?.len();
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;

        let mut entries = Vec::new();
        let mut offset = 0u64;

        while offset + 8 <= file_len {
            let window = &buf[offset as usize..];
            let mut prefix = [0u8; 8];
            prefix.copy_from_slice(&window[..8]);
            let total_size = u64::from_le_bytes(prefix);

            if total_size == 0 {
                // Padding: skip to the next page boundary.
                let offset_in_page = offset % self.page_size as u64;
                let to_next_page = self.page_size as u64 - offset_in_page;
                offset += to_next_page;
                continue;
            }

            let (tuple, consumed) = record::deserialize(window, schema)?;
            entries.push(HeapEntry { offset, tuple });
            offset += consumed as u64;
        }

        Ok(entries)
    }

    /// Not an index operation: walks the file and returns the first
    /// record whose column 0 parses as an integer equal to `key`.
    /// Intended only for tiny tables.
    pub fn point_get_by_key(&self, schema: &Schema, key: i32) -> DbResult<Option<Tuple>> {
        for entry in self.scan(schema)? {
            if let crate::value::Value::Int32(v) = entry.tuple.get(0) {
                if *v == key {
                    return Ok(Some(entry.tuple));
                }
            }
        }
        Ok(None)
    }

    /// Records never span pages, so a B+-tree index entry can name a
    /// single page and this reads only that page's records, scanning
    /// them linearly for `key` in column 0 — the same page-resident-
    /// record assumption `insert`'s padding enforces.
    pub fn get_in_page(
        &self,
        schema: &Schema,
        page_no: u64,
        key: i32,
    ) -> DbResult<Option<Tuple>> {
        let mut file = self.open_read()?;
        let file_len = file.metadata()?.len();
        let page_start = page_no * self.page_size as u64;
        if page_start >= file_len {
            return Ok(None);
        }
        let page_end = std::cmp::min(page_start + self.page_size as u64, file_len);

        let mut buf = vec![0u8; (page_end - page_start) as usize];
        file.seek(SeekFrom::Start(page_start))?;
        file.read_exact(&mut buf)?;

        let mut offset = 0usize;
        while offset + 8 <= buf.len() {
            let mut prefix = [0u8; 8];
            prefix.copy_from_slice(&buf[offset..offset + 8]);
            let total_size = u64::from_le_bytes(prefix) as usize;
            if total_size == 0 {
                break;
            }
            let (tuple, consumed) = record::deserialize(&buf[offset..], schema)?;
            if let crate::value::Value::Int32(v) = tuple.get(0) {
                if *v == key {
                    return Ok(Some(tuple));
                }
            }
            offset += consumed;
        }
        Ok(None)
    }

    /// Replace the file atomically: write `tuples` into `<file>.tmp`,
    /// then rename over the original. Used by UPDATE and DELETE, which
    /// need to physically remove or change rows in place.
    pub fn rewrite(&self, tuples: &[Tuple]) -> DbResult<()> {
        let tmp_path = self.path.with_extension("tmp");
        {
            let tmp = Self::create(&tmp_path, self.page_size)?;
            for tuple in tuples {
                tmp.insert(tuple)?;
            }
        }
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Remove the heap file entirely; used by DROP TABLE.
    pub fn remove(&self) -> DbResult<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, ColumnKind};
    use crate::value::Value;

    fn schema() -> Schema {
        Schema::new(
            "t",
            vec![
                Column::new("id", ColumnKind::Int32).primary_key(),
                Column::new("name", ColumnKind::Str),
            ],
            "t.dat".into(),
        )
    }

    fn tempfile() -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "small-reldb-heap-test-{}-{}",
            std::process::id(),
            rand::random::<u64>()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join("t.dat")
    }

    #[test]
    fn insert_then_scan() {
        let schema = schema();
        let heap = HeapFile::create(tempfile(), 4096).unwrap();

        heap.insert(&Tuple::new(vec![Value::Int32(1), Value::Str("a".into())]))
            .unwrap();
        heap.insert(&Tuple::new(vec![Value::Int32(2), Value::Str("b".into())]))
            .unwrap();

        let entries = heap.scan(&schema).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].tuple.get(0), &Value::Int32(1));
        assert_eq!(entries[1].tuple.get(0), &Value::Int32(2));
    }

    #[test]
    fn point_get_finds_first_match() {
        let schema = schema();
        let heap = HeapFile::create(tempfile(), 4096).unwrap();
        heap.insert(&Tuple::new(vec![Value::Int32(1), Value::Str("a".into())]))
            .unwrap();
        heap.insert(&Tuple::new(vec![Value::Int32(2), Value::Str("b".into())]))
            .unwrap();

        let found = heap.point_get_by_key(&schema, 2).unwrap().unwrap();
        assert_eq!(found.get(1), &Value::Str("b".into()));
        assert!(heap.point_get_by_key(&schema, 3).unwrap().is_none());
    }

    #[test]
    fn rewrite_replaces_contents() {
        let schema = schema();
        let heap = HeapFile::create(tempfile(), 4096).unwrap();
        heap.insert(&Tuple::new(vec![Value::Int32(1), Value::Str("a".into())]))
            .unwrap();

        heap.rewrite(&[Tuple::new(vec![Value::Int32(9), Value::Str("z".into())])])
            .unwrap();

        let entries = heap.scan(&schema).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].tuple.get(0), &Value::Int32(9));
    }

    #[test]
    fn record_at_exact_page_boundary_does_not_cross() {
        // Build a tiny tuple and a page size equal to exactly its
        // serialized length, so the second record must start a fresh
        // page rather than straddling the boundary.
        let t = Tuple::new(vec![Value::Int32(1)]);
        let size = record::serialized_size(&t);

        let schema = Schema::new(
            "t",
            vec![Column::new("id", ColumnKind::Int32).primary_key()],
            "t.dat".into(),
        );
        let heap = HeapFile::create(tempfile(), size).unwrap();
        heap.insert(&t).unwrap();
        heap.insert(&Tuple::new(vec![Value::Int32(2)])).unwrap();

        let entries = heap.scan(&schema).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].offset, 0);
        assert_eq!(entries[1].offset, size as u64);
    }
}
