use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use log::debug;

use crate::error::DbError;
use crate::types::DbResult;

/// A single fixed-size, opaque page of bytes. Parsing belongs to the
/// B+-tree or heap codec — the page buffer never looks inside it.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    bytes: Vec<u8>,
}

impl Page {
    pub fn zeroed(page_size: usize) -> Self {
        Self {
            bytes: vec![0u8; page_size],
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Fixed-size on-disk pages, addressed by 0-based page number within a
/// single file. There is no buffer pool caching: each read/write is a
/// seek plus a `page_size`-byte transfer.
pub struct PageFile {
    file: File,
    page_size: usize,
}

impl PageFile {
    /// Create (or open, if it already exists) the backing file.
    pub fn create_file<P: AsRef<Path>>(path: P, page_size: usize) -> DbResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path.as_ref())?;
        debug!("opened page file {:?}", path.as_ref());
        Ok(Self { file, page_size })
    }

    pub fn open_existing<P: AsRef<Path>>(path: P, page_size: usize) -> DbResult<Self> {
        if !path.as_ref().exists() {
            return Err(DbError::not_found(format!(
                "page file {:?} does not exist",
                path.as_ref()
            )));
        }
        Self::create_file(path, page_size)
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn num_pages(&self) -> DbResult<u64> {
        let len = self.file.metadata()?.len();
        Ok(len / self.page_size as u64)
    }

    /// A read beyond end-of-file fails with `NotFound`.
    pub fn read_page(&mut self, page_no: u64) -> DbResult<Page> {
        let offset = page_no * self.page_size as u64;
        let file_len = self.file.metadata()?.len();
        if offset + self.page_size as u64 > file_len {
            return Err(DbError::not_found(format!(
                "page {} is beyond end-of-file ({} bytes)",
                page_no, file_len
            )));
        }

        self.file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; self.page_size];
        self.file.read_exact(&mut buf)?;
        Ok(Page::from_bytes(buf))
    }

    /// A write at `page_no >= end-of-file` extends the file; gaps are
    /// not zero-filled since callers always allocate contiguously via
    /// `append_page`.
    pub fn write_page(&mut self, page_no: u64, page: &Page) -> DbResult<()> {
        assert_eq!(page.len(), self.page_size, "page size mismatch");

        let offset = page_no * self.page_size as u64;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(page.bytes())?;
        // All writes are followed by an explicit flush so a crash
        // between two statements loses at most an uncommitted
        // transaction's mutations.
        self.file.flush()?;
        self.file.sync_data()?;
        Ok(())
    }

    /// Append a new page at the end of the file, returning its page
    /// number.
    pub fn append_page(&mut self, page: &Page) -> DbResult<u64> {
        assert_eq!(page.len(), self.page_size, "page size mismatch");

        let page_no = self.num_pages()?;
        self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(page.bytes())?;
        self.file.flush()?;
        self.file.sync_data()?;
        Ok(page_no)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_then_read_round_trips() {
        let dir = tempdir();
        let mut pf = PageFile::create_file(dir.join("t.dat"), 64).unwrap();

        let mut page = Page::zeroed(64);
        page.bytes_mut()[0] = 0xAB;
        let page_no = pf.append_page(&page).unwrap();
        assert_eq!(page_no, 0);

        let read_back = pf.read_page(page_no).unwrap();
        assert_eq!(read_back.bytes()[0], 0xAB);
    }

    #[test]
    fn read_beyond_eof_is_not_found() {
        let dir = tempdir();
        let mut pf = PageFile::create_file(dir.join("t.dat"), 64).unwrap();
        match pf.read_page(3) {
            Err(DbError::NotFound(_)) => {}
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    fn tempdir() -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "small-reldb-test-{}-{}",
            std::process::id(),
            rand::random::<u64>()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
