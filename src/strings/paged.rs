//! Disk-backed string store.
//!
//! Strings are grouped into pages of `page_size` entries. Every page is a pair of files in
//! a private temporary directory:
//!
//! * `page-{n}.data` holds one escaped value per line,
//! * `page-{n}.index` holds one 6-byte record `(u32 offset, u16 length)` per value.
//!
//! Only one page is loaded at a time; reading another page swaps it out.

use super::CacheError;
use super::StringStore;
use crate::error::SheetStreamError;
use crate::helpers::string::escape_line;
use crate::helpers::string::read_record;
use crate::helpers::string::to_record;
use crate::helpers::string::unescape_line;
use log::debug;
use std::fs;
use std::fs::File;
use std::io;
use std::io::BufWriter;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use tempfile::TempDir;

/// Length marker for records longer than `u16::MAX - 1` bytes: read up to the newline.
const UNBOUNDED_LENGTH: u16 = u16::MAX;

/// Page currently receiving values
struct PageWriter {
    number: usize,
    index: BufWriter<File>,
    data: BufWriter<File>,
    offset: u32,
}

/// Page loaded for reading
struct ResidentPage {
    number: usize,
    index: Vec<u8>,
    data: Vec<u8>,
}

pub struct PagedStore {
    folder: Option<TempDir>,
    page_size: usize,
    len: usize,
    writer: Option<PageWriter>,
    resident: Option<ResidentPage>,
    closed: bool,
}

impl PagedStore {
    /// Creates an empty store in a fresh directory below `temp_folder`
    /// (the system temp folder when `None`).
    pub fn new(temp_folder: Option<&Path>, page_size: usize) -> Result<Self, SheetStreamError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("sheet-stream-strings-");
        let folder = match temp_folder {
            Some(path) => builder.tempdir_in(path)?,
            None => builder.tempdir()?,
        };
        debug!("Paging shared strings to {}", folder.path().display());
        Ok(PagedStore {
            folder: Some(folder),
            page_size: page_size.max(1),
            len: 0,
            writer: None,
            resident: None,
            closed: false,
        })
    }

    /// Directory holding the page files, `None` once cleared
    pub fn folder(&self) -> Option<&Path> {
        self.folder.as_ref().map(TempDir::path)
    }

    fn page_path(&self, number: usize, extension: &str) -> Result<PathBuf, SheetStreamError> {
        match &self.folder {
            Some(folder) => Ok(folder.path().join(format!("page-{number}.{extension}"))),
            None => Err(CacheError::SegmentNotFound(format!("page-{number}.{extension}")))?,
        }
    }

    fn open_writer(&self, number: usize) -> Result<PageWriter, SheetStreamError> {
        Ok(PageWriter {
            number,
            index: BufWriter::new(File::create(self.page_path(number, "index")?)?),
            data: BufWriter::new(File::create(self.page_path(number, "data")?)?),
            offset: 0,
        })
    }

    fn flush_writer(&mut self) -> Result<(), SheetStreamError> {
        if let Some(writer) = &mut self.writer {
            writer.index.flush()?;
            writer.data.flush()?;
        }
        Ok(())
    }

    fn read_segment(&self, number: usize, extension: &str) -> Result<Vec<u8>, SheetStreamError> {
        let path = self.page_path(number, extension)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                Err(CacheError::SegmentNotFound(path.display().to_string()))?
            }
            Err(error) => Err(error)?,
        }
    }

    fn load_page(&mut self, number: usize) -> Result<&ResidentPage, SheetStreamError> {
        if self.writer.as_ref().is_some_and(|writer| writer.number == number) {
            self.flush_writer()?;
        }
        if self.resident.as_ref().is_none_or(|page| page.number != number) {
            let index = self.read_segment(number, "index")?;
            let data = self.read_segment(number, "data")?;
            self.resident = Some(ResidentPage { number, index, data });
        }
        match &self.resident {
            Some(page) => Ok(page),
            None => Err(CacheError::SegmentNotFound(format!("page-{number}")))?,
        }
    }
}

impl StringStore for PagedStore {
    fn push(&mut self, value: &str) -> Result<(), SheetStreamError> {
        if self.closed {
            Err(CacheError::Closed)?;
        }

        let number = self.len / self.page_size;
        if self.writer.as_ref().is_none_or(|writer| writer.number != number) {
            self.flush_writer()?;
            self.writer = Some(self.open_writer(number)?);
        }
        if self.resident.as_ref().is_some_and(|page| page.number == number) {
            self.resident = None;
        }

        let line = escape_line(value);
        let length = u16::try_from(line.len())
            .ok()
            .filter(|length| *length < UNBOUNDED_LENGTH)
            .unwrap_or(UNBOUNDED_LENGTH);
        if let Some(writer) = &mut self.writer {
            let next = u32::try_from(line.len() + 1)
                .ok()
                .and_then(|size| writer.offset.checked_add(size))
                .ok_or_else(|| io::Error::other(format!("page-{number}.data exceeds 4 GiB")))?;
            writer.index.write_all(&to_record(writer.offset, length))?;
            writer.data.write_all(line.as_bytes())?;
            writer.data.write_all(b"\n")?;
            writer.offset = next;
        }
        self.len += 1;
        Ok(())
    }

    fn get(&mut self, index: usize) -> Result<String, SheetStreamError> {
        if index >= self.len {
            Err(CacheError::NotFound(index))?;
        }

        let slot = index % self.page_size;
        let page = self.load_page(index / self.page_size)?;
        let (offset, length) = read_record(&page.index, slot).ok_or(CacheError::NotFound(index))?;
        let start = offset as usize;
        let end = if length == UNBOUNDED_LENGTH {
            page.data
                .get(start..)
                .and_then(|rest| rest.iter().position(|byte| *byte == b'\n'))
                .map(|position| start + position)
        } else {
            Some(start + length as usize)
        };
        let bytes = end
            .and_then(|end| page.data.get(start..end))
            .ok_or(CacheError::NotFound(index))?;
        Ok(unescape_line(std::str::from_utf8(bytes)?))
    }

    fn len(&self) -> usize {
        self.len
    }

    fn close(&mut self) -> Result<(), SheetStreamError> {
        self.flush_writer()?;
        self.closed = true;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), SheetStreamError> {
        self.writer = None;
        self.resident = None;
        self.len = 0;
        if let Some(folder) = self.folder.take() {
            folder.close()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn sample_values() -> Vec<String> {
        let mut values = Vec::new();
        for column in ['A', 'B', 'C', 'D', 'E'] {
            for row in 1..=5 {
                values.push(format!("s1--{column}{row}"));
            }
        }
        values
    }

    #[test]
    fn resolves_across_pages() {
        let folder = tempfile::tempdir().unwrap();
        let mut store = PagedStore::new(Some(folder.path()), 10).unwrap();
        for value in sample_values() {
            store.push(&value).unwrap();
        }
        assert_eq!(store.len(), 25);

        assert_eq!(store.get(0).unwrap(), "s1--A1");
        assert_eq!(store.get(24).unwrap(), "s1--E5");
        assert_eq!(store.get(11).unwrap(), "s1--C2");
        assert_eq!(store.get(1).unwrap(), "s1--A2");
        assert_eq!(store.get(u32::MAX as usize).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(store.get(25).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn values_with_newlines_and_long_values() {
        let mut store = PagedStore::new(None, 2).unwrap();
        let long = "x".repeat(70_000);
        store.push("line one\nline two").unwrap();
        store.push("back\\slash").unwrap();
        store.push(&long).unwrap();
        store.push("").unwrap();
        assert_eq!(store.get(0).unwrap(), "line one\nline two");
        assert_eq!(store.get(1).unwrap(), "back\\slash");
        assert_eq!(store.get(2).unwrap(), long);
        assert_eq!(store.get(3).unwrap(), "");
    }

    #[test]
    fn reads_interleaved_with_writes() {
        let mut store = PagedStore::new(None, 3).unwrap();
        store.push("a").unwrap();
        assert_eq!(store.get(0).unwrap(), "a");
        store.push("b").unwrap();
        assert_eq!(store.get(1).unwrap(), "b");
        store.push("c").unwrap();
        store.push("d").unwrap();
        assert_eq!(store.get(2).unwrap(), "c");
        assert_eq!(store.get(3).unwrap(), "d");
    }

    #[test]
    fn missing_segments_are_not_found() {
        let mut store = PagedStore::new(None, 2).unwrap();
        for value in ["a", "b", "c"] {
            store.push(value).unwrap();
        }
        store.close().unwrap();
        let folder = store.folder().unwrap().to_path_buf();
        fs::remove_file(folder.join("page-0.data")).unwrap();
        assert_eq!(store.get(0).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(store.get(2).unwrap(), "c");

        fs::write(folder.join("page-1.data"), b"").unwrap();
        store.resident = None;
        assert_eq!(store.get(2).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn clear_removes_the_directory() {
        let mut store = PagedStore::new(None, 2).unwrap();
        store.push("a").unwrap();
        let folder = store.folder().unwrap().to_path_buf();
        assert!(folder.exists());
        store.clear().unwrap();
        assert!(!folder.exists());
        assert!(store.folder().is_none());
        assert_eq!(store.get(0).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn closed_store_rejects_pushes() {
        let mut store = PagedStore::new(None, 2).unwrap();
        store.close().unwrap();
        assert_eq!(store.push("a").unwrap_err().kind(), ErrorKind::InvalidArgument);
    }
}
