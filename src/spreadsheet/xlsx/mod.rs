//! Office Open XML workbooks (`.xlsx`).
//!
//! [`XlsxReader`] loads the workbook metadata, number formats and shared strings once,
//! then streams worksheets row by row through [`XlsxRows`]. [`XlsxWriter`] encodes rows
//! into temporary worksheet bodies and assembles the package on close.

mod encoder;
mod rows;
mod shared_strings;
mod styles;
mod workbook;
mod writer;

pub use encoder::RowEncoder;
pub use rows::XlsxRows;
pub use writer::XlsxWriter;

use crate::error::ResultMessage;
use crate::error::SheetStreamError;
use crate::helpers::zip::ZipHelper;
use crate::spreadsheet::options::ReaderOptions;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::SpreadsheetError;
use crate::strings::SharedStringTable;
use log::debug;
use std::fs::File;
use std::io::BufReader;
use std::io::Read;
use std::io::Seek;
use std::path::Path;
use styles::StyleTable;
use workbook::SheetEntry;
use zip::read::ZipFile;
use zip::ZipArchive;

/// Rows of one worksheet read straight from the archive
pub type XlsxSheetRows<'a, RS> = XlsxRows<'a, BufReader<ZipFile<'a, RS>>>;

/// Streaming XLSX reader
pub struct XlsxReader<RS: Read + Seek> {
    zip: ZipArchive<RS>,
    options: ReaderOptions,
    sheets: Vec<SheetEntry>,
    styles: StyleTable,
    strings: SharedStringTable,
    is_1904: bool,
}

impl XlsxReader<BufReader<File>> {
    /// Opens an XLSX file
    pub fn open<P: AsRef<Path>>(path: P, options: ReaderOptions) -> Result<Self, SheetStreamError> {
        let file = File::open(path.as_ref())?;
        XlsxReader::new(BufReader::new(file), options)
    }
}

impl<RS: Read + Seek> XlsxReader<RS> {
    /// Reads the workbook metadata, number formats and shared strings of an archive
    pub fn new(reader: RS, options: ReaderOptions) -> Result<Self, SheetStreamError> {
        let mut zip = ZipArchive::new(reader)?;
        if zip.file(workbook::WORKBOOK_PATH)?.is_none() {
            Err(SpreadsheetError::InvalidFileFormat(format!("missing {}", workbook::WORKBOOK_PATH)))?;
        }
        let info = workbook::load_workbook(&mut zip).with_prefix("Load workbook")?;
        let styles = styles::load_styles(&mut zip, &info.styles_path).with_prefix("Load styles")?;
        let strings = shared_strings::load_shared_strings(&mut zip, &info.shared_strings_path, &options.shared_strings)
            .with_prefix("Load shared strings")?;
        Ok(XlsxReader {
            zip,
            options,
            sheets: info.sheets,
            styles,
            strings,
            is_1904: info.is_1904,
        })
    }

    /// Sheets in workbook order
    pub fn sheets(&self) -> Vec<Sheet> {
        self.sheets.iter().map(|entry| entry.sheet.clone()).collect()
    }

    /// Whether dates count from 1904-01-01
    pub fn is_1904(&self) -> bool {
        self.is_1904
    }

    /// Streams the rows of the sheet at `index`.
    ///
    /// A worksheet part missing from the archive is reported here, before any row is read.
    pub fn rows(&mut self, index: usize) -> Result<XlsxSheetRows<'_, RS>, SheetStreamError> {
        let XlsxReader {
            zip,
            options,
            sheets,
            styles,
            strings,
            is_1904,
        } = self;
        let entry = sheets
            .get(index)
            .ok_or_else(|| SpreadsheetError::SheetNotFound(index.to_string()))?;
        debug!("Streaming sheet '{}' from {}", entry.sheet.name(), entry.path);
        let cursor = zip
            .xml_cursor(&entry.path)?
            .ok_or_else(|| SpreadsheetError::FileError(entry.path.clone()))?;
        Ok(XlsxRows::new(cursor, strings, styles, options, *is_1904))
    }

    /// Streams the rows of the sheet called `name`
    pub fn rows_by_name(&mut self, name: &str) -> Result<XlsxSheetRows<'_, RS>, SheetStreamError> {
        let index = self
            .sheets
            .iter()
            .position(|entry| entry.sheet.name() == name)
            .ok_or_else(|| SpreadsheetError::SheetNotFound(name.to_owned()))?;
        self.rows(index)
    }

    /// Releases the shared strings cache and its temporary files
    pub fn close(mut self) -> Result<(), SheetStreamError> {
        self.strings.clear()
    }
}
