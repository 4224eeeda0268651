//! # sheet_stream
//!
//! Streaming reader and writer for spreadsheet documents with a bounded memory footprint.
//!
//! ## Features
//!
//! - **Multi-format support**: Office Open XML workbooks (`.xlsx`), OpenDocument spreadsheets
//!   (`.ods`) and delimited text (`.csv`)
//! - **Row streaming**: worksheets are decoded and encoded one row at a time; whole documents
//!   are never held in memory
//! - **Shared strings paging**: the XLSX string table switches from memory to temporary page
//!   files once its estimated size exceeds the configured budget
//! - **Hardened XML**: documents declaring a DTD are rejected before any entity is expanded
//! - **Style deduplication**: equal cell styles share one entry in the written style table
//! - **Date handling**: date formatted numbers are decoded to date-times, optionally rendered
//!   to text with their number format
//!
//! ## Example
//!
//! ```no_run
//! use sheet_stream::{ReaderOptions, Row, WriterOptions, XlsxReader, XlsxWriter};
//!
//! # fn main() -> Result<(), sheet_stream::SheetStreamError> {
//! let mut writer = XlsxWriter::create("report.xlsx", WriterOptions::default())?;
//! writer.add_row(&Row::from_values(["name", "score"]))?;
//! writer.add_row(&Row::from_values(["ada", "36"]))?;
//! writer.close()?;
//!
//! let mut reader = XlsxReader::open("report.xlsx", ReaderOptions::default())?;
//! for row in reader.rows(0)? {
//!     println!("{:?}", row?);
//! }
//! # Ok(())
//! # }
//! ```

mod error;
pub(crate) mod helpers;
pub mod spreadsheet;
pub mod strings;

pub use error::ErrorKind;
pub use error::SheetStreamError;
pub use helpers::xml::XmlError;
pub use spreadsheet::cell::Cell;
pub use spreadsheet::cell::CellValue;
pub use spreadsheet::csv::CsvReader;
pub use spreadsheet::csv::CsvWriter;
pub use spreadsheet::ods::OdsReader;
pub use spreadsheet::ods::OdsWriter;
pub use spreadsheet::options::CsvOptions;
pub use spreadsheet::options::ReaderOptions;
pub use spreadsheet::options::WriterOptions;
pub use spreadsheet::row::Row;
pub use spreadsheet::sheet::Sheet;
pub use spreadsheet::style::Style;
pub use spreadsheet::xlsx::XlsxReader;
pub use spreadsheet::xlsx::XlsxWriter;
pub use spreadsheet::SpreadsheetError;
pub use strings::CachingOptions;
pub use strings::CachingStrategy;
