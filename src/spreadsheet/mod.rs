//! Spreadsheet model (cells, rows, styles, sheets) and the XLSX, ODS and CSV codecs.

pub mod cell;
pub mod csv;
pub mod ods;
pub mod options;
pub mod reference;
pub mod row;
pub mod sheet;
pub mod style;
pub mod xlsx;

use thiserror::Error;

/// Errors raised by spreadsheet readers and writers.
#[derive(Error, Debug)]
pub enum SpreadsheetError {
    /// A cell refers to a shared string the document does not define
    #[error("Shared string {0} not found")]
    SharedStringNotFound(usize),

    #[error("Sheet '{0}' not found")]
    SheetNotFound(String),

    /// A required part is missing from the archive
    #[error("File '{0}' not found in archive")]
    FileError(String),

    #[error("Invalid file format: {0}")]
    InvalidFileFormat(String),

    #[error("Unsupported value type '{kind}' at {reference}")]
    UnsupportedValueType { reference: String, kind: String },

    #[error("Cell {reference} holds {length} characters, more than the limit of {limit}")]
    ValueTooLarge { reference: String, length: usize, limit: usize },

    #[error("Invalid sheet name '{name}': {reason}")]
    InvalidSheetName { name: String, reason: String },

    /// Writer methods called out of order
    #[error("Writer state error: {0}")]
    WriterState(String),
}
