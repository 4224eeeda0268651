use thiserror::Error;

/// Main error type for the sheet_stream crate.
/// Aggregates errors from the standard library, dependencies, and internal modules.
#[derive(Error, Debug)]
pub enum SheetStreamError {
    #[error("{message}: {source}")]
    WithContextError {
        message: String,
        source: Box<SheetStreamError>,
    },

    // Standard library errors
    #[error("{0}")]
    IoError(#[from] std::io::Error),

    #[error("{0}")]
    ParseIntError(#[from] std::num::ParseIntError),

    #[error("{0}")]
    ParseFloatError(#[from] std::num::ParseFloatError),

    #[error("{0}")]
    ParseDateTimeError(#[from] chrono::ParseError),

    #[error("{0}")]
    StringEncodingError(#[from] std::str::Utf8Error),

    // Third-party library errors
    #[error("{0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("{0}")]
    XmlError(#[from] quick_xml::Error),

    #[error("{0}")]
    XmlEncodingError(#[from] quick_xml::encoding::EncodingError),

    #[error("{0}")]
    XmlAttributeError(#[from] quick_xml::events::attributes::AttrError),

    #[error("{0}")]
    CsvError(#[from] csv::Error),

    // Helper module errors
    #[error("{0}")]
    XmlHelperError(#[from] crate::helpers::xml::XmlError),

    #[error("{0}")]
    CacheError(#[from] crate::strings::CacheError),

    // Spreadsheet module errors
    #[error("{0}")]
    StyleError(#[from] crate::spreadsheet::style::StyleError),

    #[error("{0}")]
    SpreadsheetError(#[from] crate::spreadsheet::SpreadsheetError),
}

/// Coarse classification of every [`SheetStreamError`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Stream open/read/write failures
    Io,
    /// Malformed or adversarial XML
    XmlProcessing,
    /// Missing shared string, cache segment, sheet or archive part
    NotFound,
    /// Caller programming errors raised at the offending call
    InvalidArgument,
}

impl SheetStreamError {
    /// Maps the error onto the four failure families callers act upon.
    pub fn kind(&self) -> ErrorKind {
        use crate::spreadsheet::SpreadsheetError as S;
        match self {
            Self::IoError(_) | Self::ZipError(_) | Self::CsvError(_) => ErrorKind::Io,
            Self::XmlError(_)
            | Self::XmlEncodingError(_)
            | Self::XmlAttributeError(_)
            | Self::XmlHelperError(_)
            | Self::StringEncodingError(_)
            | Self::ParseIntError(_)
            | Self::ParseFloatError(_)
            | Self::ParseDateTimeError(_) => ErrorKind::XmlProcessing,
            Self::WithContextError { source, .. } => source.kind(),
            Self::CacheError(crate::strings::CacheError::Closed) => ErrorKind::InvalidArgument,
            Self::CacheError(_) => ErrorKind::NotFound,
            Self::StyleError(_) => ErrorKind::InvalidArgument,
            Self::SpreadsheetError(error) => match error {
                S::SharedStringNotFound(_) | S::SheetNotFound(_) | S::FileError(_) => ErrorKind::NotFound,
                S::InvalidFileFormat(_) => ErrorKind::Io,
                _ => ErrorKind::InvalidArgument,
            },
        }
    }
}

/// Adds a context message to an error while keeping its [`ErrorKind`]
pub(crate) trait ResultMessage {
    fn with_prefix(self, message: &str) -> Self;
}

impl<T> ResultMessage for Result<T, SheetStreamError> {
    fn with_prefix(self, message: &str) -> Self {
        self.map_err(|e| SheetStreamError::WithContextError {
            message: message.to_owned(),
            source: Box::new(e),
        })
    }
}
