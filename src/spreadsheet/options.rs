use crate::spreadsheet::style::Style;
use crate::strings::CachingOptions;
use encoding_rs::Encoding;
use encoding_rs::UTF_8;
use std::path::PathBuf;

/// Options of the XLSX, ODS and CSV readers.
#[derive(Clone, Debug, Default)]
pub struct ReaderOptions {
    /// Render date cells to text with their number format instead of returning date-times.
    pub format_dates: bool,

    /// Emit empty rows instead of dropping them.
    pub preserve_empty_rows: bool,

    /// Shared strings cache configuration (XLSX only).
    pub shared_strings: CachingOptions,

    pub csv: CsvOptions,
}

/// Options of the XLSX, ODS and CSV writers.
#[derive(Clone, Debug)]
pub struct WriterOptions {
    /// Write strings inline instead of through the shared strings table (XLSX only).
    pub use_inline_strings: bool,

    /// Folder for temporary worksheet bodies, the system temp folder when unset.
    pub temp_folder: Option<PathBuf>,

    /// Style applied to rows that carry none.
    pub default_row_style: Option<Style>,

    /// Shared strings cache configuration when strings are shared (XLSX only).
    pub shared_strings: CachingOptions,

    pub csv: CsvOptions,
}

impl Default for WriterOptions {
    fn default() -> Self {
        WriterOptions {
            use_inline_strings: true,
            temp_folder: None,
            default_row_style: None,
            shared_strings: CachingOptions::default(),
            csv: CsvOptions::default(),
        }
    }
}

/// Delimited text options.
#[derive(Clone, Debug)]
pub struct CsvOptions {
    /// Field delimiter, `,` by default.
    pub delimiter: u8,

    /// Quote character, `"` by default.
    pub enclosure: u8,

    /// Text encoding of the file, UTF-8 by default.
    pub encoding: &'static Encoding,

    /// Write a byte order mark (writer). Readers always strip one.
    pub bom: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        CsvOptions {
            delimiter: b',',
            enclosure: b'"',
            encoding: UTF_8,
            bom: true,
        }
    }
}
