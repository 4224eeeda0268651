//! Delimited text.
//!
//! The reader transcodes its input to UTF-8 with `encoding_rs` (dropping any byte order
//! mark) before tokenizing, so every field comes back as a string cell. The writer always
//! emits UTF-8.

use crate::error::SheetStreamError;
use crate::spreadsheet::cell::CellValue;
use crate::spreadsheet::options::ReaderOptions;
use crate::spreadsheet::options::WriterOptions;
use crate::spreadsheet::reference::index_to_reference;
use crate::spreadsheet::row::Row;
use crate::spreadsheet::SpreadsheetError;
use ::csv::ReaderBuilder;
use ::csv::StringRecord;
use ::csv::WriterBuilder;
use encoding_rs::CoderResult;
use encoding_rs::Decoder;
use encoding_rs::Encoding;
use log::debug;
use std::fs::File;
use std::io::BufWriter;
use std::io::Read;
use std::io::Write;
use std::path::Path;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const BUFFER_SIZE: usize = 8 * 1024;

/// Transcodes a byte stream to UTF-8, removing a leading byte order mark
struct DecodingReader<R: Read> {
    inner: R,
    decoder: Decoder,
    input: Box<[u8]>,
    input_start: usize,
    input_end: usize,
    output: Box<[u8]>,
    output_start: usize,
    output_end: usize,
    is_eof: bool,
    is_finished: bool,
}

impl<R: Read> DecodingReader<R> {
    fn new(inner: R, encoding: &'static Encoding) -> Self {
        DecodingReader {
            inner,
            decoder: encoding.new_decoder_with_bom_removal(),
            input: vec![0; BUFFER_SIZE].into_boxed_slice(),
            input_start: 0,
            input_end: 0,
            output: vec![0; BUFFER_SIZE].into_boxed_slice(),
            output_start: 0,
            output_end: 0,
            is_eof: false,
            is_finished: false,
        }
    }
}

impl<R: Read> Read for DecodingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        loop {
            if self.output_start < self.output_end {
                let length = buf.len().min(self.output_end - self.output_start);
                buf[..length].copy_from_slice(&self.output[self.output_start..self.output_start + length]);
                self.output_start += length;
                return Ok(length);
            }
            if self.is_finished {
                return Ok(0);
            }
            if self.input_start == self.input_end && !self.is_eof {
                let length = self.inner.read(&mut self.input)?;
                self.input_start = 0;
                self.input_end = length;
                self.is_eof = length == 0;
            }
            let (result, read, written, _) = self.decoder.decode_to_utf8(
                &self.input[self.input_start..self.input_end],
                &mut self.output,
                self.is_eof,
            );
            self.input_start += read;
            self.output_start = 0;
            self.output_end = written;
            if self.is_eof && result == CoderResult::InputEmpty {
                self.is_finished = true;
            }
        }
    }
}

/// Streaming reader of delimited text, one [`Row`] per record
pub struct CsvReader<R: Read> {
    reader: ::csv::Reader<DecodingReader<R>>,
    record: StringRecord,
    preserve_empty_rows: bool,
    is_closed: bool,
}

impl CsvReader<File> {
    /// Opens a delimited text file
    pub fn open<P: AsRef<Path>>(path: P, options: &ReaderOptions) -> Result<Self, SheetStreamError> {
        let file = File::open(path.as_ref())?;
        Ok(CsvReader::new(file, options))
    }
}

impl<R: Read> CsvReader<R> {
    pub fn new(reader: R, options: &ReaderOptions) -> Self {
        debug!("Reading delimited text as {}", options.csv.encoding.name());
        let reader = ReaderBuilder::new()
            .delimiter(options.csv.delimiter)
            .quote(options.csv.enclosure)
            .has_headers(false)
            .flexible(true)
            .from_reader(DecodingReader::new(reader, options.csv.encoding));
        CsvReader {
            reader,
            record: StringRecord::new(),
            preserve_empty_rows: options.preserve_empty_rows,
            is_closed: false,
        }
    }

    /// Stops the iteration; later calls to `next` return `None`
    pub fn close(&mut self) {
        self.is_closed = true;
    }
}

impl<R: Read> Iterator for CsvReader<R> {
    type Item = Result<Row, SheetStreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.is_closed {
            match self.reader.read_record(&mut self.record) {
                Ok(true) => {
                    let row = Row::new(
                        self.record
                            .iter()
                            .map(|field| match field {
                                "" => CellValue::Empty.into(),
                                field => CellValue::String(field.to_owned()).into(),
                            })
                            .collect(),
                    );
                    if self.preserve_empty_rows || row.cells().iter().any(|cell| !cell.is_empty()) {
                        return Some(Ok(row));
                    }
                }
                Ok(false) => self.is_closed = true,
                Err(error) => {
                    self.is_closed = true;
                    return Some(Err(error.into()));
                }
            }
        }
        None
    }
}

/// Streaming writer of UTF-8 delimited text
pub struct CsvWriter<W: Write> {
    writer: ::csv::Writer<W>,
    rows: usize,
}

impl CsvWriter<BufWriter<File>> {
    /// Creates (or truncates) a delimited text file
    pub fn create<P: AsRef<Path>>(path: P, options: &WriterOptions) -> Result<Self, SheetStreamError> {
        let file = File::create(path.as_ref())?;
        CsvWriter::new(BufWriter::new(file), options)
    }
}

impl<W: Write> CsvWriter<W> {
    /// Wraps `output`, writing the byte order mark first when asked to
    pub fn new(mut output: W, options: &WriterOptions) -> Result<Self, SheetStreamError> {
        if options.csv.bom {
            output.write_all(UTF8_BOM)?;
        }
        let writer = WriterBuilder::new()
            .delimiter(options.csv.delimiter)
            .quote(options.csv.enclosure)
            .flexible(true)
            .from_writer(output);
        Ok(CsvWriter { writer, rows: 0 })
    }

    /// Appends one record. Booleans are written as `1`/`0` and formulas as `=expression`.
    pub fn add_row(&mut self, row: &Row) -> Result<(), SheetStreamError> {
        let fields = row
            .cells()
            .iter()
            .enumerate()
            .map(|(column, cell)| field(cell.value(), self.rows, column))
            .collect::<Result<Vec<_>, _>>()?;
        if fields.is_empty() {
            self.writer.write_record([""])?;
        } else {
            self.writer.write_record(&fields)?;
        }
        self.rows += 1;
        Ok(())
    }

    pub fn add_rows<'r>(&mut self, rows: impl IntoIterator<Item = &'r Row>) -> Result<(), SheetStreamError> {
        for row in rows {
            self.add_row(row)?;
        }
        Ok(())
    }

    /// Flushes and returns the underlying output
    pub fn close(self) -> Result<W, SheetStreamError> {
        self.writer.into_inner().map_err(|error| error.into_error().into())
    }
}

fn field(value: &CellValue, row: usize, column: usize) -> Result<String, SheetStreamError> {
    let field = match value {
        CellValue::Empty => String::new(),
        CellValue::Boolean(value) => String::from(if *value { "1" } else { "0" }),
        CellValue::Number(number) if !number.is_finite() => Err(SpreadsheetError::UnsupportedValueType {
            reference: index_to_reference(row, column),
            kind: "non-finite number".to_owned(),
        })?,
        CellValue::Number(number) => number.to_string(),
        CellValue::String(value) | CellValue::Error(value) => value.to_owned(),
        CellValue::DateTime(datetime) => datetime.format("%Y-%m-%d %H:%M:%S").to_string(),
        CellValue::Formula { expression, .. } => format!("={expression}"),
    };
    Ok(field)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spreadsheet::cell::Cell;
    use chrono::NaiveDate;
    use encoding_rs::UTF_16LE;
    use encoding_rs::WINDOWS_1252;
    use std::io::Cursor;

    fn read(bytes: &[u8], options: &ReaderOptions) -> Vec<Row> {
        CsvReader::new(Cursor::new(bytes.to_vec()), options)
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn reads_quoted_fields_and_skips_empty_records() {
        let rows = read(b"\xEF\xBB\xBFa,\"b,c\"\n\n,x\n", &ReaderOptions::default());
        assert_eq!(
            rows,
            vec![Row::from_values(["a", "b,c"]), Row::new(vec![Cell::empty(), Cell::from("x")])]
        );
    }

    #[test]
    fn empty_records_follow_the_option() {
        let options = ReaderOptions {
            preserve_empty_rows: true,
            ..ReaderOptions::default()
        };
        let rows = read(b"a\n\"\"\nb\n", &options);
        assert_eq!(rows.len(), 3);
        assert!(rows[1].cells().iter().all(|cell| cell.is_empty()));
    }

    #[test]
    fn transcodes_legacy_encodings() {
        let mut options = ReaderOptions::default();
        options.csv.encoding = WINDOWS_1252;
        options.csv.delimiter = b';';
        options.csv.enclosure = b'\'';
        assert_eq!(read(b"caf\xE9;'x;y'\n", &options), vec![Row::from_values(["café", "x;y"])]);

        options.csv.encoding = UTF_16LE;
        options.csv.delimiter = b',';
        let bytes: Vec<u8> = "\u{FEFF}é,1\n".encode_utf16().flat_map(|unit| unit.to_le_bytes()).collect();
        assert_eq!(read(&bytes, &options), vec![Row::from_values(["é", "1"])]);
    }

    #[test]
    fn writes_records() {
        let datetime = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap().and_hms_opt(3, 4, 5).unwrap();
        let mut writer = CsvWriter::new(Vec::new(), &WriterOptions::default()).unwrap();
        writer
            .add_row(&Row::new(vec![
                Cell::from(true),
                Cell::from(1.5),
                Cell::from("a,b"),
                Cell::from(datetime),
                Cell::formula("SUM(A1:B1)"),
                Cell::empty(),
            ]))
            .unwrap();
        writer.add_row(&Row::default()).unwrap();
        assert!(writer.add_row(&Row::from_values([f64::NAN])).is_err());

        let bytes = writer.close().unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "\u{FEFF}1,1.5,\"a,b\",2024-01-02 03:04:05,=SUM(A1:B1),\n\"\"\n"
        );
    }
}
