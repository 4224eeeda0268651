//! Streaming decoder of a worksheet part into rows.

use crate::error::SheetStreamError;
use crate::helpers::xml::unescape_xlsx_text;
use crate::helpers::xml::Flow;
use crate::helpers::xml::NodeKind;
use crate::helpers::xml::XmlCursor;
use crate::helpers::xml::XmlError;
use crate::helpers::xml::XmlProcessor;
use crate::spreadsheet::cell::parse_iso_datetime;
use crate::spreadsheet::cell::serial_to_datetime;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellValue;
use crate::spreadsheet::options::ReaderOptions;
use crate::spreadsheet::reference::column_letters;
use crate::spreadsheet::reference::range_width;
use crate::spreadsheet::reference::reference_to_index;
use crate::spreadsheet::reference::MAX_COLUMNS;
use crate::spreadsheet::row::Row;
use crate::spreadsheet::style::number_format::format_datetime;
use crate::spreadsheet::xlsx::styles::StyleTable;
use crate::spreadsheet::SpreadsheetError;
use crate::strings::CacheError;
use crate::strings::SharedStringTable;
use chrono::NaiveDateTime;
use log::warn;
use std::io::BufRead;

/// Pattern used for `t="d"` cells whose style carries no date format
const ISO_DATETIME_CODE: &str = "yyyy-mm-dd hh:mm:ss";

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Phase {
    BeforeFirstRow,
    InRow,
    BetweenRows,
    Done,
}

/// Cell being assembled between `<c>` and `</c>`
#[derive(Default)]
struct PendingCell {
    column: usize,
    kind: Option<String>,
    style: usize,
    value: Option<String>,
    formula: Option<String>,
    inline: Option<String>,
}

struct DecoderState<'a> {
    strings: &'a mut SharedStringTable,
    styles: &'a StyleTable,
    format_dates: bool,
    preserve_empty_rows: bool,
    is_1904: bool,
    phase: Phase,
    /// Column count of the `<dimension>` element, 0 when absent
    width: usize,
    /// Column count of the current row's `spans`, 0 when absent
    row_width: usize,
    /// Widest row decoded so far
    max_width: usize,
    /// 1-based number of the current row
    row_number: usize,
    /// 1-based number of the last row seen
    last_row_number: usize,
    cells: Vec<(usize, Cell)>,
    next_column: usize,
    cell: PendingCell,
    /// Skipped row numbers still to be emitted as empty rows
    missing_rows: usize,
    ready: Option<Row>,
}

impl DecoderState<'_> {
    fn take_row(&mut self) -> Option<Row> {
        if self.missing_rows > 0 {
            self.missing_rows -= 1;
            let width = if self.width > 0 { self.width } else { self.max_width };
            return Some(Row::fill_missing_indexes(std::iter::empty(), width));
        }
        self.ready.take()
    }

    fn decode_value(&mut self, cell: &PendingCell) -> Result<CellValue, SheetStreamError> {
        if let Some(text) = &cell.inline {
            return Ok(CellValue::String(unescape_xlsx_text(text).into_owned()));
        }
        let text = match &cell.value {
            Some(text) if !text.is_empty() => text,
            _ => return Ok(CellValue::Empty),
        };

        let value = match cell.kind.as_deref().unwrap_or("n") {
            "s" => {
                let index = text.trim().parse::<usize>()?;
                match self.strings.resolve(index) {
                    Ok(value) => CellValue::String(value),
                    Err(SheetStreamError::CacheError(CacheError::NotFound(_))) => {
                        Err(SpreadsheetError::SharedStringNotFound(index))?
                    }
                    Err(error) => Err(error)?,
                }
            }
            "str" | "inlineStr" => CellValue::String(unescape_xlsx_text(text).into_owned()),
            "b" => CellValue::Boolean(matches!(text.trim(), "1" | "true" | "TRUE")),
            "e" => CellValue::Error(text.to_owned()),
            "d" => match parse_iso_datetime(text) {
                Some(datetime) => self.date_value(datetime, cell.style),
                None => CellValue::String(text.to_owned()),
            },
            "n" => {
                let number = text.trim().parse::<f64>()?;
                let is_date = self.styles.number_format(cell.style).is_date();
                match serial_to_datetime(number, self.is_1904).filter(|_| is_date) {
                    Some(datetime) => self.date_value(datetime, cell.style),
                    None => CellValue::Number(number),
                }
            }
            kind => {
                warn!("Unknown cell type '{kind}', reading the value as text");
                CellValue::String(text.to_owned())
            }
        };
        Ok(value)
    }

    fn date_value(&self, datetime: NaiveDateTime, style: usize) -> CellValue {
        if !self.format_dates {
            return CellValue::DateTime(datetime);
        }
        let format = self.styles.number_format(style);
        let text = if format.is_date() {
            format_datetime(&datetime, &format.code())
        } else {
            format_datetime(&datetime, ISO_DATETIME_CODE)
        };
        CellValue::String(text)
    }
}

/// Column count of a `ref` or `spans` attribute; ranges past column `XFD` are rejected
fn width_attribute<R: BufRead>(cursor: &XmlCursor<R>, name: &str) -> Result<usize, SheetStreamError> {
    match cursor.attribute(name)? {
        Some(range) => match range_width(&range) {
            Some(width) => Ok(width),
            None => Err(XmlError::InvalidReferenceError(range.into_owned()))?,
        },
        None => Ok(0),
    }
}

fn on_dimension<R: BufRead>(state: &mut DecoderState<'_>, cursor: &mut XmlCursor<R>) -> Result<Flow, SheetStreamError> {
    state.width = width_attribute(cursor, "ref")?;
    Ok(Flow::Continue)
}

fn on_row_start<R: BufRead>(state: &mut DecoderState<'_>, cursor: &mut XmlCursor<R>) -> Result<Flow, SheetStreamError> {
    state.row_number = cursor
        .parse_attribute::<usize>("r")?
        .filter(|number| *number > state.last_row_number)
        .unwrap_or(state.last_row_number + 1);
    state.row_width = width_attribute(cursor, "spans")?;
    state.cells.clear();
    state.next_column = 0;
    state.phase = Phase::InRow;
    Ok(Flow::Continue)
}

fn on_cell_start<R: BufRead>(state: &mut DecoderState<'_>, cursor: &mut XmlCursor<R>) -> Result<Flow, SheetStreamError> {
    if state.phase != Phase::InRow {
        return Ok(Flow::Continue);
    }
    let column = match cursor.attribute("r")? {
        Some(reference) => match reference_to_index(&reference) {
            Some((_, column)) => column,
            None => Err(XmlError::InvalidReferenceError(reference.into_owned()))?,
        },
        None if state.next_column < MAX_COLUMNS => state.next_column,
        None => Err(XmlError::InvalidReferenceError(column_letters(state.next_column)))?,
    };
    state.cell = PendingCell {
        column,
        kind: cursor.attribute("t")?.map(|kind| kind.into_owned()),
        style: cursor.parse_attribute("s")?.unwrap_or(0),
        ..PendingCell::default()
    };
    Ok(Flow::Continue)
}

fn on_value<R: BufRead>(state: &mut DecoderState<'_>, cursor: &mut XmlCursor<R>) -> Result<Flow, SheetStreamError> {
    if state.phase == Phase::InRow {
        state.cell.value = Some(cursor.read_text()?);
    }
    Ok(Flow::Continue)
}

fn on_inline_string<R: BufRead>(state: &mut DecoderState<'_>, cursor: &mut XmlCursor<R>) -> Result<Flow, SheetStreamError> {
    if state.phase == Phase::InRow {
        state.cell.inline = Some(cursor.read_rich_text()?);
    }
    Ok(Flow::Continue)
}

fn on_formula<R: BufRead>(state: &mut DecoderState<'_>, cursor: &mut XmlCursor<R>) -> Result<Flow, SheetStreamError> {
    if state.phase == Phase::InRow {
        state.cell.formula = Some(cursor.read_text()?);
    }
    Ok(Flow::Continue)
}

fn on_cell_end<R: BufRead>(state: &mut DecoderState<'_>, _: &mut XmlCursor<R>) -> Result<Flow, SheetStreamError> {
    if state.phase != Phase::InRow {
        return Ok(Flow::Continue);
    }
    let cell = std::mem::take(&mut state.cell);
    let value = state.decode_value(&cell)?;
    let value = match cell.formula {
        Some(expression) if !expression.is_empty() => CellValue::Formula {
            expression,
            cached: (!value.is_empty()).then(|| Box::new(value)),
        },
        _ => value,
    };
    state.cells.push((cell.column, Cell::new(value)));
    state.next_column = cell.column + 1;
    Ok(Flow::Continue)
}

fn on_row_end<R: BufRead>(state: &mut DecoderState<'_>, _: &mut XmlCursor<R>) -> Result<Flow, SheetStreamError> {
    let width = if state.width > 0 { state.width } else { state.row_width };
    let row = Row::fill_missing_indexes(state.cells.drain(..), width);
    state.max_width = state.max_width.max(row.len());
    let previous = state.last_row_number;
    state.last_row_number = state.row_number;
    state.phase = Phase::BetweenRows;

    if !state.preserve_empty_rows {
        if row.is_empty() {
            return Ok(Flow::Continue);
        }
        state.ready = Some(row);
        return Ok(Flow::Stop);
    }
    state.missing_rows = state.row_number - previous - 1;
    state.ready = Some(row);
    Ok(Flow::Stop)
}

fn on_sheet_data_end<R: BufRead>(state: &mut DecoderState<'_>, _: &mut XmlCursor<R>) -> Result<Flow, SheetStreamError> {
    state.phase = Phase::Done;
    Ok(Flow::Stop)
}

/// Lazy, forward-only iterator over the rows of one worksheet.
///
/// The worksheet part is read incrementally; each call to [`Iterator::next`] consumes
/// just enough XML to produce the next row. The part is released once the iterator is
/// exhausted, fails, or [`XlsxRows::close`] is called.
pub struct XlsxRows<'a, R: BufRead> {
    cursor: Option<XmlCursor<R>>,
    processor: XmlProcessor<DecoderState<'a>, R>,
    state: DecoderState<'a>,
}

impl<'a, R: BufRead> XlsxRows<'a, R> {
    pub(super) fn new(
        cursor: XmlCursor<R>,
        strings: &'a mut SharedStringTable,
        styles: &'a StyleTable,
        options: &ReaderOptions,
        is_1904: bool,
    ) -> Self {
        let processor = XmlProcessor::new()
            .on("dimension", NodeKind::Start, on_dimension)
            .on("row", NodeKind::Start, on_row_start)
            .on("c", NodeKind::Start, on_cell_start)
            .on("v", NodeKind::Start, on_value)
            .on("is", NodeKind::Start, on_inline_string)
            .on("f", NodeKind::Start, on_formula)
            .on("c", NodeKind::End, on_cell_end)
            .on("row", NodeKind::End, on_row_end)
            .on("sheetData", NodeKind::End, on_sheet_data_end);
        let state = DecoderState {
            strings,
            styles,
            format_dates: options.format_dates,
            preserve_empty_rows: options.preserve_empty_rows,
            is_1904,
            phase: Phase::BeforeFirstRow,
            width: 0,
            row_width: 0,
            max_width: 0,
            row_number: 0,
            last_row_number: 0,
            cells: Vec::new(),
            next_column: 0,
            cell: PendingCell::default(),
            missing_rows: 0,
            ready: None,
        };
        XlsxRows {
            cursor: Some(cursor),
            processor,
            state,
        }
    }

    /// Releases the worksheet part. Later calls to `next` return `None`.
    pub fn close(&mut self) {
        self.cursor = None;
        self.state.phase = Phase::Done;
        self.state.missing_rows = 0;
        self.state.ready = None;
    }
}

impl<R: BufRead> Iterator for XlsxRows<'_, R> {
    type Item = Result<Row, SheetStreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(row) = self.state.take_row() {
                return Some(Ok(row));
            }
            let cursor = self.cursor.as_mut()?;
            match self.processor.process_until_stopped(cursor, &mut self.state) {
                Ok(true) if self.state.phase == Phase::Done => self.cursor = None,
                Ok(true) => (),
                Ok(false) => {
                    self.close();
                    return Some(Err(XmlError::UnexpectedEndError("sheetData".to_owned()).into()));
                }
                Err(error) => {
                    self.close();
                    return Some(Err(error));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::strings::CachingOptions;
    use std::io::Cursor;

    fn worksheet(sheet_data: &str) -> XmlCursor<Cursor<Vec<u8>>> {
        let xml = format!(
            r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">{sheet_data}</worksheet>"#
        );
        XmlCursor::new(Cursor::new(xml.into_bytes()))
    }

    fn strings(values: &[&str]) -> SharedStringTable {
        let mut table = SharedStringTable::for_reading(&CachingOptions::default(), Some(values.len() as u64)).unwrap();
        for value in values {
            table.push(value).unwrap();
        }
        table
    }

    fn decode(sheet_data: &str, table: &mut SharedStringTable, options: &ReaderOptions) -> Vec<Row> {
        let styles = StyleTable::default();
        XlsxRows::new(worksheet(sheet_data), table, &styles, options, false)
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn decodes_cell_types() {
        let mut table = strings(&["shared"]);
        let rows = decode(
            concat!(
                "<sheetData><row r=\"1\">",
                "<c r=\"A1\" t=\"s\"><v>0</v></c>",
                "<c r=\"B1\"><v>1.5</v></c>",
                "<c r=\"C1\" t=\"b\"><v>1</v></c>",
                "<c r=\"D1\" t=\"e\"><v>#DIV/0!</v></c>",
                "<c r=\"E1\" t=\"inlineStr\"><is><t>in_x000A_line</t></is></c>",
                "<c r=\"F1\" t=\"str\"><f>UPPER(\"a\")</f><v>A</v></c>",
                "<c r=\"G1\" t=\"d\"><v>2024-01-31T12:00:00</v></c>",
                "</row></sheetData>"
            ),
            &mut table,
            &ReaderOptions::default(),
        );
        let values: Vec<CellValue> = rows[0].cells().iter().map(|cell| cell.value().clone()).collect();
        assert_eq!(
            values,
            vec![
                CellValue::String("shared".to_owned()),
                CellValue::Number(1.5),
                CellValue::Boolean(true),
                CellValue::Error("#DIV/0!".to_owned()),
                CellValue::String("in\nline".to_owned()),
                CellValue::Formula {
                    expression: "UPPER(\"a\")".to_owned(),
                    cached: Some(Box::new(CellValue::String("A".to_owned()))),
                },
                CellValue::DateTime(parse_iso_datetime("2024-01-31T12:00:00").unwrap()),
            ]
        );
    }

    #[test]
    fn fills_gaps_and_pads_to_dimension() {
        let mut table = strings(&[]);
        let rows = decode(
            r#"<dimension ref="A1:E3"/><sheetData><row r="1"><c r="B1"><v>1</v></c><c r="D1"><v>3</v></c></row></sheetData>"#,
            &mut table,
            &ReaderOptions::default(),
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].len(), 5);
        assert!(rows[0].cell(0).unwrap().is_empty());
        assert_eq!(rows[0].cell(1).unwrap().value(), &CellValue::Number(1.0));
        assert!(rows[0].cell(2).unwrap().is_empty());
        assert_eq!(rows[0].cell(3).unwrap().value(), &CellValue::Number(3.0));
    }

    #[test]
    fn empty_rows_follow_the_option() {
        let sheet_data = r#"<sheetData><row r="2" spans="1:2"><c r="A2"><v>1</v></c></row><row r="3"><c r="A3" s="0"/></row><row r="5"><c r="B5"><v>2</v></c></row></sheetData>"#;

        let mut table = strings(&[]);
        let rows = decode(sheet_data, &mut table, &ReaderOptions::default());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].len(), 2);

        let options = ReaderOptions {
            preserve_empty_rows: true,
            ..ReaderOptions::default()
        };
        let rows = decode(sheet_data, &mut table, &options);
        assert_eq!(rows.len(), 5);
        assert!(rows[0].is_empty());
        assert!(!rows[1].is_empty());
        assert!(rows[2].is_empty());
        assert!(rows[3].is_empty());
        assert_eq!(rows[4].cell(1).unwrap().value(), &CellValue::Number(2.0));
    }

    #[test]
    fn skipped_rows_take_the_widest_row_without_dimension() {
        let options = ReaderOptions {
            preserve_empty_rows: true,
            ..ReaderOptions::default()
        };
        let mut table = strings(&[]);
        let rows = decode(
            r#"<sheetData><row r="1"><c r="A1"><v>1</v></c><c r="B1"><v>2</v></c></row><row r="3"><c r="A3"><v>3</v></c></row></sheetData>"#,
            &mut table,
            &options,
        );
        assert_eq!(rows.iter().map(Row::len).collect::<Vec<_>>(), vec![2, 2, 1]);
        assert!(rows[1].is_empty());
    }

    #[test]
    fn references_past_the_last_column_are_rejected() {
        for sheet_data in [
            r#"<sheetData><row r="1"><c r="ZZZZZZZZZZZZZ1"><v>1</v></c></row></sheetData>"#,
            r#"<sheetData><row r="1"><c r="XFE1"><v>1</v></c></row></sheetData>"#,
            r#"<sheetData><row r="1" spans="1:99999999999"><c><v>1</v></c></row></sheetData>"#,
            r#"<dimension ref="A1:ZZZZZZZZZ1"/><sheetData><row r="1"><c><v>1</v></c></row></sheetData>"#,
        ] {
            let mut table = strings(&[]);
            let styles = StyleTable::default();
            let mut rows = XlsxRows::new(worksheet(sheet_data), &mut table, &styles, &ReaderOptions::default(), false);
            let error = rows.next().unwrap().unwrap_err();
            assert_eq!(error.kind(), ErrorKind::XmlProcessing, "{sheet_data}");
            assert!(rows.next().is_none());
        }
    }

    #[test]
    fn last_column_is_accepted() {
        let mut table = strings(&[]);
        let rows = decode(
            r#"<sheetData><row r="1"><c r="XFD1"><v>1</v></c></row></sheetData>"#,
            &mut table,
            &ReaderOptions::default(),
        );
        assert_eq!(rows[0].len(), MAX_COLUMNS);
        assert_eq!(rows[0].cell(MAX_COLUMNS - 1).unwrap().value(), &CellValue::Number(1.0));
    }

    #[test]
    fn unknown_shared_strings_are_fatal() {
        let mut table = strings(&["only"]);
        let styles = StyleTable::default();
        let mut rows = XlsxRows::new(
            worksheet(r#"<sheetData><row r="1"><c t="s"><v>3</v></c></row></sheetData>"#),
            &mut table,
            &styles,
            &ReaderOptions::default(),
            false,
        );
        let error = rows.next().unwrap().unwrap_err();
        assert!(matches!(
            error,
            SheetStreamError::SpreadsheetError(SpreadsheetError::SharedStringNotFound(3))
        ));
        assert_eq!(error.kind(), ErrorKind::NotFound);
        assert!(rows.next().is_none());
    }

    #[test]
    fn truncated_sheet_data_is_an_error() {
        let mut table = strings(&[]);
        let styles = StyleTable::default();
        let mut rows = XlsxRows::new(
            worksheet(r#"<sheetData><row r="1"><c><v>1</v></c></row>"#),
            &mut table,
            &styles,
            &ReaderOptions::default(),
            false,
        );
        assert!(rows.next().unwrap().is_ok());
        assert_eq!(rows.next().unwrap().unwrap_err().kind(), ErrorKind::XmlProcessing);
        assert!(rows.next().is_none());
    }

    #[test]
    fn close_stops_iteration() {
        let mut table = strings(&[]);
        let styles = StyleTable::default();
        let mut rows = XlsxRows::new(
            worksheet(r#"<sheetData><row><c><v>1</v></c></row><row><c><v>2</v></c></row></sheetData>"#),
            &mut table,
            &styles,
            &ReaderOptions::default(),
            false,
        );
        assert!(rows.next().is_some());
        rows.close();
        assert!(rows.next().is_none());
    }
}
