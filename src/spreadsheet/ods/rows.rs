use crate::error::SheetStreamError;
use crate::helpers::xml::Flow;
use crate::helpers::xml::NodeKind;
use crate::helpers::xml::XmlCursor;
use crate::helpers::xml::XmlError;
use crate::helpers::xml::XmlProcessor;
use crate::spreadsheet::cell::duration_to_datetime;
use crate::spreadsheet::cell::parse_iso_datetime;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellValue;
use crate::spreadsheet::options::ReaderOptions;
use crate::spreadsheet::reference::MAX_COLUMNS;
use crate::spreadsheet::row::Row;
use std::io::BufRead;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Phase {
    Seeking,
    InTable,
    Done,
}

/// Typed part of a cell known from its start tag; text arrives later
#[derive(Default)]
enum PendingValue {
    #[default]
    Empty,
    Text,
    Error,
    Ready(CellValue),
    /// Date or time shown as text when `format_dates` is on
    Dated(CellValue),
}

#[derive(Default)]
struct PendingCell {
    repeat: usize,
    value: PendingValue,
    formula: Option<String>,
    text: String,
    paragraphs: usize,
}

struct TableState {
    format_dates: bool,
    preserve_empty_rows: bool,
    phase: Phase,
    target: usize,
    tables_seen: usize,
    /// Nesting depth of `office:annotation`; their text is not cell content
    annotation_depth: usize,
    in_cell: bool,
    row_repeat: usize,
    cells: Vec<Cell>,
    /// Empty cells seen since the last non-empty one, written only when content follows
    empty_cells: usize,
    cell: PendingCell,
    /// Empty rows seen since the last non-empty one, emitted only when content follows
    empty_rows: usize,
    missing_rows: usize,
    ready: Option<Row>,
    ready_repeat: usize,
}

impl TableState {
    fn take_row(&mut self) -> Option<Row> {
        if self.missing_rows > 0 {
            self.missing_rows -= 1;
            return Some(Row::default());
        }
        match self.ready_repeat {
            0 => None,
            1 => {
                self.ready_repeat = 0;
                self.ready.take()
            }
            _ => {
                self.ready_repeat -= 1;
                self.ready.clone()
            }
        }
    }

    fn finish_cell(&mut self) -> Cell {
        let cell = std::mem::take(&mut self.cell);
        let value = match cell.value {
            PendingValue::Empty => CellValue::Empty,
            PendingValue::Text => CellValue::String(cell.text),
            PendingValue::Error => CellValue::Error(cell.text),
            PendingValue::Ready(value) => value,
            PendingValue::Dated(_) if self.format_dates && !cell.text.is_empty() => CellValue::String(cell.text),
            PendingValue::Dated(value) => value,
        };
        let value = match cell.formula {
            Some(expression) => CellValue::Formula {
                expression,
                cached: (!value.is_empty()).then(|| Box::new(value)),
            },
            None => value,
        };
        Cell::new(value)
    }

    fn is_reading_text(&self) -> bool {
        self.phase == Phase::InTable && self.in_cell && self.annotation_depth == 0
    }
}

/// Typed value announced by the attributes of a `table:table-cell`
fn read_value<R: BufRead>(cursor: &XmlCursor<R>) -> Result<PendingValue, SheetStreamError> {
    if cursor.attribute("calcext:value-type")?.is_some_and(|kind| kind == "error") {
        return Ok(PendingValue::Error);
    }
    let kind = match cursor.attribute("office:value-type")? {
        Some(kind) => kind.into_owned(),
        None => return Ok(PendingValue::Empty),
    };
    let value = match kind.as_str() {
        "float" | "percentage" | "currency" => match cursor.parse_attribute::<f64>("office:value")? {
            Some(number) => PendingValue::Ready(CellValue::Number(number)),
            None => PendingValue::Empty,
        },
        "boolean" => PendingValue::Ready(CellValue::Boolean(
            cursor
                .attribute("office:boolean-value")?
                .is_some_and(|value| value == "true" || value == "1"),
        )),
        "date" => match cursor.attribute("office:date-value")?.and_then(|value| parse_iso_datetime(&value)) {
            Some(datetime) => PendingValue::Dated(CellValue::DateTime(datetime)),
            None => PendingValue::Text,
        },
        "time" => match cursor.attribute("office:time-value")?.and_then(|value| duration_to_datetime(&value)) {
            Some(datetime) => PendingValue::Dated(CellValue::DateTime(datetime)),
            None => PendingValue::Text,
        },
        _ => match cursor.attribute("office:string-value")? {
            Some(value) => PendingValue::Ready(CellValue::String(value.into_owned())),
            None => PendingValue::Text,
        },
    };
    Ok(value)
}

fn on_table_start<R: BufRead>(state: &mut TableState, _: &mut XmlCursor<R>) -> Result<Flow, SheetStreamError> {
    if state.phase == Phase::Seeking {
        if state.tables_seen == state.target {
            state.phase = Phase::InTable;
        }
        state.tables_seen += 1;
    }
    Ok(Flow::Continue)
}

fn on_table_end<R: BufRead>(state: &mut TableState, _: &mut XmlCursor<R>) -> Result<Flow, SheetStreamError> {
    if state.phase == Phase::InTable {
        state.phase = Phase::Done;
        return Ok(Flow::Stop);
    }
    Ok(Flow::Continue)
}

fn on_row_start<R: BufRead>(state: &mut TableState, cursor: &mut XmlCursor<R>) -> Result<Flow, SheetStreamError> {
    if state.phase == Phase::InTable {
        state.row_repeat = cursor.parse_attribute("table:number-rows-repeated")?.unwrap_or(1).max(1);
        state.cells.clear();
        state.empty_cells = 0;
    }
    Ok(Flow::Continue)
}

fn on_row_end<R: BufRead>(state: &mut TableState, _: &mut XmlCursor<R>) -> Result<Flow, SheetStreamError> {
    if state.phase != Phase::InTable {
        return Ok(Flow::Continue);
    }
    let row = Row::new(std::mem::take(&mut state.cells));
    if row.is_empty() {
        if state.preserve_empty_rows {
            state.empty_rows = state.empty_rows.saturating_add(state.row_repeat);
        }
        return Ok(Flow::Continue);
    }
    state.missing_rows = std::mem::take(&mut state.empty_rows);
    state.ready = Some(row);
    state.ready_repeat = state.row_repeat;
    Ok(Flow::Stop)
}

fn on_cell_start<R: BufRead>(state: &mut TableState, cursor: &mut XmlCursor<R>) -> Result<Flow, SheetStreamError> {
    if state.phase != Phase::InTable {
        return Ok(Flow::Continue);
    }
    let formula = cursor.attribute("table:formula")?.map(|formula| {
        let expression = ["of:", "oooc:", "msoxl:"]
            .iter()
            .find_map(|namespace| formula.strip_prefix(*namespace))
            .unwrap_or(formula.as_ref());
        expression.strip_prefix('=').unwrap_or(expression).to_owned()
    });
    state.cell = PendingCell {
        repeat: cursor.parse_attribute("table:number-columns-repeated")?.unwrap_or(1).max(1),
        value: read_value(cursor)?,
        formula,
        ..PendingCell::default()
    };
    state.in_cell = true;
    Ok(Flow::Continue)
}

fn on_cell_end<R: BufRead>(state: &mut TableState, _: &mut XmlCursor<R>) -> Result<Flow, SheetStreamError> {
    if state.phase != Phase::InTable {
        return Ok(Flow::Continue);
    }
    state.in_cell = false;
    let repeat = state.cell.repeat;
    let cell = state.finish_cell();
    if cell.is_empty() {
        state.empty_cells += repeat;
        return Ok(Flow::Continue);
    }
    let filled = state.cells.len().saturating_add(state.empty_cells);
    if filled.saturating_add(repeat) > MAX_COLUMNS {
        Err(XmlError::InvalidReferenceError(format!("column {}", filled.saturating_add(repeat))))?
    }
    state.cells.resize_with(filled, Cell::empty);
    state.empty_cells = 0;
    for _ in 1..repeat {
        state.cells.push(cell.clone());
    }
    state.cells.push(cell);
    Ok(Flow::Continue)
}

fn on_paragraph<R: BufRead>(state: &mut TableState, _: &mut XmlCursor<R>) -> Result<Flow, SheetStreamError> {
    if state.is_reading_text() {
        if state.cell.paragraphs > 0 {
            state.cell.text.push('\n');
        }
        state.cell.paragraphs += 1;
    }
    Ok(Flow::Continue)
}

fn on_spaces<R: BufRead>(state: &mut TableState, cursor: &mut XmlCursor<R>) -> Result<Flow, SheetStreamError> {
    if state.is_reading_text() {
        let count = cursor.parse_attribute("text:c")?.unwrap_or(1);
        state.cell.text.extend(std::iter::repeat_n(' ', count));
    }
    Ok(Flow::Continue)
}

fn on_tab<R: BufRead>(state: &mut TableState, _: &mut XmlCursor<R>) -> Result<Flow, SheetStreamError> {
    if state.is_reading_text() {
        state.cell.text.push('\t');
    }
    Ok(Flow::Continue)
}

fn on_line_break<R: BufRead>(state: &mut TableState, _: &mut XmlCursor<R>) -> Result<Flow, SheetStreamError> {
    if state.is_reading_text() {
        state.cell.text.push('\n');
    }
    Ok(Flow::Continue)
}

fn on_annotation_start<R: BufRead>(state: &mut TableState, _: &mut XmlCursor<R>) -> Result<Flow, SheetStreamError> {
    state.annotation_depth += 1;
    Ok(Flow::Continue)
}

fn on_annotation_end<R: BufRead>(state: &mut TableState, _: &mut XmlCursor<R>) -> Result<Flow, SheetStreamError> {
    state.annotation_depth = state.annotation_depth.saturating_sub(1);
    Ok(Flow::Continue)
}

fn on_text<R: BufRead>(state: &mut TableState, cursor: &mut XmlCursor<R>) -> Result<Flow, SheetStreamError> {
    if state.is_reading_text() && state.cell.paragraphs > 0 {
        if let Some(text) = cursor.text() {
            state.cell.text.push_str(text);
        }
    }
    Ok(Flow::Continue)
}

/// Lazy, forward-only iterator over the rows of one table of `content.xml`.
///
/// Repeated rows and cells are expanded; trailing empty rows and cells, which office
/// suites repeat up to the sheet limits, are never materialized.
pub struct OdsRows<R: BufRead> {
    cursor: Option<XmlCursor<R>>,
    processor: XmlProcessor<TableState, R>,
    state: TableState,
}

impl<R: BufRead> OdsRows<R> {
    pub(super) fn new(cursor: XmlCursor<R>, table: usize, options: &ReaderOptions) -> Self {
        let processor = XmlProcessor::new()
            .on("table:table", NodeKind::Start, on_table_start)
            .on("table:table", NodeKind::End, on_table_end)
            .on("table:table-row", NodeKind::Start, on_row_start)
            .on("table:table-row", NodeKind::End, on_row_end)
            .on("table:table-cell", NodeKind::Start, on_cell_start)
            .on("table:table-cell", NodeKind::End, on_cell_end)
            .on("table:covered-table-cell", NodeKind::Start, on_cell_start)
            .on("table:covered-table-cell", NodeKind::End, on_cell_end)
            .on("text:p", NodeKind::Start, on_paragraph)
            .on("text:s", NodeKind::Start, on_spaces)
            .on("text:tab", NodeKind::Start, on_tab)
            .on("text:line-break", NodeKind::Start, on_line_break)
            .on("office:annotation", NodeKind::Start, on_annotation_start)
            .on("office:annotation", NodeKind::End, on_annotation_end)
            .on_text(on_text);
        let state = TableState {
            format_dates: options.format_dates,
            preserve_empty_rows: options.preserve_empty_rows,
            phase: Phase::Seeking,
            target: table,
            tables_seen: 0,
            annotation_depth: 0,
            in_cell: false,
            row_repeat: 1,
            cells: Vec::new(),
            empty_cells: 0,
            cell: PendingCell::default(),
            empty_rows: 0,
            missing_rows: 0,
            ready: None,
            ready_repeat: 0,
        };
        OdsRows {
            cursor: Some(cursor),
            processor,
            state,
        }
    }

    /// Releases `content.xml`. Later calls to `next` return `None`.
    pub fn close(&mut self) {
        self.cursor = None;
        self.state.phase = Phase::Done;
        self.state.missing_rows = 0;
        self.state.ready_repeat = 0;
        self.state.ready = None;
    }
}

impl<R: BufRead> Iterator for OdsRows<R> {
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
                    return Some(Err(XmlError::UnexpectedEndError("table:table".to_owned()).into()));
                }
                Err(error) => {
                    self.close();
                    return Some(Err(error));
                }
            }
        }
    }
}
