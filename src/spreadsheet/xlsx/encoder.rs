//! Worksheet body encoder: `<sheetData>` rows written as they are added.

use crate::error::SheetStreamError;
use crate::helpers::xml::escape;
use crate::helpers::xml::escape_xlsx_text;
use crate::spreadsheet::cell::datetime_to_serial;
use crate::spreadsheet::cell::CellValue;
use crate::spreadsheet::cell::MAX_CELL_CHARACTERS;
use crate::spreadsheet::reference::index_to_reference;
use crate::spreadsheet::row::Row;
use crate::spreadsheet::style::cell_style;
use crate::spreadsheet::style::Style;
use crate::spreadsheet::style::StyleRegistry;
use crate::spreadsheet::SpreadsheetError;
use crate::strings::SharedStringTable;
use std::io::Write;

const WORKSHEET_HEADER: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    "\n",
    r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" "#,
    r#"xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">"#,
    "<sheetData>"
);

const WORKSHEET_FOOTER: &str = "</sheetData></worksheet>";

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum EncoderState {
    Created,
    Started,
    Closed,
}

/// Streams rows of one worksheet into `output`.
///
/// Each row is validated and rendered completely before anything reaches the output, so a
/// rejected row leaves neither bytes nor shared strings behind.
pub struct RowEncoder<W: Write> {
    output: W,
    state: EncoderState,
    row_number: usize,
    use_inline_strings: bool,
    default_row_style: Option<Style>,
}

impl<W: Write> RowEncoder<W> {
    pub fn new(output: W, use_inline_strings: bool, default_row_style: Option<Style>) -> Self {
        RowEncoder {
            output,
            state: EncoderState::Created,
            row_number: 0,
            use_inline_strings,
            default_row_style,
        }
    }

    /// Writes the worksheet header. Only the first call is allowed.
    pub fn start_sheet(&mut self) -> Result<(), SheetStreamError> {
        if self.state != EncoderState::Created {
            Err(SpreadsheetError::WriterState("worksheet already started".to_owned()))?;
        }
        self.output.write_all(WORKSHEET_HEADER.as_bytes())?;
        self.state = EncoderState::Started;
        Ok(())
    }

    /// Number of rows added so far, empty ones included
    pub fn rows_written(&self) -> usize {
        self.row_number
    }

    /// Encodes the next row.
    ///
    /// Rows without any non-empty cell take a row number but produce no markup.
    pub fn add_row(
        &mut self,
        row: &Row,
        styles: &mut StyleRegistry,
        strings: &mut SharedStringTable,
    ) -> Result<(), SheetStreamError> {
        if self.state != EncoderState::Started {
            Err(SpreadsheetError::WriterState("rows must be added between start_sheet and close".to_owned()))?;
        }
        let row_index = self.row_number;
        if row.is_empty() {
            self.row_number += 1;
            return Ok(());
        }

        for (column, cell) in row.cells().iter().enumerate() {
            validate_cell(cell.value(), row_index, column)?;
        }

        let base = row.style().or(self.default_row_style.as_ref());
        let mut xml = String::with_capacity(64 * row.len());
        xml.push_str(&format!(r#"<row r="{}" spans="1:{}">"#, row_index + 1, row.len()));
        for (column, cell) in row.cells().iter().enumerate() {
            let style_id = styles.register(&cell_style(cell, base))?;
            let reference = index_to_reference(row_index, column);
            self.render_cell(&mut xml, &reference, cell.value(), style_id, strings)?;
        }
        xml.push_str("</row>");

        self.output.write_all(xml.as_bytes())?;
        self.row_number += 1;
        Ok(())
    }

    fn render_cell(
        &self,
        xml: &mut String,
        reference: &str,
        value: &CellValue,
        style_id: u32,
        strings: &mut SharedStringTable,
    ) -> Result<(), SheetStreamError> {
        let style = if style_id == 0 { String::new() } else { format!(r#" s="{style_id}""#) };
        match value {
            value if value.is_empty() => {
                if style_id != 0 {
                    xml.push_str(&format!(r#"<c r="{reference}"{style}/>"#));
                }
            }
            CellValue::String(text) if self.use_inline_strings => xml.push_str(&format!(
                r#"<c r="{reference}"{style} t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
                escape_xlsx_text(text)
            )),
            CellValue::String(text) => {
                let id = strings.intern(text)?;
                xml.push_str(&format!(r#"<c r="{reference}"{style} t="s"><v>{id}</v></c>"#));
            }
            CellValue::Formula { expression, cached } => {
                let (kind, cached) = match cached.as_deref() {
                    Some(cached) => (formula_result_type(cached), literal(cached)),
                    None => ("", None),
                };
                xml.push_str(&format!(r#"<c r="{reference}"{style}{kind}><f>{}</f>"#, escape_xlsx_text(expression)));
                if let Some(cached) = cached {
                    xml.push_str(&format!("<v>{cached}</v>"));
                }
                xml.push_str("</c>");
            }
            value => {
                let kind = match value {
                    CellValue::Boolean(_) => r#" t="b""#,
                    CellValue::Error(_) => r#" t="e""#,
                    _ => "",
                };
                let literal = literal(value).unwrap_or_default();
                xml.push_str(&format!(r#"<c r="{reference}"{style}{kind}><v>{literal}</v></c>"#));
            }
        }
        Ok(())
    }

    /// Writes the closing tags and flushes. The header is written first if the sheet never started.
    pub fn close(&mut self) -> Result<(), SheetStreamError> {
        match self.state {
            EncoderState::Closed => Err(SpreadsheetError::WriterState("worksheet already closed".to_owned()))?,
            EncoderState::Created => self.start_sheet()?,
            EncoderState::Started => (),
        }
        self.output.write_all(WORKSHEET_FOOTER.as_bytes())?;
        self.output.flush()?;
        self.state = EncoderState::Closed;
        Ok(())
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.output
    }

    pub fn into_inner(self) -> W {
        self.output
    }
}

fn validate_cell(value: &CellValue, row: usize, column: usize) -> Result<(), SheetStreamError> {
    let too_large = |length: usize| SpreadsheetError::ValueTooLarge {
        reference: index_to_reference(row, column),
        length,
        limit: MAX_CELL_CHARACTERS,
    };
    let unsupported = |kind: &str| SpreadsheetError::UnsupportedValueType {
        reference: index_to_reference(row, column),
        kind: kind.to_owned(),
    };
    match value {
        CellValue::String(text) | CellValue::Error(text) => {
            let length = text.chars().count();
            if length > MAX_CELL_CHARACTERS {
                Err(too_large(length))?;
            }
        }
        CellValue::Number(number) if !number.is_finite() => Err(unsupported("non-finite number"))?,
        CellValue::Formula { expression, cached } => {
            let length = expression.chars().count();
            if length > MAX_CELL_CHARACTERS {
                Err(too_large(length))?;
            }
            if let Some(cached) = cached.as_deref() {
                if let CellValue::Formula { .. } = cached {
                    Err(unsupported("nested formula"))?;
                }
                validate_cell(cached, row, column)?;
            }
        }
        _ => (),
    }
    Ok(())
}

/// `t` attribute of a formula cell holding `cached`
fn formula_result_type(cached: &CellValue) -> &'static str {
    match cached {
        CellValue::String(_) => r#" t="str""#,
        CellValue::Boolean(_) => r#" t="b""#,
        CellValue::Error(_) => r#" t="e""#,
        _ => "",
    }
}

/// Text of the `<v>` element for a non-empty scalar value
fn literal(value: &CellValue) -> Option<String> {
    match value {
        CellValue::Boolean(value) => Some(if *value { "1" } else { "0" }.to_owned()),
        CellValue::Number(number) => Some(number.to_string()),
        CellValue::DateTime(datetime) => Some(datetime_to_serial(datetime, false).to_string()),
        CellValue::String(text) => Some(escape_xlsx_text(text)),
        CellValue::Error(text) => Some(escape(text).into_owned()),
        CellValue::Empty | CellValue::Formula { .. } => None,
    }
}
