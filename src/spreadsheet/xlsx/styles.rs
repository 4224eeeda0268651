//! Number formats of `xl/styles.xml`, the only style information the row decoder needs.

use crate::error::SheetStreamError;
use crate::helpers::xml::Flow;
use crate::helpers::xml::NodeKind;
use crate::helpers::xml::XmlCursor;
use crate::helpers::xml::XmlProcessor;
use crate::helpers::zip::ZipHelper;
use crate::spreadsheet::style::NumberFormat;
use log::warn;
use std::collections::HashMap;
use std::io::BufRead;
use std::io::Read;
use std::io::Seek;
use zip::ZipArchive;

pub(super) const STYLES_PATH: &str = "xl/styles.xml";

static GENERAL: NumberFormat = NumberFormat::GENERAL;

/// Number format of every `cellXfs` entry, indexed by the `s` attribute of cells
#[derive(Debug, Default)]
pub(super) struct StyleTable {
    formats: Vec<NumberFormat>,
}

impl StyleTable {
    /// Number format of style `index`; unknown indexes fall back to General
    pub(super) fn number_format(&self, index: usize) -> &NumberFormat {
        match self.formats.get(index) {
            Some(format) => format,
            None => {
                if index != 0 {
                    warn!("Unknown style index {index}");
                }
                &GENERAL
            }
        }
    }
}

#[derive(Default)]
struct StylesState {
    custom_formats: HashMap<u16, String>,
    format_ids: Vec<u16>,
    in_cell_formats: bool,
}

fn on_custom_format<R: BufRead>(state: &mut StylesState, cursor: &mut XmlCursor<R>) -> Result<Flow, SheetStreamError> {
    let id = cursor.parse_attribute::<u16>("numFmtId")?;
    let code = cursor.attribute("formatCode")?;
    if let Some((id, code)) = id.zip(code) {
        state.custom_formats.insert(id, code.into_owned());
    }
    Ok(Flow::Continue)
}

fn on_cell_formats_start<R: BufRead>(state: &mut StylesState, _: &mut XmlCursor<R>) -> Result<Flow, SheetStreamError> {
    state.in_cell_formats = true;
    Ok(Flow::Continue)
}

fn on_cell_formats_end<R: BufRead>(state: &mut StylesState, _: &mut XmlCursor<R>) -> Result<Flow, SheetStreamError> {
    state.in_cell_formats = false;
    Ok(Flow::Stop)
}

fn on_cell_format<R: BufRead>(state: &mut StylesState, cursor: &mut XmlCursor<R>) -> Result<Flow, SheetStreamError> {
    if state.in_cell_formats {
        state.format_ids.push(cursor.parse_attribute("numFmtId")?.unwrap_or(0));
    }
    Ok(Flow::Continue)
}

/// Loads number formats from the styles part at `path`.
///
/// A workbook without a styles part uses General everywhere.
pub(super) fn load_styles<RS: Read + Seek>(zip: &mut ZipArchive<RS>, path: &str) -> Result<StyleTable, SheetStreamError> {
    let mut cursor = match zip.xml_cursor(path)? {
        Some(cursor) => cursor,
        None => return Ok(StyleTable::default()),
    };

    let processor = XmlProcessor::new()
        .on("numFmt", NodeKind::Start, on_custom_format)
        .on("cellXfs", NodeKind::Start, on_cell_formats_start)
        .on("cellXfs", NodeKind::End, on_cell_formats_end)
        .on("xf", NodeKind::Start, on_cell_format);
    let mut state = StylesState::default();
    processor.process_until_stopped(&mut cursor, &mut state)?;

    let formats = state
        .format_ids
        .into_iter()
        .map(|id| match state.custom_formats.get(&id) {
            Some(code) => NumberFormat::Custom(code.to_owned()),
            None => NumberFormat::Builtin(id),
        })
        .collect();
    Ok(StyleTable { formats })
}
