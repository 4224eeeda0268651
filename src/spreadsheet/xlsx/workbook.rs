//! `xl/workbook.xml` and its relationships: sheet names, parts, visibility and date system.

use crate::error::SheetStreamError;
use crate::helpers::xml::Flow;
use crate::helpers::xml::NodeKind;
use crate::helpers::xml::XmlCursor;
use crate::helpers::xml::XmlProcessor;
use crate::helpers::zip::ZipHelper;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::xlsx::shared_strings::SHARED_STRINGS_PATH;
use crate::spreadsheet::xlsx::styles::STYLES_PATH;
use crate::spreadsheet::SpreadsheetError;
use log::debug;
use log::warn;
use std::collections::HashMap;
use std::io::BufRead;
use std::io::Read;
use std::io::Seek;
use zip::ZipArchive;

pub(super) const WORKBOOK_PATH: &str = "xl/workbook.xml";
const WORKBOOK_RELATIONSHIPS_PATH: &str = "xl/_rels/workbook.xml.rels";

/// Sheet metadata plus the archive path of its worksheet part
pub(super) struct SheetEntry {
    pub(super) sheet: Sheet,
    pub(super) path: String,
}

/// Everything `workbook.xml` and its relationships tell about the document
pub(super) struct WorkbookInfo {
    pub(super) sheets: Vec<SheetEntry>,
    pub(super) is_1904: bool,
    /// Archive path of the shared string table part
    pub(super) shared_strings_path: String,
    /// Archive path of the styles part
    pub(super) styles_path: String,
}

/// Parts the workbook points to, by relationship type
#[derive(Default)]
struct Relationships {
    /// Worksheet parts by relationship id
    worksheets: HashMap<String, String>,
    shared_strings: Option<String>,
    styles: Option<String>,
}

fn on_relationship<R: BufRead>(state: &mut Relationships, cursor: &mut XmlCursor<R>) -> Result<Flow, SheetStreamError> {
    let id = cursor.attribute("Id")?.map(|id| id.into_owned());
    let kind = cursor.attribute("Type")?.map(|kind| kind.into_owned()).unwrap_or_default();
    let Some(target) = cursor.attribute("Target")?.map(|target| to_zip_path(&target)) else {
        return Ok(Flow::Continue);
    };
    if kind.ends_with("/sharedStrings") {
        state.shared_strings = Some(target);
    } else if kind.ends_with("/styles") {
        state.styles = Some(target);
    } else if kind.is_empty() || kind.ends_with("/worksheet") {
        if let Some(id) = id {
            state.worksheets.insert(id, target);
        }
    }
    Ok(Flow::Continue)
}

/// Loads the worksheet, shared string and styles targets of the workbook
fn load_relationships<RS: Read + Seek>(zip: &mut ZipArchive<RS>) -> Result<Relationships, SheetStreamError> {
    let mut cursor = zip
        .xml_cursor(WORKBOOK_RELATIONSHIPS_PATH)?
        .ok_or_else(|| SpreadsheetError::FileError(WORKBOOK_RELATIONSHIPS_PATH.to_owned()))?;
    let processor = XmlProcessor::new().on("Relationship", NodeKind::Start, on_relationship);
    let mut state = Relationships::default();
    processor.process_until_stopped(&mut cursor, &mut state)?;
    Ok(state)
}

struct WorkbookState {
    relationships: HashMap<String, String>,
    sheets: Vec<SheetEntry>,
    active: usize,
    is_1904: bool,
}

fn on_workbook_properties<R: BufRead>(state: &mut WorkbookState, cursor: &mut XmlCursor<R>) -> Result<Flow, SheetStreamError> {
    state.is_1904 = cursor
        .attribute("date1904")?
        .map(|value| value == "1" || value == "true")
        .unwrap_or(false);
    Ok(Flow::Continue)
}

fn on_workbook_view<R: BufRead>(state: &mut WorkbookState, cursor: &mut XmlCursor<R>) -> Result<Flow, SheetStreamError> {
    state.active = cursor.parse_attribute("activeTab")?.unwrap_or(0);
    Ok(Flow::Continue)
}

fn on_sheet<R: BufRead>(state: &mut WorkbookState, cursor: &mut XmlCursor<R>) -> Result<Flow, SheetStreamError> {
    let name = cursor.attribute("name")?.map(|name| name.into_owned());
    let is_visible = cursor
        .attribute("state")?
        .map(|value| value == "visible")
        .unwrap_or(true);
    let id = cursor.attribute_by_local_name(b"id")?;
    match (name, id.and_then(|id| state.relationships.get(&id).cloned())) {
        (Some(name), Some(path)) => {
            let index = state.sheets.len();
            state.sheets.push(SheetEntry {
                sheet: Sheet::new(index, &name, false, is_visible),
                path,
            });
        }
        (name, _) => warn!("Skipping sheet {name:?} without a worksheet part"),
    }
    Ok(Flow::Continue)
}

fn on_sheets_end<R: BufRead>(_: &mut WorkbookState, _: &mut XmlCursor<R>) -> Result<Flow, SheetStreamError> {
    Ok(Flow::Stop)
}

/// Loads the sheet list and the date system of the workbook
pub(super) fn load_workbook<RS: Read + Seek>(zip: &mut ZipArchive<RS>) -> Result<WorkbookInfo, SheetStreamError> {
    let Relationships {
        worksheets,
        shared_strings,
        styles,
    } = load_relationships(zip)?;
    let mut cursor = zip
        .xml_cursor(WORKBOOK_PATH)?
        .ok_or_else(|| SpreadsheetError::FileError(WORKBOOK_PATH.to_owned()))?;
    let processor = XmlProcessor::new()
        .on("workbookPr", NodeKind::Start, on_workbook_properties)
        .on("workbookView", NodeKind::Start, on_workbook_view)
        .on("sheet", NodeKind::Start, on_sheet)
        .on("sheets", NodeKind::End, on_sheets_end);
    let mut state = WorkbookState {
        relationships: worksheets,
        sheets: Vec::new(),
        active: 0,
        is_1904: false,
    };
    processor.process_until_stopped(&mut cursor, &mut state)?;

    let active = if state.active < state.sheets.len() { state.active } else { 0 };
    let sheets = state
        .sheets
        .into_iter()
        .map(|entry| SheetEntry {
            sheet: Sheet::new(entry.sheet.index(), entry.sheet.name(), entry.sheet.index() == active, entry.sheet.is_visible()),
            path: entry.path,
        })
        .collect::<Vec<_>>();
    debug!("Workbook declares {} sheets, 1904 date system: {}", sheets.len(), state.is_1904);
    Ok(WorkbookInfo {
        sheets,
        is_1904: state.is_1904,
        shared_strings_path: shared_strings.unwrap_or_else(|| SHARED_STRINGS_PATH.to_owned()),
        styles_path: styles.unwrap_or_else(|| STYLES_PATH.to_owned()),
    })
}

/// Normalizes a relationship target to a path inside the archive
pub(crate) fn to_zip_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    if let Some(absolute) = path.strip_prefix('/') {
        absolute.to_owned()
    } else if path.starts_with("xl/") {
        path
    } else {
        format!("xl/{}", path.trim_start_matches("./"))
    }
}
