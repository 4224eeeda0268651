//! OpenDocument spreadsheets (`.ods`).
//!
//! The reader collects table names and visibility from `content.xml` (plus the active
//! table from `settings.xml`) and then streams one table at a time. The writer keeps a
//! temporary body per table and assembles the package on close.

mod rows;
mod writer;

pub use rows::OdsRows;
pub use writer::OdsWriter;

use crate::error::ResultMessage;
use crate::error::SheetStreamError;
use crate::helpers::xml::Flow;
use crate::helpers::xml::NodeKind;
use crate::helpers::xml::XmlCursor;
use crate::helpers::xml::XmlProcessor;
use crate::helpers::zip::ZipHelper;
use crate::spreadsheet::options::ReaderOptions;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::SpreadsheetError;
use log::debug;
use std::collections::HashSet;
use std::fs::File;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Read;
use std::io::Seek;
use std::path::Path;
use zip::read::ZipFile;
use zip::ZipArchive;

/// ODS file MIME type identifier
const MIME_TYPE: &str = "application/vnd.oasis.opendocument.spreadsheet";
const CONTENT_PATH: &str = "content.xml";
const SETTINGS_PATH: &str = "settings.xml";
const MANIFEST_PATH: &str = "META-INF/manifest.xml";

/// Rows of one table read straight from the archive
pub type OdsSheetRows<'a, RS> = OdsRows<BufReader<ZipFile<'a, RS>>>;

/// Streaming ODS reader
pub struct OdsReader<RS: Read + Seek> {
    zip: ZipArchive<RS>,
    options: ReaderOptions,
    sheets: Vec<Sheet>,
}

impl OdsReader<BufReader<File>> {
    /// Opens an ODS file
    pub fn open<P: AsRef<Path>>(path: P, options: ReaderOptions) -> Result<Self, SheetStreamError> {
        let file = File::open(path.as_ref())?;
        OdsReader::new(BufReader::new(file), options)
    }
}

impl<RS: Read + Seek> OdsReader<RS> {
    /// Validates the package and reads its table list
    pub fn new(reader: RS, options: ReaderOptions) -> Result<Self, SheetStreamError> {
        let mut zip = ZipArchive::new(reader)?;
        check_mime(&mut zip)?;
        if is_password_protected(&mut zip)? {
            Err(SpreadsheetError::InvalidFileFormat("password protected document".to_owned()))?;
        }
        let active = load_active_table(&mut zip).with_prefix("Load settings")?;
        let sheets = load_tables(&mut zip, active.as_deref()).with_prefix("Load tables")?;
        debug!("Document declares {} tables", sheets.len());
        Ok(OdsReader { zip, options, sheets })
    }

    /// Tables in document order
    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    /// Streams the rows of the table at `index`
    pub fn rows(&mut self, index: usize) -> Result<OdsSheetRows<'_, RS>, SheetStreamError> {
        if index >= self.sheets.len() {
            Err(SpreadsheetError::SheetNotFound(index.to_string()))?;
        }
        let cursor = self
            .zip
            .xml_cursor(CONTENT_PATH)?
            .ok_or_else(|| SpreadsheetError::FileError(CONTENT_PATH.to_owned()))?;
        Ok(OdsRows::new(cursor, index, &self.options))
    }

    /// Streams the rows of the table called `name`
    pub fn rows_by_name(&mut self, name: &str) -> Result<OdsSheetRows<'_, RS>, SheetStreamError> {
        let index = self
            .sheets
            .iter()
            .position(|sheet| sheet.name() == name)
            .ok_or_else(|| SpreadsheetError::SheetNotFound(name.to_owned()))?;
        self.rows(index)
    }
}

fn check_mime<RS: Read + Seek>(zip: &mut ZipArchive<RS>) -> Result<(), SheetStreamError> {
    if let Some(mime) = zip.read_to_string("mimetype")? {
        if mime.trim() != MIME_TYPE {
            Err(SpreadsheetError::InvalidFileFormat(format!("unexpected MIME type '{}'", mime.trim())))?;
        }
    }
    Ok(())
}

#[derive(Default)]
struct ManifestState {
    is_encrypted: bool,
}

fn on_encryption_data<R: BufRead>(state: &mut ManifestState, _: &mut XmlCursor<R>) -> Result<Flow, SheetStreamError> {
    state.is_encrypted = true;
    Ok(Flow::Stop)
}

fn is_password_protected<RS: Read + Seek>(zip: &mut ZipArchive<RS>) -> Result<bool, SheetStreamError> {
    let mut state = ManifestState::default();
    if let Some(mut cursor) = zip.xml_cursor(MANIFEST_PATH)? {
        let processor = XmlProcessor::new().on("manifest:encryption-data", NodeKind::Start, on_encryption_data);
        processor.process_until_stopped(&mut cursor, &mut state)?;
    }
    Ok(state.is_encrypted)
}

#[derive(Default)]
struct SettingsState {
    active: Option<String>,
}

fn on_config_item<R: BufRead>(state: &mut SettingsState, cursor: &mut XmlCursor<R>) -> Result<Flow, SheetStreamError> {
    if cursor.attribute("config:name")?.is_some_and(|name| name == "ActiveTable") {
        state.active = Some(cursor.read_text()?);
        return Ok(Flow::Stop);
    }
    Ok(Flow::Continue)
}

/// Name of the table selected when the document was saved
fn load_active_table<RS: Read + Seek>(zip: &mut ZipArchive<RS>) -> Result<Option<String>, SheetStreamError> {
    let mut state = SettingsState::default();
    if let Some(mut cursor) = zip.xml_cursor(SETTINGS_PATH)? {
        let processor = XmlProcessor::new().on("config:config-item", NodeKind::Start, on_config_item);
        processor.process_until_stopped(&mut cursor, &mut state)?;
    }
    Ok(state.active)
}

#[derive(Default)]
struct TablesState {
    table_style: Option<String>,
    hidden_styles: HashSet<String>,
    tables: Vec<(String, Option<String>)>,
}

fn on_style_start<R: BufRead>(state: &mut TablesState, cursor: &mut XmlCursor<R>) -> Result<Flow, SheetStreamError> {
    state.table_style = match cursor.attribute("style:family")? {
        Some(family) if family == "table" => cursor.attribute("style:name")?.map(|name| name.into_owned()),
        _ => None,
    };
    Ok(Flow::Continue)
}

fn on_style_end<R: BufRead>(state: &mut TablesState, _: &mut XmlCursor<R>) -> Result<Flow, SheetStreamError> {
    state.table_style = None;
    Ok(Flow::Continue)
}

fn on_table_properties<R: BufRead>(state: &mut TablesState, cursor: &mut XmlCursor<R>) -> Result<Flow, SheetStreamError> {
    if let Some(style) = &state.table_style {
        if cursor.attribute("table:display")?.is_some_and(|display| display == "false") {
            state.hidden_styles.insert(style.to_owned());
        }
    }
    Ok(Flow::Continue)
}

fn on_table<R: BufRead>(state: &mut TablesState, cursor: &mut XmlCursor<R>) -> Result<Flow, SheetStreamError> {
    let name = cursor.attribute("table:name")?.map(|name| name.into_owned()).unwrap_or_default();
    let style = cursor.attribute("table:style-name")?.map(|style| style.into_owned());
    state.tables.push((name, style));
    Ok(Flow::Continue)
}

fn on_spreadsheet_end<R: BufRead>(_: &mut TablesState, _: &mut XmlCursor<R>) -> Result<Flow, SheetStreamError> {
    Ok(Flow::Stop)
}

fn load_tables<RS: Read + Seek>(zip: &mut ZipArchive<RS>, active: Option<&str>) -> Result<Vec<Sheet>, SheetStreamError> {
    let mut cursor = zip
        .xml_cursor(CONTENT_PATH)?
        .ok_or_else(|| SpreadsheetError::FileError(CONTENT_PATH.to_owned()))?;
    let processor = XmlProcessor::new()
        .on("style:style", NodeKind::Start, on_style_start)
        .on("style:style", NodeKind::End, on_style_end)
        .on("style:table-properties", NodeKind::Start, on_table_properties)
        .on("table:table", NodeKind::Start, on_table)
        .on("office:spreadsheet", NodeKind::End, on_spreadsheet_end);
    let mut state = TablesState::default();
    processor.process_until_stopped(&mut cursor, &mut state)?;

    let active = active
        .and_then(|active| state.tables.iter().position(|(name, _)| name == active))
        .unwrap_or(0);
    let sheets = state
        .tables
        .iter()
        .enumerate()
        .map(|(index, (name, style))| {
            let is_visible = style.as_ref().is_none_or(|style| !state.hidden_styles.contains(style));
            Sheet::new(index, name, index == active, is_visible)
        })
        .collect();
    Ok(sheets)
}
