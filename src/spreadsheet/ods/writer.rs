use crate::error::ResultMessage;
use crate::error::SheetStreamError;
use crate::helpers::xml::escape;
use crate::helpers::xml::is_escaped_control;
use crate::helpers::zip::deflated;
use crate::helpers::zip::stored;
use crate::helpers::zip::ZipWriterHelper;
use crate::spreadsheet::cell::CellValue;
use crate::spreadsheet::ods::CONTENT_PATH;
use crate::spreadsheet::ods::MANIFEST_PATH;
use crate::spreadsheet::ods::MIME_TYPE;
use crate::spreadsheet::ods::SETTINGS_PATH;
use crate::spreadsheet::options::WriterOptions;
use crate::spreadsheet::reference::index_to_reference;
use crate::spreadsheet::row::Row;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::sheet::Workbook;
use crate::spreadsheet::style::cell_style;
use crate::spreadsheet::style::StyleRegistry;
use crate::spreadsheet::SpreadsheetError;
use chrono::NaiveDateTime;
use chrono::Utc;
use log::debug;
use std::fs::File;
use std::io::copy;
use std::io::BufWriter;
use std::io::Seek;
use std::io::SeekFrom;
use std::io::Write;
use std::path::Path;
use zip::ZipWriter;

const NAMESPACES: &str = concat!(
    r#"xmlns:office="urn:oasis:names:tc:opendocument:xmlns:office:1.0" "#,
    r#"xmlns:style="urn:oasis:names:tc:opendocument:xmlns:style:1.0" "#,
    r#"xmlns:text="urn:oasis:names:tc:opendocument:xmlns:text:1.0" "#,
    r#"xmlns:table="urn:oasis:names:tc:opendocument:xmlns:table:1.0" "#,
    r#"xmlns:fo="urn:oasis:names:tc:opendocument:xmlns:xsl-fo-compatible:1.0" "#,
    r#"xmlns:svg="urn:oasis:names:tc:opendocument:xmlns:svg-compatible:1.0" "#,
    r#"xmlns:of="urn:oasis:names:tc:opendocument:xmlns:of:1.2" "#,
    r#"xmlns:calcext="urn:org:documentfoundation:names:experimental:calc:xmlns:calcext:1.0" "#,
    r#"xmlns:meta="urn:oasis:names:tc:opendocument:xmlns:meta:1.0" "#,
    r#"xmlns:config="urn:oasis:names:tc:opendocument:xmlns:config:1.0" "#,
    r#"office:version="1.3""#
);

const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

/// Rows rendered for a table whose columns count is only known at the end
struct TableBody {
    output: BufWriter<File>,
    columns: usize,
    rows: usize,
}

/// Streaming ODS writer
pub struct OdsWriter<W: Write + Seek> {
    output: W,
    options: WriterOptions,
    workbook: Workbook,
    bodies: Vec<TableBody>,
    styles: StyleRegistry,
}

impl OdsWriter<BufWriter<File>> {
    /// Creates (or truncates) an ODS file
    pub fn create<P: AsRef<Path>>(path: P, options: WriterOptions) -> Result<Self, SheetStreamError> {
        let file = File::create(path.as_ref())?;
        OdsWriter::new(BufWriter::new(file), options)
    }
}

impl<W: Write + Seek> OdsWriter<W> {
    /// Creates a writer holding one empty table named `Sheet1`
    pub fn new(output: W, options: WriterOptions) -> Result<Self, SheetStreamError> {
        let body = new_body(&options)?;
        Ok(OdsWriter {
            output,
            options,
            workbook: Workbook::new(),
            bodies: vec![body],
            styles: StyleRegistry::new(),
        })
    }

    /// Appends a row to the current table. Error cells cannot be written to ODS.
    pub fn add_row(&mut self, row: &Row) -> Result<(), SheetStreamError> {
        let index = self.workbook.current_index();
        let row_index = self.bodies[index].rows;
        for (column, cell) in row.cells().iter().enumerate() {
            validate_cell(cell.value(), row_index, column)?;
        }

        let mut xml = String::from("<table:table-row>");
        if row.is_empty() {
            xml.push_str("<table:table-cell/>");
        } else {
            let base = row.style().or(self.options.default_row_style.as_ref());
            for cell in row.cells() {
                let style_id = self.styles.register(&cell_style(cell, base))?;
                render_cell(&mut xml, cell.value(), style_id);
            }
        }
        xml.push_str("</table:table-row>");

        let body = &mut self.bodies[index];
        body.output.write_all(xml.as_bytes())?;
        body.columns = body.columns.max(row.len());
        body.rows += 1;
        Ok(())
    }

    pub fn add_rows<'r>(&mut self, rows: impl IntoIterator<Item = &'r Row>) -> Result<(), SheetStreamError> {
        for row in rows {
            self.add_row(row)?;
        }
        Ok(())
    }

    /// Adds a table named after the first free `Sheet{n}` and makes it current
    pub fn add_new_sheet_and_make_it_current(&mut self) -> Result<usize, SheetStreamError> {
        let body = new_body(&self.options)?;
        let index = self.workbook.add_sheet();
        self.bodies.push(body);
        self.workbook.set_current(index)?;
        Ok(index)
    }

    pub fn set_current_sheet(&mut self, index: usize) -> Result<(), SheetStreamError> {
        Ok(self.workbook.set_current(index)?)
    }

    pub fn set_current_sheet_name(&mut self, name: &str) -> Result<(), SheetStreamError> {
        Ok(self.workbook.set_current_name(name)?)
    }

    pub fn set_current_sheet_visible(&mut self, visible: bool) {
        self.workbook.set_current_visible(visible);
    }

    pub fn sheets(&self) -> &[Sheet] {
        self.workbook.sheets()
    }

    pub fn current_sheet(&self) -> &Sheet {
        self.workbook.current()
    }

    /// Assembles the package and returns the underlying output
    pub fn close(self) -> Result<W, SheetStreamError> {
        let OdsWriter {
            output,
            workbook,
            bodies,
            styles,
            ..
        } = self;
        debug!("Assembling document with {} tables and {} styles", bodies.len(), styles.len());

        let mut zip = ZipWriter::new(output);
        zip.write_str("mimetype", MIME_TYPE, stored())?;
        zip.write_str(MANIFEST_PATH, MANIFEST, deflated())?;
        zip.write_str("meta.xml", &meta(), deflated())?;
        zip.write_str("styles.xml", &styles_xml(&styles), deflated())?;
        zip.write_str(SETTINGS_PATH, &settings(workbook.current()), deflated())?;
        write_content(&mut zip, &workbook, bodies, &styles).with_prefix(CONTENT_PATH)?;
        let mut output = zip.finish()?;
        output.flush()?;
        Ok(output)
    }
}

fn new_body(options: &WriterOptions) -> Result<TableBody, SheetStreamError> {
    let file = match &options.temp_folder {
        Some(folder) => tempfile::tempfile_in(folder)?,
        None => tempfile::tempfile()?,
    };
    Ok(TableBody {
        output: BufWriter::new(file),
        columns: 0,
        rows: 0,
    })
}

fn validate_cell(value: &CellValue, row: usize, column: usize) -> Result<(), SheetStreamError> {
    let unsupported = |kind: &str| SpreadsheetError::UnsupportedValueType {
        reference: index_to_reference(row, column),
        kind: kind.to_owned(),
    };
    match value {
        CellValue::Error(_) => Err(unsupported(value.type_name()))?,
        CellValue::Number(number) if !number.is_finite() => Err(unsupported("non-finite number"))?,
        CellValue::Formula { cached: Some(cached), .. } => match cached.as_ref() {
            CellValue::Formula { .. } => Err(unsupported("nested formula"))?,
            cached => validate_cell(cached, row, column)?,
        },
        _ => (),
    }
    Ok(())
}

fn render_cell(xml: &mut String, value: &CellValue, style_id: u32) {
    xml.push_str("<table:table-cell");
    if style_id != 0 {
        xml.push_str(&format!(r#" table:style-name="ce{style_id}""#));
    }
    let (formula, value) = match value {
        CellValue::Formula { expression, cached } => (Some(expression), cached.as_deref()),
        value => (None, Some(value)),
    };
    if let Some(expression) = formula {
        xml.push_str(&format!(r#" table:formula="of:={}""#, escape(&strip_controls(expression))));
    }
    let text = match value {
        Some(CellValue::Number(number)) => {
            xml.push_str(&format!(r#" office:value-type="float" office:value="{number}" calcext:value-type="float""#));
            number.to_string()
        }
        Some(CellValue::Boolean(value)) => {
            xml.push_str(&format!(r#" office:value-type="boolean" office:boolean-value="{value}" calcext:value-type="boolean""#));
            String::from(if *value { "TRUE" } else { "FALSE" })
        }
        Some(CellValue::DateTime(datetime)) => {
            xml.push_str(&format!(
                r#" office:value-type="date" office:date-value="{}" calcext:value-type="date""#,
                datetime.format("%Y-%m-%dT%H:%M:%S")
            ));
            display_datetime(datetime)
        }
        Some(CellValue::String(text)) if !text.is_empty() => {
            xml.push_str(r#" office:value-type="string" calcext:value-type="string""#);
            text.to_owned()
        }
        _ => String::new(),
    };
    if text.is_empty() {
        xml.push_str("/>");
    } else {
        xml.push('>');
        xml.push_str(&paragraphs(&text));
        xml.push_str("</table:table-cell>");
    }
}

fn display_datetime(datetime: &NaiveDateTime) -> String {
    datetime.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn strip_controls(value: &str) -> String {
    value.chars().filter(|character| !is_escaped_control(*character)).collect()
}

/// Renders text as `<text:p>` paragraphs, one per line, keeping tabs and runs of spaces.
fn paragraphs(value: &str) -> String {
    let mut xml = String::new();
    for line in strip_controls(value).split('\n') {
        xml.push_str("<text:p>");
        let mut spaces = 0usize;
        for character in line.chars() {
            if character == ' ' {
                spaces += 1;
                continue;
            }
            push_spaces(&mut xml, spaces);
            spaces = 0;
            match character {
                '\t' => xml.push_str("<text:tab/>"),
                '\r' => (),
                _ => xml.push_str(&escape(character.encode_utf8(&mut [0; 4]))),
            }
        }
        push_spaces(&mut xml, spaces);
        xml.push_str("</text:p>");
    }
    xml
}

/// One literal space, the rest as `<text:s>` since XML collapses runs of whitespace
fn push_spaces(xml: &mut String, count: usize) {
    match count {
        0 => (),
        1 => xml.push(' '),
        _ => xml.push_str(&format!(r#" <text:s text:c="{}"/>"#, count - 1)),
    }
}

const MANIFEST: &str = concat!(
    "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
    r#"<manifest:manifest xmlns:manifest="urn:oasis:names:tc:opendocument:xmlns:manifest:1.0" manifest:version="1.3">"#,
    r#"<manifest:file-entry manifest:full-path="/" manifest:version="1.3" manifest:media-type="application/vnd.oasis.opendocument.spreadsheet"/>"#,
    r#"<manifest:file-entry manifest:full-path="content.xml" manifest:media-type="text/xml"/>"#,
    r#"<manifest:file-entry manifest:full-path="styles.xml" manifest:media-type="text/xml"/>"#,
    r#"<manifest:file-entry manifest:full-path="meta.xml" manifest:media-type="text/xml"/>"#,
    r#"<manifest:file-entry manifest:full-path="settings.xml" manifest:media-type="text/xml"/>"#,
    "</manifest:manifest>"
);

fn meta() -> String {
    format!(
        r#"{XML_DECLARATION}<office:document-meta {NAMESPACES}><office:meta><meta:generator>sheet_stream</meta:generator><meta:creation-date>{}</meta:creation-date></office:meta></office:document-meta>"#,
        Utc::now().format("%Y-%m-%dT%H:%M:%S")
    )
}

fn styles_xml(styles: &StyleRegistry) -> String {
    format!(
        concat!(
            "{declaration}<office:document-styles {namespaces}>{font_faces}<office:styles>",
            r#"<style:style style:name="Default" style:family="table-cell">"#,
            r#"<style:text-properties style:font-name="Calibri" fo:font-size="11pt"/>"#,
            "</style:style></office:styles></office:document-styles>"
        ),
        declaration = XML_DECLARATION,
        namespaces = NAMESPACES,
        font_faces = styles.to_ods_font_faces(),
    )
}

fn settings(active: &Sheet) -> String {
    format!(
        concat!(
            "{declaration}<office:document-settings {namespaces}><office:settings>",
            r#"<config:config-item-set config:name="ooo:view-settings">"#,
            r#"<config:config-item-map-indexed config:name="Views"><config:config-item-map-entry>"#,
            r#"<config:config-item config:name="ActiveTable" config:type="string">{active}</config:config-item>"#,
            "</config:config-item-map-entry></config:config-item-map-indexed></config:config-item-set>",
            "</office:settings></office:document-settings>"
        ),
        declaration = XML_DECLARATION,
        namespaces = NAMESPACES,
        active = escape(active.name()),
    )
}

fn write_content<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    workbook: &Workbook,
    bodies: Vec<TableBody>,
    styles: &StyleRegistry,
) -> Result<(), SheetStreamError> {
    zip.start_file(CONTENT_PATH, deflated())?;
    write!(
        zip,
        concat!(
            "{declaration}<office:document-content {namespaces}>{font_faces}<office:automatic-styles>",
            r#"<style:style style:name="ta1" style:family="table"><style:table-properties table:display="true"/></style:style>"#,
            r#"<style:style style:name="ta2" style:family="table"><style:table-properties table:display="false"/></style:style>"#,
            "{cell_styles}</office:automatic-styles><office:body><office:spreadsheet>"
        ),
        declaration = XML_DECLARATION,
        namespaces = NAMESPACES,
        font_faces = styles.to_ods_font_faces(),
        cell_styles = styles.to_ods_cell_styles(),
    )?;
    for (sheet, body) in workbook.sheets().iter().zip(bodies) {
        let table_style = if sheet.is_visible() { "ta1" } else { "ta2" };
        write!(
            zip,
            r#"<table:table table:name="{}" table:style-name="{table_style}"><table:table-column table:number-columns-repeated="{}"/>"#,
            escape(sheet.name()),
            body.columns.max(1)
        )?;
        let mut file = body.output.into_inner().map_err(|error| error.into_error())?;
        file.seek(SeekFrom::Start(0))?;
        copy(&mut file, zip)?;
        zip.write_all(b"</table:table>")?;
    }
    zip.write_all(b"</office:spreadsheet></office:body></office:document-content>")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::zip::ZipHelper;
    use crate::spreadsheet::cell::Cell;
    use crate::spreadsheet::style::Style;
    use std::io::Cursor;
    use zip::ZipArchive;

    #[test]
    fn renders_paragraphs() {
        assert_eq!(paragraphs("a  b"), r#"<text:p>a <text:s text:c="1"/>b</text:p>"#);
        assert_eq!(paragraphs("x\ty\nz<\u{1}"), "<text:p>x<text:tab/>y</text:p><text:p>z&lt;</text:p>");
    }

    #[test]
    fn renders_cells() {
        let mut xml = String::new();
        render_cell(&mut xml, &CellValue::Number(2.5), 0);
        render_cell(&mut xml, &CellValue::Boolean(true), 1);
        render_cell(&mut xml, &CellValue::Empty, 0);
        render_cell(
            &mut xml,
            &CellValue::Formula {
                expression: "SUM(A1:B1)".to_owned(),
                cached: None,
            },
            0,
        );
        assert_eq!(
            xml,
            concat!(
                r#"<table:table-cell office:value-type="float" office:value="2.5" calcext:value-type="float"><text:p>2.5</text:p></table:table-cell>"#,
                r#"<table:table-cell table:style-name="ce1" office:value-type="boolean" office:boolean-value="true" calcext:value-type="boolean"><text:p>TRUE</text:p></table:table-cell>"#,
                "<table:table-cell/>",
                r#"<table:table-cell table:formula="of:=SUM(A1:B1)"/>"#
            )
        );
    }

    #[test]
    fn assembles_the_package() {
        let mut writer = OdsWriter::new(Cursor::new(Vec::new()), WriterOptions::default()).unwrap();
        writer
            .add_row(&Row::new(vec![Cell::from("a"), Cell::from(1).with_style(Style::new().bold())]))
            .unwrap();
        writer.add_row(&Row::default()).unwrap();
        writer.add_new_sheet_and_make_it_current().unwrap();
        writer.set_current_sheet_visible(false);

        let error = writer.add_row(&Row::new(vec![Cell::error("#N/A")])).unwrap_err();
        assert!(matches!(
            error,
            SheetStreamError::SpreadsheetError(SpreadsheetError::UnsupportedValueType { .. })
        ));

        let bytes = writer.close().unwrap().into_inner();
        let mut zip = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(zip.by_index(0).unwrap().name(), "mimetype");
        assert_eq!(zip.read_to_string("mimetype").unwrap().as_deref(), Some(MIME_TYPE));

        let content = zip.read_to_string(CONTENT_PATH).unwrap().unwrap();
        assert!(content.contains(r#"<table:table table:name="Sheet1" table:style-name="ta1"><table:table-column table:number-columns-repeated="2"/>"#));
        assert!(content.contains(r#"<table:table table:name="Sheet2" table:style-name="ta2"><table:table-column table:number-columns-repeated="1"/></table:table>"#));
        assert!(content.contains(r#"<style:style style:name="ce1" style:family="table-cell""#));
        assert!(content.contains("<table:table-row><table:table-cell/></table:table-row>"));

        let settings = zip.read_to_string(SETTINGS_PATH).unwrap().unwrap();
        assert!(settings.contains(">Sheet2</config:config-item>"));
    }
}
