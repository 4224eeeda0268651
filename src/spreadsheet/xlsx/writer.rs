use crate::error::ResultMessage;
use crate::error::SheetStreamError;
use crate::helpers::xml::escape;
use crate::helpers::zip::deflated;
use crate::helpers::zip::ZipWriterHelper;
use crate::spreadsheet::options::WriterOptions;
use crate::spreadsheet::row::Row;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::sheet::Workbook;
use crate::spreadsheet::style::StyleRegistry;
use crate::spreadsheet::xlsx::encoder::RowEncoder;
use crate::spreadsheet::xlsx::shared_strings::write_shared_strings;
use crate::spreadsheet::xlsx::shared_strings::SHARED_STRINGS_PATH;
use crate::spreadsheet::xlsx::workbook::WORKBOOK_PATH;
use crate::strings::SharedStringTable;
use chrono::Utc;
use log::debug;
use std::fs::File;
use std::io::BufWriter;
use std::io::Seek;
use std::io::Write;
use std::path::Path;
use zip::ZipWriter;

const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n";
const RELATIONSHIP_NAMESPACE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// Streaming XLSX writer.
///
/// Rows go to a temporary worksheet body per sheet; styles and shared strings are
/// collected document-wide. [`XlsxWriter::close`] assembles the package.
pub struct XlsxWriter<W: Write + Seek> {
    output: W,
    options: WriterOptions,
    workbook: Workbook,
    bodies: Vec<RowEncoder<BufWriter<File>>>,
    styles: StyleRegistry,
    strings: SharedStringTable,
}

impl XlsxWriter<BufWriter<File>> {
    /// Creates (or truncates) an XLSX file
    pub fn create<P: AsRef<Path>>(path: P, options: WriterOptions) -> Result<Self, SheetStreamError> {
        let file = File::create(path.as_ref())?;
        XlsxWriter::new(BufWriter::new(file), options)
    }
}

impl<W: Write + Seek> XlsxWriter<W> {
    /// Creates a writer holding one empty sheet named `Sheet1`
    pub fn new(output: W, options: WriterOptions) -> Result<Self, SheetStreamError> {
        let strings = SharedStringTable::for_writing(&options.shared_strings)?;
        let body = new_body(&options)?;
        Ok(XlsxWriter {
            output,
            options,
            workbook: Workbook::new(),
            bodies: vec![body],
            styles: StyleRegistry::new(),
            strings,
        })
    }

    /// Appends a row to the current sheet
    pub fn add_row(&mut self, row: &Row) -> Result<(), SheetStreamError> {
        let index = self.workbook.current_index();
        self.bodies[index].add_row(row, &mut self.styles, &mut self.strings)
    }

    /// Appends rows to the current sheet, stopping at the first failure.
    ///
    /// # Arguments
    /// * `rows` - Rows in the order they are written
    ///
    /// # Returns
    /// * `Result<(), SheetStreamError>` - The error of the first rejected row; earlier rows stay written
    pub fn add_rows<'r>(&mut self, rows: impl IntoIterator<Item = &'r Row>) -> Result<(), SheetStreamError> {
        for row in rows {
            self.add_row(row)?;
        }
        Ok(())
    }

    /// Adds a sheet named after the first free `Sheet{n}` and makes it current
    pub fn add_new_sheet_and_make_it_current(&mut self) -> Result<usize, SheetStreamError> {
        let body = new_body(&self.options)?;
        let index = self.workbook.add_sheet();
        self.bodies.push(body);
        self.workbook.set_current(index)?;
        Ok(index)
    }

    /// Makes an existing sheet current and active; later rows go to it.
    ///
    /// # Arguments
    /// * `index` - Zero-based sheet index
    ///
    /// # Returns
    /// * `Result<(), SheetStreamError>` - `SheetNotFound` when `index` is past the last sheet
    pub fn set_current_sheet(&mut self, index: usize) -> Result<(), SheetStreamError> {
        Ok(self.workbook.set_current(index)?)
    }

    /// Renames the current sheet.
    ///
    /// # Arguments
    /// * `name` - New name; it must be 1 to 31 characters long, free of `[]*?/\:`, neither start
    ///   nor end with `'`, and be unique among the other sheets, ignoring case
    pub fn set_current_sheet_name(&mut self, name: &str) -> Result<(), SheetStreamError> {
        Ok(self.workbook.set_current_name(name)?)
    }

    /// Shows or hides the current sheet
    pub fn set_current_sheet_visible(&mut self, visible: bool) {
        self.workbook.set_current_visible(visible);
    }

    /// Sheets added so far, in workbook order
    pub fn sheets(&self) -> &[Sheet] {
        self.workbook.sheets()
    }

    pub fn current_sheet(&self) -> &Sheet {
        self.workbook.current()
    }

    /// Assembles the package and returns the underlying output
    pub fn close(self) -> Result<W, SheetStreamError> {
        let XlsxWriter {
            output,
            workbook,
            mut bodies,
            styles,
            mut strings,
            ..
        } = self;
        for body in &mut bodies {
            body.close()?;
        }

        let has_shared_strings = !strings.is_empty();
        let sheet_count = workbook.sheets().len();
        debug!("Assembling workbook with {} sheets and {} styles", sheet_count, styles.len());

        let mut zip = ZipWriter::new(output);
        zip.write_str("[Content_Types].xml", &content_types(sheet_count, has_shared_strings), deflated())?;
        zip.write_str("_rels/.rels", ROOT_RELATIONSHIPS, deflated())?;
        zip.write_str("docProps/app.xml", APP_PROPERTIES, deflated())?;
        zip.write_str("docProps/core.xml", &core_properties(), deflated())?;
        zip.write_str(WORKBOOK_PATH, &workbook_xml(&workbook), deflated())?;
        zip.write_str(
            "xl/_rels/workbook.xml.rels",
            &workbook_relationships(sheet_count, has_shared_strings),
            deflated(),
        )?;
        zip.write_str("xl/styles.xml", &styles.to_xlsx_xml(), deflated())?;
        if has_shared_strings {
            zip.start_file(SHARED_STRINGS_PATH, deflated())?;
            write_shared_strings(&mut zip, &mut strings).with_prefix(SHARED_STRINGS_PATH)?;
        }
        for (index, body) in bodies.into_iter().enumerate() {
            let path = format!("xl/worksheets/sheet{}.xml", index + 1);
            let mut file = body.into_inner().into_inner().map_err(|error| error.into_error())?;
            zip.write_file(&path, &mut file, deflated()).with_prefix(&path)?;
        }

        let mut output = zip.finish()?;
        output.flush()?;
        strings.clear()?;
        Ok(output)
    }
}

fn new_body(options: &WriterOptions) -> Result<RowEncoder<BufWriter<File>>, SheetStreamError> {
    let file = match &options.temp_folder {
        Some(folder) => tempfile::tempfile_in(folder)?,
        None => tempfile::tempfile()?,
    };
    let mut encoder = RowEncoder::new(
        BufWriter::new(file),
        options.use_inline_strings,
        options.default_row_style.clone(),
    );
    encoder.start_sheet()?;
    Ok(encoder)
}

const ROOT_RELATIONSHIPS: &str = concat!(
    "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n",
    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>"#,
    r#"<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/>"#,
    r#"<Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/extended-properties" Target="docProps/app.xml"/>"#,
    "</Relationships>"
);

const APP_PROPERTIES: &str = concat!(
    "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n",
    r#"<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/extended-properties">"#,
    "<Application>sheet_stream</Application>",
    "</Properties>"
);

fn content_types(sheet_count: usize, has_shared_strings: bool) -> String {
    let mut xml = String::from(XML_DECLARATION);
    xml.push_str(r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#);
    xml.push_str(r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#);
    xml.push_str(r#"<Default Extension="xml" ContentType="application/xml"/>"#);
    xml.push_str(r#"<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#);
    for index in 1..=sheet_count {
        xml.push_str(&format!(
            r#"<Override PartName="/xl/worksheets/sheet{index}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#
        ));
    }
    xml.push_str(r#"<Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>"#);
    if has_shared_strings {
        xml.push_str(r#"<Override PartName="/xl/sharedStrings.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml"/>"#);
    }
    xml.push_str(r#"<Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/>"#);
    xml.push_str(r#"<Override PartName="/docProps/app.xml" ContentType="application/vnd.openxmlformats-officedocument.extended-properties+xml"/>"#);
    xml.push_str("</Types>");
    xml
}

fn core_properties() -> String {
    let now = Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
    format!(
        concat!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n",
            r#"<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" "#,
            r#"xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" "#,
            r#"xmlns:dcmitype="http://purl.org/dc/dcmitype/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">"#,
            r#"<dcterms:created xsi:type="dcterms:W3CDTF">{now}</dcterms:created>"#,
            r#"<dcterms:modified xsi:type="dcterms:W3CDTF">{now}</dcterms:modified>"#,
            "</cp:coreProperties>"
        ),
        now = now
    )
}

fn workbook_xml(workbook: &Workbook) -> String {
    let mut xml = String::from(XML_DECLARATION);
    xml.push_str(&format!(
        r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="{RELATIONSHIP_NAMESPACE}">"#
    ));
    xml.push_str(&format!(
        r#"<bookViews><workbookView activeTab="{}"/></bookViews><sheets>"#,
        workbook.current_index()
    ));
    for sheet in workbook.sheets() {
        let id = sheet.index() + 1;
        let state = if sheet.is_visible() { "" } else { r#" state="hidden""# };
        xml.push_str(&format!(
            r#"<sheet name="{}" sheetId="{id}"{state} r:id="rId{id}"/>"#,
            escape(sheet.name())
        ));
    }
    xml.push_str("</sheets></workbook>");
    xml
}

fn workbook_relationships(sheet_count: usize, has_shared_strings: bool) -> String {
    let mut xml = String::from(XML_DECLARATION);
    xml.push_str(r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#);
    for id in 1..=sheet_count {
        xml.push_str(&format!(
            r#"<Relationship Id="rId{id}" Type="{RELATIONSHIP_NAMESPACE}/worksheet" Target="worksheets/sheet{id}.xml"/>"#
        ));
    }
    xml.push_str(&format!(
        r#"<Relationship Id="rId{}" Type="{RELATIONSHIP_NAMESPACE}/styles" Target="styles.xml"/>"#,
        sheet_count + 1
    ));
    if has_shared_strings {
        xml.push_str(&format!(
            r#"<Relationship Id="rId{}" Type="{RELATIONSHIP_NAMESPACE}/sharedStrings" Target="sharedStrings.xml"/>"#,
            sheet_count + 2
        ));
    }
    xml.push_str("</Relationships>");
    xml
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::zip::ZipHelper;
    use std::io::Cursor;
    use zip::ZipArchive;

    #[test]
    fn assembles_the_package() {
        let options = WriterOptions {
            use_inline_strings: false,
            ..WriterOptions::default()
        };
        let mut writer = XlsxWriter::new(Cursor::new(Vec::new()), options).unwrap();
        writer.add_row(&Row::from_values(["a", "b"])).unwrap();
        writer.add_new_sheet_and_make_it_current().unwrap();
        writer.set_current_sheet_name("Data & more").unwrap();
        writer.set_current_sheet_visible(false);
        writer.add_row(&Row::from_values(["a"])).unwrap();
        let bytes = writer.close().unwrap().into_inner();

        let mut zip = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let workbook = zip.read_to_string(WORKBOOK_PATH).unwrap().unwrap();
        assert!(workbook.contains(r#"<workbookView activeTab="1"/>"#));
        assert!(workbook.contains(r#"<sheet name="Sheet1" sheetId="1" r:id="rId1"/>"#));
        assert!(workbook.contains(r#"<sheet name="Data &amp; more" sheetId="2" state="hidden" r:id="rId2"/>"#));

        let strings = zip.read_to_string(SHARED_STRINGS_PATH).unwrap().unwrap();
        assert!(strings.contains(r#"count="2" uniqueCount="2""#));

        let sheet = zip.read_to_string("xl/worksheets/sheet2.xml").unwrap().unwrap();
        assert!(sheet.ends_with(r#"<row r="1" spans="1:1"><c r="A1" t="s"><v>0</v></c></row></sheetData></worksheet>"#));

        let types = zip.read_to_string("[Content_Types].xml").unwrap().unwrap();
        assert!(types.contains("/xl/worksheets/sheet2.xml"));
        assert!(types.contains("/xl/sharedStrings.xml"));
    }

    #[test]
    fn inline_strings_skip_the_shared_strings_part() {
        let mut writer = XlsxWriter::new(Cursor::new(Vec::new()), WriterOptions::default()).unwrap();
        writer.add_row(&Row::from_values(["a"])).unwrap();
        let bytes = writer.close().unwrap().into_inner();
        let mut zip = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert!(zip.file(SHARED_STRINGS_PATH).unwrap().is_none());
        assert!(zip.file("xl/styles.xml").unwrap().is_some());
    }
}
