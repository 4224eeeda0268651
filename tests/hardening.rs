use anyhow::Result;
use sheet_stream::CellValue;
use sheet_stream::ErrorKind;
use sheet_stream::ReaderOptions;
use sheet_stream::XlsxReader;
use std::io::Cursor;
use std::io::Write;
use std::time::Duration;
use std::time::Instant;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const WORKBOOK: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<sheets><sheet name="Sheet1" sheetId="1" r:id="rId1"/></sheets></workbook>"#;

const RELATIONSHIPS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
</Relationships>"#;

const SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData><row r="1"><c r="A1" t="s"><v>0</v></c></row></sheetData></worksheet>"#;

fn laughs() -> String {
    let mut xml = String::from(r#"<?xml version="1.0"?><!DOCTYPE sst [<!ENTITY lol0 "lol">"#);
    for level in 1..10 {
        let previous = format!("&lol{};", level - 1);
        xml.push_str(&format!(r#"<!ENTITY lol{level} "{}">"#, previous.repeat(10)));
    }
    xml.push_str(r#"]><sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" uniqueCount="1"><si><t>&lol9;</t></si></sst>"#);
    xml
}

fn package(shared_strings: &str) -> Result<Vec<u8>> {
    package_with_sheet(SHEET, shared_strings)
}

fn package_with_sheet(sheet: &str, shared_strings: &str) -> Result<Vec<u8>> {
    let mut archive = ZipWriter::new(Cursor::new(Vec::new()));
    for (path, content) in [
        ("xl/workbook.xml", WORKBOOK),
        ("xl/_rels/workbook.xml.rels", RELATIONSHIPS),
        ("xl/worksheets/sheet1.xml", sheet),
        ("xl/sharedStrings.xml", shared_strings),
    ] {
        archive.start_file(path, SimpleFileOptions::default())?;
        archive.write_all(content.as_bytes())?;
    }
    Ok(archive.finish()?.into_inner())
}

#[test]
fn entity_expansion_fails_fast() -> Result<()> {
    let bytes = package(&laughs())?;
    let started = Instant::now();
    let error = XlsxReader::new(Cursor::new(bytes), ReaderOptions::default()).err();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(error.map(|error| error.kind()), Some(ErrorKind::XmlProcessing));
    Ok(())
}

#[test]
fn unknown_shared_string_is_not_found() -> Result<()> {
    let shared_strings = r#"<?xml version="1.0"?><sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" uniqueCount="0"></sst>"#;
    let mut reader = XlsxReader::new(Cursor::new(package(shared_strings)?), ReaderOptions::default())?;
    let error = reader.rows(0)?.next().and_then(|row| row.err());
    assert_eq!(error.map(|error| error.kind()), Some(ErrorKind::NotFound));
    Ok(())
}

#[test]
fn oversized_cell_reference_is_rejected() -> Result<()> {
    let sheet = r#"<?xml version="1.0" encoding="UTF-8"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData><row r="1"><c r="ZZZZZZZZZZZZZ1"><v>1</v></c></row></sheetData></worksheet>"#;
    let shared_strings = r#"<?xml version="1.0"?><sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" uniqueCount="0"></sst>"#;
    let mut reader = XlsxReader::new(Cursor::new(package_with_sheet(sheet, shared_strings)?), ReaderOptions::default())?;
    let error = reader.rows(0)?.next().and_then(|row| row.err());
    assert_eq!(error.map(|error| error.kind()), Some(ErrorKind::XmlProcessing));
    Ok(())
}

#[test]
fn parts_are_found_through_relationships() -> Result<()> {
    let relationships = r#"<?xml version="1.0" encoding="UTF-8"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="/xl/text/strings.xml"/>
<Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="look/styles.xml"/>
</Relationships>"#;
    let sheet = r#"<?xml version="1.0" encoding="UTF-8"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData><row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" s="1"><v>45322</v></c></row></sheetData></worksheet>"#;
    let shared_strings = r#"<?xml version="1.0"?><sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" uniqueCount="1"><si><t>moved</t></si></sst>"#;
    let styles = r#"<?xml version="1.0"?><styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><cellXfs count="2"><xf numFmtId="0"/><xf numFmtId="14"/></cellXfs></styleSheet>"#;

    let mut archive = ZipWriter::new(Cursor::new(Vec::new()));
    for (path, content) in [
        ("xl/workbook.xml", WORKBOOK),
        ("xl/_rels/workbook.xml.rels", relationships),
        ("xl/worksheets/sheet1.xml", sheet),
        ("xl/text/strings.xml", shared_strings),
        ("xl/look/styles.xml", styles),
    ] {
        archive.start_file(path, SimpleFileOptions::default())?;
        archive.write_all(content.as_bytes())?;
    }
    let bytes = archive.finish()?.into_inner();

    let mut reader = XlsxReader::new(Cursor::new(bytes), ReaderOptions::default())?;
    let row = reader.rows(0)?.next().transpose()?.map(|row| row.into_cells());
    let values = row.map(|cells| cells.into_iter().map(|cell| cell.value().clone()).collect::<Vec<_>>());
    let date = chrono::NaiveDate::from_ymd_opt(2024, 1, 31).and_then(|date| date.and_hms_opt(0, 0, 0));
    assert_eq!(
        values,
        Some(vec![CellValue::from("moved"), CellValue::DateTime(date.unwrap())])
    );
    Ok(())
}

#[test]
fn missing_workbook_is_rejected() -> Result<()> {
    let mut archive = ZipWriter::new(Cursor::new(Vec::new()));
    archive.start_file("readme.txt", SimpleFileOptions::default())?;
    archive.write_all(b"not a workbook")?;
    let bytes = archive.finish()?.into_inner();
    assert!(XlsxReader::new(Cursor::new(bytes), ReaderOptions::default()).is_err());
    Ok(())
}
