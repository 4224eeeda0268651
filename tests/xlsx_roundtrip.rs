use anyhow::Result;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use pretty_assertions::assert_eq;
use sheet_stream::CachingOptions;
use sheet_stream::CachingStrategy;
use sheet_stream::Cell;
use sheet_stream::CellValue;
use sheet_stream::ErrorKind;
use sheet_stream::ReaderOptions;
use sheet_stream::Row;
use sheet_stream::Style;
use sheet_stream::WriterOptions;
use sheet_stream::XlsxReader;
use sheet_stream::XlsxWriter;
use std::io::Read;

fn joined() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 5).unwrap().and_hms_opt(14, 7, 0).unwrap()
}

fn values(row: &Row) -> Vec<CellValue> {
    row.cells().iter().map(|cell| cell.value().clone()).collect()
}

fn read_values(reader: &mut XlsxReader<std::io::BufReader<std::fs::File>>, index: usize) -> Result<Vec<Vec<CellValue>>> {
    let mut rows = Vec::new();
    for row in reader.rows(index)? {
        rows.push(values(&row?));
    }
    Ok(rows)
}

fn sample_rows() -> Vec<Row> {
    vec![
        Row::from_values(["name", "score", "joined"]).with_style(Style::new().bold()),
        Row::new(vec![Cell::from("ada"), Cell::from(36), Cell::from(joined())]),
        Row::new(vec![
            Cell::from("two\nlines  and\ttabs"),
            Cell::empty(),
            Cell::from(true),
            Cell::formula("B2*2"),
            Cell::error("#DIV/0!"),
        ]),
    ]
}

fn expected_values() -> Vec<Vec<CellValue>> {
    vec![
        vec!["name".into(), "score".into(), "joined".into()],
        vec!["ada".into(), CellValue::Number(36.0), CellValue::DateTime(joined())],
        vec![
            "two\nlines  and\ttabs".into(),
            CellValue::Empty,
            CellValue::Boolean(true),
            CellValue::Formula {
                expression: "B2*2".to_owned(),
                cached: None,
            },
            CellValue::Error("#DIV/0!".to_owned()),
        ],
    ]
}

#[test]
fn inline_strings_round_trip() -> Result<()> {
    let folder = tempfile::tempdir()?;
    let path = folder.path().join("inline.xlsx");

    let mut writer = XlsxWriter::create(&path, WriterOptions::default())?;
    writer.add_rows(&sample_rows())?;
    writer.add_new_sheet_and_make_it_current()?;
    writer.set_current_sheet_name("Hidden")?;
    writer.set_current_sheet_visible(false);
    writer.add_row(&Row::from_values([1.5, 2.5]))?;
    writer.set_current_sheet(0)?;
    writer.close()?;

    let mut reader = XlsxReader::open(&path, ReaderOptions::default())?;
    let sheets = reader.sheets();
    assert_eq!(
        sheets.iter().map(|sheet| (sheet.name(), sheet.is_active(), sheet.is_visible())).collect::<Vec<_>>(),
        vec![("Sheet1", true, true), ("Hidden", false, false)]
    );
    assert_eq!(read_values(&mut reader, 0)?, expected_values());
    assert_eq!(
        read_values(&mut reader, 1)?,
        vec![vec![CellValue::Number(1.5), CellValue::Number(2.5)]]
    );
    reader.close()?;
    Ok(())
}

#[test]
fn shared_strings_round_trip() -> Result<()> {
    let folder = tempfile::tempdir()?;
    let path = folder.path().join("shared.xlsx");
    let options = WriterOptions {
        use_inline_strings: false,
        ..WriterOptions::default()
    };

    let mut writer = XlsxWriter::create(&path, options)?;
    writer.add_rows(&sample_rows())?;
    writer.add_row(&Row::from_values(["ada", "name"]))?;
    writer.close()?;

    let mut archive = zip::ZipArchive::new(std::fs::File::open(&path)?)?;
    let mut shared_strings = String::new();
    archive.by_name("xl/sharedStrings.xml")?.read_to_string(&mut shared_strings)?;
    assert!(shared_strings.contains(r#"count="5" uniqueCount="5""#));

    let mut reader = XlsxReader::open(&path, ReaderOptions::default())?;
    let mut expected = expected_values();
    expected.push(vec!["ada".into(), "name".into()]);
    assert_eq!(read_values(&mut reader, 0)?, expected);
    Ok(())
}

#[test]
fn paged_shared_strings_resolve_every_index() -> Result<()> {
    let folder = tempfile::tempdir()?;
    let path = folder.path().join("paged.xlsx");
    let rows: Vec<Row> = (1..=5)
        .map(|row| Row::from_values(["A", "B", "C", "D", "E"].map(|column| format!("s1--{column}{row}"))))
        .collect();

    let mut writer = XlsxWriter::create(
        &path,
        WriterOptions {
            use_inline_strings: false,
            ..WriterOptions::default()
        },
    )?;
    writer.add_rows(&rows)?;
    writer.close()?;

    let options = ReaderOptions {
        shared_strings: CachingOptions {
            strategy: Some(CachingStrategy::Paged),
            page_size: 4,
            temp_folder: Some(folder.path().to_path_buf()),
            ..CachingOptions::default()
        },
        ..ReaderOptions::default()
    };
    let mut reader = XlsxReader::open(&path, options)?;
    let expected: Vec<Vec<CellValue>> = rows.iter().map(values).collect();
    assert_eq!(read_values(&mut reader, 0)?, expected);
    Ok(())
}

#[test]
fn dates_render_with_their_format() -> Result<()> {
    let folder = tempfile::tempdir()?;
    let path = folder.path().join("dates.xlsx");
    let mut writer = XlsxWriter::create(&path, WriterOptions::default())?;
    writer.add_row(&Row::from_values([joined()]))?;
    writer.close()?;

    let options = ReaderOptions {
        format_dates: true,
        ..ReaderOptions::default()
    };
    let mut reader = XlsxReader::open(&path, options)?;
    assert_eq!(read_values(&mut reader, 0)?, vec![vec![CellValue::from("3/5/2024 14:07")]]);
    Ok(())
}

#[test]
fn empty_rows_are_kept_on_request() -> Result<()> {
    let folder = tempfile::tempdir()?;
    let path = folder.path().join("gaps.xlsx");
    let mut writer = XlsxWriter::create(&path, WriterOptions::default())?;
    writer.add_row(&Row::from_values(["a"]))?;
    writer.add_row(&Row::default())?;
    writer.add_row(&Row::from_values(["b"]))?;
    writer.close()?;

    let mut reader = XlsxReader::open(&path, ReaderOptions::default())?;
    assert_eq!(read_values(&mut reader, 0)?.len(), 2);

    let options = ReaderOptions {
        preserve_empty_rows: true,
        ..ReaderOptions::default()
    };
    let mut reader = XlsxReader::open(&path, options)?;
    assert_eq!(
        read_values(&mut reader, 0)?,
        vec![vec![CellValue::from("a")], vec![CellValue::Empty], vec![CellValue::from("b")]]
    );
    Ok(())
}

#[test]
fn carriage_returns_survive() -> Result<()> {
    let folder = tempfile::tempdir()?;
    for use_inline_strings in [true, false] {
        let path = folder.path().join(format!("cr-{use_inline_strings}.xlsx"));
        let options = WriterOptions {
            use_inline_strings,
            ..WriterOptions::default()
        };
        let mut writer = XlsxWriter::create(&path, options)?;
        writer.add_row(&Row::from_values(["a\rb", "c\r\nd"]))?;
        writer.close()?;

        let mut reader = XlsxReader::open(&path, ReaderOptions::default())?;
        assert_eq!(read_values(&mut reader, 0)?, vec![vec![CellValue::from("a\rb"), CellValue::from("c\r\nd")]]);
    }
    Ok(())
}

#[test]
fn cell_length_limit() -> Result<()> {
    let folder = tempfile::tempdir()?;
    let path = folder.path().join("limit.xlsx");
    let mut writer = XlsxWriter::create(&path, WriterOptions::default())?;

    let error = writer.add_row(&Row::from_values(["x".repeat(32_768)])).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::InvalidArgument);
    writer.add_row(&Row::from_values(["x".repeat(32_767)]))?;
    writer.close()?;

    let mut reader = XlsxReader::open(&path, ReaderOptions::default())?;
    let rows = read_values(&mut reader, 0)?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0], vec![CellValue::String("x".repeat(32_767))]);
    Ok(())
}

#[test]
fn unknown_sheets_are_not_found() -> Result<()> {
    let folder = tempfile::tempdir()?;
    let path = folder.path().join("sheets.xlsx");
    XlsxWriter::create(&path, WriterOptions::default())?.close()?;

    let mut reader = XlsxReader::open(&path, ReaderOptions::default())?;
    assert_eq!(reader.rows(3).err().map(|error| error.kind()), Some(ErrorKind::NotFound));
    assert_eq!(reader.rows_by_name("Missing").err().map(|error| error.kind()), Some(ErrorKind::NotFound));
    assert_eq!(read_values(&mut reader, 0)?, Vec::<Vec<CellValue>>::new());
    Ok(())
}
