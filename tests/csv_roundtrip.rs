use anyhow::Result;
use pretty_assertions::assert_eq;
use sheet_stream::Cell;
use sheet_stream::CsvReader;
use sheet_stream::CsvWriter;
use sheet_stream::ReaderOptions;
use sheet_stream::Row;
use sheet_stream::WriterOptions;

#[test]
fn records_round_trip_through_a_file() -> Result<()> {
    let folder = tempfile::tempdir()?;
    let path = folder.path().join("export.csv");
    let mut options = WriterOptions::default();
    options.csv.delimiter = b'\t';

    let mut writer = CsvWriter::create(&path, &options)?;
    writer.add_row(&Row::from_values(["id", "comment"]))?;
    writer.add_row(&Row::new(vec![Cell::from(7), Cell::from("said \"hi\"\tthen left")]))?;
    writer.add_row(&Row::new(vec![Cell::empty(), Cell::from("multi\nline")]))?;
    writer.close()?;

    let bytes = std::fs::read(&path)?;
    assert!(bytes.starts_with(b"\xEF\xBB\xBFid\tcomment\n"));

    let mut read_options = ReaderOptions::default();
    read_options.csv.delimiter = b'\t';
    let rows = CsvReader::open(&path, &read_options)?.collect::<Result<Vec<_>, _>>()?;
    assert_eq!(
        rows,
        vec![
            Row::from_values(["id", "comment"]),
            Row::from_values(["7", "said \"hi\"\tthen left"]),
            Row::new(vec![Cell::empty(), Cell::from("multi\nline")]),
        ]
    );
    Ok(())
}

#[test]
fn closing_stops_the_reader() {
    let mut reader = CsvReader::new(&b"a\nb\nc\n"[..], &ReaderOptions::default());
    assert_eq!(reader.next().map(|row| row.ok()), Some(Some(Row::from_values(["a"]))));
    reader.close();
    assert!(reader.next().is_none());
}
