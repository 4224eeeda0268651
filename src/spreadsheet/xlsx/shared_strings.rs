//! `xl/sharedStrings.xml`: reading it into a [`SharedStringTable`] and writing it back out.

use crate::error::SheetStreamError;
use crate::helpers::xml::escape_xlsx_text;
use crate::helpers::xml::unescape_xlsx_text;
use crate::helpers::xml::Flow;
use crate::helpers::xml::NodeKind;
use crate::helpers::xml::XmlCursor;
use crate::helpers::xml::XmlProcessor;
use crate::helpers::zip::ZipHelper;
use crate::strings::CachingOptions;
use crate::strings::SharedStringTable;
use log::debug;
use std::io::BufRead;
use std::io::Read;
use std::io::Seek;
use std::io::Write;
use zip::ZipArchive;

pub(super) const SHARED_STRINGS_PATH: &str = "xl/sharedStrings.xml";

struct LoadState<'a> {
    options: &'a CachingOptions,
    table: Option<SharedStringTable>,
}

impl LoadState<'_> {
    fn table(&mut self, unique_count: Option<u64>) -> Result<&mut SharedStringTable, SheetStreamError> {
        if self.table.is_none() {
            self.table = Some(SharedStringTable::for_reading(self.options, unique_count)?);
        }
        match &mut self.table {
            Some(table) => Ok(table),
            None => unreachable!("table initialized above"),
        }
    }
}

fn on_table_start<R: BufRead>(state: &mut LoadState<'_>, cursor: &mut XmlCursor<R>) -> Result<Flow, SheetStreamError> {
    let unique_count = cursor.parse_attribute::<u64>("uniqueCount")?;
    state.table(unique_count)?;
    Ok(Flow::Continue)
}

fn on_item<R: BufRead>(state: &mut LoadState<'_>, cursor: &mut XmlCursor<R>) -> Result<Flow, SheetStreamError> {
    let text = cursor.read_rich_text()?;
    state.table(None)?.push(&unescape_xlsx_text(&text))?;
    Ok(Flow::Continue)
}

fn on_table_end<R: BufRead>(_: &mut LoadState<'_>, _: &mut XmlCursor<R>) -> Result<Flow, SheetStreamError> {
    Ok(Flow::Stop)
}

/// Loads every shared string of the part at `path` in document order
pub(super) fn load_shared_strings<RS: Read + Seek>(
    zip: &mut ZipArchive<RS>,
    path: &str,
    options: &CachingOptions,
) -> Result<SharedStringTable, SheetStreamError> {
    let mut state = LoadState { options, table: None };
    if let Some(mut cursor) = zip.xml_cursor(path)? {
        let processor = XmlProcessor::new()
            .on("sst", NodeKind::Start, on_table_start)
            .on("si", NodeKind::Start, on_item)
            .on("sst", NodeKind::End, on_table_end);
        processor.process_until_stopped(&mut cursor, &mut state)?;
    }

    let mut table = match state.table {
        Some(table) => table,
        None => SharedStringTable::for_reading(options, Some(0))?,
    };
    table.close()?;
    debug!("Loaded {} shared strings", table.len());
    Ok(table)
}

/// Streams the shared strings part for every interned value, in id order
pub(super) fn write_shared_strings<W: Write>(output: &mut W, table: &mut SharedStringTable) -> Result<(), SheetStreamError> {
    let count = table.len();
    write!(
        output,
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            "\n",
            r#"<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="{count}" uniqueCount="{count}">"#
        ),
        count = count
    )?;
    for id in 0..count {
        let value = table.resolve(id)?;
        write!(output, r#"<si><t xml:space="preserve">{}</t></si>"#, escape_xlsx_text(&value))?;
    }
    output.write_all(b"</sst>")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_the_table_in_id_order() {
        let mut table = SharedStringTable::for_writing(&CachingOptions::default()).unwrap();
        table.intern("b & c").unwrap();
        table.intern("a\u{1}").unwrap();
        table.intern("b & c").unwrap();
        let mut output = Vec::new();
        write_shared_strings(&mut output, &mut table).unwrap();
        let xml = String::from_utf8(output).unwrap();
        assert!(xml.contains(r#"count="2" uniqueCount="2">"#));
        assert!(xml.ends_with(r#"<si><t xml:space="preserve">b &amp; c</t></si><si><t xml:space="preserve">a_x0001_</t></si></sst>"#));
    }
}
