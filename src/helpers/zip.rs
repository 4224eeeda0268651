//! ZIP archive helpers shared by the XLSX and ODS containers.
//! Reading resolves entries case-insensitively and hands them out as [`XmlCursor`]s;
//! writing streams string parts and temporary worksheet bodies into the archive.

use crate::error::SheetStreamError;
use crate::helpers::xml::XmlCursor;
use std::io::copy;
use std::io::BufReader;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::io::Write;
use zip::read::ZipFile;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::CompressionMethod;
use zip::ZipArchive;
use zip::ZipWriter;

/// Helper trait for ZIP archive reads
pub(crate) trait ZipHelper<RS: Read + Seek> {
    /// Gets a file from the ZIP archive by name (case-insensitive, path separator agnostic)
    fn file(&'_ mut self, name: &str) -> Result<Option<ZipFile<'_, RS>>, SheetStreamError>;

    /// Opens a part of the archive as a streaming XML cursor
    fn xml_cursor(&'_ mut self, name: &str) -> Result<Option<XmlCursor<BufReader<ZipFile<'_, RS>>>>, SheetStreamError>;

    /// Reads a whole part as UTF-8 text
    fn read_to_string(&mut self, name: &str) -> Result<Option<String>, SheetStreamError>;
}

impl<RS: Read + Seek> ZipHelper<RS> for ZipArchive<RS> {
    fn file(&'_ mut self, name: &str) -> Result<Option<ZipFile<'_, RS>>, SheetStreamError> {
        let pattern = name.replace('\\', "/");
        let path = self
            .file_names()
            .find(|file_name| pattern.eq_ignore_ascii_case(&file_name.replace('\\', "/")))
            .map(|file_name| file_name.to_owned());
        match path.map(|file_name| self.by_name(&file_name)).transpose() {
            Ok(Some(file)) => Ok(Some(file)),
            Ok(None) | Err(ZipError::FileNotFound) => Ok(None),
            Err(error) => Err(error)?,
        }
    }

    fn xml_cursor(&'_ mut self, name: &str) -> Result<Option<XmlCursor<BufReader<ZipFile<'_, RS>>>>, SheetStreamError> {
        let cursor = self
            .file(name)?
            .map(|file| XmlCursor::new(BufReader::new(file)));
        Ok(cursor)
    }

    fn read_to_string(&mut self, name: &str) -> Result<Option<String>, SheetStreamError> {
        match self.file(name)? {
            Some(mut file) => {
                let mut content = String::new();
                file.read_to_string(&mut content)?;
                Ok(Some(content))
            }
            None => Ok(None),
        }
    }
}

/// Deflated entry options used for every part except the ODS `mimetype`
pub(crate) fn deflated() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
}

/// Stored (uncompressed) entry options
pub(crate) fn stored() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Stored)
}

/// Helper trait for ZIP archive writes
pub(crate) trait ZipWriterHelper {
    /// Writes an in-memory part
    fn write_str(&mut self, path: &str, content: &str, options: SimpleFileOptions) -> Result<(), SheetStreamError>;

    /// Copies a rewound temporary file into a new part
    fn write_file<F: Read + Seek>(&mut self, path: &str, file: &mut F, options: SimpleFileOptions) -> Result<(), SheetStreamError>;
}

impl<W: Write + Seek> ZipWriterHelper for ZipWriter<W> {
    fn write_str(&mut self, path: &str, content: &str, options: SimpleFileOptions) -> Result<(), SheetStreamError> {
        self.start_file(path, options)?;
        self.write_all(content.as_bytes())?;
        Ok(())
    }

    fn write_file<F: Read + Seek>(&mut self, path: &str, file: &mut F, options: SimpleFileOptions) -> Result<(), SheetStreamError> {
        self.start_file(path, options)?;
        file.seek(SeekFrom::Start(0))?;
        copy(file, self)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parts_are_found_case_insensitively() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer.write_str("xl/Workbook.xml", "<workbook/>", deflated()).unwrap();
        let mut body = Cursor::new(b"<worksheet/>".to_vec());
        body.seek(SeekFrom::End(0)).unwrap();
        writer.write_file("xl/worksheets/sheet1.xml", &mut body, stored()).unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.read_to_string("XL\\workbook.xml").unwrap().as_deref(), Some("<workbook/>"));
        assert_eq!(archive.read_to_string("xl/worksheets/sheet1.xml").unwrap().as_deref(), Some("<worksheet/>"));
        assert!(archive.file("xl/missing.xml").unwrap().is_none());

        let mut cursor = archive.xml_cursor("xl/workbook.xml").unwrap().unwrap();
        assert!(cursor.read().unwrap());
        assert_eq!(cursor.local_name(), b"workbook");
    }
}
