//! Content-based format detection for local input files.
//!
//! The file extension is only a hint: a recognised content signature always
//! wins, and the extension decides only when sniffing finds neither.

use std::io::{Cursor, Read};
use std::path::Path;

use cardcat_core::CardcatError;

/// ZIP file magic bytes: PK\x03\x04
const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// Content type declared for the SpreadsheetML workbook part.
const XLSX_PART_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml";

pub const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// How many records the CSV check inspects before accepting.
const CSV_SAMPLE_RECORDS: usize = 100;

/// The two formats the local-file reader understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    DelimitedText,
    Spreadsheet,
}

impl SourceFormat {
    pub const ALL: [SourceFormat; 2] = [SourceFormat::DelimitedText, SourceFormat::Spreadsheet];

    /// The file extension that selects this format when sniffing is inconclusive.
    pub fn extension(&self) -> &'static str {
        match self {
            SourceFormat::DelimitedText => "csv",
            SourceFormat::Spreadsheet => "xlsx",
        }
    }
}

impl std::fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceFormat::DelimitedText => write!(f, "CSV"),
            SourceFormat::Spreadsheet => write!(f, "XLSX workbook"),
        }
    }
}

/// Content class found by sniffing, before the extension is consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sniffed {
    Spreadsheet,
    Zip,
    Csv,
    PlainText,
    Binary,
}

impl Sniffed {
    pub fn mime(&self) -> &'static str {
        match self {
            Sniffed::Spreadsheet => XLSX_MIME,
            Sniffed::Zip => "application/zip",
            Sniffed::Csv => "text/csv",
            Sniffed::PlainText => "text/plain",
            Sniffed::Binary => "application/octet-stream",
        }
    }
}

/// Classify raw bytes by content alone.
pub fn sniff(data: &[u8]) -> Sniffed {
    if is_zip_file(data) {
        return if is_spreadsheet_zip(data) {
            Sniffed::Spreadsheet
        } else {
            Sniffed::Zip
        };
    }

    let Ok(text) = std::str::from_utf8(strip_bom(data)) else {
        return Sniffed::Binary;
    };
    if text.contains('\0') {
        return Sniffed::Binary;
    }
    if looks_like_csv(text) {
        Sniffed::Csv
    } else {
        Sniffed::PlainText
    }
}

/// Decide how to read a local file.
///
/// Spreadsheet or CSV content is authoritative. Otherwise a `.csv` or `.xlsx`
/// extension decides, and anything else is a classification error.
pub fn detect_format(data: &[u8], file_name: &str) -> Result<SourceFormat, CardcatError> {
    let sniffed = sniff(data);
    match sniffed {
        Sniffed::Spreadsheet => return Ok(SourceFormat::Spreadsheet),
        Sniffed::Csv => return Ok(SourceFormat::DelimitedText),
        _ => {}
    }

    let extension = extension_of(file_name);
    SourceFormat::ALL
        .into_iter()
        .find(|format| format.extension() == extension)
        .ok_or_else(|| CardcatError::Classification {
            mime: sniffed.mime().to_string(),
            extension,
        })
}

/// Check if data starts with ZIP magic bytes.
pub fn is_zip_file(data: &[u8]) -> bool {
    data.len() >= 4 && data[..4] == ZIP_MAGIC
}

pub(crate) fn strip_bom(data: &[u8]) -> &[u8] {
    data.strip_prefix(&UTF8_BOM[..]).unwrap_or(data)
}

fn extension_of(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

/// A ZIP is a workbook when `[Content_Types].xml` declares the workbook part,
/// or, failing that, when it carries an `xl/` folder.
fn is_spreadsheet_zip(data: &[u8]) -> bool {
    let Ok(mut archive) = zip::ZipArchive::new(Cursor::new(data)) else {
        return false;
    };

    if let Ok(mut file) = archive.by_name("[Content_Types].xml") {
        let mut content = String::new();
        if file.read_to_string(&mut content).is_ok() && content.contains(XLSX_PART_CONTENT_TYPE)
        {
            return true;
        }
    }

    archive.file_names().any(|name| name.starts_with("xl/"))
}

/// At least one record, every record with the same field count, and more than one field.
fn looks_like_csv(text: &str) -> bool {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut width = None;
    for record in reader.records().take(CSV_SAMPLE_RECORDS) {
        let Ok(record) = record else {
            return false;
        };
        match width {
            None => width = Some(record.len()),
            Some(w) if w != record.len() => return false,
            Some(_) => {}
        }
    }
    width.is_some_and(|w| w >= 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workbook_bytes() -> Vec<u8> {
        let mut workbook = rust_xlsxwriter::Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "name").unwrap();
        sheet.write_string(0, 1, "address").unwrap();
        workbook.save_to_buffer().unwrap()
    }

    fn plain_zip() -> Vec<u8> {
        use std::io::Write;
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("notes.txt", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"hello").unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_sniff_classes() {
        assert_eq!(sniff(&workbook_bytes()), Sniffed::Spreadsheet);
        assert_eq!(sniff(&plain_zip()), Sniffed::Zip);
        assert_eq!(sniff(b"name,address\nAlice,1 Main St\n"), Sniffed::Csv);
        assert_eq!(sniff(b"just a sentence\nand another\n"), Sniffed::PlainText);
        assert_eq!(sniff(b""), Sniffed::PlainText);
        assert_eq!(sniff(&[0xFF, 0xFE, 0x00, 0x01]), Sniffed::Binary);
    }

    #[test]
    fn test_sniff_csv_with_bom() {
        let mut data = UTF8_BOM.to_vec();
        data.extend_from_slice(b"name,address\nAlice,1 Main St\n");
        assert_eq!(sniff(&data), Sniffed::Csv);
    }

    #[test]
    fn test_ragged_rows_are_not_csv() {
        assert_eq!(sniff(b"name,address\nAlice\n"), Sniffed::PlainText);
    }

    #[test]
    fn test_spreadsheet_content_beats_extension() {
        let data = workbook_bytes();
        for name in ["data.xlsx", "data.csv", "data.txt", "data"] {
            assert_eq!(
                detect_format(&data, name).unwrap(),
                SourceFormat::Spreadsheet,
                "{name}"
            );
        }
    }

    #[test]
    fn test_csv_content_beats_extension() {
        let data = b"name,address\nAlice,1 Main St\n";
        assert_eq!(
            detect_format(data, "data.xlsx").unwrap(),
            SourceFormat::DelimitedText
        );
        assert_eq!(
            detect_format(data, "upload.bin").unwrap(),
            SourceFormat::DelimitedText
        );
    }

    #[test]
    fn test_extension_used_when_sniffing_is_inconclusive() {
        let ragged = b"name,address\nAlice\n";
        assert_eq!(
            detect_format(ragged, "DATA.CSV").unwrap(),
            SourceFormat::DelimitedText
        );
        assert_eq!(
            detect_format(&plain_zip(), "broken.xlsx").unwrap(),
            SourceFormat::Spreadsheet
        );
    }

    #[test]
    fn test_unrecognised_content_and_extension_fails() {
        let err = detect_format(b"just a sentence\n", "notes.txt").unwrap_err();
        match err {
            CardcatError::Classification { mime, extension } => {
                assert_eq!(mime, "text/plain");
                assert_eq!(extension, "txt");
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = detect_format(&plain_zip(), "archive").unwrap_err();
        assert!(matches!(
            err,
            CardcatError::Classification { ref mime, .. } if mime == "application/zip"
        ));
    }

    #[test]
    fn test_is_zip_file() {
        assert!(is_zip_file(&[0x50, 0x4B, 0x03, 0x04, 0x00]));
        assert!(!is_zip_file(&[0x00, 0x00, 0x00, 0x00]));
        assert!(!is_zip_file(&[0x50, 0x4B]));
    }

    #[test]
    fn test_mime_strings() {
        assert_eq!(Sniffed::Spreadsheet.mime(), XLSX_MIME);
        assert_eq!(Sniffed::Csv.mime(), "text/csv");
        assert_eq!(SourceFormat::Spreadsheet.extension(), "xlsx");
    }
}
