//! Local-file source: `name, address` rows from a CSV or XLSX upload.
//!
//! Reads are all-or-nothing. The first malformed row fails the whole read.

use cardcat_core::{CardcatError, IngestRow};
use tracing::{debug, info};

use crate::detect::{SourceFormat, detect_format, strip_bom};
use crate::workbook::read_first_sheet;

/// Columns every data row must provide: name, address.
const REQUIRED_COLUMNS: usize = 2;

/// Sniff `data` and read its data rows. The first row is always a header.
pub fn read_rows(data: &[u8], file_name: &str) -> Result<Vec<IngestRow>, CardcatError> {
    let format = detect_format(data, file_name)?;
    info!(file = file_name, format = %format, "detected input format");

    let rows = match format {
        SourceFormat::DelimitedText => read_csv_rows(data)?,
        SourceFormat::Spreadsheet => read_xlsx_rows(data)?,
    };
    debug!(rows = rows.len(), "read input rows");
    Ok(rows)
}

pub fn read_csv_rows(data: &[u8]) -> Result<Vec<IngestRow>, CardcatError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(strip_bom(data));

    let mut rows = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let row = idx + 1;
        let record = result.map_err(|e| CardcatError::Parse {
            row,
            message: e.to_string(),
        })?;
        let fields: Vec<&str> = record.iter().collect();
        rows.push(to_ingest_row(row, &fields)?);
    }
    Ok(rows)
}

/// Rows of the first worksheet. Sheet row 1 is the header whether or not it
/// has any cells; data row indices are the sheet row number minus one.
pub fn read_xlsx_rows(data: &[u8]) -> Result<Vec<IngestRow>, CardcatError> {
    let sheet = read_first_sheet(data)?;
    debug!(sheet = %sheet.name, "reading worksheet");

    sheet
        .rows
        .iter()
        .filter(|sheet_row| sheet_row.number > 1)
        .map(|sheet_row| {
            let row = (sheet_row.number - 1) as usize;
            let fields: Vec<&str> = sheet_row.cells.iter().map(String::as_str).collect();
            to_ingest_row(row, &fields)
        })
        .collect()
}

fn to_ingest_row(row: usize, fields: &[&str]) -> Result<IngestRow, CardcatError> {
    match fields {
        [name, address, ..] => Ok(IngestRow {
            row,
            name: name.to_string(),
            address: address.to_string(),
        }),
        _ => Err(CardcatError::Parse {
            row,
            message: format!(
                "expected at least {REQUIRED_COLUMNS} columns (name, address), found {}",
                fields.len()
            ),
        }),
    }
}
