use std::path::Path;

use anyhow::{Context, Result};
use cardcat_core::config::validate_sheet_name;
use cardcat_core::{Card, CardcatError};
use rust_xlsxwriter::{Format, Workbook};
use tracing::debug;

use crate::csv::{CARD_HEADERS, card_row};

/// Columns holding integers; written as numbers rather than text.
const NUMERIC_COLUMNS: [usize; 3] = [0, 4, 5];

/// Zero-based column index to spreadsheet letters: 0 → `A`, 25 → `Z`, 26 → `AA`.
pub fn column_name(col: u16) -> String {
    let mut n = u32::from(col) + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Zero-based row/column to an A1-style reference.
pub fn cell_ref(row: u32, col: u16) -> String {
    format!("{}{}", column_name(col), row + 1)
}

/// Build a workbook with one sheet: header in row 1, one card per row after it.
pub fn build_cards_workbook(cards: &[Card], sheet_name: &str) -> Result<Workbook> {
    validate_sheet_name(sheet_name)?;

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet
        .set_name(sheet_name)
        .with_context(|| format!("Failed to set sheet name: {sheet_name}"))?;

    let header_format = Format::new().set_bold();

    for (col, header) in CARD_HEADERS.iter().enumerate() {
        let col = col as u16;
        worksheet
            .write_string_with_format(0, col, *header, &header_format)
            .with_context(|| format!("Failed to write header at {}", cell_ref(0, col)))?;
    }

    for (idx, card) in cards.iter().enumerate() {
        let row = (idx + 1) as u32;
        for (col_idx, value) in card_row(card).iter().enumerate() {
            let col = col_idx as u16;
            if value.is_empty() {
                continue;
            }
            let written = match value.parse::<i64>() {
                Ok(num) if NUMERIC_COLUMNS.contains(&col_idx) => {
                    worksheet.write_number(row, col, num as f64).map(|_| ())
                }
                _ => worksheet.write_string(row, col, value).map(|_| ()),
            };
            written.with_context(|| {
                format!("Failed to write card {} at {}", card.id, cell_ref(row, col))
            })?;
        }
    }

    worksheet.autofit();
    debug!(sheet = sheet_name, rows = cards.len(), "built card worksheet");

    Ok(workbook)
}

/// Generate the card workbook as raw XLSX bytes.
pub fn generate_cards_xlsx(cards: &[Card], sheet_name: &str) -> Result<Vec<u8>> {
    let mut workbook = build_cards_workbook(cards, sheet_name)?;
    workbook
        .save_to_buffer()
        .context("Failed to save workbook to buffer")
}

/// Build the workbook and persist it to `path`. Any failure fails the whole export.
pub fn save_cards_xlsx(cards: &[Card], sheet_name: &str, path: &Path) -> Result<()> {
    let bytes = generate_cards_xlsx(cards, sheet_name)?;
    std::fs::write(path, bytes).map_err(|e| CardcatError::persist(path, e))?;
    Ok(())
}
