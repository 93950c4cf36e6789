//! Minimal XLSX reader: enough to pull cell text out of the first worksheet.

use std::collections::HashMap;
use std::io::{Cursor, Read};

use cardcat_core::CardcatError;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

const WORKBOOK_PATH: &str = "xl/workbook.xml";
const WORKBOOK_RELS_PATH: &str = "xl/_rels/workbook.xml.rels";
const SHARED_STRINGS_PATH: &str = "xl/sharedStrings.xml";
const FALLBACK_SHEET_PATH: &str = "xl/worksheets/sheet1.xml";

/// One worksheet row. `cells` is indexed by zero-based column; gaps are empty strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetRow {
    /// 1-based row number from the sheet.
    pub number: u32,
    pub cells: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<SheetRow>,
}

/// Read every non-empty row of the first sheet listed in the workbook.
pub fn read_first_sheet(data: &[u8]) -> Result<Sheet, CardcatError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data))
        .map_err(|e| CardcatError::Malformed(format!("not a ZIP container: {e}")))?;

    let workbook = read_entry(&mut archive, WORKBOOK_PATH)?
        .ok_or_else(|| CardcatError::Malformed(format!("missing {WORKBOOK_PATH}")))?;
    let (name, rel_id) = first_sheet(&workbook)?
        .ok_or_else(|| CardcatError::Malformed("workbook has no sheets".into()))?;

    let rels = match read_entry(&mut archive, WORKBOOK_RELS_PATH)? {
        Some(xml) => parse_relationships(&xml)?,
        None => HashMap::new(),
    };
    let sheet_path = rels
        .get(&rel_id)
        .map(|target| match target.strip_prefix('/') {
            Some(absolute) => absolute.to_string(),
            None => format!("xl/{target}"),
        })
        .unwrap_or_else(|| FALLBACK_SHEET_PATH.to_string());

    let shared = match read_entry(&mut archive, SHARED_STRINGS_PATH)? {
        Some(xml) => parse_shared_strings(&xml)?,
        None => Vec::new(),
    };

    let sheet_xml = read_entry(&mut archive, &sheet_path)?
        .ok_or_else(|| CardcatError::Malformed(format!("missing worksheet {sheet_path}")))?;
    let rows = parse_rows(&sheet_xml, &shared)?;

    Ok(Sheet { name, rows })
}

fn read_entry(
    archive: &mut zip::ZipArchive<Cursor<&[u8]>>,
    name: &str,
) -> Result<Option<String>, CardcatError> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(CardcatError::Malformed(format!("{name}: {e}"))),
    };
    let mut content = String::new();
    file.read_to_string(&mut content)
        .map_err(|e| CardcatError::Malformed(format!("{name}: {e}")))?;
    Ok(Some(content))
}

fn xml_error(part: &str, e: impl std::fmt::Display) -> CardcatError {
    CardcatError::Malformed(format!("{part}: {e}"))
}

fn attr(e: &BytesStart, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .map(|a| String::from_utf8_lossy(&a.value).to_string())
}

/// Name and relationship id of the first `<sheet>` in workbook.xml.
fn first_sheet(xml: &str) -> Result<Option<(String, String)>, CardcatError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(e)) | Ok(Event::Start(e)) if e.name().as_ref() == b"sheet" => {
                let name = attr(&e, b"name").unwrap_or_default();
                let rel_id = attr(&e, b"r:id").unwrap_or_default();
                return Ok(Some((name, rel_id)));
            }
            Ok(Event::Eof) => return Ok(None),
            Err(e) => return Err(xml_error(WORKBOOK_PATH, e)),
            _ => {}
        }
        buf.clear();
    }
}

fn parse_relationships(xml: &str) -> Result<HashMap<String, String>, CardcatError> {
    let mut rels = HashMap::new();
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(e)) | Ok(Event::Start(e)) if e.name().as_ref() == b"Relationship" => {
                if let (Some(id), Some(target)) = (attr(&e, b"Id"), attr(&e, b"Target")) {
                    rels.insert(id, target);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(WORKBOOK_RELS_PATH, e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(rels)
}

/// Shared string table; rich-text runs inside one `<si>` are concatenated.
fn parse_shared_strings(xml: &str) -> Result<Vec<String>, CardcatError> {
    let mut strings = Vec::new();
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut in_t = false;
    let mut current = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"si" => current.clear(),
                b"t" => in_t = true,
                _ => {}
            },
            Ok(Event::Empty(e)) if e.name().as_ref() == b"si" => strings.push(String::new()),
            Ok(Event::Text(e)) if in_t => {
                let text = e.unescape().map_err(|e| xml_error(SHARED_STRINGS_PATH, e))?;
                current.push_str(&text);
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"si" => strings.push(std::mem::take(&mut current)),
                b"t" => in_t = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(SHARED_STRINGS_PATH, e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(strings)
}

/// Column index from a cell reference such as `B12`.
fn column_index(reference: &str) -> Option<usize> {
    let letters: String = reference
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    if letters.is_empty() {
        return None;
    }
    letters.chars().try_fold(0usize, |acc, c| {
        let digit = (c.to_ascii_uppercase() as u8 - b'A') as usize + 1;
        acc.checked_mul(26)?.checked_add(digit)
    })
    .map(|n| n - 1)
}

struct PendingCell {
    col: usize,
    kind: Option<String>,
    value: String,
}

/// Shared strings and booleans are resolved. Every other type, including
/// errors (`t="e"`) and formula strings (`t="str"`), keeps its cached `<v>` text.
fn resolve_cell(cell: PendingCell, shared: &[String]) -> String {
    match cell.kind.as_deref() {
        Some("s") => cell
            .value
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|idx| shared.get(idx).cloned())
            .unwrap_or_default(),
        Some("b") if cell.value.trim() == "1" => "TRUE".to_string(),
        Some("b") => "FALSE".to_string(),
        _ => cell.value,
    }
}

fn parse_rows(xml: &str, shared: &[String]) -> Result<Vec<SheetRow>, CardcatError> {
    let mut rows = Vec::new();
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();

    let mut current: Option<SheetRow> = None;
    let mut cell: Option<PendingCell> = None;
    let mut in_value = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"row" => {
                    let number = attr(&e, b"r")
                        .and_then(|r| r.parse().ok())
                        .unwrap_or_else(|| rows.last().map_or(1, |r: &SheetRow| r.number + 1));
                    current = Some(SheetRow {
                        number,
                        cells: Vec::new(),
                    });
                }
                b"c" => {
                    let fallback = current.as_ref().map_or(0, |r| r.cells.len());
                    cell = Some(PendingCell {
                        col: attr(&e, b"r")
                            .and_then(|r| column_index(&r))
                            .unwrap_or(fallback),
                        kind: attr(&e, b"t"),
                        value: String::new(),
                    });
                }
                b"v" | b"t" if cell.is_some() => in_value = true,
                _ => {}
            },
            Ok(Event::Text(e)) if in_value => {
                let text = e.unescape().map_err(|e| xml_error("worksheet", e))?;
                if let Some(cell) = cell.as_mut() {
                    cell.value.push_str(&text);
                }
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => {
                    if let (Some(done), Some(row)) = (cell.take(), current.as_mut()) {
                        let col = done.col;
                        let value = resolve_cell(done, shared);
                        if !value.is_empty() {
                            if row.cells.len() <= col {
                                row.cells.resize(col + 1, String::new());
                            }
                            row.cells[col] = value;
                        }
                    }
                }
                b"row" => {
                    if let Some(row) = current.take().filter(|r| !r.cells.is_empty()) {
                        rows.push(row);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error("worksheet", e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(rows)
}
