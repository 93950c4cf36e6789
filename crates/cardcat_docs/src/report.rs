//! Line-oriented text report: `Row N: key: value key: value`.

use std::io::Write;

use cardcat_core::{Card, CardcatError, IngestRow};

/// Something that can be written as one report line.
pub trait ReportEntry {
    /// Ordered `(label, value)` pairs for the line.
    fn report_fields(&self) -> Vec<(&'static str, String)>;

    /// Row number shown on the line; defaults to the 1-based position.
    fn row_index(&self, position: usize) -> usize {
        position + 1
    }
}

impl ReportEntry for IngestRow {
    fn report_fields(&self) -> Vec<(&'static str, String)> {
        vec![("name", self.name.clone()), ("address", self.address.clone())]
    }

    fn row_index(&self, _position: usize) -> usize {
        self.row
    }
}

impl ReportEntry for Card {
    fn report_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("id", self.id.to_string()),
            ("name", self.name.clone()),
            ("type", self.card_type.clone()),
            ("archetype", self.archetype.clone()),
        ]
    }
}

pub fn format_line<E: ReportEntry>(row: usize, entry: &E) -> String {
    let mut line = format!("Row {row}:");
    for (label, value) in entry.report_fields() {
        line.push_str(&format!(" {label}: {value}"));
    }
    line
}

/// Write one line per entry, flushing after each so a crash loses at most
/// the line in flight. Returns the number of lines written.
pub fn write_report<E: ReportEntry, W: Write>(
    entries: &[E],
    writer: &mut W,
) -> Result<usize, CardcatError> {
    for (position, entry) in entries.iter().enumerate() {
        writeln!(writer, "{}", format_line(entry.row_index(position), entry))?;
        writer.flush()?;
    }
    Ok(entries.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(n: usize) -> Vec<IngestRow> {
        (1..=n)
            .map(|i| IngestRow {
                row: i,
                name: format!("Person {i}"),
                address: format!("{i} Main St"),
            })
            .collect()
    }

    #[test]
    fn test_ingest_lines() {
        let mut out = Vec::new();
        let written = write_report(&rows(3), &mut out).unwrap();
        assert_eq!(written, 3);

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Row 1: name: Person 1 address: 1 Main St",
                "Row 2: name: Person 2 address: 2 Main St",
                "Row 3: name: Person 3 address: 3 Main St",
            ]
        );
    }

    #[test]
    fn test_ingest_row_keeps_source_index() {
        let row = IngestRow {
            row: 7,
            name: "Alice".into(),
            address: "1 Main St".into(),
        };
        assert_eq!(
            format_line(row.row_index(0), &row),
            "Row 7: name: Alice address: 1 Main St"
        );
    }

    #[test]
    fn test_card_lines() {
        let card = Card {
            id: 89631139,
            name: "Blue-Eyes White Dragon".into(),
            card_type: "Normal Monster".into(),
            archetype: "Blue-Eyes".into(),
            ..Default::default()
        };
        let mut out = Vec::new();
        write_report(&[card], &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Row 1: id: 89631139 name: Blue-Eyes White Dragon type: Normal Monster archetype: Blue-Eyes\n"
        );
    }

    #[test]
    fn test_empty_report() {
        let mut out = Vec::new();
        assert_eq!(write_report::<IngestRow, _>(&[], &mut out).unwrap(), 0);
        assert!(out.is_empty());
    }

    #[test]
    fn test_flushes_every_line() {
        struct CountingWriter {
            data: Vec<u8>,
            flushes: usize,
        }
        impl Write for CountingWriter {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.data.extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                self.flushes += 1;
                Ok(())
            }
        }

        let mut writer = CountingWriter {
            data: Vec::new(),
            flushes: 0,
        };
        write_report(&rows(4), &mut writer).unwrap();
        assert_eq!(writer.flushes, 4);
    }
}
