use std::io::Write;

use anyhow::{Context, Result};
use cardcat_core::Card;

/// Column order shared by the CSV and XLSX outputs.
pub const CARD_HEADERS: [&str; 9] = [
    "id",
    "name",
    "type",
    "desc",
    "atk",
    "def",
    "race",
    "attribute",
    "archetype",
];

/// Project a card onto the nine output columns. Absent values become empty fields.
pub fn card_row(card: &Card) -> [String; 9] {
    [
        card.id.to_string(),
        card.name.clone(),
        card.card_type.clone(),
        card.desc.clone(),
        card.atk.map(|v| v.to_string()).unwrap_or_default(),
        card.def.map(|v| v.to_string()).unwrap_or_default(),
        card.race.clone(),
        card.attribute.clone().unwrap_or_default(),
        card.archetype.clone(),
    ]
}

/// Write the header and one line per card to `writer`.
///
/// The first failed write aborts; the remaining cards are not attempted.
pub fn write_cards_csv<W: Write>(cards: &[Card], writer: W) -> Result<W> {
    let mut writer = csv::Writer::from_writer(writer);

    writer
        .write_record(CARD_HEADERS)
        .context("Failed to write header record")?;

    for card in cards {
        writer
            .write_record(card_row(card))
            .with_context(|| format!("Failed to write card {}", card.id))?;
    }

    writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush CSV writer: {}", e.error()))
}

/// Generate the card CSV as a string.
pub fn generate_cards_csv(cards: &[Card]) -> Result<String> {
    let bytes = write_cards_csv(cards, Vec::new())?;
    String::from_utf8(bytes).context("CSV output contained invalid UTF-8")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monster() -> Card {
        Card {
            id: 89631139,
            name: "Blue-Eyes White Dragon".into(),
            card_type: "Normal Monster".into(),
            desc: "This legendary dragon is a powerful engine of destruction.".into(),
            atk: Some(3000),
            def: Some(2500),
            race: "Dragon".into(),
            attribute: Some("LIGHT".into()),
            archetype: "Blue-Eyes".into(),
            ..Default::default()
        }
    }

    fn spell() -> Card {
        Card {
            id: 38120068,
            name: "Trade-In".into(),
            card_type: "Spell Card".into(),
            desc: "Discard 1 Level 8 monster; draw 2 cards.".into(),
            race: "Normal".into(),
            archetype: "Blue-Eyes".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_generate_cards_csv_basic() {
        let result = generate_cards_csv(&[monster()]).unwrap();
        let mut lines = result.lines();
        assert_eq!(
            lines.next(),
            Some("id,name,type,desc,atk,def,race,attribute,archetype")
        );
        assert_eq!(
            lines.next(),
            Some(
                "89631139,Blue-Eyes White Dragon,Normal Monster,This legendary dragon is a powerful engine of destruction.,3000,2500,Dragon,LIGHT,Blue-Eyes"
            )
        );
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn test_absent_stats_are_empty_fields() {
        let result = generate_cards_csv(&[spell()]).unwrap();
        assert!(result.contains(
            "38120068,Trade-In,Spell Card,Discard 1 Level 8 monster; draw 2 cards.,,,Normal,,Blue-Eyes"
        ));
    }

    #[test]
    fn test_fields_with_commas_are_quoted() {
        let mut card = spell();
        card.desc = "Discard 1 card, then draw 2.".into();
        let result = generate_cards_csv(&[card]).unwrap();
        assert!(result.contains("\"Discard 1 card, then draw 2.\""));
    }

    #[test]
    fn test_generate_cards_csv_empty() {
        let result = generate_cards_csv(&[]).unwrap();
        assert_eq!(result.lines().count(), 1);
        assert!(result.starts_with("id,name,type"));
    }

    #[test]
    fn test_preserves_card_order() {
        let result = generate_cards_csv(&[spell(), monster()]).unwrap();
        let ids: Vec<&str> = result
            .lines()
            .skip(1)
            .map(|l| l.split(',').next().unwrap())
            .collect();
        assert_eq!(ids, vec!["38120068", "89631139"]);
    }

    #[test]
    fn test_write_failure_aborts() {
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::other("disk full"))
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Err(std::io::Error::other("disk full"))
            }
        }
        assert!(write_cards_csv(&[monster()], Broken).is_err());
    }
}
