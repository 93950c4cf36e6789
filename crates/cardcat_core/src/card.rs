//! Card records as served by the catalog API, plus the rows read from
//! local input files.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error_handler::CardcatError;

/// Response envelope of `cardinfo.php`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogResponse {
    pub data: Vec<Card>,
}

/// One catalog entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub card_type: String,
    #[serde(rename = "frameType", default)]
    pub frame_type: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub atk: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub def: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<i64>,
    #[serde(default)]
    pub race: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    #[serde(default)]
    pub archetype: String,
    #[serde(default)]
    pub ygoprodeck_url: String,
    #[serde(default)]
    pub card_sets: Vec<CardSet>,
    #[serde(default)]
    pub card_images: Vec<CardImage>,
    #[serde(default)]
    pub card_prices: Vec<CardPrice>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CardSet {
    pub set_name: String,
    pub set_code: String,
    #[serde(default)]
    pub set_rarity: String,
    #[serde(default)]
    pub set_rarity_code: String,
    #[serde(default)]
    pub set_price: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CardImage {
    pub id: i64,
    pub image_url: String,
    #[serde(default)]
    pub image_url_small: String,
    #[serde(default)]
    pub image_url_cropped: String,
}

/// Marketplace prices. The API sends them as decimal strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CardPrice {
    pub cardmarket_price: String,
    pub tcgplayer_price: String,
    pub ebay_price: String,
    pub amazon_price: String,
    pub coolstuffinc_price: String,
}

impl CardPrice {
    /// Lowest positive price across marketplaces, with the marketplace name.
    pub fn lowest(&self) -> Option<(&'static str, f64)> {
        [
            ("cardmarket", &self.cardmarket_price),
            ("tcgplayer", &self.tcgplayer_price),
            ("ebay", &self.ebay_price),
            ("amazon", &self.amazon_price),
            ("coolstuffinc", &self.coolstuffinc_price),
        ]
        .into_iter()
        .filter_map(|(market, raw)| {
            raw.trim()
                .parse::<f64>()
                .ok()
                .filter(|p| *p > 0.0)
                .map(|p| (market, p))
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
    }
}

impl Card {
    /// Primary image reference (the first listed image).
    pub fn image_url(&self) -> Option<&str> {
        self.card_images
            .first()
            .map(|img| img.image_url.as_str())
            .filter(|url| !url.is_empty())
    }

    pub fn lowest_price(&self) -> Option<(&'static str, f64)> {
        self.card_prices
            .iter()
            .filter_map(CardPrice::lowest)
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }
}

/// Fail on the first card whose id was already seen in this fetch.
pub fn validate_unique_ids(cards: &[Card]) -> Result<(), CardcatError> {
    let mut seen = HashSet::with_capacity(cards.len());
    for (idx, card) in cards.iter().enumerate() {
        if !seen.insert(card.id) {
            return Err(CardcatError::Parse {
                row: idx + 1,
                message: format!("duplicate card id {}", card.id),
            });
        }
    }
    Ok(())
}

/// A `name, address` row read from a local CSV or XLSX file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestRow {
    /// 1-based data row index; the header row is not counted.
    pub row: usize,
    pub name: String,
    pub address: String,
}
