//! Remote source for card records: the public YGOPRODeck catalog API.

pub mod client;

pub use client::{CatalogClient, CatalogFetch};
