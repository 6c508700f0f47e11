//! # Enrichment
//!
//! Counterparty labels and USD valuations for decoded transfers. Both resolvers
//! are best effort: a missing label or price never blocks ingestion.

pub mod labels;
pub mod prices;

pub use labels::{AddressLabeler, ExplorerEndpoint, ExplorerLabelSource, LabelSeed, LabelSource};
pub use prices::{CoinGeckoPriceSource, PriceResolver, PriceSource};
