pub mod client;
pub mod dto;

pub use client::{CatalogClient, CatalogPolicy, DEFAULT_CATALOG_PATH};
pub use dto::{CatalogEntry, CatalogEnvelope, decode_entries};
