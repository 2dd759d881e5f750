//! Listing ingestion: discovers adverts on classified sites, extracts and
//! normalizes them, and upserts them into a local SQLite catalogue.

pub mod config;
pub mod error;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod registry;
pub mod scrapers;
pub mod store;
pub mod upsert;

#[cfg(test)]
mod testing;
