pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod retention;
pub mod security;
pub mod services;
pub mod storage;
pub mod utils;

// Re-export main components for easier use
pub use error::Error;
pub use ingest::CanonicalEvent;
pub use services::{EnrichmentEngine, EventQueryService};
