pub mod dedup;
pub mod enrichment;
pub mod events;
#[cfg(test)]
pub mod memory;
pub mod store;

pub use dedup::DedupGuard;
pub use enrichment::EnrichmentEngine;
pub use events::{EventQuery, EventQueryService};
pub use store::{EventStore, PgEventStore, SiteResolver, VehicleRegistry};
