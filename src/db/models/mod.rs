pub mod event_models;
pub mod plate_models;
pub mod vehicle_models;

pub use event_models::{AnprEvent, EnrichedEvent, EventFilter, EventPhoto, ReportFilter, ReportSummary};
pub use plate_models::{Plate, PlateInfo};
pub use vehicle_models::VehicleRecord;
