pub mod merge;
pub mod plate;

pub use merge::{first_non_empty, non_empty, tagged_code};
pub use plate::normalize_plate;
