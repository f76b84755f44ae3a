pub mod events;
pub mod plates;
pub mod sites;
pub mod vehicles;

pub use events::EventsRepository;
pub use plates::PlatesRepository;
pub use sites::SitesRepository;
pub use vehicles::VehiclesRepository;
