//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces for external dependencies. The store and
//! recovery services depend only on these traits, not on concrete
//! implementations.

mod gateway;
mod location;
mod state_storage;

pub use gateway::{AuthGateway, DataGateway, Gateway, OtpType, StorageGateway};
pub use location::Location;
pub use state_storage::StateStorage;
