//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - Supabase HTTP client for the gateway ports
//! - In-memory backend for tests, seeded with a demo shopper for offline runs
//! - JSON file (or memory) for StateStorage
//! - Parsed URL for Location

pub mod demo;
pub mod location;
pub mod memory;
pub mod state_file;
pub mod supabase;

pub use demo::demo_gateway;
pub use location::UrlLocation;
pub use memory::{GatewayOp, InMemoryGateway};
pub use state_file::{FileStateStorage, MemoryStateStorage};
pub use supabase::SupabaseClient;
