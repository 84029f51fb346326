//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions. The session
//! store owns the cached state; recovery and the auth listener work on top
//! of it.

mod listener;
pub mod recovery;
mod store;

pub use listener::AuthListener;
pub use recovery::RecoveryService;
pub use store::SessionStore;
