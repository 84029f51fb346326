//! Persisted state port

use crate::domain::result::Result;
use crate::domain::PersistedState;

/// Storage for the persisted subset of the store
pub trait StateStorage: Send + Sync {
    /// `Ok(None)` when nothing has been saved yet
    fn load(&self) -> Result<Option<PersistedState>>;

    fn save(&self, state: &PersistedState) -> Result<()>;
}
