//! Core domain entities
//!
//! Pure data structures and the mapping rules between remote and local
//! shapes - no I/O here.

pub mod avatar;
mod preferences;
pub mod profile;
pub mod recovery;
pub mod result;
mod session;
mod state;
mod user;

pub use avatar::{AvatarUpload, AvatarUploaded};
pub use preferences::{push_recently_viewed, Preferences, RECENTLY_VIEWED_LIMIT};
pub use profile::{normalize_profile, NewProfileRow, Profile, ProfileChanges, ProfileSource};
pub use recovery::{RecoveryStage, RecoveryToken};
pub use session::{token_hint, AuthEvent, AuthEventKind, AuthResponse, OAuthRedirect, Session};
pub use state::{PersistedState, StoreState, PERSISTED_STATE_VERSION};
pub use user::{SignUpData, User};
