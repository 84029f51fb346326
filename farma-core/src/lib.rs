//! Farma Core - account session and profile sync for the Farma storefront
//!
//! This crate implements the core domain logic following hexagonal architecture:
//!
//! - **domain**: Core entities (User, Session, Profile, store state) and the
//!   profile/recovery-token mapping rules
//! - **ports**: Trait definitions for external dependencies (Gateway,
//!   StateStorage, Location)
//! - **services**: Session store, password recovery, auth event listener
//! - **adapters**: Concrete implementations (Supabase HTTP, in-memory, files)

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
pub mod services;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use adapters::{demo_gateway, FileStateStorage, SupabaseClient, UrlLocation};
use config::Config;
use ports::{Gateway, Location};
use services::{AuthListener, RecoveryService, SessionStore};

// Re-export commonly used types at crate root
pub use domain::result::{Error, OperationResult, Result};
pub use domain::{AuthEvent, AuthEventKind, Preferences, Profile, Session, StoreState, User};

const SESSION_FILE: &str = "session.json";
const OFFLINE_DIR: &str = "offline";

/// Main context for Farma operations
///
/// Holds the backend gateway, the session store and the recovery service
/// for one data directory. Cloning the `Arc`s out of it is cheap.
pub struct FarmaContext {
    pub redirect_base: String,
    pub gateway: Arc<dyn Gateway>,
    pub store: Arc<SessionStore<dyn Gateway>>,
    pub recovery: RecoveryService<dyn Gateway>,
}

impl FarmaContext {
    /// Context backed by the configured Supabase project
    ///
    /// The session and the persisted store state live in `farma_dir`.
    pub fn new(farma_dir: &Path, location: Arc<dyn Location>) -> Result<Self> {
        let config = Config::load(farma_dir)?;
        std::fs::create_dir_all(farma_dir)?;
        let client = SupabaseClient::from_config(&config)?
            .with_session_file(&farma_dir.join(SESSION_FILE));
        Ok(Self::with_gateway(
            Arc::new(client),
            &config.redirect_base,
            farma_dir,
            location,
        ))
    }

    /// Context backed by the in-process demo backend, no network access
    ///
    /// Store state goes to `farma_dir/offline` so the real account's cached
    /// state is never touched.
    pub fn offline(farma_dir: &Path, location: Arc<dyn Location>) -> Self {
        Self::with_gateway(
            Arc::new(demo_gateway()),
            config::DEFAULT_REDIRECT_BASE,
            &Self::offline_dir(farma_dir),
            location,
        )
    }

    pub fn offline_dir(farma_dir: &Path) -> PathBuf {
        farma_dir.join(OFFLINE_DIR)
    }

    pub fn with_gateway(
        gateway: Arc<dyn Gateway>,
        redirect_base: &str,
        farma_dir: &Path,
        location: Arc<dyn Location>,
    ) -> Self {
        let storage = Arc::new(FileStateStorage::new(farma_dir));
        let store = Arc::new(
            SessionStore::new(Arc::clone(&gateway), redirect_base).with_storage(storage),
        );
        let recovery = RecoveryService::new(Arc::clone(&store), location);

        Self {
            redirect_base: store.redirect_base().to_string(),
            gateway,
            store,
            recovery,
        }
    }

    /// Start applying backend auth events to the store
    pub fn listen(&self, location: Arc<dyn Location>) -> AuthListener<dyn Gateway> {
        AuthListener::spawn(Arc::clone(&self.store), location)
    }

    /// Location at the storefront root, for flows without a pasted link
    pub fn root_location(redirect_base: &str) -> Result<Arc<UrlLocation>> {
        Ok(Arc::new(UrlLocation::parse(&format!(
            "{}/",
            redirect_base.trim_end_matches('/')
        ))?))
    }
}
