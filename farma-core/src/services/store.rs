//! Session store - cached user/profile state kept in step with the backend
//!
//! The store is an explicit context object: create one per application and
//! share it as `Arc<SessionStore<_>>`. State sits behind a lock that is
//! never held across an `.await`; each mutation happens in one critical
//! section, so a snapshot never shows a profile without its user.
//!
//! Operations do not queue or cancel each other. When two overlap, the one
//! that resolves last decides the cached state.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, error, info, warn};

use crate::domain::avatar::{cache_busted_url, AVATAR_BUCKET};
use crate::domain::result::{Error, OperationResult, Result};
use crate::domain::{
    normalize_profile, push_recently_viewed, AuthResponse, AvatarUpload, AvatarUploaded,
    NewProfileRow, OAuthRedirect, Preferences, Profile, ProfileChanges, ProfileSource,
    SignUpData, StoreState, User,
};
use crate::ports::{Gateway, StateStorage};

#[derive(Default)]
struct Shared {
    state: StoreState,
    /// Number of operations currently holding a [`LoadingGuard`]
    loading: usize,
}

/// Cached session and profile state for the signed-in user
pub struct SessionStore<G: Gateway + ?Sized> {
    gateway: Arc<G>,
    shared: RwLock<Shared>,
    storage: Option<Arc<dyn StateStorage>>,
    redirect_base: String,
    /// Serializes `initialize` so concurrent callers fetch the session once
    init_lock: tokio::sync::Mutex<()>,
}

/// Keeps `is_loading` set while alive; nested guards are counted
pub(crate) struct LoadingGuard<'a, G: Gateway + ?Sized> {
    store: &'a SessionStore<G>,
}

impl<G: Gateway + ?Sized> Drop for LoadingGuard<'_, G> {
    fn drop(&mut self) {
        let mut shared = self.store.write();
        shared.loading = shared.loading.saturating_sub(1);
        shared.state.is_loading = shared.loading > 0;
    }
}

impl<G: Gateway + ?Sized> SessionStore<G> {
    pub fn new(gateway: Arc<G>, redirect_base: impl Into<String>) -> Self {
        Self {
            gateway,
            shared: RwLock::new(Shared::default()),
            storage: None,
            redirect_base: redirect_base.into().trim_end_matches('/').to_string(),
            init_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Attach persisted-state storage and rehydrate from it
    ///
    /// Rehydrated user and profile are provisional until `initialize`
    /// confirms them against the backend.
    pub fn with_storage(mut self, storage: Arc<dyn StateStorage>) -> Self {
        match storage.load() {
            Ok(Some(persisted)) => {
                let version = persisted.version;
                match persisted.upgrade() {
                    Some(persisted) => {
                        self.write().state.apply_persisted(persisted);
                        debug!(version, "rehydrated persisted state");
                    }
                    None => warn!(version, "discarding persisted state from a newer version"),
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "could not load persisted state"),
        }
        self.storage = Some(storage);
        self
    }

    pub fn gateway(&self) -> &Arc<G> {
        &self.gateway
    }

    pub fn redirect_base(&self) -> &str {
        &self.redirect_base
    }

    // =========================================================================
    // State access
    // =========================================================================

    fn read(&self) -> RwLockReadGuard<'_, Shared> {
        self.shared.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Shared> {
        self.shared.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Copy of the whole state
    pub fn snapshot(&self) -> StoreState {
        self.read().state.clone()
    }

    pub fn current_user(&self) -> Option<User> {
        self.read().state.user.clone()
    }

    pub fn profile(&self) -> Option<Profile> {
        self.read().state.profile.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().state.is_authenticated()
    }

    pub fn is_admin(&self) -> bool {
        self.read()
            .state
            .profile
            .as_ref()
            .is_some_and(|p| p.is_admin)
    }

    pub fn clear_error(&self) {
        self.write().state.error = None;
    }

    /// Apply a change to persisted fields, then save them
    fn update_persisted<R>(&self, f: impl FnOnce(&mut StoreState) -> R) -> R {
        let (result, persisted) = {
            let mut shared = self.write();
            let result = f(&mut shared.state);
            (result, shared.state.to_persisted())
        };
        if let Some(storage) = &self.storage {
            if let Err(e) = storage.save(&persisted) {
                warn!(error = %e, "could not save persisted state");
            }
        }
        result
    }

    /// Replace the cached user; a different user drops the cached profile
    pub fn set_user(&self, user: Option<User>) {
        self.update_persisted(|state| {
            let same_user = match (&state.user, &user) {
                (Some(current), Some(next)) => current.id == next.id,
                _ => false,
            };
            if !same_user {
                state.profile = None;
                state.addresses.clear();
            }
            state.user = user;
        });
    }

    /// Forget the signed-in user and everything cached for them
    pub fn clear_session_state(&self) {
        self.update_persisted(StoreState::clear_user_data);
    }

    /// Cache `profile` if it belongs to the current user
    fn cache_profile(&self, profile: &Profile) {
        let cached = self.update_persisted(|state| match &state.user {
            Some(user) if user.id == profile.id => {
                state.profile = Some(profile.clone());
                true
            }
            _ => false,
        });
        if !cached {
            debug!(profile_id = %profile.id, "profile is not the current user's, not caching");
        }
    }

    // =========================================================================
    // Operation plumbing
    // =========================================================================

    /// Mark an operation as started: clear the error and raise `is_loading`
    pub(crate) fn begin(&self) -> LoadingGuard<'_, G> {
        let mut shared = self.write();
        shared.state.error = None;
        shared.loading += 1;
        shared.state.is_loading = true;
        LoadingGuard { store: self }
    }

    pub(crate) fn set_error(&self, message: impl Into<String>) {
        self.write().state.error = Some(message.into());
    }

    /// Turn an operation outcome into an [`OperationResult`], recording failures
    pub(crate) fn conclude<T>(&self, operation: &str, result: Result<T>) -> OperationResult<T> {
        match result {
            Ok(data) => OperationResult::ok(data),
            Err(e) => {
                let message = e.to_string();
                error!(operation, error = %message, "operation failed");
                self.set_error(message.clone());
                OperationResult::fail(message)
            }
        }
    }

    fn require_user(&self) -> Result<User> {
        self.current_user().ok_or(Error::Unauthenticated)
    }

    /// Read the composite view, expecting a row
    async fn read_view(&self, user_id: &str) -> Result<JsonValue> {
        self.gateway
            .read_profile(ProfileSource::View, user_id)
            .await?
            .ok_or_else(|| Error::not_found("Profile not found"))
    }

    /// Read the base table, expecting a row
    async fn read_table(&self, user_id: &str) -> Result<JsonValue> {
        self.gateway
            .read_profile(ProfileSource::Table, user_id)
            .await?
            .ok_or_else(|| Error::not_found("Profile not found"))
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Establish the cached state from the backend session
    ///
    /// Runs once; later calls return immediately without contacting the
    /// backend. Always leaves the store initialized, even on failure.
    pub async fn initialize(&self) -> OperationResult<()> {
        let _init = self.init_lock.lock().await;
        if self.read().state.is_initialized {
            return OperationResult::ok(());
        }

        let result = {
            let _loading = self.begin();
            self.initialize_inner().await
        };
        self.write().state.is_initialized = true;
        self.conclude("initialize", result)
    }

    async fn initialize_inner(&self) -> Result<()> {
        match self.gateway.get_session().await? {
            Some(session) => {
                let user = session.user;
                info!(user_id = %user.id, "session restored");
                let user_id = user.id.clone();
                self.set_user(Some(user));
                // Failure is recorded in `error`; the session itself is fine
                let _ = self.load_profile(Some(&user_id)).await;
            }
            None => {
                debug!("no session");
                self.update_persisted(|state| {
                    state.user = None;
                    state.profile = None;
                });
            }
        }
        Ok(())
    }

    // =========================================================================
    // Profiles
    // =========================================================================

    /// Fetch the profile, creating the base row when it does not exist yet
    ///
    /// Uses the cached user when `user_id` is `None`. A profile for another
    /// user is returned but not cached.
    pub async fn load_profile(&self, user_id: Option<&str>) -> OperationResult<Profile> {
        let result = self.load_profile_inner(user_id).await;
        if let Err(e) = &result {
            self.set_error(e.to_string());
            error!(error = %e, "loading profile failed");
        }
        result.into()
    }

    async fn load_profile_inner(&self, user_id: Option<&str>) -> Result<Profile> {
        let user_id = match user_id {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => self
                .current_user()
                .map(|u| u.id)
                .ok_or_else(|| Error::validation("No user id"))?,
        };

        let raw = match self.gateway.read_profile(ProfileSource::View, &user_id).await {
            Ok(Some(row)) => row,
            Ok(None) => {
                debug!(%user_id, "no profile row yet");
                self.create_missing_profile(&user_id).await?
            }
            Err(e) => {
                warn!(%user_id, error = %e, "profile view unavailable");
                self.create_missing_profile(&user_id).await?
            }
        };

        let profile = normalize_profile(&raw)?;
        self.cache_profile(&profile);
        Ok(profile)
    }

    /// Upsert a minimal base row from the auth user, then read it back
    async fn create_missing_profile(&self, user_id: &str) -> Result<JsonValue> {
        let auth_user = match self.gateway.get_user().await {
            Ok(user) => user,
            Err(e) => {
                warn!(error = %e, "could not fetch auth user for profile defaults");
                None
            }
        };
        let owner = auth_user
            .filter(|u| u.id == user_id)
            .or_else(|| self.current_user().filter(|u| u.id == user_id))
            .unwrap_or_else(|| User {
                id: user_id.to_string(),
                email: None,
                user_metadata: Map::new(),
                email_confirmed_at: None,
                created_at: None,
            });

        let row = NewProfileRow::for_user(&owner, None);
        self.gateway.upsert_profile_row(&row).await?;
        info!(%user_id, "created base profile row");

        match self.gateway.read_profile(ProfileSource::View, user_id).await {
            Ok(Some(row)) => Ok(row),
            Ok(None) => self.read_table(user_id).await,
            Err(e) => {
                warn!(%user_id, error = %e, "profile view still unavailable, reading base row");
                self.read_table(user_id).await
            }
        }
    }

    /// Upsert the base row for `user` and return the resulting profile
    pub async fn create_user_profile(
        &self,
        user: &User,
        full_name: Option<&str>,
        interests: Option<&str>,
    ) -> OperationResult<Profile> {
        let result = async {
            let row = NewProfileRow::for_user(user, full_name)
                .with_interests(interests.map(str::to_string));
            self.gateway.upsert_profile_row(&row).await?;
            let raw = self.read_view(&user.id).await?;
            let profile = normalize_profile(&raw)?;
            self.cache_profile(&profile);
            Ok::<_, Error>(profile)
        }
        .await;
        self.conclude("create profile", result)
    }

    /// Apply profile edits; only name, interests, avatar and user_id are written
    pub async fn update_profile(&self, updates: &Map<String, JsonValue>) -> OperationResult<Profile> {
        let _loading = self.begin();
        let result = async {
            let user = self.require_user()?;
            let changes = ProfileChanges::from_updates(updates, Utc::now());
            debug!(fields = ?changes.fields().keys().collect::<Vec<_>>(), "updating profile");

            self.gateway
                .update_profile(ProfileSource::Table, &user.id, &changes.to_json())
                .await?;
            let raw = self.read_view(&user.id).await?;
            let profile = normalize_profile(&raw)?;
            self.cache_profile(&profile);
            Ok::<_, Error>(profile)
        }
        .await;
        self.conclude("update profile", result)
    }

    /// Re-read the profile in the background
    ///
    /// Leaves `is_loading` and `error` alone.
    pub async fn refresh_profile(&self) -> OperationResult<Profile> {
        let result = async {
            let user = self
                .current_user()
                .ok_or_else(|| Error::Other("No user logged in".into()))?;

            let raw = match self.gateway.read_profile(ProfileSource::View, &user.id).await {
                Ok(Some(row)) => row,
                Ok(None) => return Err(Error::not_found("Profile not found")),
                Err(e) => {
                    warn!(error = %e, "profile view unavailable, reading base row");
                    self.read_table(&user.id).await?
                }
            };
            let profile = normalize_profile(&raw)?;
            self.cache_profile(&profile);
            Ok::<_, Error>(profile)
        }
        .await;
        if let Err(e) = &result {
            warn!(error = %e, "profile refresh failed");
        }
        result.into()
    }

    /// Upload a new avatar image and point the profile at it
    pub async fn upload_avatar(&self, upload: AvatarUpload) -> OperationResult<AvatarUploaded> {
        let _loading = self.begin();
        let result = async {
            let user = self.require_user()?;
            upload.validate()?;

            let key = upload.storage_key(&user.id);
            debug!(%key, size = upload.size(), "uploading avatar");
            let content_type = upload.content_type.clone();
            self.gateway
                .upload(AVATAR_BUCKET, &key, upload.bytes, &content_type)
                .await?;

            let url = cache_busted_url(&self.gateway.public_url(AVATAR_BUCKET, &key));
            let changes = ProfileChanges::avatar(&url, Utc::now());
            self.gateway
                .update_profile(ProfileSource::Table, &user.id, &changes.to_json())
                .await?;

            let raw = self.read_view(&user.id).await?;
            let profile = normalize_profile(&raw)?;
            self.cache_profile(&profile);
            info!(user_id = %user.id, "avatar updated");
            Ok::<_, Error>(AvatarUploaded { url })
        }
        .await;
        self.conclude("upload avatar", result)
    }

    /// Cache the signed-in user's addresses
    pub async fn fetch_addresses(&self) -> OperationResult<Vec<JsonValue>> {
        let result = async {
            let user = self.require_user()?;
            let addresses = self.gateway.list_addresses(&user.id).await?;
            {
                let mut shared = self.write();
                if shared.state.user.as_ref().is_some_and(|u| u.id == user.id) {
                    shared.state.addresses = addresses.clone();
                }
            }
            Ok::<_, Error>(addresses)
        }
        .await;
        if let Err(e) = &result {
            warn!(error = %e, "fetching addresses failed");
        }
        result.into()
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        data: &SignUpData,
    ) -> OperationResult<AuthResponse> {
        let _loading = self.begin();
        let result = async {
            let response = self
                .gateway
                .sign_up(email, password, data.to_metadata())
                .await?;
            if let Some(user) = &response.user {
                if !user.is_email_confirmed() {
                    info!(user_id = %user.id, "account created, e-mail confirmation pending");
                }
                self.adopt_user(user).await;
            }
            Ok::<_, Error>(response)
        }
        .await;
        self.conclude("sign up", result)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> OperationResult<AuthResponse> {
        let _loading = self.begin();
        let result = async {
            let response = self.gateway.sign_in_with_password(email, password).await?;
            if let Some(user) = &response.user {
                info!(user_id = %user.id, "signed in");
                self.adopt_user(user).await;
            }
            Ok::<_, Error>(response)
        }
        .await;
        self.conclude("sign in", result)
    }

    /// Cache a freshly authenticated user and load their profile
    async fn adopt_user(&self, user: &User) {
        self.set_user(Some(user.clone()));
        let _ = self.load_profile(Some(&user.id)).await;
    }

    /// Start an OAuth sign-in; the session arrives later via the redirect
    pub async fn sign_in_with_oauth(&self, provider: &str) -> OperationResult<OAuthRedirect> {
        let _loading = self.begin();
        let redirect_to = format!("{}/", self.redirect_base);
        let result = self.gateway.sign_in_with_oauth(provider, &redirect_to).await;
        self.conclude("oauth sign in", result)
    }

    /// Sign out remotely, then drop local user data
    ///
    /// If the backend refuses, local state is kept so it keeps matching the
    /// still-valid remote session.
    pub async fn sign_out(&self) -> OperationResult<()> {
        let _loading = self.begin();
        let result = async {
            self.gateway.sign_out().await?;
            self.clear_session_state();
            info!("signed out");
            Ok::<_, Error>(())
        }
        .await;
        self.conclude("sign out", result)
    }

    // =========================================================================
    // Local state
    // =========================================================================

    /// Push an item to the front of the recently-viewed list
    pub fn record_recently_viewed(&self, item_id: &str) -> OperationResult<Vec<String>> {
        let item_id = item_id.trim();
        if item_id.is_empty() {
            return OperationResult::fail("Item id cannot be empty");
        }
        let list = self.update_persisted(|state| {
            push_recently_viewed(&mut state.recently_viewed, item_id);
            state.recently_viewed.clone()
        });
        OperationResult::ok(list)
    }

    pub fn update_preferences(&self, preferences: Preferences) -> OperationResult<Preferences> {
        self.update_persisted(|state| state.preferences = preferences.clone());
        OperationResult::ok(preferences)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryGateway;

    fn store() -> SessionStore<InMemoryGateway> {
        SessionStore::new(Arc::new(InMemoryGateway::new()), "http://localhost:3000/")
    }

    #[test]
    fn test_nested_loading_guards() {
        let store = store();
        let outer = store.begin();
        {
            let _inner = store.begin();
            assert!(store.snapshot().is_loading);
        }
        assert!(store.snapshot().is_loading);
        drop(outer);
        assert!(!store.snapshot().is_loading);
    }

    #[test]
    fn test_begin_clears_error() {
        let store = store();
        store.set_error("old");
        let _guard = store.begin();
        assert!(store.snapshot().error.is_none());
    }

    #[test]
    fn test_set_user_switch_drops_profile() {
        let store = store();
        store.set_user(Some(User::new("u1", "a@b.c")));
        store.write().state.profile =
            Some(normalize_profile(&serde_json::json!({"id": "u1"})).unwrap());

        store.set_user(Some(User::new("u1", "a@b.c")));
        assert!(store.profile().is_some());

        store.set_user(Some(User::new("u2", "x@y.z")));
        assert!(store.profile().is_none());
    }

    #[test]
    fn test_redirect_base_trailing_slash_trimmed() {
        assert_eq!(store().redirect_base(), "http://localhost:3000");
    }

    #[test]
    fn test_recently_viewed_rejects_blank() {
        let store = store();
        assert!(!store.record_recently_viewed("  ").success);
        assert_eq!(store.record_recently_viewed("p1").data, Some(vec!["p1".to_string()]));
    }

    #[tokio::test]
    async fn test_oauth_uses_root_redirect() {
        let store = store();
        let result = store.sign_in_with_oauth("google").await;
        let redirect = result.data.unwrap();
        assert!(redirect.url.contains("redirect_to=http%3A%2F%2Flocalhost%3A3000%2F"));
        assert!(store.current_user().is_none());
    }
}
