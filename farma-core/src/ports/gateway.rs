//! Gateway ports - the remote auth, data and storage service

use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};
use tokio::sync::broadcast;

use crate::domain::result::Result;
use crate::domain::{
    AuthEvent, AuthResponse, NewProfileRow, OAuthRedirect, ProfileSource, Session, User,
};

/// One-time-password flavours accepted by `verify_otp`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpType {
    Recovery,
}

impl OtpType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpType::Recovery => "recovery",
        }
    }
}

/// Session lifecycle operations
///
/// Implementations own the session. Calls that change it also publish an
/// [`AuthEvent`] to every subscriber.
#[async_trait]
pub trait AuthGateway: Send + Sync {
    /// Current session, refreshed first if it has expired
    async fn get_session(&self) -> Result<Option<Session>>;

    /// Current user as the server sees it
    async fn get_user(&self) -> Result<Option<User>>;

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Map<String, JsonValue>,
    ) -> Result<AuthResponse>;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthResponse>;

    /// Build the provider redirect; no session exists until the provider
    /// sends the user back
    async fn sign_in_with_oauth(&self, provider: &str, redirect_to: &str)
        -> Result<OAuthRedirect>;

    async fn sign_out(&self) -> Result<()>;

    async fn reset_password_for_email(&self, email: &str, redirect_to: &str) -> Result<()>;

    /// Exchange a one-time token (e.g. from a reset e-mail) for a session
    async fn verify_otp(&self, token_hash: &str, otp_type: OtpType) -> Result<AuthResponse>;

    async fn set_session(&self, access_token: &str, refresh_token: &str) -> Result<Session>;

    async fn refresh_session(&self) -> Result<Session>;

    /// Change the password of the signed-in user
    async fn update_user_password(&self, password: &str) -> Result<User>;

    /// Subscribe to session lifecycle events
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
}

/// Profile rows and auxiliary user data
#[async_trait]
pub trait DataGateway: Send + Sync {
    /// Read one profile row keyed by user id; `Ok(None)` when absent
    async fn read_profile(&self, source: ProfileSource, user_id: &str)
        -> Result<Option<JsonValue>>;

    /// Insert or merge the base row (conflict target `id`)
    async fn upsert_profile_row(&self, row: &NewProfileRow) -> Result<()>;

    async fn update_profile(
        &self,
        source: ProfileSource,
        user_id: &str,
        changes: &Map<String, JsonValue>,
    ) -> Result<()>;

    async fn list_addresses(&self, user_id: &str) -> Result<Vec<JsonValue>>;
}

/// File storage buckets
#[async_trait]
pub trait StorageGateway: Send + Sync {
    /// Upload with overwrite semantics
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<()>;

    /// Public URL of an object; does not check that it exists
    fn public_url(&self, bucket: &str, key: &str) -> String;
}

/// Everything the session store needs from the backend
pub trait Gateway: AuthGateway + DataGateway + StorageGateway {}

impl<T: AuthGateway + DataGateway + StorageGateway> Gateway for T {}
