//! In-memory backend
//!
//! Implements every gateway port in-process so the store can be exercised
//! without a Supabase project: offline mode in the CLI and the integration
//! tests. Faults can be injected per operation and every call is counted,
//! which lets tests assert that a rejected operation never reached the
//! backend.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value as JsonValue};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{
    AuthEvent, AuthEventKind, AuthResponse, NewProfileRow, OAuthRedirect, ProfileSource, Session,
    User,
};
use crate::ports::{AuthGateway, DataGateway, OtpType, StorageGateway};

const SESSION_TTL_SECS: i64 = 3600;
const EVENT_CAPACITY: usize = 64;

/// Backend operations, used for fault injection and call counting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOp {
    GetSession,
    GetUser,
    SignUp,
    SignIn,
    SignInWithOAuth,
    SignOut,
    ResetPasswordForEmail,
    VerifyOtp,
    SetSession,
    RefreshSession,
    UpdateUserPassword,
    ReadProfileView,
    ReadProfileTable,
    UpsertProfileRow,
    UpdateProfileView,
    UpdateProfileTable,
    ListAddresses,
    Upload,
}

impl GatewayOp {
    fn read(source: ProfileSource) -> Self {
        match source {
            ProfileSource::View => GatewayOp::ReadProfileView,
            ProfileSource::Table => GatewayOp::ReadProfileTable,
        }
    }

    fn update(source: ProfileSource) -> Self {
        match source {
            ProfileSource::View => GatewayOp::UpdateProfileView,
            ProfileSource::Table => GatewayOp::UpdateProfileTable,
        }
    }
}

#[derive(Debug, Clone)]
enum Fault {
    Once(String),
    Always(String),
}

#[derive(Debug, Clone)]
struct Account {
    user: User,
    password: String,
}

/// A stored file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[derive(Default)]
struct Inner {
    /// Keyed by e-mail
    accounts: HashMap<String, Account>,
    session: Option<Session>,
    /// access token -> user id, for every session ever issued
    issued: HashMap<String, String>,
    /// one-time recovery token -> user id
    recovery_tokens: HashMap<String, String>,
    profiles: HashMap<String, Map<String, JsonValue>>,
    /// Columns only visible through the view (e.g. `is_admin`)
    view_columns: HashMap<String, Map<String, JsonValue>>,
    addresses: HashMap<String, Vec<JsonValue>>,
    objects: HashMap<(String, String), StoredObject>,
    faults: HashMap<GatewayOp, Fault>,
    calls: HashMap<GatewayOp, usize>,
    auto_confirm: bool,
}

/// In-process implementation of the gateway ports
pub struct InMemoryGateway {
    inner: Mutex<Inner>,
    events: broadcast::Sender<AuthEvent>,
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryGateway {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Mutex::new(Inner {
                auto_confirm: true,
                ..Default::default()
            }),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicking test thread must not wedge the others
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Count the call and apply any injected fault
    fn enter(&self, op: GatewayOp) -> Result<MutexGuard<'_, Inner>> {
        let mut inner = self.lock();
        *inner.calls.entry(op).or_insert(0) += 1;
        match inner.faults.get(&op).cloned() {
            Some(Fault::Once(msg)) => {
                inner.faults.remove(&op);
                Err(Error::gateway(msg))
            }
            Some(Fault::Always(msg)) => Err(Error::gateway(msg)),
            None => Ok(inner),
        }
    }

    fn publish(&self, kind: AuthEventKind, session: Option<Session>) {
        // No subscribers is fine
        let _ = self.events.send(AuthEvent::new(kind, session));
    }

    // =========================================================================
    // Test and demo setup
    // =========================================================================

    /// Create an account directly, bypassing sign-up
    pub fn register(&self, email: &str, password: &str, metadata: Map<String, JsonValue>) -> User {
        self.register_with_id(&Uuid::new_v4().to_string(), email, password, metadata)
    }

    pub fn register_with_id(
        &self,
        id: &str,
        email: &str,
        password: &str,
        metadata: Map<String, JsonValue>,
    ) -> User {
        let mut user = User::new(id, email);
        user.user_metadata = metadata;
        user.email_confirmed_at = Some(Utc::now());
        user.created_at = Some(Utc::now());

        self.lock().accounts.insert(
            email.to_string(),
            Account {
                user: user.clone(),
                password: password.to_string(),
            },
        );
        user
    }

    /// Sign `email` in without publishing an event
    pub fn start_session(&self, email: &str) -> Option<Session> {
        let mut inner = self.lock();
        let user = inner.accounts.get(email)?.user.clone();
        Some(Self::new_session(&mut inner, user))
    }

    /// When off, sign-up returns a user without a session (e-mail confirmation pending)
    pub fn set_auto_confirm(&self, enabled: bool) {
        self.lock().auto_confirm = enabled;
    }

    pub fn insert_profile_row(&self, row: JsonValue) {
        if let Some(obj) = row.as_object() {
            if let Some(id) = obj.get("id").and_then(|v| v.as_str()) {
                self.lock().profiles.insert(id.to_string(), obj.clone());
            }
        }
    }

    pub fn set_admin(&self, user_id: &str, is_admin: bool) {
        self.lock()
            .view_columns
            .entry(user_id.to_string())
            .or_default()
            .insert("is_admin".into(), JsonValue::Bool(is_admin));
    }

    pub fn insert_address(&self, user_id: &str, address: JsonValue) {
        self.lock()
            .addresses
            .entry(user_id.to_string())
            .or_default()
            .push(address);
    }

    /// Issue a one-time recovery token, as a reset e-mail would
    pub fn issue_recovery_token(&self, email: &str) -> Option<String> {
        let mut inner = self.lock();
        let user_id = inner.accounts.get(email)?.user.id.clone();
        let token = format!("rec_{}", Uuid::new_v4().simple());
        inner.recovery_tokens.insert(token.clone(), user_id);
        Some(token)
    }

    /// Fail the next call of `op` with `message`
    pub fn fail_next(&self, op: GatewayOp, message: &str) {
        self.lock().faults.insert(op, Fault::Once(message.to_string()));
    }

    /// Fail every call of `op` until cleared
    pub fn fail_always(&self, op: GatewayOp, message: &str) {
        self.lock()
            .faults
            .insert(op, Fault::Always(message.to_string()));
    }

    pub fn clear_faults(&self) {
        self.lock().faults.clear();
    }

    pub fn calls(&self, op: GatewayOp) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.lock().calls.values().sum()
    }

    pub fn current_session(&self) -> Option<Session> {
        self.lock().session.clone()
    }

    pub fn profile_row(&self, user_id: &str) -> Option<Map<String, JsonValue>> {
        self.lock().profiles.get(user_id).cloned()
    }

    pub fn view_row(&self, user_id: &str) -> Option<JsonValue> {
        Self::compose_view(&self.lock(), user_id)
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.lock()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    pub fn password_matches(&self, email: &str, password: &str) -> bool {
        self.lock()
            .accounts
            .get(email)
            .is_some_and(|a| a.password == password)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn new_session(inner: &mut Inner, user: User) -> Session {
        let access = format!("acc_{}", Uuid::new_v4().simple());
        let refresh = format!("ref_{}", Uuid::new_v4().simple());
        inner.issued.insert(access.clone(), user.id.clone());
        let session = Session::new(access, refresh, Some(SESSION_TTL_SECS), user);
        inner.session = Some(session.clone());
        session
    }

    fn user_by_id(inner: &Inner, user_id: &str) -> Option<User> {
        inner
            .accounts
            .values()
            .find(|a| a.user.id == user_id)
            .map(|a| a.user.clone())
    }

    /// `complete_users`: base row joined with auth e-mail and view-only columns
    fn compose_view(inner: &Inner, user_id: &str) -> Option<JsonValue> {
        let mut row = inner.profiles.get(user_id)?.clone();
        if let Some(user) = Self::user_by_id(inner, user_id) {
            row.insert("email".into(), json!(user.email));
        }
        row.entry("is_admin").or_insert(JsonValue::Bool(false));
        if let Some(extra) = inner.view_columns.get(user_id) {
            for (k, v) in extra {
                row.insert(k.clone(), v.clone());
            }
        }
        Some(JsonValue::Object(row))
    }
}

#[async_trait]
impl AuthGateway for InMemoryGateway {
    async fn get_session(&self) -> Result<Option<Session>> {
        let inner = self.enter(GatewayOp::GetSession)?;
        Ok(inner.session.clone())
    }

    async fn get_user(&self) -> Result<Option<User>> {
        let inner = self.enter(GatewayOp::GetUser)?;
        Ok(inner
            .session
            .as_ref()
            .and_then(|s| Self::user_by_id(&inner, &s.user.id)))
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Map<String, JsonValue>,
    ) -> Result<AuthResponse> {
        let mut inner = self.enter(GatewayOp::SignUp)?;
        if inner.accounts.contains_key(email) {
            return Err(Error::auth("User already registered"));
        }
        if password.len() < 6 {
            return Err(Error::auth("Password should be at least 6 characters"));
        }

        let mut user = User::new(Uuid::new_v4().to_string(), email);
        user.user_metadata = metadata;
        user.created_at = Some(Utc::now());
        if inner.auto_confirm {
            user.email_confirmed_at = Some(Utc::now());
        }
        inner.accounts.insert(
            email.to_string(),
            Account {
                user: user.clone(),
                password: password.to_string(),
            },
        );

        let session = if inner.auto_confirm {
            Some(Self::new_session(&mut inner, user.clone()))
        } else {
            None
        };
        drop(inner);

        if let Some(s) = &session {
            self.publish(AuthEventKind::SignedIn, Some(s.clone()));
        }
        Ok(AuthResponse {
            user: Some(user),
            session,
        })
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthResponse> {
        let mut inner = self.enter(GatewayOp::SignIn)?;
        let user = match inner.accounts.get(email) {
            Some(account) if account.password == password => account.user.clone(),
            _ => return Err(Error::auth("Invalid login credentials")),
        };
        let session = Self::new_session(&mut inner, user.clone());
        drop(inner);

        self.publish(AuthEventKind::SignedIn, Some(session.clone()));
        Ok(AuthResponse {
            user: Some(user),
            session: Some(session),
        })
    }

    async fn sign_in_with_oauth(
        &self,
        provider: &str,
        redirect_to: &str,
    ) -> Result<OAuthRedirect> {
        let _inner = self.enter(GatewayOp::SignInWithOAuth)?;
        let mut url = url::Url::parse("memory://auth/v1/authorize")
            .map_err(|e| Error::Other(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("provider", provider)
            .append_pair("redirect_to", redirect_to);
        Ok(OAuthRedirect {
            provider: provider.to_string(),
            url: url.to_string(),
        })
    }

    async fn sign_out(&self) -> Result<()> {
        let mut inner = self.enter(GatewayOp::SignOut)?;
        if let Some(session) = inner.session.take() {
            inner.issued.remove(&session.access_token);
        }
        drop(inner);

        self.publish(AuthEventKind::SignedOut, None);
        Ok(())
    }

    async fn reset_password_for_email(&self, email: &str, _redirect_to: &str) -> Result<()> {
        let mut inner = self.enter(GatewayOp::ResetPasswordForEmail)?;
        // Unknown addresses succeed silently so accounts cannot be probed
        if let Some(user_id) = inner.accounts.get(email).map(|a| a.user.id.clone()) {
            let token = format!("rec_{}", Uuid::new_v4().simple());
            inner.recovery_tokens.insert(token, user_id);
        }
        Ok(())
    }

    async fn verify_otp(&self, token_hash: &str, otp_type: OtpType) -> Result<AuthResponse> {
        let mut inner = self.enter(GatewayOp::VerifyOtp)?;
        let user_id = inner
            .recovery_tokens
            .remove(token_hash)
            .ok_or_else(|| Error::auth("Token has expired or is invalid"))?;
        let user = Self::user_by_id(&inner, &user_id)
            .ok_or_else(|| Error::auth("User not found"))?;
        let session = Self::new_session(&mut inner, user.clone());
        drop(inner);

        let kind = match otp_type {
            OtpType::Recovery => AuthEventKind::PasswordRecovery,
        };
        self.publish(kind, Some(session.clone()));
        Ok(AuthResponse {
            user: Some(user),
            session: Some(session),
        })
    }

    async fn set_session(&self, access_token: &str, _refresh_token: &str) -> Result<Session> {
        let mut inner = self.enter(GatewayOp::SetSession)?;
        let user_id = inner
            .issued
            .get(access_token)
            .cloned()
            .ok_or_else(|| Error::auth("Invalid JWT"))?;
        let user = Self::user_by_id(&inner, &user_id)
            .ok_or_else(|| Error::auth("User not found"))?;
        let session = Self::new_session(&mut inner, user);
        drop(inner);

        self.publish(AuthEventKind::SignedIn, Some(session.clone()));
        Ok(session)
    }

    async fn refresh_session(&self) -> Result<Session> {
        let mut inner = self.enter(GatewayOp::RefreshSession)?;
        let user = inner
            .session
            .as_ref()
            .map(|s| s.user.clone())
            .ok_or_else(|| Error::auth("Auth session missing!"))?;
        let session = Self::new_session(&mut inner, user);
        drop(inner);

        self.publish(AuthEventKind::TokenRefreshed, Some(session.clone()));
        Ok(session)
    }

    async fn update_user_password(&self, password: &str) -> Result<User> {
        let mut inner = self.enter(GatewayOp::UpdateUserPassword)?;
        let session = inner
            .session
            .clone()
            .ok_or_else(|| Error::auth("Auth session missing!"))?;
        let email = session.user.email.clone().unwrap_or_default();
        let account = inner
            .accounts
            .get_mut(&email)
            .ok_or_else(|| Error::auth("User not found"))?;
        if account.password == password {
            return Err(Error::auth(
                "New password should be different from the old password.",
            ));
        }
        account.password = password.to_string();
        let user = account.user.clone();
        drop(inner);

        self.publish(AuthEventKind::UserUpdated, Some(session));
        Ok(user)
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

#[async_trait]
impl DataGateway for InMemoryGateway {
    async fn read_profile(
        &self,
        source: ProfileSource,
        user_id: &str,
    ) -> Result<Option<JsonValue>> {
        let inner = self.enter(GatewayOp::read(source))?;
        Ok(match source {
            ProfileSource::View => Self::compose_view(&inner, user_id),
            ProfileSource::Table => inner.profiles.get(user_id).cloned().map(JsonValue::Object),
        })
    }

    async fn upsert_profile_row(&self, row: &NewProfileRow) -> Result<()> {
        let mut inner = self.enter(GatewayOp::UpsertProfileRow)?;
        let JsonValue::Object(fields) = serde_json::to_value(row)? else {
            return Err(Error::gateway("profile row must serialize to an object"));
        };
        let existing = inner.profiles.entry(row.id.clone()).or_default();
        for (k, v) in fields {
            existing.insert(k, v);
        }
        Ok(())
    }

    async fn update_profile(
        &self,
        source: ProfileSource,
        user_id: &str,
        changes: &Map<String, JsonValue>,
    ) -> Result<()> {
        let mut inner = self.enter(GatewayOp::update(source))?;
        if !inner.profiles.contains_key(user_id) {
            // Matches PostgREST: an update hitting no rows is not an error
            return Ok(());
        }
        let target = match source {
            ProfileSource::Table => inner.profiles.get_mut(user_id),
            ProfileSource::View => Some(inner.view_columns.entry(user_id.to_string()).or_default()),
        };
        if let Some(target) = target {
            for (k, v) in changes {
                target.insert(k.clone(), v.clone());
            }
        }
        Ok(())
    }

    async fn list_addresses(&self, user_id: &str) -> Result<Vec<JsonValue>> {
        let inner = self.enter(GatewayOp::ListAddresses)?;
        Ok(inner.addresses.get(user_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl StorageGateway for InMemoryGateway {
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<()> {
        let mut inner = self.enter(GatewayOp::Upload)?;
        inner.objects.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    fn public_url(&self, bucket: &str, key: &str) -> String {
        format!("memory://storage/v1/object/public/{}/{}", bucket, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sign_in_publishes_event() {
        let gateway = InMemoryGateway::new();
        gateway.register("a@b.c", "secret1", Map::new());
        let mut events = gateway.subscribe();

        let response = gateway.sign_in_with_password("a@b.c", "secret1").await.unwrap();
        assert!(response.session.is_some());

        let event = events.recv().await.unwrap();
        assert_eq!(event.kind, AuthEventKind::SignedIn);
        assert_eq!(event.user().map(|u| u.email.clone()), Some(Some("a@b.c".into())));
    }

    #[tokio::test]
    async fn test_wrong_password_is_auth_error() {
        let gateway = InMemoryGateway::new();
        gateway.register("a@b.c", "secret1", Map::new());
        let err = gateway.sign_in_with_password("a@b.c", "nope").await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
        assert!(gateway.current_session().is_none());
    }

    #[tokio::test]
    async fn test_fault_once_then_recovers() {
        let gateway = InMemoryGateway::new();
        gateway.fail_next(GatewayOp::GetSession, "boom");
        assert!(gateway.get_session().await.is_err());
        assert!(gateway.get_session().await.is_ok());
        assert_eq!(gateway.calls(GatewayOp::GetSession), 2);
    }

    #[tokio::test]
    async fn test_recovery_tokens_are_single_use() {
        let gateway = InMemoryGateway::new();
        gateway.register("a@b.c", "secret1", Map::new());
        let token = gateway.issue_recovery_token("a@b.c").unwrap();

        assert!(gateway.verify_otp(&token, OtpType::Recovery).await.is_ok());
        assert!(gateway.verify_otp(&token, OtpType::Recovery).await.is_err());
    }

    #[tokio::test]
    async fn test_view_joins_email_and_admin_flag() {
        let gateway = InMemoryGateway::new();
        let user = gateway.register("a@b.c", "secret1", Map::new());
        gateway.insert_profile_row(json!({"id": user.id, "name": "A"}));
        gateway.set_admin(&user.id, true);

        let view = gateway.read_profile(ProfileSource::View, &user.id).await.unwrap().unwrap();
        assert_eq!(view["email"], "a@b.c");
        assert_eq!(view["is_admin"], true);

        let table = gateway.read_profile(ProfileSource::Table, &user.id).await.unwrap().unwrap();
        assert!(table.get("is_admin").is_none());
    }

    #[tokio::test]
    async fn test_upsert_merges_existing_row() {
        let gateway = InMemoryGateway::new();
        gateway.insert_profile_row(json!({"id": "u1", "name": "Old", "bio": "kept"}));
        let row = NewProfileRow {
            id: "u1".into(),
            user_id: "user_u1".into(),
            name: "New".into(),
            avatar: None,
            interests: None,
        };
        gateway.upsert_profile_row(&row).await.unwrap();

        let stored = gateway.profile_row("u1").unwrap();
        assert_eq!(stored["name"], "New");
        assert_eq!(stored["bio"], "kept");
    }
}
