//! Supabase HTTP client
//!
//! Talks to the three Supabase services the account pages use:
//! - GoTrue (`/auth/v1`) for the session lifecycle
//! - PostgREST (`/rest/v1`) for `user_profiles`, `complete_users`, `addresses`
//! - Storage (`/storage/v1`) for avatars
//!
//! The client owns the session. It keeps it in memory and, when given a
//! session file, on disk so a restarted process picks it up again.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value as JsonValue};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::domain::result::{Error, Result};
use crate::domain::{
    AuthEvent, AuthEventKind, AuthResponse, NewProfileRow, OAuthRedirect, ProfileSource, Session,
    User,
};
use crate::ports::{AuthGateway, DataGateway, OtpType, StorageGateway};

const REQUEST_TIMEOUT_SECS: u64 = 30;
const EVENT_CAPACITY: usize = 64;
const AVATAR_CACHE_CONTROL: &str = "max-age=3600";

// =============================================================================
// Wire models (GoTrue)
// =============================================================================

/// Token endpoint response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    /// Unix seconds
    #[serde(default)]
    expires_at: Option<i64>,
    user: User,
}

impl TokenResponse {
    fn into_session(self) -> Session {
        let expires_at: Option<DateTime<Utc>> = match (self.expires_at, self.expires_in) {
            (Some(at), _) => Utc.timestamp_opt(at, 0).single(),
            (None, Some(secs)) => Some(Utc::now() + chrono::Duration::seconds(secs)),
            (None, None) => None,
        };
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            token_type: self.token_type.unwrap_or_else(|| "bearer".to_string()),
            expires_at,
            user: self.user,
        }
    }
}

/// Error body; GoTrue, PostgREST and Storage each use different keys
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl ErrorBody {
    fn text(self) -> Option<String> {
        self.msg
            .or(self.message)
            .or(self.error_description)
            .or(self.error)
    }
}

/// Which service a request went to, for error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Service {
    Auth,
    Rest,
    Storage,
}

// =============================================================================
// Client
// =============================================================================

/// Supabase API client implementing the gateway ports
pub struct SupabaseClient {
    http: Client,
    base_url: String,
    anon_key: String,
    session: Mutex<Option<Session>>,
    session_file: Option<PathBuf>,
    events: broadcast::Sender<AuthEvent>,
}

impl std::fmt::Debug for SupabaseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl SupabaseClient {
    /// Create a client for the project at `base_url`
    pub fn new(base_url: &str, anon_key: &str) -> Result<Self> {
        if anon_key.trim().is_empty() {
            return Err(Error::config("Supabase anon key cannot be empty"));
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::config(format!("Failed to create HTTP client: {}", e)))?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            session: Mutex::new(None),
            session_file: None,
            events,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.supabase_url.as_str(), &config.anon_key)
    }

    /// Persist the session to `path` and restore any session saved there
    pub fn with_session_file(mut self, path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<Session>(&content) {
                Ok(session) => {
                    debug!(token = %session.token_hint(), "restored persisted session");
                    *self.lock_session() = Some(session);
                }
                Err(e) => warn!(error = %e, "ignoring unreadable session file"),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(error = %e, "could not read session file"),
        }
        self.session_file = Some(path.to_path_buf());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn lock_session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn current_session(&self) -> Option<Session> {
        self.lock_session().clone()
    }

    /// Replace the session, persist it and notify subscribers
    fn store_session(&self, session: Option<Session>, event: Option<AuthEventKind>) {
        *self.lock_session() = session.clone();
        self.persist_session(session.as_ref());
        if let Some(kind) = event {
            let _ = self.events.send(AuthEvent::new(kind, session));
        }
    }

    fn persist_session(&self, session: Option<&Session>) {
        let Some(path) = &self.session_file else {
            return;
        };
        let outcome = match session {
            Some(s) => serde_json::to_string(s)
                .map_err(std::io::Error::from)
                .and_then(|content| std::fs::write(path, content)),
            None => match std::fs::remove_file(path) {
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                other => other,
            },
        };
        if let Err(e) = outcome {
            warn!(error = %e, "could not persist session");
        }
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    fn rest_url(&self, relation: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, relation)
    }

    fn storage_url(&self, path: &str) -> String {
        format!("{}/storage/v1/{}", self.base_url, path)
    }

    /// Request carrying the anon key and the current (or anon) bearer token
    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let bearer = self
            .current_session()
            .map(|s| s.access_token)
            .unwrap_or_else(|| self.anon_key.clone());
        self.request_as(method, url, &bearer)
    }

    fn request_as(&self, method: Method, url: &str, bearer: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
    }

    fn require_access_token(&self) -> Result<String> {
        self.current_session()
            .map(|s| s.access_token)
            .ok_or_else(|| Error::auth("Auth session missing!"))
    }

    async fn send(&self, service: Service, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        check_response(service, response).await
    }

    async fn send_json<T: for<'de> Deserialize<'de>>(
        &self,
        service: Service,
        request: RequestBuilder,
    ) -> Result<T> {
        let response = self.send(service, request).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| Error::gateway(format!("Failed to parse response: {}", e)))
    }

    async fn token_grant(&self, grant_type: &str, body: JsonValue) -> Result<Session> {
        let request = self
            .request_as(Method::POST, &self.auth_url("token"), &self.anon_key)
            .query(&[("grant_type", grant_type)])
            .json(&body);
        let token: TokenResponse = self.send_json(Service::Auth, request).await?;
        Ok(token.into_session())
    }
}

/// Logout statuses meaning the token was already revoked or expired
fn session_already_gone(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND
    )
}

/// Map non-2xx responses to domain errors using the remote error text
async fn check_response(service: Service, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let text = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(ErrorBody::text)
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                status.to_string()
            } else {
                body.clone()
            }
        });

    let is_auth_failure = matches!(
        status,
        StatusCode::BAD_REQUEST
            | StatusCode::UNAUTHORIZED
            | StatusCode::FORBIDDEN
            | StatusCode::UNPROCESSABLE_ENTITY
    );
    if service == Service::Auth && is_auth_failure {
        Err(Error::auth(text))
    } else if status == StatusCode::NOT_FOUND {
        Err(Error::not_found(text))
    } else {
        Err(Error::gateway(format!("{} ({})", text, status.as_u16())))
    }
}

/// `id=eq.<id>` filter value
fn eq(value: &str) -> String {
    format!("eq.{}", value)
}

#[async_trait]
impl AuthGateway for SupabaseClient {
    async fn get_session(&self) -> Result<Option<Session>> {
        let Some(session) = self.current_session() else {
            return Ok(None);
        };
        if !session.is_expired(Utc::now()) {
            return Ok(Some(session));
        }

        debug!("session expired, refreshing");
        match self.refresh_session().await {
            Ok(fresh) => Ok(Some(fresh)),
            Err(Error::Auth(msg)) => {
                info!(reason = %msg, "refresh token rejected, dropping session");
                self.store_session(None, Some(AuthEventKind::SignedOut));
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn get_user(&self) -> Result<Option<User>> {
        if self.current_session().is_none() {
            return Ok(None);
        }
        let request = self.request(Method::GET, &self.auth_url("user"));
        let user: User = self.send_json(Service::Auth, request).await?;
        Ok(Some(user))
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Map<String, JsonValue>,
    ) -> Result<AuthResponse> {
        let request = self
            .request_as(Method::POST, &self.auth_url("signup"), &self.anon_key)
            .json(&json!({ "email": email, "password": password, "data": metadata }));
        let body: JsonValue = self.send_json(Service::Auth, request).await?;

        // Auto-confirmed projects answer with a session, others with the bare user
        if body.get("access_token").is_some() {
            let session = serde_json::from_value::<TokenResponse>(body)?.into_session();
            self.store_session(Some(session.clone()), Some(AuthEventKind::SignedIn));
            return Ok(AuthResponse {
                user: Some(session.user.clone()),
                session: Some(session),
            });
        }

        let user_value = body.get("user").cloned().unwrap_or(body);
        let user = serde_json::from_value::<User>(user_value).ok();
        debug!(confirmed = user.as_ref().is_some_and(User::is_email_confirmed), "sign-up accepted");
        Ok(AuthResponse {
            user,
            session: None,
        })
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthResponse> {
        let session = self
            .token_grant("password", json!({ "email": email, "password": password }))
            .await?;
        self.store_session(Some(session.clone()), Some(AuthEventKind::SignedIn));
        Ok(AuthResponse {
            user: Some(session.user.clone()),
            session: Some(session),
        })
    }

    async fn sign_in_with_oauth(
        &self,
        provider: &str,
        redirect_to: &str,
    ) -> Result<OAuthRedirect> {
        let mut url = url::Url::parse(&self.auth_url("authorize"))
            .map_err(|e| Error::config(format!("Invalid Supabase URL: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("provider", provider)
            .append_pair("redirect_to", redirect_to);
        Ok(OAuthRedirect {
            provider: provider.to_string(),
            url: url.to_string(),
        })
    }

    async fn sign_out(&self) -> Result<()> {
        let Some(session) = self.current_session() else {
            self.store_session(None, Some(AuthEventKind::SignedOut));
            return Ok(());
        };

        let request = self.request_as(Method::POST, &self.auth_url("logout"), &session.access_token);
        let response = request.send().await?;
        let status = response.status();
        if session_already_gone(status) {
            debug!(%status, "server had no session to revoke");
        } else {
            check_response(Service::Auth, response).await?;
        }
        self.store_session(None, Some(AuthEventKind::SignedOut));
        Ok(())
    }

    async fn reset_password_for_email(&self, email: &str, redirect_to: &str) -> Result<()> {
        let request = self
            .request_as(Method::POST, &self.auth_url("recover"), &self.anon_key)
            .query(&[("redirect_to", redirect_to)])
            .json(&json!({ "email": email }));
        self.send(Service::Auth, request).await?;
        Ok(())
    }

    async fn verify_otp(&self, token_hash: &str, otp_type: OtpType) -> Result<AuthResponse> {
        let request = self
            .request_as(Method::POST, &self.auth_url("verify"), &self.anon_key)
            .json(&json!({ "type": otp_type.as_str(), "token_hash": token_hash }));
        let body: JsonValue = self.send_json(Service::Auth, request).await?;

        if body.get("access_token").is_none() {
            let user = body
                .get("user")
                .cloned()
                .and_then(|u| serde_json::from_value::<User>(u).ok());
            return Ok(AuthResponse {
                user,
                session: None,
            });
        }

        let session = serde_json::from_value::<TokenResponse>(body)?.into_session();
        let event = match otp_type {
            OtpType::Recovery => AuthEventKind::PasswordRecovery,
        };
        self.store_session(Some(session.clone()), Some(event));
        Ok(AuthResponse {
            user: Some(session.user.clone()),
            session: Some(session),
        })
    }

    async fn set_session(&self, access_token: &str, refresh_token: &str) -> Result<Session> {
        // GoTrue has no endpoint for this; validate the token by fetching its user
        let request = self.request_as(Method::GET, &self.auth_url("user"), access_token);
        let user: User = self.send_json(Service::Auth, request).await?;

        let session = Session {
            access_token: access_token.to_string(),
            refresh_token: refresh_token.to_string(),
            token_type: "bearer".to_string(),
            expires_at: None,
            user,
        };
        self.store_session(Some(session.clone()), Some(AuthEventKind::SignedIn));
        Ok(session)
    }

    async fn refresh_session(&self) -> Result<Session> {
        let refresh_token = self
            .current_session()
            .map(|s| s.refresh_token)
            .ok_or_else(|| Error::auth("Auth session missing!"))?;
        let session = self
            .token_grant("refresh_token", json!({ "refresh_token": refresh_token }))
            .await?;
        self.store_session(Some(session.clone()), Some(AuthEventKind::TokenRefreshed));
        Ok(session)
    }

    async fn update_user_password(&self, password: &str) -> Result<User> {
        let token = self.require_access_token()?;
        let request = self
            .request_as(Method::PUT, &self.auth_url("user"), &token)
            .json(&json!({ "password": password }));
        let user: User = self.send_json(Service::Auth, request).await?;

        let session = self.current_session().map(|mut s| {
            s.user = user.clone();
            s
        });
        self.store_session(session, Some(AuthEventKind::UserUpdated));
        Ok(user)
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

#[async_trait]
impl DataGateway for SupabaseClient {
    async fn read_profile(
        &self,
        source: ProfileSource,
        user_id: &str,
    ) -> Result<Option<JsonValue>> {
        let request = self
            .request(Method::GET, &self.rest_url(source.relation()))
            .header("Accept", "application/json")
            .query(&[("id", eq(user_id).as_str()), ("select", "*")]);
        let rows: Vec<JsonValue> = self.send_json(Service::Rest, request).await?;
        Ok(rows.into_iter().next())
    }

    async fn upsert_profile_row(&self, row: &NewProfileRow) -> Result<()> {
        let request = self
            .request(Method::POST, &self.rest_url(ProfileSource::Table.relation()))
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .query(&[("on_conflict", "id")])
            .json(row);
        self.send(Service::Rest, request).await?;
        Ok(())
    }

    async fn update_profile(
        &self,
        source: ProfileSource,
        user_id: &str,
        changes: &Map<String, JsonValue>,
    ) -> Result<()> {
        let request = self
            .request(Method::PATCH, &self.rest_url(source.relation()))
            .header("Prefer", "return=minimal")
            .query(&[("id", eq(user_id))])
            .json(changes);
        self.send(Service::Rest, request).await?;
        Ok(())
    }

    async fn list_addresses(&self, user_id: &str) -> Result<Vec<JsonValue>> {
        let request = self
            .request(Method::GET, &self.rest_url("addresses"))
            .header("Accept", "application/json")
            .query(&[("user_id", eq(user_id).as_str()), ("select", "*")]);
        self.send_json(Service::Rest, request).await
    }
}

#[async_trait]
impl StorageGateway for SupabaseClient {
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<()> {
        let url = self.storage_url(&format!("object/{}/{}", bucket, key));
        let request = self
            .request(Method::POST, &url)
            .header("Content-Type", content_type)
            .header("Cache-Control", AVATAR_CACHE_CONTROL)
            .header("x-upsert", "true")
            .body(bytes);
        self.send(Service::Storage, request).await?;
        Ok(())
    }

    fn public_url(&self, bucket: &str, key: &str) -> String {
        self.storage_url(&format!("object/public/{}/{}", bucket, key))
    }
}
