//! Password recovery - reset e-mails, recovery tokens and password changes
//!
//! A reset e-mail brings the user back with a one-time token in the URL
//! fragment. Completing the reset exchanges that token for a session,
//! changes the password, stamps the profile and signs out again so the user
//! logs in with the new password.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::domain::profile::password_changed_stamp;
use crate::domain::result::{Error, OperationResult, Result};
use crate::domain::{token_hint, ProfileSource, RecoveryStage, RecoveryToken, Session};
use crate::ports::{Gateway, Location, OtpType};
use crate::services::SessionStore;

pub const RESET_EMAIL_SENT: &str = "Password reset email sent. Please check your inbox.";
pub const PASSWORD_RESET_DONE: &str =
    "Password has been reset successfully. You can now log in with your new password.";

/// Recovery flows on top of a [`SessionStore`]
pub struct RecoveryService<G: Gateway + ?Sized> {
    store: Arc<SessionStore<G>>,
    location: Arc<dyn Location>,
    stage: Mutex<RecoveryStage>,
}

impl<G: Gateway + ?Sized> RecoveryService<G> {
    pub fn new(store: Arc<SessionStore<G>>, location: Arc<dyn Location>) -> Self {
        Self {
            store,
            location,
            stage: Mutex::new(RecoveryStage::NoToken),
        }
    }

    /// Last stage the recovery flow reached
    pub fn stage(&self) -> RecoveryStage {
        *self.stage.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn advance(&self, stage: RecoveryStage) {
        debug!(?stage, "recovery stage");
        *self.stage.lock().unwrap_or_else(|e| e.into_inner()) = stage;
    }

    fn gateway(&self) -> &G {
        self.store.gateway()
    }

    /// Recovery token in the current location's fragment, if any
    pub fn parse_recovery_token(&self) -> Option<RecoveryToken> {
        let token = self
            .location
            .fragment()
            .and_then(|fragment| RecoveryToken::parse(&fragment));
        if let Some(t) = &token {
            debug!(token = %token_hint(&t.token), "recovery token found");
            if self.stage() == RecoveryStage::NoToken {
                self.advance(RecoveryStage::TokenFound);
            }
        }
        token
    }

    pub fn has_recovery_token(&self) -> bool {
        self.parse_recovery_token().is_some()
    }

    /// Send a reset e-mail linking back to `/login/reset-password`
    pub async fn request_password_reset(&self, email: &str) -> OperationResult<()> {
        let _loading = self.store.begin();
        let result = async {
            let email = email.trim();
            if email.is_empty() {
                return Err(Error::validation("Email is required"));
            }
            let redirect_to = format!("{}/login/reset-password", self.store.redirect_base());
            self.gateway()
                .reset_password_for_email(email, &redirect_to)
                .await?;
            info!("password reset e-mail requested");
            Ok::<_, Error>(())
        }
        .await;

        match self.store.conclude("request password reset", result) {
            r if r.success => OperationResult::ok_with_message((), RESET_EMAIL_SENT),
            r => r,
        }
    }

    /// Make sure a recovery session exists, building one from the fragment
    /// when the backend does not already hold it
    pub async fn exchange_recovery_token(&self) -> OperationResult<Session> {
        let result = self.exchange_inner().await;
        if let Err(e) = &result {
            warn!(error = %e, "recovery session exchange failed");
        }
        result.into()
    }

    async fn exchange_inner(&self) -> Result<Session> {
        if let Some(session) = self.gateway().get_session().await? {
            self.advance(RecoveryStage::SessionEstablished);
            return Ok(session);
        }

        let token = self
            .parse_recovery_token()
            .ok_or_else(|| Error::auth("No recovery token found"))?;
        let refresh = token.refresh_token.as_deref().unwrap_or(&token.token);

        match self.gateway().set_session(&token.token, refresh).await {
            Ok(session) => {
                self.advance(RecoveryStage::SessionEstablished);
                Ok(session)
            }
            Err(e) => {
                warn!(error = %e, "could not set recovery session, trying a refresh");
                match self.gateway().refresh_session().await {
                    Ok(session) => {
                        self.advance(RecoveryStage::SessionEstablished);
                        Ok(session)
                    }
                    Err(_) => Err(Error::auth("Failed to establish recovery session")),
                }
            }
        }
    }

    /// Finish a reset from an e-mail link: verify the fragment token, then
    /// change the password
    pub async fn complete_forgot_password_reset(&self, new_password: &str) -> OperationResult<()> {
        let _loading = self.store.begin();
        let result = async {
            require_password(new_password)?;
            let token = self
                .parse_recovery_token()
                .ok_or_else(|| Error::auth("No recovery token found in URL"))?;

            let response = self
                .gateway()
                .verify_otp(&token.token, OtpType::Recovery)
                .await
                .map_err(|e| Error::auth(format!("Invalid or expired recovery token: {}", e)))?;
            if response.session.is_none() {
                return Err(Error::auth("Failed to establish recovery session"));
            }
            self.advance(RecoveryStage::SessionEstablished);

            self.apply_new_password(new_password).await?;
            self.location.clear_fragment();
            Ok::<_, Error>(())
        }
        .await;
        self.finish("complete password reset", result)
    }

    /// Change the password using the recovery session the backend already holds
    pub async fn update_password_with_token(&self, new_password: &str) -> OperationResult<()> {
        let _loading = self.store.begin();
        let result = async {
            require_password(new_password)?;
            self.require_session().await?;
            self.apply_new_password(new_password).await
        }
        .await;
        self.finish("update password", result)
    }

    /// Verify a caller-supplied reset token, then change the password
    pub async fn complete_password_reset(
        &self,
        token: &str,
        new_password: &str,
    ) -> OperationResult<()> {
        let _loading = self.store.begin();
        let result = async {
            require_password(new_password)?;
            self.gateway()
                .verify_otp(token, OtpType::Recovery)
                .await
                .map_err(|e| {
                    warn!(error = %e, "reset token rejected");
                    Error::auth("Invalid or expired reset token")
                })?;
            self.advance(RecoveryStage::SessionEstablished);
            self.require_session().await?;
            self.apply_new_password(new_password).await
        }
        .await;
        self.finish("complete password reset", result)
    }

    async fn require_session(&self) -> Result<Session> {
        self.gateway().get_session().await?.ok_or_else(|| {
            Error::auth("No active session. Please request a new password reset.")
        })
    }

    /// Update the password, stamp the profile, sign out, clear local state
    async fn apply_new_password(&self, new_password: &str) -> Result<()> {
        let user = self
            .gateway()
            .update_user_password(new_password)
            .await
            .map_err(|e| Error::auth(format!("Failed to update password: {}", e)))?;
        self.advance(RecoveryStage::PasswordUpdated);
        info!(user_id = %user.id, "password updated");

        let stamp = password_changed_stamp(Utc::now());
        if let Err(e) = self
            .gateway()
            .update_profile(ProfileSource::View, &user.id, &stamp)
            .await
        {
            warn!(error = %e, "could not stamp password change on profile");
        }

        if let Err(e) = self.gateway().sign_out().await {
            warn!(error = %e, "sign-out after password reset failed");
        }
        self.store.clear_session_state();
        self.advance(RecoveryStage::SignedOutPostReset);
        Ok(())
    }

    fn finish(&self, operation: &str, result: Result<()>) -> OperationResult<()> {
        match self.store.conclude(operation, result) {
            r if r.success => OperationResult::ok_with_message((), PASSWORD_RESET_DONE),
            r => r,
        }
    }
}

fn require_password(password: &str) -> Result<()> {
    if password.is_empty() {
        return Err(Error::validation("Password cannot be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryGateway, UrlLocation};

    fn service(link: &str) -> RecoveryService<InMemoryGateway> {
        let store = Arc::new(SessionStore::new(
            Arc::new(InMemoryGateway::new()),
            "http://localhost:3000",
        ));
        RecoveryService::new(store, Arc::new(UrlLocation::parse(link).unwrap()))
    }

    #[test]
    fn test_token_detection_advances_stage() {
        let service = service("http://localhost:3000/login/reset-password#abc123?type=recovery");
        assert_eq!(service.stage(), RecoveryStage::NoToken);
        assert!(service.has_recovery_token());
        assert_eq!(service.stage(), RecoveryStage::TokenFound);
    }

    #[test]
    fn test_no_fragment_no_token() {
        let service = service("http://localhost:3000/login/reset-password");
        assert!(service.parse_recovery_token().is_none());
        assert_eq!(service.stage(), RecoveryStage::NoToken);
    }

    #[tokio::test]
    async fn test_empty_password_rejected_before_any_call() {
        let service = service("http://localhost:3000/login/reset-password#abc?type=recovery");
        let result = service.complete_forgot_password_reset("").await;
        assert!(!result.success);
        assert_eq!(result.error_message(), "Password cannot be empty");
        assert_eq!(service.gateway().total_calls(), 0);
    }

    #[tokio::test]
    async fn test_request_reset_rejects_blank_email() {
        let service = service("http://localhost:3000/login");
        let result = service.request_password_reset("  ").await;
        assert!(!result.success);
        assert!(result.message.is_none());
    }
}
