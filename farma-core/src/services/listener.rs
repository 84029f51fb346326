//! Auth event listener - keeps the store in step with backend auth events

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::{AuthEvent, AuthEventKind};
use crate::ports::{Gateway, Location};
use crate::services::SessionStore;

/// Background task applying [`AuthEvent`]s to a [`SessionStore`]
///
/// Dropping the listener (or calling [`AuthListener::shutdown`]) stops the
/// task and releases the subscription.
pub struct AuthListener<G: Gateway + ?Sized + 'static> {
    store: Arc<SessionStore<G>>,
    location: Arc<dyn Location>,
    task: Option<JoinHandle<()>>,
}

impl<G: Gateway + ?Sized + 'static> AuthListener<G> {
    /// Listener that only dispatches events handed to [`AuthListener::handle`]
    pub fn new(store: Arc<SessionStore<G>>, location: Arc<dyn Location>) -> Self {
        Self {
            store,
            location,
            task: None,
        }
    }

    /// Subscribe once and dispatch events on a tokio task
    pub fn spawn(store: Arc<SessionStore<G>>, location: Arc<dyn Location>) -> Self {
        let events = store.gateway().subscribe();
        let worker = Self::new(Arc::clone(&store), Arc::clone(&location));
        let task = tokio::spawn(async move { worker.run(events).await });

        Self {
            store,
            location,
            task: Some(task),
        }
    }

    async fn run(self, mut events: broadcast::Receiver<AuthEvent>) {
        debug!("auth listener started");
        loop {
            match events.recv().await {
                Ok(event) => self.handle(event).await,
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "auth listener fell behind, events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!("auth listener stopped");
    }

    /// Apply one event to the store
    pub async fn handle(&self, event: AuthEvent) {
        debug!(event = event.kind.as_str(), "auth event");
        match event.kind {
            AuthEventKind::SignedIn => {
                let Some(user) = event.user().cloned() else {
                    return;
                };
                info!(user_id = %user.id, "signed in elsewhere or via redirect");
                let user_id = user.id.clone();
                self.store.set_user(Some(user));

                let profile = self.store.load_profile(Some(&user_id)).await;
                if !profile.success {
                    warn!(error = profile.error_message(), "could not load profile after sign-in");
                }
                let addresses = self.store.fetch_addresses().await;
                if !addresses.success {
                    warn!(error = addresses.error_message(), "could not load addresses after sign-in");
                }
            }
            AuthEventKind::SignedOut => {
                self.store.clear_session_state();
                self.location.navigate("/");
            }
            AuthEventKind::UserUpdated => {
                // Only refresh a user that is still cached; a reset may have
                // cleared local state before this event arrived
                let Some(user) = event.user().cloned() else {
                    return;
                };
                let cached = self.store.current_user().is_some_and(|u| u.id == user.id);
                if cached {
                    self.store.set_user(Some(user));
                } else {
                    debug!(user_id = %user.id, "user update for uncached user ignored");
                }
            }
            AuthEventKind::TokenRefreshed | AuthEventKind::PasswordRecovery => {}
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the background task
    pub fn shutdown(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl<G: Gateway + ?Sized + 'static> Drop for AuthListener<G> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
