use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::broadcast;

use super::base::{ServiceResult, run};
use crate::auth::{AuthApi, AuthEvent, AuthUser, Session, SignUpOutcome, UserAttributes};
use crate::error::{BackendError, ErrorKind};

const EVENT_CAPACITY: usize = 32;

/// Session and user together, as one call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthState {
    pub session: Option<Session>,
    pub user: Option<AuthUser>,
}

/// Identity operations. Holds no session itself: callers pass the tokens
/// they hold, and every transition is announced on the event channel.
#[derive(Clone)]
pub struct AuthService {
    api: Arc<dyn AuthApi>,
    events: broadcast::Sender<AuthEvent>,
    site_url: Option<String>,
}

fn require(value: &str, what: &str) -> Result<(), BackendError> {
    if value.trim().is_empty() {
        return Err(BackendError::validation(format!("{} is required", what)));
    }
    Ok(())
}

impl AuthService {
    pub fn new(api: Arc<dyn AuthApi>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            api,
            events,
            site_url: None,
        }
    }

    /// Base of the links placed in confirmation and recovery mails.
    pub fn with_site_url(mut self, site_url: impl Into<String>) -> Self {
        self.site_url = Some(site_url.into().trim_end_matches('/').to_string());
        self
    }

    pub fn api(&self) -> &Arc<dyn AuthApi> {
        &self.api
    }

    pub fn on_auth_state_change(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: AuthEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }

    fn redirect(&self, path: &str) -> Option<String> {
        self.site_url.as_ref().map(|base| format!("{}{}", base, path))
    }

    /// The stored session, refreshed when it has expired. A refresh the
    /// backend rejects ends the session.
    pub async fn get_session(&self, stored: Option<Session>) -> ServiceResult<Option<Session>> {
        run("auth.get_session", async {
            let Some(session) = stored else {
                return Ok(None);
            };
            if !session.is_expired(Utc::now()) {
                return Ok(Some(session));
            }
            match self.api.refresh_session(&session.refresh_token).await {
                Ok(fresh) => {
                    self.emit(AuthEvent::TokenRefreshed(fresh.clone()));
                    Ok(Some(fresh))
                }
                Err(e) if matches!(e.kind, ErrorKind::Unauthenticated | ErrorKind::InvalidCredentials) => {
                    tracing::info!("Stored session could not be refreshed: {}", e.message);
                    self.emit(AuthEvent::SignedOut);
                    Ok(None)
                }
                Err(e) => Err(e),
            }
        })
        .await
    }

    pub async fn get_user(&self, access_token: &str) -> ServiceResult<AuthUser> {
        run("auth.get_user", self.api.get_user(access_token)).await
    }

    pub async fn get_auth_state(&self, stored: Option<Session>) -> ServiceResult<AuthState> {
        run("auth.get_auth_state", async {
            let session = self.get_session(stored).await.into_result()?;
            let user = match &session {
                Some(s) => Some(self.api.get_user(&s.access_token).await?),
                None => None,
            };
            Ok(AuthState { session, user })
        })
        .await
    }

    /// Registers the account; the display name goes into the user metadata.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> ServiceResult<SignUpOutcome> {
        run("auth.sign_up", async {
            require(email, "email")?;
            require(password, "password")?;
            let data = match display_name.map(str::trim).filter(|n| !n.is_empty()) {
                Some(name) => json!({ "display_name": name }),
                None => json!({}),
            };
            let redirect = self.redirect("/auth/callback");
            let outcome = self
                .api
                .sign_up(email, password, data, redirect.as_deref())
                .await?;
            if let Some(session) = &outcome.session {
                self.emit(AuthEvent::SignedIn(session.clone()));
            }
            Ok(outcome)
        })
        .await
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> ServiceResult<Session> {
        run("auth.sign_in", async {
            require(email, "email")?;
            require(password, "password")?;
            let session = self.api.sign_in_with_password(email, password).await?;
            self.emit(AuthEvent::SignedIn(session.clone()));
            Ok(session)
        })
        .await
    }

    /// URL that starts a third-party sign-in.
    pub async fn sign_in_with_oauth(&self, provider: &str) -> ServiceResult<String> {
        run("auth.sign_in_with_oauth", async {
            require(provider, "provider")?;
            let redirect = self.redirect("/auth/callback");
            self.api.authorize_url(provider, redirect.as_deref())
        })
        .await
    }

    pub async fn sign_out(&self, access_token: &str) -> ServiceResult<()> {
        run("auth.sign_out", async {
            self.api.sign_out(access_token).await?;
            self.emit(AuthEvent::SignedOut);
            Ok(())
        })
        .await
    }

    pub async fn forgot_password(&self, email: &str) -> ServiceResult<()> {
        run("auth.forgot_password", async {
            require(email, "email")?;
            let redirect = self.redirect("/reset-password");
            self.api.recover(email, redirect.as_deref()).await
        })
        .await
    }

    pub async fn verify_recovery(&self, email: &str, token: &str) -> ServiceResult<Session> {
        run("auth.verify_recovery", async {
            require(email, "email")?;
            require(token, "token")?;
            let session = self.api.verify_recovery(email, token).await?;
            self.emit(AuthEvent::PasswordRecovery(session.clone()));
            Ok(session)
        })
        .await
    }

    pub async fn update_password(&self, access_token: &str, password: &str) -> ServiceResult<AuthUser> {
        run("auth.update_password", async {
            require(password, "password")?;
            let attributes = UserAttributes {
                password: Some(password.to_string()),
                ..Default::default()
            };
            let user = self.api.update_user(access_token, &attributes).await?;
            self.emit(AuthEvent::UserUpdated(user.clone()));
            Ok(user)
        })
        .await
    }

    /// Merges `data` into the user metadata.
    pub async fn update_user_data(&self, access_token: &str, data: Value) -> ServiceResult<AuthUser> {
        run("auth.update_user_data", async {
            if !data.is_object() {
                return Err(BackendError::validation("user data must be an object"));
            }
            let attributes = UserAttributes {
                data: Some(data),
                ..Default::default()
            };
            let user = self.api.update_user(access_token, &attributes).await?;
            self.emit(AuthEvent::UserUpdated(user.clone()));
            Ok(user)
        })
        .await
    }

    pub async fn refresh_session(&self, refresh_token: &str) -> ServiceResult<Session> {
        run("auth.refresh_session", async {
            require(refresh_token, "refresh token")?;
            let session = self.api.refresh_session(refresh_token).await?;
            self.emit(AuthEvent::TokenRefreshed(session.clone()));
            Ok(session)
        })
        .await
    }
}
