//! Identity provider boundary: the hosted auth endpoints behind [`AuthApi`].

pub mod gotrue;
pub mod jwt;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::BackendError;

pub use gotrue::GoTrueAuth;
pub use jwt::{AUDIENCE, Claims, issue_token, verify_token};
pub use memory::MemoryAuth;

/// Sessions this close to expiry are treated as expired.
pub const EXPIRY_MARGIN_SECS: i64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub user_metadata: Value,
    #[serde(default)]
    pub email_confirmed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl AuthUser {
    pub fn display_name(&self) -> Option<&str> {
        self.user_metadata.get("display_name").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "bearer")]
    pub token_type: String,
    pub expires_in: i64,
    /// Unix seconds.
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: AuthUser,
}

fn bearer() -> String {
    "bearer".to_string()
}

impl Session {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(at) => now.timestamp() >= at - EXPIRY_MARGIN_SECS,
            None => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignUpOutcome {
    pub user: AuthUser,
    /// Absent while the address still awaits confirmation.
    pub session: Option<Session>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Session transitions, broadcast by [`crate::services::AuthService`].
#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
    SignedIn(Session),
    SignedOut,
    UserUpdated(AuthUser),
    TokenRefreshed(Session),
    PasswordRecovery(Session),
}

#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        data: Value,
        redirect_to: Option<&str>,
    ) -> Result<SignUpOutcome, BackendError>;

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, BackendError>;

    /// Where to send the browser for a third-party sign-in.
    fn authorize_url(&self, provider: &str, redirect_to: Option<&str>)
    -> Result<String, BackendError>;

    async fn sign_out(&self, access_token: &str) -> Result<(), BackendError>;

    /// Sends the password recovery mail.
    async fn recover(&self, email: &str, redirect_to: Option<&str>) -> Result<(), BackendError>;

    /// Exchanges the one-time recovery token for a session.
    async fn verify_recovery(&self, email: &str, token: &str) -> Result<Session, BackendError>;

    async fn get_user(&self, access_token: &str) -> Result<AuthUser, BackendError>;

    async fn update_user(
        &self,
        access_token: &str,
        attributes: &UserAttributes,
    ) -> Result<AuthUser, BackendError>;

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, BackendError>;
}
