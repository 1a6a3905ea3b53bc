use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use reqwest::Url;
use serde_json::Value;
use uuid::Uuid;

use super::jwt::{issue_token, verify_token};
use super::{AuthApi, AuthUser, Session, SignUpOutcome, UserAttributes};
use crate::error::{BackendError, ErrorKind};

const MIN_PASSWORD_LEN: usize = 6;
const HASH_COST: u32 = 4;

struct Account {
    user: AuthUser,
    password_hash: String,
}

#[derive(Default)]
struct Inner {
    /// Keyed by lowercased email.
    accounts: HashMap<String, Account>,
    access_tokens: HashMap<String, Uuid>,
    refresh_tokens: HashMap<String, Uuid>,
    recovery_tokens: HashMap<String, String>,
}

impl Inner {
    fn account_by_id(&mut self, id: Uuid) -> Option<&mut Account> {
        self.accounts.values_mut().find(|a| a.user.id == id)
    }
}

/// In-process identity provider with the hosted one's observable behavior.
/// Access tokens are real HS256 tokens signed with the configured secret.
pub struct MemoryAuth {
    inner: Mutex<Inner>,
    secret: String,
    autoconfirm: bool,
    token_ttl_secs: i64,
}

impl Default for MemoryAuth {
    fn default() -> Self {
        Self::new()
    }
}

fn hash_password(password: &str) -> Result<String, BackendError> {
    bcrypt::hash(password.as_bytes(), HASH_COST)
        .map_err(|e| BackendError::internal(format!("failed to hash password: {}", e)))
}

fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password.as_bytes(), hash).unwrap_or(false)
}

fn check_password(password: &str) -> Result<(), BackendError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(BackendError::new(
            ErrorKind::WeakPassword,
            format!("Password should be at least {} characters", MIN_PASSWORD_LEN),
        ));
    }
    Ok(())
}

fn check_email(email: &str) -> Result<String, BackendError> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(BackendError::validation(format!(
            "Unable to validate email address: {}",
            email
        ))),
    }
}

fn merge_metadata(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (k, v) in patch {
                target.insert(k.clone(), v.clone());
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

impl MemoryAuth {
    pub fn new() -> Self {
        Self::with_secret("memory-auth-secret")
    }

    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            secret: secret.into(),
            autoconfirm: true,
            token_ttl_secs: 3600,
        }
    }

    /// New accounts must call [`MemoryAuth::confirm_email`] before signing in.
    pub fn requiring_confirmation(mut self) -> Self {
        self.autoconfirm = false;
        self
    }

    pub fn with_token_ttl(mut self, secs: i64) -> Self {
        self.token_ttl_secs = secs;
        self
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn confirm_email(&self, email: &str) -> bool {
        let mut inner = self.inner.lock();
        match inner.accounts.get_mut(&email.trim().to_lowercase()) {
            Some(account) => {
                account.user.email_confirmed_at = Some(Utc::now());
                true
            }
            None => false,
        }
    }

    /// The token a recovery mail would carry.
    pub fn recovery_token(&self, email: &str) -> Option<String> {
        self.inner
            .lock()
            .recovery_tokens
            .get(&email.trim().to_lowercase())
            .cloned()
    }

    fn issue_session(&self, inner: &mut Inner, user: AuthUser) -> Result<Session, BackendError> {
        let (access_token, expires_at) = issue_token(
            user.id,
            user.email.as_deref(),
            &self.secret,
            self.token_ttl_secs,
        )?;
        let refresh_token = Uuid::new_v4().simple().to_string();
        inner.access_tokens.insert(access_token.clone(), user.id);
        inner.refresh_tokens.insert(refresh_token.clone(), user.id);
        Ok(Session {
            access_token,
            refresh_token,
            token_type: "bearer".to_string(),
            expires_in: self.token_ttl_secs,
            expires_at: Some(expires_at),
            user,
        })
    }

    fn user_for_token(&self, inner: &Inner, access_token: &str) -> Result<Uuid, BackendError> {
        let claims = verify_token(access_token, &self.secret)?;
        match inner.access_tokens.get(access_token) {
            Some(id) if *id == claims.sub => Ok(*id),
            _ => Err(BackendError::unauthenticated("session not found")),
        }
    }
}

#[async_trait]
impl AuthApi for MemoryAuth {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        data: Value,
        _redirect_to: Option<&str>,
    ) -> Result<SignUpOutcome, BackendError> {
        let email = check_email(email)?;
        check_password(password)?;
        let password_hash = hash_password(password)?;

        let mut inner = self.inner.lock();
        if inner.accounts.contains_key(&email) {
            return Err(BackendError::new(
                ErrorKind::UserAlreadyRegistered,
                "User already registered",
            ));
        }

        let now = Utc::now();
        let user = AuthUser {
            id: Uuid::new_v4(),
            email: Some(email.clone()),
            phone: None,
            user_metadata: if data.is_null() {
                Value::Object(Default::default())
            } else {
                data
            },
            email_confirmed_at: self.autoconfirm.then_some(now),
            created_at: Some(now),
            updated_at: Some(now),
        };
        inner.accounts.insert(
            email,
            Account {
                user: user.clone(),
                password_hash,
            },
        );

        let session = if self.autoconfirm {
            Some(self.issue_session(&mut inner, user.clone())?)
        } else {
            None
        };
        Ok(SignUpOutcome { user, session })
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, BackendError> {
        let mut inner = self.inner.lock();
        let user = match inner.accounts.get(&email.trim().to_lowercase()) {
            Some(account) if verify_password(password, &account.password_hash) => {
                account.user.clone()
            }
            _ => {
                return Err(BackendError::new(
                    ErrorKind::InvalidCredentials,
                    "Invalid login credentials",
                ));
            }
        };
        if user.email_confirmed_at.is_none() {
            return Err(BackendError::new(
                ErrorKind::EmailNotConfirmed,
                "Email not confirmed",
            ));
        }
        self.issue_session(&mut inner, user)
    }

    fn authorize_url(
        &self,
        provider: &str,
        redirect_to: Option<&str>,
    ) -> Result<String, BackendError> {
        let mut params = vec![("provider", provider)];
        if let Some(redirect_to) = redirect_to {
            params.push(("redirect_to", redirect_to));
        }
        Url::parse_with_params("memory://auth/authorize", &params)
            .map(|url| url.to_string())
            .map_err(|e| BackendError::validation(e.to_string()))
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), BackendError> {
        let mut inner = self.inner.lock();
        let id = self.user_for_token(&inner, access_token)?;
        inner.access_tokens.retain(|_, user| *user != id);
        inner.refresh_tokens.retain(|_, user| *user != id);
        Ok(())
    }

    async fn recover(&self, email: &str, _redirect_to: Option<&str>) -> Result<(), BackendError> {
        let email = check_email(email)?;
        let mut inner = self.inner.lock();
        // Unknown addresses succeed silently, like the hosted endpoint.
        if inner.accounts.contains_key(&email) {
            let token = Uuid::new_v4().simple().to_string()[..6].to_string();
            inner.recovery_tokens.insert(email, token);
        }
        Ok(())
    }

    async fn verify_recovery(&self, email: &str, token: &str) -> Result<Session, BackendError> {
        let email = email.trim().to_lowercase();
        let mut inner = self.inner.lock();
        match inner.recovery_tokens.get(&email) {
            Some(expected) if expected == token => {}
            _ => {
                return Err(BackendError::unauthenticated(
                    "Token has expired or is invalid",
                ));
            }
        }
        inner.recovery_tokens.remove(&email);
        let user = match inner.accounts.get_mut(&email) {
            Some(account) => {
                account
                    .user
                    .email_confirmed_at
                    .get_or_insert_with(Utc::now);
                account.user.clone()
            }
            None => return Err(BackendError::not_found("User not found")),
        };
        self.issue_session(&mut inner, user)
    }

    async fn get_user(&self, access_token: &str) -> Result<AuthUser, BackendError> {
        let mut inner = self.inner.lock();
        let id = self.user_for_token(&inner, access_token)?;
        inner
            .account_by_id(id)
            .map(|a| a.user.clone())
            .ok_or_else(|| BackendError::not_found("User not found"))
    }

    async fn update_user(
        &self,
        access_token: &str,
        attributes: &UserAttributes,
    ) -> Result<AuthUser, BackendError> {
        if let Some(password) = &attributes.password {
            check_password(password)?;
        }
        let new_email = attributes.email.as_deref().map(check_email).transpose()?;
        let password_hash = attributes
            .password
            .as_deref()
            .map(hash_password)
            .transpose()?;

        let mut inner = self.inner.lock();
        let id = self.user_for_token(&inner, access_token)?;
        if let Some(email) = &new_email {
            if inner
                .accounts
                .get(email)
                .is_some_and(|account| account.user.id != id)
            {
                return Err(BackendError::new(
                    ErrorKind::UserAlreadyRegistered,
                    "A user with this email address has already been registered",
                ));
            }
        }

        let old_key = inner
            .accounts
            .iter()
            .find(|(_, a)| a.user.id == id)
            .map(|(k, _)| k.clone())
            .ok_or_else(|| BackendError::not_found("User not found"))?;
        let mut account = inner
            .accounts
            .remove(&old_key)
            .ok_or_else(|| BackendError::not_found("User not found"))?;

        if let Some(hash) = password_hash {
            account.password_hash = hash;
        }
        if let Some(data) = &attributes.data {
            merge_metadata(&mut account.user.user_metadata, data);
        }
        let key = match new_email {
            Some(email) => {
                account.user.email = Some(email.clone());
                email
            }
            None => old_key,
        };
        account.user.updated_at = Some(Utc::now());
        let user = account.user.clone();
        inner.accounts.insert(key, account);
        Ok(user)
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, BackendError> {
        let mut inner = self.inner.lock();
        let id = inner
            .refresh_tokens
            .remove(refresh_token)
            .ok_or_else(|| BackendError::unauthenticated("Invalid Refresh Token"))?;
        let user = inner
            .account_by_id(id)
            .map(|a| a.user.clone())
            .ok_or_else(|| BackendError::not_found("User not found"))?;
        self.issue_session(&mut inner, user)
    }
}
