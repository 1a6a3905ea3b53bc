use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{AuthApi, AuthUser, Session, SignUpOutcome, UserAttributes};
use crate::error::{BackendError, ErrorKind};

/// [`AuthApi`] over the hosted GoTrue endpoints at `<backend>/auth/v1`.
#[derive(Clone)]
pub struct GoTrueAuth {
    client: Client,
    base_url: String,
    anon_key: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error_code: Option<String>,
    error: Option<String>,
    msg: Option<String>,
    message: Option<String>,
    error_description: Option<String>,
}

/// GoTrue's machine-readable code decides the kind; the HTTP status is the fallback.
fn classify(status: u16, body: &str) -> BackendError {
    let parsed: Option<ErrorBody> = serde_json::from_str(body).ok();
    let (code, message) = match &parsed {
        Some(b) => (
            b.error_code.clone().or_else(|| b.error.clone()),
            b.msg
                .clone()
                .or_else(|| b.message.clone())
                .or_else(|| b.error_description.clone())
                .unwrap_or_else(|| body.to_string()),
        ),
        None => (None, body.to_string()),
    };

    let kind = match code.as_deref() {
        Some("invalid_credentials") | Some("invalid_grant") => ErrorKind::InvalidCredentials,
        Some("email_not_confirmed") => ErrorKind::EmailNotConfirmed,
        Some("user_already_exists") | Some("email_exists") => ErrorKind::UserAlreadyRegistered,
        Some("weak_password") => ErrorKind::WeakPassword,
        Some("over_request_rate_limit") | Some("over_email_send_rate_limit") => {
            ErrorKind::RateLimited
        }
        Some("user_not_found") => ErrorKind::NotFound,
        Some("bad_jwt") | Some("session_not_found") | Some("no_authorization")
        | Some("otp_expired") => ErrorKind::Unauthenticated,
        Some("validation_failed") | Some("email_address_invalid") => ErrorKind::Validation,
        _ => return BackendError::from_status(status, message),
    };
    BackendError::new(kind, message)
}

/// Signup answers with a session when confirmation is off, a bare user otherwise.
fn signup_outcome(body: Value) -> Result<SignUpOutcome, BackendError> {
    if body.get("access_token").is_some() {
        let session: Session = serde_json::from_value(body)?;
        return Ok(SignUpOutcome {
            user: session.user.clone(),
            session: Some(session),
        });
    }
    let user = match body.get("user") {
        Some(user) => serde_json::from_value(user.clone())?,
        None => serde_json::from_value(body)?,
    };
    Ok(SignUpOutcome {
        user,
        session: None,
    })
}

impl GoTrueAuth {
    pub fn new(client: Client, backend_url: &str, anon_key: &str) -> Self {
        Self {
            client,
            base_url: format!("{}/auth/v1", backend_url.trim_end_matches('/')),
            anon_key: anon_key.to_string(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str, token: Option<&str>) -> RequestBuilder {
        self.client
            .request(method, format!("{}/{}", self.base_url, path))
            .header("apikey", &self.anon_key)
            .bearer_auth(token.unwrap_or(&self.anon_key))
    }

    async fn check(response: Response) -> Result<Response, BackendError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        tracing::debug!("Auth endpoint answered {}: {}", status, body);
        Err(classify(status.as_u16(), &body))
    }

    async fn send_json<T: for<'de> Deserialize<'de>>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, BackendError> {
        let response = Self::check(request.send().await?).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl AuthApi for GoTrueAuth {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        data: Value,
        redirect_to: Option<&str>,
    ) -> Result<SignUpOutcome, BackendError> {
        let mut request = self
            .request(reqwest::Method::POST, "signup", None)
            .json(&json!({ "email": email, "password": password, "data": data }));
        if let Some(redirect_to) = redirect_to {
            request = request.query(&[("redirect_to", redirect_to)]);
        }
        let body: Value = self.send_json(request).await?;
        signup_outcome(body)
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, BackendError> {
        let request = self
            .request(reqwest::Method::POST, "token", None)
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password }));
        self.send_json(request).await
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
        let url = Url::parse_with_params(&format!("{}/authorize", self.base_url), &params)
            .map_err(|e| BackendError::validation(format!("bad authorize url: {}", e)))?;
        Ok(url.to_string())
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), BackendError> {
        let request = self.request(reqwest::Method::POST, "logout", Some(access_token));
        Self::check(request.send().await?).await?;
        Ok(())
    }

    async fn recover(&self, email: &str, redirect_to: Option<&str>) -> Result<(), BackendError> {
        let mut request = self
            .request(reqwest::Method::POST, "recover", None)
            .json(&json!({ "email": email }));
        if let Some(redirect_to) = redirect_to {
            request = request.query(&[("redirect_to", redirect_to)]);
        }
        Self::check(request.send().await?).await?;
        Ok(())
    }

    async fn verify_recovery(&self, email: &str, token: &str) -> Result<Session, BackendError> {
        let request = self
            .request(reqwest::Method::POST, "verify", None)
            .json(&json!({ "type": "recovery", "email": email, "token": token }));
        self.send_json(request).await
    }

    async fn get_user(&self, access_token: &str) -> Result<AuthUser, BackendError> {
        let request = self.request(reqwest::Method::GET, "user", Some(access_token));
        self.send_json(request).await
    }

    async fn update_user(
        &self,
        access_token: &str,
        attributes: &UserAttributes,
    ) -> Result<AuthUser, BackendError> {
        let request = self
            .request(reqwest::Method::PUT, "user", Some(access_token))
            .json(attributes);
        self.send_json(request).await
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, BackendError> {
        let request = self
            .request(reqwest::Method::POST, "token", None)
            .query(&[("grant_type", "refresh_token")])
            .json(&json!({ "refresh_token": refresh_token }));
        self.send_json(request).await
    }
}
