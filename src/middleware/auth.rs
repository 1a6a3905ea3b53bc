use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use uuid::Uuid;

use crate::{
    AppState,
    auth::verify_token,
    error::{BackendError, ErrorKind},
    result::{error_code, error_to_api_response},
};

/// The caller of a protected route.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub email: Option<String>,
    /// Forwarded to the auth backend for calls made on the caller's behalf.
    pub access_token: String,
}

async fn authenticate(state: &AppState, token: &str) -> Result<AuthContext, BackendError> {
    match &state.config.backend_jwt_secret {
        Some(secret) => {
            let claims = verify_token(token, secret)?;
            Ok(AuthContext {
                user_id: claims.sub,
                email: claims.email,
                access_token: token.to_string(),
            })
        }
        None => {
            let user = state.services.auth.get_user(token).await.into_result()?;
            Ok(AuthContext {
                user_id: user.id,
                email: user.email,
                access_token: token.to_string(),
            })
        }
    }
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let Some(TypedHeader(authorization)) = bearer else {
        return (
            StatusCode::UNAUTHORIZED,
            error_to_api_response::<()>(
                error_code(ErrorKind::Unauthenticated),
                "missing bearer token".to_string(),
            ),
        )
            .into_response();
    };

    match authenticate(&state, authorization.token()).await {
        Ok(context) => {
            tracing::debug!("Authenticated request for {}", context.user_id);
            req.extensions_mut().insert(context);
            next.run(req).await
        }
        Err(e) => {
            tracing::info!("Rejected bearer token: {}", e.message);
            let status = match e.kind {
                ErrorKind::Network => StatusCode::BAD_GATEWAY,
                ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::UNAUTHORIZED,
            };
            (status, error_to_api_response::<()>(error_code(e.kind), e.message)).into_response()
        }
    }
}
