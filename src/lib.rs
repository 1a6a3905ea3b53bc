use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, post, put},
};
use config::Config;
use redis::Client as RedisClient;
use services::Services;
#[cfg(debug_assertions)]
use tower_http::cors::CorsLayer;

use middleware::{RateLimiter, auth_middleware, log_errors, rate_limit};

pub mod auth;
pub mod backend;
pub mod config;
pub mod error;
pub mod local_store;
pub mod middleware;
pub mod models;
pub mod realtime;
pub mod result;
pub mod routes;
pub mod services;
pub mod session;
pub mod storage;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub services: Services,
    pub redis: Option<Arc<RedisClient>>,
}

impl AppState {
    pub fn new(config: Config, services: Services, redis: Option<Arc<RedisClient>>) -> Self {
        Self {
            config: Arc::new(config),
            services,
            redis,
        }
    }
}

/// The full HTTP API, nested under the configured base path.
pub fn app(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/sign-up", post(routes::auth::sign_up))
        .route("/auth/sign-in", post(routes::auth::sign_in))
        .route("/auth/oauth/{provider}", get(routes::auth::oauth_url))
        .route("/auth/forgot-password", post(routes::auth::forgot_password))
        .route("/auth/verify-recovery", post(routes::auth::verify_recovery))
        .route("/auth/refresh", post(routes::auth::refresh))
        .route("/public/{bucket}/{*path}", get(routes::files::public_file));

    let protected_routes = Router::new()
        // account
        .route("/auth/sign-out", post(routes::auth::sign_out))
        .route(
            "/auth/user",
            get(routes::auth::current_user).put(routes::auth::update_user_data),
        )
        .route("/auth/password", put(routes::auth::update_password))
        .route(
            "/profile",
            get(routes::profile::get_profile).put(routes::profile::update_profile),
        )
        .route("/profile/lodges", get(routes::profile::my_lodges))
        // lodges and members
        .route(
            "/lodges",
            get(routes::lodges::list_lodges).post(routes::lodges::create_lodge),
        )
        .route(
            "/lodges/{lodge_id}",
            get(routes::lodges::get_lodge)
                .put(routes::lodges::update_lodge)
                .delete(routes::lodges::deactivate_lodge),
        )
        .route("/lodges/{lodge_id}/counts", get(routes::lodges::lodge_counts))
        .route(
            "/lodges/{lodge_id}/members",
            get(routes::lodges::list_members).post(routes::lodges::add_member),
        )
        .route(
            "/lodges/{lodge_id}/members/{membership_id}",
            put(routes::lodges::update_member).delete(routes::lodges::remove_member),
        )
        // tenues and attendance
        .route(
            "/lodges/{lodge_id}/tenues",
            get(routes::tenues::list_tenues).post(routes::tenues::create_tenue),
        )
        .route(
            "/lodges/{lodge_id}/tenues/upcoming",
            get(routes::tenues::upcoming_tenues),
        )
        .route(
            "/tenues/{tenue_id}",
            get(routes::tenues::get_tenue)
                .put(routes::tenues::update_tenue)
                .delete(routes::tenues::delete_tenue),
        )
        .route("/tenues/{tenue_id}/cancel", post(routes::tenues::cancel_tenue))
        .route(
            "/tenues/{tenue_id}/attendance",
            get(routes::tenues::tenue_attendance).put(routes::tenues::set_attendance),
        )
        .route(
            "/tenues/{tenue_id}/attendance/me",
            get(routes::tenues::my_attendance),
        )
        // invitations
        .route(
            "/lodges/{lodge_id}/invitations",
            get(routes::invitations::list_invitations).post(routes::invitations::create_invitation),
        )
        .route(
            "/lodges/{lodge_id}/invitations/{invitation_id}",
            delete(routes::invitations::revoke_invitation),
        )
        .route("/invitations/{code}", get(routes::invitations::check_invitation))
        .route(
            "/invitations/{code}/redeem",
            post(routes::invitations::redeem_invitation),
        )
        // library
        .route(
            "/lodges/{lodge_id}/library/{kind}",
            get(routes::library::list_entries).post(routes::library::create_entry),
        )
        .route(
            "/library/{kind}/{id}",
            get(routes::library::get_entry)
                .put(routes::library::update_entry)
                .delete(routes::library::delete_entry),
        )
        // files
        .route(
            "/files/{bucket}",
            get(routes::files::list_files).post(routes::files::upload_file),
        )
        .route(
            "/files/{bucket}/{*path}",
            get(routes::files::download_file).delete(routes::files::delete_file),
        )
        .route("/files-url/{bucket}/{*path}", get(routes::files::public_url))
        // messaging
        .route("/conversations", get(routes::conversations::list_conversations))
        .route("/conversations/direct", post(routes::conversations::open_direct))
        .route("/conversations/group", post(routes::conversations::create_group))
        .route(
            "/conversations/{conversation_id}/messages",
            get(routes::conversations::list_messages).post(routes::conversations::send_message),
        )
        .route(
            "/conversations/{conversation_id}/read",
            post(routes::conversations::mark_read),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let api = Router::new().merge(public_routes).merge(protected_routes);
    let base = state.config.api_base_uri.trim_end_matches('/');
    let router = if base.is_empty() {
        api
    } else {
        Router::new().nest(base, api)
    };

    let rate_limiter = Arc::new(RateLimiter::new(state.redis.clone(), &state.config));
    let router = router.layer(axum::middleware::from_fn(log_errors)).layer(
        axum::middleware::from_fn_with_state(rate_limiter, rate_limit),
    );

    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding permissive CORS layer for development");
        router.layer(CorsLayer::permissive())
    };

    router.with_state(state)
}
