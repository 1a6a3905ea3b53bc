use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use lodge_portal::{
    AppState, app,
    auth::GoTrueAuth,
    backend::{MemoryTables, PgTables, TableClient},
    config::Config,
    services::Services,
    storage::{HttpObjectStore, LocalObjectStore, ObjectStore},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().expect("BACKEND_URL and BACKEND_ANON_KEY must be set");

    #[cfg(debug_assertions)]
    tracing::info!("Running in debug mode with CORS enabled");

    #[cfg(not(debug_assertions))]
    tracing::info!("Running in production mode with CORS disabled");

    let db: Arc<dyn TableClient> = match &config.database_url {
        Some(url) => Arc::new(
            PgTables::connect(url, 10)
                .await
                .expect("Failed to connect to Postgres"),
        ),
        None => {
            tracing::warn!("DATABASE_URL not set, tables are kept in memory");
            Arc::new(MemoryTables::with_portal_schema())
        }
    };

    let redis = config.redis_url.as_ref().map(|url| {
        Arc::new(redis::Client::open(url.as_str()).expect("Failed to create Redis client"))
    });
    if redis.is_none() {
        tracing::warn!("REDIS_URL not set, rate limiting disabled");
    }

    let http = reqwest::Client::new();
    let auth = Arc::new(GoTrueAuth::new(
        http.clone(),
        &config.backend_url,
        &config.backend_anon_key,
    ));

    let objects: Arc<dyn ObjectStore> = match &config.storage_dir {
        Some(dir) => {
            let public_base = format!(
                "http://{}:{}{}/public",
                config.server_host,
                config.server_port,
                config.api_base_uri.trim_end_matches('/')
            );
            tracing::info!("Serving objects from {}", dir);
            Arc::new(LocalObjectStore::new(dir, &public_base))
        }
        None => Arc::new(HttpObjectStore::new(
            http,
            &config.backend_url,
            &config.backend_anon_key,
        )),
    };

    let mut services = Services::new(db, auth, objects);
    if let Some(site_url) = &config.site_url {
        services = services.with_site_url(site_url);
    }

    let addr = SocketAddr::new(
        config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        config.server_port,
    );

    let state = AppState::new(config, services, redis);
    let router = app(state);

    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Failed to start server");
}
