use std::env;
use std::time::Duration;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub backend_url: String,
    pub backend_anon_key: String,
    /// Direct Postgres access; without it tables live in memory.
    pub database_url: Option<String>,
    /// Without it the key store is in memory and nothing is rate limited.
    pub redis_url: Option<String>,
    /// HS256 secret of the auth backend; tokens are then verified locally.
    pub backend_jwt_secret: Option<String>,
    /// Serve objects from this directory instead of the hosted storage.
    pub storage_dir: Option<String>,
    pub site_url: Option<String>,
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
    pub rate_limit_window_secs: u64,
    pub rate_limit_requests: u32,
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        dotenv::dotenv().ok();

        Ok(Config {
            backend_url: env::var("BACKEND_URL")?.trim_end_matches('/').to_string(),
            backend_anon_key: env::var("BACKEND_ANON_KEY")?,
            database_url: optional("DATABASE_URL"),
            redis_url: optional("REDIS_URL"),
            backend_jwt_secret: optional("BACKEND_JWT_SECRET"),
            storage_dir: optional("STORAGE_DIR"),
            site_url: optional("SITE_URL"),
            server_host: optional("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            server_port: optional("SERVER_PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            api_base_uri: optional("API_BASE_URI").unwrap_or_else(|| "/api".into()),
            rate_limit_window_secs: optional("RATE_LIMIT_WINDOW")
                .and_then(|w| w.parse().ok())
                .unwrap_or(60),
            rate_limit_requests: optional("RATE_LIMIT_REQUESTS")
                .and_then(|r| r.parse().ok())
                .unwrap_or(100),
        })
    }

    /// Settings for a server on in-memory backends.
    pub fn local(backend_url: &str) -> Self {
        Config {
            backend_url: backend_url.trim_end_matches('/').to_string(),
            backend_anon_key: String::new(),
            database_url: None,
            redis_url: None,
            backend_jwt_secret: None,
            storage_dir: None,
            site_url: None,
            server_host: "127.0.0.1".into(),
            server_port: 3000,
            api_base_uri: "/api".into(),
            rate_limit_window_secs: 60,
            rate_limit_requests: 100,
        }
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }
}
