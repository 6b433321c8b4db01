use std::env::var;
use std::path::PathBuf;
use std::time::Duration;

use dotenvy::dotenv;

/// Fallback signing key, only accepted in debug mode
const DEBUG_JWT_SECRET: &str = "cellar-insecure-debug-secret";

/// Application configuration with environment variable overrides
#[derive(Debug, Clone)]
pub struct Config {
    /// Request body size limit in bytes
    /// Env: REQUEST_BODY_LIMIT (default: 10485760 = 10MB)
    /// Must stay above the 5MB image limit so oversized images get a field error
    pub request_body_limit: usize,

    /// Request timeout in seconds
    /// Env: REQUEST_TIMEOUT_SECS (default: 30)
    pub request_timeout: Duration,

    /// Server port
    /// Env: PORT (default: 8000)
    pub port: u16,

    /// Database file path
    /// Env: DATABASE_PATH (default: "cellar.db")
    pub database_path: String,

    /// Debug mode: permissive CSP and CORS, insecure JWT fallback secret
    /// Env: DEBUG (default: false)
    pub debug: bool,

    /// HMAC secret used to sign JWTs
    /// Env: JWT_SECRET (required unless DEBUG=true)
    pub jwt_secret: String,

    /// Access token lifetime
    /// Env: ACCESS_TOKEN_LIFETIME_SECS (default: 300)
    pub access_token_lifetime: Duration,

    /// Refresh token lifetime
    /// Env: REFRESH_TOKEN_LIFETIME_SECS (default: 86400)
    pub refresh_token_lifetime: Duration,

    /// Directory uploaded media is written to
    /// Env: MEDIA_ROOT (default: "media")
    pub media_root: PathBuf,

    /// URL prefix media is served under
    /// Env: MEDIA_URL (default: "/media/")
    pub media_url: String,

    /// Allowed CORS origins, comma separated
    /// Env: CORS_ALLOWED_ORIGINS (default: empty)
    pub cors_allowed_origins: Vec<String>,

    /// Requests allowed per client IP in the global window
    /// Env: RATE_LIMIT_GLOBAL_MAX (default: 100)
    pub rate_limit_global_max: usize,

    /// Global window length in seconds
    /// Env: RATE_LIMIT_GLOBAL_WINDOW_SECS (default: 300)
    pub rate_limit_global_window_secs: u64,

    /// Requests allowed per client IP under /api/
    /// Env: RATE_LIMIT_API_MAX (default: 120)
    pub rate_limit_api_max: usize,

    /// API window length in seconds
    /// Env: RATE_LIMIT_API_WINDOW_SECS (default: 60)
    pub rate_limit_api_window_secs: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("JWT_SECRET environment variable is required when DEBUG is not enabled")]
    MissingJwtSecret,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenv(); //for local development mostly
        let debug = env_flag("DEBUG", false);

        let jwt_secret = match var("JWT_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            _ if debug => {
                tracing::warn!("JWT_SECRET not set, using insecure debug secret");
                DEBUG_JWT_SECRET.to_string()
            }
            _ => return Err(ConfigError::MissingJwtSecret),
        };

        Ok(Self {
            request_body_limit: env_or_default("REQUEST_BODY_LIMIT", 10 * 1024 * 1024),
            request_timeout: Duration::from_secs(env_or_default("REQUEST_TIMEOUT_SECS", 30)),
            port: env_or_default("PORT", 8000),
            database_path: env_or_default_string("DATABASE_PATH", "cellar.db"),
            debug,
            jwt_secret,
            access_token_lifetime: Duration::from_secs(env_or_default(
                "ACCESS_TOKEN_LIFETIME_SECS",
                300,
            )),
            refresh_token_lifetime: Duration::from_secs(env_or_default(
                "REFRESH_TOKEN_LIFETIME_SECS",
                86_400,
            )),
            media_root: PathBuf::from(env_or_default_string("MEDIA_ROOT", "media")),
            media_url: normalize_media_url(&env_or_default_string("MEDIA_URL", "/media/")),
            cors_allowed_origins: parse_list(&env_or_default_string("CORS_ALLOWED_ORIGINS", "")),
            rate_limit_global_max: env_or_default("RATE_LIMIT_GLOBAL_MAX", 100),
            rate_limit_global_window_secs: env_or_default("RATE_LIMIT_GLOBAL_WINDOW_SECS", 300),
            rate_limit_api_max: env_or_default("RATE_LIMIT_API_MAX", 120),
            rate_limit_api_window_secs: env_or_default("RATE_LIMIT_API_WINDOW_SECS", 60),
        })
    }

    /// Create configuration with all default values (debug secret, debug off)
    pub fn default() -> Self {
        Self {
            request_body_limit: 10 * 1024 * 1024, // 10 MB
            request_timeout: Duration::from_secs(30),
            port: 8000,
            database_path: "cellar.db".to_string(),
            debug: false,
            jwt_secret: DEBUG_JWT_SECRET.to_string(),
            access_token_lifetime: Duration::from_secs(300),
            refresh_token_lifetime: Duration::from_secs(86_400),
            media_root: PathBuf::from("media"),
            media_url: "/media/".to_string(),
            cors_allowed_origins: Vec::new(),
            rate_limit_global_max: 100,
            rate_limit_global_window_secs: 300,
            rate_limit_api_max: 120,
            rate_limit_api_window_secs: 60,
        }
    }
}

/// Parse environment variable or return default value
fn env_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    var(key)
        .ok()
        .and_then(|val| val.parse().ok())
        .unwrap_or(default)
}

/// Parse environment variable string or return default value
fn env_or_default_string(key: &str, default: &str) -> String {
    var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse a boolean flag ("1", "true", "yes", "on")
fn env_flag(key: &str, default: bool) -> bool {
    var(key)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Media URL always starts and ends with a slash
fn normalize_media_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}/")
    }
}
