pub mod auth;
pub mod config;
mod error;
mod forms;
pub mod helpers;
mod imaging;
mod media;
mod rate_limit;
mod routes;
mod security;
mod validation;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{
        HeaderValue, Method, StatusCode,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    middleware,
    routing::{get, post},
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{PasswordPolicy, TokenService};
use crate::config::Config;
use crate::media::MediaStore;
use crate::rate_limit::RateLimiters;

pub struct AppState {
    pub db: cellar_db::Database,
    pub tokens: TokenService,
    pub media: MediaStore,
    pub passwords: PasswordPolicy,
}

/// Rate limiting configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Requests per client IP across the whole service
    pub global_max: usize,
    pub global_window: Duration,
    /// Requests per client IP under /api/ (preflight excluded)
    pub api_max: usize,
    pub api_window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            global_max: 100,
            global_window: Duration::from_secs(300),
            api_max: 120,
            api_window: Duration::from_secs(60),
        }
    }
}

impl From<&Config> for RateLimitConfig {
    fn from(config: &Config) -> Self {
        Self {
            global_max: config.rate_limit_global_max,
            global_window: Duration::from_secs(config.rate_limit_global_window_secs),
            api_max: config.rate_limit_api_max,
            api_window: Duration::from_secs(config.rate_limit_api_window_secs),
        }
    }
}

/// Create the application router with the given database and configuration
pub fn create_app(db: cellar_db::Database, config: &Config) -> Router {
    let state = Arc::new(AppState {
        db,
        tokens: TokenService::new(
            &config.jwt_secret,
            config.access_token_lifetime,
            config.refresh_token_lifetime,
        ),
        media: MediaStore::new(config.media_root.clone(), config.media_url.clone()),
        passwords: PasswordPolicy::default(),
    });
    let limiters = Arc::new(RateLimiters::new(&RateLimitConfig::from(config)));

    let api = Router::new()
        .route(
            "/bottles/",
            get(routes::bottles::list).post(routes::bottles::create),
        )
        .route(
            "/bottles/{id}/",
            get(routes::bottles::retrieve)
                .put(routes::bottles::replace)
                .patch(routes::bottles::partial_update)
                .delete(routes::bottles::delete),
        )
        .route("/register/", post(routes::accounts::register))
        .route("/profile/", get(routes::accounts::profile))
        .route("/token/", post(routes::accounts::token))
        .route("/token/refresh/", post(routes::accounts::token_refresh))
        .route("/health/", get(routes::health));

    let media_files = ServeDir::new(&config.media_root);
    let media_path = config.media_url.trim_end_matches('/');
    let router = Router::new().nest("/api", api);
    let router = if media_path.is_empty() {
        router.fallback_service(media_files)
    } else {
        router.nest_service(media_path, media_files)
    };

    router
        // Multipart uploads are bounded by RequestBodyLimitLayer, not axum's 2MB default
        .layer(DefaultBodyLimit::max(config.request_body_limit))
        .layer(RequestBodyLimitLayer::new(config.request_body_limit))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn_with_state(
            limiters,
            rate_limit::rate_limit,
        ))
        // Outside the limiter so 429s still carry CORS headers
        .layer(make_cors_layer(config))
        .layer(middleware::from_fn_with_state(
            security::content_security_policy(config.debug),
            security::security_headers,
        ))
        .with_state(state)
}

fn make_cors_layer(config: &Config) -> CorsLayer {
    if config.cors_allowed_origins.is_empty() {
        return if config.debug {
            CorsLayer::permissive()
        } else {
            CorsLayer::new()
        };
    }

    let origins: Vec<HeaderValue> = config
        .cors_allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true)
}
