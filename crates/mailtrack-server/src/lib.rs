//! HTTP surface of mailtrack.
//!
//! Serves the public tracking endpoints (open pixel, unsubscribe) and mounts
//! the JSON API from `mailtrack-api` under `/api`, behind optional Basic auth.
//! Works with any [`TrackingStore`].

pub mod auth;
pub mod error;
pub mod pixel;
pub mod unsubscribe;

pub use error::Error;

use std::{
  net::SocketAddr,
  path::{Path, PathBuf},
  sync::Arc,
};

use axum::{
  Json, Router,
  extract::ConnectInfo,
  http::{Extensions, HeaderMap},
  middleware,
  routing::get,
};
use mailtrack_core::{
  open_event::DEFAULT_MIN_OPEN_DELAY_SECS, response::ResponseClassifier,
  store::TrackingStore,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;

use auth::{AuthConfig, require_auth};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `MAILTRACK__*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:                String,
  #[serde(default = "default_port")]
  pub port:                u16,
  #[serde(default = "default_store_path")]
  pub store_path:          PathBuf,
  /// Target of the "Cancel" link on the unsubscribe confirmation page.
  #[serde(default = "default_cancel_url")]
  pub cancel_url:          String,
  /// Pixel fetches sooner than this after the send are not recorded.
  #[serde(default = "default_min_open_delay")]
  pub min_open_delay_secs: i64,
  /// `/api` requires Basic auth only when both of these are set.
  #[serde(default)]
  pub auth_username:       Option<String>,
  #[serde(default)]
  pub auth_password_hash:  Option<String>,
  #[serde(default)]
  pub classifier:          ResponseClassifier,
}

fn default_host() -> String { "127.0.0.1".to_owned() }
fn default_port() -> u16 { 5001 }
fn default_store_path() -> PathBuf { PathBuf::from("mailtrack.db") }
fn default_cancel_url() -> String { "/".to_owned() }
fn default_min_open_delay() -> i64 { DEFAULT_MIN_OPEN_DELAY_SECS }

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:                default_host(),
      port:                default_port(),
      store_path:          default_store_path(),
      cancel_url:          default_cancel_url(),
      min_open_delay_secs: default_min_open_delay(),
      auth_username:       None,
      auth_password_hash:  None,
      classifier:          ResponseClassifier::default(),
    }
  }
}

impl ServerConfig {
  pub fn auth(&self) -> Option<AuthConfig> {
    match (&self.auth_username, &self.auth_password_hash) {
      (Some(username), Some(password_hash)) => Some(AuthConfig {
        username:      username.clone(),
        password_hash: password_hash.clone(),
      }),
      _ => None,
    }
  }
}

/// Prefix for environment overrides, e.g. `MAILTRACK__PORT=8080`.
pub const ENV_PREFIX: &str = "MAILTRACK";

/// Keys whose environment values are comma-separated lists.
const ENV_LIST_KEYS: [&str; 3] = [
  "classifier.no_response_markers",
  "classifier.opt_out_phrases",
  "classifier.positive_phrases",
];

/// Environment source for `MAILTRACK__*` overrides. Nested keys use `__`,
/// and the classifier phrase lists are split on commas.
pub fn env_source() -> config::Environment {
  ENV_LIST_KEYS.iter().fold(
    config::Environment::with_prefix(ENV_PREFIX)
      .separator("__")
      .try_parsing(true)
      .list_separator(","),
    |env, key| env.with_list_parse_key(key),
  )
}

/// Read `path` (optional) then `env` into a [`ServerConfig`].
pub fn load_config(
  path: &Path,
  env: config::Environment,
) -> Result<ServerConfig, config::ConfigError> {
  config::Config::builder()
    .add_source(config::File::from(path).required(false))
    .add_source(env)
    .build()?
    .try_deserialize()
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through the tracking handlers.
pub struct AppState<S> {
  pub store:      Arc<S>,
  pub config:     Arc<ServerConfig>,
  pub classifier: Arc<ResponseClassifier>,
  pub auth:       Option<Arc<AuthConfig>>,
}

impl<S> AppState<S> {
  pub fn new(store: Arc<S>, config: ServerConfig) -> Self {
    Self {
      store,
      classifier: Arc::new(config.classifier.clone()),
      auth: config.auth().map(Arc::new),
      config: Arc::new(config),
    }
  }
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      store:      Arc::clone(&self.store),
      config:     Arc::clone(&self.config),
      classifier: Arc::clone(&self.classifier),
      auth:       self.auth.clone(),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the full application router.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: TrackingStore + 'static,
{
  let api = mailtrack_api::api_router(state.store.clone(), state.classifier.clone())
    .layer(middleware::from_fn_with_state(state.auth.clone(), require_auth));

  Router::new()
    .route("/", get(root))
    .route("/track/open.gif", get(pixel::handler::<S>))
    .route(
      "/track/unsub",
      get(unsubscribe::confirm::<S>).post(unsubscribe::commit::<S>),
    )
    .with_state(state)
    .nest("/api", api)
    .layer(TraceLayer::new_for_http())
}

/// `GET /`
async fn root() -> Json<Value> {
  Json(json!({ "service": "mailtrack", "status": "running" }))
}

/// First `X-Forwarded-For` hop, else the peer address when the server was
/// started with connect info.
pub fn client_ip(headers: &HeaderMap, extensions: &Extensions) -> Option<String> {
  let forwarded = headers
    .get("x-forwarded-for")
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.split(',').next())
    .map(str::trim)
    .filter(|s| !s.is_empty());
  if let Some(ip) = forwarded {
    return Some(ip.to_owned());
  }
  extensions
    .get::<ConnectInfo<SocketAddr>>()
    .map(|ConnectInfo(addr)| addr.ip().to_string())
}

// ─── Integration tests ────────────────────────────────────────────────────────
