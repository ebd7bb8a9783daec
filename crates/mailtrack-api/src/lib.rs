//! JSON REST API for mailtrack.
//!
//! Exposes an axum [`Router`] backed by any
//! [`mailtrack_core::store::TrackingStore`]. Auth, TLS, and transport concerns
//! are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", mailtrack_api::api_router(store.clone(), classifier))
//! ```

pub mod error;
pub mod import;
pub mod logs;
pub mod opens;
pub mod params;
pub mod subscriptions;

use std::sync::Arc;

use axum::{
  Json, Router,
  routing::{get, post},
};
use mailtrack_core::{response::ResponseClassifier, store::TrackingStore};
use serde::Serialize;
use serde_json::{Value, json};

pub use error::ApiError;
pub use import::run_import;

/// Shared handler state.
pub struct ApiState<S> {
  pub store:      Arc<S>,
  pub classifier: Arc<ResponseClassifier>,
}

impl<S> Clone for ApiState<S> {
  fn clone(&self) -> Self {
    Self {
      store:      Arc::clone(&self.store),
      classifier: Arc::clone(&self.classifier),
    }
  }
}

/// Wrap a success payload in the standard envelope.
pub fn envelope<T: Serialize>(message: &str, data: T) -> Json<Value> {
  Json(json!({ "message": message, "status": "success", "data": data }))
}

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>, classifier: Arc<ResponseClassifier>) -> Router<()>
where
  S: TrackingStore + 'static,
{
  Router::new()
    .route("/import", post(import::handler::<S>))
    .route("/logs", get(logs::list::<S>))
    .route("/opens", get(opens::list::<S>))
    .route("/subscriptions", get(subscriptions::list::<S>))
    .with_state(ApiState { store, classifier })
}

// ─── Integration tests ────────────────────────────────────────────────────────
