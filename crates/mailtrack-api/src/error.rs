//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Every error renders the same envelope as a success, with `status` set to
//! `"error"`: `{"message": .., "status": "error", "data": {..}}`.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use mailtrack_core::store::StoreError;
use serde_json::{Value, json};
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  /// Validation failure. `data` carries the structured detail.
  #[error("bad request: {message}")]
  BadRequest { message: String, data: Value },

  /// Another writer committed the same identity key first.
  #[error("conflict: {0}")]
  Conflict(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  pub fn bad_request(message: impl Into<String>) -> Self {
    Self::BadRequest {
      message: message.into(),
      data:    json!({}),
    }
  }

  pub fn bad_request_with(message: impl Into<String>, data: Value) -> Self {
    Self::BadRequest {
      message: message.into(),
      data,
    }
  }

  /// Classify a store failure as a conflict or an internal error.
  pub fn from_store<E: StoreError>(err: E) -> Self {
    match err.conflict_key() {
      Some(key) => Self::Conflict(format!(
        "a send-log record with identity key {key} was written concurrently; retry the import"
      )),
      None => Self::Store(Box::new(err)),
    }
  }

  pub fn status_code(&self) -> StatusCode {
    match self {
      Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
      Self::Conflict(_) => StatusCode::CONFLICT,
      Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl From<mailtrack_core::Error> for ApiError {
  fn from(err: mailtrack_core::Error) -> Self { Self::bad_request(err.to_string()) }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status_code();
    let (message, data) = match self {
      Self::BadRequest { message, data } => (message, data),
      Self::Conflict(message) => (message, json!({})),
      Self::Store(e) => {
        // Internal detail stays in the log.
        tracing::error!(error = %e, "store failure");
        ("internal error, nothing was changed".to_owned(), json!({}))
      }
    };
    (
      status,
      Json(json!({ "message": message, "status": "error", "data": data })),
    )
      .into_response()
  }
}

#[cfg(test)]
mod tests {
  use mailtrack_core::identity::IdentityKey;
  use mailtrack_store_sqlite::Error as SqliteError;

  use super::*;

  async fn body_of(err: ApiError) -> (StatusCode, Value) {
    let resp = err.into_response();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
  }

  #[tokio::test]
  async fn store_conflict_is_409() {
    let key = IdentityKey::from_stored("ab12");
    let err = ApiError::from_store(SqliteError::Conflict(key));
    assert!(matches!(err, ApiError::Conflict(_)));
    assert_eq!(err.status_code(), StatusCode::CONFLICT);

    let (status, body) = body_of(err).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["status"], "error");
    assert!(body["message"].as_str().unwrap().contains("ab12"));
  }

  #[tokio::test]
  async fn other_store_failure_is_generic_500() {
    let err = ApiError::from_store(SqliteError::DateParse("secret detail".into()));
    assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

    let (status, body) = body_of(err).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "internal error, nothing was changed");
    assert!(!body.to_string().contains("secret detail"));
  }

  #[test]
  fn core_validation_error_is_400() {
    let err = ApiError::from(mailtrack_core::Error::InvalidFilter("bad".into()));
    assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
  }
}
