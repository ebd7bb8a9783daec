//! Error type for `mailtrack-store-sqlite`.

use mailtrack_core::{identity::IdentityKey, store::StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] mailtrack_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// Another writer committed a record with this identity key first.
  #[error("a send-log record with identity key {0} already exists")]
  Conflict(IdentityKey),
}

impl Error {
  pub fn is_conflict(&self) -> bool { matches!(self, Self::Conflict(_)) }

  /// Unwrap a [`DuplicateKey`] raised inside a connection closure.
  pub(crate) fn from_call(err: tokio_rusqlite::Error) -> Self {
    match err {
      tokio_rusqlite::Error::Other(boxed) => match boxed.downcast::<DuplicateKey>() {
        Ok(dup) => Self::Conflict(dup.0),
        Err(other) => Self::Database(tokio_rusqlite::Error::Other(other)),
      },
      other => Self::Database(other),
    }
  }
}

impl StoreError for Error {
  fn conflict_key(&self) -> Option<&IdentityKey> {
    match self {
      Self::Conflict(key) => Some(key),
      _ => None,
    }
  }
}

/// Raised from inside a `Connection::call` closure when an insert trips the
/// identity-key UNIQUE constraint.
#[derive(Debug, Error)]
#[error("duplicate identity key {0}")]
pub(crate) struct DuplicateKey(pub IdentityKey);

pub type Result<T, E = Error> = std::result::Result<T, E>;
