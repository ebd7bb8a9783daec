//! Error types for `mailtrack-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown campaign type: {0:?}")]
  UnknownCampaignType(String),

  #[error("unknown response kind: {0:?}")]
  UnknownResponseKind(String),

  #[error("invalid filter: {0}")]
  InvalidFilter(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
