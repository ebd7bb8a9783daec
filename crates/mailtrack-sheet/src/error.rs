//! Error types for the mailtrack-sheet reader.

use thiserror::Error;

use crate::HeaderReport;

#[derive(Debug, Error)]
pub enum Error {
  #[error("file has no header row")]
  Empty,

  #[error("missing required headers: {}", .0.missing.join(", "))]
  MissingHeaders(HeaderReport),

  #[error("malformed CSV: {0}")]
  Csv(#[from] csv::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
