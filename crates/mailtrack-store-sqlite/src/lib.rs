//! SQLite backend for the mailtrack store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime.

mod encode;
mod filter;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::{KEY_CHUNK_SIZE, SqliteStore};

#[cfg(test)]
mod tests;
