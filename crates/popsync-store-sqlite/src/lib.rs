//! SQLite backend for the popsync snapshot cache.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime.

mod cache;
mod encode;
mod schema;

pub mod error;

pub use cache::SqliteCache;
pub use error::{Error, Result};

#[cfg(test)]
mod tests;
