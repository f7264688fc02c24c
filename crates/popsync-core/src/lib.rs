//! Core types, trait definitions and reconciliation algorithms for popsync.
//!
//! This crate is deliberately free of HTTP and database dependencies. The
//! snapshot cache, the remote knowledge base and the write executor are
//! reached only through the traits in [`store`]; all other crates depend on
//! this one.

pub mod change;
pub mod config;
pub mod disambiguate;
pub mod entity;
pub mod error;
pub mod fact;
pub mod plan;
pub mod reconcile;
pub mod record;
pub mod resolve;
pub mod store;
pub mod time;

pub use error::{Error, Result};

#[cfg(test)]
pub(crate) mod test_helpers;
