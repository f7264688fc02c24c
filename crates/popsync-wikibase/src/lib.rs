//! Wikibase collaborators for popsync.
//!
//! [`WikibaseClient`] is both the remote knowledge base (SPARQL snapshot
//! priming and `wbgetentities` fetches) and the write executor (bot login,
//! CSRF token, `wbeditentity` commits with `maxlag` and bounded retry).

mod client;
mod config;
mod sparql;

pub mod error;
pub mod wire;

pub use client::WikibaseClient;
pub use config::WikibaseConfig;
pub use error::{Error, Result};
