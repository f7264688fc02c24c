//! Error types for the popsync CSV record source.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("cannot open {path}: {source}")]
  Open {
    path:   PathBuf,
    #[source]
    source: csv::Error,
  },

  /// An I/O or encoding failure part-way through the table. Malformed rows
  /// are skipped, not reported through this variant.
  #[error("csv read error at line {line}: {source}")]
  Read {
    line:   u64,
    #[source]
    source: csv::Error,
  },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
