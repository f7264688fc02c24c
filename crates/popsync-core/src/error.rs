//! Error types for `popsync-core`.

use thiserror::Error;

use crate::entity::EntityId;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid entity id: {0:?}")]
  InvalidEntityId(String),

  #[error("invalid property id: {0:?}")]
  InvalidPropertyId(String),

  #[error("invalid time value: {0:?}")]
  InvalidTime(String),

  #[error("snapshot cache error: {0}")]
  Cache(#[source] BoxError),

  #[error("knowledge base error: {0}")]
  Remote(#[source] BoxError),

  #[error("write to {entity} failed: {source}")]
  Write {
    entity: EntityId,
    #[source]
    source: BoxError,
  },

  #[error("resolved entity {0} is not among the loaded candidates")]
  UnknownCandidate(EntityId),
}

impl Error {
  pub(crate) fn cache<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Cache(Box::new(e))
  }

  pub(crate) fn remote<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Remote(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
