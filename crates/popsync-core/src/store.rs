//! Collaborator traits: the snapshot cache, the remote knowledge base and the
//! write executor.
//!
//! The traits are implemented by other crates (`popsync-store-sqlite`,
//! `popsync-wikibase`). The reconciler depends on these abstractions only.

use std::{collections::BTreeSet, fmt, future::Future, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
  config::BaseFilter,
  entity::{Entity, EntityId, PropertyId},
  fact::Fact,
  plan::Plan,
};

// ─── Snapshot cache ──────────────────────────────────────────────────────────

/// A local materialised view of the entities matching one base filter.
///
/// An implementation is bound to its filter when constructed and holds one
/// snapshot per process run. Entries carry either a code index only (from the
/// bulk priming query) or a complete fact snapshot (after a full fetch); only
/// complete entries can answer fact lookups without a remote call.
///
/// The cache is owned by a single reconciliation run; implementations need
/// not guard against concurrent writers.
pub trait SnapshotCache: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Whether the code index for this run's snapshot has been loaded.
  fn is_primed(
    &self,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Load the code index: `(identifying code, entity)` pairs as returned by
  /// the remote base-filter query. Returns the number of pairs stored.
  fn prime(
    &self,
    index: Vec<(String, EntityId)>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// All entities whose identifying-code fact equals `code` exactly.
  fn lookup_by_code<'a>(
    &'a self,
    code: &'a str,
  ) -> impl Future<Output = Result<BTreeSet<EntityId>, Self::Error>> + Send + 'a;

  /// Whether a complete fact snapshot is held for `id`.
  fn is_complete(
    &self,
    id: EntityId,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Store a complete fact snapshot, replacing any previous one, and
  /// re-index the entity's identifying codes from its facts.
  fn put_entity(
    &self,
    entity: Entity,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Facts held for `id`, optionally restricted to one property, in
  /// statement order. Empty when nothing is held.
  fn get_facts(
    &self,
    id: EntityId,
    property: Option<PropertyId>,
  ) -> impl Future<Output = Result<Vec<Fact>, Self::Error>> + Send + '_;
}

// ─── Remote knowledge base ───────────────────────────────────────────────────

/// Read access to the authoritative knowledge base.
pub trait KnowledgeBase: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Every `(identifying code, entity)` pair matching `filter`.
  fn query_codes<'a>(
    &'a self,
    filter: &'a BaseFilter,
  ) -> impl Future<Output = Result<Vec<(String, EntityId)>, Self::Error>>
  + Send
  + 'a;

  /// Fetch the current facts of `id`. `None` if the entity does not exist
  /// (deleted or redirected).
  fn fetch_entity(
    &self,
    id: EntityId,
  ) -> impl Future<Output = Result<Option<Entity>, Self::Error>> + Send + '_;
}

/// One client can serve as both the knowledge base and the write executor.
impl<T: KnowledgeBase> KnowledgeBase for Arc<T> {
  type Error = T::Error;

  fn query_codes<'a>(
    &'a self,
    filter: &'a BaseFilter,
  ) -> impl Future<Output = Result<Vec<(String, EntityId)>, Self::Error>>
  + Send
  + 'a {
    (**self).query_codes(filter)
  }

  fn fetch_entity(
    &self,
    id: EntityId,
  ) -> impl Future<Output = Result<Option<Entity>, Self::Error>> + Send + '_ {
    (**self).fetch_entity(id)
  }
}

// ─── Write executor ──────────────────────────────────────────────────────────

/// Identifier of a committed edit (a revision id on Wikibase).
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct CommitId(pub u64);

impl fmt::Display for CommitId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "r{}", self.0)
  }
}

/// Commits a planned update. Retry and backoff, if any, are the executor's
/// business; an error returned here is final for the record.
pub trait WriteExecutor: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn commit<'a>(
    &'a self,
    entity: EntityId,
    plan: &'a Plan,
    summary: &'a str,
  ) -> impl Future<Output = Result<CommitId, Self::Error>> + Send + 'a;
}

impl<T: WriteExecutor> WriteExecutor for Arc<T> {
  type Error = T::Error;

  fn commit<'a>(
    &'a self,
    entity: EntityId,
    plan: &'a Plan,
    summary: &'a str,
  ) -> impl Future<Output = Result<CommitId, Self::Error>> + Send + 'a {
    (**self).commit(entity, plan, summary)
  }
}
