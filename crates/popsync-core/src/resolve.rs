//! Candidate resolution: identifying code → entities claiming it.

use std::collections::BTreeSet;

use crate::{
  Error, Result,
  config::BaseFilter,
  entity::EntityId,
  store::{KnowledgeBase, SnapshotCache},
};

/// Load the cache's code index from the remote store unless it is already
/// loaded. Returns the number of `(code, entity)` pairs fetched, `0` when the
/// snapshot was already primed.
pub async fn ensure_primed<C, K>(
  cache: &C,
  remote: &K,
  filter: &BaseFilter,
) -> Result<usize>
where
  C: SnapshotCache,
  K: KnowledgeBase,
{
  if cache.is_primed().await.map_err(Error::cache)? {
    return Ok(0);
  }

  tracing::info!(
    instance_of = %filter.instance_of,
    country = %filter.country,
    property = %filter.identifying_property,
    "priming snapshot from knowledge base"
  );
  let index = remote.query_codes(filter).await.map_err(Error::remote)?;
  let stored = cache.prime(index).await.map_err(Error::cache)?;
  tracing::info!(pairs = stored, "snapshot primed");
  Ok(stored)
}

/// Entities whose identifying-code fact equals `code` exactly. No
/// normalisation happens here: `"1004"` does not match `"01004"`.
///
/// An empty set means no knowledge-base entity carries the code yet; callers
/// skip the record, it is not an error.
pub async fn resolve<C, K>(
  cache: &C,
  remote: &K,
  filter: &BaseFilter,
  code: &str,
) -> Result<BTreeSet<EntityId>>
where
  C: SnapshotCache,
  K: KnowledgeBase,
{
  ensure_primed(cache, remote, filter).await?;
  cache.lookup_by_code(code).await.map_err(Error::cache)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    config::EntityKind,
    test_helpers::{FakeRemote, MemoryCache, code_fact, entity, qid},
  };

  fn filter() -> BaseFilter { EntityKind::Commune.base_filter() }

  #[tokio::test]
  async fn primes_once_then_reads_from_cache() {
    let cache = MemoryCache::default();
    let remote = FakeRemote::with_entities(vec![
      entity(1, vec![code_fact(374, "01004")]),
      entity(2, vec![code_fact(374, "01005")]),
    ]);

    let found = resolve(&cache, &remote, &filter(), "01004").await.unwrap();
    assert_eq!(found, BTreeSet::from([qid(1)]));

    resolve(&cache, &remote, &filter(), "01005").await.unwrap();
    assert_eq!(remote.code_queries(), 1);
  }

  #[tokio::test]
  async fn unknown_code_is_an_empty_set() {
    let cache = MemoryCache::default();
    let remote = FakeRemote::with_entities(vec![entity(
      1,
      vec![code_fact(374, "01004")],
    )]);
    let found = resolve(&cache, &remote, &filter(), "99999").await.unwrap();
    assert!(found.is_empty());
  }

  #[tokio::test]
  async fn matching_is_exact() {
    let cache = MemoryCache::default();
    let remote = FakeRemote::with_entities(vec![entity(
      1,
      vec![code_fact(374, "01004")],
    )]);
    let found = resolve(&cache, &remote, &filter(), "1004").await.unwrap();
    assert!(found.is_empty());
  }

  #[tokio::test]
  async fn a_code_can_map_to_several_entities() {
    let cache = MemoryCache::default();
    let remote = FakeRemote::with_entities(vec![
      entity(7, vec![code_fact(374, "14712")]),
      entity(3, vec![code_fact(374, "14712")]),
    ]);
    let found = resolve(&cache, &remote, &filter(), "14712").await.unwrap();
    assert_eq!(found, BTreeSet::from([qid(3), qid(7)]));
  }
}
