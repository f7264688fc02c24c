//! Integration tests for `SqliteCache` against in-memory and file databases.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use popsync_core::{
  config::{BaseFilter, EntityKind},
  entity::{Entity, EntityId, PropertyId},
  fact::{Fact, Quantity, Rank, Reference, Snak, Value},
  store::SnapshotCache,
  time::WikiTime,
};

use crate::SqliteCache;

fn communes() -> BaseFilter { EntityKind::Commune.base_filter() }

async fn cache() -> SqliteCache {
  SqliteCache::open_in_memory(communes())
    .await
    .expect("in-memory cache")
}

fn qid(n: u64) -> EntityId { EntityId::new(n) }

fn code(code: &str) -> Fact {
  Fact::new(PropertyId::new(374), Value::String(code.into()))
}

fn population(n: u64, year: i32) -> Fact {
  let mut fact =
    Fact::new(PropertyId::new(1082), Value::Quantity(Quantity::count(n)));
  fact.id = Some(format!("Q90${year}"));
  fact.rank = Rank::Preferred;
  fact.qualifiers.push(Snak::new(
    PropertyId::new(585),
    Value::Time(WikiTime::from_date(
      NaiveDate::from_ymd_opt(year, 1, 1).unwrap(),
    )),
  ));
  fact.references.push(Reference::new(vec![Snak::new(
    PropertyId::new(248),
    Value::Item(qid(1)),
  )]));
  fact
}

// ─── Priming ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn fresh_cache_is_not_primed() {
  let c = cache().await;
  assert!(!c.is_primed().await.unwrap());
  assert!(c.lookup_by_code("01004").await.unwrap().is_empty());
}

#[tokio::test]
async fn prime_loads_the_code_index() {
  let c = cache().await;
  let stored = c
    .prime(vec![
      ("01004".into(), qid(1)),
      ("14712".into(), qid(7)),
      ("14712".into(), qid(3)),
      ("14712".into(), qid(3)),
    ])
    .await
    .unwrap();

  assert_eq!(stored, 3);
  assert!(c.is_primed().await.unwrap());
  assert_eq!(
    c.lookup_by_code("14712").await.unwrap(),
    BTreeSet::from([qid(3), qid(7)])
  );
  // Primed entries are index-only.
  assert!(!c.is_complete(qid(1)).await.unwrap());
  assert!(c.get_facts(qid(1), None).await.unwrap().is_empty());
}

#[tokio::test]
async fn an_empty_index_still_counts_as_primed() {
  let c = cache().await;
  c.prime(Vec::new()).await.unwrap();
  assert!(c.is_primed().await.unwrap());
}

// ─── Entities ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn put_entity_stores_facts_in_order() {
  let c = cache().await;
  let entity = Entity::new(qid(90), vec![
    code("75056"),
    population(2_165_423, 2019),
    population(2_133_111, 2021),
  ]);
  c.put_entity(entity.clone()).await.unwrap();

  assert!(c.is_complete(qid(90)).await.unwrap());
  assert_eq!(c.get_facts(qid(90), None).await.unwrap(), entity.facts);

  let pops = c
    .get_facts(qid(90), Some(PropertyId::new(1082)))
    .await
    .unwrap();
  assert_eq!(pops.len(), 2);
  assert_eq!(pops[1].id.as_deref(), Some("Q90$2021"));
  assert_eq!(pops[1].rank, Rank::Preferred);
}

#[tokio::test]
async fn put_entity_reindexes_codes() {
  let c = cache().await;
  c.prime(vec![("14712".into(), qid(5))]).await.unwrap();

  // The fetched entity no longer carries the primed code.
  c.put_entity(Entity::new(qid(5), vec![code("14799")]))
    .await
    .unwrap();

  assert!(c.lookup_by_code("14712").await.unwrap().is_empty());
  assert_eq!(
    c.lookup_by_code("14799").await.unwrap(),
    BTreeSet::from([qid(5)])
  );
}

#[tokio::test]
async fn put_entity_replaces_the_previous_snapshot() {
  let c = cache().await;
  c.put_entity(Entity::new(qid(90), vec![code("75056"), population(1, 2019)]))
    .await
    .unwrap();
  c.put_entity(Entity::new(qid(90), vec![code("75056")]))
    .await
    .unwrap();

  let facts = c.get_facts(qid(90), None).await.unwrap();
  assert_eq!(facts, vec![code("75056")]);
  assert_eq!(c.complete_entities().await.unwrap(), 1);
}

#[tokio::test]
async fn unknown_entity_has_no_facts() {
  let c = cache().await;
  assert!(!c.is_complete(qid(404)).await.unwrap());
  assert!(c.get_facts(qid(404), None).await.unwrap().is_empty());
}

// ─── Snapshot isolation ──────────────────────────────────────────────────────

#[tokio::test]
async fn reopening_starts_a_fresh_snapshot() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("cache.sqlite");

  let first = SqliteCache::open(&path, communes()).await.unwrap();
  first.prime(vec![("01004".into(), qid(1))]).await.unwrap();
  first
    .put_entity(Entity::new(qid(1), vec![code("01004")]))
    .await
    .unwrap();
  drop(first);

  let second = SqliteCache::open(&path, communes()).await.unwrap();
  assert!(!second.is_primed().await.unwrap());
  assert!(second.lookup_by_code("01004").await.unwrap().is_empty());
  assert!(!second.is_complete(qid(1)).await.unwrap());
}

#[tokio::test]
async fn snapshots_of_other_filters_are_kept_apart() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("cache.sqlite");

  let regions = SqliteCache::open(&path, EntityKind::Region.base_filter())
    .await
    .unwrap();
  regions.prime(vec![("84".into(), qid(18_338))]).await.unwrap();

  let communes = SqliteCache::open(&path, communes()).await.unwrap();
  assert!(communes.lookup_by_code("84").await.unwrap().is_empty());
  assert_ne!(regions.snapshot_id(), communes.snapshot_id());

  // Opening the commune cache did not prune the region snapshot.
  assert_eq!(
    regions.lookup_by_code("84").await.unwrap(),
    BTreeSet::from([qid(18_338)])
  );
}
