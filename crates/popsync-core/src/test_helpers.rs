//! Fixtures shared by the unit tests: fact builders and in-memory
//! collaborators.

use std::{
  collections::{BTreeMap, BTreeSet},
  sync::{
    Mutex,
    atomic::{AtomicUsize, Ordering},
  },
};

use chrono::NaiveDate;

use crate::{
  config::{BaseFilter, CENSUS, EntityKind, ReconcileConfig},
  entity::{Entity, EntityId, PropertyId},
  fact::{Fact, Quantity, Rank, Reference, Snak, Value},
  plan::Plan,
  record::Record,
  store::{CommitId, KnowledgeBase, SnapshotCache, WriteExecutor},
  time::{PRECISION_YEAR, WikiTime},
};

/// Source cited by the test configuration (INSEE legal populations).
pub const STATED_IN: EntityId = EntityId::new(110_000_001);

// ─── Builders ────────────────────────────────────────────────────────────────

pub fn qid(n: u64) -> EntityId { EntityId::new(n) }

pub fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
  NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// A day-precision time value.
pub fn time(y: i32, m: u32, d: u32) -> Value {
  Value::Time(WikiTime::from_date(ymd(y, m, d)))
}

/// A year-precision time value with zeroed month and day.
pub fn year_time(y: i32) -> Value {
  let raw = format!("+{y:04}-00-00T00:00:00Z");
  Value::Time(WikiTime::parse(&raw, PRECISION_YEAR).unwrap())
}

pub fn entity(n: u64, facts: Vec<Fact>) -> Entity { Entity::new(qid(n), facts) }

pub fn code_fact(property: u32, code: &str) -> Fact {
  Fact::new(PropertyId::new(property), Value::String(code.to_owned()))
}

/// An instance-of fact for class `Q{class}`.
pub fn class_fact(class: u64, qualifiers: Vec<Snak>) -> Fact {
  let mut f = Fact::new(PropertyId::new(31), Value::Item(qid(class)));
  f.qualifiers = qualifiers;
  f
}

pub fn dissolved_fact(y: i32, m: u32, d: u32) -> Fact {
  Fact::new(PropertyId::new(576), time(y, m, d))
}

/// A population fact as a previous run would have written it.
pub fn population_fact(population: u64, year: i32, rank: Rank) -> Fact {
  let mut f = Fact::new(
    PropertyId::new(1082),
    Value::Quantity(Quantity::count(population)),
  );
  f.rank = rank;
  f.qualifiers = vec![
    Snak::new(PropertyId::new(585), time(year, 1, 1)),
    Snak::new(PropertyId::new(459), Value::Item(CENSUS)),
  ];
  f.references = vec![Reference::new(vec![Snak::new(
    PropertyId::new(248),
    Value::Item(STATED_IN),
  )])];
  f
}

pub fn config(kind: EntityKind) -> ReconcileConfig {
  ReconcileConfig::new(kind.base_filter(), STATED_IN)
}

pub fn record(code: &str, population: u64, year: i32) -> Record {
  Record::new(code, population, ymd(year, 1, 1))
}

pub trait FactExt {
  fn with_id(self, id: &str) -> Fact;
}

impl FactExt for Fact {
  fn with_id(mut self, id: &str) -> Fact {
    self.id = Some(id.to_owned());
    self
  }
}

/// `(code, entity)` pairs for every string fact on `property`.
fn code_pairs<'a>(
  entities: impl IntoIterator<Item = &'a Entity>,
  property: PropertyId,
) -> Vec<(String, EntityId)> {
  entities
    .into_iter()
    .flat_map(|e| {
      e.facts_for(property)
        .filter_map(|f| f.value.as_str())
        .map(move |code| (code.to_owned(), e.id))
    })
    .collect()
}

// ─── MemoryCache ─────────────────────────────────────────────────────────────

#[derive(Default)]
struct CacheState {
  primed:   bool,
  codes:    BTreeMap<String, BTreeSet<EntityId>>,
  entities: BTreeMap<EntityId, Entity>,
}

/// A collaborator that cannot be reached.
#[derive(Debug, thiserror::Error)]
#[error("service unavailable")]
pub struct Unavailable;

/// A snapshot cache bound to the commune filter, held in memory.
pub struct MemoryCache {
  identifying_property: PropertyId,
  state:                Mutex<CacheState>,
  /// Remaining successful `put_entity` calls; unlimited when `None`.
  puts_left:            Mutex<Option<usize>>,
}

impl Default for MemoryCache {
  fn default() -> Self {
    Self {
      identifying_property: EntityKind::Commune
        .base_filter()
        .identifying_property,
      state:                Mutex::default(),
      puts_left:            Mutex::default(),
    }
  }
}

impl MemoryCache {
  /// Let `n` more `put_entity` calls succeed, then fail every later one.
  pub fn fail_puts_after(&self, n: usize) {
    *self.puts_left.lock().unwrap() = Some(n);
  }

  /// Accept writes again.
  pub fn heal(&self) { *self.puts_left.lock().unwrap() = None; }
}

impl SnapshotCache for MemoryCache {
  type Error = Unavailable;

  async fn is_primed(&self) -> Result<bool, Unavailable> {
    Ok(self.state.lock().unwrap().primed)
  }

  async fn prime(
    &self,
    index: Vec<(String, EntityId)>,
  ) -> Result<usize, Unavailable> {
    let mut state = self.state.lock().unwrap();
    let stored = index.len();
    for (code, id) in index {
      state.codes.entry(code).or_default().insert(id);
    }
    state.primed = true;
    Ok(stored)
  }

  async fn lookup_by_code<'a>(
    &'a self,
    code: &'a str,
  ) -> Result<BTreeSet<EntityId>, Unavailable> {
    let state = self.state.lock().unwrap();
    Ok(state.codes.get(code).cloned().unwrap_or_default())
  }

  async fn is_complete(&self, id: EntityId) -> Result<bool, Unavailable> {
    Ok(self.state.lock().unwrap().entities.contains_key(&id))
  }

  async fn put_entity(&self, entity: Entity) -> Result<(), Unavailable> {
    if let Some(left) = self.puts_left.lock().unwrap().as_mut() {
      if *left == 0 {
        return Err(Unavailable);
      }
      *left -= 1;
    }
    let mut state = self.state.lock().unwrap();
    for ids in state.codes.values_mut() {
      ids.remove(&entity.id);
    }
    state.codes.retain(|_, ids| !ids.is_empty());
    for (code, id) in code_pairs([&entity], self.identifying_property) {
      state.codes.entry(code).or_default().insert(id);
    }
    state.entities.insert(entity.id, entity);
    Ok(())
  }

  async fn get_facts(
    &self,
    id: EntityId,
    property: Option<PropertyId>,
  ) -> Result<Vec<Fact>, Unavailable> {
    let state = self.state.lock().unwrap();
    let Some(entity) = state.entities.get(&id) else {
      return Ok(Vec::new());
    };
    Ok(
      entity
        .facts
        .iter()
        .filter(|f| property.is_none_or(|p| f.property == p))
        .cloned()
        .collect(),
    )
  }
}

// ─── FakeRemote ──────────────────────────────────────────────────────────────

/// A knowledge base answering from a fixed entity list.
#[derive(Default)]
pub struct FakeRemote {
  entities:       BTreeMap<EntityId, Entity>,
  gone:           Mutex<BTreeSet<EntityId>>,
  unreachable:    Mutex<BTreeSet<EntityId>>,
  code_queries:   AtomicUsize,
  entity_fetches: AtomicUsize,
}

impl FakeRemote {
  pub fn with_entities(entities: Vec<Entity>) -> Self {
    Self {
      entities: entities.into_iter().map(|e| (e.id, e)).collect(),
      ..Self::default()
    }
  }

  /// Make `id` disappear from entity fetches while keeping it in the code
  /// index, as after a deletion the query service has not caught up with.
  pub fn forget(&self, id: EntityId) { self.gone.lock().unwrap().insert(id); }

  /// Make entity fetches of `id` fail.
  pub fn fail_fetch_for(&self, id: EntityId) {
    self.unreachable.lock().unwrap().insert(id);
  }

  pub fn code_queries(&self) -> usize {
    self.code_queries.load(Ordering::SeqCst)
  }

  pub fn entity_fetches(&self) -> usize {
    self.entity_fetches.load(Ordering::SeqCst)
  }
}

impl KnowledgeBase for FakeRemote {
  type Error = Unavailable;

  async fn query_codes<'a>(
    &'a self,
    filter: &'a BaseFilter,
  ) -> Result<Vec<(String, EntityId)>, Unavailable> {
    self.code_queries.fetch_add(1, Ordering::SeqCst);
    Ok(code_pairs(self.entities.values(), filter.identifying_property))
  }

  async fn fetch_entity(
    &self,
    id: EntityId,
  ) -> Result<Option<Entity>, Unavailable> {
    self.entity_fetches.fetch_add(1, Ordering::SeqCst);
    if self.unreachable.lock().unwrap().contains(&id) {
      return Err(Unavailable);
    }
    if self.gone.lock().unwrap().contains(&id) {
      return Ok(None);
    }
    Ok(self.entities.get(&id).cloned())
  }
}

// ─── RecordingExecutor ───────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
#[error("edit rejected")]
pub struct Rejected;

/// Records every commit; rejects commits to entities marked with
/// [`RecordingExecutor::fail_for`].
#[derive(Default)]
pub struct RecordingExecutor {
  commits: Mutex<Vec<(EntityId, Plan, String)>>,
  failing: Mutex<BTreeSet<EntityId>>,
}

impl RecordingExecutor {
  pub fn fail_for(&self, id: EntityId) {
    self.failing.lock().unwrap().insert(id);
  }

  pub fn commits(&self) -> Vec<(EntityId, Plan, String)> {
    self.commits.lock().unwrap().clone()
  }
}

impl WriteExecutor for RecordingExecutor {
  type Error = Rejected;

  async fn commit<'a>(
    &'a self,
    entity: EntityId,
    plan: &'a Plan,
    summary: &'a str,
  ) -> Result<CommitId, Rejected> {
    if self.failing.lock().unwrap().contains(&entity) {
      return Err(Rejected);
    }
    let mut commits = self.commits.lock().unwrap();
    commits.push((entity, plan.clone(), summary.to_owned()));
    Ok(CommitId(commits.len() as u64))
  }
}
