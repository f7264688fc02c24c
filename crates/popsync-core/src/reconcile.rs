//! The reconciler: drives each record through resolution, disambiguation,
//! change detection, planning and commit, one record at a time.
//!
//! Every collaborator call is awaited before the next one starts; nothing is
//! spawned. The snapshot cache is owned by the run and, after each commit,
//! updated with the planned state so a record seen twice is written once.

use std::{collections::BTreeSet, fmt};

use crate::{
  Error, Result,
  change::is_write_required,
  config::ReconcileConfig,
  disambiguate::{Resolution, disambiguate},
  entity::{Entity, EntityId},
  plan::plan,
  record::Record,
  resolve::{ensure_primed, resolve},
  store::{CommitId, KnowledgeBase, SnapshotCache, WriteExecutor},
};

// ─── Outcomes ────────────────────────────────────────────────────────────────

/// What happened to one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
  /// No knowledge-base entity carries the code.
  NoCandidate,
  /// Candidates exist but none is valid at the reference date.
  NoLiveCandidate,
  /// Several candidates remain valid; left for manual follow-up.
  Ambiguous { remaining: BTreeSet<EntityId> },
  /// The entity already states the population as its preferred fact.
  ChangeNotRequired { entity: EntityId },
  /// A write was required but the commit budget is spent.
  Deferred { entity: EntityId, plan: String },
  Committed {
    entity: EntityId,
    commit: CommitId,
    plan:   String,
  },
  /// A collaborator failed while handling the record. `entity` is set when
  /// disambiguation had already picked one.
  Failed {
    entity: Option<EntityId>,
    error:  String,
  },
}

/// A record's outcome with the context needed to audit it afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOutcome {
  pub code:       String,
  pub label:      Option<String>,
  pub candidates: BTreeSet<EntityId>,
  pub outcome:    Outcome,
}

impl fmt::Display for RecordOutcome {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match &self.label {
      Some(label) => format!("{label} ({})", self.code),
      None => self.code.clone(),
    };
    let candidates = join_ids(&self.candidates);
    match &self.outcome {
      Outcome::NoCandidate => write!(f, "{name}: no entity found"),
      Outcome::NoLiveCandidate => {
        write!(f, "{name}: no candidate valid at the reference date among [{candidates}]")
      }
      Outcome::Ambiguous { remaining } => write!(
        f,
        "{name}: ambiguous, [{}] remain of [{candidates}]",
        join_ids(remaining)
      ),
      Outcome::ChangeNotRequired { entity } => {
        write!(f, "{name}: {entity} already up to date")
      }
      Outcome::Deferred { entity, plan } => {
        write!(f, "{name}: {entity} needs {plan}, deferred (commit budget spent)")
      }
      Outcome::Committed { entity, commit, plan } => {
        write!(f, "{name}: wrote {plan} to {entity} as {commit}")
      }
      Outcome::Failed { entity: Some(entity), error } => {
        write!(f, "{name}: failed on {entity} of [{candidates}]: {error}")
      }
      Outcome::Failed { entity: None, error } => {
        write!(f, "{name}: failed with candidates [{candidates}]: {error}")
      }
    }
  }
}

fn join_ids(ids: &BTreeSet<EntityId>) -> String {
  ids.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

/// Outcomes of a whole run, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
  pub outcomes: Vec<RecordOutcome>,
}

impl RunReport {
  fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
    self.outcomes.iter().filter(|o| pred(&o.outcome)).count()
  }

  pub fn committed(&self) -> usize {
    self.count(|o| matches!(o, Outcome::Committed { .. }))
  }

  pub fn failed(&self) -> usize {
    self.count(|o| matches!(o, Outcome::Failed { .. }))
  }

  pub fn deferred(&self) -> usize {
    self.count(|o| matches!(o, Outcome::Deferred { .. }))
  }

  pub fn skipped(&self) -> usize {
    self.outcomes.len() - self.committed() - self.failed() - self.deferred()
  }
}

// ─── Reconciler ──────────────────────────────────────────────────────────────

pub struct Reconciler<C, K, W> {
  cache:    C,
  remote:   K,
  executor: W,
  config:   ReconcileConfig,
  commits:  usize,
  /// Entities written without their snapshot being updated; refetched
  /// before they are read again.
  stale:    BTreeSet<EntityId>,
}

/// How far a record got before a collaborator failed.
#[derive(Default)]
struct Progress {
  candidates: BTreeSet<EntityId>,
  entity:     Option<EntityId>,
}

impl<C, K, W> Reconciler<C, K, W>
where
  C: SnapshotCache,
  K: KnowledgeBase,
  W: WriteExecutor,
{
  pub fn new(cache: C, remote: K, executor: W, config: ReconcileConfig) -> Self {
    Self {
      cache,
      remote,
      executor,
      config,
      commits: 0,
      stale: BTreeSet::new(),
    }
  }

  pub fn config(&self) -> &ReconcileConfig { &self.config }

  pub fn cache(&self) -> &C { &self.cache }

  pub fn executor(&self) -> &W { &self.executor }

  /// Commits made so far by this reconciler.
  pub fn commits(&self) -> usize { self.commits }

  /// Load the snapshot's code index up front. Optional: the first lookup
  /// primes it otherwise.
  pub async fn prime(&self) -> Result<usize> {
    ensure_primed(&self.cache, &self.remote, &self.config.filter).await
  }

  /// Process every record in order. Failures are recorded and the run moves
  /// on to the next record.
  pub async fn run<I>(&mut self, records: I) -> RunReport
  where
    I: IntoIterator<Item = Record>,
  {
    let mut report = RunReport::default();
    for record in records {
      report.outcomes.push(self.process(&record).await);
    }
    report
  }

  /// Reconcile a single record.
  ///
  /// A collaborator failure, including a failed commit, becomes
  /// [`Outcome::Failed`] with the candidates resolved and the entity chosen
  /// before it happened.
  pub async fn process(&mut self, record: &Record) -> RecordOutcome {
    let mut progress = Progress::default();
    let outcome = match self.reconcile(record, &mut progress).await {
      Ok(outcome) => outcome,
      Err(e) => {
        tracing::error!(
          code = %record.identifying_code,
          candidates = ?progress.candidates,
          entity = ?progress.entity,
          error = %e,
          "record failed"
        );
        Outcome::Failed { entity: progress.entity, error: e.to_string() }
      }
    };
    RecordOutcome {
      code: record.identifying_code.clone(),
      label: record.label.clone(),
      candidates: progress.candidates,
      outcome,
    }
  }

  async fn reconcile(
    &mut self,
    record: &Record,
    progress: &mut Progress,
  ) -> Result<Outcome> {
    let code = record.identifying_code.as_str();
    let name = record.display_name();

    let candidates =
      resolve(&self.cache, &self.remote, &self.config.filter, code).await?;
    progress.candidates = candidates.clone();

    if candidates.is_empty() {
      tracing::info!(%code, "no item found for {name}");
      return Ok(Outcome::NoCandidate);
    }

    let mut entities = Vec::with_capacity(candidates.len());
    for id in &candidates {
      match self.load_entity(*id).await? {
        Some(entity) => entities.push(entity),
        None => tracing::debug!(%code, entity = %id, "candidate no longer exists"),
      }
    }

    let disambiguation =
      disambiguate(&entities, code, record.reference_date, &self.config);
    for step in &disambiguation.steps {
      tracing::debug!(
        %code,
        filter = %step.filter,
        before = step.before,
        dropped = ?step.dropped,
        "disambiguation step"
      );
    }

    let id = match disambiguation.resolution {
      Resolution::Resolved(id) => id,
      Resolution::Empty => {
        tracing::info!(%code, candidates = ?candidates, "no live item for {name}");
        return Ok(Outcome::NoLiveCandidate);
      }
      Resolution::Ambiguous(remaining) => {
        tracing::warn!(
          %code,
          candidates = ?candidates,
          remaining = ?remaining,
          "ambiguous items for {name}, skipping"
        );
        return Ok(Outcome::Ambiguous { remaining });
      }
    };
    progress.entity = Some(id);

    let target = self.config.target_fact(record);
    let vocab = &self.config.vocabulary;
    let existing = self
      .cache
      .get_facts(id, Some(target.property))
      .await
      .map_err(Error::cache)?;

    if !is_write_required(&existing, &target, vocab) {
      tracing::info!(%code, entity = %id, "write not required for {name}");
      return Ok(Outcome::ChangeNotRequired { entity: id });
    }

    let entity = entities
      .iter()
      .find(|e| e.id == id)
      .ok_or(Error::UnknownCandidate(id))?;
    let plan = plan(entity, &target, vocab);
    let description = plan.describe();

    if self.config.max_commits.is_some_and(|max| self.commits >= max) {
      tracing::info!(%code, entity = %id, plan = %description, "commit budget spent, deferring {name}");
      return Ok(Outcome::Deferred { entity: id, plan: description });
    }

    let summary = self.config.summary_for(record);
    tracing::info!(%code, entity = %id, plan = %description, "write to {id} for {name}");
    let commit = self
      .executor
      .commit(id, &plan, &summary)
      .await
      .map_err(|e| Error::Write { entity: id, source: Box::new(e) })?;
    self.commits += 1;

    // The write stands whatever happens to the snapshot from here on.
    match self.cache.put_entity(plan.apply(entity)).await {
      Ok(()) => {
        self.stale.remove(&id);
      }
      Err(e) => {
        tracing::warn!(
          %code,
          entity = %id,
          %commit,
          error = %e,
          "snapshot not updated after commit, {id} will be refetched"
        );
        self.stale.insert(id);
      }
    }

    Ok(Outcome::Committed { entity: id, commit, plan: description })
  }

  /// The entity's facts from the cache when its snapshot is complete and
  /// current, otherwise fetched from the knowledge base and cached.
  async fn load_entity(&mut self, id: EntityId) -> Result<Option<Entity>> {
    if !self.stale.contains(&id)
      && self.cache.is_complete(id).await.map_err(Error::cache)?
    {
      let facts = self.cache.get_facts(id, None).await.map_err(Error::cache)?;
      return Ok(Some(Entity::new(id, facts)));
    }

    let Some(entity) =
      self.remote.fetch_entity(id).await.map_err(Error::remote)?
    else {
      return Ok(None);
    };
    self
      .cache
      .put_entity(entity.clone())
      .await
      .map_err(Error::cache)?;
    self.stale.remove(&id);
    Ok(Some(entity))
  }
}
