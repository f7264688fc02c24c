//! Temporal disambiguation: narrow the entities claiming a code to the one
//! that is live at the record's reference date.
//!
//! Pipeline:
//!   candidates
//!     └─ dissolution filter        → early exit on a single survivor
//!          └─ classification filter → early exit on a single survivor
//!               └─ identifying-code filter (+ preferred pick)
//!                    └─ resolution
//!
//! Each filter builds a new working set from the previous one; the input is
//! never mutated and the working set never grows.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use strum::Display;

use crate::{
  config::ReconcileConfig,
  entity::{Entity, EntityId},
  fact::{Fact, Value},
};

// ─── Outcome ─────────────────────────────────────────────────────────────────

/// Result of disambiguation. Neither `Ambiguous` nor `Empty` is an error; the
/// record is skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
  /// Exactly one entity is valid at the reference date.
  Resolved(EntityId),
  /// Several entities survived every filter; never guessed between.
  Ambiguous(BTreeSet<EntityId>),
  /// No candidate is valid at the reference date.
  Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Filter {
  Dissolution,
  Classification,
  IdentifyingCode,
}

/// One executed filter: how many candidates went in and which were dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
  pub filter:  Filter,
  pub before:  usize,
  pub dropped: Vec<EntityId>,
}

impl Step {
  pub fn after(&self) -> usize { self.before - self.dropped.len() }
}

/// The resolution together with the trace of filters that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disambiguation {
  pub resolution: Resolution,
  pub steps:      Vec<Step>,
}

// ─── Working set ─────────────────────────────────────────────────────────────

type Working<'a> = BTreeMap<EntityId, &'a Entity>;

/// Keep the entries of `working` that satisfy `keep`, recording the step.
fn narrow<'a>(
  working: &Working<'a>,
  filter: Filter,
  steps: &mut Vec<Step>,
  keep: impl Fn(&Entity) -> bool,
) -> Working<'a> {
  let (kept, dropped): (Working<'a>, Working<'a>) =
    working.iter().map(|(id, e)| (*id, *e)).partition(|&(_, e)| keep(e));

  steps.push(Step {
    filter,
    before: working.len(),
    dropped: dropped.into_keys().collect(),
  });
  kept
}

fn single(working: &Working<'_>) -> Option<EntityId> {
  match working.len() {
    1 => working.keys().next().copied(),
    _ => None,
  }
}

// ─── Filters ─────────────────────────────────────────────────────────────────

/// Dissolved strictly before `date`. An undated dissolution ("some value")
/// does not count.
fn dissolved_before(
  entity: &Entity,
  date: NaiveDate,
  config: &ReconcileConfig,
) -> bool {
  entity
    .facts_for(config.vocabulary.dissolved)
    .filter_map(|f| f.value.as_time())
    .any(|t| t.date() < date)
}

/// The entity's classification facts for the filter's class: not yet valid
/// (start on or after `date`) or ended (any end time at all).
fn classification_excludes(
  entity: &Entity,
  date: NaiveDate,
  config: &ReconcileConfig,
) -> bool {
  let vocab = &config.vocabulary;
  let class = Value::Item(config.filter.instance_of);

  entity
    .facts_for(vocab.instance_of)
    .filter(|f| f.value == class)
    .any(|f| {
      let not_yet_valid = f
        .time_qualifier(vocab.start_time)
        .is_some_and(|start| start.date() >= date);
      not_yet_valid || f.has_qualifier(vocab.end_time)
    })
}

/// The identifying-code facts of `entity` whose value is `code`.
fn code_facts<'e>(
  entity: &'e Entity,
  code: &'e str,
  config: &'e ReconcileConfig,
) -> impl Iterator<Item = &'e Fact> + 'e {
  entity
    .facts_for(config.filter.identifying_property)
    .filter(move |f| f.value.as_str() == Some(code))
}

/// A code fact for `code` starting on or after `date`, with no end time.
fn starts_code_on_or_after(
  entity: &Entity,
  code: &str,
  date: NaiveDate,
  config: &ReconcileConfig,
) -> bool {
  let vocab = &config.vocabulary;
  code_facts(entity, code, config).any(|f| {
    !f.has_qualifier(vocab.end_time)
      && f
        .time_qualifier(vocab.start_time)
        .is_some_and(|start| start.date() >= date)
  })
}

// ─── Pipeline ────────────────────────────────────────────────────────────────

/// Narrow `candidates` (the entities claiming `code`) to at most one that is
/// valid at `reference_date`.
///
/// When several candidates carry a code fact starting on or after the
/// reference date, the smallest entity id wins.
pub fn disambiguate(
  candidates: &[Entity],
  code: &str,
  reference_date: NaiveDate,
  config: &ReconcileConfig,
) -> Disambiguation {
  let mut steps = Vec::new();
  let initial: Working<'_> = candidates.iter().map(|e| (e.id, e)).collect();

  let working = narrow(&initial, Filter::Dissolution, &mut steps, |e| {
    !dissolved_before(e, reference_date, config)
  });
  if let Some(id) = single(&working) {
    return Disambiguation { resolution: Resolution::Resolved(id), steps };
  }

  let working = narrow(&working, Filter::Classification, &mut steps, |e| {
    !classification_excludes(e, reference_date, config)
  });
  if let Some(id) = single(&working) {
    return Disambiguation { resolution: Resolution::Resolved(id), steps };
  }

  let end_time = config.vocabulary.end_time;
  let working = narrow(&working, Filter::IdentifyingCode, &mut steps, |e| {
    let mut facts = code_facts(e, code, config).peekable();
    // No fact carries the code any more: a stale cache entry.
    facts.peek().is_some() && !facts.any(|f| f.has_qualifier(end_time))
  });

  let pick = working
    .values()
    .find(|e| starts_code_on_or_after(e, code, reference_date, config))
    .map(|e| e.id);

  let resolution = match pick.or_else(|| single(&working)) {
    Some(id) => Resolution::Resolved(id),
    None if working.is_empty() => Resolution::Empty,
    None => Resolution::Ambiguous(working.keys().copied().collect()),
  };

  Disambiguation { resolution, steps }
}
