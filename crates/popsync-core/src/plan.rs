//! Update planning: target fact + current entity → the exact replacement
//! fact set for the target property.
//!
//! Planning is pure. The resulting [`Plan`] is handed to a write executor
//! unmodified and can be applied to a cached entity to mirror the commit.

use crate::{
  config::Vocabulary,
  entity::{Entity, EntityId, PropertyId},
  fact::{Fact, NewFact, Rank, Reference, Snak, Value},
};

// ─── Plan ────────────────────────────────────────────────────────────────────

/// Where the planned fact lands among the property's facts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
  /// A new statement at the end of the property's facts.
  Append { index: usize },
  /// The existing statement at `index`, which had the same point in time, is
  /// overwritten in place; its statement id is kept.
  Replace { index: usize, statement: Option<String> },
}

impl Placement {
  pub fn index(&self) -> usize {
    match self {
      Self::Append { index } | Self::Replace { index, .. } => *index,
    }
  }
}

/// Duplicate qualifiers/references removed from one existing fact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dedup {
  pub index:              usize,
  pub qualifiers_removed: usize,
  pub references_removed: usize,
}

/// The complete set of edits for one entity and property.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
  pub entity:    EntityId,
  pub property:  PropertyId,
  /// Positions of facts demoted from `preferred` to `normal`.
  pub demoted:   Vec<usize>,
  pub dedups:    Vec<Dedup>,
  pub placement: Placement,
  /// Every fact on `property` after the plan, in statement order. This is
  /// what gets written.
  pub facts:     Vec<Fact>,
}

impl Plan {
  /// The planned preferred fact.
  pub fn addition(&self) -> &Fact { &self.facts[self.placement.index()] }

  /// `entity` with its facts on the plan's property swapped for the planned
  /// ones. The planned facts take the position of the first existing fact on
  /// the property, or go last when there was none.
  pub fn apply(&self, entity: &Entity) -> Entity {
    let mut facts = Vec::with_capacity(entity.facts.len() + 1);
    let mut placed = false;
    for fact in &entity.facts {
      if fact.property != self.property {
        facts.push(fact.clone());
      } else if !placed {
        facts.extend(self.facts.iter().cloned());
        placed = true;
      }
    }
    if !placed {
      facts.extend(self.facts.iter().cloned());
    }
    Entity::new(entity.id, facts)
  }

  /// One-line description for logs and run reports.
  pub fn describe(&self) -> String {
    let placement = match &self.placement {
      Placement::Append { .. } => "append".to_owned(),
      Placement::Replace { index, .. } => format!("replace #{index}"),
    };
    let dedup: usize = self
      .dedups
      .iter()
      .map(|d| d.qualifiers_removed + d.references_removed)
      .sum();
    format!(
      "{} {placement}, {} demoted, {dedup} duplicates removed",
      self.property,
      self.demoted.len(),
    )
  }
}

// ─── Planning ────────────────────────────────────────────────────────────────

/// Plan stating `target` as the preferred fact of `entity`.
///
/// 1. Every `preferred` fact on the property is demoted to `normal`.
/// 2. Repeated point-in-time qualifiers and repeated stated-in references on
///    each fact are reduced to their first occurrence.
/// 3. Append-or-replace: the first fact whose point-in-time qualifier equals
///    the target's is overwritten in place by the target, at `preferred`
///    rank; otherwise the target is appended. A target without a
///    point-in-time qualifier is always appended.
pub fn plan(entity: &Entity, target: &NewFact, vocab: &Vocabulary) -> Plan {
  let mut facts: Vec<Fact> = entity.facts_for(target.property).cloned().collect();

  let mut demoted = Vec::new();
  let mut dedups = Vec::new();
  for (index, fact) in facts.iter_mut().enumerate() {
    if fact.rank == Rank::Preferred {
      fact.rank = Rank::Normal;
      demoted.push(index);
    }

    let qualifiers_removed = dedup_qualifiers(fact, vocab.point_in_time);
    let references_removed = dedup_references(fact, vocab.stated_in);
    if qualifiers_removed + references_removed > 0 {
      dedups.push(Dedup { index, qualifiers_removed, references_removed });
    }
  }

  let point_in_time = target.qualifier(vocab.point_in_time).map(|s| &s.value);
  let same_point_in_time = point_in_time.and_then(|pit| {
    facts
      .iter()
      .position(|f| f.qualifier_values(vocab.point_in_time).any(|v| v == pit))
  });

  let placement = match same_point_in_time {
    Some(index) => {
      let statement = facts[index].id.clone();
      facts[index] = target.clone().into_fact(Rank::Preferred, statement.clone());
      Placement::Replace { index, statement }
    }
    None => {
      facts.push(target.clone().into_fact(Rank::Preferred, None));
      Placement::Append { index: facts.len() - 1 }
    }
  };

  Plan {
    entity: entity.id,
    property: target.property,
    demoted,
    dedups,
    placement,
    facts,
  }
}

/// Drop qualifiers on `property` whose value already occurred earlier on the
/// fact. Returns the number removed.
fn dedup_qualifiers(fact: &mut Fact, property: PropertyId) -> usize {
  let before = fact.qualifiers.len();
  let mut seen: Vec<Value> = Vec::new();
  fact.qualifiers.retain(|q: &Snak| {
    if q.property != property {
      return true;
    }
    if seen.contains(&q.value) {
      return false;
    }
    seen.push(q.value.clone());
    true
  });
  before - fact.qualifiers.len()
}

/// Drop references citing, under `property`, a source an earlier reference on
/// the fact already cites. Returns the number removed.
fn dedup_references(fact: &mut Fact, property: PropertyId) -> usize {
  let before = fact.references.len();
  let mut seen: Vec<Value> = Vec::new();
  fact.references.retain(|r: &Reference| {
    let cited: Vec<&Value> = r.values_for(property).collect();
    if cited.is_empty() {
      return true;
    }
    if cited.iter().any(|v| seen.contains(v)) {
      return false;
    }
    seen.extend(cited.into_iter().cloned());
    true
  });
  before - fact.references.len()
}
