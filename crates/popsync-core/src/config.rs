//! Reconciliation configuration.
//!
//! Everything the resolution and planning steps need to know about the run is
//! carried in a [`ReconcileConfig`] value that is passed explicitly into each
//! call. Nothing in this crate reads ambient state.

use chrono::Datelike;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strum::{Display, EnumString};

use crate::{
  entity::{EntityId, PropertyId},
  fact::{NewFact, Quantity, Reference, Snak, Value},
  record::Record,
  time::WikiTime,
};

// ─── Base filter ─────────────────────────────────────────────────────────────

/// Selects the slice of the knowledge base a run reconciles against:
/// instances of one class, in one country, carrying one identifying code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BaseFilter {
  pub instance_of:          EntityId,
  pub country:              EntityId,
  pub identifying_property: PropertyId,
}

impl BaseFilter {
  /// Stable identifier for snapshots taken with this filter: the SHA-256 hex
  /// digest of its canonical text form.
  pub fn signature(&self) -> String {
    let canonical = format!(
      "instance_of={};country={};identifying_property={}",
      self.instance_of, self.country, self.identifying_property
    );
    hex::encode(Sha256::digest(canonical.as_bytes()))
  }
}

/// The French administrative levels that INSEE publishes population tables
/// for.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Display,
  EnumString,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EntityKind {
  Commune,
  Arrondissement,
  Departement,
  Region,
}

/// France (`Q142`).
const FRANCE: EntityId = EntityId::new(142);

impl EntityKind {
  /// The Wikidata base filter for this level.
  pub fn base_filter(self) -> BaseFilter {
    let (instance_of, identifying_property) = match self {
      // commune of France / INSEE municipality code
      Self::Commune => (484_170, 374),
      // arrondissement of France / INSEE arrondissement code
      Self::Arrondissement => (194_203, 3423),
      // department of France / INSEE department code
      Self::Departement => (6465, 2586),
      // region of France / INSEE region code
      Self::Region => (36_784, 2585),
    };
    BaseFilter {
      instance_of:          EntityId::new(instance_of),
      country:              FRANCE,
      identifying_property: PropertyId::new(identifying_property),
    }
  }
}

// ─── Vocabulary ──────────────────────────────────────────────────────────────

/// The properties the reconciler reasons about. Defaults are Wikidata's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vocabulary {
  pub instance_of:          PropertyId,
  pub country:              PropertyId,
  pub population:           PropertyId,
  pub point_in_time:        PropertyId,
  pub start_time:           PropertyId,
  pub end_time:             PropertyId,
  pub dissolved:            PropertyId,
  pub stated_in:            PropertyId,
  pub determination_method: PropertyId,
}

impl Default for Vocabulary {
  fn default() -> Self {
    Self {
      instance_of:          PropertyId::new(31),
      country:              PropertyId::new(17),
      population:           PropertyId::new(1082),
      point_in_time:        PropertyId::new(585),
      start_time:           PropertyId::new(580),
      end_time:             PropertyId::new(582),
      dissolved:            PropertyId::new(576),
      stated_in:            PropertyId::new(248),
      determination_method: PropertyId::new(459),
    }
  }
}

// ─── ReconcileConfig ─────────────────────────────────────────────────────────

/// Census (`Q39825`), the usual determination method for INSEE counts.
pub const CENSUS: EntityId = EntityId::new(39_825);

/// Per-run settings threaded through resolution, planning and commit.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileConfig {
  pub filter:               BaseFilter,
  pub vocabulary:           Vocabulary,
  /// Source publication cited in the reference of every written fact.
  pub stated_in:            EntityId,
  /// Added as a qualifier on every written fact when set.
  pub determination_method: Option<EntityId>,
  /// Edit summary template; `{year}` and `{code}` are substituted.
  pub summary:              String,
  /// Maximum number of commits for the run; `None` is unbounded.
  pub max_commits:          Option<usize>,
}

impl ReconcileConfig {
  pub fn new(filter: BaseFilter, stated_in: EntityId) -> Self {
    Self {
      filter,
      vocabulary: Vocabulary::default(),
      stated_in,
      determination_method: Some(CENSUS),
      summary: "Update population for {year}".to_owned(),
      max_commits: None,
    }
  }

  /// The fact `record` asks to be stated: the population with a day-precision
  /// point-in-time qualifier, the determination method, and a stated-in
  /// reference.
  pub fn target_fact(&self, record: &Record) -> NewFact {
    let vocab = &self.vocabulary;
    let mut fact = NewFact::new(
      vocab.population,
      Value::Quantity(Quantity::count(record.population)),
    );

    fact.qualifiers.push(Snak::new(
      vocab.point_in_time,
      Value::Time(WikiTime::from_date(record.reference_date)),
    ));
    if let Some(method) = self.determination_method {
      fact
        .qualifiers
        .push(Snak::new(vocab.determination_method, Value::Item(method)));
    }
    fact.references.push(Reference::new(vec![Snak::new(
      vocab.stated_in,
      Value::Item(self.stated_in),
    )]));
    fact
  }

  /// Render the edit summary for `record`.
  pub fn summary_for(&self, record: &Record) -> String {
    self
      .summary
      .replace("{year}", &record.reference_date.year().to_string())
      .replace("{code}", &record.identifying_code)
  }
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;

  use super::*;

  fn record() -> Record {
    Record::new("01053", 41_365, NaiveDate::from_ymd_opt(2021, 1, 1).unwrap())
  }

  #[test]
  fn presets_match_wikidata() {
    let f = EntityKind::Commune.base_filter();
    assert_eq!(f.instance_of.to_string(), "Q484170");
    assert_eq!(f.country.to_string(), "Q142");
    assert_eq!(f.identifying_property.to_string(), "P374");
    assert_eq!(
      EntityKind::Region.base_filter().identifying_property.to_string(),
      "P2585"
    );
  }

  #[test]
  fn signature_is_stable_and_filter_specific() {
    let a = EntityKind::Commune.base_filter();
    assert_eq!(a.signature(), a.signature());
    assert_eq!(a.signature().len(), 64);
    assert_ne!(a.signature(), EntityKind::Departement.base_filter().signature());
  }

  #[test]
  fn target_fact_carries_point_in_time_method_and_source() {
    let config =
      ReconcileConfig::new(EntityKind::Commune.base_filter(), EntityId::new(1));
    let target = config.target_fact(&record());
    let vocab = config.vocabulary;

    assert_eq!(target.property, vocab.population);
    assert_eq!(target.value, Value::Quantity(Quantity::count(41_365)));

    let pit = target.qualifier(vocab.point_in_time).unwrap();
    assert_eq!(
      pit.value.as_time().unwrap().as_str(),
      "+2021-01-01T00:00:00Z"
    );
    assert_eq!(
      target.qualifier(vocab.determination_method).unwrap().value,
      Value::Item(CENSUS)
    );
    assert_eq!(target.references.len(), 1);
    assert_eq!(
      target.references[0].values_for(vocab.stated_in).next(),
      Some(&Value::Item(EntityId::new(1)))
    );
  }

  #[test]
  fn determination_method_is_optional() {
    let mut config =
      ReconcileConfig::new(EntityKind::Region.base_filter(), EntityId::new(1));
    config.determination_method = None;
    let target = config.target_fact(&record());
    assert_eq!(target.qualifiers.len(), 1);
  }

  #[test]
  fn summary_substitutes_year_and_code() {
    let mut config =
      ReconcileConfig::new(EntityKind::Commune.base_filter(), EntityId::new(1));
    config.summary = "Population {year} for {code}".into();
    assert_eq!(config.summary_for(&record()), "Population 2021 for 01053");
  }
}
