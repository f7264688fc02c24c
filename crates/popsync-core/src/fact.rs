//! Fact types: statements on a knowledge-base entity.
//!
//! A fact is a property, a value, ordered qualifiers, reference bundles and a
//! rank. Rank is used as a validity marker here: on a given property exactly
//! one fact is expected to be `preferred`, the currently authoritative one.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{
  entity::{EntityId, PropertyId},
  time::WikiTime,
};

// ─── Values ──────────────────────────────────────────────────────────────────

/// A quantity with an exact decimal amount and optional uncertainty bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quantity {
  pub amount:      Decimal,
  /// Unit item URI; `None` for dimensionless counts such as a population.
  pub unit:        Option<String>,
  #[serde(default)]
  pub lower_bound: Option<Decimal>,
  #[serde(default)]
  pub upper_bound: Option<Decimal>,
}

impl Quantity {
  /// A dimensionless amount without bounds.
  pub fn exact(amount: Decimal) -> Self {
    Self { amount, unit: None, lower_bound: None, upper_bound: None }
  }

  pub fn count(n: u64) -> Self { Self::exact(Decimal::from(n)) }
}

/// The typed payload of a snak.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Value {
  Item(EntityId),
  /// Plain strings and external identifiers.
  String(String),
  Quantity(Quantity),
  Time(WikiTime),
  /// A value is known to exist but is not given.
  SomeValue,
  /// The property is known to have no value.
  NoValue,
  /// A datavalue this crate does not interpret (monolingual text,
  /// coordinates, non-Gregorian times, …), preserved verbatim.
  Other(serde_json::Value),
}

impl Value {
  /// Equality where quantities compare by amount alone, numerically
  /// (`+1200` equals `1200.0`). Every other kind compares structurally.
  pub fn numerically_eq(&self, other: &Value) -> bool {
    match (self, other) {
      (Value::Quantity(a), Value::Quantity(b)) => a.amount == b.amount,
      _ => self == other,
    }
  }

  pub fn as_time(&self) -> Option<&WikiTime> {
    match self {
      Value::Time(t) => Some(t),
      _ => None,
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Value::String(s) => Some(s),
      _ => None,
    }
  }
}

// ─── Snaks and references ────────────────────────────────────────────────────

/// A (property, value) pair; used for qualifiers and inside references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snak {
  pub property: PropertyId,
  pub value:    Value,
}

impl Snak {
  pub fn new(property: PropertyId, value: Value) -> Self {
    Self { property, value }
  }
}

/// A bundle of snaks supporting a fact.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Reference {
  pub snaks: Vec<Snak>,
}

impl Reference {
  pub fn new(snaks: Vec<Snak>) -> Self { Self { snaks } }

  pub fn values_for(
    &self,
    property: PropertyId,
  ) -> impl Iterator<Item = &Value> + '_ {
    self
      .snaks
      .iter()
      .filter(move |s| s.property == property)
      .map(|s| &s.value)
  }
}

// ─── Rank ────────────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Display,
  EnumString,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Rank {
  Preferred,
  #[default]
  Normal,
  Deprecated,
}

// ─── Fact ────────────────────────────────────────────────────────────────────

/// A statement on an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
  /// Statement id assigned by the knowledge base; `None` until written.
  pub id:         Option<String>,
  pub property:   PropertyId,
  pub value:      Value,
  pub qualifiers: Vec<Snak>,
  pub references: Vec<Reference>,
  pub rank:       Rank,
}

impl Fact {
  /// Convenience constructor: normal rank, no qualifiers or references.
  pub fn new(property: PropertyId, value: Value) -> Self {
    Self {
      id: None,
      property,
      value,
      qualifiers: Vec::new(),
      references: Vec::new(),
      rank: Rank::default(),
    }
  }

  pub fn qualifier_values(
    &self,
    property: PropertyId,
  ) -> impl Iterator<Item = &Value> + '_ {
    self
      .qualifiers
      .iter()
      .filter(move |q| q.property == property)
      .map(|q| &q.value)
  }

  /// Whether any qualifier uses `property`, whatever its value (including
  /// "some value" and "no value").
  pub fn has_qualifier(&self, property: PropertyId) -> bool {
    self.qualifiers.iter().any(|q| q.property == property)
  }

  /// The first dated qualifier for `property`.
  pub fn time_qualifier(&self, property: PropertyId) -> Option<&WikiTime> {
    self.qualifier_values(property).find_map(Value::as_time)
  }
}

// ─── NewFact ─────────────────────────────────────────────────────────────────

/// A fact to be stated; rank and statement id are decided by the planner.
#[derive(Debug, Clone, PartialEq)]
pub struct NewFact {
  pub property:   PropertyId,
  pub value:      Value,
  pub qualifiers: Vec<Snak>,
  pub references: Vec<Reference>,
}

impl NewFact {
  pub fn new(property: PropertyId, value: Value) -> Self {
    Self {
      property,
      value,
      qualifiers: Vec::new(),
      references: Vec::new(),
    }
  }

  /// The first qualifier using `property`.
  pub fn qualifier(&self, property: PropertyId) -> Option<&Snak> {
    self.qualifiers.iter().find(|q| q.property == property)
  }

  pub fn into_fact(self, rank: Rank, id: Option<String>) -> Fact {
    Fact {
      id,
      property: self.property,
      value: self.value,
      qualifiers: self.qualifiers,
      references: self.references,
      rank,
    }
  }
}
