//! Knowledge-base identifiers and the entity envelope.
//!
//! Identifiers are stored numerically so that ordering follows the Q-number
//! (`Q9 < Q10`), which is what the disambiguator's tie-break relies on.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Error, fact::Fact};

// ─── EntityId ────────────────────────────────────────────────────────────────

/// An item identifier such as `Q90`.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
  Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId(u64);

impl EntityId {
  pub const fn new(number: u64) -> Self { Self(number) }

  pub fn number(self) -> u64 { self.0 }
}

impl fmt::Display for EntityId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Q{}", self.0)
  }
}

impl FromStr for EntityId {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    s.strip_prefix('Q')
      .and_then(parse_number)
      .map(Self)
      .ok_or_else(|| Error::InvalidEntityId(s.to_owned()))
  }
}

impl TryFrom<String> for EntityId {
  type Error = Error;

  fn try_from(s: String) -> Result<Self, Self::Error> { s.parse() }
}

impl From<EntityId> for String {
  fn from(id: EntityId) -> Self { id.to_string() }
}

// ─── PropertyId ──────────────────────────────────────────────────────────────

/// A property identifier such as `P1082`.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
  Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct PropertyId(u32);

impl PropertyId {
  pub const fn new(number: u32) -> Self { Self(number) }
}

impl fmt::Display for PropertyId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "P{}", self.0)
  }
}

impl FromStr for PropertyId {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    s.strip_prefix('P')
      .and_then(parse_number)
      .map(Self)
      .ok_or_else(|| Error::InvalidPropertyId(s.to_owned()))
  }
}

impl TryFrom<String> for PropertyId {
  type Error = Error;

  fn try_from(s: String) -> Result<Self, Self::Error> { s.parse() }
}

impl From<PropertyId> for String {
  fn from(id: PropertyId) -> Self { id.to_string() }
}

/// Digits only; rejects signs, whitespace and leading zeros.
fn parse_number<T: FromStr>(digits: &str) -> Option<T> {
  let well_formed = !digits.is_empty()
    && digits.bytes().all(|b| b.is_ascii_digit())
    && !digits.starts_with('0');
  if well_formed { digits.parse().ok() } else { None }
}

// ─── Entity ──────────────────────────────────────────────────────────────────

/// A knowledge-base item and the facts currently stated on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
  pub id:    EntityId,
  pub facts: Vec<Fact>,
}

impl Entity {
  pub fn new(id: EntityId, facts: Vec<Fact>) -> Self { Self { id, facts } }

  /// All facts stated with `property`, in statement order.
  pub fn facts_for(
    &self,
    property: PropertyId,
  ) -> impl Iterator<Item = &Fact> + '_ {
    self.facts.iter().filter(move |f| f.property == property)
  }
}
