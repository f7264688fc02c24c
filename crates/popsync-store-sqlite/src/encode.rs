//! Encoding and decoding helpers between popsync domain types and the
//! plain-text representations stored in SQLite columns.
//!
//! Entity ids are stored as their Q-number so that `ORDER BY` follows the
//! numeric order. Property ids are stored in their `P…` form. Values,
//! qualifiers and references are stored as compact JSON.

use chrono::{DateTime, Utc};
use popsync_core::{
  entity::{EntityId, PropertyId},
  fact::{Fact, Rank, Reference, Snak, Value},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

// ─── Ids ─────────────────────────────────────────────────────────────────────

pub fn encode_entity_id(id: EntityId) -> Result<i64> {
  i64::try_from(id.number()).map_err(|_| Error::Corrupt {
    column: "entity_id",
    value:  id.to_string(),
  })
}

pub fn decode_entity_id(n: i64) -> Result<EntityId> {
  u64::try_from(n)
    .ok()
    .filter(|&n| n > 0)
    .map(EntityId::new)
    .ok_or_else(|| Error::Corrupt { column: "entity_id", value: n.to_string() })
}

pub fn decode_property(s: &str) -> Result<PropertyId> { Ok(s.parse()?) }

// ─── Rank ────────────────────────────────────────────────────────────────────

pub fn decode_rank(s: &str) -> Result<Rank> {
  s.parse()
    .map_err(|_| Error::Corrupt { column: "rank", value: s.to_owned() })
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// A fact flattened into column values, ready to be bound to an INSERT.
pub struct FactRow {
  pub statement_id:    Option<String>,
  pub property:        String,
  pub rank:            String,
  pub value_json:      String,
  pub qualifiers_json: String,
  pub references_json: String,
}

impl FactRow {
  pub fn from_fact(fact: &Fact) -> Result<Self> {
    Ok(Self {
      statement_id:    fact.id.clone(),
      property:        fact.property.to_string(),
      rank:            fact.rank.to_string(),
      value_json:      serde_json::to_string(&fact.value)?,
      qualifiers_json: serde_json::to_string(&fact.qualifiers)?,
      references_json: serde_json::to_string(&fact.references)?,
    })
  }

  pub fn into_fact(self) -> Result<Fact> {
    let value: Value = serde_json::from_str(&self.value_json)?;
    let qualifiers: Vec<Snak> = serde_json::from_str(&self.qualifiers_json)?;
    let references: Vec<Reference> =
      serde_json::from_str(&self.references_json)?;

    Ok(Fact {
      id: self.statement_id,
      property: decode_property(&self.property)?,
      value,
      qualifiers,
      references,
      rank: decode_rank(&self.rank)?,
    })
  }
}
