//! Wikibase JSON ↔ popsync fact types.
//!
//! Claims are decoded from `wbgetentities` output and encoded for
//! `wbeditentity`. Datavalues the core does not interpret are carried as
//! [`Value::Other`] and written back verbatim.

use std::collections::BTreeMap;

use popsync_core::{
  entity::{Entity, EntityId, PropertyId},
  fact::{Fact, Quantity, Rank, Reference, Snak, Value},
  plan::Plan,
  time::WikiTime,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{Error, Result};

/// The proleptic Gregorian calendar model; other calendars stay opaque.
pub const GREGORIAN: &str = "http://www.wikidata.org/entity/Q1985727";

// ─── Wire shapes ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WireSnak {
  pub snaktype:  String,
  pub property:  String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub datavalue: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WireReference {
  pub snaks:       BTreeMap<String, Vec<WireSnak>>,
  #[serde(default, rename = "snaks-order")]
  pub snaks_order: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WireClaim {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id:               Option<String>,
  pub mainsnak:         WireSnak,
  #[serde(rename = "type", default = "statement")]
  pub kind:             String,
  #[serde(default)]
  pub rank:             Rank,
  #[serde(default)]
  pub qualifiers:       BTreeMap<String, Vec<WireSnak>>,
  #[serde(default, rename = "qualifiers-order")]
  pub qualifiers_order: Vec<String>,
  #[serde(default)]
  pub references:       Vec<WireReference>,
}

fn statement() -> String { "statement".to_owned() }

/// One entry of a `wbgetentities` response.
#[derive(Debug, Deserialize)]
pub struct WireEntity {
  pub id:      Option<String>,
  /// Present when the entity does not exist: `""` in the legacy format,
  /// `true` in format version 2.
  pub missing: Option<serde_json::Value>,
  #[serde(default)]
  pub claims:  BTreeMap<String, Vec<WireClaim>>,
}

#[derive(Debug, Deserialize)]
pub struct GetEntities {
  #[serde(default)]
  pub entities: BTreeMap<String, WireEntity>,
}

// ─── Decoding ────────────────────────────────────────────────────────────────

fn decode_property(s: &str) -> Result<PropertyId> { Ok(s.parse()?) }

/// Decode a datavalue of the given snak type.
pub fn decode_value(snak: &WireSnak) -> Result<Value> {
  match snak.snaktype.as_str() {
    "somevalue" => return Ok(Value::SomeValue),
    "novalue" => return Ok(Value::NoValue),
    _ => {}
  }
  let Some(datavalue) = &snak.datavalue else {
    return Err(Error::Malformed(format!(
      "value snak on {} without datavalue",
      snak.property
    )));
  };

  let value = &datavalue["value"];
  let decoded = match datavalue["type"].as_str() {
    Some("string") => value.as_str().map(|s| Value::String(s.to_owned())),
    Some("wikibase-entityid") if value["entity-type"] == "item" => value["id"]
      .as_str()
      .and_then(|id| id.parse::<EntityId>().ok())
      .map(Value::Item),
    Some("quantity") => decode_quantity(value).map(Value::Quantity),
    Some("time") if value["calendarmodel"] == GREGORIAN => {
      let time = value["time"].as_str();
      let precision = value["precision"].as_u64().and_then(|p| u8::try_from(p).ok());
      let int = |key: &str| value[key].as_i64().unwrap_or(0);
      let timezone = i32::try_from(int("timezone")).unwrap_or(0);
      let before = u32::try_from(int("before")).unwrap_or(0);
      let after = u32::try_from(int("after")).unwrap_or(0);
      time
        .zip(precision)
        .and_then(|(t, p)| WikiTime::parse(t, p).ok())
        .map(|t| Value::Time(t.with_uncertainty(timezone, before, after)))
    }
    _ => None,
  };
  Ok(decoded.unwrap_or_else(|| Value::Other(datavalue.clone())))
}

fn decode_amount(value: &serde_json::Value) -> Option<Decimal> {
  value.as_str()?.trim_start_matches('+').parse().ok()
}

/// `None` when the amount or a present bound does not parse; the datavalue
/// then stays opaque.
fn decode_quantity(value: &serde_json::Value) -> Option<Quantity> {
  let amount = decode_amount(&value["amount"])?;
  let bound = |key: &str| match &value[key] {
    serde_json::Value::Null => Some(None),
    bound => decode_amount(bound).map(Some),
  };
  let unit = match value["unit"].as_str() {
    None | Some("1") => None,
    Some(unit) => Some(unit.to_owned()),
  };
  Some(Quantity {
    amount,
    unit,
    lower_bound: bound("lowerBound")?,
    upper_bound: bound("upperBound")?,
  })
}

fn decode_snak(snak: &WireSnak) -> Result<Snak> {
  Ok(Snak::new(decode_property(&snak.property)?, decode_value(snak)?))
}

/// Flatten a property-keyed snak map, following `order` and then any keys
/// it does not mention.
fn decode_snak_map(
  map: &BTreeMap<String, Vec<WireSnak>>,
  order: &[String],
) -> Result<Vec<Snak>> {
  let mut keys: Vec<&String> = order.iter().filter(|k| map.contains_key(*k)).collect();
  keys.extend(map.keys().filter(|k| !order.contains(k)));

  let mut snaks = Vec::new();
  for key in keys {
    for snak in &map[key] {
      snaks.push(decode_snak(snak)?);
    }
  }
  Ok(snaks)
}

pub fn decode_claim(claim: &WireClaim) -> Result<Fact> {
  let references = claim
    .references
    .iter()
    .map(|r| Ok(Reference::new(decode_snak_map(&r.snaks, &r.snaks_order)?)))
    .collect::<Result<Vec<_>>>()?;

  Ok(Fact {
    id: claim.id.clone(),
    property: decode_property(&claim.mainsnak.property)?,
    value: decode_value(&claim.mainsnak)?,
    qualifiers: decode_snak_map(&claim.qualifiers, &claim.qualifiers_order)?,
    references,
    rank: claim.rank,
  })
}

/// Decode the entity requested as `id`. `None` when it is missing or was
/// redirected to another id.
pub fn decode_entity(id: EntityId, body: GetEntities) -> Result<Option<Entity>> {
  let key = id.to_string();
  let Some(wire) = body.entities.get(&key) else {
    return Ok(None);
  };
  if wire.missing.is_some() || wire.id.as_deref() != Some(key.as_str()) {
    return Ok(None);
  }

  let mut facts = Vec::new();
  for claims in wire.claims.values() {
    for claim in claims {
      facts.push(decode_claim(claim)?);
    }
  }
  Ok(Some(Entity::new(id, facts)))
}

// ─── Encoding ────────────────────────────────────────────────────────────────

/// Wikibase renders amounts with an explicit sign.
pub fn format_amount(amount: Decimal) -> String {
  let amount = amount.normalize();
  if amount.is_sign_negative() {
    amount.to_string()
  } else {
    format!("+{amount}")
  }
}

pub fn encode_snak(snak: &Snak) -> WireSnak {
  let property = snak.property.to_string();
  let (snaktype, datavalue) = match &snak.value {
    Value::SomeValue => ("somevalue", None),
    Value::NoValue => ("novalue", None),
    Value::Item(id) => ("value", Some(json!({
      "type": "wikibase-entityid",
      "value": { "entity-type": "item", "numeric-id": id.number(), "id": id.to_string() },
    }))),
    Value::String(s) => ("value", Some(json!({ "type": "string", "value": s }))),
    Value::Quantity(q) => {
      let mut value = json!({
        "amount": format_amount(q.amount),
        "unit": q.unit.as_deref().unwrap_or("1"),
      });
      if let Some(lower) = q.lower_bound {
        value["lowerBound"] = json!(format_amount(lower));
      }
      if let Some(upper) = q.upper_bound {
        value["upperBound"] = json!(format_amount(upper));
      }
      ("value", Some(json!({ "type": "quantity", "value": value })))
    }
    Value::Time(t) => ("value", Some(json!({
      "type": "time",
      "value": {
        "time": t.as_str(),
        "timezone": t.timezone(),
        "before": t.before(),
        "after": t.after(),
        "precision": t.precision(),
        "calendarmodel": GREGORIAN,
      },
    }))),
    Value::Other(v) => ("value", Some(v.clone())),
  };
  WireSnak { snaktype: snaktype.to_owned(), property, datavalue }
}

/// Group snaks by property, keeping first-appearance order.
fn encode_snak_map(snaks: &[Snak]) -> (BTreeMap<String, Vec<WireSnak>>, Vec<String>) {
  let mut map: BTreeMap<String, Vec<WireSnak>> = BTreeMap::new();
  let mut order = Vec::new();
  for snak in snaks {
    let key = snak.property.to_string();
    if !map.contains_key(&key) {
      order.push(key.clone());
    }
    map.entry(key).or_default().push(encode_snak(snak));
  }
  (map, order)
}

pub fn encode_fact(fact: &Fact) -> WireClaim {
  let (qualifiers, qualifiers_order) = encode_snak_map(&fact.qualifiers);
  let references = fact
    .references
    .iter()
    .map(|r| {
      let (snaks, snaks_order) = encode_snak_map(&r.snaks);
      WireReference { snaks, snaks_order }
    })
    .collect();

  WireClaim {
    id: fact.id.clone(),
    mainsnak: encode_snak(&Snak::new(fact.property, fact.value.clone())),
    kind: statement(),
    rank: fact.rank,
    qualifiers,
    qualifiers_order,
    references,
  }
}

/// The `data` parameter of `wbeditentity` for `plan`: every planned claim on
/// the property. Claims carrying an id are updated in place, the others are
/// added.
pub fn edit_data(plan: &Plan) -> serde_json::Value {
  let claims: Vec<WireClaim> = plan.facts.iter().map(encode_fact).collect();
  json!({ "claims": claims })
}
