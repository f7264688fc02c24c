//! SPARQL snapshot query: every `(code, item)` pair under a base filter.

use popsync_core::{config::BaseFilter, entity::EntityId};
use serde::Deserialize;

use crate::{Error, Result};

/// The base-filter query. The code is read through the full statement path
/// (`p:`/`ps:`) so that codes at every rank are indexed, not only the truthy
/// ones.
pub fn codes_query(filter: &BaseFilter, concept_base: &str) -> String {
  let base = concept_base.trim_end_matches('/');
  let BaseFilter { instance_of, country, identifying_property: code } = filter;
  format!(
    "PREFIX wd: <{base}/entity/>
PREFIX wdt: <{base}/prop/direct/>
PREFIX p: <{base}/prop/>
PREFIX ps: <{base}/prop/statement/>
SELECT ?item ?code WHERE {{
  ?item wdt:P31 wd:{instance_of} ;
        wdt:P17 wd:{country} ;
        p:{code}/ps:{code} ?code .
}}"
  )
}

#[derive(Deserialize)]
struct Response {
  results: Results,
}

#[derive(Deserialize)]
struct Results {
  bindings: Vec<Binding>,
}

#[derive(Deserialize)]
struct Binding {
  item: Term,
  code: Term,
}

#[derive(Deserialize)]
struct Term {
  value: String,
}

/// Parse the `application/sparql-results+json` answer to [`codes_query`].
pub fn parse_codes(body: serde_json::Value) -> Result<Vec<(String, EntityId)>> {
  let response: Response = serde_json::from_value(body)?;
  response
    .results
    .bindings
    .into_iter()
    .map(|b| Ok((b.code.value, item_id(&b.item.value)?)))
    .collect()
}

/// `http://www.wikidata.org/entity/Q90` → `Q90`.
fn item_id(uri: &str) -> Result<EntityId> {
  let local = uri.rsplit('/').next().unwrap_or(uri);
  local
    .parse()
    .map_err(|_| Error::Malformed(format!("not an item uri: {uri}")))
}
