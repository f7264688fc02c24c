//! Connection settings for a Wikibase instance.

use std::time::Duration;

use serde::Deserialize;

/// Endpoints, credentials and politeness settings. Defaults target Wikidata.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WikibaseConfig {
  /// `api.php` endpoint.
  pub api_url:         String,
  /// SPARQL query service endpoint.
  pub sparql_url:      String,
  /// Base of the instance's concept URIs, used for the SPARQL prefixes.
  pub concept_base:    String,
  pub user_agent:      String,
  /// Bot-password user name (`User@bot`). Writes need a login; reads do not.
  pub username:        Option<String>,
  pub password:        Option<String>,
  /// Sent with every write; the server refuses edits while replication lag
  /// exceeds this many seconds.
  pub maxlag:          u32,
  /// Attempts after the first for retryable failures.
  pub max_retries:     u32,
  /// First backoff delay; doubled on each retry.
  pub retry_base_secs: u64,
  pub timeout_secs:    u64,
}

impl Default for WikibaseConfig {
  fn default() -> Self {
    Self {
      api_url:         "https://www.wikidata.org/w/api.php".to_owned(),
      sparql_url:      "https://query.wikidata.org/sparql".to_owned(),
      concept_base:    "http://www.wikidata.org/".to_owned(),
      user_agent:      concat!(
        "popsync/",
        env!("CARGO_PKG_VERSION"),
        " (French population updates)"
      )
      .to_owned(),
      username:        None,
      password:        None,
      maxlag:          5,
      max_retries:     5,
      retry_base_secs: 5,
      timeout_secs:    60,
    }
  }
}

impl WikibaseConfig {
  /// Delay before retry number `attempt` (0-based), capped at two minutes.
  pub fn backoff(&self, attempt: u32) -> Duration {
    let secs = self
      .retry_base_secs
      .saturating_mul(1u64 << attempt.min(16));
    Duration::from_secs(secs.min(120))
  }

  pub(crate) fn has_credentials(&self) -> bool {
    self.username.as_deref().is_some_and(|u| !u.is_empty())
  }
}
