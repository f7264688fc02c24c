//! Async HTTP client for the MediaWiki action API and the query service.

use std::time::Duration;

use popsync_core::{
  config::BaseFilter,
  entity::{Entity, EntityId},
  plan::Plan,
  store::{CommitId, KnowledgeBase, WriteExecutor},
};
use reqwest::{Client, header};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

use crate::{
  Error, Result,
  config::WikibaseConfig,
  sparql,
  wire::{self, GetEntities},
};

/// Client for one Wikibase instance.
///
/// Reads are anonymous. The first write logs in with the configured bot
/// password and fetches a CSRF token; the session lives in the client's
/// cookie store.
pub struct WikibaseClient {
  http:   Client,
  config: WikibaseConfig,
  token:  Mutex<Option<String>>,
}

impl WikibaseClient {
  pub fn new(config: WikibaseConfig) -> Result<Self> {
    let http = Client::builder()
      .user_agent(config.user_agent.clone())
      .cookie_store(true)
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()?;
    Ok(Self { http, config, token: Mutex::new(None) })
  }

  pub fn config(&self) -> &WikibaseConfig { &self.config }

  // ── Requests ──────────────────────────────────────────────────────────────

  /// Send a request built by `build`, retrying failures `retryable` accepts
  /// with backoff. A `Retry-After` header overrides the computed delay.
  async fn send_with_retry<T, F>(
    &self,
    what: &str,
    retryable: fn(&Error) -> bool,
    build: F,
  ) -> Result<T>
  where
    T: DeserializeOwned,
    F: Fn() -> reqwest::RequestBuilder,
  {
    let mut attempt = 0;
    loop {
      let (result, retry_after) = match build().send().await {
        Ok(resp) => {
          let retry_after = retry_after(&resp);
          (decode_response(resp).await, retry_after)
        }
        Err(e) => (Err(Error::Http(e)), None),
      };

      match result {
        Ok(value) => return Ok(value),
        Err(e) if retryable(&e) && attempt < self.config.max_retries => {
          let delay =
            retry_after.unwrap_or_else(|| self.config.backoff(attempt));
          tracing::warn!(
            request = what,
            attempt = attempt + 1,
            delay_secs = delay.as_secs(),
            error = %e,
            "retrying"
          );
          tokio::time::sleep(delay).await;
          attempt += 1;
        }
        Err(e) if retryable(&e) => {
          return Err(Error::RetriesExhausted {
            attempts: attempt + 1,
            last:     Box::new(e),
          });
        }
        Err(e) => return Err(e),
      }
    }
  }

  async fn api_get(
    &self,
    what: &str,
    params: &[(&str, &str)],
  ) -> Result<serde_json::Value> {
    self
      .send_with_retry(what, Error::is_retryable, || {
        self
          .http
          .get(&self.config.api_url)
          .query(&[("format", "json"), ("formatversion", "2")])
          .query(params)
      })
      .await
  }

  async fn api_post(
    &self,
    what: &str,
    retryable: fn(&Error) -> bool,
    form: &[(&str, &str)],
  ) -> Result<serde_json::Value> {
    self
      .send_with_retry(what, retryable, || {
        self
          .http
          .post(&self.config.api_url)
          .query(&[("format", "json"), ("formatversion", "2")])
          .form(form)
      })
      .await
  }

  // ── Session ───────────────────────────────────────────────────────────────

  /// Log in with the bot password (`action=login`).
  async fn login(&self) -> Result<()> {
    let (Some(user), Some(password)) =
      (self.config.username.as_deref(), self.config.password.as_deref())
    else {
      return Err(Error::Login("no bot credentials configured".into()));
    };

    let tokens = self
      .api_get("login token", &[
        ("action", "query"),
        ("meta", "tokens"),
        ("type", "login"),
      ])
      .await?;
    let login_token = string_at(&tokens, &["query", "tokens", "logintoken"])?;

    let body = self
      .api_post("login", Error::is_retryable, &[
        ("action", "login"),
        ("lgname", user),
        ("lgpassword", password),
        ("lgtoken", login_token.as_str()),
      ])
      .await?;
    match body["login"]["result"].as_str() {
      Some("Success") => {
        tracing::info!(user, "logged in");
        Ok(())
      }
      other => Err(Error::Login(
        body["login"]["reason"]
          .as_str()
          .or(other)
          .unwrap_or("no result")
          .to_owned(),
      )),
    }
  }

  /// The CSRF token, logging in and fetching it on first use.
  async fn csrf_token(&self) -> Result<String> {
    let mut token = self.token.lock().await;
    if let Some(token) = token.as_ref() {
      return Ok(token.clone());
    }

    if self.config.has_credentials() {
      self.login().await?;
    }
    let body = self
      .api_get("csrf token", &[("action", "query"), ("meta", "tokens")])
      .await?;
    let fresh = string_at(&body, &["query", "tokens", "csrftoken"])?;
    // The anonymous token cannot edit.
    if fresh == "+\\" {
      return Err(Error::Login("session is not logged in".into()));
    }
    *token = Some(fresh.clone());
    Ok(fresh)
  }

  async fn edit(
    &self,
    entity: EntityId,
    plan: &Plan,
    summary: &str,
    token: &str,
  ) -> Result<CommitId> {
    let id = entity.to_string();
    let data = wire::edit_data(plan).to_string();
    let maxlag = self.config.maxlag.to_string();

    let body = self
      .api_post("wbeditentity", Error::is_retryable_edit, &[
        ("action", "wbeditentity"),
        ("id", id.as_str()),
        ("data", data.as_str()),
        ("summary", summary),
        ("bot", "1"),
        ("maxlag", maxlag.as_str()),
        ("token", token),
      ])
      .await?;

    body["entity"]["lastrevid"]
      .as_u64()
      .map(CommitId)
      .ok_or_else(|| {
        Error::Malformed(format!("wbeditentity response without lastrevid: {body}"))
      })
  }
}

// ─── Response handling ───────────────────────────────────────────────────────

/// Status check, then body decode. MediaWiki reports most failures as a 200
/// with an `error` object, which is surfaced as [`Error::Api`].
async fn decode_response<T: DeserializeOwned>(
  resp: reqwest::Response,
) -> Result<T> {
  let status = resp.status();
  let body = resp.text().await?;
  if !status.is_success() {
    return Err(Error::Status { status: status.as_u16(), body });
  }
  let value: serde_json::Value = serde_json::from_str(&body)?;
  api_error(&value)?;
  Ok(serde_json::from_value(value)?)
}

/// The `error` object of an API response, if any.
pub(crate) fn api_error(body: &serde_json::Value) -> Result<()> {
  let error = &body["error"];
  if error.is_null() {
    return Ok(());
  }
  Err(Error::Api {
    code: error["code"].as_str().unwrap_or("unknown").to_owned(),
    info: error["info"].as_str().unwrap_or_default().to_owned(),
  })
}

/// Seconds from a `Retry-After` header; HTTP-date values are ignored.
fn retry_after(resp: &reqwest::Response) -> Option<Duration> {
  resp
    .headers()
    .get(header::RETRY_AFTER)?
    .to_str()
    .ok()?
    .trim()
    .parse()
    .ok()
    .map(Duration::from_secs)
}

fn string_at(body: &serde_json::Value, path: &[&str]) -> Result<String> {
  path
    .iter()
    .fold(body, |v, key| &v[*key])
    .as_str()
    .map(str::to_owned)
    .ok_or_else(|| Error::Malformed(format!("missing {}", path.join("."))))
}

// ─── Collaborator impls ──────────────────────────────────────────────────────

impl KnowledgeBase for WikibaseClient {
  type Error = Error;

  async fn query_codes<'a>(
    &'a self,
    filter: &'a BaseFilter,
  ) -> Result<Vec<(String, EntityId)>> {
    let query = sparql::codes_query(filter, &self.config.concept_base);
    let body: serde_json::Value = self
      .send_with_retry("sparql", Error::is_retryable, || {
        self
          .http
          .get(&self.config.sparql_url)
          .header(header::ACCEPT, "application/sparql-results+json")
          .query(&[("query", query.as_str())])
      })
      .await?;
    let pairs = sparql::parse_codes(body)?;
    tracing::debug!(pairs = pairs.len(), "sparql snapshot query answered");
    Ok(pairs)
  }

  async fn fetch_entity(&self, id: EntityId) -> Result<Option<Entity>> {
    let ids = id.to_string();
    let body = self
      .api_get("wbgetentities", &[
        ("action", "wbgetentities"),
        ("ids", ids.as_str()),
        ("props", "claims"),
      ])
      .await;

    let body = match body {
      Ok(body) => body,
      // An unknown or malformed id is reported per entity by newer servers
      // and as a request error by older ones.
      Err(Error::Api { code, .. }) if code == "no-such-entity" => return Ok(None),
      Err(e) => return Err(e),
    };
    let entities: GetEntities = serde_json::from_value(body)?;
    wire::decode_entity(id, entities)
  }
}

impl WriteExecutor for WikibaseClient {
  type Error = Error;

  async fn commit<'a>(
    &'a self,
    entity: EntityId,
    plan: &'a Plan,
    summary: &'a str,
  ) -> Result<CommitId> {
    let token = self.csrf_token().await?;
    match self.edit(entity, plan, summary, &token).await {
      Err(Error::Api { code, .. }) if code == "badtoken" => {
        // Session expired: drop the token, log in again and retry once.
        tracing::warn!(%entity, "csrf token rejected, renewing");
        self.token.lock().await.take();
        let token = self.csrf_token().await?;
        self.edit(entity, plan, summary, &token).await
      }
      result => result,
    }
  }
}
