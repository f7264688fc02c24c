//! Error type for `popsync-wikibase`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] popsync_core::Error),

  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("unexpected http status {status}: {body}")]
  Status { status: u16, body: String },

  /// An `error` object in a MediaWiki API response.
  #[error("api error {code}: {info}")]
  Api { code: String, info: String },

  #[error("login failed: {0}")]
  Login(String),

  #[error("gave up after {attempts} attempts: {last}")]
  RetriesExhausted { attempts: u32, last: Box<Error> },

  /// A response that parsed as JSON but not in the expected shape.
  #[error("malformed response: {0}")]
  Malformed(String),
}

impl Error {
  /// Whether the request may succeed if sent again later: replication lag,
  /// rate limiting and server-side failures.
  pub fn is_retryable(&self) -> bool {
    match self {
      Self::Status { status, .. } => *status == 429 || *status >= 500,
      Self::Api { code, .. } => {
        matches!(code.as_str(), "maxlag" | "ratelimited" | "readonly")
      }
      Self::Http(e) => e.is_timeout() || e.is_connect(),
      _ => false,
    }
  }

  /// Whether an edit may be resent: only when the server refused it before
  /// applying anything. A timeout or a 5xx may follow a saved edit.
  pub fn is_retryable_edit(&self) -> bool {
    match self {
      Self::Status { status, .. } => *status == 429,
      Self::Api { code, .. } => {
        matches!(code.as_str(), "maxlag" | "ratelimited" | "readonly")
      }
      _ => false,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
