//! Input records: one population count for one administrative code.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A single statistical observation to reconcile. Produced by a record
/// source, consumed once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
  /// External registry code, compared verbatim against the identifying
  /// property on the knowledge base.
  pub identifying_code: String,
  pub population:       u64,
  pub reference_date:   NaiveDate,
  /// Display name of the area, for log lines only.
  pub label:            Option<String>,
}

impl Record {
  pub fn new(
    identifying_code: impl Into<String>,
    population: u64,
    reference_date: NaiveDate,
  ) -> Self {
    Self {
      identifying_code: identifying_code.into(),
      population,
      reference_date,
      label: None,
    }
  }

  pub fn with_label(mut self, label: impl Into<String>) -> Self {
    self.label = Some(label.into());
    self
  }

  /// `"Bourg-en-Bresse (01053)"`, or the bare code when there is no label.
  pub fn display_name(&self) -> String {
    match &self.label {
      Some(label) => format!("{label} ({})", self.identifying_code),
      None => self.identifying_code.clone(),
    }
  }
}
