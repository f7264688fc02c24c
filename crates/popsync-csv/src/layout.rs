//! Column layouts of the INSEE legal-population tables.

use popsync_core::config::EntityKind;

/// How the identifying code is assembled from a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeColumns {
  /// The code is one column as-is.
  Single(usize),
  /// The first `len` characters of `prefix`, followed by `rest`. Commune
  /// codes are the département prefix plus the commune number.
  Prefixed { prefix: usize, len: usize, rest: usize },
}

/// Where the fields of a record live in a table row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
  pub code:       CodeColumns,
  pub population: usize,
  pub label:      usize,
}

impl Layout {
  pub fn for_kind(kind: EntityKind) -> Self {
    match kind {
      EntityKind::Commune => Self {
        code:       CodeColumns::Prefixed { prefix: 2, len: 2, rest: 5 },
        population: 7,
        label:      6,
      },
      EntityKind::Arrondissement => Self {
        code:       CodeColumns::Single(5),
        population: 8,
        label:      6,
      },
      EntityKind::Departement => Self {
        code:       CodeColumns::Single(2),
        population: 7,
        label:      6,
      },
      EntityKind::Region => Self {
        code:       CodeColumns::Single(0),
        population: 5,
        label:      1,
      },
    }
  }

  /// The identifying code of `row`, `None` when a column is missing.
  pub fn code(&self, row: &csv::StringRecord) -> Option<String> {
    match self.code {
      CodeColumns::Single(i) => row.get(i).map(|s| s.trim().to_owned()),
      CodeColumns::Prefixed { prefix, len, rest } => {
        let prefix = row.get(prefix)?.trim();
        let head: String = prefix.chars().take(len).collect();
        Some(head + row.get(rest)?.trim())
      }
    }
  }

  pub fn population(&self, row: &csv::StringRecord) -> Option<u64> {
    row.get(self.population)?.trim().parse().ok()
  }

  pub fn label(&self, row: &csv::StringRecord) -> Option<String> {
    row
      .get(self.label)
      .map(str::trim)
      .filter(|s| !s.is_empty())
      .map(str::to_owned)
  }
}

/// The numeric ordering key of a code, with the Corsican `A`/`B` read as
/// `0` (`"2A004"` → `20004`). Used for the resume offset only; lookups always
/// use the code verbatim.
pub fn code_ordinal(code: &str) -> Option<u64> {
  let digits: String = code
    .chars()
    .map(|c| if matches!(c, 'A' | 'B') { '0' } else { c })
    .collect();
  digits.parse().ok()
}
