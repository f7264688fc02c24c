//! Record source for the INSEE legal-population tables.
//!
//! Reads a `;`-delimited table, skips rows that are not data (headers,
//! notes, rows with an unparsable population) and yields one
//! [`Record`](popsync_core::record::Record) per remaining row, in file order.
//! Pure synchronous; no HTTP or database dependencies.

pub mod error;
mod layout;

use std::{io, path::Path};

use chrono::NaiveDate;
pub use error::{Error, Result};
pub use layout::{CodeColumns, Layout, code_ordinal};
use popsync_core::{config::EntityKind, record::Record};

// ─── Options ─────────────────────────────────────────────────────────────────

/// How to read one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceOptions {
  pub layout:         Layout,
  /// Shared by every record of the batch.
  pub reference_date: NaiveDate,
  /// Only codes whose ordinal is strictly greater are emitted.
  pub resume_after:   Option<u64>,
}

impl SourceOptions {
  pub fn new(kind: EntityKind, reference_date: NaiveDate) -> Self {
    Self {
      layout: Layout::for_kind(kind),
      reference_date,
      resume_after: None,
    }
  }

  pub fn resume_after(mut self, ordinal: u64) -> Self {
    self.resume_after = Some(ordinal);
    self
  }
}

/// The records of one table and what was left out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
  pub records:   Vec<Record>,
  /// Rows skipped as malformed.
  pub malformed: usize,
  /// Data rows at or below the resume offset.
  pub resumed:   usize,
}

// ─── Reading ─────────────────────────────────────────────────────────────────

/// Read the table at `path`.
pub fn read_path(path: impl AsRef<Path>, options: &SourceOptions) -> Result<Batch> {
  let path = path.as_ref();
  let reader = builder()
    .from_path(path)
    .map_err(|source| Error::Open { path: path.to_owned(), source })?;
  read_records(reader, options)
}

/// Read a table from any byte stream.
pub fn read(input: impl io::Read, options: &SourceOptions) -> Result<Batch> {
  read_records(builder().from_reader(input), options)
}

fn builder() -> csv::ReaderBuilder {
  let mut builder = csv::ReaderBuilder::new();
  builder.delimiter(b';').has_headers(false).flexible(true);
  builder
}

fn read_records<R: io::Read>(
  mut reader: csv::Reader<R>,
  options: &SourceOptions,
) -> Result<Batch> {
  let layout = &options.layout;
  let mut batch = Batch::default();

  for row in reader.records() {
    let row = row.map_err(|source| Error::Read {
      line: source.position().map_or(0, |p| p.line()),
      source,
    })?;
    let line = row.position().map_or(0, |p| p.line());

    // Headers and notes: the first field of a data row is a number.
    let first = row.get(0).unwrap_or_default().trim();
    if first.is_empty() || !first.chars().all(|c| c.is_ascii_digit()) {
      tracing::debug!(line, "skipping non-data row");
      continue;
    }

    let Some(code) = layout.code(&row).filter(|c| !c.is_empty()) else {
      tracing::warn!(line, "skipping row without an identifying code");
      batch.malformed += 1;
      continue;
    };
    let Some(ordinal) = code_ordinal(&code) else {
      tracing::warn!(line, %code, "skipping row with a malformed code");
      batch.malformed += 1;
      continue;
    };
    if options.resume_after.is_some_and(|offset| ordinal <= offset) {
      batch.resumed += 1;
      continue;
    }
    let Some(population) = layout.population(&row) else {
      tracing::warn!(line, %code, "skipping row with an unparsable population");
      batch.malformed += 1;
      continue;
    };

    let mut record = Record::new(code, population, options.reference_date);
    if let Some(label) = layout.label(&row) {
      record = record.with_label(label);
    }
    batch.records.push(record);
  }

  tracing::info!(
    records = batch.records.len(),
    malformed = batch.malformed,
    resumed = batch.resumed,
    "read population table"
  );
  Ok(batch)
}

#[cfg(test)]
mod tests {
  use std::io::Write as _;

  use super::*;

  fn census() -> NaiveDate { NaiveDate::from_ymd_opt(2021, 1, 1).unwrap() }

  const COMMUNES: &str = "\
Populations légales 2021;;;;;;;;
Code région;Nom de la région;Code département;Code arrondissement;Code canton;Code commune;Nom de la commune;Population municipale;Population comptée à part
84;Auvergne-Rhône-Alpes;01;2;08;001;L'Abergement-Clémenciat;859;19
84;Auvergne-Rhône-Alpes;01;1;01;053;Bourg-en-Bresse;41365;1114
84;Auvergne-Rhône-Alpes;01;1;01;054;Bourg-Saint-Christophe;n/d;40
94;Corse;2A;1;01;004;Ajaccio;71361;1422
94;Corse;2B;2;03;033;Bastia;48503;1060
";

  fn communes(options: SourceOptions) -> Batch {
    read(COMMUNES.as_bytes(), &options).unwrap()
  }

  #[test]
  fn reads_data_rows_in_order() {
    let batch = communes(SourceOptions::new(EntityKind::Commune, census()));
    let codes: Vec<_> = batch
      .records
      .iter()
      .map(|r| r.identifying_code.as_str())
      .collect();
    assert_eq!(codes, ["01001", "01053", "2A004", "2B033"]);
    assert_eq!(batch.records[1].population, 41_365);
    assert_eq!(batch.records[1].label.as_deref(), Some("Bourg-en-Bresse"));
    assert!(batch.records.iter().all(|r| r.reference_date == census()));
  }

  #[test]
  fn unparsable_population_is_skipped_not_fatal() {
    let batch = communes(SourceOptions::new(EntityKind::Commune, census()));
    assert_eq!(batch.malformed, 1);
    assert!(batch.records.iter().all(|r| r.identifying_code != "01054"));
  }

  #[test]
  fn resume_offset_is_exclusive() {
    let options =
      SourceOptions::new(EntityKind::Commune, census()).resume_after(1053);
    let batch = communes(options);
    let codes: Vec<_> = batch
      .records
      .iter()
      .map(|r| r.identifying_code.as_str())
      .collect();
    assert_eq!(codes, ["2A004", "2B033"]);
    assert_eq!(batch.resumed, 2);
  }

  #[test]
  fn resume_offset_orders_corsica_as_twenty() {
    let options =
      SourceOptions::new(EntityKind::Commune, census()).resume_after(20_004);
    let batch = communes(options);
    assert_eq!(batch.records.len(), 1);
    assert_eq!(batch.records[0].identifying_code, "2B033");
  }

  #[test]
  fn regions_use_their_own_layout() {
    let input = "\
Code région;Nom de la région;Nombre d'arrondissements;Nombre de cantons;Nombre de communes;Population municipale;Population totale
11;Île-de-France;25;155;1265;12317279;12395148
84;Auvergne-Rhône-Alpes;39;245;4030;8114361;8235923
";
    let batch =
      read(input.as_bytes(), &SourceOptions::new(EntityKind::Region, census()))
        .unwrap();
    assert_eq!(batch.records.len(), 2);
    assert_eq!(batch.records[0].identifying_code, "11");
    assert_eq!(batch.records[0].population, 12_317_279);
    assert_eq!(batch.records[0].label.as_deref(), Some("Île-de-France"));
  }

  #[test]
  fn reads_from_a_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(COMMUNES.as_bytes()).unwrap();
    let batch = read_path(
      file.path(),
      &SourceOptions::new(EntityKind::Commune, census()),
    )
    .unwrap();
    assert_eq!(batch.records.len(), 4);
  }

  #[test]
  fn missing_file_is_an_open_error() {
    let err = read_path(
      "/nonexistent/donnees_communes.csv",
      &SourceOptions::new(EntityKind::Commune, census()),
    )
    .unwrap_err();
    assert!(matches!(err, Error::Open { .. }));
  }
}
