//! Run configuration: an optional TOML file, `POPSYNC_*` environment
//! variables and command-line flags, in increasing precedence.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use chrono::NaiveDate;
use clap::Parser;
use popsync_core::{
  config::{CENSUS, EntityKind, ReconcileConfig},
  entity::EntityId,
};
use popsync_wikibase::WikibaseConfig;
use serde::Deserialize;

// ─── CLI args ────────────────────────────────────────────────────────────────

#[derive(Parser, Debug, Default)]
#[command(
  name = "popsync",
  version,
  about = "Write INSEE legal populations to Wikidata"
)]
pub struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "popsync.toml")]
  pub config: PathBuf,

  /// Administrative level of the input table.
  #[arg(long)]
  pub kind: Option<EntityKind>,

  /// The `;`-delimited INSEE table to read.
  #[arg(long = "csv", value_name = "FILE")]
  pub csv_path: Option<PathBuf>,

  /// Census reference date, e.g. `2021-01-01`.
  #[arg(long)]
  pub reference_date: Option<NaiveDate>,

  /// Item of the source publication, e.g. `Q110000001`.
  #[arg(long)]
  pub stated_in: Option<EntityId>,

  /// Stop writing after this many commits.
  #[arg(long)]
  pub max_commits: Option<usize>,

  /// Skip codes up to and including this ordinal.
  #[arg(long)]
  pub resume_after: Option<u64>,

  /// Plan and log every write without sending it.
  #[arg(long)]
  pub dry_run: bool,

  /// SQLite file for the snapshot cache; in memory when unset.
  #[arg(long = "cache", value_name = "FILE")]
  pub cache_path: Option<PathBuf>,
}

// ─── SyncConfig ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
  pub kind:                 EntityKind,
  pub csv_path:             PathBuf,
  pub reference_date:       NaiveDate,
  pub stated_in:            EntityId,
  #[serde(default = "default_determination_method")]
  pub determination_method: Option<EntityId>,
  #[serde(default = "default_summary")]
  pub summary:              String,
  #[serde(default)]
  pub max_commits:          Option<usize>,
  #[serde(default)]
  pub resume_after:         Option<u64>,
  #[serde(default)]
  pub dry_run:              bool,
  #[serde(default)]
  pub cache_path:           Option<PathBuf>,
  #[serde(default)]
  pub wikibase:             WikibaseConfig,
}

fn default_determination_method() -> Option<EntityId> { Some(CENSUS) }

fn default_summary() -> String {
  "Update population for {year} (INSEE legal populations)".to_owned()
}

impl SyncConfig {
  /// Layer the config file at `cli.config` (if present), the environment and
  /// the flags set on `cli`.
  pub fn load(cli: &Cli) -> anyhow::Result<Self> {
    let path = |p: &Path| expand_tilde(p).to_string_lossy().into_owned();

    let settings = config::Config::builder()
      .add_source(config::File::from(cli.config.clone()).required(false))
      .add_source(
        config::Environment::with_prefix("POPSYNC")
          .prefix_separator("_")
          .separator("__"),
      )
      .set_override_option("kind", cli.kind.map(|k| k.to_string()))?
      .set_override_option("csv_path", cli.csv_path.as_deref().map(path))?
      .set_override_option(
        "reference_date",
        cli.reference_date.map(|d| d.to_string()),
      )?
      .set_override_option("stated_in", cli.stated_in.map(|q| q.to_string()))?
      .set_override_option("max_commits", cli.max_commits.map(|n| n as i64))?
      .set_override_option("resume_after", cli.resume_after.map(|n| n as i64))?
      .set_override_option("dry_run", cli.dry_run.then_some(true))?
      .set_override_option("cache_path", cli.cache_path.as_deref().map(path))?
      .build()
      .context("failed to read configuration")?;

    let mut config: Self = settings
      .try_deserialize()
      .context("failed to deserialise SyncConfig")?;
    config.csv_path = expand_tilde(&config.csv_path);
    config.cache_path = config.cache_path.as_deref().map(expand_tilde);
    Ok(config)
  }

  pub fn reconcile_config(&self) -> ReconcileConfig {
    let mut config =
      ReconcileConfig::new(self.kind.base_filter(), self.stated_in);
    config.determination_method = self.determination_method;
    config.summary = self.summary.clone();
    config.max_commits = self.max_commits;
    config
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use std::io::Write as _;

  use super::*;

  fn config_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
  }

  const FILE: &str = r#"
kind = "commune"
csv_path = "/data/donnees_communes.csv"
reference_date = "2021-01-01"
stated_in = "Q110000001"
max_commits = 50

[wikibase]
username = "Bot@popsync"
maxlag = 10
"#;

  #[test]
  fn reads_the_file_with_defaults() {
    let file = config_file(FILE);
    let cli = Cli { config: file.path().to_owned(), ..Cli::default() };
    let config = SyncConfig::load(&cli).unwrap();

    assert_eq!(config.kind, EntityKind::Commune);
    assert_eq!(config.csv_path, PathBuf::from("/data/donnees_communes.csv"));
    assert_eq!(
      config.reference_date,
      NaiveDate::from_ymd_opt(2021, 1, 1).unwrap()
    );
    assert_eq!(config.stated_in, EntityId::new(110_000_001));
    assert_eq!(config.determination_method, Some(CENSUS));
    assert_eq!(config.max_commits, Some(50));
    assert!(!config.dry_run);
    assert!(config.cache_path.is_none());
    assert_eq!(config.wikibase.username.as_deref(), Some("Bot@popsync"));
    assert_eq!(config.wikibase.maxlag, 10);
    assert_eq!(config.wikibase.max_retries, 5);
  }

  #[test]
  fn flags_override_the_file() {
    let file = config_file(FILE);
    let cli = Cli {
      config: file.path().to_owned(),
      kind: Some(EntityKind::Region),
      csv_path: Some(PathBuf::from("/data/donnees_regions.csv")),
      max_commits: Some(3),
      resume_after: Some(75),
      dry_run: true,
      ..Cli::default()
    };
    let config = SyncConfig::load(&cli).unwrap();

    assert_eq!(config.kind, EntityKind::Region);
    assert_eq!(config.csv_path, PathBuf::from("/data/donnees_regions.csv"));
    assert_eq!(config.max_commits, Some(3));
    assert_eq!(config.resume_after, Some(75));
    assert!(config.dry_run);
  }

  #[test]
  fn flags_alone_are_enough() {
    let cli = Cli {
      config: PathBuf::from("/nonexistent/popsync.toml"),
      kind: Some(EntityKind::Departement),
      csv_path: Some(PathBuf::from("/data/donnees_departements.csv")),
      reference_date: NaiveDate::from_ymd_opt(2020, 1, 1),
      stated_in: Some(EntityId::new(7)),
      ..Cli::default()
    };
    let config = SyncConfig::load(&cli).unwrap();
    assert_eq!(config.kind, EntityKind::Departement);
    assert_eq!(config.wikibase.api_url, "https://www.wikidata.org/w/api.php");
  }

  #[test]
  fn missing_required_keys_are_an_error() {
    let cli = Cli {
      config: PathBuf::from("/nonexistent/popsync.toml"),
      ..Cli::default()
    };
    assert!(SyncConfig::load(&cli).is_err());
  }

  #[test]
  fn reconcile_config_follows_the_kind() {
    let file = config_file(FILE);
    let cli = Cli { config: file.path().to_owned(), ..Cli::default() };
    let config = SyncConfig::load(&cli).unwrap().reconcile_config();

    assert_eq!(config.filter, EntityKind::Commune.base_filter());
    assert_eq!(config.stated_in, EntityId::new(110_000_001));
    assert_eq!(config.max_commits, Some(50));
    assert!(config.summary.contains("{year}"));
  }
}
