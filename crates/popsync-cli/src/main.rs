//! `popsync`: reconcile an INSEE legal-population table against Wikidata.
//!
//! Reads `popsync.toml` (or the path given with `--config`), layers
//! `POPSYNC_*` environment variables and flags over it, then processes every
//! row of the table in order.
//!
//! # Usage
//!
//! ```
//! popsync --kind commune --csv donnees_communes.csv \
//!   --reference-date 2021-01-01 --stated-in Q110000001 --dry-run
//! ```

mod dry_run;
mod settings;

use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use dry_run::DryRunExecutor;
use popsync_core::{
  config::ReconcileConfig,
  reconcile::{Outcome, Reconciler, RunReport},
  record::Record,
  store::WriteExecutor,
};
use popsync_csv::SourceOptions;
use popsync_store_sqlite::SqliteCache;
use popsync_wikibase::WikibaseClient;
use settings::{Cli, SyncConfig};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let config = SyncConfig::load(&cli)?;

  // Read the whole table first: a malformed file fails before any write.
  let mut options = SourceOptions::new(config.kind, config.reference_date);
  if let Some(offset) = config.resume_after {
    options = options.resume_after(offset);
  }
  let batch = popsync_csv::read_path(&config.csv_path, &options)
    .with_context(|| format!("failed to read {:?}", config.csv_path))?;

  let filter = config.kind.base_filter();
  let cache = match &config.cache_path {
    Some(path) => SqliteCache::open(path, filter)
      .await
      .with_context(|| format!("failed to open cache at {path:?}"))?,
    None => SqliteCache::open_in_memory(filter)
      .await
      .context("failed to open in-memory cache")?,
  };

  let client = Arc::new(
    WikibaseClient::new(config.wikibase.clone())
      .context("failed to build the Wikibase client")?,
  );
  let reconcile = config.reconcile_config();

  tracing::info!(
    kind = %config.kind,
    records = batch.records.len(),
    snapshot = cache.snapshot_id(),
    dry_run = config.dry_run,
    "starting run"
  );

  let report = if config.dry_run {
    run(cache, client, DryRunExecutor::default(), reconcile, batch.records)
      .await?
  } else {
    run(cache, client.clone(), client, reconcile, batch.records).await?
  };

  print_report(&report);
  anyhow::ensure!(
    report.failed() == 0,
    "{} of {} records failed",
    report.failed(),
    report.outcomes.len()
  );
  Ok(())
}

async fn run<W: WriteExecutor>(
  cache: SqliteCache,
  client: Arc<WikibaseClient>,
  executor: W,
  config: ReconcileConfig,
  records: Vec<Record>,
) -> anyhow::Result<RunReport> {
  let mut reconciler = Reconciler::new(cache, client, executor, config);
  reconciler
    .prime()
    .await
    .context("failed to load the code index")?;

  let report = reconciler.run(records).await;
  if let Ok(complete) = reconciler.cache().complete_entities().await {
    tracing::debug!(complete, "entities held in the snapshot");
  }
  Ok(report)
}

fn print_report(report: &RunReport) {
  for outcome in &report.outcomes {
    println!("{outcome}");
  }
  println!(
    "{} committed, {} deferred, {} failed, {} skipped",
    report.committed(),
    report.deferred(),
    report.failed(),
    report.skipped()
  );

  if let Some(offset) = resume_offset(report) {
    println!("resume with --resume-after {offset}");
  }
}

/// The largest offset whose skipped codes all finished: one below the lowest
/// ordinal among deferred and failed records. Taken over ordinals rather than
/// file position, since tables need not be sorted by ordinal (`2B001` sorts
/// after `2A350` but reads as a lower number).
fn resume_offset(report: &RunReport) -> Option<u64> {
  report
    .outcomes
    .iter()
    .filter(|o| {
      matches!(o.outcome, Outcome::Deferred { .. } | Outcome::Failed { .. })
    })
    .filter_map(|o| popsync_csv::code_ordinal(&o.code))
    .min()?
    .checked_sub(1)
}
