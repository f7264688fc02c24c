//! A write executor that logs plans instead of sending them.

use std::{
  convert::Infallible,
  sync::atomic::{AtomicU64, Ordering},
};

use popsync_core::{
  entity::EntityId,
  plan::Plan,
  store::{CommitId, WriteExecutor},
};

/// Counts would-be commits and hands out sequential ids starting at 1.
#[derive(Debug, Default)]
pub struct DryRunExecutor {
  commits: AtomicU64,
}

impl DryRunExecutor {
  pub fn commits(&self) -> u64 { self.commits.load(Ordering::Relaxed) }
}

impl WriteExecutor for DryRunExecutor {
  type Error = Infallible;

  async fn commit<'a>(
    &'a self,
    entity: EntityId,
    plan: &'a Plan,
    summary: &'a str,
  ) -> Result<CommitId, Infallible> {
    let n = self.commits.fetch_add(1, Ordering::Relaxed) + 1;
    tracing::info!(
      %entity,
      plan = %plan.describe(),
      facts = plan.facts.len(),
      summary,
      "dry run: not writing"
    );
    Ok(CommitId(n))
  }
}
