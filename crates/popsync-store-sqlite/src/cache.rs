//! [`SqliteCache`]: the SQLite implementation of [`SnapshotCache`].

use std::{collections::BTreeSet, path::Path};

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use popsync_core::{
  config::BaseFilter,
  entity::{Entity, EntityId, PropertyId},
  fact::Fact,
  store::SnapshotCache,
};

use crate::{
  Error, Result,
  encode::{
    FactRow, decode_entity_id, encode_dt, encode_entity_id, encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Cache ───────────────────────────────────────────────────────────────────

/// A snapshot cache backed by SQLite, bound to one base filter.
///
/// Opening the cache starts a new snapshot for the filter and prunes the
/// older snapshots of the same filter, so a run never reads another run's
/// view. Snapshots of other filters in the same file are left alone.
///
/// Cloning is cheap: the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteCache {
  conn:        tokio_rusqlite::Connection,
  filter:      BaseFilter,
  snapshot_id: String,
}

impl SqliteCache {
  /// Open (or create) a cache file at `path` and start a snapshot.
  pub async fn open(path: impl AsRef<Path>, filter: BaseFilter) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn, filter).await
  }

  /// Open an in-memory cache; nothing outlives the process.
  pub async fn open_in_memory(filter: BaseFilter) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn, filter).await
  }

  async fn init(conn: tokio_rusqlite::Connection, filter: BaseFilter) -> Result<Self> {
    let snapshot_id = encode_uuid(Uuid::new_v4());
    let cache = Self { conn, filter, snapshot_id };
    cache.begin_snapshot().await?;
    Ok(cache)
  }

  async fn begin_snapshot(&self) -> Result<()> {
    let snapshot_id = self.snapshot_id.clone();
    let signature   = self.filter.signature();
    let instance_of = self.filter.instance_of.to_string();
    let country     = self.filter.country.to_string();
    let property    = self.filter.identifying_property.to_string();
    let created_at  = encode_dt(Utc::now());

    let pruned: usize = self
      .conn
      .call(move |conn| {
        conn.execute_batch(SCHEMA)?;
        let tx = conn.transaction()?;
        let pruned = tx.execute(
          "DELETE FROM snapshots WHERE filter_signature = ?1",
          rusqlite::params![signature],
        )?;
        tx.execute(
          "INSERT INTO snapshots (
             snapshot_id, filter_signature, instance_of, country,
             identifying_property, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![
            snapshot_id,
            signature,
            instance_of,
            country,
            property,
            created_at,
          ],
        )?;
        tx.commit()?;
        Ok(pruned)
      })
      .await?;

    tracing::debug!(
      snapshot = %self.snapshot_id,
      pruned,
      "started snapshot cache"
    );
    Ok(())
  }

  /// The id of this run's snapshot.
  pub fn snapshot_id(&self) -> &str { &self.snapshot_id }

  pub fn filter(&self) -> &BaseFilter { &self.filter }

  /// Number of entities holding a complete fact snapshot.
  pub async fn complete_entities(&self) -> Result<usize> {
    let snapshot_id = self.snapshot_id.clone();
    let n: i64 = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT COUNT(*) FROM entities WHERE snapshot_id = ?1",
          rusqlite::params![snapshot_id],
          |r| r.get(0),
        )?)
      })
      .await?;
    Ok(usize::try_from(n).unwrap_or_default())
  }
}

/// Identifying codes carried by `entity`'s string facts on `property`.
fn codes_of(entity: &Entity, property: PropertyId) -> Vec<String> {
  entity
    .facts_for(property)
    .filter_map(|f| f.value.as_str())
    .map(str::to_owned)
    .collect()
}

// ─── SnapshotCache impl ──────────────────────────────────────────────────────

impl SnapshotCache for SqliteCache {
  type Error = Error;

  async fn is_primed(&self) -> Result<bool> {
    let snapshot_id = self.snapshot_id.clone();
    let primed = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT primed_at IS NOT NULL FROM snapshots WHERE snapshot_id = ?1",
              rusqlite::params![snapshot_id],
              |r| r.get::<_, bool>(0),
            )
            .optional()?
            .unwrap_or(false),
        )
      })
      .await?;
    Ok(primed)
  }

  async fn prime(&self, index: Vec<(String, EntityId)>) -> Result<usize> {
    let snapshot_id = self.snapshot_id.clone();
    let primed_at   = encode_dt(Utc::now());
    let rows = index
      .into_iter()
      .map(|(code, id)| Ok((code, encode_entity_id(id)?)))
      .collect::<Result<Vec<_>>>()?;

    let stored = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut stored = 0;
        {
          let mut stmt = tx.prepare(
            "INSERT OR IGNORE INTO codes (snapshot_id, code, entity_id)
             VALUES (?1, ?2, ?3)",
          )?;
          for (code, id) in &rows {
            stored += stmt.execute(rusqlite::params![snapshot_id, code, id])?;
          }
        }
        tx.execute(
          "UPDATE snapshots SET primed_at = ?2 WHERE snapshot_id = ?1",
          rusqlite::params![snapshot_id, primed_at],
        )?;
        tx.commit()?;
        Ok(stored)
      })
      .await?;
    Ok(stored)
  }

  async fn lookup_by_code<'a>(&'a self, code: &'a str) -> Result<BTreeSet<EntityId>> {
    let snapshot_id = self.snapshot_id.clone();
    let code        = code.to_owned();

    let ids: Vec<i64> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT entity_id FROM codes WHERE snapshot_id = ?1 AND code = ?2",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![snapshot_id, code], |r| r.get(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    ids.into_iter().map(decode_entity_id).collect()
  }

  async fn is_complete(&self, id: EntityId) -> Result<bool> {
    let snapshot_id = self.snapshot_id.clone();
    let entity_id   = encode_entity_id(id)?;

    let complete = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT 1 FROM entities WHERE snapshot_id = ?1 AND entity_id = ?2",
              rusqlite::params![snapshot_id, entity_id],
              |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false),
        )
      })
      .await?;
    Ok(complete)
  }

  async fn put_entity(&self, entity: Entity) -> Result<()> {
    let snapshot_id = self.snapshot_id.clone();
    let entity_id   = encode_entity_id(entity.id)?;
    let stored_at   = encode_dt(Utc::now());
    let codes       = codes_of(&entity, self.filter.identifying_property);
    let rows = entity
      .facts
      .iter()
      .map(FactRow::from_fact)
      .collect::<Result<Vec<_>>>()?;

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "DELETE FROM facts WHERE snapshot_id = ?1 AND entity_id = ?2",
          rusqlite::params![snapshot_id, entity_id],
        )?;
        tx.execute(
          "DELETE FROM entities WHERE snapshot_id = ?1 AND entity_id = ?2",
          rusqlite::params![snapshot_id, entity_id],
        )?;
        tx.execute(
          "DELETE FROM codes WHERE snapshot_id = ?1 AND entity_id = ?2",
          rusqlite::params![snapshot_id, entity_id],
        )?;
        tx.execute(
          "INSERT INTO entities (snapshot_id, entity_id, stored_at)
           VALUES (?1, ?2, ?3)",
          rusqlite::params![snapshot_id, entity_id, stored_at],
        )?;
        {
          let mut stmt = tx.prepare(
            "INSERT INTO facts (
               snapshot_id, entity_id, position, statement_id, property,
               rank, value_json, qualifiers_json, references_json
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
          )?;
          for (position, row) in rows.iter().enumerate() {
            stmt.execute(rusqlite::params![
              snapshot_id,
              entity_id,
              position as i64,
              row.statement_id,
              row.property,
              row.rank,
              row.value_json,
              row.qualifiers_json,
              row.references_json,
            ])?;
          }

          let mut stmt = tx.prepare(
            "INSERT OR IGNORE INTO codes (snapshot_id, code, entity_id)
             VALUES (?1, ?2, ?3)",
          )?;
          for code in &codes {
            stmt.execute(rusqlite::params![snapshot_id, code, entity_id])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_facts(
    &self,
    id: EntityId,
    property: Option<PropertyId>,
  ) -> Result<Vec<Fact>> {
    let snapshot_id = self.snapshot_id.clone();
    let entity_id   = encode_entity_id(id)?;
    let property    = property.map(|p| p.to_string());

    let rows: Vec<FactRow> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT statement_id, property, rank, value_json, qualifiers_json,
                  references_json
           FROM facts
           WHERE snapshot_id = ?1
             AND entity_id = ?2
             AND (?3 IS NULL OR property = ?3)
           ORDER BY position",
        )?;
        let rows = stmt
          .query_map(
            rusqlite::params![snapshot_id, entity_id, property],
            |row| {
              Ok(FactRow {
                statement_id:    row.get(0)?,
                property:        row.get(1)?,
                rank:            row.get(2)?,
                value_json:      row.get(3)?,
                qualifiers_json: row.get(4)?,
                references_json: row.get(5)?,
              })
            },
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    rows.into_iter().map(FactRow::into_fact).collect()
  }
}
