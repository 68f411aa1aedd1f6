//! Durable replication progress, kept in the target database.
//!
//! Two tables: the checkpoint map (job key → binlog anchor) and the
//! `full_load_progress` ledger of completed parallel-load ranges. Every
//! statement is fully database-qualified, so any pooled connection can
//! serve it regardless of its default database.

use crate::error::CheckpointError;
use connectors::sql::pool::MySqlPool;
use model::core::{anchor::BinlogAnchor, table::TableRef};
use model::events::FullLoadRange;
use mysql_async::prelude::Queryable;
use tracing::debug;

pub const LEDGER_TABLE: &str = "full_load_progress";

#[derive(Clone)]
pub struct CheckpointStore {
    pool: MySqlPool,
    checkpoints: TableRef,
    ledger: TableRef,
}

impl CheckpointStore {
    /// `checkpoint_table` is the unqualified name from configuration; it
    /// lives in the target database alongside the ledger.
    pub fn new(pool: MySqlPool, target_db: &str, checkpoint_table: &str) -> Self {
        Self {
            pool,
            checkpoints: TableRef::new(target_db, checkpoint_table),
            ledger: TableRef::new(target_db, LEDGER_TABLE),
        }
    }

    /// Idempotent creation of both progress tables.
    pub async fn ensure(&self) -> Result<(), CheckpointError> {
        let mut conn = self.pool.get().await?;
        conn.query_drop(self.create_checkpoints_sql()).await?;
        conn.query_drop(self.create_ledger_sql()).await?;
        Ok(())
    }

    /// Last-writer-wins upsert of the job's anchor. The row is durable
    /// before this returns; the caller may treat everything at or before
    /// the anchor as safely applied.
    pub async fn write(&self, key: &str, anchor: &BinlogAnchor) -> Result<(), CheckpointError> {
        let mut conn = self.pool.get().await?;
        conn.exec_drop(self.upsert_sql(), (key, &anchor.file, anchor.pos))
            .await?;
        debug!(key, anchor = %anchor, "checkpoint written");
        Ok(())
    }

    pub async fn read(&self, key: &str) -> Result<Option<BinlogAnchor>, CheckpointError> {
        let mut conn = self.pool.get().await?;
        let row: Option<(String, u64)> = conn.exec_first(self.select_sql(), (key,)).await?;
        Ok(row.map(|(file, pos)| BinlogAnchor::new(file, pos)))
    }

    /// Record a completed parallel-load range. Idempotent on
    /// `(table_key, range_start)`.
    pub async fn mark_range_done(&self, key: &str, start: i64, end: i64) -> Result<(), CheckpointError> {
        let mut conn = self.pool.get().await?;
        conn.exec_drop(self.mark_range_sql(), (key, start, end))
            .await?;
        Ok(())
    }

    /// Completed ranges for the job, sorted by start. Consulted on resume
    /// so finished chunks are not copied twice.
    pub async fn done_ranges(&self, key: &str) -> Result<Vec<FullLoadRange>, CheckpointError> {
        let mut conn = self.pool.get().await?;
        let rows: Vec<(i64, i64)> = conn.exec(self.ranges_sql(), (key,)).await?;
        Ok(rows
            .into_iter()
            .map(|(start, end)| FullLoadRange {
                table_key: key.to_string(),
                start,
                end,
            })
            .collect())
    }

    /// Fresh start: forget both the anchor and the range ledger for the
    /// job. Invoked when the target table is dropped between full-load
    /// attempts.
    pub async fn clear(&self, key: &str) -> Result<(), CheckpointError> {
        let mut conn = self.pool.get().await?;
        conn.exec_drop(
            format!("DELETE FROM {} WHERE id = ?", self.checkpoints.qualified()),
            (key,),
        )
        .await?;
        conn.exec_drop(
            format!(
                "DELETE FROM {} WHERE table_key = ?",
                self.ledger.qualified()
            ),
            (key,),
        )
        .await?;
        Ok(())
    }

    fn create_checkpoints_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\
                 id VARCHAR(255) NOT NULL PRIMARY KEY,\
                 binlog_file VARCHAR(255) NOT NULL,\
                 binlog_pos BIGINT NOT NULL,\
                 updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP \
                     ON UPDATE CURRENT_TIMESTAMP\
             )",
            self.checkpoints.qualified()
        )
    }

    fn create_ledger_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\
                 table_key VARCHAR(255) NOT NULL,\
                 range_start BIGINT NOT NULL,\
                 range_end BIGINT NOT NULL,\
                 status VARCHAR(32) NOT NULL,\
                 updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP \
                     ON UPDATE CURRENT_TIMESTAMP,\
                 PRIMARY KEY (table_key, range_start)\
             )",
            self.ledger.qualified()
        )
    }

    fn upsert_sql(&self) -> String {
        format!(
            "INSERT INTO {} (id, binlog_file, binlog_pos) VALUES (?, ?, ?) \
             ON DUPLICATE KEY UPDATE binlog_file = VALUES(binlog_file), \
             binlog_pos = VALUES(binlog_pos)",
            self.checkpoints.qualified()
        )
    }

    fn select_sql(&self) -> String {
        format!(
            "SELECT binlog_file, binlog_pos FROM {} WHERE id = ?",
            self.checkpoints.qualified()
        )
    }

    fn mark_range_sql(&self) -> String {
        format!(
            "INSERT INTO {} (table_key, range_start, range_end, status) \
             VALUES (?, ?, ?, 'done') \
             ON DUPLICATE KEY UPDATE range_end = VALUES(range_end), status = 'done'",
            self.ledger.qualified()
        )
    }

    fn ranges_sql(&self) -> String {
        format!(
            "SELECT range_start, range_end FROM {} \
             WHERE table_key = ? AND status = 'done' ORDER BY range_start",
            self.ledger.qualified()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Pool construction is lazy; no connection is made here.
    fn store() -> CheckpointStore {
        let pool = MySqlPool::connect("mysql://root@localhost:3306/ignored").unwrap();
        CheckpointStore::new(pool, "tgt", "cdc_checkpoints")
    }

    #[test]
    fn every_statement_is_fully_qualified() {
        let store = store();
        for sql in [
            store.create_checkpoints_sql(),
            store.create_ledger_sql(),
            store.upsert_sql(),
            store.select_sql(),
            store.mark_range_sql(),
            store.ranges_sql(),
        ] {
            assert!(
                sql.contains("`tgt`.`cdc_checkpoints`") || sql.contains("`tgt`.`full_load_progress`"),
                "statement is not database-qualified: {sql}"
            );
        }
    }

    #[test]
    fn upsert_is_last_writer_wins() {
        let sql = store().upsert_sql();
        assert!(sql.contains("ON DUPLICATE KEY UPDATE"));
        assert!(sql.contains("binlog_file = VALUES(binlog_file)"));
        assert!(sql.contains("binlog_pos = VALUES(binlog_pos)"));
    }

    #[test]
    fn ledger_is_keyed_on_table_key_and_start() {
        let sql = store().create_ledger_sql();
        assert!(sql.contains("PRIMARY KEY (table_key, range_start)"));
    }

    #[test]
    fn done_ranges_come_back_sorted() {
        let sql = store().ranges_sql();
        assert!(sql.contains("ORDER BY range_start"));
        assert!(sql.contains("status = 'done'"));
    }
}
