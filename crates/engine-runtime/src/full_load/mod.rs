//! Initial bulk copy of the source table into the target.
//!
//! The engine captures the source binlog position *before* reading any
//! row and hands that anchor back as the resume point. Some changes that
//! the snapshot already reflects will therefore be replayed by the apply
//! engine; every write here and there is keyed on the primary key, so
//! the replay is idempotent.
//!
//! Two copy modes: a parallel range copy when the primary key is a
//! single integer column, and a keyset-streaming copy for everything
//! else. Neither ever issues OFFSET.

pub mod partition;
pub mod session;

use crate::binlog::current_anchor;
use crate::error::ReplicationError;
use crate::full_load::partition::{partition, pending_ranges};
use crate::full_load::session::BulkSession;
use crate::writer::write_insert_batch;
use connectors::sql::convert::row_to_image;
use connectors::sql::error::DbError;
use connectors::sql::metadata::TableMetadata;
use connectors::sql::pool::MySqlPool;
use connectors::sql::schema::copy_schema;
use connectors::sql::statements;
use engine_core::checkpoint::CheckpointStore;
use engine_core::metrics::Metrics;
use engine_core::retry::RetryPolicy;
use model::core::anchor::BinlogAnchor;
use model::core::table::TableRef;
use model::core::value::Value;
use model::events::RowImage;
use mysql_async::Conn;
use mysql_async::prelude::Queryable;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct FullLoadConfig {
    pub workers: usize,
    pub batch_size: usize,
    pub max_retries: usize,
    pub drop_on_retry: bool,
}

pub struct FullLoadEngine {
    src: MySqlPool,
    tgt: MySqlPool,
    store: CheckpointStore,
    metrics: Metrics,
    config: FullLoadConfig,
    cancel: CancellationToken,
}

impl FullLoadEngine {
    pub fn new(
        src: MySqlPool,
        tgt: MySqlPool,
        store: CheckpointStore,
        metrics: Metrics,
        config: FullLoadConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            src,
            tgt,
            store,
            metrics,
            config,
            cancel,
        }
    }

    /// Copy every current source row to `tgt_table` and return the
    /// pre-snapshot anchor the binlog apply engine must resume from.
    pub async fn run(
        &self,
        meta: &TableMetadata,
        tgt_table: &TableRef,
    ) -> Result<BinlogAnchor, ReplicationError> {
        let policy = RetryPolicy::for_full_load(self.config.max_retries);
        let mut attempt = 0;

        loop {
            if self.cancel.is_cancelled() {
                return Err(ReplicationError::Cancelled);
            }

            match self.attempt(meta, tgt_table).await {
                Ok(anchor) => return Ok(anchor),
                // database and progress-store failures burn an attempt;
                // everything else (cancellation, schema drift) is final
                Err(err)
                    if matches!(
                        err,
                        ReplicationError::Db(_) | ReplicationError::Checkpoint(_)
                    ) =>
                {
                    attempt += 1;
                    if attempt >= self.config.max_retries {
                        return Err(ReplicationError::FullLoadExhausted {
                            attempts: attempt,
                            source: Box::new(err),
                        });
                    }

                    self.metrics.record_error(err.to_string());
                    warn!(attempt, error = %err, "full-load attempt failed");

                    if self.config.drop_on_retry {
                        copy_schema(&self.src, &self.tgt, &meta.table, tgt_table, true).await?;
                        self.store.clear(&meta.table.key()).await?;
                        info!("target table recreated; checkpoint and range ledger cleared");
                    }

                    tokio::time::sleep(policy.backoff_delay(attempt - 1)).await;
                }
                Err(other) => return Err(other),
            }
        }
    }

    async fn attempt(
        &self,
        meta: &TableMetadata,
        tgt_table: &TableRef,
    ) -> Result<BinlogAnchor, ReplicationError> {
        // A₀: anything that changes from here on is covered by the
        // binlog replay.
        let anchor = current_anchor(&self.src).await?;
        info!(anchor = %anchor, "captured pre-snapshot binlog anchor");

        let rows = match meta.single_int_pk() {
            Some(pk) => {
                let pk_col = pk.name.clone();
                info!(pk = %pk_col, workers = self.config.workers, "parallel full load");
                self.parallel_load(meta, tgt_table, &pk_col).await?
            }
            None => {
                info!(pk = ?meta.pk_columns, "keyset-streaming full load");
                self.streaming_load(meta, tgt_table).await?
            }
        };

        if self.cancel.is_cancelled() {
            return Err(ReplicationError::Cancelled);
        }

        info!(rows, "full load complete");
        Ok(anchor)
    }

    async fn parallel_load(
        &self,
        meta: &TableMetadata,
        tgt_table: &TableRef,
        pk_col: &str,
    ) -> Result<u64, ReplicationError> {
        let span = self.pk_span(meta, pk_col).await?;
        let Some((min, max)) = span else {
            info!("source table is empty, nothing to copy");
            return Ok(0);
        };

        let key = meta.table.key();
        let planned = partition(min, max, self.config.workers);
        let done = self.store.done_ranges(&key).await?;
        let pending = pending_ranges(&planned, &done);
        if pending.len() < planned.len() {
            info!(
                done = planned.len() - pending.len(),
                total = planned.len(),
                "resuming full load, skipping completed ranges"
            );
        }
        if pending.is_empty() {
            return Ok(0);
        }

        // Static assignment: ranges are disjoint, so workers never touch
        // the same row and their ordering does not matter.
        let mut assignments: Vec<Vec<(i64, i64)>> = vec![Vec::new(); self.config.workers];
        for (i, range) in pending.into_iter().enumerate() {
            assignments[i % self.config.workers].push(range);
        }

        let pk_index = meta
            .columns
            .iter()
            .position(|c| c.name == pk_col)
            .ok_or_else(|| DbError::Decode(format!("pk column {pk_col} not in metadata")))?;

        let mut handles: Vec<JoinHandle<Result<u64, ReplicationError>>> = Vec::new();
        for ranges in assignments.into_iter().filter(|r| !r.is_empty()) {
            let src = self.src.clone();
            let tgt = self.tgt.clone();
            let store = self.store.clone();
            let metrics = self.metrics.clone();
            let meta = meta.clone();
            let tgt_table = tgt_table.clone();
            let pk_col = pk_col.to_string();
            let key = key.clone();
            let cancel = self.cancel.clone();
            let batch_size = self.config.batch_size;

            handles.push(tokio::spawn(async move {
                let mut session = BulkSession::begin(&tgt).await?;
                let result = range_worker(
                    &src,
                    session.conn(),
                    &store,
                    &metrics,
                    &meta,
                    &tgt_table,
                    &pk_col,
                    pk_index,
                    &key,
                    &ranges,
                    batch_size,
                    &cancel,
                )
                .await;
                let finished = session.finish().await;
                let rows = result?;
                finished?;
                Ok(rows)
            }));
        }

        let mut total = 0u64;
        for handle in handles {
            total += handle.await??;
        }
        Ok(total)
    }

    async fn pk_span(
        &self,
        meta: &TableMetadata,
        pk_col: &str,
    ) -> Result<Option<(i64, i64)>, ReplicationError> {
        let mut conn = self.src.get().await?;
        let row: Option<(Option<i64>, Option<i64>)> = conn
            .query_first(statements::min_max_pk(&meta.table, pk_col))
            .await
            .map_err(DbError::from)?;
        Ok(match row {
            Some((Some(min), Some(max))) => Some((min, max)),
            _ => None,
        })
    }

    async fn streaming_load(
        &self,
        meta: &TableMetadata,
        tgt_table: &TableRef,
    ) -> Result<u64, ReplicationError> {
        let (tx, rx) = mpsc::channel::<Vec<RowImage>>(2 * self.config.workers);
        let rx = Arc::new(Mutex::new(rx));

        let fetcher: JoinHandle<Result<u64, ReplicationError>> = {
            let src = self.src.clone();
            let meta = meta.clone();
            let cancel = self.cancel.clone();
            let batch_size = self.config.batch_size;
            tokio::spawn(async move { fetch_pages(&src, &meta, batch_size, tx, &cancel).await })
        };

        let mut handles: Vec<JoinHandle<Result<u64, ReplicationError>>> = vec![fetcher];
        for _ in 0..self.config.workers {
            let tgt = self.tgt.clone();
            let metrics = self.metrics.clone();
            let columns = meta.column_names();
            let tgt_table = tgt_table.clone();
            let rx = rx.clone();

            handles.push(tokio::spawn(async move {
                let mut session = BulkSession::begin(&tgt).await?;
                let mut written = 0u64;
                let result: Result<(), ReplicationError> = loop {
                    let batch = {
                        let mut guard = rx.lock().await;
                        guard.recv().await
                    };
                    match batch {
                        Some(rows) => {
                            match write_insert_batch(session.conn(), &tgt_table, &columns, &rows)
                                .await
                            {
                                Ok(count) => {
                                    metrics.add_rows_loaded(count);
                                    written += count;
                                }
                                Err(err) => break Err(err.into()),
                            }
                        }
                        None => break Ok(()),
                    }
                };
                let finished = session.finish().await;
                result?;
                finished?;
                Ok(written)
            }));
        }

        // The workers hold the only receiver handles now; when they all
        // exit the fetcher's send fails instead of blocking forever.
        drop(rx);

        let mut total = 0u64;
        for handle in handles {
            total += handle.await??;
        }
        Ok(total)
    }
}

/// Fetcher side of the streaming pipeline: one keyset page per loop,
/// pushed into the bounded channel. Closing the channel (by drop) is the
/// end-of-stream signal for the workers.
async fn fetch_pages(
    src: &MySqlPool,
    meta: &TableMetadata,
    batch_size: usize,
    tx: mpsc::Sender<Vec<RowImage>>,
    cancel: &CancellationToken,
) -> Result<u64, ReplicationError> {
    let columns = meta.column_names();
    let pk_idx = meta.pk_indexes();
    let mut conn = src.get().await?;
    let mut last_key: Option<Vec<Value>> = None;
    let mut fetched = 0u64;

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let sql = statements::keyset_page(
            &meta.table,
            &columns,
            &meta.pk_columns,
            last_key.as_deref(),
            batch_size,
        );
        let rows: Vec<mysql_async::Row> =
            conn.exec(sql, ()).await.map_err(DbError::from)?;
        if rows.is_empty() {
            break;
        }

        let mut images = Vec::with_capacity(rows.len());
        for row in rows {
            images.push(row_to_image(row, &meta.columns)?);
        }

        let page_len = images.len();
        fetched += page_len as u64;
        if let Some(last) = images.last() {
            last_key = Some(pk_idx.iter().map(|i| last.values()[*i].clone()).collect());
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            sent = tx.send(images) => {
                if sent.is_err() {
                    // all workers gone; their error surfaces at join
                    break;
                }
            }
        }

        if page_len < batch_size {
            break;
        }
    }

    Ok(fetched)
}

#[allow(clippy::too_many_arguments)]
async fn range_worker(
    src: &MySqlPool,
    conn: &mut Conn,
    store: &CheckpointStore,
    metrics: &Metrics,
    meta: &TableMetadata,
    tgt_table: &TableRef,
    pk_col: &str,
    pk_index: usize,
    key: &str,
    ranges: &[(i64, i64)],
    batch_size: usize,
    cancel: &CancellationToken,
) -> Result<u64, ReplicationError> {
    let columns = meta.column_names();
    let mut total = 0u64;

    for (start, end) in ranges.iter().copied() {
        if cancel.is_cancelled() {
            return Err(ReplicationError::Cancelled);
        }

        let copied = copy_range(
            src, conn, meta, tgt_table, &columns, pk_col, pk_index, start, end, batch_size,
        )
        .await?;
        store.mark_range_done(key, start, end).await?;
        metrics.add_rows_loaded(copied);
        total += copied;
        info!(start, end, rows = copied, "range copied");
    }

    Ok(total)
}

#[allow(clippy::too_many_arguments)]
async fn copy_range(
    src: &MySqlPool,
    conn: &mut Conn,
    meta: &TableMetadata,
    tgt_table: &TableRef,
    columns: &[String],
    pk_col: &str,
    pk_index: usize,
    start: i64,
    end: i64,
    batch_size: usize,
) -> Result<u64, DbError> {
    let mut src_conn = src.get().await?;
    let mut last: Option<i64> = None;
    let mut total = 0u64;

    loop {
        let sql = statements::range_page(&meta.table, columns, pk_col, start, end, last, batch_size);
        let rows: Vec<mysql_async::Row> = src_conn.exec(sql, ()).await?;
        if rows.is_empty() {
            break;
        }

        let mut images = Vec::with_capacity(rows.len());
        for row in rows {
            images.push(row_to_image(row, &meta.columns)?);
        }

        let page_len = images.len();
        let last_pk = images
            .last()
            .and_then(|row| row.values()[pk_index].as_i64())
            .ok_or_else(|| DbError::Decode(format!("non-integer value in pk column {pk_col}")))?;

        total += write_insert_batch(conn, tgt_table, columns, &images).await?;

        if page_len < batch_size {
            break;
        }
        last = Some(last_pk);
    }

    Ok(total)
}
