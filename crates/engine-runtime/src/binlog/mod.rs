//! Binlog subscription and change application.
//!
//! Two long-lived tasks connected by a bounded channel: the subscriber
//! registers as a replica, decodes ROW events for the watched table and
//! pushes [`ChangeEvent`]s; the applier coalesces contiguous same-kind
//! runs and writes them to the target, checkpointing after commits.
//!
//! Lifecycle: subscribing → streaming (↔ reconnecting on transient I/O
//! errors) → draining → closed. A batch always commits to the target
//! before its anchor reaches the checkpoint store, which is what makes
//! delivery at-least-once rather than at-most-once.

pub mod batch;
pub mod decode;

use crate::binlog::batch::EventBuffer;
use crate::binlog::decode::{decode_binlog_row, rows_event_table_id};
use crate::error::ReplicationError;
use crate::writer::write_insert_batch;
use connectors::sql::error::{
    DbError, is_duplicate_key, is_schema_drift, is_transient,
};
use connectors::sql::metadata::TableMetadata;
use connectors::sql::pool::MySqlPool;
use connectors::sql::statements;
use engine_core::checkpoint::CheckpointStore;
use engine_core::metrics::Metrics;
use engine_core::retry::RetryPolicy;
use futures::StreamExt;
use model::core::anchor::BinlogAnchor;
use model::core::table::TableRef;
use model::events::{Change, ChangeEvent, ChangeKind, RowImage};
use mysql_async::prelude::Queryable;
use mysql_async::{BinlogStreamRequest, Conn};
use mysql_common::binlog::consts::EventType;
use mysql_common::binlog::events::{EventData, RowsEventData};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Subscriber → applier channel depth; the subscriber back-pressures
/// when the applier falls behind.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Current binlog position of the source, read positionally so both the
/// 4- and 5-column `SHOW MASTER STATUS` layouts work.
pub async fn current_anchor(pool: &MySqlPool) -> Result<BinlogAnchor, DbError> {
    let mut conn = pool.get().await?;
    let row: Option<mysql_async::Row> = conn.query_first("SHOW MASTER STATUS").await?;
    let mut row = row.ok_or_else(|| {
        DbError::Schema("SHOW MASTER STATUS returned no rows; binary logging is disabled".into())
    })?;

    let file: String = row
        .take(0)
        .ok_or_else(|| DbError::Decode("SHOW MASTER STATUS: missing file column".into()))?;
    let pos: u64 = row
        .take(1)
        .ok_or_else(|| DbError::Decode("SHOW MASTER STATUS: missing position column".into()))?;
    Ok(BinlogAnchor::new(file, pos))
}

#[derive(Debug, Clone)]
pub struct ApplyConfig {
    pub server_id: u32,
    pub batch_size: usize,
    pub checkpoint_every: u64,
    pub checkpoint_interval: Duration,
}

pub struct BinlogApplyEngine {
    src: MySqlPool,
    tgt: MySqlPool,
    store: CheckpointStore,
    metrics: Metrics,
    config: ApplyConfig,
    cancel: CancellationToken,
}

impl BinlogApplyEngine {
    pub fn new(
        src: MySqlPool,
        tgt: MySqlPool,
        store: CheckpointStore,
        metrics: Metrics,
        config: ApplyConfig,
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

    /// Stream from `start` until cancellation or a fatal apply error.
    pub async fn run(
        &self,
        meta: &TableMetadata,
        tgt_table: &TableRef,
        start: BinlogAnchor,
    ) -> Result<(), ReplicationError> {
        let (tx, rx) = mpsc::channel::<ChangeEvent>(EVENT_CHANNEL_CAPACITY);

        let subscriber = {
            let src = self.src.clone();
            let meta = meta.clone();
            let server_id = self.config.server_id;
            let cancel = self.cancel.clone();
            tokio::spawn(
                async move { subscribe(src, meta, server_id, start, tx, cancel).await },
            )
        };

        let applier = {
            let tgt = self.tgt.clone();
            let store = self.store.clone();
            let metrics = self.metrics.clone();
            let meta = meta.clone();
            let tgt_table = tgt_table.clone();
            let config = self.config.clone();
            let cancel = self.cancel.clone();
            tokio::spawn(async move {
                apply(tgt, store, metrics, meta, tgt_table, config, rx, cancel).await
            })
        };

        let (sub_result, apply_result) = tokio::join!(subscriber, applier);

        // A fatal apply error is the interesting one; subscriber errors
        // follow from it once the channel closes.
        apply_result??;
        sub_result??;
        Ok(())
    }
}

/// Subscriber task: replica registration, event decoding, table filter.
async fn subscribe(
    src: MySqlPool,
    meta: TableMetadata,
    server_id: u32,
    start: BinlogAnchor,
    tx: mpsc::Sender<ChangeEvent>,
    cancel: CancellationToken,
) -> Result<(), ReplicationError> {
    let mut anchor = start;
    let reconnect_policy = RetryPolicy::for_apply();
    let mut reconnects = 0usize;

    'reconnect: loop {
        if cancel.is_cancelled() {
            break;
        }

        info!(anchor = %anchor, server_id, "subscribing to binlog");
        let conn = src.get().await?;
        let filename = anchor.file.clone().into_bytes();
        let request = BinlogStreamRequest::new(server_id)
            .with_filename(&filename)
            .with_pos(anchor.pos);

        let mut stream = match conn.get_binlog_stream(request).await {
            Ok(stream) => stream,
            Err(err) if is_transient(&err) => {
                warn!(error = %err, "binlog subscription failed, reconnecting");
                tokio::time::sleep(reconnect_policy.backoff_delay(reconnects)).await;
                reconnects += 1;
                continue 'reconnect;
            }
            Err(err) => return Err(ReplicationError::Binlog(err.to_string())),
        };

        info!("binlog stream established");
        reconnects = 0;

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => break 'reconnect,
                next = stream.next() => next,
            };

            let Some(event) = next else {
                warn!("binlog stream ended, reconnecting");
                tokio::time::sleep(reconnect_policy.backoff_delay(reconnects)).await;
                reconnects += 1;
                continue 'reconnect;
            };

            let event = match event {
                Ok(event) => event,
                Err(err) if is_transient(&err) => {
                    warn!(error = %err, "binlog read error, reconnecting");
                    tokio::time::sleep(reconnect_policy.backoff_delay(reconnects)).await;
                    reconnects += 1;
                    continue 'reconnect;
                }
                Err(err) => return Err(ReplicationError::Binlog(err.to_string())),
            };

            // Every event advances the tracked position.
            let log_pos = event.header().log_pos();
            if log_pos > 0 {
                anchor.pos = u64::from(log_pos);
            }

            let Ok(event_type) = event.header().event_type() else {
                continue;
            };

            match event_type {
                EventType::ROTATE_EVENT => {
                    let data = event
                        .read_data()
                        .map_err(|e| ReplicationError::Binlog(e.to_string()))?;
                    if let Some(EventData::RotateEvent(rotate)) = data {
                        let file = String::from_utf8_lossy(rotate.name_raw()).into_owned();
                        anchor = BinlogAnchor::new(file, rotate.position());
                        debug!(anchor = %anchor, "binlog rotated");
                    }
                }

                EventType::WRITE_ROWS_EVENT
                | EventType::UPDATE_ROWS_EVENT
                | EventType::DELETE_ROWS_EVENT
                | EventType::WRITE_ROWS_EVENT_V1
                | EventType::UPDATE_ROWS_EVENT_V1
                | EventType::DELETE_ROWS_EVENT_V1
                | EventType::PARTIAL_UPDATE_ROWS_EVENT => {
                    let data = event
                        .read_data()
                        .map_err(|e| ReplicationError::Binlog(e.to_string()))?;
                    let Some(EventData::RowsEvent(rows_data)) = data else {
                        continue;
                    };

                    let Some(tme) = stream.get_tme(rows_event_table_id(&rows_data)) else {
                        continue;
                    };
                    if tme.database_name_raw() != meta.table.db.as_bytes()
                        || tme.table_name_raw() != meta.table.table.as_bytes()
                    {
                        continue;
                    }

                    let events = decode_rows_event(&rows_data, tme, &meta, &anchor)?;
                    for change in events {
                        tokio::select! {
                            _ = cancel.cancelled() => break 'reconnect,
                            sent = tx.send(change) => {
                                if sent.is_err() {
                                    // applier is gone; its error wins
                                    break 'reconnect;
                                }
                            }
                        }
                    }
                }

                _ => {}
            }
        }
    }

    info!("binlog subscriber closed");
    Ok(())
}

fn decode_rows_event(
    rows_data: &RowsEventData<'_>,
    tme: &mysql_common::binlog::events::TableMapEvent<'_>,
    meta: &TableMetadata,
    anchor: &BinlogAnchor,
) -> Result<Vec<ChangeEvent>, ReplicationError> {
    let kind = match rows_data {
        RowsEventData::WriteRowsEvent(_) | RowsEventData::WriteRowsEventV1(_) => {
            ChangeKind::Insert
        }
        RowsEventData::UpdateRowsEvent(_)
        | RowsEventData::UpdateRowsEventV1(_)
        | RowsEventData::PartialUpdateRowsEvent(_) => ChangeKind::Update,
        RowsEventData::DeleteRowsEvent(_) | RowsEventData::DeleteRowsEventV1(_) => {
            ChangeKind::Delete
        }
        _ => return Ok(Vec::new()),
    };

    let rows: Vec<_> = match rows_data {
        RowsEventData::WriteRowsEvent(e) => e.rows(tme).collect(),
        RowsEventData::WriteRowsEventV1(e) => e.rows(tme).collect(),
        RowsEventData::UpdateRowsEvent(e) => e.rows(tme).collect(),
        RowsEventData::UpdateRowsEventV1(e) => e.rows(tme).collect(),
        RowsEventData::PartialUpdateRowsEvent(e) => e.rows(tme).collect(),
        RowsEventData::DeleteRowsEvent(e) => e.rows(tme).collect(),
        RowsEventData::DeleteRowsEventV1(e) => e.rows(tme).collect(),
        _ => Vec::new(),
    };

    let mut events = Vec::with_capacity(rows.len());
    for row in rows {
        let (before, after) = row.map_err(|e| ReplicationError::Binlog(e.to_string()))?;

        let before = before
            .map(|r| decode_binlog_row(r, &meta.columns))
            .transpose()?;
        let after = after
            .map(|r| decode_binlog_row(r, &meta.columns))
            .transpose()?;

        let change = match kind {
            ChangeKind::Insert => Change::Insert {
                after: after.ok_or_else(|| {
                    ReplicationError::Binlog("write event without after image".into())
                })?,
            },
            ChangeKind::Update => Change::Update {
                before: before.ok_or_else(|| {
                    ReplicationError::Binlog("update event without before image".into())
                })?,
                after: after.ok_or_else(|| {
                    ReplicationError::Binlog("update event without after image".into())
                })?,
            },
            ChangeKind::Delete => Change::Delete {
                before: before.ok_or_else(|| {
                    ReplicationError::Binlog("delete event without before image".into())
                })?,
            },
        };

        events.push(ChangeEvent {
            table: meta.table.clone(),
            anchor: anchor.clone(),
            change,
        });
    }
    Ok(events)
}

enum Step {
    Event(ChangeEvent),
    Tick,
    Drain,
    Shutdown,
}

/// Applier task: coalesce, write, checkpoint.
#[allow(clippy::too_many_arguments)]
async fn apply(
    tgt: MySqlPool,
    store: CheckpointStore,
    metrics: Metrics,
    meta: TableMetadata,
    tgt_table: TableRef,
    config: ApplyConfig,
    mut rx: mpsc::Receiver<ChangeEvent>,
    cancel: CancellationToken,
) -> Result<(), ReplicationError> {
    let columns = meta.column_names();
    let pk_idx = meta.pk_indexes();
    let key = meta.table.key();
    let policy = RetryPolicy::for_apply();

    let mut buffer = EventBuffer::new(config.batch_size);
    let mut conn: Option<Conn> = None;
    let mut applied_anchor: Option<BinlogAnchor> = None;
    let mut events_since_checkpoint = 0u64;
    let mut last_checkpoint = Instant::now();
    let mut draining = false;

    loop {
        let step = if draining {
            match rx.recv().await {
                Some(event) => Step::Event(event),
                None => Step::Shutdown,
            }
        } else {
            tokio::select! {
                _ = cancel.cancelled() => Step::Drain,
                received = rx.recv() => match received {
                    Some(event) => Step::Event(event),
                    None => Step::Drain,
                },
                _ = tokio::time::sleep_until(last_checkpoint + config.checkpoint_interval) => Step::Tick,
            }
        };

        match step {
            Step::Event(event) => {
                if let Some((kind, run)) = buffer.push(event) {
                    apply_run(&tgt, &mut conn, &tgt_table, &columns, &pk_idx, &policy, kind, &run)
                        .await?;
                    note_applied(
                        &metrics,
                        kind,
                        &run,
                        &mut applied_anchor,
                        &mut events_since_checkpoint,
                    );
                }

                // The anchor written here only ever covers applied runs,
                // never buffered events.
                let due = events_since_checkpoint >= config.checkpoint_every
                    || last_checkpoint.elapsed() >= config.checkpoint_interval;
                if due {
                    write_checkpoint(
                        &store,
                        &metrics,
                        &key,
                        &applied_anchor,
                        &mut events_since_checkpoint,
                        &mut last_checkpoint,
                    )
                    .await;
                }
            }

            Step::Tick => {
                if let Some((kind, run)) = buffer.take() {
                    apply_run(&tgt, &mut conn, &tgt_table, &columns, &pk_idx, &policy, kind, &run)
                        .await?;
                    note_applied(
                        &metrics,
                        kind,
                        &run,
                        &mut applied_anchor,
                        &mut events_since_checkpoint,
                    );
                }
                write_checkpoint(
                    &store,
                    &metrics,
                    &key,
                    &applied_anchor,
                    &mut events_since_checkpoint,
                    &mut last_checkpoint,
                )
                .await;
            }

            Step::Drain => {
                info!("draining buffered events before shutdown");
                draining = true;
            }

            Step::Shutdown => {
                if let Some((kind, run)) = buffer.take() {
                    apply_run(&tgt, &mut conn, &tgt_table, &columns, &pk_idx, &policy, kind, &run)
                        .await?;
                    note_applied(
                        &metrics,
                        kind,
                        &run,
                        &mut applied_anchor,
                        &mut events_since_checkpoint,
                    );
                }
                // final checkpoint write
                write_checkpoint(
                    &store,
                    &metrics,
                    &key,
                    &applied_anchor,
                    &mut events_since_checkpoint,
                    &mut last_checkpoint,
                )
                .await;
                break;
            }
        }
    }

    info!("binlog applier closed");
    Ok(())
}

fn note_applied(
    metrics: &Metrics,
    kind: ChangeKind,
    run: &[ChangeEvent],
    applied_anchor: &mut Option<BinlogAnchor>,
    events_since_checkpoint: &mut u64,
) {
    for _ in run {
        metrics.record_event(kind);
    }
    *events_since_checkpoint += run.len() as u64;
    if let Some(last) = run.last() {
        *applied_anchor = Some(last.anchor.clone());
    }
}

/// Checkpoint write failures are logged and retried on the next cycle;
/// the previous checkpoint remains ≤ the true applied position, so the
/// at-least-once invariant holds either way.
async fn write_checkpoint(
    store: &CheckpointStore,
    metrics: &Metrics,
    key: &str,
    applied_anchor: &Option<BinlogAnchor>,
    events_since_checkpoint: &mut u64,
    last_checkpoint: &mut Instant,
) {
    *last_checkpoint = Instant::now();
    let Some(anchor) = applied_anchor else {
        return;
    };
    match store.write(key, anchor).await {
        Ok(()) => {
            metrics.record_checkpoint(anchor);
            *events_since_checkpoint = 0;
        }
        Err(err) => {
            warn!(error = %err, "checkpoint write failed; will retry next cycle");
            metrics.record_error(err.to_string());
        }
    }
}

/// Apply one coalesced run. Transient target errors reconnect and retry
/// the same statements; the statements are PK-keyed and idempotent, so a
/// replay after a half-applied failure converges to the same state.
#[allow(clippy::too_many_arguments)]
async fn apply_run(
    tgt: &MySqlPool,
    conn: &mut Option<Conn>,
    tgt_table: &TableRef,
    columns: &[String],
    pk_idx: &[usize],
    policy: &RetryPolicy,
    kind: ChangeKind,
    run: &[ChangeEvent],
) -> Result<(), ReplicationError> {
    match kind {
        ChangeKind::Insert => {
            let rows: Vec<RowImage> = run
                .iter()
                .filter_map(|e| match &e.change {
                    Change::Insert { after } => Some(after.clone()),
                    _ => None,
                })
                .collect();
            insert_with_retry(tgt, conn, tgt_table, columns, &rows, policy).await
        }

        ChangeKind::Update => {
            for event in run {
                let Change::Update { before, after } = &event.change else {
                    continue;
                };
                let sql = statements::update_by_pk(tgt_table, columns, pk_idx, before, after);
                exec_with_retry(tgt, conn, &sql, policy).await?;
            }
            Ok(())
        }

        ChangeKind::Delete => {
            let rows: Vec<RowImage> = run
                .iter()
                .filter_map(|e| match &e.change {
                    Change::Delete { before } => Some(before.clone()),
                    _ => None,
                })
                .collect();
            let sql = statements::delete_in(tgt_table, columns, pk_idx, &rows);
            exec_with_retry(tgt, conn, &sql, policy).await
        }
    }
}

async fn insert_with_retry(
    tgt: &MySqlPool,
    conn: &mut Option<Conn>,
    tgt_table: &TableRef,
    columns: &[String],
    rows: &[RowImage],
    policy: &RetryPolicy,
) -> Result<(), ReplicationError> {
    let mut attempt = 0;
    loop {
        let c = match conn {
            Some(c) => c,
            None => conn.insert(tgt.get().await?),
        };

        match write_insert_batch(c, tgt_table, columns, rows).await {
            Ok(_) => return Ok(()),
            Err(DbError::MySql(err)) if is_duplicate_key(&err) => return Ok(()),
            Err(DbError::MySql(err)) if is_schema_drift(&err) => {
                return Err(ReplicationError::SchemaDrift(err.to_string()));
            }
            Err(DbError::MySql(err)) if is_transient(&err) && policy.allows_another(attempt) => {
                warn!(error = %err, attempt, "insert batch failed, reconnecting");
                *conn = None;
                tokio::time::sleep(policy.backoff_delay(attempt)).await;
                attempt += 1;
            }
            Err(err) => return Err(err.into()),
        }
    }
}

async fn exec_with_retry(
    tgt: &MySqlPool,
    conn: &mut Option<Conn>,
    sql: &str,
    policy: &RetryPolicy,
) -> Result<(), ReplicationError> {
    let mut attempt = 0;
    loop {
        let c = match conn {
            Some(c) => c,
            None => conn.insert(tgt.get().await?),
        };

        match c.query_drop(sql).await {
            Ok(()) => return Ok(()),
            Err(err) if is_duplicate_key(&err) => return Ok(()),
            Err(err) if is_schema_drift(&err) => {
                return Err(ReplicationError::SchemaDrift(err.to_string()));
            }
            Err(err) if is_transient(&err) && policy.allows_another(attempt) => {
                warn!(error = %err, attempt, "apply statement failed, reconnecting");
                *conn = None;
                tokio::time::sleep(policy.backoff_delay(attempt)).await;
                attempt += 1;
            }
            Err(err) => return Err(DbError::from(err).into()),
        }
    }
}
