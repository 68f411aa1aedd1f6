//! Startup sequencing: connections → pre-flight → resume decision →
//! full load → binlog apply → teardown.

use crate::binlog::{ApplyConfig, BinlogApplyEngine};
use crate::error::ReplicationError;
use crate::full_load::{FullLoadConfig, FullLoadEngine};
use connectors::sql::error::DbError;
use connectors::sql::metadata::fetch_table_metadata;
use connectors::sql::pool::MySqlPool;
use connectors::sql::schema::copy_schema;
use engine_core::checkpoint::CheckpointStore;
use engine_core::metrics::{Metrics, Status};
use engine_core::settings::Settings;
use mysql_async::prelude::Queryable;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct Coordinator {
    settings: Settings,
    metrics: Metrics,
    cancel: CancellationToken,
}

impl Coordinator {
    pub fn new(settings: Settings, metrics: Metrics, cancel: CancellationToken) -> Self {
        Self {
            settings,
            metrics,
            cancel,
        }
    }

    /// Run the replication job until cancellation or a fatal error.
    /// Cancellation surfaces as `Ok(())`: the apply engine drains, writes
    /// its final checkpoint and the pools close before returning.
    pub async fn run(&self) -> Result<(), ReplicationError> {
        let result = self.execute().await;
        match result {
            Ok(()) => Ok(()),
            Err(err) if err.is_cancelled() => {
                info!("shutdown complete");
                Ok(())
            }
            Err(err) => {
                self.metrics.set_status(Status::Error);
                self.metrics.record_error(err.to_string());
                Err(err)
            }
        }
    }

    async fn execute(&self) -> Result<(), ReplicationError> {
        self.metrics.set_status(Status::Initializing);

        info!("opening source and target pools");
        let src = MySqlPool::connect(&self.settings.src_dsn)?;
        let tgt = MySqlPool::connect(&self.settings.tgt_dsn)?;
        src.ping().await?;
        tgt.ping().await?;

        preflight(&src, &self.settings).await?;

        let store = CheckpointStore::new(
            tgt.clone(),
            &self.settings.target_table.db,
            &self.settings.checkpoint_table,
        );
        store.ensure().await.map_err(|err| {
            ReplicationError::Preflight(format!("target database is not writable: {err}"))
        })?;

        let meta = fetch_table_metadata(&src, &self.settings.source_table).await?;
        let key = self.settings.table_key();

        let anchor = match store.read(&key).await? {
            Some(anchor) => {
                info!(anchor = %anchor, "checkpoint found, skipping full load");
                anchor
            }
            None => {
                info!("no checkpoint found, starting full load");
                self.metrics.set_status(Status::FullLoad);

                copy_schema(
                    &src,
                    &tgt,
                    &self.settings.source_table,
                    &self.settings.target_table,
                    false,
                )
                .await?;

                let engine = FullLoadEngine::new(
                    src.clone(),
                    tgt.clone(),
                    store.clone(),
                    self.metrics.clone(),
                    FullLoadConfig {
                        workers: self.settings.parallel_workers,
                        batch_size: self.settings.batch_size,
                        max_retries: self.settings.fullload_max_retries,
                        drop_on_retry: self.settings.fullload_drop_on_retry,
                    },
                    self.cancel.clone(),
                );
                let anchor = engine.run(&meta, &self.settings.target_table).await?;

                store.write(&key, &anchor).await?;
                self.metrics.record_checkpoint(&anchor);
                anchor
            }
        };

        self.metrics.set_status(Status::CdcRunning);
        let apply = BinlogApplyEngine::new(
            src.clone(),
            tgt.clone(),
            store,
            self.metrics.clone(),
            ApplyConfig {
                server_id: self.settings.binlog_server_id,
                batch_size: self.settings.batch_size,
                checkpoint_every: self.settings.checkpoint_every,
                checkpoint_interval: Duration::from_secs(self.settings.checkpoint_write_seconds),
            },
            self.cancel.clone(),
        );
        let result = apply
            .run(&meta, &self.settings.target_table, anchor)
            .await;

        // engines borrow the handles; teardown happens here only
        let _ = src.disconnect().await;
        let _ = tgt.disconnect().await;
        result
    }
}

/// Fail fast, by name, on every startup rule the stream depends on.
async fn preflight(src: &MySqlPool, settings: &Settings) -> Result<(), ReplicationError> {
    let mut conn = src.get().await?;

    let format: Option<String> = conn
        .query_first("SELECT @@binlog_format")
        .await
        .map_err(DbError::from)?;
    if format.as_deref() != Some("ROW") {
        return Err(ReplicationError::Preflight(format!(
            "source binlog_format must be ROW, found {}",
            format.as_deref().unwrap_or("<unset>")
        )));
    }

    let image: Option<String> = conn
        .query_first("SELECT @@binlog_row_image")
        .await
        .map_err(DbError::from)?;
    if image.as_deref() != Some("FULL") {
        return Err(ReplicationError::Preflight(format!(
            "source binlog_row_image must be FULL, found {}",
            image.as_deref().unwrap_or("<unset>")
        )));
    }

    let count: Option<u64> = conn
        .query_first(format!(
            "SELECT COUNT(*) FROM {}",
            settings.source_table.qualified()
        ))
        .await
        .map_err(|err| {
            ReplicationError::Preflight(format!(
                "source table {} is missing or unreadable: {err}",
                settings.source_table
            ))
        })?;
    info!(
        table = %settings.source_table,
        rows = count.unwrap_or(0),
        "source table verified"
    );

    Ok(())
}
