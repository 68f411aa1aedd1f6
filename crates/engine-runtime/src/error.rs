use connectors::sql::error::{ConnectorError, DbError};
use engine_core::error::CheckpointError;
use thiserror::Error;

/// Top-level errors for the replication engine.
#[derive(Debug, Error)]
pub enum ReplicationError {
    /// A startup validation rule failed. The message names the rule so
    /// the operator knows what to fix; the process exits non-zero.
    #[error("pre-flight check failed: {0}")]
    Preflight(String),

    /// Connection setup or liveness probing failed.
    #[error("connector error: {0}")]
    Connector(#[from] ConnectorError),

    /// A database operation failed beyond what the retry policy absorbs.
    #[error("database error: {0}")]
    Db(#[from] DbError),

    /// The checkpoint store failed at a point where progress must be
    /// durable (startup, or the post-full-load anchor write).
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// Every configured full-load attempt failed.
    #[error("full load failed after {attempts} attempts: {source}")]
    FullLoadExhausted {
        attempts: usize,
        source: Box<ReplicationError>,
    },

    /// The target no longer matches the source schema. Fatal; the
    /// operator must reconcile.
    #[error("schema drift: {0}")]
    SchemaDrift(String),

    /// The binlog subscription broke in a way reconnects cannot fix.
    #[error("binlog stream error: {0}")]
    Binlog(String),

    /// A worker task was cancelled or panicked.
    #[error("task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),

    /// Cooperative shutdown; not a failure.
    #[error("cancelled")]
    Cancelled,
}

impl ReplicationError {
    /// True when the run ended because shutdown was requested rather
    /// than because something went wrong.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ReplicationError::Cancelled)
    }
}
