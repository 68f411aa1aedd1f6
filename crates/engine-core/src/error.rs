use connectors::sql::error::DbError;
use thiserror::Error;

/// Errors raised while assembling the runtime configuration from the
/// environment. Always fatal; the binary reports the failed variable and
/// exits non-zero.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {var}: {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Errors from the checkpoint/progress store on the target database.
///
/// Callers decide severity: the apply engine logs a failed periodic
/// write and retries next cycle, while the coordinator treats a failure
/// during startup as fatal.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint store error: {0}")]
    Db(#[from] DbError),
}

impl From<mysql_async::Error> for CheckpointError {
    fn from(err: mysql_async::Error) -> Self {
        CheckpointError::Db(DbError::MySql(err))
    }
}
