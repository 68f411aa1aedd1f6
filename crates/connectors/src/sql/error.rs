use thiserror::Error;

/// All errors coming from the database/query layer.
#[derive(Debug, Error)]
pub enum DbError {
    /// Any MySQL driver error.
    #[error("MySQL error: {0}")]
    MySql(#[from] mysql_async::Error),

    /// The source table's DDL could not be retrieved or rewritten.
    #[error("Schema error: {0}")]
    Schema(String),

    /// A row could not be converted into the engine's value model.
    #[error("Row decode error: {0}")]
    Decode(String),

    /// An error occurred while building a SQL statement.
    #[error("Query build error: {0}")]
    QueryBuild(String),

    /// An unknown error occurred.
    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// Errors happening during connection setup or liveness probing.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// The MySQL driver failed to build the connection or pool.
    #[error("MySQL connector creation failed: {0}")]
    MySql(#[from] mysql_async::Error),

    /// An invalid database URL was provided.
    #[error("Invalid database URL: {0}")]
    InvalidUrl(String),

    /// The liveness probe failed; the caller should retry.
    #[error("Database unavailable: {0}")]
    Unavailable(String),
}

// MySQL server error codes the engines dispatch on.
const ER_DUP_ENTRY: u16 = 1062;
const ER_NET_PACKET_TOO_LARGE: u16 = 1153;
const ER_BAD_FIELD: u16 = 1054;
const ER_NO_SUCH_TABLE: u16 = 1146;
const ER_LOCK_WAIT_TIMEOUT: u16 = 1205;
const ER_LOCK_DEADLOCK: u16 = 1213;
const ER_TOO_MANY_CONNECTIONS: u16 = 1040;
const ER_SERVER_SHUTDOWN: u16 = 1053;
const CR_SERVER_GONE: u16 = 2006;
const CR_SERVER_LOST: u16 = 2013;

fn server_code(err: &mysql_async::Error) -> Option<u16> {
    match err {
        mysql_async::Error::Server(server) => Some(server.code),
        _ => None,
    }
}

/// Whether an error is worth retrying after a reconnect and backoff.
///
/// I/O and driver-level failures are always transient; server errors are
/// transient only for the handful of codes that describe contention or a
/// dying connection.
pub fn is_transient(err: &mysql_async::Error) -> bool {
    match err {
        mysql_async::Error::Io(_) | mysql_async::Error::Driver(_) => true,
        mysql_async::Error::Server(server) => matches!(
            server.code,
            ER_LOCK_WAIT_TIMEOUT
                | ER_LOCK_DEADLOCK
                | ER_TOO_MANY_CONNECTIONS
                | ER_SERVER_SHUTDOWN
                | CR_SERVER_GONE
                | CR_SERVER_LOST
        ),
        _ => false,
    }
}

/// Duplicate key on INSERT. During replay after a pre-snapshot anchor this
/// is expected and treated as success.
pub fn is_duplicate_key(err: &mysql_async::Error) -> bool {
    server_code(err) == Some(ER_DUP_ENTRY)
}

/// The serialized statement exceeded the server's max_allowed_packet; the
/// batch must be split and retried.
pub fn is_packet_too_large(err: &mysql_async::Error) -> bool {
    server_code(err) == Some(ER_NET_PACKET_TOO_LARGE)
}

/// Schema drift between source and target. Fatal; the operator must
/// reconcile the schemas.
pub fn is_schema_drift(err: &mysql_async::Error) -> bool {
    matches!(server_code(err), Some(ER_BAD_FIELD) | Some(ER_NO_SUCH_TABLE))
}
