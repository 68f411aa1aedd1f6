use connectors::sql::{error::DbError, pool::MySqlPool};
use mysql_async::Conn;
use mysql_async::prelude::Queryable;
use tracing::debug;

// Session variables relaxed for the duration of a bulk load, with the
// values restored on the way out.
const BULK_VARS: &[(&str, &str, &str)] = &[
    ("unique_checks", "0", "1"),
    ("foreign_key_checks", "0", "1"),
    ("sql_log_bin", "0", "1"),
    ("innodb_flush_log_at_trx_commit", "2", "1"),
];

/// A target connection pinned for one full-load worker.
///
/// The bulk-friendly session variables live only on this connection and
/// are restored by [`BulkSession::finish`] before it goes back to the
/// pool. If the worker aborts instead, the pool's reset-on-return wipes
/// the session state, so the altered variables cannot leak to later
/// checkouts either way.
pub struct BulkSession {
    conn: Conn,
}

impl BulkSession {
    pub async fn begin(pool: &MySqlPool) -> Result<Self, DbError> {
        let mut conn = pool.get().await?;
        for (name, bulk, _) in BULK_VARS {
            conn.query_drop(format!("SET SESSION {name} = {bulk}")).await?;
        }
        debug!("bulk session variables set");
        Ok(Self { conn })
    }

    pub fn conn(&mut self) -> &mut Conn {
        &mut self.conn
    }

    /// Restore the session variables and release the connection.
    pub async fn finish(mut self) -> Result<(), DbError> {
        for (name, _, restore) in BULK_VARS {
            self.conn
                .query_drop(format!("SET SESSION {name} = {restore}"))
                .await?;
        }
        debug!("bulk session variables restored");
        Ok(())
    }
}
