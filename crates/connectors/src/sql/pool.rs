use crate::sql::error::{ConnectorError, DbError};
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, Opts, OptsBuilder, Pool, PoolConstraints, PoolOpts};
use std::time::Duration;
use tracing::debug;

/// Ceiling on concurrent connections per pool.
pub const MAX_CONNECTIONS: usize = 25;
/// Warm idle set kept ready between bursts.
pub const IDLE_CONNECTIONS: usize = 10;
/// Per-operation read/write budget, also applied server-side via
/// net_read_timeout / net_write_timeout.
pub const IO_TIMEOUT_SECS: u64 = 300;
/// Client-side packet ceiling; extended-INSERT batches are budgeted
/// against this before they are sent.
pub const MAX_ALLOWED_PACKET: usize = 64 * 1024 * 1024;

const CONN_TTL: Duration = Duration::from_secs(600);
const INACTIVE_TTL: Duration = Duration::from_secs(300);

/// A long-lived, pre-validated MySQL pool.
///
/// Connections are recycled before the server's own timeouts can kill
/// them mid-query, and every fresh connection gets generous network
/// timeouts so large batches never trip the 30 s driver defaults.
#[derive(Clone)]
pub struct MySqlPool {
    pool: Pool,
}

impl MySqlPool {
    pub fn connect(dsn: &str) -> Result<Self, ConnectorError> {
        let opts = Opts::from_url(dsn).map_err(|e| ConnectorError::InvalidUrl(e.to_string()))?;

        let constraints = PoolConstraints::new(IDLE_CONNECTIONS, MAX_CONNECTIONS)
            .ok_or_else(|| ConnectorError::InvalidUrl("invalid pool constraints".into()))?;
        let pool_opts = PoolOpts::default()
            .with_constraints(constraints)
            .with_inactive_connection_ttl(INACTIVE_TTL);

        let builder = OptsBuilder::from_opts(opts)
            .pool_opts(pool_opts)
            .conn_ttl(Some(CONN_TTL))
            .tcp_keepalive(Some(60_000u32))
            .max_allowed_packet(Some(MAX_ALLOWED_PACKET))
            .wait_timeout(Some(28_800))
            .setup(vec![
                format!("SET SESSION net_read_timeout = {IO_TIMEOUT_SECS}"),
                format!("SET SESSION net_write_timeout = {IO_TIMEOUT_SECS}"),
            ]);

        Ok(Self {
            pool: Pool::new(builder),
        })
    }

    /// Checked-out connection; callers run their own statements on it.
    pub async fn get(&self) -> Result<Conn, DbError> {
        Ok(self.pool.get_conn().await?)
    }

    /// Liveness probe. Run before any long operation so dead sockets are
    /// surfaced as a retryable error instead of a mid-copy failure.
    pub async fn ping(&self) -> Result<(), ConnectorError> {
        let mut conn = self.pool.get_conn().await?;
        conn.ping()
            .await
            .map_err(|e| ConnectorError::Unavailable(e.to_string()))?;
        debug!("connection probe ok");
        Ok(())
    }

    pub async fn query_drop(&self, sql: &str) -> Result<(), DbError> {
        let mut conn = self.pool.get_conn().await?;
        conn.query_drop(sql).await?;
        Ok(())
    }

    /// Graceful teardown; waits for checked-out connections to return.
    pub async fn disconnect(self) -> Result<(), DbError> {
        self.pool.disconnect().await?;
        Ok(())
    }
}
