use crate::config::{Settings, STORE_TIMEOUT};
use crate::error::{Error, Result};
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::{Connection, PgConnection, PgPool, Postgres, QueryBuilder, Row};
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::Instant;

/// Shared handle to the record store. Cheap to clone; every logical operation
/// goes through a [`StoreSession`].
#[derive(Debug, Clone)]
pub struct RecordStore {
    pool: PgPool,
    timeout: Duration,
}

impl RecordStore {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    pub async fn connect(settings: &Settings) -> Result<Self> {
        let options = connect_options(settings.require_database_url()?, STORE_TIMEOUT)?;
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(STORE_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(Error::store("connect"))?;
        Ok(Self::new(pool, STORE_TIMEOUT))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Checks out one connection and starts the unit-of-work clock. Everything
    /// run on the session shares a single deadline.
    pub async fn session(&self) -> Result<StoreSession> {
        let deadline = Instant::now() + self.timeout;
        let conn = bounded(deadline, self.timeout, "acquire", self.pool.acquire()).await?;
        Ok(StoreSession {
            conn: Some(conn),
            deadline,
            timeout: self.timeout,
        })
    }

    pub async fn ping(&self) -> Result<()> {
        self.session().await?.ping().await
    }
}

/// Server-side `statement_timeout` matching the client bound, so the server
/// also abandons work the client gave up on.
pub fn connect_options(db_url: &str, timeout: Duration) -> Result<PgConnectOptions> {
    let options = PgConnectOptions::from_str(db_url).map_err(Error::store("connect"))?;
    Ok(options.options([("statement_timeout", timeout.as_millis())]))
}

/// A pooled connection plus the deadline of the unit of work it serves.
/// The connection goes back to the pool when the session is dropped, unless
/// an operation timed out on it: then it is detached and closed instead.
pub struct StoreSession {
    conn: Option<PoolConnection<Postgres>>,
    deadline: Instant,
    timeout: Duration,
}

impl StoreSession {
    pub async fn ping(&mut self) -> Result<()> {
        let conn = live(&mut self.conn, "ping", self.timeout)?;
        let res = bounded(self.deadline, self.timeout, "ping", Connection::ping(conn)).await;
        self.settle(res)
    }

    pub async fn query(&mut self, qb: &mut QueryBuilder<'_, Postgres>) -> Result<Vec<PgRow>> {
        let conn = live(&mut self.conn, "query", self.timeout)?;
        let fut = qb.build().fetch_all(conn);
        let res = bounded(self.deadline, self.timeout, "query", fut).await;
        self.settle(res)
    }

    /// First column of the single row returned.
    pub async fn query_scalar<T>(&mut self, qb: &mut QueryBuilder<'_, Postgres>) -> Result<T>
    where
        T: for<'r> sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
    {
        let conn = live(&mut self.conn, "query_scalar", self.timeout)?;
        let fut = qb.build().fetch_one(conn);
        let res = bounded(self.deadline, self.timeout, "query_scalar", fut).await;
        let row = self.settle(res)?;
        row.try_get::<T, _>(0).map_err(Error::store("query_scalar"))
    }

    /// Rows affected.
    pub async fn exec(&mut self, qb: &mut QueryBuilder<'_, Postgres>) -> Result<u64> {
        let conn = live(&mut self.conn, "exec", self.timeout)?;
        let fut = qb.build().execute(conn);
        let res = bounded(self.deadline, self.timeout, "exec", fut).await;
        Ok(self.settle(res)?.rows_affected())
    }

    /// Whether the session still holds its connection.
    pub fn is_live(&self) -> bool {
        self.conn.is_some()
    }

    fn settle<T>(&mut self, res: Result<T>) -> Result<T> {
        if let Err(Error::StoreTimeout { op, .. }) = &res {
            if let Some(conn) = self.conn.take() {
                // The statement may still be running; the pool must not hand this connection out.
                tracing::warn!(op = *op, "detaching store connection after timeout");
                drop(conn.detach());
            }
        }
        res
    }
}

fn live<'c>(
    conn: &'c mut Option<PoolConnection<Postgres>>,
    op: &'static str,
    timeout: Duration,
) -> Result<&'c mut PgConnection> {
    conn.as_deref_mut()
        .ok_or(Error::StoreTimeout { op, timeout })
}

async fn bounded<T, F>(
    deadline: Instant,
    timeout: Duration,
    op: &'static str,
    fut: F,
) -> Result<T>
where
    F: Future<Output = std::result::Result<T, sqlx::Error>>,
{
    match tokio::time::timeout_at(deadline, fut).await {
        Ok(res) => res.map_err(Error::store(op)),
        Err(_) => {
            tracing::warn!(op, ?timeout, "store operation timed out");
            Err(Error::StoreTimeout { op, timeout })
        }
    }
}
