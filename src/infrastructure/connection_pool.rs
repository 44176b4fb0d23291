//! Connection Pool
//!
//! Bounded pool of SQLite connections. Acquisition suspends on a semaphore
//! until a connection frees or the acquisition timeout elapses. Blocking
//! driver calls run on the blocking thread pool.

use crate::domain::entities::PoolSnapshot;
use crate::error::{DatabaseError, PoolError};
use parking_lot::Mutex;
use rusqlite::Connection;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};

/// Connection pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Database file
    pub path: String,
    /// Maximum concurrent connections
    pub max_connections: usize,
    /// Idle connections older than this are closed
    pub idle_timeout: Duration,
    /// How long a caller may wait for a connection
    pub acquire_timeout: Duration,
    /// SQLite busy handler timeout for lock contention between connections
    pub busy_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            path: "dx03.db".to_string(),
            max_connections: 20,
            idle_timeout: Duration::from_secs(30),
            acquire_timeout: Duration::from_secs(2),
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// A connection parked in the pool.
struct IdleConnection {
    conn: Connection,
    /// When this connection was last returned
    last_used: Instant,
}

impl IdleConnection {
    /// Check if this connection has been idle too long.
    fn is_idle_expired(&self, idle_timeout: Duration) -> bool {
        self.last_used.elapsed() > idle_timeout
    }
}

struct PoolInner {
    config: PoolConfig,
    permits: Arc<Semaphore>,
    idle: Mutex<VecDeque<IdleConnection>>,
    /// Connections currently checked out
    active: AtomicUsize,
    /// Callers suspended in `acquire`
    waiting: AtomicUsize,
    closed: AtomicBool,
    /// Signalled whenever a checked-out connection comes back
    released: Notify,
}

impl PoolInner {
    fn open(&self) -> rusqlite::Result<Connection> {
        let conn = Connection::open(&self.config.path)?;
        conn.busy_timeout(self.config.busy_timeout)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        tracing::debug!("opened database connection to {}", self.config.path);
        Ok(conn)
    }

    fn release(&self, conn: Option<Connection>) {
        if let Some(conn) = conn {
            if !self.closed.load(Ordering::SeqCst) {
                self.idle.lock().push_back(IdleConnection {
                    conn,
                    last_used: Instant::now(),
                });
            }
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.released.notify_waiters();
    }

    fn prune_idle(&self) -> usize {
        let mut idle = self.idle.lock();
        let before = idle.len();
        idle.retain(|c| !c.is_idle_expired(self.config.idle_timeout));
        before - idle.len()
    }
}

/// A checked-out connection.
///
/// Returned to the pool on drop. The underlying connection is opened lazily,
/// on the blocking thread that first uses it.
pub struct PooledConnection {
    conn: Option<Connection>,
    pool: Arc<PoolInner>,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    /// Borrow the connection, opening it first if needed. Blocking.
    pub fn connection(&mut self) -> rusqlite::Result<&mut Connection> {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => self.pool.open()?,
        };
        Ok(self.conn.insert(conn))
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        self.pool.release(self.conn.take());
    }
}

/// Decrements the waiter count even if the acquiring future is cancelled.
struct WaitGuard<'a>(&'a AtomicUsize);

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Bounded SQLite connection pool. Cheap to clone.
#[derive(Clone)]
pub struct DbPool {
    inner: Arc<PoolInner>,
}

impl DbPool {
    /// Create a new pool. No connection is opened until first use.
    pub fn new(config: PoolConfig) -> Self {
        let max = config.max_connections.max(1);
        Self {
            inner: Arc::new(PoolInner {
                permits: Arc::new(Semaphore::new(max)),
                config,
                idle: Mutex::new(VecDeque::new()),
                active: AtomicUsize::new(0),
                waiting: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
                released: Notify::new(),
            }),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Acquire a connection, waiting at most `acquire_timeout`.
    pub async fn acquire(&self) -> Result<PooledConnection, PoolError> {
        if self.is_closed() {
            return Err(PoolError::Closed);
        }

        let permit = {
            self.inner.waiting.fetch_add(1, Ordering::SeqCst);
            let _waiting = WaitGuard(&self.inner.waiting);
            match tokio::time::timeout(
                self.inner.config.acquire_timeout,
                self.inner.permits.clone().acquire_owned(),
            )
            .await
            {
                Ok(Ok(permit)) => permit,
                Ok(Err(_)) => return Err(PoolError::Closed),
                Err(_) => {
                    tracing::warn!(
                        "connection acquisition timed out after {:?}",
                        self.inner.config.acquire_timeout
                    );
                    return Err(PoolError::AcquireTimeout);
                }
            }
        };

        let conn = {
            let mut idle = self.inner.idle.lock();
            let mut reused = None;
            while let Some(candidate) = idle.pop_front() {
                if candidate.is_idle_expired(self.inner.config.idle_timeout) {
                    tracing::debug!("discarding idle database connection");
                    continue;
                }
                reused = Some(candidate.conn);
                break;
            }
            reused
        };

        self.inner.active.fetch_add(1, Ordering::SeqCst);
        Ok(PooledConnection {
            conn,
            pool: self.inner.clone(),
            _permit: permit,
        })
    }

    /// Run a closure against a pooled connection on the blocking pool.
    pub async fn run<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&mut Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let mut pooled = self.acquire().await?;
        let result = tokio::task::spawn_blocking(move || {
            let conn = pooled.connection()?;
            f(conn)
        })
        .await
        .map_err(|e| DatabaseError::Task(e.to_string()))?;
        Ok(result?)
    }

    /// Current occupancy.
    pub fn snapshot(&self) -> PoolSnapshot {
        let active = self.inner.active.load(Ordering::SeqCst);
        let idle = self.inner.idle.lock().len();
        PoolSnapshot {
            total: active + idle,
            active,
            idle,
            waiting: self.inner.waiting.load(Ordering::SeqCst),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Close the pool.
    ///
    /// New acquisitions fail immediately, idle connections are dropped, and
    /// the call returns once every checked-out connection has come back.
    /// Callers bound this with their own timeout.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.permits.close();
        let dropped = {
            let mut idle = self.inner.idle.lock();
            let n = idle.len();
            idle.clear();
            n
        };
        tracing::info!("closing database pool ({} idle connections dropped)", dropped);

        loop {
            let released = self.inner.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();
            if self.inner.active.load(Ordering::SeqCst) == 0 {
                break;
            }
            released.await;
        }
        tracing::info!("database pool closed");
    }

    /// Start periodic cleanup of idle connections.
    #[cfg_attr(coverage_nightly, coverage(off))]
    pub fn start_cleanup(&self, interval: Duration) {
        let inner = self.inner.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);

            loop {
                ticker.tick().await;
                if inner.closed.load(Ordering::SeqCst) {
                    break;
                }
                let removed = inner.prune_idle();
                if removed > 0 {
                    tracing::debug!("pool cleanup: removed {} idle connections", removed);
                }
            }
        });
    }

    /// Drop idle connections past the idle timeout. Returns how many were closed.
    pub fn prune_idle(&self) -> usize {
        self.inner.prune_idle()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_pool(dir: &TempDir, max_connections: usize) -> DbPool {
        DbPool::new(PoolConfig {
            path: dir.path().join("pool.db").to_string_lossy().into_owned(),
            max_connections,
            acquire_timeout: Duration::from_millis(100),
            ..Default::default()
        })
    }

    #[test]
    fn test_pool_config_default() {
        let config = PoolConfig::default();
        assert_eq!(config.max_connections, 20);
        assert_eq!(config.idle_timeout, Duration::from_secs(30));
        assert_eq!(config.acquire_timeout, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_run_executes_query() {
        let dir = TempDir::new().unwrap();
        let pool = test_pool(&dir, 2);

        let value: i64 = pool
            .run(|conn| conn.query_row("SELECT 40 + 2", [], |row| row.get(0)))
            .await
            .unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_connection_is_returned_and_reused() {
        let dir = TempDir::new().unwrap();
        let pool = test_pool(&dir, 2);

        pool.run(|conn| conn.execute_batch("SELECT 1")).await.unwrap();
        let snapshot = pool.snapshot();
        assert_eq!(snapshot.active, 0);
        assert_eq!(snapshot.idle, 1);
        assert_eq!(snapshot.total, 1);

        pool.run(|conn| conn.execute_batch("SELECT 1")).await.unwrap();
        assert_eq!(pool.snapshot().idle, 1);
    }

    #[tokio::test]
    async fn test_snapshot_counts_active() {
        let dir = TempDir::new().unwrap();
        let pool = test_pool(&dir, 3);

        let _a = pool.acquire().await.unwrap();
        let _b = pool.acquire().await.unwrap();

        let snapshot = pool.snapshot();
        assert_eq!(snapshot.active, 2);
        assert_eq!(snapshot.total, 2);
        assert_eq!(snapshot.waiting, 0);
    }

    #[tokio::test]
    async fn test_acquire_timeout_when_exhausted() {
        let dir = TempDir::new().unwrap();
        let pool = test_pool(&dir, 1);

        let held = pool.acquire().await.unwrap();
        let result = pool.acquire().await;
        assert!(matches!(result, Err(PoolError::AcquireTimeout)));
        assert_eq!(pool.snapshot().waiting, 0);

        drop(held);
        assert!(pool.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn test_waiter_is_counted_and_served() {
        let dir = TempDir::new().unwrap();
        let pool = DbPool::new(PoolConfig {
            path: dir.path().join("pool.db").to_string_lossy().into_owned(),
            max_connections: 1,
            acquire_timeout: Duration::from_secs(2),
            ..Default::default()
        });

        let held = pool.acquire().await.unwrap();
        let p = pool.clone();
        let waiter = tokio::spawn(async move { p.acquire().await.map(|_| ()) });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(pool.snapshot().waiting, 1);

        drop(held);
        assert!(waiter.await.unwrap().is_ok());
        assert_eq!(pool.snapshot().waiting, 0);
    }

    #[tokio::test]
    async fn test_open_failure_is_database_error() {
        let pool = DbPool::new(PoolConfig {
            path: "/nonexistent-dir/dx03/pool.db".to_string(),
            ..Default::default()
        });

        let result = pool.run(|conn| conn.execute_batch("SELECT 1")).await;
        assert!(matches!(result, Err(DatabaseError::Query(_))));
        // The failed checkout is still returned.
        assert_eq!(pool.snapshot().active, 0);
    }

    #[tokio::test]
    async fn test_close_rejects_new_acquisitions() {
        let dir = TempDir::new().unwrap();
        let pool = test_pool(&dir, 2);
        pool.run(|conn| conn.execute_batch("SELECT 1")).await.unwrap();

        pool.close().await;
        assert!(pool.is_closed());
        assert_eq!(pool.snapshot().idle, 0);
        assert!(matches!(pool.acquire().await, Err(PoolError::Closed)));
    }

    #[tokio::test]
    async fn test_close_waits_for_checked_out_connections() {
        let dir = TempDir::new().unwrap();
        let pool = test_pool(&dir, 2);
        let held = pool.acquire().await.unwrap();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            drop(held);
        });

        let closed = tokio::time::timeout(Duration::from_secs(1), pool.close()).await;
        assert!(closed.is_ok());
        assert_eq!(pool.snapshot().total, 0);
    }

    #[tokio::test]
    async fn test_close_hangs_while_connection_held() {
        let dir = TempDir::new().unwrap();
        let pool = test_pool(&dir, 2);
        let _held = pool.acquire().await.unwrap();

        let closed = tokio::time::timeout(Duration::from_millis(50), pool.close()).await;
        assert!(closed.is_err());
    }

    #[tokio::test]
    async fn test_prune_idle() {
        let dir = TempDir::new().unwrap();
        let pool = DbPool::new(PoolConfig {
            path: dir.path().join("pool.db").to_string_lossy().into_owned(),
            idle_timeout: Duration::from_millis(1),
            ..Default::default()
        });

        pool.run(|conn| conn.execute_batch("SELECT 1")).await.unwrap();
        assert_eq!(pool.snapshot().idle, 1);

        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(pool.prune_idle(), 1);
        assert_eq!(pool.snapshot().idle, 0);
    }
}
