//! Connection manager for bb8 pool with rusqlite

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rusqlite::Connection;
use tokio::sync::Mutex;

use crate::error::SqliteError;

/// Where the database lives
#[derive(Clone, Debug)]
pub enum Location {
    File(PathBuf),
    /// Private to one connection; pools over it must hold a single connection
    Memory,
}

/// bb8 manager for rusqlite connections.
///
/// rusqlite::Connection is not Sync, so each pooled connection sits behind a Mutex and every
/// call runs inside spawn_blocking.
pub struct SqliteConnectionManager {
    location: Location,
    busy_timeout: Duration,
}

impl SqliteConnectionManager {
    pub fn new(location: Location, busy_timeout: Duration) -> Self { Self { location, busy_timeout } }

    pub fn file(path: impl Into<PathBuf>, busy_timeout: Duration) -> Self { Self::new(Location::File(path.into()), busy_timeout) }

    pub fn memory() -> Self { Self::new(Location::Memory, Duration::ZERO) }

    fn create_connection(&self) -> Result<Connection, SqliteError> {
        let conn = match &self.location {
            Location::File(path) => {
                let conn = Connection::open(path)?;
                conn.busy_timeout(self.busy_timeout)?;
                conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
                conn
            }
            Location::Memory => Connection::open_in_memory()?,
        };

        conn.execute_batch(
            "PRAGMA foreign_keys=ON;
             PRAGMA temp_store=MEMORY;",
        )?;

        Ok(conn)
    }
}

/// A pooled SQLite connection
pub struct PooledConnection {
    inner: Arc<Mutex<Connection>>,
}

impl PooledConnection {
    pub fn new(conn: Connection) -> Self { Self { inner: Arc::new(Mutex::new(conn)) } }

    /// Run `f` against the connection on the blocking thread pool
    pub async fn with_connection<F, T>(&self, f: F) -> Result<T, SqliteError>
    where
        F: FnOnce(&Connection) -> Result<T, SqliteError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.blocking_lock();
            f(&guard)
        })
        .await
        .map_err(|e| SqliteError::TaskJoin(e.to_string()))?
    }

    /// Mutable variant, needed to open transactions
    pub async fn with_connection_mut<F, T>(&self, f: F) -> Result<T, SqliteError>
    where
        F: FnOnce(&mut Connection) -> Result<T, SqliteError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.blocking_lock();
            f(&mut guard)
        })
        .await
        .map_err(|e| SqliteError::TaskJoin(e.to_string()))?
    }
}

impl Clone for PooledConnection {
    fn clone(&self) -> Self { Self { inner: self.inner.clone() } }
}

impl bb8::ManageConnection for SqliteConnectionManager {
    type Connection = PooledConnection;
    type Error = SqliteError;

    fn connect(&self) -> impl std::future::Future<Output = Result<Self::Connection, Self::Error>> + Send {
        let manager = SqliteConnectionManager::new(self.location.clone(), self.busy_timeout);
        async move {
            tokio::task::spawn_blocking(move || manager.create_connection().map(PooledConnection::new))
                .await
                .map_err(|e| SqliteError::TaskJoin(e.to_string()))?
        }
    }

    #[allow(refining_impl_trait)]
    fn is_valid<'a, 'b>(&'a self, conn: &'b mut Self::Connection) -> impl std::future::Future<Output = Result<(), Self::Error>> + Send {
        let conn = conn.clone();
        async move { conn.with_connection(|c| c.execute_batch("SELECT 1").map_err(SqliteError::from)).await }
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool { false }
}
