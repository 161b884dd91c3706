//! SQLite connection pool with scoped checkout.
//!
//! Every store operation checks a connection out for its own scope; the
//! guard returns it on drop, so release happens on every exit path.

use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use rusqlite::{Connection, OpenFlags};
use thiserror::Error;

const BUSY_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

struct PoolInner {
    idle: Mutex<Vec<Connection>>,
    available: Condvar,
}

/// Fixed-size pool over one SQLite database file.
#[derive(Clone)]
pub struct SqlitePool {
    inner: Arc<PoolInner>,
    path: PathBuf,
}

impl std::fmt::Debug for SqlitePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlitePool")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqlitePool {
    /// Open `size` connections to the database at `path`, creating it if
    /// missing. Fails with `Unavailable` if the file cannot be opened.
    pub fn open(path: &Path, size: usize) -> Result<Self, StoreError> {
        let size = size.max(1);
        let mut idle = Vec::with_capacity(size);
        for _ in 0..size {
            idle.push(open_connection(path)?);
        }
        Ok(Self {
            inner: Arc::new(PoolInner {
                idle: Mutex::new(idle),
                available: Condvar::new(),
            }),
            path: path.to_path_buf(),
        })
    }

    /// Check a connection out, blocking until one is free.
    pub fn checkout(&self) -> Result<PooledConnection, StoreError> {
        let mut idle = self
            .inner
            .idle
            .lock()
            .map_err(|_| self.poisoned())?;
        loop {
            if let Some(conn) = idle.pop() {
                return Ok(PooledConnection {
                    conn: Some(conn),
                    inner: Arc::clone(&self.inner),
                });
            }
            idle = self
                .inner
                .available
                .wait(idle)
                .map_err(|_| self.poisoned())?;
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn poisoned(&self) -> StoreError {
        StoreError::Unavailable(format!("connection pool poisoned for {}", self.path.display()))
    }
}

/// Checkout guard. Derefs to the underlying connection and returns it to
/// the pool on drop, including panic unwinds and error paths.
pub struct PooledConnection {
    conn: Option<Connection>,
    inner: Arc<PoolInner>,
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection present until drop")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection present until drop")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Ok(mut idle) = self.inner.idle.lock() {
                idle.push(conn);
                self.inner.available.notify_one();
            }
        }
    }
}

fn open_connection(path: &Path) -> Result<Connection, StoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
    let conn = Connection::open_with_flags(path, flags)
        .map_err(|err| StoreError::Unavailable(format!("open {}: {err}", path.display())))?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn temp_pool(size: usize) -> (tempfile::TempDir, SqlitePool) {
        let dir = tempfile::tempdir().unwrap();
        let pool = SqlitePool::open(&dir.path().join("pool.db"), size).unwrap();
        (dir, pool)
    }

    #[test]
    fn checkout_and_release() {
        let (_dir, pool) = temp_pool(1);
        {
            let conn = pool.checkout().unwrap();
            conn.execute_batch("CREATE TABLE t (x INTEGER)").unwrap();
        }
        // The single connection must be back in the pool.
        let conn = pool.checkout().unwrap();
        conn.execute("INSERT INTO t (x) VALUES (1)", []).unwrap();
    }

    #[test]
    fn concurrent_checkouts_serialize_on_capacity() {
        let (_dir, pool) = temp_pool(2);
        {
            let conn = pool.checkout().unwrap();
            conn.execute_batch("CREATE TABLE t (x INTEGER)").unwrap();
        }

        let done = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for i in 0..8 {
            let pool = pool.clone();
            let done = Arc::clone(&done);
            handles.push(std::thread::spawn(move || {
                let conn = pool.checkout().unwrap();
                conn.execute("INSERT INTO t (x) VALUES (?1)", [i]).unwrap();
                done.fetch_add(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(done.load(Ordering::SeqCst), 8);

        let conn = pool.checkout().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 8);
    }

    #[test]
    fn open_missing_directory_is_unavailable() {
        let err = SqlitePool::open(Path::new("/nonexistent/dir/db.sqlite"), 1).unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }
}
