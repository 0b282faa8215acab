//! Durable ledger shared by every router process on a host.
//!
//! Spend, latency, cached generations and inflight coordination rows live in a
//! single SQLite file in WAL mode. All access goes through
//! [`Ledger::transaction`], which serializes writers both inside the process
//! (a mutex around the connection) and across processes (`BEGIN IMMEDIATE`
//! takes SQLite's reserved lock, and `busy_timeout` makes contenders wait
//! instead of failing).

mod cache;
mod error;
mod helpers;
mod inflight;
mod migrations;
mod spend;

use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{Connection, Transaction, TransactionBehavior};

pub use error::{LedgerError, Result};

pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Ledger {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl Ledger {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_busy_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    pub fn open_with_busy_timeout(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path)?;
        conn.busy_timeout(busy_timeout)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "temp_store", "MEMORY")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs `f` inside one write transaction.
    ///
    /// Commits when `f` returns `Ok` and rolls back otherwise. Reads made
    /// through the handle see a consistent snapshot and no other writer, in
    /// this process or another one sharing the file, can interleave with them.
    pub fn transaction<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&LedgerTx<'_>) -> std::result::Result<T, E>,
        E: From<LedgerError>,
    {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(LedgerError::from)?;
        let handle = LedgerTx { tx };
        let value = f(&handle)?;
        handle.tx.commit().map_err(LedgerError::from)?;
        Ok(value)
    }
}

/// Handle to an open ledger transaction. Only reachable through
/// [`Ledger::transaction`].
pub struct LedgerTx<'conn> {
    tx: Transaction<'conn>,
}
