//! Store handle and connection management.
//!
//! [`Store`] owns a [`rusqlite::Connection`] behind one coarse mutex; every
//! read and write serializes on it. Chat throughput is dominated by socket
//! fan-out, so the store is never the contention point. The store is a plain
//! value constructed at startup and shared as `Arc<Store>` by the hub and the
//! sessions; tests open an in-memory instance instead of touching disk.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;

use parley_shared::constants::ROLE_ADMIN;
use parley_shared::crypto::{PasswordHasher, SaltedBlake3};

use crate::error::Result;
use crate::migrations;

pub struct Store {
    conn: Mutex<Connection>,
    hasher: Box<dyn PasswordHasher>,
}

impl Store {
    /// Open (or create) the store at `path` with the reference hasher.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!(path = %path.display(), "opening account store");
        Self::with_connection(Connection::open(path)?, Box::new(SaltedBlake3))
    }

    /// Open the store with a caller-supplied password hasher.
    pub fn open_with_hasher(
        path: impl AsRef<Path>,
        hasher: Box<dyn PasswordHasher>,
    ) -> Result<Self> {
        Self::with_connection(Connection::open(path.as_ref())?, hasher)
    }

    /// Volatile store, used as a test double.
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, Box::new(SaltedBlake3))
    }

    fn with_connection(conn: Connection, hasher: Box<dyn PasswordHasher>) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        migrations::run_migrations(&conn)?;

        let store = Self {
            conn: Mutex::new(conn),
            hasher,
        };
        store.ensure_admin()?;
        Ok(store)
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Connection> {
        // A poisoned lock only means another thread panicked mid-query;
        // the connection itself is still usable.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn hasher(&self) -> &dyn PasswordHasher {
        self.hasher.as_ref()
    }

    /// Promote the earliest-created user when no admin exists. Keeps a
    /// populated store operable after upgrades or manual edits.
    fn ensure_admin(&self) -> Result<()> {
        let conn = self.lock();
        let admins: i64 = conn.query_row(
            "SELECT COUNT(*) FROM users WHERE role = ?1",
            [ROLE_ADMIN],
            |row| row.get(0),
        )?;
        if admins == 0 {
            let promoted = conn.execute(
                "UPDATE users SET role = ?1 WHERE id = (SELECT MIN(id) FROM users)",
                [ROLE_ADMIN],
            )?;
            if promoted > 0 {
                tracing::warn!("no admin present, promoted earliest-created user");
            }
        }
        Ok(())
    }
}
