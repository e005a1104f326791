//! SQLite persistence for the CRM.
//!
//! `CrmDb` owns the connection and exposes one method per query; the methods
//! are grouped by entity in the submodules. `DbHandle` is the async-facing
//! wrapper handed to request handlers.

mod categories;
mod followups;
mod leads;
mod notifications;
mod sessions;
mod users;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::errors::CrmError;

pub use notifications::FEED_LIMIT;
pub use sessions::Session;

/// Async-safe handle to the CRM database.
///
/// Wraps `CrmDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, so synchronous SQLite I/O never
/// ties up async worker threads. The mutex also serialises writers: each
/// closure sees a consistent database for its whole duration.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<CrmDb>>,
}

impl DbHandle {
    pub fn new(db: CrmDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R, CrmError>
    where
        F: FnOnce(&CrmDb) -> Result<R, CrmError> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|_| CrmError::LockPoisoned)?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }

    /// Acquire the database mutex synchronously. For startup and tests; never
    /// from a hot async path.
    pub fn lock_sync(&self) -> Result<std::sync::MutexGuard<'_, CrmDb>, CrmError> {
        self.inner.lock().map_err(|_| CrmError::LockPoisoned)
    }
}

pub struct CrmDb {
    conn: Connection,
}

impl CrmDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    username TEXT NOT NULL UNIQUE,
                    email TEXT NOT NULL DEFAULT '',
                    first_name TEXT NOT NULL DEFAULT '',
                    last_name TEXT NOT NULL DEFAULT '',
                    password_hash TEXT NOT NULL DEFAULT '',
                    is_organisor INTEGER NOT NULL DEFAULT 0,
                    is_agent INTEGER NOT NULL DEFAULT 0,
                    is_superuser INTEGER NOT NULL DEFAULT 0,
                    date_joined TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS user_profiles (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE
                );

                CREATE TABLE IF NOT EXISTS agents (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
                    organisation_id INTEGER NOT NULL REFERENCES user_profiles(id) ON DELETE CASCADE
                );

                CREATE TABLE IF NOT EXISTS categories (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    organisation_id INTEGER NOT NULL REFERENCES user_profiles(id) ON DELETE CASCADE
                );

                CREATE TABLE IF NOT EXISTS leads (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    organisation_id INTEGER NOT NULL REFERENCES user_profiles(id) ON DELETE CASCADE,
                    first_name TEXT NOT NULL,
                    last_name TEXT NOT NULL,
                    age INTEGER NOT NULL DEFAULT 0,
                    description TEXT NOT NULL DEFAULT '',
                    phone_number TEXT NOT NULL DEFAULT '',
                    email TEXT NOT NULL DEFAULT '',
                    agent_id INTEGER REFERENCES agents(id) ON DELETE SET NULL,
                    category_id INTEGER REFERENCES categories(id) ON DELETE SET NULL,
                    date_added TEXT NOT NULL,
                    converted_date TEXT
                );

                CREATE TABLE IF NOT EXISTS followups (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    lead_id INTEGER NOT NULL REFERENCES leads(id) ON DELETE CASCADE,
                    author_id INTEGER REFERENCES users(id) ON DELETE SET NULL,
                    notes TEXT NOT NULL DEFAULT '',
                    date_added TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS notifications (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    message TEXT NOT NULL,
                    url TEXT,
                    read INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS sessions (
                    token TEXT PRIMARY KEY,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    visible_leads TEXT NOT NULL DEFAULT '[]',
                    last_leads_query TEXT NOT NULL DEFAULT '',
                    created_at TEXT NOT NULL,
                    expires_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_agents_org ON agents(organisation_id);
                CREATE INDEX IF NOT EXISTS idx_categories_org ON categories(organisation_id);
                CREATE INDEX IF NOT EXISTS idx_leads_org ON leads(organisation_id);
                CREATE INDEX IF NOT EXISTS idx_leads_agent ON leads(agent_id);
                CREATE INDEX IF NOT EXISTS idx_followups_lead ON followups(lead_id);
                CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id, created_at);
                CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }
}

/// Most ids bound into a single `IN (...)` list. SQLite caps host
/// parameters per statement, so longer lists are split.
const ID_CHUNK: usize = 500;

/// Sorted, deduplicated ids split into `ID_CHUNK`-sized runs.
fn id_chunks(ids: &[i64]) -> Vec<Vec<i64>> {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids.chunks(ID_CHUNK).map(<[i64]>::to_vec).collect()
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Collect mapped rows, attaching `what` to any row error.
fn collect_rows<T>(
    rows: impl Iterator<Item = rusqlite::Result<T>>,
    what: &'static str,
) -> Result<Vec<T>> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row.with_context(|| format!("Failed to read {} row", what))?);
    }
    Ok(out)
}
