pub mod models;
pub mod operations;
pub mod schema;

use anyhow::{Result, anyhow};
use diesel::connection::SimpleConnection;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool};
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use log::{debug, info};
use std::time::Duration;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

pub type SqlitePool = Pool<ConnectionManager<SqliteConnection>>;

const IN_MEMORY: &str = ":memory:";

#[derive(Debug)]
struct ConnectionOptions;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Handle to the workout/set/schedule database.
///
/// Diesel is synchronous, so every query runs on tokio's blocking pool via
/// [`Store::interact`]. Cloning is cheap; clones share the connection pool.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub fn open(database_url: &str) -> Result<Self> {
        let in_memory = database_url == IN_MEMORY;
        let manager = ConnectionManager::<SqliteConnection>::new(database_url);
        // every connection to ":memory:" is a separate database
        let (max_size, lifetime) = if in_memory {
            (1, None)
        } else {
            (8, Some(Duration::from_secs(30 * 60)))
        };
        let pool = Pool::builder()
            .max_size(max_size)
            .max_lifetime(lifetime)
            .idle_timeout(lifetime.map(|_| Duration::from_secs(10 * 60)))
            .connection_customizer(Box::new(ConnectionOptions))
            .build(manager)
            .map_err(|e| anyhow!("Failed to create DB pool: {}", e))?;

        let mut conn = pool
            .get()
            .map_err(|e| anyhow!("Failed to get DB connection: {}", e))?;
        if !in_memory {
            conn.batch_execute("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
        }
        init_database(&mut conn)?;
        drop(conn);

        info!("Opened database {}", database_url);
        Ok(Self { pool })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(IN_MEMORY)
    }

    /// Run `f` with a pooled connection on the blocking thread pool.
    pub async fn interact<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|e| anyhow!("Failed to get DB connection: {}", e))?;
            f(&mut *conn)
        })
        .await
        .map_err(|e| anyhow!("DB task failed: {}", e))?
    }
}

pub fn init_database(conn: &mut SqliteConnection) -> Result<()> {
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow!("Failed to run migrations: {}", e))?;
    if applied.is_empty() {
        debug!("No pending migrations");
    }
    for version in applied {
        info!("Migration {} applied successfully", version);
    }
    Ok(())
}
