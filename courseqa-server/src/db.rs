//! Database connection pool utilities.

use diesel::connection::SimpleConnection;
use diesel::r2d2::{self, ConnectionManager, CustomizeConnection};
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};

use courseqa_core::{CourseQaError, Result};

/// Pooled SQLite connections for the courseqa server.
pub type DbPool = r2d2::Pool<ConnectionManager<SqliteConnection>>;

/// Embedded Diesel migrations.
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Initialize the database pool using `DATABASE_URL`, defaulting to `courseqa.sqlite3`.
pub fn init_pool() -> Result<DbPool> {
    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "courseqa.sqlite3".to_string());
    build_pool(&database_url, 8)
}

#[derive(Debug)]
struct SqlitePragmas;

impl CustomizeConnection<SqliteConnection, r2d2::Error> for SqlitePragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> std::result::Result<(), r2d2::Error> {
        conn.batch_execute("PRAGMA busy_timeout = 5000; PRAGMA foreign_keys = ON;")
            .map_err(r2d2::Error::QueryError)
    }
}

/// Build a pool for a SQLite database path.
pub fn build_pool(database_url: &str, max_size: u32) -> Result<DbPool> {
    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    r2d2::Pool::builder()
        .max_size(max_size)
        .connection_customizer(Box::new(SqlitePragmas))
        .build(manager)
        .map_err(|err| CourseQaError::Store(format!("failed to create database pool: {err}")))
}

/// Run pending Diesel migrations.
pub fn run_migrations(pool: &DbPool) -> Result<()> {
    let mut conn = pool
        .get()
        .map_err(|err| CourseQaError::Store(format!("failed to fetch database connection: {err}")))?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|err| CourseQaError::Store(format!("run migrations: {err}")))?;
    Ok(())
}

#[cfg(test)]
/// A throwaway SQLite database for tests.
pub(crate) struct TestDatabase {
    dir: tempfile::TempDir,
    pool: Option<DbPool>,
}

#[cfg(test)]
impl TestDatabase {
    /// Create a database file in a fresh temporary directory.
    pub(crate) fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("test database dir"),
            pool: None,
        }
    }

    /// Return the test database path.
    pub(crate) fn database_url(&self) -> String {
        self.dir.path().join("courseqa-test.sqlite3").display().to_string()
    }

    /// Get a pool for the test database. Migrations are left to the caller.
    pub(crate) fn pool(&mut self) -> DbPool {
        if self.pool.is_none() {
            let pool = build_pool(&self.database_url(), 1).expect("pool");
            self.pool = Some(pool);
        }
        self.pool.as_ref().expect("pool").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::{DbPool, TestDatabase, init_pool, run_migrations};
    use diesel::prelude::*;
    use diesel::sql_types::Text;
    use std::sync::{Mutex, MutexGuard, OnceLock};

    fn env_lock() -> MutexGuard<'static, ()> {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        ENV_LOCK
            .get_or_init(|| Mutex::new(()))
            .lock()
            .expect("env lock")
    }

    #[derive(QueryableByName)]
    struct TableName {
        #[diesel(sql_type = Text)]
        name: String,
    }

    fn table_names(pool: &DbPool) -> Vec<String> {
        let mut conn = pool.get().expect("conn");
        let tables: Vec<TableName> = diesel::sql_query(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name != '__diesel_schema_migrations' ORDER BY name",
        )
        .load(&mut conn)
        .expect("query tables");
        tables.into_iter().map(|table| table.name).collect()
    }

    #[test]
    fn init_pool_uses_database_url() {
        let _guard = env_lock();
        let test_db = TestDatabase::new();
        let previous = std::env::var("DATABASE_URL").ok();
        unsafe {
            std::env::set_var("DATABASE_URL", test_db.database_url());
        }
        let pool = init_pool().expect("pool");
        run_migrations(&pool).expect("migrations");

        assert!(table_names(&pool).contains(&"scan_runs".to_string()));

        match previous {
            Some(value) => unsafe {
                std::env::set_var("DATABASE_URL", value);
            },
            None => unsafe {
                std::env::remove_var("DATABASE_URL");
            },
        }
    }

    #[test]
    fn migrations_create_every_table() {
        let mut test_db = TestDatabase::new();
        let pool = test_db.pool();
        run_migrations(&pool).expect("migrations");
        // Re-running is a no-op.
        run_migrations(&pool).expect("migrations again");

        assert_eq!(
            table_names(&pool),
            vec!["assets", "issues", "projects", "scan_runs", "score_summaries"]
        );
    }
}
