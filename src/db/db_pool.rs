use duckdb::{AccessMode, Config, Connection};
use r2d2::ManageConnection;
use std::sync::{Arc, Mutex};
use tracing::info;

/// Pools handles onto one DuckDB database.
///
/// The database is opened once; every pooled connection is a clone of that
/// root handle, so `:memory:` databases are shared across the pool.
pub struct DuckDBConnectionManager {
    root: Arc<Mutex<Connection>>,
}

impl DuckDBConnectionManager {
    pub fn open(connection_string: &str, read_only: bool) -> Result<Self, duckdb::Error> {
        let root = if connection_string == ":memory:" {
            Connection::open_in_memory()?
        } else {
            let mode = if read_only {
                AccessMode::ReadOnly
            } else {
                AccessMode::ReadWrite
            };
            Connection::open_with_flags(connection_string, Config::default().access_mode(mode)?)?
        };

        info!(
            "Opened DuckDB database {} (read_only: {})",
            connection_string, read_only
        );

        Ok(Self {
            root: Arc::new(Mutex::new(root)),
        })
    }
}

impl ManageConnection for DuckDBConnectionManager {
    type Connection = Connection;
    type Error = duckdb::Error;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        let root = self.root.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        root.try_clone()
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        conn.execute_batch("SELECT 1")
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}
