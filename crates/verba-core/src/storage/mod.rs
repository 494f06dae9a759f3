mod backend;
mod sqlite;

pub use backend::StorageBackend;
pub use sqlite::SqliteStorage;

use crate::config::VerbaConfig;
use crate::error::{Result, VerbaError};

/// Open the SQLite database named by the configuration, creating its
/// parent directory if needed.
pub fn create_backend(config: &VerbaConfig) -> Result<SqliteStorage> {
    let path = config.database_path()?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                VerbaError::Storage(format!(
                    "failed to create database directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
    }
    SqliteStorage::open(&path)
}
