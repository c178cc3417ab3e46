//! # Calbot Store
//! Entry persistence backends.

pub mod memory;
pub mod sqlite;

use calbot_core::config::DatabaseConfig;
use calbot_core::error::Result;
use calbot_core::traits::EntryStore;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Create an entry store from configuration. `:memory:` keeps entries in
/// process only.
pub fn create_store(config: &DatabaseConfig) -> Result<Box<dyn EntryStore>> {
    match config.path.as_str() {
        ":memory:" => Ok(Box::new(MemoryStore::new())),
        path => {
            let path = shellexpand::tilde(path).to_string();
            Ok(Box::new(SqliteStore::open(std::path::Path::new(&path))?))
        }
    }
}
