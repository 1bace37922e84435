//! Chain store implementations

mod in_memory;
mod migrations;
mod postgres;

pub use in_memory::InMemoryChainStore;
pub use migrations::{Migration, PostgresMigrator, MIGRATIONS};
pub use postgres::{PostgresChainStore, PostgresConfig};
