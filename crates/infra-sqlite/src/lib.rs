// QueueUp Infrastructure - SQLite Adapter
// Implements: LedgerStore, LedgerTransaction, ProfessorRepository

mod connection;
mod error;
mod ledger_store;
mod migration;
mod professor_repository;
mod rows;
mod transaction;

pub use connection::{create_pool, BUSY_TIMEOUT};
pub use ledger_store::SqliteLedgerStore;
pub use migration::run_migrations;
pub use professor_repository::SqliteProfessorRepository;
pub use transaction::SqliteLedgerTransaction;
