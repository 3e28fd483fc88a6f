// Port Layer - Interfaces for external dependencies

pub mod id_provider; // For deterministic testing
pub mod ledger_store;
pub mod professor_repository;
pub mod time_provider;
pub mod transaction;

// Re-exports
pub use id_provider::IdProvider;
pub use ledger_store::{LedgerStore, LedgerTransaction, Retirement};
pub use professor_repository::ProfessorRepository;
pub use time_provider::TimeProvider;
pub use transaction::Transaction;
