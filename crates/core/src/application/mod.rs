// Application Layer - Use Cases and Business Logic

pub mod availability;
pub mod coordinator;
pub mod feed;
pub mod ledger;
pub mod validation;

// Re-exports
pub use availability::{AvailabilityTracker, RegisterRequest};
pub use coordinator::{JoinReceipt, JoinRequest, LeaveOutcome, QueueCoordinator};
pub use feed::{ChangeFeed, FeedConfig, QueueSubscription};
pub use ledger::{LedgerCommit, PositionLedger};
