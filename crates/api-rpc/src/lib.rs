//! JSON-RPC API Layer
//!
//! Implements the JSON-RPC 2.0 server for QueueUp: queue operations,
//! professor availability, and a per-professor snapshot subscription.

pub mod error;
pub mod handler;
pub mod server;
pub mod types;

pub use handler::RpcHandler;
pub use server::{RpcServer, RpcServerConfig};
