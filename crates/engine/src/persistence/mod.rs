//! Persistence layer for workflow executions
//!
//! This module provides:
//! - [`ExecutionStore`] trait for workflow, execution and log persistence
//! - [`InMemoryExecutionStore`] for testing
//! - [`PostgresExecutionStore`] for production

mod memory;
mod postgres;
mod store;

pub use memory::InMemoryExecutionStore;
pub use postgres::PostgresExecutionStore;
pub use store::{ExecutionStore, StoreError};
