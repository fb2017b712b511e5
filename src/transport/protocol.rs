//! Engine API abstraction traits.
//!
//! These traits are the seam to the warehouse engine: opening a session,
//! creating statements, running SQL, describing columns, pulling rows one at a
//! time and terminating. The wire protocol behind them is not part of this
//! crate; [`MemoryEngine`](super::memory::MemoryEngine) implements them in
//! process.

use crate::connection::params::ConnectionParams;
use crate::error::EngineError;
use async_trait::async_trait;

use super::messages::{ColumnDescriptor, FetchOutcome};

/// Factory for engine sessions.
#[async_trait]
pub trait EngineConnector: Send + Sync {
    /// Open and authenticate a session.
    ///
    /// # Errors
    ///
    /// Returns the engine's status if the session cannot be opened.
    async fn connect(&self, params: &ConnectionParams)
        -> Result<Box<dyn EngineSession>, EngineError>;
}

/// An open session against the engine.
#[async_trait]
pub trait EngineSession: Send + Sync {
    /// Allocate a new statement on this session.
    ///
    /// # Errors
    ///
    /// Returns `EngineError` if the session cannot allocate a statement.
    async fn create_statement(&mut self) -> Result<Box<dyn EngineStatement>, EngineError>;

    /// Terminate the session.
    ///
    /// # Errors
    ///
    /// Returns `EngineError` if the engine rejects the logout.
    async fn terminate(&mut self) -> Result<(), EngineError>;

    /// Check if the session is still open.
    fn is_connected(&self) -> bool;
}

/// A server-side execution context.
///
/// Session attributes set by a query on a statement apply to later queries on
/// the same statement, which is how the result format directive takes effect.
#[async_trait]
pub trait EngineStatement: Send + Sync {
    /// Execute SQL on this statement.
    ///
    /// # Errors
    ///
    /// Returns `EngineError` on syntax, permission or runtime failure.
    async fn query(&mut self, sql: &str) -> Result<(), EngineError>;

    /// Column descriptors of the last executed query.
    fn columns(&self) -> Vec<ColumnDescriptor>;

    /// Pull the next row.
    async fn fetch(&mut self) -> FetchOutcome;

    /// Release the statement on the engine.
    ///
    /// # Errors
    ///
    /// Returns `EngineError` if the engine fails to release it.
    async fn terminate(&mut self) -> Result<(), EngineError>;
}

/// Release a statement, logging instead of propagating a failure.
///
/// Used on paths that already carry a result or an error of their own.
pub(crate) async fn release_statement(statement: &mut dyn EngineStatement) {
    if let Err(e) = statement.terminate().await {
        tracing::warn!(code = e.code, message = %e.message, "Statement release failed");
    }
}
