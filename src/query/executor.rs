//! Query execution against an engine session.
//!
//! Every mode runs the same prelude on a fresh statement: the result format
//! directive, then the query. Transient statements are drained and released
//! within the call; detached statements are handed back to the caller for
//! registration.
//!
//! A [`QueryDeadline`] bounds every engine call of one query. When it
//! expires the statement is terminated the same way as on an engine error.

use crate::error::{DriverError, EngineError, FetchError, QueryError};
use crate::transport::protocol::release_statement;
use crate::transport::{ColumnDescriptor, EngineSession, EngineStatement, FetchOutcome};
use crate::types::{ResultMaterializer, Row};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

use super::options::ResultFormat;

/// Point in time after which a query call gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryDeadline {
    /// `None` when the timeout lies beyond the clock's range
    at: Option<Instant>,
    timeout: Duration,
}

impl QueryDeadline {
    /// A deadline `timeout` from now.
    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Instant::now().checked_add(timeout),
            timeout,
        }
    }

    /// The configured timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn expired(&self) -> QueryError {
        let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
        tracing::warn!(timeout_ms, "Query deadline expired");
        QueryError::Timeout { timeout_ms }
    }
}

/// Await `operation`, or fail with `QueryError::Timeout` once `deadline`
/// has passed. Without a deadline the operation runs to completion.
pub async fn within<T, F>(deadline: Option<QueryDeadline>, operation: F) -> Result<T, QueryError>
where
    F: Future<Output = T>,
{
    let Some((deadline, at)) = deadline.and_then(|d| d.at.map(|at| (d, at))) else {
        return Ok(operation.await);
    };
    tokio::time::timeout_at(at, operation)
        .await
        .map_err(|_| deadline.expired())
}

/// A statement on which the query has run.
pub struct PreparedQuery {
    /// The engine statement, positioned before the first row
    pub statement: Box<dyn EngineStatement>,
    /// Column descriptors of the query
    pub columns: Vec<ColumnDescriptor>,
}

impl std::fmt::Debug for PreparedQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedQuery")
            .field("columns", &self.columns)
            .finish()
    }
}

/// Runs queries on a session.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryExecutor {
    materializer: ResultMaterializer,
}

impl QueryExecutor {
    /// Create an executor.
    pub fn new() -> Self {
        Self::default()
    }

    /// The materializer used for rows.
    pub fn materializer(&self) -> ResultMaterializer {
        self.materializer
    }

    /// Create a statement, select the result format and run `sql` on it.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::QueryFailed` with the engine status if any step
    /// fails, or `QueryError::Timeout` once `deadline` passes. The statement
    /// is released before returning.
    pub async fn prepare(
        &self,
        session: &mut dyn EngineSession,
        sql: &str,
        format: ResultFormat,
        deadline: Option<QueryDeadline>,
    ) -> Result<PreparedQuery, QueryError> {
        let failed = |source: EngineError| QueryError::QueryFailed {
            sql: sql.to_string(),
            source,
        };

        let mut statement = within(deadline, session.create_statement())
            .await?
            .map_err(|e| {
                tracing::error!(code = e.code, message = %e.message, "Statement allocation failed");
                failed(e)
            })?;

        let directive = format.directive();
        let status = match within(deadline, statement.query(directive)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                tracing::error!(code = e.code, message = %e.message, "Result format directive failed");
                Err(failed(e))
            }
            Err(timeout) => Err(timeout),
        };
        tracing::trace!(directive, ok = status.is_ok(), "Result format directive");
        if let Err(e) = status {
            release_statement(statement.as_mut()).await;
            return Err(e);
        }

        tracing::trace!(sql, "Executing query");
        let status = match within(deadline, statement.query(sql)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                tracing::error!(
                    code = e.code,
                    sql_state = e.sql_state.as_deref().unwrap_or(""),
                    message = %e.message,
                    "Query failed"
                );
                Err(failed(e))
            }
            Err(timeout) => Err(timeout),
        };
        if let Err(e) = status {
            release_statement(statement.as_mut()).await;
            return Err(e);
        }

        let columns = statement.columns();
        Ok(PreparedQuery { statement, columns })
    }

    /// Run `sql` and materialize every row.
    ///
    /// # Errors
    ///
    /// Returns `QueryFailed` from the prelude, `FetchFailed` if the engine
    /// fails mid-stream, a `ConversionError` for a malformed row, or
    /// `Timeout` once `deadline` passes.
    pub async fn execute_buffered(
        &self,
        session: &mut dyn EngineSession,
        sql: &str,
        format: ResultFormat,
        deadline: Option<QueryDeadline>,
    ) -> Result<Vec<Row>, DriverError> {
        let mut rows = Vec::new();
        self.execute_with_handler(session, sql, format, deadline, |row| rows.push(row))
            .await?;
        Ok(rows)
    }

    /// Run `sql` and hand each row to `handler` in order.
    ///
    /// # Returns
    ///
    /// The number of rows delivered.
    ///
    /// # Errors
    ///
    /// Same as [`execute_buffered`](Self::execute_buffered). Rows delivered
    /// before a failure stay delivered.
    pub async fn execute_with_handler<F>(
        &self,
        session: &mut dyn EngineSession,
        sql: &str,
        format: ResultFormat,
        deadline: Option<QueryDeadline>,
        mut handler: F,
    ) -> Result<u64, DriverError>
    where
        F: FnMut(Row) + Send,
    {
        let PreparedQuery {
            mut statement,
            columns,
        } = self.prepare(session, sql, format, deadline).await?;

        let mut delivered: u64 = 0;
        loop {
            let next = match within(
                deadline,
                self.next_row(statement.as_mut(), &columns, delivered as usize),
            )
            .await
            {
                Ok(next) => next,
                Err(timeout) => Err(timeout.into()),
            };
            match next {
                Ok(Some(row)) => {
                    handler(row);
                    delivered += 1;
                }
                Ok(None) => break,
                Err(e) => {
                    release_statement(statement.as_mut()).await;
                    return Err(e);
                }
            }
        }

        release_statement(statement.as_mut()).await;
        tracing::debug!(rows = delivered, "Query drained");
        Ok(delivered)
    }

    /// Run `sql` without fetching any row.
    ///
    /// # Errors
    ///
    /// Returns `QueryFailed` from the prelude, or `Timeout` once `deadline`
    /// passes.
    pub async fn execute_detached(
        &self,
        session: &mut dyn EngineSession,
        sql: &str,
        format: ResultFormat,
        deadline: Option<QueryDeadline>,
    ) -> Result<PreparedQuery, DriverError> {
        Ok(self.prepare(session, sql, format, deadline).await?)
    }

    /// Pull and materialize the next row.
    ///
    /// Returns `Ok(None)` at end of stream. The statement is not released
    /// here; callers own that decision.
    ///
    /// # Errors
    ///
    /// Returns `FetchFailed` for an engine failure, with `rows_discarded`
    /// set to `position`, or a `ConversionError` for a malformed row.
    pub async fn next_row(
        &self,
        statement: &mut dyn EngineStatement,
        columns: &[ColumnDescriptor],
        position: usize,
    ) -> Result<Option<Row>, DriverError> {
        match statement.fetch().await {
            FetchOutcome::Row(cells) => Ok(Some(
                self.materializer.materialize(columns, &cells, position)?,
            )),
            FetchOutcome::EndOfStream => Ok(None),
            FetchOutcome::Error(source) => {
                tracing::error!(
                    code = source.code,
                    message = %source.message,
                    position,
                    "Fetch failed"
                );
                Err(FetchError::FetchFailed {
                    rows_discarded: position,
                    source,
                }
                .into())
            }
        }
    }
}
