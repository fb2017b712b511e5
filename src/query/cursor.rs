//! Detached statements and the pagination cursor.
//!
//! A detached statement is registered under a [`RunningStatementKey`] and
//! drained page by page through [`StatementRegistry::fetch_next`]. The key is
//! removed, and the statement released, exactly once: when a fetch reaches
//! end of stream, when a fetch fails, or on an explicit release. Afterwards
//! the key resolves to `StatementNotFound`.
//!
//! # Locking
//!
//! The key → statement map sits behind a `parking_lot::Mutex` held only for
//! lookups, inserts and removals. Each statement sits behind its own
//! `tokio::sync::Mutex`, so concurrent fetches on one key run one after the
//! other and never interleave rows.

use crate::error::{DriverError, FetchError, RegistryError};
use crate::id::IdGenerator;
use crate::query::executor::{PreparedQuery, QueryExecutor};
use crate::transport::protocol::release_statement;
use crate::transport::{ColumnDescriptor, EngineStatement};
use crate::types::Row;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex as TokioMutex;

/// Compound key of a detached statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunningStatementKey {
    /// Connection the statement was executed on
    pub connection_id: String,
    /// Statement id handed to the caller
    pub statement_id: String,
}

impl RunningStatementKey {
    /// Create a key.
    pub fn new(connection_id: impl Into<String>, statement_id: impl Into<String>) -> Self {
        Self {
            connection_id: connection_id.into(),
            statement_id: statement_id.into(),
        }
    }

    fn not_found(&self) -> RegistryError {
        RegistryError::StatementNotFound {
            connection_id: self.connection_id.clone(),
            statement_id: self.statement_id.clone(),
        }
    }
}

impl fmt::Display for RunningStatementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.connection_id, self.statement_id)
    }
}

/// One page of rows from a detached statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    /// Rows fetched by this call, in engine order
    pub rows: Vec<Row>,
    /// True once the statement is exhausted and its key released
    pub end: bool,
}

impl Page {
    /// Number of rows in the page.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the page carries no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

struct DetachedStatement {
    columns: Vec<ColumnDescriptor>,
    statement: Option<Box<dyn EngineStatement>>,
    rows_fetched: usize,
}

type StatementSlot = Arc<TokioMutex<DetachedStatement>>;

/// Owner of every detached statement.
pub struct StatementRegistry {
    statements: Mutex<HashMap<RunningStatementKey, StatementSlot>>,
    ids: IdGenerator,
    executor: QueryExecutor,
}

impl Default for StatementRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StatementRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            statements: Mutex::new(HashMap::new()),
            ids: IdGenerator::new(),
            executor: QueryExecutor::new(),
        }
    }

    /// Use a specific identifier generator.
    pub fn with_id_generator(mut self, ids: IdGenerator) -> Self {
        self.ids = ids;
        self
    }

    /// Register a prepared statement under a fresh statement id.
    ///
    /// # Errors
    ///
    /// Returns `IdExhausted` if no unused id could be generated. The statement
    /// is released in that case.
    pub async fn register(
        &self,
        connection_id: &str,
        prepared: PreparedQuery,
    ) -> Result<String, DriverError> {
        let PreparedQuery { statement, columns } = prepared;

        let inserted = {
            let mut statements = self.statements.lock();
            let generated = self.ids.generate_unique(|candidate| {
                statements.contains_key(&RunningStatementKey::new(connection_id, candidate))
            });
            match generated {
                Ok(statement_id) => {
                    let detached = DetachedStatement {
                        columns,
                        statement: Some(statement),
                        rows_fetched: 0,
                    };
                    statements.insert(
                        RunningStatementKey::new(connection_id, statement_id.clone()),
                        Arc::new(TokioMutex::new(detached)),
                    );
                    Ok(statement_id)
                }
                Err(e) => Err((e, statement)),
            }
        };

        match inserted {
            Ok(statement_id) => {
                tracing::debug!(
                    connection_id,
                    statement_id = %statement_id,
                    "Statement registered"
                );
                Ok(statement_id)
            }
            Err((e, mut statement)) => {
                release_statement(statement.as_mut()).await;
                Err(e.into())
            }
        }
    }

    /// Fetch up to `max_rows` rows from a detached statement.
    ///
    /// A page shorter than `max_rows` is only returned together with
    /// `end = true`. When the row count is a multiple of `max_rows`, the last
    /// page is empty.
    ///
    /// # Errors
    ///
    /// - `InvalidFetchSize` if `max_rows` is zero
    /// - `StatementNotFound` for an unknown or finished key
    /// - `FetchFailed` if the engine fails mid-page; the rows of the page are
    ///   discarded and the key is released
    /// - `ConversionError` for a malformed row; the key is released
    pub async fn fetch_next(
        &self,
        connection_id: &str,
        statement_id: &str,
        max_rows: usize,
    ) -> Result<Page, DriverError> {
        if max_rows == 0 {
            return Err(FetchError::InvalidFetchSize(max_rows).into());
        }

        let key = RunningStatementKey::new(connection_id, statement_id);
        let slot = self.slot(&key)?;
        let mut guard = slot.lock().await;
        let entry = &mut *guard;
        let Some(statement) = entry.statement.as_deref_mut() else {
            return Err(key.not_found().into());
        };

        let mut rows = Vec::with_capacity(max_rows.min(1024));
        let mut end = false;
        let mut failure = None;
        while rows.len() < max_rows {
            match self
                .executor
                .next_row(&mut *statement, &entry.columns, entry.rows_fetched)
                .await
            {
                Ok(Some(row)) => {
                    rows.push(row);
                    entry.rows_fetched += 1;
                }
                Ok(None) => {
                    end = true;
                    break;
                }
                Err(DriverError::Fetch(FetchError::FetchFailed { source, .. })) => {
                    failure = Some(DriverError::from(FetchError::FetchFailed {
                        rows_discarded: rows.len(),
                        source,
                    }));
                    break;
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        if end || failure.is_some() {
            self.finish(&key, &slot, entry).await;
        }

        match failure {
            Some(e) => Err(e),
            None => {
                tracing::trace!(statement = %key, rows = rows.len(), end, "Page fetched");
                Ok(Page { rows, end })
            }
        }
    }

    /// Abandon a detached statement before it is exhausted.
    ///
    /// Waits for an in-flight fetch on the same key.
    ///
    /// # Errors
    ///
    /// Returns `StatementNotFound` for an unknown or finished key.
    pub async fn release(&self, connection_id: &str, statement_id: &str) -> Result<(), DriverError> {
        let key = RunningStatementKey::new(connection_id, statement_id);
        let slot = self.slot(&key)?;
        let mut guard = slot.lock().await;
        if guard.statement.is_none() {
            return Err(key.not_found().into());
        }
        self.finish(&key, &slot, &mut guard).await;
        Ok(())
    }

    /// Column descriptors of a detached statement.
    ///
    /// Waits for an in-flight fetch on the same key.
    ///
    /// # Errors
    ///
    /// Returns `StatementNotFound` for an unknown or finished key.
    pub async fn columns(
        &self,
        connection_id: &str,
        statement_id: &str,
    ) -> Result<Vec<ColumnDescriptor>, DriverError> {
        let key = RunningStatementKey::new(connection_id, statement_id);
        let slot = self.slot(&key)?;
        let guard = slot.lock().await;
        if guard.statement.is_none() {
            return Err(key.not_found().into());
        }
        Ok(guard.columns.clone())
    }

    /// Release every detached statement of a connection.
    ///
    /// # Returns
    ///
    /// The number of statements released.
    pub async fn release_connection(&self, connection_id: &str) -> usize {
        let slots: Vec<(RunningStatementKey, StatementSlot)> = {
            let mut statements = self.statements.lock();
            let keys: Vec<RunningStatementKey> = statements
                .keys()
                .filter(|key| key.connection_id == connection_id)
                .cloned()
                .collect();
            keys.into_iter()
                .filter_map(|key| statements.remove(&key).map(|slot| (key, slot)))
                .collect()
        };

        let mut released = 0;
        for (key, slot) in slots {
            let mut guard = slot.lock().await;
            if let Some(mut statement) = guard.statement.take() {
                release_statement(statement.as_mut()).await;
                tracing::debug!(statement = %key, "Statement released with its connection");
                released += 1;
            }
        }
        released
    }

    /// Check if a key is registered.
    pub fn contains(&self, connection_id: &str, statement_id: &str) -> bool {
        self.statements
            .lock()
            .contains_key(&RunningStatementKey::new(connection_id, statement_id))
    }

    /// Number of registered statements.
    pub fn len(&self) -> usize {
        self.statements.lock().len()
    }

    /// Check if no statements are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, key: &RunningStatementKey) -> Result<StatementSlot, RegistryError> {
        self.statements
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| key.not_found())
    }

    /// Remove the key and release the statement. The caller holds the
    /// statement lock, so this runs at most once per key.
    async fn finish(
        &self,
        key: &RunningStatementKey,
        slot: &StatementSlot,
        entry: &mut DetachedStatement,
    ) {
        {
            let mut statements = self.statements.lock();
            if statements
                .get(key)
                .is_some_and(|current| Arc::ptr_eq(current, slot))
            {
                statements.remove(key);
            }
        }
        if let Some(mut statement) = entry.statement.take() {
            release_statement(statement.as_mut()).await;
            tracing::debug!(statement = %key, rows = entry.rows_fetched, "Statement released");
        }
    }
}

impl fmt::Debug for StatementRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatementRegistry")
            .field("statements", &self.len())
            .field("ids", &self.ids)
            .finish()
    }
}
