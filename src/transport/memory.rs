//! In-memory engine for testing.
//!
//! `MemoryEngine` implements the engine traits without a network. Result sets
//! are registered up front against their SQL text; the engine then behaves like
//! the warehouse would: it honours the result format directive (JSON delivers
//! numbers as text, ARROW as typed numbers), checks credentials, can fail a
//! query or fail mid-stream, and counts live sessions and statements so tests
//! can assert that every handle was released.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value as JsonValue;

use crate::connection::params::ConnectionParams;
use crate::error::EngineError;

use super::messages::{ColumnDescriptor, EngineRow, FetchOutcome, NativeType};
use super::protocol::{EngineConnector, EngineSession, EngineStatement};

/// Status code for rejected credentials.
pub const STATUS_AUTHENTICATION_FAILED: i32 = 390100;
/// Status code for an operation on a terminated session.
pub const STATUS_SESSION_GONE: i32 = 390111;
/// Status code for SQL the engine does not know.
pub const STATUS_COMPILATION_ERROR: i32 = 2003;
/// Status code for a bad session attribute value.
pub const STATUS_INVALID_PARAMETER: i32 = 1008;

const RESULT_FORMAT_ATTRIBUTE: &str = "c_api_query_result_format";

/// A registered result set.
#[derive(Debug, Clone)]
pub struct MemoryTable {
    columns: Vec<ColumnDescriptor>,
    rows: Vec<EngineRow>,
    query_error: Option<EngineError>,
    fetch_failure: Option<(usize, EngineError)>,
}

impl MemoryTable {
    /// Create a result set from typed JSON cells.
    pub fn new(columns: Vec<ColumnDescriptor>, rows: Vec<EngineRow>) -> Self {
        Self {
            columns,
            rows,
            query_error: None,
            fetch_failure: None,
        }
    }

    /// A query that the engine rejects at execution time.
    pub fn failing(error: EngineError) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            query_error: Some(error),
            fetch_failure: None,
        }
    }

    /// Fail the fetch that would return row `after` (0-based).
    pub fn with_fetch_failure(mut self, after: usize, error: EngineError) -> Self {
        self.fetch_failure = Some((after, error));
        self
    }

    /// Number of rows in the result set.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WireFormat {
    Json,
    Arrow,
}

#[derive(Default)]
struct EngineState {
    credentials: RwLock<HashMap<String, String>>,
    tables: RwLock<HashMap<String, MemoryTable>>,
    executed: Mutex<Vec<String>>,
    fetch_delay: RwLock<Option<Duration>>,
    live_sessions: AtomicUsize,
    live_statements: AtomicUsize,
}

/// An in-process engine.
#[derive(Clone, Default)]
pub struct MemoryEngine {
    state: Arc<EngineState>,
}

impl std::fmt::Debug for MemoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryEngine")
            .field("tables", &self.state.tables.read().len())
            .field("live_sessions", &self.live_sessions())
            .field("live_statements", &self.live_statements())
            .finish()
    }
}

impl MemoryEngine {
    /// Create an engine that accepts any credentials.
    pub fn new() -> Self {
        Self::default()
    }

    /// Only accept this username/password pair (may be called repeatedly).
    pub fn with_user(self, username: &str, password: &str) -> Self {
        self.state
            .credentials
            .write()
            .insert(username.to_string(), password.to_string());
        self
    }

    /// Register the result set returned for `sql`.
    pub fn register(&self, sql: &str, table: MemoryTable) {
        self.state.tables.write().insert(normalize(sql), table);
    }

    /// Delay every fetch by `delay`.
    pub fn set_fetch_delay(&self, delay: Option<Duration>) {
        *self.state.fetch_delay.write() = delay;
    }

    /// Every SQL text executed so far, directives included, in order.
    pub fn executed_sql(&self) -> Vec<String> {
        self.state.executed.lock().clone()
    }

    /// Sessions opened and not yet terminated.
    pub fn live_sessions(&self) -> usize {
        self.state.live_sessions.load(Ordering::SeqCst)
    }

    /// Statements created and not yet terminated.
    pub fn live_statements(&self) -> usize {
        self.state.live_statements.load(Ordering::SeqCst)
    }

    fn check_credentials(&self, params: &ConnectionParams) -> Result<(), EngineError> {
        let credentials = self.state.credentials.read();
        if credentials.is_empty() {
            return Ok(());
        }
        match credentials.get(&params.username) {
            Some(password) if password == params.password() => Ok(()),
            _ => Err(EngineError::new(
                STATUS_AUTHENTICATION_FAILED,
                "Incorrect username or password was specified.",
            )
            .with_sql_state("08004")),
        }
    }
}

#[async_trait]
impl EngineConnector for MemoryEngine {
    async fn connect(
        &self,
        params: &ConnectionParams,
    ) -> Result<Box<dyn EngineSession>, EngineError> {
        self.check_credentials(params)?;
        self.state.live_sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySession {
            state: Arc::clone(&self.state),
            shared: Arc::new(SessionShared {
                connected: AtomicBool::new(true),
                format: Mutex::new(WireFormat::Json),
            }),
        }))
    }
}

struct SessionShared {
    connected: AtomicBool,
    format: Mutex<WireFormat>,
}

impl SessionShared {
    fn check_open(&self) -> Result<(), EngineError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(EngineError::new(
                STATUS_SESSION_GONE,
                "Session no longer exists. New login required to access the service.",
            ))
        }
    }
}

struct MemorySession {
    state: Arc<EngineState>,
    shared: Arc<SessionShared>,
}

impl MemorySession {
    fn close(&self) -> bool {
        let was_open = self.shared.connected.swap(false, Ordering::SeqCst);
        if was_open {
            self.state.live_sessions.fetch_sub(1, Ordering::SeqCst);
        }
        was_open
    }
}

#[async_trait]
impl EngineSession for MemorySession {
    async fn create_statement(&mut self) -> Result<Box<dyn EngineStatement>, EngineError> {
        self.shared.check_open()?;
        self.state.live_statements.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryStatement {
            state: Arc::clone(&self.state),
            session: Arc::clone(&self.shared),
            columns: Vec::new(),
            rows: Vec::new().into_iter(),
            position: 0,
            fetch_failure: None,
            format: WireFormat::Json,
            released: false,
        }))
    }

    async fn terminate(&mut self) -> Result<(), EngineError> {
        if self.close() {
            Ok(())
        } else {
            self.shared.check_open()
        }
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.close();
    }
}

struct MemoryStatement {
    state: Arc<EngineState>,
    session: Arc<SessionShared>,
    columns: Vec<ColumnDescriptor>,
    rows: std::vec::IntoIter<EngineRow>,
    position: usize,
    fetch_failure: Option<(usize, EngineError)>,
    format: WireFormat,
    released: bool,
}

impl MemoryStatement {
    fn load(&mut self, table: MemoryTable) {
        self.columns = table.columns;
        self.rows = table.rows.into_iter();
        self.position = 0;
        self.fetch_failure = table.fetch_failure;
        self.format = *self.session.format.lock();
    }

    fn apply_directive(&mut self, assignment: &str) -> Result<(), EngineError> {
        let (name, value) = assignment.split_once('=').ok_or_else(|| {
            EngineError::new(STATUS_COMPILATION_ERROR, "syntax error in ALTER SESSION")
                .with_sql_state("42000")
        })?;
        if name.trim().eq_ignore_ascii_case(RESULT_FORMAT_ATTRIBUTE) {
            let format = match value.trim().to_ascii_uppercase().as_str() {
                "JSON" => WireFormat::Json,
                "ARROW" | "ARROW_FORCE" => WireFormat::Arrow,
                other => {
                    return Err(EngineError::new(
                        STATUS_INVALID_PARAMETER,
                        format!("invalid value [{other}] for parameter 'C_API_QUERY_RESULT_FORMAT'"),
                    ))
                }
            };
            *self.session.format.lock() = format;
        }
        self.load(MemoryTable::new(Vec::new(), Vec::new()));
        Ok(())
    }

    fn encode(&self, row: EngineRow) -> EngineRow {
        match self.format {
            WireFormat::Arrow => row,
            WireFormat::Json => row
                .into_iter()
                .map(|cell| match cell {
                    JsonValue::Number(n) => JsonValue::String(n.to_string()),
                    other => other,
                })
                .collect(),
        }
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.state.live_statements.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl EngineStatement for MemoryStatement {
    async fn query(&mut self, sql: &str) -> Result<(), EngineError> {
        self.state.executed.lock().push(sql.to_string());
        self.session.check_open()?;

        let normalized = normalize(sql);
        if let Some(assignment) = strip_prefix_ignore_case(&normalized, "alter session set ") {
            return self.apply_directive(assignment);
        }

        let registered = self.state.tables.read().get(&normalized).cloned();
        let table = match registered {
            Some(table) => table,
            None => literal_select(&normalized).ok_or_else(|| {
                EngineError::new(
                    STATUS_COMPILATION_ERROR,
                    format!("SQL compilation error: unknown statement '{normalized}'"),
                )
                .with_sql_state("42S02")
            })?,
        };
        if let Some(error) = table.query_error.clone() {
            return Err(error);
        }
        self.load(table);
        Ok(())
    }

    fn columns(&self) -> Vec<ColumnDescriptor> {
        self.columns.clone()
    }

    async fn fetch(&mut self) -> FetchOutcome {
        let delay = *self.state.fetch_delay.read();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Err(e) = self.session.check_open() {
            return FetchOutcome::Error(e);
        }
        if let Some((after, error)) = &self.fetch_failure {
            if self.position >= *after {
                return FetchOutcome::Error(error.clone());
            }
        }
        match self.rows.next() {
            Some(row) => {
                self.position += 1;
                FetchOutcome::Row(self.encode(row))
            }
            None => FetchOutcome::EndOfStream,
        }
    }

    async fn terminate(&mut self) -> Result<(), EngineError> {
        self.release();
        Ok(())
    }
}

impl Drop for MemoryStatement {
    fn drop(&mut self) {
        self.release();
    }
}

fn normalize(sql: &str) -> String {
    sql.trim().trim_end_matches(';').trim_end().to_string()
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &text[prefix.len()..])
}

/// `SELECT 1, 2, 3` answers itself with one INT64 row.
fn literal_select(sql: &str) -> Option<MemoryTable> {
    let list = strip_prefix_ignore_case(sql, "select ")?;
    let mut columns = Vec::new();
    let mut row = Vec::new();
    for literal in list.split(',') {
        let literal = literal.trim();
        let value: i64 = literal.parse().ok()?;
        columns.push(ColumnDescriptor::new(literal, NativeType::Int64).with_nullable(false));
        row.push(JsonValue::from(value));
    }
    Some(MemoryTable::new(columns, vec![row]))
}
