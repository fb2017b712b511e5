//! Common test utilities for snowcursor-rs integration tests.
//!
//! Every integration test runs against the in-process [`MemoryEngine`], so no
//! warehouse account is needed. The fixtures below register a few result sets
//! and open a driver over them.
//!
//! # Registered statements
//!
//! | SQL                           | Rows | Notes                              |
//! |-------------------------------|------|------------------------------------|
//! | `SELECT 1`                    | 1    | answered by the engine itself      |
//! | [`NUMBERS_SQL`]               | 25   | one INT64 column, values 0..25     |
//! | [`ORDERS_SQL`]                | 3    | INT64, FLOAT64, STRING             |
//! | [`MIXED_SQL`]                 | 3    | nulls and unsupported columns      |
//! | [`BROKEN_SQL`]                | 3    | engine fails on the fourth fetch   |
//! | [`MISSING_SQL`]               | -    | rejected at execution time         |
//!
//! [`StallingEngine`] is a second engine whose statements hang on one step
//! and are only released by an explicit terminate.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use snowcursor_rs::transport::memory::STATUS_SESSION_GONE;
use snowcursor_rs::transport::{
    ColumnDescriptor, EngineConnector, EngineSession, EngineStatement, FetchOutcome, MemoryEngine,
    MemoryTable, NativeType,
};
use snowcursor_rs::{ConnectionParams, Driver, DriverConfig, EngineError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Credentials
// ============================================================================

/// Username accepted by the test engine.
pub const TEST_USER: &str = "loader";

/// Password accepted by the test engine.
pub const TEST_PASSWORD: &str = "s3cret";

/// Account used by every connection.
pub const TEST_ACCOUNT: &str = "acme";

// ============================================================================
// Registered SQL
// ============================================================================

/// Number of rows behind [`NUMBERS_SQL`].
pub const NUMBERS_ROWS: usize = 25;

/// One INT64 column, 0..NUMBERS_ROWS in order.
pub const NUMBERS_SQL: &str = "SELECT N FROM NUMBERS ORDER BY N";

/// Three typed rows.
pub const ORDERS_SQL: &str = "SELECT ID, PRICE, ITEM FROM ORDERS";

/// Nulls in every column, plus BOOLEAN and VARIANT columns.
pub const MIXED_SQL: &str = "SELECT ID, NOTE, FLAG, DOC FROM MIXED";

/// Three rows, then an engine failure.
pub const BROKEN_SQL: &str = "SELECT N FROM FLAKY";

/// Rejected by the engine.
pub const MISSING_SQL: &str = "SELECT * FROM DOES_NOT_EXIST";

// ============================================================================
// Fixtures
// ============================================================================

/// Build an engine with every test result set registered.
pub fn test_engine() -> MemoryEngine {
    let engine = MemoryEngine::new().with_user(TEST_USER, TEST_PASSWORD);

    engine.register(
        NUMBERS_SQL,
        MemoryTable::new(
            vec![ColumnDescriptor::new("N", NativeType::Int64)],
            (0..NUMBERS_ROWS).map(|n| vec![json!(n)]).collect(),
        ),
    );

    engine.register(
        ORDERS_SQL,
        MemoryTable::new(
            vec![
                ColumnDescriptor::new("ID", NativeType::Int64),
                ColumnDescriptor::new("PRICE", NativeType::Float64),
                ColumnDescriptor::new("ITEM", NativeType::String),
            ],
            vec![
                vec![json!(1), json!(9.99), json!("widget")],
                vec![json!(2), json!(0.5), json!("gadget")],
                vec![json!(3), json!(120.0), json!("gizmo")],
            ],
        ),
    );

    engine.register(
        MIXED_SQL,
        MemoryTable::new(
            vec![
                ColumnDescriptor::new("ID", NativeType::Int64),
                ColumnDescriptor::new("NOTE", NativeType::String),
                ColumnDescriptor::new("FLAG", NativeType::Boolean),
                ColumnDescriptor::new("DOC", NativeType::Other("VARIANT".to_string())),
            ],
            vec![
                vec![json!(1), json!("first"), json!(true), json!("{}")],
                vec![json!(null), json!(null), json!(null), json!(null)],
                vec![json!(3), json!(null), json!(false), json!(null)],
            ],
        ),
    );

    engine.register(
        BROKEN_SQL,
        MemoryTable::new(
            vec![ColumnDescriptor::new("N", NativeType::Int64)],
            (0..10).map(|n| vec![json!(n)]).collect(),
        )
        .with_fetch_failure(
            3,
            EngineError::new(STATUS_SESSION_GONE, "Session no longer exists"),
        ),
    );

    engine
}

/// Valid connection parameters for the test engine.
pub fn test_params() -> ConnectionParams {
    ConnectionParams::builder()
        .username(TEST_USER)
        .password(TEST_PASSWORD)
        .account(TEST_ACCOUNT)
        .database("ANALYTICS")
        .schema("PUBLIC")
        .warehouse("COMPUTE_WH")
        .build()
        .expect("test parameters are valid")
}

/// Build a connection string for the test engine.
pub fn test_connection_string() -> String {
    format!(
        "snowflake://{}:{}@{}/ANALYTICS/PUBLIC?warehouse=COMPUTE_WH",
        TEST_USER, TEST_PASSWORD, TEST_ACCOUNT
    )
}

/// A driver over a fresh test engine, plus the engine for inspection.
pub fn test_driver() -> (Driver, MemoryEngine) {
    let engine = test_engine();
    (Driver::new(Arc::new(engine.clone())), engine)
}

/// A driver with a custom configuration over a fresh test engine.
pub fn test_driver_with(config: DriverConfig) -> (Driver, MemoryEngine) {
    let engine = test_engine();
    let driver = Driver::with_config(Arc::new(engine.clone()), config)
        .expect("test configuration is valid");
    (driver, engine)
}

/// Open a connection, panicking on failure.
pub async fn connect(driver: &Driver) -> String {
    driver
        .connect(&test_params())
        .await
        .expect("Connection with valid credentials should succeed")
}

// ============================================================================
// Stalling engine
// ============================================================================

/// How long a stalled step hangs.
pub const STALL: Duration = Duration::from_secs(10);

/// The step on which [`StallingEngine`] statements hang.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StallOn {
    /// The user query (the result format directive still succeeds)
    Query,
    /// Every fetch
    Fetch,
}

/// Statements created and terminated by a [`StallingEngine`].
#[derive(Debug, Default)]
pub struct StatementTally {
    created: AtomicUsize,
    terminated: AtomicUsize,
}

impl StatementTally {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn terminated(&self) -> usize {
        self.terminated.load(Ordering::SeqCst)
    }
}

/// An engine whose statements hang for [`STALL`] on one step.
///
/// Unlike [`MemoryEngine`], dropping a statement does not release it; only
/// `terminate` is counted.
#[derive(Debug, Clone)]
pub struct StallingEngine {
    stall_on: StallOn,
    tally: Arc<StatementTally>,
}

impl StallingEngine {
    pub fn new(stall_on: StallOn) -> Self {
        Self {
            stall_on,
            tally: Arc::new(StatementTally::default()),
        }
    }

    pub fn tally(&self) -> Arc<StatementTally> {
        Arc::clone(&self.tally)
    }
}

#[async_trait]
impl EngineConnector for StallingEngine {
    async fn connect(
        &self,
        _params: &ConnectionParams,
    ) -> Result<Box<dyn EngineSession>, EngineError> {
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl EngineSession for StallingEngine {
    async fn create_statement(&mut self) -> Result<Box<dyn EngineStatement>, EngineError> {
        self.tally.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StallingStatement {
            stall_on: self.stall_on,
            tally: Arc::clone(&self.tally),
        }))
    }

    async fn terminate(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }
}

struct StallingStatement {
    stall_on: StallOn,
    tally: Arc<StatementTally>,
}

#[async_trait]
impl EngineStatement for StallingStatement {
    async fn query(&mut self, sql: &str) -> Result<(), EngineError> {
        let directive = sql.to_ascii_lowercase().starts_with("alter session");
        if self.stall_on == StallOn::Query && !directive {
            tokio::time::sleep(STALL).await;
        }
        Ok(())
    }

    fn columns(&self) -> Vec<ColumnDescriptor> {
        vec![ColumnDescriptor::new("N", NativeType::Int64)]
    }

    async fn fetch(&mut self) -> FetchOutcome {
        if self.stall_on == StallOn::Fetch {
            tokio::time::sleep(STALL).await;
        }
        FetchOutcome::EndOfStream
    }

    async fn terminate(&mut self) -> Result<(), EngineError> {
        self.tally.terminated.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A driver over a [`StallingEngine`], plus its statement tally.
pub fn stalling_driver(stall_on: StallOn) -> (Driver, Arc<StatementTally>) {
    let engine = StallingEngine::new(stall_on);
    let tally = engine.tally();
    (Driver::new(Arc::new(engine)), tally)
}
